//! Error types for rsed.
//!
//! Errors fall into two groups. Configuration errors (`EmptyPattern`, `NoFiles`,
//! `ConfigError`, `Settings`) are fatal to the whole run and are raised before any
//! worker starts. Everything else is local to one file: a worker that hits one of
//! them stops, records the failure in its `FileOutcome`, and the batch carries on.
//!
//! ```rust,ignore
//! match Dispatcher::new(config, OutputSink::stdout()) {
//!     Ok(dispatcher) => // run the batch,
//!     Err(SedError::EmptyPattern) => // print usage,
//!     Err(e) => // other configuration problem
//! }
//! ```

use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Result type for rsed operations
pub type SedResult<T> = Result<T, SedError>;

/// Errors that can occur while configuring or running a batch
#[derive(Error, Debug)]
pub enum SedError {
    #[error("Pattern must not be empty")]
    EmptyPattern,
    #[error("No files given")]
    NoFiles,
    #[error("Configuration error: {0}")]
    ConfigError(String),
    #[error("Settings error: {0}")]
    Settings(#[from] config::ConfigError),
    #[error("Cannot open '{path}': {source}")]
    Open { path: PathBuf, source: io::Error },
    #[error("Read error in '{path}': {source}")]
    Read { path: PathBuf, source: io::Error },
    #[error("Write error for '{path}': {source}")]
    Write { path: PathBuf, source: io::Error },
    #[error("Cannot create temporary file next to '{path}': {source}")]
    TempFile { path: PathBuf, source: io::Error },
    #[error("Line {line} of '{path}' exceeds the {limit} byte limit")]
    LineTooLong {
        path: PathBuf,
        line: u64,
        limit: usize,
    },
    #[error("Output error: {0}")]
    Sink(io::Error),
    #[error("Thread pool error: {0}")]
    ThreadPool(String),
    #[error("Worker for '{0}' panicked")]
    WorkerPanicked(PathBuf),
}

impl SedError {
    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    /// Maps a failed `File::open` into an error naming the path.
    pub fn open(path: impl AsRef<Path>, source: io::Error) -> Self {
        Self::Open {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    pub fn read(path: impl AsRef<Path>, source: io::Error) -> Self {
        Self::Read {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    pub fn write(path: impl AsRef<Path>, source: io::Error) -> Self {
        Self::Write {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    pub fn temp_file(path: impl AsRef<Path>, source: io::Error) -> Self {
        Self::TempFile {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    pub fn line_too_long(path: impl AsRef<Path>, line: u64, limit: usize) -> Self {
        Self::LineTooLong {
            path: path.as_ref().to_path_buf(),
            line,
            limit,
        }
    }

    /// True for invalid input rejected before dispatch, as opposed to runtime failures
    pub fn is_usage_error(&self) -> bool {
        matches!(
            self,
            Self::EmptyPattern
                | Self::NoFiles
                | Self::ConfigError(_)
                | Self::Settings(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let not_found = io::Error::new(io::ErrorKind::NotFound, "missing");
        let err = SedError::open("test.txt", not_found);
        assert!(matches!(err, SedError::Open { .. }));
        assert!(!err.is_usage_error());

        let err = SedError::config_error("bad limit");
        assert!(matches!(err, SedError::ConfigError(_)));
        assert!(err.is_usage_error());

        assert!(SedError::EmptyPattern.is_usage_error());
        assert!(SedError::NoFiles.is_usage_error());
        assert!(!SedError::ThreadPool("no threads".to_string()).is_usage_error());
    }

    #[test]
    fn test_error_messages() {
        let err = SedError::line_too_long("big.txt", 7, 16);
        assert_eq!(
            err.to_string(),
            "Line 7 of 'big.txt' exceeds the 16 byte limit"
        );

        let err = SedError::config_error("Missing required field");
        assert_eq!(err.to_string(), "Configuration error: Missing required field");

        let err = SedError::EmptyPattern;
        assert_eq!(err.to_string(), "Pattern must not be empty");

        let denied = io::Error::new(io::ErrorKind::PermissionDenied, "denied");
        let err = SedError::open("secret.txt", denied);
        assert_eq!(err.to_string(), "Cannot open 'secret.txt': denied");
    }
}
