use config::{Config as ConfigBuilder, File};
use serde::{Deserialize, Serialize};
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};

use crate::errors::{SedError, SedResult};

/// Separator written after each file's block in streaming mode
pub const DEFAULT_BLOCK_SEPARATOR: &str = "\n\n";

/// How many workers run at once
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Parallelism {
    /// A rayon pool with this many threads
    Pool(NonZeroUsize),
    /// One OS thread per input file, no cap
    PerFile,
}

impl Default for Parallelism {
    fn default() -> Self {
        Parallelism::Pool(default_thread_count())
    }
}

/// What to do with a line longer than the configured limit
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverflowPolicy {
    /// Process the line in limit-sized chunks (fixed-buffer behaviour)
    #[default]
    Split,
    /// Keep the first `max_len` bytes and the terminator, drop the rest
    Truncate,
    /// Fail the file
    Error,
}

impl std::str::FromStr for OverflowPolicy {
    type Err = SedError;

    fn from_str(s: &str) -> SedResult<Self> {
        match s.to_ascii_lowercase().as_str() {
            "split" => Ok(OverflowPolicy::Split),
            "truncate" => Ok(OverflowPolicy::Truncate),
            "error" => Ok(OverflowPolicy::Error),
            other => Err(SedError::config_error(format!(
                "Unknown overflow policy '{}' (expected split, truncate or error)",
                other
            ))),
        }
    }
}

/// Maximum line length in bytes, terminator included.
///
/// `max_len: None` reads lines of any length.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineLimit {
    pub max_len: Option<usize>,
    pub overflow: OverflowPolicy,
}

impl LineLimit {
    pub fn unbounded() -> Self {
        Self::default()
    }

    pub fn new(max_len: usize, overflow: OverflowPolicy) -> Self {
        Self {
            max_len: Some(max_len),
            overflow,
        }
    }
}

/// Everything a batch run needs, shared read-only by every worker.
///
/// ```rust,ignore
/// let config = JobConfig {
///     case_insensitive: true,
///     ..JobConfig::new("cat", "dog", vec![PathBuf::from("pets.txt")])
/// };
/// config.validate()?;
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobConfig {
    /// Literal text to search for, never empty once validated
    pub pattern: String,

    /// Text inserted for every occurrence, inserted verbatim
    pub replacement: String,

    /// ASCII-only case-insensitive matching
    #[serde(default)]
    pub case_insensitive: bool,

    /// Rewrite files through a temporary file instead of streaming to the sink
    #[serde(default)]
    pub in_place: bool,

    /// Run workers one after another on the calling thread
    #[serde(default)]
    pub sequential: bool,

    /// Input files, processed independently
    pub files: Vec<PathBuf>,

    #[serde(default)]
    pub parallelism: Parallelism,

    #[serde(default)]
    pub line_limit: LineLimit,

    /// Written after each file's block in streaming mode
    #[serde(default = "default_block_separator")]
    pub block_separator: String,
}

fn default_thread_count() -> NonZeroUsize {
    NonZeroUsize::new(num_cpus::get()).unwrap_or(NonZeroUsize::MIN)
}

fn default_block_separator() -> String {
    DEFAULT_BLOCK_SEPARATOR.to_string()
}

fn default_log_level() -> String {
    "warn".to_string()
}

impl JobConfig {
    /// Creates a config with default options for the given pattern, replacement and files
    pub fn new(
        pattern: impl Into<String>,
        replacement: impl Into<String>,
        files: Vec<PathBuf>,
    ) -> Self {
        Self {
            pattern: pattern.into(),
            replacement: replacement.into(),
            case_insensitive: false,
            in_place: false,
            sequential: false,
            files,
            parallelism: Parallelism::default(),
            line_limit: LineLimit::default(),
            block_separator: default_block_separator(),
        }
    }

    /// Rejects configurations that must never reach a worker
    pub fn validate(&self) -> SedResult<()> {
        if self.pattern.is_empty() {
            return Err(SedError::EmptyPattern);
        }
        if self.files.is_empty() {
            return Err(SedError::NoFiles);
        }
        if self.line_limit.max_len == Some(0) {
            return Err(SedError::config_error(
                "Maximum line length must be at least 1 byte",
            ));
        }
        Ok(())
    }
}

/// Defaults read from YAML settings files.
///
/// Settings are looked up in order of increasing precedence:
/// 1. Global `$CONFIG_DIR/rsed/config.yaml`
/// 2. Local `.rsed.yaml` in the current directory
/// 3. A file passed with `--config`
///
/// ```yaml
/// thread_count: 4
/// thread_per_file: false
/// max_line_length: 4096
/// overflow: split
/// block_separator: "\n"
/// log_level: info
/// ```
///
/// Command-line flags take precedence over every settings file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub thread_count: Option<NonZeroUsize>,

    #[serde(default)]
    pub thread_per_file: bool,

    #[serde(default)]
    pub max_line_length: Option<usize>,

    #[serde(default)]
    pub overflow: OverflowPolicy,

    #[serde(default = "default_block_separator")]
    pub block_separator: String,

    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            thread_count: None,
            thread_per_file: false,
            max_line_length: None,
            overflow: OverflowPolicy::default(),
            block_separator: default_block_separator(),
            log_level: default_log_level(),
        }
    }
}

impl Settings {
    /// Loads settings from the default locations
    pub fn load() -> SedResult<Self> {
        Self::load_from(None)
    }

    /// Loads settings from the default locations plus an explicit file.
    ///
    /// The explicit file must exist; the default locations are optional.
    pub fn load_from(config_path: Option<&Path>) -> SedResult<Self> {
        let mut builder = ConfigBuilder::builder();

        let defaults = [
            dirs::config_dir().map(|p| p.join("rsed/config.yaml")),
            Some(PathBuf::from(".rsed.yaml")),
        ];
        for path in defaults.iter().flatten() {
            if path.exists() {
                builder = builder.add_source(File::from(path.as_path()));
            }
        }

        if let Some(path) = config_path {
            builder = builder.add_source(File::from(path).required(true));
        }

        Ok(builder.build()?.try_deserialize()?)
    }

    /// Builds a job from these settings; CLI-only fields come in as arguments
    pub fn into_job(
        self,
        pattern: impl Into<String>,
        replacement: impl Into<String>,
        files: Vec<PathBuf>,
    ) -> JobConfig {
        let parallelism = if self.thread_per_file {
            Parallelism::PerFile
        } else {
            Parallelism::Pool(self.thread_count.unwrap_or_else(default_thread_count))
        };

        JobConfig {
            parallelism,
            line_limit: LineLimit {
                max_len: self.max_line_length,
                overflow: self.overflow,
            },
            block_separator: self.block_separator,
            ..JobConfig::new(pattern, replacement, files)
        }
    }
}
