//! Per-file outcomes and the aggregated result of a batch.

use serde::Serialize;
use std::path::{Path, PathBuf};

use crate::errors::SedError;

/// Exit code for a batch where every file completed
pub const EXIT_SUCCESS: i32 = 0;
/// Exit code for a batch where at least one file failed or was degraded
pub const EXIT_FILE_FAILURES: i32 = 1;

/// How a single file's worker ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FileStatus {
    /// Processed and written without problems
    Completed,
    /// Processed, but the in-place swap fell back to deleting the original
    Degraded,
    /// Stopped on an error; output for this file may be partial
    Failed,
}

/// Counters collected by one worker
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FileStats {
    pub lines: u64,
    pub replacements: u64,
    pub overflowed_lines: u64,
}

/// The result of processing one file
#[derive(Debug, Clone, Serialize)]
pub struct FileOutcome {
    pub path: PathBuf,
    pub status: FileStatus,
    #[serde(flatten)]
    pub stats: FileStats,
    /// Error or warning text for non-completed files
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Temporary file left behind by a failed in-place swap
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kept_temp: Option<PathBuf>,
}

impl FileOutcome {
    pub fn completed(path: impl AsRef<Path>, stats: FileStats) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            status: FileStatus::Completed,
            stats,
            message: None,
            kept_temp: None,
        }
    }

    pub fn degraded(
        path: impl AsRef<Path>,
        stats: FileStats,
        message: impl Into<String>,
        kept_temp: PathBuf,
    ) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            status: FileStatus::Degraded,
            stats,
            message: Some(message.into()),
            kept_temp: Some(kept_temp),
        }
    }

    pub fn failed(path: impl AsRef<Path>, stats: FileStats, error: &SedError) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            status: FileStatus::Failed,
            stats,
            message: Some(error.to_string()),
            kept_temp: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == FileStatus::Completed
    }
}

/// Outcomes for every file of a batch, in input order
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchResult {
    pub outcomes: Vec<FileOutcome>,
}

impl BatchResult {
    pub fn new(outcomes: Vec<FileOutcome>) -> Self {
        Self { outcomes }
    }

    pub fn completed_count(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_success()).count()
    }

    /// Failed and degraded outcomes
    pub fn failures(&self) -> impl Iterator<Item = &FileOutcome> {
        self.outcomes.iter().filter(|o| !o.is_success())
    }

    pub fn has_failures(&self) -> bool {
        self.failures().next().is_some()
    }

    pub fn total_replacements(&self) -> u64 {
        self.outcomes.iter().map(|o| o.stats.replacements).sum()
    }

    pub fn total_lines(&self) -> u64 {
        self.outcomes.iter().map(|o| o.stats.lines).sum()
    }

    /// Outcome for `path`, if it was part of the batch
    pub fn outcome_for(&self, path: impl AsRef<Path>) -> Option<&FileOutcome> {
        self.outcomes.iter().find(|o| o.path == path.as_ref())
    }

    pub fn exit_code(&self) -> i32 {
        if self.has_failures() {
            EXIT_FILE_FAILURES
        } else {
            EXIT_SUCCESS
        }
    }
}
