use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

/// Live counters shared by every worker of a batch
#[derive(Debug, Clone, Default)]
pub struct BatchMetrics {
    files_completed: Arc<AtomicU64>,
    files_failed: Arc<AtomicU64>,
    lines_processed: Arc<AtomicU64>,
    replacements: Arc<AtomicU64>,
    bytes_streamed: Arc<AtomicU64>,
    bytes_rewritten: Arc<AtomicU64>,
}

impl BatchMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one transformed line
    pub fn record_line(&self, replacements: usize) {
        self.lines_processed.fetch_add(1, Ordering::Relaxed);
        self.replacements
            .fetch_add(replacements as u64, Ordering::Relaxed);
    }

    /// Records bytes written to the shared sink
    pub fn record_streamed(&self, bytes: usize) {
        self.bytes_streamed
            .fetch_add(bytes as u64, Ordering::Relaxed);
    }

    /// Records bytes written to a temporary file
    pub fn record_rewritten(&self, bytes: usize) {
        self.bytes_rewritten
            .fetch_add(bytes as u64, Ordering::Relaxed);
    }

    /// Records the end of one worker
    pub fn record_file(&self, success: bool) {
        let counter = if success {
            &self.files_completed
        } else {
            &self.files_failed
        };
        let total = counter.fetch_add(1, Ordering::Relaxed) + 1;
        debug!(
            "Worker finished (success: {}), {} so far in this category",
            success, total
        );
    }

    pub fn get_stats(&self) -> BatchStats {
        BatchStats {
            files_completed: self.files_completed.load(Ordering::Relaxed),
            files_failed: self.files_failed.load(Ordering::Relaxed),
            lines_processed: self.lines_processed.load(Ordering::Relaxed),
            replacements: self.replacements.load(Ordering::Relaxed),
            bytes_streamed: self.bytes_streamed.load(Ordering::Relaxed),
            bytes_rewritten: self.bytes_rewritten.load(Ordering::Relaxed),
        }
    }

    pub fn log_stats(&self) {
        let stats = self.get_stats();
        info!(
            "Batch stats:\n\
             Files completed/failed: {}/{}\n\
             Lines processed: {}\n\
             Replacements: {}\n\
             Bytes streamed/rewritten: {}/{}",
            stats.files_completed,
            stats.files_failed,
            stats.lines_processed,
            stats.replacements,
            stats.bytes_streamed,
            stats.bytes_rewritten
        );
    }
}

/// Snapshot of [`BatchMetrics`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchStats {
    pub files_completed: u64,
    pub files_failed: u64,
    pub lines_processed: u64,
    pub replacements: u64,
    pub bytes_streamed: u64,
    pub bytes_rewritten: u64,
}
