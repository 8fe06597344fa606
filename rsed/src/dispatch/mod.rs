//! Fans a batch out to one worker per file and collects the outcomes.
//!
//! # Execution modes
//!
//! 1. **Sequential**: files are processed in input order on the calling
//!    thread. The sink is still locked per file so both modes share one code
//!    path.
//! 2. **Pool** (default): a dedicated rayon pool sized by
//!    [`Parallelism::Pool`] runs the workers, so the number of threads stays
//!    bounded however many files are given.
//! 3. **Thread per file**: one scoped OS thread per input file with no cap,
//!    for small batches where every file should start immediately.
//!
//! ```rust,ignore
//! let dispatcher = Dispatcher::new(config, OutputSink::stdout())?;
//! let result = dispatcher.run()?;
//! std::process::exit(result.exit_code());
//! ```
//!
//! # Failure isolation
//!
//! Workers never return errors to the dispatcher; each one produces a
//! [`FileOutcome`]. A failed file does not cancel, block or roll back any
//! other file, and nothing is retried. The only errors `run` returns are
//! ones that prevent dispatch altogether.
//!
//! # Ordering
//!
//! Outcomes are returned in input order in every mode. Streamed output blocks
//! appear in whatever order workers acquire the sink, except in sequential
//! mode where they follow input order.

use indicatif::ProgressBar;
use rayon::prelude::*;
use std::num::NonZeroUsize;
use std::path::Path;
use std::thread;
use tracing::{debug, info, warn};

use crate::config::{JobConfig, Parallelism};
use crate::errors::{SedError, SedResult};
use crate::metrics::BatchMetrics;
use crate::replace::Replacer;
use crate::results::{BatchResult, FileOutcome, FileStats};
use crate::sink::OutputSink;
use crate::worker::FileWorker;

/// Owns everything a batch shares: the config, the compiled replacer, the sink and the counters
pub struct Dispatcher {
    config: JobConfig,
    replacer: Replacer,
    sink: OutputSink,
    metrics: BatchMetrics,
    progress: Option<ProgressBar>,
}

impl Dispatcher {
    /// Validates `config` and prepares a batch. Nothing runs until [`Dispatcher::run`].
    pub fn new(config: JobConfig, sink: OutputSink) -> SedResult<Self> {
        config.validate()?;
        let replacer = Replacer::from_config(&config)?;
        Ok(Self {
            config,
            replacer,
            sink,
            metrics: BatchMetrics::new(),
            progress: None,
        })
    }

    /// Ticks `progress` once per finished file
    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        progress.set_length(self.config.files.len() as u64);
        self.progress = Some(progress);
        self
    }

    pub fn config(&self) -> &JobConfig {
        &self.config
    }

    pub fn metrics(&self) -> &BatchMetrics {
        &self.metrics
    }

    /// Runs every file to completion or failure and waits for all of them
    pub fn run(&self) -> SedResult<BatchResult> {
        info!(
            "Replacing {:?} with {:?} in {} file(s) (in place: {}, case-insensitive: {})",
            self.config.pattern,
            self.config.replacement,
            self.config.files.len(),
            self.config.in_place,
            self.config.case_insensitive
        );

        let outcomes = if self.config.sequential {
            debug!("Running sequentially");
            self.run_sequential()
        } else {
            match self.config.parallelism {
                Parallelism::Pool(threads) => self.run_pooled(threads)?,
                Parallelism::PerFile => self.run_per_file(),
            }
        };

        if let Some(progress) = &self.progress {
            progress.finish();
        }
        self.metrics.log_stats();

        let result = BatchResult::new(outcomes);
        info!(
            "Batch complete. {} of {} file(s) completed, {} replacement(s)",
            result.completed_count(),
            result.outcomes.len(),
            result.total_replacements()
        );
        Ok(result)
    }

    fn worker(&self) -> FileWorker<'_> {
        FileWorker::new(&self.config, &self.replacer, &self.sink, &self.metrics)
    }

    fn process_one(&self, worker: &FileWorker<'_>, path: &Path) -> FileOutcome {
        let outcome = worker.process(path);
        if let Some(progress) = &self.progress {
            progress.inc(1);
        }
        outcome
    }

    fn run_sequential(&self) -> Vec<FileOutcome> {
        let worker = self.worker();
        self.config
            .files
            .iter()
            .map(|path| self.process_one(&worker, path))
            .collect()
    }

    fn run_pooled(&self, threads: NonZeroUsize) -> SedResult<Vec<FileOutcome>> {
        debug!("Running on a pool of {} thread(s)", threads);
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads.get())
            .thread_name(|i| format!("rsed-worker-{}", i))
            .build()
            .map_err(|e| SedError::ThreadPool(e.to_string()))?;

        let worker = self.worker();
        Ok(pool.install(|| {
            self.config
                .files
                .par_iter()
                .map(|path| self.process_one(&worker, path))
                .collect()
        }))
    }

    fn run_per_file(&self) -> Vec<FileOutcome> {
        debug!("Running one thread per file");
        let worker = &self.worker();

        thread::scope(|scope| {
            let handles: Vec<_> = self
                .config
                .files
                .iter()
                .enumerate()
                .map(|(i, path)| {
                    let spawned = thread::Builder::new()
                        .name(format!("rsed-file-{}", i))
                        .spawn_scoped(scope, move || self.process_one(worker, path));
                    (path, spawned)
                })
                .collect();

            handles
                .into_iter()
                .map(|(path, spawned)| match spawned {
                    Ok(handle) => handle.join().unwrap_or_else(|_| {
                        warn!("Worker for {} panicked", path.display());
                        self.metrics.record_file(false);
                        FileOutcome::failed(
                            path,
                            FileStats::default(),
                            &SedError::WorkerPanicked(path.clone()),
                        )
                    }),
                    Err(e) => {
                        warn!("Could not start a worker for {}: {}", path.display(), e);
                        self.metrics.record_file(false);
                        FileOutcome::failed(
                            path,
                            FileStats::default(),
                            &SedError::ThreadPool(e.to_string()),
                        )
                    }
                })
                .collect()
        })
    }
}

/// Runs `config` against standard output
pub fn run(config: JobConfig) -> SedResult<BatchResult> {
    Dispatcher::new(config, OutputSink::stdout())?.run()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::results::FileStatus;
    use crate::sink::SharedBuffer;
    use std::fs;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn write_files(dir: &TempDir, count: usize) -> Vec<PathBuf> {
        (0..count)
            .map(|i| {
                let path = dir.path().join(format!("file_{}.txt", i));
                fs::write(&path, format!("cat {} one\ncat {} two\n", i, i)).unwrap();
                path
            })
            .collect()
    }

    #[test]
    fn test_new_rejects_invalid_config() {
        let config = JobConfig::new("", "x", vec![PathBuf::from("a")]);
        assert!(matches!(
            Dispatcher::new(config, OutputSink::null()),
            Err(SedError::EmptyPattern)
        ));

        let config = JobConfig::new("a", "x", vec![]);
        assert!(matches!(
            Dispatcher::new(config, OutputSink::null()),
            Err(SedError::NoFiles)
        ));
    }

    #[test]
    fn test_sequential_output_follows_input_order() {
        let dir = TempDir::new().unwrap();
        let files = write_files(&dir, 3);
        let buffer = SharedBuffer::new();

        let config = JobConfig {
            sequential: true,
            block_separator: "--\n".to_string(),
            ..JobConfig::new("cat", "dog", files.clone())
        };
        let result = Dispatcher::new(config, OutputSink::new(buffer.clone()))
            .unwrap()
            .run()
            .unwrap();

        assert_eq!(result.completed_count(), 3);
        assert_eq!(
            buffer.contents_lossy(),
            "dog 0 one\ndog 0 two\n--\ndog 1 one\ndog 1 two\n--\ndog 2 one\ndog 2 two\n--\n"
        );
    }

    #[test]
    fn test_outcomes_keep_input_order_in_every_mode() {
        let dir = TempDir::new().unwrap();
        let files = write_files(&dir, 6);

        for (sequential, parallelism) in [
            (true, Parallelism::default()),
            (false, Parallelism::Pool(NonZeroUsize::new(3).unwrap())),
            (false, Parallelism::PerFile),
        ] {
            let config = JobConfig {
                sequential,
                parallelism,
                ..JobConfig::new("cat", "dog", files.clone())
            };
            let result = Dispatcher::new(config, OutputSink::null())
                .unwrap()
                .run()
                .unwrap();

            let paths: Vec<_> = result.outcomes.iter().map(|o| o.path.clone()).collect();
            assert_eq!(paths, files);
            assert_eq!(result.total_replacements(), 12);
        }
    }

    #[test]
    fn test_failure_is_isolated() {
        let dir = TempDir::new().unwrap();
        let mut files = write_files(&dir, 2);
        files.insert(1, dir.path().join("missing.txt"));

        let config = JobConfig {
            in_place: true,
            parallelism: Parallelism::PerFile,
            ..JobConfig::new("cat", "dog", files.clone())
        };
        let dispatcher = Dispatcher::new(config, OutputSink::null()).unwrap();
        let result = dispatcher.run().unwrap();

        assert_eq!(result.outcomes[1].status, FileStatus::Failed);
        assert!(result.outcomes[0].is_success());
        assert!(result.outcomes[2].is_success());
        assert_eq!(
            fs::read_to_string(&files[2]).unwrap(),
            "dog 1 one\ndog 1 two\n"
        );

        let stats = dispatcher.metrics().get_stats();
        assert_eq!(stats.files_completed, 2);
        assert_eq!(stats.files_failed, 1);
    }

    #[test]
    fn test_progress_counts_files() {
        let dir = TempDir::new().unwrap();
        let files = write_files(&dir, 4);

        let progress = ProgressBar::hidden();
        let dispatcher = Dispatcher::new(JobConfig::new("cat", "dog", files), OutputSink::null())
            .unwrap()
            .with_progress(progress.clone());
        dispatcher.run().unwrap();

        assert_eq!(progress.position(), 4);
        assert_eq!(progress.length(), Some(4));
    }
}
