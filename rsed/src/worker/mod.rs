//! Processing of a single file, start to finish.
//!
//! A worker moves through `Opening -> Reading -> (Streaming | Buffering) ->
//! Finalizing -> Done`, or ends in `Failed` from any step. Failures never
//! leave the worker: they are turned into a [`FileOutcome`] so the batch
//! can carry on with the other files.
//!
//! Streaming mode holds the sink lock for the whole file. Buffering mode
//! writes to a private temporary file beside the original and swaps it into
//! place at the end.

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process;

use tempfile::NamedTempFile;
use tracing::{debug, info, trace, warn};

use crate::config::{JobConfig, OverflowPolicy};
use crate::errors::{SedError, SedResult};
use crate::metrics::BatchMetrics;
use crate::reader::{LineInfo, LineReader};
use crate::replace::Replacer;
use crate::results::{FileOutcome, FileStats};
use crate::sink::OutputSink;

mod swap;
pub use swap::{swap_into_place, Finalize};

/// Read buffer per worker
const READ_BUFFER_CAPACITY: usize = 64 * 1024;

/// Where a worker is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Opening,
    Reading,
    Streaming,
    Buffering,
    Finalizing,
    Done,
    Failed,
}

/// Per-file bookkeeping, alive for exactly one `process` call
#[derive(Debug)]
struct FileTask<'p> {
    path: &'p Path,
    state: WorkerState,
    stats: FileStats,
}

impl<'p> FileTask<'p> {
    fn new(path: &'p Path) -> Self {
        Self {
            path,
            state: WorkerState::Opening,
            stats: FileStats::default(),
        }
    }

    fn transition(&mut self, next: WorkerState) {
        trace!("{}: {:?} -> {:?}", self.path.display(), self.state, next);
        self.state = next;
    }
}

/// Applies the replacer to files, routing output per the job's discipline
pub struct FileWorker<'a> {
    config: &'a JobConfig,
    replacer: &'a Replacer,
    sink: &'a OutputSink,
    metrics: &'a BatchMetrics,
}

impl<'a> FileWorker<'a> {
    pub fn new(
        config: &'a JobConfig,
        replacer: &'a Replacer,
        sink: &'a OutputSink,
        metrics: &'a BatchMetrics,
    ) -> Self {
        Self {
            config,
            replacer,
            sink,
            metrics,
        }
    }

    /// Processes one file. Never panics on I/O problems; they end up in the outcome.
    pub fn process(&self, path: &Path) -> FileOutcome {
        let mut task = FileTask::new(path);
        debug!("Processing {}", path.display());

        let result = self.run(&mut task);
        self.conclude(task, result)
    }

    /// Turns the result of a run into the file's outcome and records it
    fn conclude(
        &self,
        mut task: FileTask<'_>,
        result: SedResult<Option<Finalize>>,
    ) -> FileOutcome {
        let path = task.path;
        let outcome = match result {
            Ok(None) | Ok(Some(Finalize::Replaced)) => {
                task.transition(WorkerState::Done);
                if self.config.in_place {
                    info!("Result is in file '{}'", path.display());
                }
                FileOutcome::completed(path, task.stats)
            }
            Ok(Some(finalize)) => {
                task.transition(WorkerState::Done);
                let message = finalize.describe();
                warn!("{}: {}", path.display(), message);
                let kept_temp = finalize.kept_temp().map(Path::to_path_buf).unwrap_or_default();
                FileOutcome::degraded(path, task.stats, message, kept_temp)
            }
            Err(e) => {
                task.transition(WorkerState::Failed);
                warn!("{}", e);
                FileOutcome::failed(path, task.stats, &e)
            }
        };

        if task.stats.overflowed_lines > 0 {
            let action = match self.config.line_limit.overflow {
                OverflowPolicy::Split => "split",
                OverflowPolicy::Truncate => "truncated",
                OverflowPolicy::Error => "rejected",
            };
            warn!(
                "{}: {} line(s) longer than the limit were {}",
                path.display(),
                task.stats.overflowed_lines,
                action
            );
        }

        self.metrics.record_file(outcome.is_success());
        outcome
    }

    fn run(&self, task: &mut FileTask<'_>) -> SedResult<Option<Finalize>> {
        let file = File::open(task.path).map_err(|e| SedError::open(task.path, e))?;
        task.transition(WorkerState::Reading);

        let reader = LineReader::new(
            BufReader::with_capacity(READ_BUFFER_CAPACITY, file),
            self.config.line_limit,
            task.path,
        );

        if self.config.in_place {
            self.rewrite(task, reader).map(Some)
        } else {
            self.stream(task, reader).map(|()| None)
        }
    }

    fn transform(
        &self,
        stats: &mut FileStats,
        line: &[u8],
        info: LineInfo,
        out: &mut Vec<u8>,
    ) {
        out.clear();
        let replacements = self.replacer.replace_into(line, out);
        stats.lines += 1;
        stats.replacements += replacements as u64;
        if info.overflowed {
            stats.overflowed_lines += 1;
        }
        self.metrics.record_line(replacements);
    }

    /// Writes the whole file to the sink as one uninterrupted block
    fn stream(
        &self,
        task: &mut FileTask<'_>,
        mut reader: LineReader<BufReader<File>>,
    ) -> SedResult<()> {
        task.transition(WorkerState::Streaming);
        let mut out = self.sink.lock();
        let mut line = Vec::new();
        let mut transformed = Vec::new();

        while let Some(info) = reader.next_line(&mut line)? {
            self.transform(&mut task.stats, &line, info, &mut transformed);
            out.write_all(&transformed).map_err(SedError::Sink)?;
            self.metrics.record_streamed(transformed.len());
        }

        out.write_all(self.config.block_separator.as_bytes())
            .map_err(SedError::Sink)?;
        out.flush().map_err(SedError::Sink)?;
        task.transition(WorkerState::Finalizing);
        Ok(())
    }

    /// Writes the transformed file beside the original, then swaps it in
    fn rewrite(
        &self,
        task: &mut FileTask<'_>,
        mut reader: LineReader<BufReader<File>>,
    ) -> SedResult<Finalize> {
        task.transition(WorkerState::Buffering);
        let temp = create_temp_beside(task.path)?;

        {
            let mut writer = BufWriter::new(temp.as_file());
            let mut line = Vec::new();
            let mut transformed = Vec::new();
            while let Some(info) = reader.next_line(&mut line)? {
                self.transform(&mut task.stats, &line, info, &mut transformed);
                writer
                    .write_all(&transformed)
                    .map_err(|e| SedError::write(temp.path(), e))?;
                self.metrics.record_rewritten(transformed.len());
            }
            writer.flush().map_err(|e| SedError::write(temp.path(), e))?;
        }
        drop(reader);

        copy_permissions(task.path, temp.path());
        task.transition(WorkerState::Finalizing);
        Ok(swap_into_place(temp, task.path))
    }
}

/// Creates `.<name>.<random>.rsed-<pid>.tmp` in the same directory as `path`
fn create_temp_beside(path: &Path) -> SedResult<NamedTempFile> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    tempfile::Builder::new()
        .prefix(&format!(".{}.", name))
        .suffix(&format!(".rsed-{}.tmp", process::id()))
        .tempfile_in(&dir)
        .map_err(|e| SedError::temp_file(path, e))
}

fn copy_permissions(from: &Path, to: &Path) {
    let result = fs::metadata(from).and_then(|meta| fs::set_permissions(to, meta.permissions()));
    if let Err(e) = result {
        warn!(
            "Could not copy permissions of {} to its replacement: {}",
            from.display(),
            e
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LineLimit;
    use crate::results::FileStatus;
    use crate::sink::SharedBuffer;
    use tempfile::TempDir;

    struct Fixture {
        config: JobConfig,
        replacer: Replacer,
        buffer: SharedBuffer,
        sink: OutputSink,
        metrics: BatchMetrics,
    }

    impl Fixture {
        fn new(config: JobConfig) -> Self {
            let buffer = SharedBuffer::new();
            Self {
                replacer: Replacer::from_config(&config).unwrap(),
                config,
                sink: OutputSink::new(buffer.clone()),
                buffer,
                metrics: BatchMetrics::new(),
            }
        }

        fn worker(&self) -> FileWorker<'_> {
            FileWorker::new(&self.config, &self.replacer, &self.sink, &self.metrics)
        }
    }

    fn dir_entries(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn test_stream_writes_block_and_separator() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.txt");
        fs::write(&path, "cat one\ncat two\n").unwrap();

        let fixture = Fixture::new(JobConfig::new("cat", "dog", vec![path.clone()]));
        let outcome = fixture.worker().process(&path);

        assert_eq!(outcome.status, FileStatus::Completed);
        assert_eq!(outcome.stats.lines, 2);
        assert_eq!(outcome.stats.replacements, 2);
        assert_eq!(fixture.buffer.contents_lossy(), "dog one\ndog two\n\n\n");
        assert_eq!(fs::read_to_string(&path).unwrap(), "cat one\ncat two\n");
    }

    #[test]
    fn test_in_place_rewrites_and_cleans_up() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("pets.txt");
        fs::write(&path, "cat sat\n").unwrap();

        let config = JobConfig {
            in_place: true,
            ..JobConfig::new("cat", "dog", vec![path.clone()])
        };
        let fixture = Fixture::new(config);
        let outcome = fixture.worker().process(&path);

        assert!(outcome.is_success());
        assert_eq!(fs::read_to_string(&path).unwrap(), "dog sat\n");
        assert_eq!(dir_entries(dir.path()), vec!["pets.txt".to_string()]);
        assert!(fixture.buffer.contents().is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn test_in_place_preserves_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let path = dir.path().join("script.sh");
        fs::write(&path, "echo cat\n").unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();

        let config = JobConfig {
            in_place: true,
            ..JobConfig::new("cat", "dog", vec![path.clone()])
        };
        let fixture = Fixture::new(config);
        assert!(fixture.worker().process(&path).is_success());

        let mode = fs::metadata(&path).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o755);
    }

    #[test]
    fn test_missing_file_fails_without_output() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("missing.txt");

        let fixture = Fixture::new(JobConfig::new("cat", "dog", vec![path.clone()]));
        let outcome = fixture.worker().process(&path);

        assert_eq!(outcome.status, FileStatus::Failed);
        assert!(outcome.message.unwrap().starts_with("Cannot open"));
        assert!(fixture.buffer.contents().is_empty());
        assert_eq!(fixture.metrics.get_stats().files_failed, 1);
    }

    #[test]
    fn test_in_place_line_error_keeps_original() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("long.txt");
        fs::write(&path, "cat\nthis line is far too long\n").unwrap();

        let config = JobConfig {
            in_place: true,
            line_limit: LineLimit::new(8, OverflowPolicy::Error),
            ..JobConfig::new("cat", "dog", vec![path.clone()])
        };
        let fixture = Fixture::new(config);
        let outcome = fixture.worker().process(&path);

        assert_eq!(outcome.status, FileStatus::Failed);
        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "cat\nthis line is far too long\n"
        );
        assert_eq!(dir_entries(dir.path()), vec!["long.txt".to_string()]);
    }

    #[test]
    fn test_truncate_counts_overflowed_lines() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("wide.txt");
        fs::write(&path, "cat cat cat cat\ncat\n").unwrap();

        let config = JobConfig {
            line_limit: LineLimit::new(7, OverflowPolicy::Truncate),
            block_separator: String::new(),
            ..JobConfig::new("cat", "dog", vec![path.clone()])
        };
        let fixture = Fixture::new(config);
        let outcome = fixture.worker().process(&path);

        assert!(outcome.is_success());
        assert_eq!(outcome.stats.overflowed_lines, 1);
        assert_eq!(outcome.stats.replacements, 3);
        assert_eq!(fixture.buffer.contents_lossy(), "dog dog\ndog\n");
    }

    #[test]
    fn test_case_insensitive_stream() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("mixed.txt");
        fs::write(&path, "Cat and CAT and cat\n").unwrap();

        let config = JobConfig {
            case_insensitive: true,
            block_separator: String::new(),
            ..JobConfig::new("cat", "Dog", vec![path.clone()])
        };
        let fixture = Fixture::new(config);
        fixture.worker().process(&path);

        assert_eq!(fixture.buffer.contents_lossy(), "Dog and Dog and Dog\n");
    }

    #[test]
    fn test_temp_file_lives_beside_original() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("notes.txt");
        let temp = create_temp_beside(&path).unwrap();

        assert_eq!(temp.path().parent(), Some(dir.path()));
        let name = temp.path().file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with(".notes.txt."));
        assert!(name.ends_with(&format!(".rsed-{}.tmp", process::id())));

        drop(temp);
        assert!(dir_entries(dir.path()).is_empty());
    }

    #[test]
    fn test_failed_rename_degrades_the_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("pets.txt");
        fs::write(&path, "cat sat\n").unwrap();

        let config = JobConfig {
            in_place: true,
            ..JobConfig::new("cat", "dog", vec![path.clone()])
        };
        let fixture = Fixture::new(config);

        let mut temp = create_temp_beside(&path).unwrap();
        temp.write_all(b"dog sat\n").unwrap();
        // the rename has nothing to move once the temporary file is gone
        fs::remove_file(temp.path()).unwrap();
        let finalize = swap_into_place(temp, &path);

        let mut task = FileTask::new(&path);
        task.stats.lines = 1;
        task.stats.replacements = 1;
        let outcome = fixture.worker().conclude(task, Ok(Some(finalize)));

        assert_eq!(outcome.status, FileStatus::Degraded);
        assert!(!outcome.is_success());
        assert!(outcome.kept_temp.is_some());
        assert!(outcome
            .message
            .as_deref()
            .unwrap()
            .contains("original removed"));
        assert_eq!(outcome.stats.replacements, 1);
        assert!(!path.exists());
        assert_eq!(fixture.metrics.get_stats().files_failed, 1);
    }
}
