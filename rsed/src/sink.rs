//! Serialized destination for streamed output.
//!
//! A worker takes the sink's lock once, writes its whole file through the
//! returned [`SinkGuard`], and releases the lock by dropping the guard. No
//! other worker can write in between, so one file's lines are never
//! interleaved with another's.

use std::io::{self, BufWriter, Write};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Buffer size used when wrapping stdout
const SINK_BUFFER_CAPACITY: usize = 64 * 1024;

/// Process-wide output shared by all streaming workers
pub struct OutputSink {
    inner: Mutex<Box<dyn Write + Send>>,
}

impl OutputSink {
    /// Wraps any writer
    pub fn new<W: Write + Send + 'static>(writer: W) -> Self {
        Self {
            inner: Mutex::new(Box::new(writer)),
        }
    }

    /// A buffered sink over the process's standard output
    pub fn stdout() -> Self {
        Self::new(BufWriter::with_capacity(SINK_BUFFER_CAPACITY, io::stdout()))
    }

    /// A sink that discards everything, for in-place runs
    pub fn null() -> Self {
        Self::new(io::sink())
    }

    /// Blocks until this caller has exclusive access.
    ///
    /// A panic in another worker while it held the lock leaves at worst a
    /// partially written block behind; the stream itself stays usable.
    pub fn lock(&self) -> SinkGuard<'_> {
        SinkGuard {
            inner: self.inner.lock().unwrap_or_else(PoisonError::into_inner),
        }
    }
}

impl std::fmt::Debug for OutputSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutputSink").finish_non_exhaustive()
    }
}

/// Exclusive access to the sink for one file's block
pub struct SinkGuard<'a> {
    inner: MutexGuard<'a, Box<dyn Write + Send>>,
}

impl Write for SinkGuard<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.inner.write(buf)
    }

    fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        self.inner.write_all(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// An in-memory writer whose contents can be read back while it is shared.
///
/// Useful for capturing streamed output in tests or when embedding the engine.
#[derive(Debug, Clone, Default)]
pub struct SharedBuffer {
    bytes: Arc<Mutex<Vec<u8>>>,
}

impl SharedBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of everything written so far
    pub fn contents(&self) -> Vec<u8> {
        self.bytes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn contents_lossy(&self) -> String {
        String::from_utf8_lossy(&self.contents()).into_owned()
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.bytes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
