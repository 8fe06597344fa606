//! Line reading with an optional length limit.
//!
//! Lines are returned as raw bytes including their `\n` terminator. With a
//! limit of `max_len` bytes, a longer line is handled according to the
//! configured [`OverflowPolicy`].

use memchr::memchr;
use std::io::{self, BufRead, Read};
use std::path::{Path, PathBuf};
use tracing::trace;

use crate::config::{LineLimit, OverflowPolicy};
use crate::errors::{SedError, SedResult};

/// One line as produced by [`LineReader::next_line`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineInfo {
    /// 1-based line (or chunk, in split mode) number
    pub number: u64,
    /// True when the physical line exceeded the limit
    pub overflowed: bool,
}

/// Reads lines from a buffered source, applying a [`LineLimit`]
pub struct LineReader<R> {
    inner: R,
    limit: LineLimit,
    path: PathBuf,
    line_number: u64,
}

impl<R: BufRead> LineReader<R> {
    pub fn new(inner: R, limit: LineLimit, path: impl AsRef<Path>) -> Self {
        Self {
            inner,
            limit,
            path: path.as_ref().to_path_buf(),
            line_number: 0,
        }
    }

    /// Clears `buf` and fills it with the next line. Returns `None` at end of input.
    pub fn next_line(&mut self, buf: &mut Vec<u8>) -> SedResult<Option<LineInfo>> {
        buf.clear();

        let Some(max_len) = self.limit.max_len else {
            let n = self
                .inner
                .read_until(b'\n', buf)
                .map_err(|e| SedError::read(&self.path, e))?;
            return Ok(self.finish(n, false));
        };

        let n = (&mut self.inner)
            .take(max_len as u64)
            .read_until(b'\n', buf)
            .map_err(|e| SedError::read(&self.path, e))?;

        if n < max_len || buf.last() == Some(&b'\n') || self.at_eof()? {
            return Ok(self.finish(n, false));
        }

        match self.limit.overflow {
            OverflowPolicy::Split => {
                trace!(
                    "Line {} of {} exceeds {} bytes, splitting",
                    self.line_number + 1,
                    self.path.display(),
                    max_len
                );
                Ok(self.finish(n, true))
            }
            OverflowPolicy::Truncate => {
                if self.discard_rest_of_line()? {
                    buf.push(b'\n');
                }
                Ok(self.finish(n, true))
            }
            OverflowPolicy::Error => Err(SedError::line_too_long(
                &self.path,
                self.line_number + 1,
                max_len,
            )),
        }
    }

    fn finish(&mut self, n: usize, overflowed: bool) -> Option<LineInfo> {
        if n == 0 {
            return None;
        }
        self.line_number += 1;
        Some(LineInfo {
            number: self.line_number,
            overflowed,
        })
    }

    fn at_eof(&mut self) -> SedResult<bool> {
        let available = self
            .inner
            .fill_buf()
            .map_err(|e| SedError::read(&self.path, e))?;
        Ok(available.is_empty())
    }

    /// Skips input up to and including the next `\n`. Returns whether one was found.
    fn discard_rest_of_line(&mut self) -> SedResult<bool> {
        loop {
            let (consumed, found) = {
                let available = match self.inner.fill_buf() {
                    Ok(available) => available,
                    Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                    Err(e) => return Err(SedError::read(&self.path, e)),
                };
                if available.is_empty() {
                    return Ok(false);
                }
                match memchr(b'\n', available) {
                    Some(i) => (i + 1, true),
                    None => (available.len(), false),
                }
            };
            self.inner.consume(consumed);
            if found {
                return Ok(true);
            }
        }
    }
}
