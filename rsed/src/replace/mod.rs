//! Literal find-and-replace over a single line.
//!
//! Occurrences are found left to right, leftmost first, without overlap.
//! After a match the scan resumes at the end of the matched text in the
//! original line, so a replacement that itself contains the pattern is never
//! scanned again.
//!
//! For a line of length `n` with `k` occurrences the output is exactly
//! `n + k * (len(replacement) - len(pattern))` bytes long.

use memchr::memmem::Finder;

use crate::config::JobConfig;
use crate::errors::{SedError, SedResult};

pub mod case_fold;

/// A compiled pattern/replacement pair, shared by every worker
#[derive(Debug, Clone)]
pub struct Replacer {
    finder: Finder<'static>,
    replacement: Vec<u8>,
    case_insensitive: bool,
}

impl Replacer {
    /// Compiles a replacer. An empty pattern is rejected.
    pub fn new(pattern: &str, replacement: &str, case_insensitive: bool) -> SedResult<Self> {
        if pattern.is_empty() {
            return Err(SedError::EmptyPattern);
        }

        let needle = if case_insensitive {
            case_fold::fold_bytes(pattern.as_bytes())
        } else {
            pattern.as_bytes().to_vec()
        };

        Ok(Self {
            finder: Finder::new(&needle).into_owned(),
            replacement: replacement.as_bytes().to_vec(),
            case_insensitive,
        })
    }

    pub fn from_config(config: &JobConfig) -> SedResult<Self> {
        Self::new(
            &config.pattern,
            &config.replacement,
            config.case_insensitive,
        )
    }

    pub fn pattern_len(&self) -> usize {
        self.finder.needle().len()
    }

    pub fn replacement_len(&self) -> usize {
        self.replacement.len()
    }

    /// Byte offsets of every non-overlapping occurrence in `line`
    fn match_starts(&self, line: &[u8]) -> Vec<usize> {
        if self.case_insensitive {
            let folded = case_fold::fold_bytes(line);
            self.finder.find_iter(&folded).collect()
        } else {
            self.finder.find_iter(line).collect()
        }
    }

    /// Number of occurrences `replace_into` would substitute
    pub fn count(&self, line: &[u8]) -> usize {
        self.match_starts(line).len()
    }

    /// Output length for an input of `original_len` bytes with `occurrences` matches
    pub fn expected_len(&self, original_len: usize, occurrences: usize) -> usize {
        original_len - occurrences * self.pattern_len() + occurrences * self.replacement_len()
    }

    /// Appends the transformed `line` to `out` and returns the number of substitutions.
    ///
    /// Text outside the matches is copied from `line` unchanged, even in
    /// case-insensitive mode; only the comparison is folded.
    pub fn replace_into(&self, line: &[u8], out: &mut Vec<u8>) -> usize {
        let starts = self.match_starts(line);
        if starts.is_empty() {
            out.extend_from_slice(line);
            return 0;
        }

        out.reserve(self.expected_len(line.len(), starts.len()));
        let pattern_len = self.pattern_len();
        let mut last = 0;
        for &start in &starts {
            out.extend_from_slice(&line[last..start]);
            out.extend_from_slice(&self.replacement);
            last = start + pattern_len;
        }
        out.extend_from_slice(&line[last..]);

        starts.len()
    }

    /// Convenience wrapper for `&str` input
    pub fn replace_str(&self, line: &str) -> String {
        let mut out = Vec::with_capacity(line.len());
        self.replace_into(line.as_bytes(), &mut out);
        // A valid UTF-8 needle only matches on char boundaries, so this is lossless.
        String::from_utf8_lossy(&out).into_owned()
    }
}

/// Replaces every occurrence of `pattern` in `original` with `replacement`
pub fn replace(original: &str, pattern: &str, replacement: &str) -> SedResult<String> {
    Ok(Replacer::new(pattern, replacement, false)?.replace_str(original))
}

/// Like [`replace`], matching ASCII letters regardless of case
pub fn replace_ci(original: &str, pattern: &str, replacement: &str) -> SedResult<String> {
    Ok(Replacer::new(pattern, replacement, true)?.replace_str(original))
}
