//! ASCII-only case folding used for case-insensitive matching.
//!
//! Only `A..=Z` are mapped. Multi-byte sequences and every other byte pass
//! through unchanged, so a folded buffer has the same length and the same
//! byte offsets as its input.

/// Lowercases the ASCII letters of `s`
pub fn fold(s: &str) -> String {
    s.to_ascii_lowercase()
}

/// Byte-level counterpart of [`fold`]
pub fn fold_bytes(bytes: &[u8]) -> Vec<u8> {
    bytes.to_ascii_lowercase()
}
