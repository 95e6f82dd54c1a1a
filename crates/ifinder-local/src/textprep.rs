//! Deterministic keyword normalization for permissive filter matching.

use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Lossy matching key: NFD, diacritics dropped, lowercase, non-alphanumerics as single spaces.
///
/// Used only for comparing user-supplied filter words against keyword tables, never for display.
pub fn scrub(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut last_space = true;
    for ch in s.nfd() {
        if is_combining_mark(ch) {
            continue;
        }
        if ch.is_alphanumeric() {
            for lc in ch.to_lowercase() {
                out.push(lc);
            }
            last_space = false;
        } else if !last_space {
            out.push(' ');
            last_space = true;
        }
    }
    out.trim_end().to_string()
}

/// Whether any of `needles` occurs in the scrubbed form of `haystack`.
pub fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    let h = scrub(haystack);
    needles.iter().any(|n| h.contains(n))
}
