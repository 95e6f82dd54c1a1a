//! Bounded-text helpers shared by every strategy.

/// Truncate to at most `max_chars` Unicode scalar values.
///
/// Returns the (possibly shortened) text and whether anything was cut. Cutting on `char`
/// boundaries means a multibyte code point is never split, and applying the same cap twice is
/// a no-op.
pub fn truncate_chars(s: &str, max_chars: usize) -> (String, bool) {
    match s.char_indices().nth(max_chars) {
        Some((byte, _)) => (s[..byte].to_string(), true),
        None => (s.to_string(), false),
    }
}

/// Collapse runs of whitespace into single spaces and trim the ends.
pub fn norm_ws(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Whitespace-normalized snippet of at most `max_chars`, ending in `...` when shortened.
pub fn clip_with_ellipsis(s: &str, max_chars: usize) -> String {
    let s = norm_ws(s);
    if s.chars().count() <= max_chars {
        return s;
    }
    let keep = max_chars.saturating_sub(3);
    let (head, _) = truncate_chars(&s, keep);
    format!("{}...", head.trim_end())
}
