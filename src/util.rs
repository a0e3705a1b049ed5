//! Shared utility functions

/// Truncate a string to at most `max_chars` characters, respecting UTF-8
/// boundaries.
///
/// Returns the string unchanged when it is already short enough. Character
/// counting (not byte counting) keeps the cut point stable for multi-byte
/// content such as CJK transcripts.
pub fn truncate_chars(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shorter_than_max_is_unchanged() {
        assert_eq!(truncate_chars("hello", 10), "hello");
    }

    #[test]
    fn truncates_ascii() {
        assert_eq!(truncate_chars("hello world", 5), "hello");
    }

    #[test]
    fn truncates_at_char_boundary() {
        // Each character is 3 bytes; counting is per character, not per byte
        assert_eq!(truncate_chars("日本語", 2), "日本");
        assert_eq!(truncate_chars("日本語", 3), "日本語");
    }

    #[test]
    fn empty_and_zero() {
        assert_eq!(truncate_chars("", 5), "");
        assert_eq!(truncate_chars("hello", 0), "");
    }
}
