//! Small helpers shared by the workers

const ELLIPSIS: &str = "...";

/// Shorten `s` to at most `max_len` bytes for log output, marking the cut
/// with an ellipsis. Never splits a UTF-8 sequence.
pub fn truncate_str(s: &str, max_len: usize) -> String {
    if s.len() <= max_len {
        return s.to_string();
    }
    let budget = max_len.saturating_sub(ELLIPSIS.len());
    let end = s
        .char_indices()
        .map(|(i, c)| i + c.len_utf8())
        .take_while(|&next| next <= budget)
        .last()
        .unwrap_or(0);
    format!("{}{}", &s[..end], ELLIPSIS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_keeps_short_strings() {
        assert_eq!(truncate_str("short", 10), "short");
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        assert_eq!(truncate_str("abcdefghij", 8), "abcde...");
        // Hebrew letters are two bytes each
        assert_eq!(truncate_str("שלום עולם", 8), "של...");
    }
}
