//! Token estimation.
//!
//! The context loader measures everything through [`TokenEstimator`] so a
//! real tokenizer can replace the character heuristic without touching the
//! budget algorithm.

/// Approximate characters-per-token ratio for English prose.
pub const CHARS_PER_TOKEN: usize = 4;

/// Estimates and enforces token counts for text.
pub trait TokenEstimator: Send + Sync {
    /// Estimated token count of `text`.
    fn estimate(&self, text: &str) -> usize;

    /// Longest prefix of `text` whose estimate does not exceed `max_tokens`.
    fn truncate<'a>(&self, text: &'a str, max_tokens: usize) -> &'a str;
}

/// `chars / 4` heuristic.
///
/// Counts characters rather than bytes so multi-byte text is not
/// over-counted.
#[derive(Debug, Clone, Copy, Default)]
pub struct CharRatioEstimator;

impl TokenEstimator for CharRatioEstimator {
    fn estimate(&self, text: &str) -> usize {
        text.chars().count() / CHARS_PER_TOKEN
    }

    fn truncate<'a>(&self, text: &'a str, max_tokens: usize) -> &'a str {
        let max_chars = max_tokens.saturating_mul(CHARS_PER_TOKEN);
        match text.char_indices().nth(max_chars) {
            Some((byte_idx, _)) => &text[..byte_idx],
            None => text,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_estimate_floor_division() {
        let e = CharRatioEstimator;
        assert_eq!(e.estimate(""), 0);
        assert_eq!(e.estimate("abc"), 0);
        assert_eq!(e.estimate("abcd"), 1);
        assert_eq!(e.estimate(&"x".repeat(2403)), 600);
    }

    #[test]
    fn test_estimate_counts_chars_not_bytes() {
        let e = CharRatioEstimator;
        assert_eq!(e.estimate("éééé"), 1);
    }

    #[test]
    fn test_truncate_prefix() {
        let e = CharRatioEstimator;
        let text = "x".repeat(100);
        assert_eq!(e.truncate(&text, 10).len(), 40);
        assert_eq!(e.truncate(&text, 1000), text.as_str());
        assert_eq!(e.truncate(&text, 0), "");
    }

    #[test]
    fn test_truncate_multibyte_boundary() {
        let e = CharRatioEstimator;
        let text = "ü".repeat(10);
        let cut = e.truncate(&text, 1);
        assert_eq!(cut.chars().count(), 4);
    }
}
