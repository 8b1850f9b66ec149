//! Character-count token heuristics
//!
//! A placeholder approximation (about 4 characters per token for English
//! text). Used only for pre-flight cost estimates and for streams whose
//! vendor did not report usage.

use crate::domain::llm::Usage;

pub const CHARS_PER_TOKEN: usize = 4;

/// Estimated token count for `chars` characters
pub fn estimate_tokens(chars: usize) -> u32 {
    u32::try_from(chars / CHARS_PER_TOKEN).unwrap_or(u32::MAX)
}

/// Estimated usage for a finished stream
///
/// Each side counts at least one token so an estimated stream is never
/// reported as free.
pub fn estimate_usage(input_chars: usize, output_chars: usize) -> Usage {
    let input = estimate_tokens(input_chars).max(1);
    let output = estimate_tokens(output_chars).max(1);
    Usage::new(input, output)
}

/// Pre-flight output guess: half the prompt, capped by the token budget
pub fn estimate_output_tokens(input_tokens: u32, max_tokens: u32) -> u32 {
    max_tokens.min(input_tokens / 2)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_estimate_tokens() {
        assert_eq!(estimate_tokens(0), 0);
        assert_eq!(estimate_tokens(3), 0);
        assert_eq!(estimate_tokens(4), 1);
        assert_eq!(estimate_tokens(41), 10);
    }

    #[test]
    fn test_estimate_usage_has_floor_of_one() {
        let usage = estimate_usage(0, 2);
        assert_eq!(usage.input_tokens, 1);
        assert_eq!(usage.output_tokens, 1);
        assert_eq!(usage.total_tokens, 2);

        let usage = estimate_usage(400, 80);
        assert_eq!(usage, Usage::new(100, 20));
    }

    #[test]
    fn test_estimate_output_tokens() {
        assert_eq!(estimate_output_tokens(100, 1000), 50);
        assert_eq!(estimate_output_tokens(100, 10), 10);
        assert_eq!(estimate_output_tokens(1, 1000), 0);
    }
}
