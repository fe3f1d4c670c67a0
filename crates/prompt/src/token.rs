//! Token estimation used when the server cannot count.
//!
//! Heuristic: 1 token ≈ 4 characters, rounded up. Characters, not bytes:
//! Japanese text is three bytes per character in UTF-8.

/// Estimate the token count for a string.
pub fn estimate_tokens(text: &str) -> u32 {
    let chars = text.chars().count();
    u32::try_from(chars.div_ceil(4)).unwrap_or(u32::MAX)
}
