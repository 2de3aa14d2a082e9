//! Character-level statistics over extracted text.
//!
//! Shared by the OCR trigger heuristic and the quality scorer so both agree
//! on what counts as a "common" character.

/// Punctuation that regularly appears in clean business documents.
const COMMON_PUNCTUATION: &str = ",.!?;:'\"()[]{}-，。！？；：、“”‘’（）【】《》";

/// Letters (any script, including CJK), digits, whitespace and common punctuation.
pub fn is_common_char(c: char) -> bool {
    c.is_alphanumeric() || c.is_whitespace() || COMMON_PUNCTUATION.contains(c)
}

/// Number of characters after trimming surrounding whitespace.
pub fn char_count(text: &str) -> usize {
    text.trim().chars().count()
}

/// Fraction of characters in `text` that are whitespace. `0.0` for empty input.
pub fn whitespace_ratio(text: &str) -> f64 {
    let total = text.chars().count();
    if total == 0 {
        return 0.0;
    }
    let ws = text.chars().filter(|c| c.is_whitespace()).count();
    ws as f64 / total as f64
}

/// Fraction of non-common characters in the trimmed text.
///
/// Empty or whitespace-only text has nothing usable in it and scores `1.0`.
pub fn garbage_ratio(text: &str) -> f64 {
    let trimmed = text.trim();
    let total = trimmed.chars().count();
    if total == 0 {
        return 1.0;
    }
    let common = trimmed.chars().filter(|c| is_common_char(*c)).count();
    1.0 - common as f64 / total as f64
}
