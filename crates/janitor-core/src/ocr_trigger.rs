//! Decides whether the direct text layer is good enough or OCR is required.

use serde::Deserialize;

use crate::text_stats::{char_count, garbage_ratio, whitespace_ratio};

/// Thresholds for the OCR trigger.
#[derive(Debug, Clone, Deserialize)]
pub struct OcrTrigger {
    /// OCR when the average characters per page falls below this.
    pub min_chars_per_page: f64,
    /// OCR when more than this fraction of the raw text is whitespace.
    pub max_whitespace_ratio: f64,
    /// OCR when more than this fraction of characters is uncommon.
    pub max_garbage_ratio: f64,
}

impl Default for OcrTrigger {
    fn default() -> Self {
        Self {
            min_chars_per_page: 100.0,
            max_whitespace_ratio: 0.9,
            max_garbage_ratio: 0.3,
        }
    }
}

impl OcrTrigger {
    /// Returns the reason OCR is needed, or `None` when the direct text is usable.
    ///
    /// The checks run in a fixed order and the first that fires is reported.
    pub fn check(&self, text: &str, page_count: u32) -> Option<String> {
        if text.trim().is_empty() {
            return Some("empty text".to_string());
        }
        if page_count == 0 {
            return Some("no pages".to_string());
        }

        let per_page = char_count(text) as f64 / page_count as f64;
        if per_page < self.min_chars_per_page {
            return Some(format!(
                "low character density ({:.1} chars/page)",
                per_page
            ));
        }

        let ws = whitespace_ratio(text);
        if ws > self.max_whitespace_ratio {
            return Some(format!("whitespace ratio {:.2}", ws));
        }

        let garbage = garbage_ratio(text);
        if garbage > self.max_garbage_ratio {
            return Some(format!("garbage ratio {:.2}", garbage));
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trigger() -> OcrTrigger {
        OcrTrigger::default()
    }

    #[test]
    fn empty_and_whitespace_text_need_ocr() {
        assert_eq!(trigger().check("", 2).as_deref(), Some("empty text"));
        assert_eq!(trigger().check(" \n\t ", 2).as_deref(), Some("empty text"));
    }

    #[test]
    fn zero_pages_is_guarded() {
        let text = "x".repeat(500);
        assert_eq!(trigger().check(&text, 0).as_deref(), Some("no pages"));
    }

    #[test]
    fn sparse_pages_need_ocr() {
        let text = "a".repeat(150);
        let reason = trigger().check(&text, 2).unwrap();
        assert!(reason.starts_with("low character density"), "{}", reason);
        assert!(trigger().check(&text, 1).is_none());
    }

    #[test]
    fn mostly_whitespace_needs_ocr() {
        let text = format!("{}{}", "b".repeat(120), " ".repeat(1200));
        let reason = trigger().check(&text, 1).unwrap();
        assert!(reason.starts_with("whitespace ratio"), "{}", reason);
    }

    #[test]
    fn garbled_encoding_needs_ocr() {
        let text = format!("{}{}", "c".repeat(100), "\u{FFFD}".repeat(60));
        let reason = trigger().check(&text, 1).unwrap();
        assert!(reason.starts_with("garbage ratio"), "{}", reason);
    }

    #[test]
    fn healthy_text_layer_is_used_directly() {
        let text = "Invoice 2024-03 for cloud services, total 1580.00. ".repeat(10);
        assert!(trigger().check(&text, 2).is_none());
    }
}
