//! Deterministic quality scoring of extracted text.
//!
//! The score starts at 100 and each band below subtracts independently:
//!
//! | Signal | Band | Deduction |
//! |--------|------|-----------|
//! | length (trimmed chars) | `< 50` | 30 |
//! | | `< 100` | 15 |
//! | garbage ratio | `> 0.5` | 50 |
//! | | `> 0.3` | 30 |
//! | | `> 0.1` | 10 |
//! | engine confidence | `< 0.5` | 20 |
//! | | `< 0.7` | 10 |
//!
//! The result is clamped to `[0, 100]`; anything under [`REVIEW_THRESHOLD`]
//! must be seen by a human.

use serde::Serialize;

use crate::text_stats::{char_count, garbage_ratio};

/// Scores strictly below this value require human review.
pub const REVIEW_THRESHOLD: u8 = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Quality {
    pub score: u8,
    pub needs_review: bool,
}

impl Quality {
    pub fn from_score(score: u8) -> Self {
        Self {
            score,
            needs_review: score < REVIEW_THRESHOLD,
        }
    }
}

/// Scores `text` given the confidence reported by the engine that produced it.
pub fn score(text: &str, engine_confidence: f64) -> Quality {
    let mut score: i32 = 100;

    let len = char_count(text);
    if len < 50 {
        score -= 30;
    } else if len < 100 {
        score -= 15;
    }

    let garbage = garbage_ratio(text);
    if garbage > 0.5 {
        score -= 50;
    } else if garbage > 0.3 {
        score -= 30;
    } else if garbage > 0.1 {
        score -= 10;
    }

    if engine_confidence < 0.5 {
        score -= 20;
    } else if engine_confidence < 0.7 {
        score -= 10;
    }

    Quality::from_score(score.clamp(0, 100) as u8)
}
