//! Quality circuit breaker in front of auto-approval.
//!
//! Low-quality extractions always go to a human, whatever the caller asked for.

use serde::Serialize;

use crate::models::ExtractionResult;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GateDecision {
    pub effective_auto_approve: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Forces review when the extraction needs it; otherwise passes `requested_auto_approve` through.
pub fn gate(result: &ExtractionResult, requested_auto_approve: bool) -> GateDecision {
    if result.needs_review {
        return GateDecision {
            effective_auto_approve: false,
            reason: Some(format!(
                "low extraction quality (score={})",
                result.quality_score
            )),
        };
    }
    GateDecision {
        effective_auto_approve: requested_auto_approve,
        reason: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ExtractionMethod;

    fn result(score: u8, needs_review: bool) -> ExtractionResult {
        ExtractionResult {
            text: "scanned".to_string(),
            method: ExtractionMethod::LocalOcr,
            engine_confidence: 0.4,
            quality_score: score,
            needs_review,
            page_count: 1,
            char_count: 7,
            processing_time_ms: 12,
            ocr_reason: None,
            error: None,
        }
    }

    #[test]
    fn review_overrides_requested_auto_approve() {
        let d = gate(&result(20, true), true);
        assert!(!d.effective_auto_approve);
        assert_eq!(d.reason.as_deref(), Some("low extraction quality (score=20)"));
    }

    #[test]
    fn good_quality_passes_request_through() {
        assert_eq!(
            gate(&result(95, false), true),
            GateDecision {
                effective_auto_approve: true,
                reason: None
            }
        );
        assert!(!gate(&result(95, false), false).effective_auto_approve);
    }

    #[test]
    fn review_without_auto_approve_still_has_reason() {
        let d = gate(&result(10, true), false);
        assert!(!d.effective_auto_approve);
        assert!(d.reason.is_some());
    }
}
