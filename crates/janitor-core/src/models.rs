//! Core data models shared by the extraction, caching and learning layers.
//!
//! Every record here is created once per pipeline stage and handed on by
//! value or shared reference; nothing is mutated in place after construction
//! except [`PreferenceRule`], which is owned by the preference store.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// How the text of an [`ExtractionResult`] was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionMethod {
    /// Baseline text layer was good enough; no OCR engine was invoked.
    Direct,
    /// Local OCR engine output.
    LocalOcr,
    /// Remote vision model output.
    RemoteVision,
    /// Local OCR output served from the extraction cache.
    LocalOcrCached,
    /// Remote vision output served from the extraction cache.
    RemoteVisionCached,
    /// OCR was wanted but unavailable or failed; the (possibly poor) direct text is used.
    DirectFallback,
}

impl ExtractionMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExtractionMethod::Direct => "direct",
            ExtractionMethod::LocalOcr => "local_ocr",
            ExtractionMethod::RemoteVision => "remote_vision",
            ExtractionMethod::LocalOcrCached => "local_ocr_cached",
            ExtractionMethod::RemoteVisionCached => "remote_vision_cached",
            ExtractionMethod::DirectFallback => "direct_fallback",
        }
    }

    /// True when an OCR engine produced the text (fresh or cached).
    pub fn uses_ocr_engine(&self) -> bool {
        !matches!(
            self,
            ExtractionMethod::Direct | ExtractionMethod::DirectFallback
        )
    }

    pub fn is_cached(&self) -> bool {
        matches!(
            self,
            ExtractionMethod::LocalOcrCached | ExtractionMethod::RemoteVisionCached
        )
    }

    /// The `*Cached` variant reported when a result is served from cache.
    ///
    /// Methods that are never cached map to themselves.
    pub fn cached(self) -> Self {
        match self {
            ExtractionMethod::LocalOcr => ExtractionMethod::LocalOcrCached,
            ExtractionMethod::RemoteVision => ExtractionMethod::RemoteVisionCached,
            other => other,
        }
    }

    /// Strips the `*Cached` suffix, giving the engine family.
    pub fn family(self) -> Self {
        match self {
            ExtractionMethod::LocalOcrCached => ExtractionMethod::LocalOcr,
            ExtractionMethod::RemoteVisionCached => ExtractionMethod::RemoteVision,
            other => other,
        }
    }
}

impl fmt::Display for ExtractionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown extraction method: {0}")]
pub struct UnknownMethod(pub String);

impl FromStr for ExtractionMethod {
    type Err = UnknownMethod;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "direct" => Ok(ExtractionMethod::Direct),
            "local_ocr" => Ok(ExtractionMethod::LocalOcr),
            "remote_vision" => Ok(ExtractionMethod::RemoteVision),
            "local_ocr_cached" => Ok(ExtractionMethod::LocalOcrCached),
            "remote_vision_cached" => Ok(ExtractionMethod::RemoteVisionCached),
            "direct_fallback" => Ok(ExtractionMethod::DirectFallback),
            other => Err(UnknownMethod(other.to_string())),
        }
    }
}

/// Output of one pass of the extraction selector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionResult {
    pub text: String,
    pub method: ExtractionMethod,
    /// Engine-reported confidence in `[0, 1]`.
    pub engine_confidence: f64,
    /// Deterministic quality score in `[0, 100]`.
    pub quality_score: u8,
    pub needs_review: bool,
    pub page_count: u32,
    pub char_count: usize,
    pub processing_time_ms: u64,
    /// Why OCR was triggered, when it was.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ocr_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// A cached extraction, keyed by file fingerprint.
///
/// Entries are never mutated; a new `set` replaces the row wholesale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub fingerprint: String,
    pub text: String,
    pub method: ExtractionMethod,
    pub engine_confidence: f64,
    pub quality_score: u8,
    pub page_count: u32,
    pub created_at: DateTime<Utc>,
}

impl CacheEntry {
    pub fn from_result(fingerprint: &str, result: &ExtractionResult) -> Self {
        Self {
            fingerprint: fingerprint.to_string(),
            text: result.text.clone(),
            method: result.method.family(),
            engine_confidence: result.engine_confidence,
            quality_score: result.quality_score,
            page_count: result.page_count,
            created_at: Utc::now(),
        }
    }
}

/// Composite identity a preference rule is indexed by.
///
/// Comparison is exact and case-sensitive: `"ACME"` and `"Acme"` are different
/// vendors.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TriggerKey {
    pub vendor: String,
    pub doc_type: String,
}

impl TriggerKey {
    pub fn new(vendor: impl Into<String>, doc_type: impl Into<String>) -> Self {
        Self {
            vendor: vendor.into(),
            doc_type: doc_type.into(),
        }
    }
}

impl fmt::Display for TriggerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}+{}", self.vendor, self.doc_type)
    }
}

/// Rule type for vendor/doc-type → destination folder preferences.
pub const RULE_VENDOR_FOLDER: &str = "vendor_folder";

/// A learned routing preference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreferenceRule {
    pub rule_type: String,
    pub trigger: TriggerKey,
    /// Target value, e.g. a destination folder relative to the archive root.
    pub value: String,
    /// Always within `[0.1, 1.0]`.
    pub confidence: f64,
    pub sample_count: u32,
    pub conflict_streak: u32,
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

/// A human decision on a proposed plan, fed back into the learning engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApprovalEvent {
    pub trigger: TriggerKey,
    pub suggested_value: String,
    pub final_value: String,
    pub was_modified: bool,
    pub timestamp: DateTime<Utc>,
}

impl ApprovalEvent {
    /// Builds an event, deriving `was_modified` from the two values.
    pub fn new(
        trigger: TriggerKey,
        suggested_value: impl Into<String>,
        final_value: impl Into<String>,
    ) -> Self {
        let suggested_value = suggested_value.into();
        let final_value = final_value.into();
        Self {
            was_modified: suggested_value != final_value,
            trigger,
            suggested_value,
            final_value,
            timestamp: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn method_round_trips_through_str() {
        for m in [
            ExtractionMethod::Direct,
            ExtractionMethod::LocalOcr,
            ExtractionMethod::RemoteVision,
            ExtractionMethod::LocalOcrCached,
            ExtractionMethod::RemoteVisionCached,
            ExtractionMethod::DirectFallback,
        ] {
            assert_eq!(m.as_str().parse::<ExtractionMethod>().unwrap(), m);
        }
        assert!("rapidocr".parse::<ExtractionMethod>().is_err());
    }

    #[test]
    fn cached_variant_only_for_engine_methods() {
        assert_eq!(
            ExtractionMethod::LocalOcr.cached(),
            ExtractionMethod::LocalOcrCached
        );
        assert_eq!(
            ExtractionMethod::RemoteVision.cached(),
            ExtractionMethod::RemoteVisionCached
        );
        assert_eq!(ExtractionMethod::Direct.cached(), ExtractionMethod::Direct);
        assert_eq!(
            ExtractionMethod::RemoteVisionCached.family(),
            ExtractionMethod::RemoteVision
        );
        assert!(!ExtractionMethod::DirectFallback.uses_ocr_engine());
        assert!(ExtractionMethod::LocalOcrCached.uses_ocr_engine());
    }

    #[test]
    fn approval_event_derives_modified_flag() {
        let key = TriggerKey::new("ACME", "invoice");
        assert!(!ApprovalEvent::new(key.clone(), "Finance/2024", "Finance/2024").was_modified);
        assert!(ApprovalEvent::new(key, "Finance/2024", "Vendors/ACME").was_modified);
    }
}
