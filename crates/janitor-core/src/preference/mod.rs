//! Preference learning: the per-rule state machine and its storage trait.
//!
//! Only human corrections teach. For a `(rule_type, trigger)` pair:
//!
//! | State | Observation | Effect |
//! |-------|-------------|--------|
//! | no rule | any | create at confidence 0.6 |
//! | rule | same value | confidence +0.1 (max 1.0), samples +1, streak reset |
//! | rule | other value | confidence −0.15 (min 0.1), streak +1 |
//! | rule, streak reaches 3 | other value | value replaced, confidence 0.6, samples 1 |
//!
//! The state machine is pure ([`apply_observation`]); serialization of
//! concurrent updates to one key is the caller's job.

pub mod memory;

use std::fmt;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{PreferenceRule, TriggerKey};

pub const INITIAL_CONFIDENCE: f64 = 0.6;
pub const REINFORCE_STEP: f64 = 0.1;
pub const CONFLICT_PENALTY: f64 = 0.15;
pub const MIN_CONFIDENCE: f64 = 0.1;
pub const MAX_CONFIDENCE: f64 = 1.0;
/// Consecutive conflicting observations after which the rule flips.
pub const CONFLICT_FLIP_STREAK: u32 = 3;
/// Default threshold a plan builder uses when querying.
pub const DEFAULT_QUERY_CONFIDENCE: f64 = 0.7;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleAction {
    Created,
    Reinforced,
    Decayed,
    Replaced,
    Disabled,
    Enabled,
}

impl RuleAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            RuleAction::Created => "created",
            RuleAction::Reinforced => "reinforced",
            RuleAction::Decayed => "decayed",
            RuleAction::Replaced => "replaced",
            RuleAction::Disabled => "disabled",
            RuleAction::Enabled => "enabled",
        }
    }
}

impl fmt::Display for RuleAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Audit record of one rule transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleChange {
    pub rule_type: String,
    pub trigger: TriggerKey,
    pub action: RuleAction,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
    pub old_confidence: Option<f64>,
    pub new_confidence: Option<f64>,
    pub at: DateTime<Utc>,
}

/// Keeps confidence arithmetic on a 0.01 grid so threshold checks like
/// `0.6 + 0.1 >= 0.7` hold exactly.
fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

/// Applies one corrective observation to the current rule (if any).
///
/// Returns the new rule state and the audit record describing the transition.
pub fn apply_observation(
    current: Option<&PreferenceRule>,
    rule_type: &str,
    trigger: &TriggerKey,
    observed: &str,
    now: DateTime<Utc>,
) -> (PreferenceRule, RuleChange) {
    let Some(rule) = current else {
        let rule = PreferenceRule {
            rule_type: rule_type.to_string(),
            trigger: trigger.clone(),
            value: observed.to_string(),
            confidence: INITIAL_CONFIDENCE,
            sample_count: 1,
            conflict_streak: 0,
            enabled: true,
            created_at: now,
            last_seen: now,
        };
        let change = RuleChange {
            rule_type: rule_type.to_string(),
            trigger: trigger.clone(),
            action: RuleAction::Created,
            old_value: None,
            new_value: Some(rule.value.clone()),
            old_confidence: None,
            new_confidence: Some(rule.confidence),
            at: now,
        };
        return (rule, change);
    };

    let mut next = rule.clone();
    next.last_seen = now;

    let action = if rule.value == observed {
        next.confidence = round2((rule.confidence + REINFORCE_STEP).min(MAX_CONFIDENCE));
        next.sample_count += 1;
        next.conflict_streak = 0;
        RuleAction::Reinforced
    } else {
        next.confidence = round2((rule.confidence - CONFLICT_PENALTY).max(MIN_CONFIDENCE));
        next.conflict_streak += 1;
        if next.conflict_streak >= CONFLICT_FLIP_STREAK {
            next.value = observed.to_string();
            next.confidence = INITIAL_CONFIDENCE;
            next.sample_count = 1;
            next.conflict_streak = 0;
            RuleAction::Replaced
        } else {
            RuleAction::Decayed
        }
    };

    let change = RuleChange {
        rule_type: rule.rule_type.clone(),
        trigger: rule.trigger.clone(),
        action,
        old_value: Some(rule.value.clone()),
        new_value: Some(next.value.clone()),
        old_confidence: Some(rule.confidence),
        new_confidence: Some(next.confidence),
        at: now,
    };
    (next, change)
}

/// The value a rule recommends, if it is enabled and confident enough.
pub fn recommended_value(rule: &PreferenceRule, min_confidence: f64) -> Option<&str> {
    if rule.enabled && rule.confidence >= min_confidence {
        Some(rule.value.as_str())
    } else {
        None
    }
}

/// Persistent table of preference rules keyed by `(rule_type, trigger)`.
#[async_trait]
pub trait PreferenceStore: Send + Sync {
    async fn get_rule(&self, rule_type: &str, trigger: &TriggerKey)
        -> Result<Option<PreferenceRule>>;

    /// Upserts `rule` and appends `change` to the audit trail in one step.
    async fn save_rule(&self, rule: &PreferenceRule, change: &RuleChange) -> Result<()>;

    /// Rules ordered by descending confidence.
    async fn list_rules(
        &self,
        rule_type: Option<&str>,
        enabled_only: bool,
    ) -> Result<Vec<PreferenceRule>>;

    /// Operator switch for a rule. Returns `false` if no such rule exists.
    ///
    /// Rules are never deleted; a disabled rule keeps learning but is not
    /// recommended.
    async fn set_enabled(&self, rule_type: &str, trigger: &TriggerKey, enabled: bool)
        -> Result<bool>;

    /// Oldest-first audit trail for one rule.
    async fn history(&self, rule_type: &str, trigger: &TriggerKey) -> Result<Vec<RuleChange>>;
}
