//! Preference learning engine.
//!
//! Wraps a [`PreferenceStore`] with the update protocol from
//! [`janitor_core::preference`]. Read-modify-write of one
//! `(rule_type, trigger)` rule happens under a per-key lock; updates to
//! different keys run concurrently.

use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;
use tracing::{debug, info};

use janitor_core::models::{ApprovalEvent, PreferenceRule, TriggerKey, RULE_VENDOR_FOLDER};
use janitor_core::preference::{
    apply_observation, recommended_value, PreferenceStore, RuleChange, DEFAULT_QUERY_CONFIDENCE,
};

use crate::locks::KeyedLocks;

pub struct PreferenceEngine {
    store: Arc<dyn PreferenceStore>,
    locks: KeyedLocks<(String, TriggerKey)>,
    min_confidence: f64,
}

impl PreferenceEngine {
    pub fn new(store: Arc<dyn PreferenceStore>) -> Self {
        Self {
            store,
            locks: KeyedLocks::new(),
            min_confidence: DEFAULT_QUERY_CONFIDENCE,
        }
    }

    /// Threshold used by [`Self::recommend`].
    pub fn with_min_confidence(mut self, min_confidence: f64) -> Self {
        self.min_confidence = min_confidence;
        self
    }

    /// Feeds one observation into the rule for `(rule_type, trigger)`.
    ///
    /// Unmodified approvals teach nothing and return `None`; otherwise the
    /// applied transition is returned.
    pub async fn update(
        &self,
        rule_type: &str,
        trigger: &TriggerKey,
        observed: &str,
        was_modified: bool,
    ) -> Result<Option<RuleChange>> {
        if !was_modified {
            debug!(rule_type, trigger = %trigger, "unmodified approval, nothing to learn");
            return Ok(None);
        }

        let _guard = self
            .locks
            .lock((rule_type.to_string(), trigger.clone()))
            .await;

        let current = self.store.get_rule(rule_type, trigger).await?;
        let (rule, change) =
            apply_observation(current.as_ref(), rule_type, trigger, observed, Utc::now());
        self.store.save_rule(&rule, &change).await?;

        info!(
            rule_type,
            trigger = %trigger,
            action = %change.action,
            value = %rule.value,
            confidence = rule.confidence,
            "preference updated"
        );
        Ok(Some(change))
    }

    /// Learns a vendor-folder preference from an approval.
    pub async fn learn(&self, event: &ApprovalEvent) -> Result<Option<RuleChange>> {
        self.learn_as(RULE_VENDOR_FOLDER, event).await
    }

    pub async fn learn_as(
        &self,
        rule_type: &str,
        event: &ApprovalEvent,
    ) -> Result<Option<RuleChange>> {
        self.update(
            rule_type,
            &event.trigger,
            &event.final_value,
            event.was_modified,
        )
        .await
    }

    /// The learned value for an exact `(rule_type, trigger)` match, if the
    /// rule is enabled and at least `min_confidence` confident.
    pub async fn query(
        &self,
        rule_type: &str,
        trigger: &TriggerKey,
        min_confidence: f64,
    ) -> Result<Option<String>> {
        let rule = self.store.get_rule(rule_type, trigger).await?;
        Ok(rule
            .as_ref()
            .and_then(|r| recommended_value(r, min_confidence))
            .map(str::to_string))
    }

    /// [`Self::query`] at the configured threshold.
    pub async fn recommend(&self, rule_type: &str, trigger: &TriggerKey) -> Result<Option<String>> {
        self.query(rule_type, trigger, self.min_confidence).await
    }

    pub async fn rule(&self, rule_type: &str, trigger: &TriggerKey) -> Result<Option<PreferenceRule>> {
        self.store.get_rule(rule_type, trigger).await
    }

    pub async fn list(&self, rule_type: Option<&str>, enabled_only: bool) -> Result<Vec<PreferenceRule>> {
        self.store.list_rules(rule_type, enabled_only).await
    }

    pub async fn history(&self, rule_type: &str, trigger: &TriggerKey) -> Result<Vec<RuleChange>> {
        self.store.history(rule_type, trigger).await
    }

    /// Operator switch. Returns `false` when the rule does not exist.
    pub async fn set_enabled(
        &self,
        rule_type: &str,
        trigger: &TriggerKey,
        enabled: bool,
    ) -> Result<bool> {
        let _guard = self
            .locks
            .lock((rule_type.to_string(), trigger.clone()))
            .await;
        let found = self.store.set_enabled(rule_type, trigger, enabled).await?;
        if found {
            info!(rule_type, trigger = %trigger, enabled, "preference rule switched");
        }
        Ok(found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use janitor_core::preference::memory::InMemoryPreferenceStore;
    use janitor_core::preference::RuleAction;

    fn engine() -> PreferenceEngine {
        PreferenceEngine::new(Arc::new(InMemoryPreferenceStore::new()))
    }

    fn key() -> TriggerKey {
        TriggerKey::new("V", "D")
    }

    #[tokio::test]
    async fn threshold_crossing_after_second_correction() {
        let engine = engine();
        engine.learn(&ApprovalEvent::new(key(), "Inbox", "F1")).await.unwrap();
        assert_eq!(engine.query(RULE_VENDOR_FOLDER, &key(), 0.7).await.unwrap(), None);

        engine.learn(&ApprovalEvent::new(key(), "Inbox", "F1")).await.unwrap();
        assert_eq!(
            engine.query(RULE_VENDOR_FOLDER, &key(), 0.7).await.unwrap().as_deref(),
            Some("F1")
        );
        assert_eq!(
            engine.recommend(RULE_VENDOR_FOLDER, &key()).await.unwrap().as_deref(),
            Some("F1")
        );
    }

    #[tokio::test]
    async fn unmodified_approvals_do_not_teach() {
        let engine = engine();
        let change = engine.learn(&ApprovalEvent::new(key(), "F1", "F1")).await.unwrap();
        assert!(change.is_none());
        assert!(engine.rule(RULE_VENDOR_FOLDER, &key()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn three_conflicts_flip_the_rule() {
        let engine = engine();
        for _ in 0..3 {
            engine.update(RULE_VENDOR_FOLDER, &key(), "F1", true).await.unwrap();
        }
        let mut last = None;
        for _ in 0..3 {
            last = engine.update(RULE_VENDOR_FOLDER, &key(), "F2", true).await.unwrap();
        }
        assert_eq!(last.unwrap().action, RuleAction::Replaced);

        let rule = engine.rule(RULE_VENDOR_FOLDER, &key()).await.unwrap().unwrap();
        assert_eq!(rule.value, "F2");
        assert_eq!(rule.confidence, 0.6);
        assert_eq!(rule.sample_count, 1);
        assert_eq!(rule.conflict_streak, 0);
    }

    #[tokio::test]
    async fn query_is_exact_match() {
        let engine = engine();
        for _ in 0..2 {
            engine.update(RULE_VENDOR_FOLDER, &key(), "F1", true).await.unwrap();
        }
        let other_case = TriggerKey::new("v", "D");
        assert_eq!(engine.query(RULE_VENDOR_FOLDER, &other_case, 0.1).await.unwrap(), None);
        assert_eq!(engine.query("naming_template", &key(), 0.1).await.unwrap(), None);
    }

    #[tokio::test]
    async fn disabled_rules_are_not_recommended() {
        let engine = engine();
        for _ in 0..3 {
            engine.update(RULE_VENDOR_FOLDER, &key(), "F1", true).await.unwrap();
        }
        assert!(engine.set_enabled(RULE_VENDOR_FOLDER, &key(), false).await.unwrap());
        assert_eq!(engine.query(RULE_VENDOR_FOLDER, &key(), 0.1).await.unwrap(), None);
        assert!(engine.set_enabled(RULE_VENDOR_FOLDER, &key(), true).await.unwrap());
        assert_eq!(
            engine.query(RULE_VENDOR_FOLDER, &key(), 0.1).await.unwrap().as_deref(),
            Some("F1")
        );
        assert!(!engine
            .set_enabled(RULE_VENDOR_FOLDER, &TriggerKey::new("X", "Y"), false)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn concurrent_updates_to_one_key_are_all_counted() {
        let engine = Arc::new(engine());
        let mut handles = Vec::new();
        for _ in 0..10 {
            let engine = engine.clone();
            handles.push(tokio::spawn(async move {
                engine.update(RULE_VENDOR_FOLDER, &key(), "F1", true).await.unwrap();
            }));
        }
        for h in handles {
            h.await.unwrap();
        }
        let rule = engine.rule(RULE_VENDOR_FOLDER, &key()).await.unwrap().unwrap();
        assert_eq!(rule.sample_count, 10);
        assert_eq!(rule.confidence, 1.0);
        assert_eq!(
            engine.history(RULE_VENDOR_FOLDER, &key()).await.unwrap().len(),
            10
        );
    }
}
