//! In-memory [`PreferenceStore`] for testing.

use std::collections::HashMap;
use std::sync::RwLock;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::Utc;

use super::{PreferenceStore, RuleAction, RuleChange};
use crate::models::{PreferenceRule, TriggerKey};

type RuleKey = (String, TriggerKey);

#[derive(Default)]
struct Tables {
    rules: HashMap<RuleKey, PreferenceRule>,
    audit: Vec<RuleChange>,
}

#[derive(Default)]
pub struct InMemoryPreferenceStore {
    tables: RwLock<Tables>,
}

impl InMemoryPreferenceStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned<T>(_: T) -> anyhow::Error {
    anyhow!("preference store lock poisoned")
}

#[async_trait]
impl PreferenceStore for InMemoryPreferenceStore {
    async fn get_rule(
        &self,
        rule_type: &str,
        trigger: &TriggerKey,
    ) -> Result<Option<PreferenceRule>> {
        let tables = self.tables.read().map_err(poisoned)?;
        Ok(tables
            .rules
            .get(&(rule_type.to_string(), trigger.clone()))
            .cloned())
    }

    async fn save_rule(&self, rule: &PreferenceRule, change: &RuleChange) -> Result<()> {
        let mut tables = self.tables.write().map_err(poisoned)?;
        tables.rules.insert(
            (rule.rule_type.clone(), rule.trigger.clone()),
            rule.clone(),
        );
        tables.audit.push(change.clone());
        Ok(())
    }

    async fn list_rules(
        &self,
        rule_type: Option<&str>,
        enabled_only: bool,
    ) -> Result<Vec<PreferenceRule>> {
        let tables = self.tables.read().map_err(poisoned)?;
        let mut rules: Vec<PreferenceRule> = tables
            .rules
            .values()
            .filter(|r| rule_type.map_or(true, |t| r.rule_type == t))
            .filter(|r| !enabled_only || r.enabled)
            .cloned()
            .collect();
        rules.sort_by(|a, b| {
            b.confidence
                .partial_cmp(&a.confidence)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        Ok(rules)
    }

    async fn set_enabled(
        &self,
        rule_type: &str,
        trigger: &TriggerKey,
        enabled: bool,
    ) -> Result<bool> {
        let mut tables = self.tables.write().map_err(poisoned)?;
        let Some(rule) = tables
            .rules
            .get_mut(&(rule_type.to_string(), trigger.clone()))
        else {
            return Ok(false);
        };
        rule.enabled = enabled;
        let change = RuleChange {
            rule_type: rule_type.to_string(),
            trigger: trigger.clone(),
            action: if enabled {
                RuleAction::Enabled
            } else {
                RuleAction::Disabled
            },
            old_value: Some(rule.value.clone()),
            new_value: Some(rule.value.clone()),
            old_confidence: Some(rule.confidence),
            new_confidence: Some(rule.confidence),
            at: Utc::now(),
        };
        tables.audit.push(change);
        Ok(true)
    }

    async fn history(&self, rule_type: &str, trigger: &TriggerKey) -> Result<Vec<RuleChange>> {
        let tables = self.tables.read().map_err(poisoned)?;
        Ok(tables
            .audit
            .iter()
            .filter(|c| c.rule_type == rule_type && &c.trigger == trigger)
            .cloned()
            .collect())
    }
}
