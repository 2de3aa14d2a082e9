//! SQLite-backed [`PreferenceStore`].
//!
//! Rules live in `preference_rules` keyed by `(rule_type, trigger_vendor,
//! trigger_doc_type)`; SQLite's default BINARY collation keeps the key match
//! exact and case-sensitive. Every transition is appended to
//! `preference_audit` in the same transaction as the rule write.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use janitor_core::models::{PreferenceRule, TriggerKey};
use janitor_core::preference::{PreferenceStore, RuleAction, RuleChange};

use crate::sqlite_cache::ts_to_datetime;

pub struct SqlitePreferenceStore {
    pool: SqlitePool,
}

impl SqlitePreferenceStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

const RULE_COLUMNS: &str = "rule_type, trigger_vendor, trigger_doc_type, value, confidence, \
     sample_count, conflict_streak, enabled, created_at, last_seen";

fn row_to_rule(row: &SqliteRow) -> PreferenceRule {
    let samples: i64 = row.get("sample_count");
    let streak: i64 = row.get("conflict_streak");
    let enabled: i64 = row.get("enabled");
    PreferenceRule {
        rule_type: row.get("rule_type"),
        trigger: TriggerKey::new(
            row.get::<String, _>("trigger_vendor"),
            row.get::<String, _>("trigger_doc_type"),
        ),
        value: row.get("value"),
        confidence: row.get("confidence"),
        sample_count: samples.max(0) as u32,
        conflict_streak: streak.max(0) as u32,
        enabled: enabled != 0,
        created_at: ts_to_datetime(row.get("created_at")),
        last_seen: ts_to_datetime(row.get("last_seen")),
    }
}

fn parse_action(s: &str) -> Result<RuleAction> {
    Ok(match s {
        "created" => RuleAction::Created,
        "reinforced" => RuleAction::Reinforced,
        "decayed" => RuleAction::Decayed,
        "replaced" => RuleAction::Replaced,
        "disabled" => RuleAction::Disabled,
        "enabled" => RuleAction::Enabled,
        other => anyhow::bail!("unknown preference audit action: {}", other),
    })
}

async fn insert_audit<'e, E>(executor: E, change: &RuleChange) -> Result<()>
where
    E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
{
    sqlx::query(
        r#"
        INSERT INTO preference_audit (rule_type, trigger_vendor, trigger_doc_type, action,
                                      old_value, new_value, old_confidence, new_confidence, at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&change.rule_type)
    .bind(&change.trigger.vendor)
    .bind(&change.trigger.doc_type)
    .bind(change.action.as_str())
    .bind(&change.old_value)
    .bind(&change.new_value)
    .bind(change.old_confidence)
    .bind(change.new_confidence)
    .bind(change.at.timestamp())
    .execute(executor)
    .await?;
    Ok(())
}

#[async_trait]
impl PreferenceStore for SqlitePreferenceStore {
    async fn get_rule(
        &self,
        rule_type: &str,
        trigger: &TriggerKey,
    ) -> Result<Option<PreferenceRule>> {
        let sql = format!(
            "SELECT {} FROM preference_rules
             WHERE rule_type = ? AND trigger_vendor = ? AND trigger_doc_type = ?",
            RULE_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(rule_type)
            .bind(&trigger.vendor)
            .bind(&trigger.doc_type)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(row_to_rule))
    }

    async fn save_rule(&self, rule: &PreferenceRule, change: &RuleChange) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO preference_rules (rule_type, trigger_vendor, trigger_doc_type, value,
                                          confidence, sample_count, conflict_streak, enabled,
                                          created_at, last_seen)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(rule_type, trigger_vendor, trigger_doc_type) DO UPDATE SET
                value = excluded.value,
                confidence = excluded.confidence,
                sample_count = excluded.sample_count,
                conflict_streak = excluded.conflict_streak,
                enabled = excluded.enabled,
                last_seen = excluded.last_seen
            "#,
        )
        .bind(&rule.rule_type)
        .bind(&rule.trigger.vendor)
        .bind(&rule.trigger.doc_type)
        .bind(&rule.value)
        .bind(rule.confidence)
        .bind(rule.sample_count as i64)
        .bind(rule.conflict_streak as i64)
        .bind(rule.enabled as i64)
        .bind(rule.created_at.timestamp())
        .bind(rule.last_seen.timestamp())
        .execute(&mut *tx)
        .await?;

        insert_audit(&mut *tx, change).await?;

        tx.commit().await?;
        Ok(())
    }

    async fn list_rules(
        &self,
        rule_type: Option<&str>,
        enabled_only: bool,
    ) -> Result<Vec<PreferenceRule>> {
        let sql = format!(
            "SELECT {} FROM preference_rules
             WHERE (?1 IS NULL OR rule_type = ?1) AND (?2 = 0 OR enabled = 1)
             ORDER BY confidence DESC, trigger_vendor, trigger_doc_type",
            RULE_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(rule_type)
            .bind(enabled_only as i64)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().map(row_to_rule).collect())
    }

    async fn set_enabled(
        &self,
        rule_type: &str,
        trigger: &TriggerKey,
        enabled: bool,
    ) -> Result<bool> {
        let mut tx = self.pool.begin().await?;

        let current: Option<(String, f64)> = sqlx::query_as(
            "SELECT value, confidence FROM preference_rules
             WHERE rule_type = ? AND trigger_vendor = ? AND trigger_doc_type = ?",
        )
        .bind(rule_type)
        .bind(&trigger.vendor)
        .bind(&trigger.doc_type)
        .fetch_optional(&mut *tx)
        .await?;

        let Some((value, confidence)) = current else {
            return Ok(false);
        };

        sqlx::query(
            "UPDATE preference_rules SET enabled = ?
             WHERE rule_type = ? AND trigger_vendor = ? AND trigger_doc_type = ?",
        )
        .bind(enabled as i64)
        .bind(rule_type)
        .bind(&trigger.vendor)
        .bind(&trigger.doc_type)
        .execute(&mut *tx)
        .await?;

        let change = RuleChange {
            rule_type: rule_type.to_string(),
            trigger: trigger.clone(),
            action: if enabled {
                RuleAction::Enabled
            } else {
                RuleAction::Disabled
            },
            old_value: Some(value.clone()),
            new_value: Some(value),
            old_confidence: Some(confidence),
            new_confidence: Some(confidence),
            at: Utc::now(),
        };
        insert_audit(&mut *tx, &change).await?;

        tx.commit().await?;
        Ok(true)
    }

    async fn history(&self, rule_type: &str, trigger: &TriggerKey) -> Result<Vec<RuleChange>> {
        let rows = sqlx::query(
            r#"
            SELECT action, old_value, new_value, old_confidence, new_confidence, at
            FROM preference_audit
            WHERE rule_type = ? AND trigger_vendor = ? AND trigger_doc_type = ?
            ORDER BY id ASC
            "#,
        )
        .bind(rule_type)
        .bind(&trigger.vendor)
        .bind(&trigger.doc_type)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                let action: String = row.get("action");
                Ok(RuleChange {
                    rule_type: rule_type.to_string(),
                    trigger: trigger.clone(),
                    action: parse_action(&action).context("corrupt preference_audit row")?,
                    old_value: row.get("old_value"),
                    new_value: row.get("new_value"),
                    old_confidence: row.get("old_confidence"),
                    new_confidence: row.get("new_confidence"),
                    at: ts_to_datetime(row.get("at")),
                })
            })
            .collect()
    }
}
