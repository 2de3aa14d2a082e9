//! `janitor prefs ...`: inspect, query, teach and switch preference rules.

use std::sync::Arc;

use anyhow::{bail, Result};
use sqlx::SqlitePool;

use janitor_core::models::{ApprovalEvent, TriggerKey};

use crate::config::Config;
use crate::db;
use crate::learning::PreferenceEngine;
use crate::sqlite_preferences::SqlitePreferenceStore;

pub async fn open_engine(config: &Config) -> Result<(SqlitePool, PreferenceEngine)> {
    let pool = db::connect_migrated(config).await?;
    let store = Arc::new(SqlitePreferenceStore::new(pool.clone()));
    let engine = PreferenceEngine::new(store).with_min_confidence(config.learning.min_confidence);
    Ok((pool, engine))
}

pub async fn run_prefs_list(config: &Config, rule_type: Option<&str>, all: bool) -> Result<()> {
    let (pool, engine) = open_engine(config).await?;
    let rules = engine.list(rule_type, !all).await?;
    pool.close().await;

    if rules.is_empty() {
        println!("No preference rules.");
        return Ok(());
    }

    println!(
        "{:<16} {:<20} {:<14} {:>5} {:>7} {:>6}  {}",
        "TYPE", "VENDOR", "DOC TYPE", "CONF", "SAMPLES", "STATE", "VALUE"
    );
    for r in &rules {
        let state = if !r.enabled {
            "off"
        } else if r.confidence >= config.learning.min_confidence {
            "live"
        } else {
            "learn"
        };
        println!(
            "{:<16} {:<20} {:<14} {:>5.2} {:>7} {:>6}  {}",
            r.rule_type, r.trigger.vendor, r.trigger.doc_type, r.confidence, r.sample_count, state, r.value
        );
    }
    Ok(())
}

pub async fn run_prefs_query(
    config: &Config,
    rule_type: &str,
    trigger: &TriggerKey,
    min_confidence: Option<f64>,
) -> Result<()> {
    let (pool, engine) = open_engine(config).await?;
    let threshold = min_confidence.unwrap_or(config.learning.min_confidence);
    let value = engine.query(rule_type, trigger, threshold).await?;
    pool.close().await;

    match value {
        Some(v) => println!("{}", v),
        None => println!("No preference for {} at confidence >= {:.2}.", trigger, threshold),
    }
    Ok(())
}

pub async fn run_prefs_learn(
    config: &Config,
    rule_type: &str,
    trigger: TriggerKey,
    suggested: &str,
    final_value: &str,
) -> Result<()> {
    let (pool, engine) = open_engine(config).await?;
    let event = ApprovalEvent::new(trigger, suggested, final_value);
    let change = engine.learn_as(rule_type, &event).await?;
    let rule = engine.rule(rule_type, &event.trigger).await?;
    pool.close().await;

    match (change, rule) {
        (Some(change), Some(rule)) => println!(
            "{}: {} -> {} (confidence {:.2}, samples {})",
            change.action, event.trigger, rule.value, rule.confidence, rule.sample_count
        ),
        _ => println!("Approval matched the suggestion; nothing learned."),
    }
    Ok(())
}

pub async fn run_prefs_set_enabled(
    config: &Config,
    rule_type: &str,
    trigger: &TriggerKey,
    enabled: bool,
) -> Result<()> {
    let (pool, engine) = open_engine(config).await?;
    let found = engine.set_enabled(rule_type, trigger, enabled).await?;
    pool.close().await;

    if !found {
        bail!("no {} rule for {}", rule_type, trigger);
    }
    println!(
        "{} {} rule for {}.",
        if enabled { "Enabled" } else { "Disabled" },
        rule_type,
        trigger
    );
    Ok(())
}

pub async fn run_prefs_history(config: &Config, rule_type: &str, trigger: &TriggerKey) -> Result<()> {
    let (pool, engine) = open_engine(config).await?;
    let history = engine.history(rule_type, trigger).await?;
    pool.close().await;

    if history.is_empty() {
        println!("No history for {} rule {}.", rule_type, trigger);
        return Ok(());
    }
    for c in &history {
        println!(
            "{}  {:<10} {} -> {}  ({} -> {})",
            c.at.format("%Y-%m-%d %H:%M:%S"),
            c.action.as_str(),
            c.old_value.as_deref().unwrap_or("-"),
            c.new_value.as_deref().unwrap_or("-"),
            c.old_confidence.map(|v| format!("{:.2}", v)).unwrap_or_else(|| "-".into()),
            c.new_confidence.map(|v| format!("{:.2}", v)).unwrap_or_else(|| "-".into()),
        );
    }
    Ok(())
}
