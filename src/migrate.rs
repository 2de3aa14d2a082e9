//! Idempotent schema creation for the cache and preference tables.

use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;

/// Connects to the configured database, applies the schema and closes the pool.
pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    apply_schema(&pool).await?;
    pool.close().await;
    Ok(())
}

/// Creates all tables and indexes if they do not exist yet.
pub async fn apply_schema(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS extraction_cache (
            fingerprint TEXT PRIMARY KEY,
            text TEXT NOT NULL,
            method TEXT NOT NULL,
            engine_confidence REAL NOT NULL,
            quality_score INTEGER NOT NULL,
            page_count INTEGER NOT NULL DEFAULT 0,
            created_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS preference_rules (
            rule_type TEXT NOT NULL,
            trigger_vendor TEXT NOT NULL,
            trigger_doc_type TEXT NOT NULL,
            value TEXT NOT NULL,
            confidence REAL NOT NULL,
            sample_count INTEGER NOT NULL,
            conflict_streak INTEGER NOT NULL DEFAULT 0,
            enabled INTEGER NOT NULL DEFAULT 1,
            created_at INTEGER NOT NULL,
            last_seen INTEGER NOT NULL,
            PRIMARY KEY (rule_type, trigger_vendor, trigger_doc_type)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS preference_audit (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            rule_type TEXT NOT NULL,
            trigger_vendor TEXT NOT NULL,
            trigger_doc_type TEXT NOT NULL,
            action TEXT NOT NULL,
            old_value TEXT,
            new_value TEXT,
            old_confidence REAL,
            new_confidence REAL,
            at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_preference_audit_rule ON preference_audit(rule_type, trigger_vendor, trigger_doc_type)",
    )
    .execute(pool)
    .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_extraction_cache_method ON extraction_cache(method)",
    )
    .execute(pool)
    .await?;

    Ok(())
}
