//! SQLite connection management.
//!
//! The cache and the preference table share one WAL-mode pool: batch
//! workers read cached extractions while other workers write new ones, and
//! WAL lets those readers proceed without waiting on the writer.
//!
//! The database file and its parent directories are created on first use.

use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use crate::config::Config;

/// Opens a pool on the configured database.
pub async fn connect(config: &Config) -> Result<SqlitePool> {
    connect_path(&config.db.path).await
}

/// Opens the configured database and makes sure the schema exists.
pub async fn connect_migrated(config: &Config) -> Result<SqlitePool> {
    let pool = connect(config).await?;
    crate::migrate::apply_schema(&pool).await?;
    Ok(pool)
}

/// Opens a pool of up to 5 connections on `db_path`.
pub async fn connect_path(db_path: &Path) -> Result<SqlitePool> {
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create database directory: {}", parent.display())
            })?;
        }
    }

    let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", db_path.display()))?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_secs(5));

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await
        .with_context(|| format!("Failed to open database: {}", db_path.display()))?;

    Ok(pool)
}
