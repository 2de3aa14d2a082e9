//! `janitor cache stats|clear|get`.

use std::path::Path;

use anyhow::{Context, Result};

use janitor_core::cache::ExtractionCache;
use janitor_core::fingerprint::fingerprint;

use crate::config::Config;
use crate::db;
use crate::sqlite_cache::SqliteCache;

pub async fn run_cache_stats(config: &Config) -> Result<()> {
    let pool = db::connect_migrated(config).await?;
    let stats = SqliteCache::new(pool.clone()).stats().await?;
    pool.close().await;

    println!("Extraction cache");
    println!("  Entries:       {}", stats.entries);
    match stats.mean_quality {
        Some(q) => println!("  Mean quality:  {:.1}", q),
        None => println!("  Mean quality:  -"),
    }
    if !stats.by_method.is_empty() {
        println!();
        println!("  {:<22} {:>8}", "METHOD", "ENTRIES");
        for (method, n) in &stats.by_method {
            println!("  {:<22} {:>8}", method, n);
        }
    }
    Ok(())
}

pub async fn run_cache_clear(config: &Config) -> Result<()> {
    let pool = db::connect_migrated(config).await?;
    let removed = SqliteCache::new(pool.clone()).clear().await?;
    pool.close().await;
    tracing::info!(removed, "extraction cache cleared");
    println!("Removed {} cache entries.", removed);
    Ok(())
}

/// Looks up the cache entry a file would hit, by its fingerprint.
pub async fn run_cache_get(config: &Config, path: &Path) -> Result<()> {
    let bytes =
        std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let fp = fingerprint(&bytes);

    let pool = db::connect_migrated(config).await?;
    let entry = SqliteCache::new(pool.clone()).get(&fp).await?;
    pool.close().await;

    match entry {
        Some(entry) => println!("{}", serde_json::to_string_pretty(&entry)?),
        None => println!("No cache entry for {} ({}).", path.display(), fp),
    }
    Ok(())
}
