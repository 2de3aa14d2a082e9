//! `janitor stats`: database, cache and preference overview.

use anyhow::Result;

use janitor_core::cache::ExtractionCache;

use crate::config::Config;
use crate::db;
use crate::sqlite_cache::SqliteCache;

pub async fn run_stats(config: &Config) -> Result<()> {
    let pool = db::connect_migrated(config).await?;
    let cache = SqliteCache::new(pool.clone()).stats().await?;

    let (rules, enabled, confident): (i64, Option<i64>, Option<i64>) = sqlx::query_as(
        "SELECT COUNT(*), SUM(enabled), SUM(CASE WHEN enabled = 1 AND confidence >= ? THEN 1 ELSE 0 END)
         FROM preference_rules",
    )
    .bind(config.learning.min_confidence)
    .fetch_one(&pool)
    .await?;

    let audit_events: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM preference_audit")
        .fetch_one(&pool)
        .await?;
    let last_learned: Option<i64> = sqlx::query_scalar("SELECT MAX(at) FROM preference_audit")
        .fetch_one(&pool)
        .await?;

    pool.close().await;

    let db_size = std::fs::metadata(&config.db.path)
        .map(|m| m.len())
        .unwrap_or(0);

    println!("Inbox Janitor — Stats");
    println!("=====================");
    println!();
    println!("  Database:      {}", config.db.path.display());
    println!("  Size:          {}", format_bytes(db_size));
    println!();
    println!("  Cache entries: {}", cache.entries);
    if let Some(q) = cache.mean_quality {
        println!("  Mean quality:  {:.1}", q);
    }
    for (method, n) in &cache.by_method {
        println!("    {:<20} {:>6}", method, n);
    }
    println!();
    println!("  Rules:         {}", rules);
    println!("    enabled      {:>6}", enabled.unwrap_or(0));
    println!(
        "    live (>= {:.2}) {:>5}",
        config.learning.min_confidence,
        confident.unwrap_or(0)
    );
    println!("  Corrections:   {}", audit_events);
    println!(
        "  Last learned:  {}",
        last_learned
            .map(format_ts_relative)
            .unwrap_or_else(|| "never".to_string())
    );
    println!();
    Ok(())
}

fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

/// "3 hours ago", or an absolute date beyond 30 days.
fn format_ts_relative(ts: i64) -> String {
    let delta = chrono::Utc::now().timestamp() - ts;
    let plural = |n: i64| if n == 1 { "" } else { "s" };
    match delta {
        d if d < 0 => format_ts_iso(ts),
        d if d < 60 => "just now".to_string(),
        d if d < 3600 => format!("{} min{} ago", d / 60, plural(d / 60)),
        d if d < 86_400 => format!("{} hour{} ago", d / 3600, plural(d / 3600)),
        d if d < 86_400 * 30 => format!("{} day{} ago", d / 86_400, plural(d / 86_400)),
        _ => format_ts_iso(ts),
    }
}

fn format_ts_iso(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| ts.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bytes_are_humanized() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.0 KB");
        assert_eq!(format_bytes(5 * 1024 * 1024), "5.0 MB");
    }

    #[test]
    fn recent_timestamps_are_relative() {
        let now = chrono::Utc::now().timestamp();
        assert_eq!(format_ts_relative(now), "just now");
        assert_eq!(format_ts_relative(now - 7200), "2 hours ago");
        assert_eq!(format_ts_relative(now - 86_400), "1 day ago");
    }
}
