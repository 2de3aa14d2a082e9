//! SQLite-backed [`ExtractionCache`].
//!
//! One row per fingerprint in `extraction_cache`. A write is a single
//! `INSERT ... ON CONFLICT DO UPDATE`, so a reader sees either the previous
//! row or the complete new one.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use janitor_core::cache::{CacheStats, ExtractionCache};
use janitor_core::models::{CacheEntry, ExtractionMethod};

pub struct SqliteCache {
    pool: SqlitePool,
}

impl SqliteCache {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

pub(crate) fn ts_to_datetime(ts: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(ts, 0).unwrap_or_default()
}

fn row_to_entry(row: &SqliteRow) -> Result<CacheEntry> {
    let method: String = row.get("method");
    let quality: i64 = row.get("quality_score");
    let pages: i64 = row.get("page_count");
    Ok(CacheEntry {
        fingerprint: row.get("fingerprint"),
        text: row.get("text"),
        method: method
            .parse::<ExtractionMethod>()
            .context("corrupt extraction_cache row")?,
        engine_confidence: row.get("engine_confidence"),
        quality_score: quality.clamp(0, 100) as u8,
        page_count: pages.max(0) as u32,
        created_at: ts_to_datetime(row.get("created_at")),
    })
}

#[async_trait]
impl ExtractionCache for SqliteCache {
    async fn get(&self, fingerprint: &str) -> Result<Option<CacheEntry>> {
        let row = sqlx::query(
            "SELECT fingerprint, text, method, engine_confidence, quality_score, page_count, created_at
             FROM extraction_cache WHERE fingerprint = ?",
        )
        .bind(fingerprint)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_entry).transpose()
    }

    async fn put(&self, entry: CacheEntry) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO extraction_cache (fingerprint, text, method, engine_confidence,
                                          quality_score, page_count, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(fingerprint) DO UPDATE SET
                text = excluded.text,
                method = excluded.method,
                engine_confidence = excluded.engine_confidence,
                quality_score = excluded.quality_score,
                page_count = excluded.page_count,
                created_at = excluded.created_at
            "#,
        )
        .bind(&entry.fingerprint)
        .bind(&entry.text)
        .bind(entry.method.as_str())
        .bind(entry.engine_confidence)
        .bind(entry.quality_score as i64)
        .bind(entry.page_count as i64)
        .bind(entry.created_at.timestamp())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn clear(&self) -> Result<u64> {
        let done = sqlx::query("DELETE FROM extraction_cache")
            .execute(&self.pool)
            .await?;
        Ok(done.rows_affected())
    }

    async fn stats(&self) -> Result<CacheStats> {
        let rows = sqlx::query(
            "SELECT method, COUNT(*) AS n FROM extraction_cache GROUP BY method ORDER BY method",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut stats = CacheStats::default();
        for row in &rows {
            let method: String = row.get("method");
            let n: i64 = row.get("n");
            stats.entries += n as u64;
            stats.by_method.insert(method, n as u64);
        }

        stats.mean_quality =
            sqlx::query_scalar::<_, Option<f64>>("SELECT AVG(quality_score) FROM extraction_cache")
                .fetch_one(&self.pool)
                .await?;

        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migrate::apply_schema;
    use janitor_core::models::ExtractionResult;
    use tempfile::TempDir;

    async fn cache() -> (TempDir, SqliteCache) {
        let tmp = TempDir::new().unwrap();
        let pool = crate::db::connect_path(&tmp.path().join("cache.sqlite"))
            .await
            .unwrap();
        apply_schema(&pool).await.unwrap();
        (tmp, SqliteCache::new(pool))
    }

    fn vision(text: &str, score: u8) -> ExtractionResult {
        ExtractionResult {
            text: text.to_string(),
            method: ExtractionMethod::RemoteVision,
            engine_confidence: 0.95,
            quality_score: score,
            needs_review: score < 60,
            page_count: 3,
            char_count: text.chars().count(),
            processing_time_ms: 2400,
            ocr_reason: Some("empty text".to_string()),
            error: None,
        }
    }

    #[tokio::test]
    async fn round_trips_entries() {
        let (_tmp, cache) = cache().await;
        assert!(cache.get("missing").await.unwrap().is_none());

        assert!(cache.set("fp", &vision("合同 text", 88)).await.unwrap());
        let e = cache.get("fp").await.unwrap().unwrap();
        assert_eq!(e.text, "合同 text");
        assert_eq!(e.method, ExtractionMethod::RemoteVision);
        assert_eq!(e.quality_score, 88);
        assert_eq!(e.page_count, 3);
    }

    #[tokio::test]
    async fn replaces_and_clears() {
        let (_tmp, cache) = cache().await;
        cache.set("fp", &vision("old", 50)).await.unwrap();
        cache.set("fp", &vision("new", 70)).await.unwrap();
        cache.set("other", &vision("x", 90)).await.unwrap();

        assert_eq!(cache.get("fp").await.unwrap().unwrap().text, "new");
        let stats = cache.stats().await.unwrap();
        assert_eq!(stats.entries, 2);
        assert_eq!(stats.by_method.get("remote_vision"), Some(&2));
        assert_eq!(stats.mean_quality, Some(80.0));

        assert_eq!(cache.clear().await.unwrap(), 2);
        assert_eq!(cache.stats().await.unwrap().entries, 0);
    }

    #[tokio::test]
    async fn write_gate_applies() {
        let (_tmp, cache) = cache().await;
        assert!(!cache.set("fp", &vision("junk", 20)).await.unwrap());
        assert!(cache.get("fp").await.unwrap().is_none());
    }
}
