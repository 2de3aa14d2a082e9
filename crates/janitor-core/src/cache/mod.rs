//! Content-addressed extraction cache.
//!
//! The [`ExtractionCache`] trait abstracts the backing store (SQLite in the
//! application, [`memory::InMemoryCache`] in tests). Writes go through
//! [`ExtractionCache::set`], which applies the write-gate:
//!
//! - the text came from an OCR engine (not `Direct`/`DirectFallback`),
//! - the text is non-empty,
//! - the quality score is at least [`MIN_CACHEABLE_SCORE`].
//!
//! Entries never expire; only [`ExtractionCache::clear`] removes them.
//! Implementations must make a written entry visible atomically.

pub mod memory;

use std::collections::BTreeMap;

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;

use crate::models::{CacheEntry, ExtractionResult};

/// Results scoring below this are not worth caching.
pub const MIN_CACHEABLE_SCORE: u8 = 30;

/// Whether `result` may be written to the cache.
pub fn is_cacheable(result: &ExtractionResult) -> bool {
    result.method.uses_ocr_engine()
        && !result.method.is_cached()
        && !result.text.trim().is_empty()
        && result.quality_score >= MIN_CACHEABLE_SCORE
}

/// Aggregate numbers about the cache contents.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CacheStats {
    pub entries: u64,
    pub by_method: BTreeMap<String, u64>,
    pub mean_quality: Option<f64>,
}

#[async_trait]
pub trait ExtractionCache: Send + Sync {
    async fn get(&self, fingerprint: &str) -> Result<Option<CacheEntry>>;

    /// Stores `entry`, replacing any previous entry for the same fingerprint.
    ///
    /// Bypasses the write-gate; use [`set`](ExtractionCache::set) for results.
    async fn put(&self, entry: CacheEntry) -> Result<()>;

    /// Removes every entry, returning how many were removed.
    async fn clear(&self) -> Result<u64>;

    async fn stats(&self) -> Result<CacheStats>;

    /// Writes `result` if it passes the write-gate. Returns whether it was stored.
    async fn set(&self, fingerprint: &str, result: &ExtractionResult) -> Result<bool> {
        if !is_cacheable(result) {
            return Ok(false);
        }
        self.put(CacheEntry::from_result(fingerprint, result)).await?;
        Ok(true)
    }
}
