//! In-memory [`ExtractionCache`] for tests and short-lived sessions.
//!
//! Uses a `HashMap` behind `std::sync::RwLock`; entries are inserted whole,
//! so readers see either the old or the new entry.

use std::collections::HashMap;
use std::sync::RwLock;

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use super::{CacheStats, ExtractionCache};
use crate::models::CacheEntry;

pub struct InMemoryCache {
    entries: RwLock<HashMap<String, CacheEntry>>,
}

impl InMemoryCache {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for InMemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

fn poisoned<T>(_: T) -> anyhow::Error {
    anyhow!("extraction cache lock poisoned")
}

#[async_trait]
impl ExtractionCache for InMemoryCache {
    async fn get(&self, fingerprint: &str) -> Result<Option<CacheEntry>> {
        let entries = self.entries.read().map_err(poisoned)?;
        Ok(entries.get(fingerprint).cloned())
    }

    async fn put(&self, entry: CacheEntry) -> Result<()> {
        let mut entries = self.entries.write().map_err(poisoned)?;
        entries.insert(entry.fingerprint.clone(), entry);
        Ok(())
    }

    async fn clear(&self) -> Result<u64> {
        let mut entries = self.entries.write().map_err(poisoned)?;
        let n = entries.len() as u64;
        entries.clear();
        Ok(n)
    }

    async fn stats(&self) -> Result<CacheStats> {
        let entries = self.entries.read().map_err(poisoned)?;
        let mut stats = CacheStats {
            entries: entries.len() as u64,
            ..CacheStats::default()
        };
        let mut total_quality = 0u64;
        for e in entries.values() {
            *stats
                .by_method
                .entry(e.method.as_str().to_string())
                .or_insert(0) += 1;
            total_quality += e.quality_score as u64;
        }
        if !entries.is_empty() {
            stats.mean_quality = Some(total_quality as f64 / entries.len() as f64);
        }
        Ok(stats)
    }
}
