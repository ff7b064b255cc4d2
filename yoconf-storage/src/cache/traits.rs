//! Cache backend trait and entry metadata.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use yoconf_core::{Chunk, YoconfResult};

use super::key::CacheKey;

/// A cached chunk with its lifetime bounds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub chunk: Chunk,
    pub cached_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl CacheEntry {
    pub fn new(chunk: Chunk, cached_at: DateTime<Utc>, ttl: Duration) -> Self {
        let ttl = chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::MAX);
        let expires_at = cached_at
            .checked_add_signed(ttl)
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        Self {
            chunk,
            cached_at,
            expires_at,
        }
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Cache backend trait for pluggable cache implementations.
///
/// Every operation is best-effort from the caller's point of view: an `Err`
/// means the cache could not be reached, never that the store is wrong.
/// Expired entries must read as misses.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    /// Get a live entry, or `None` on miss or expiry.
    async fn get(&self, key: &CacheKey) -> YoconfResult<Option<CacheEntry>>;

    /// Store `chunk` under `key` for `ttl`, replacing any previous entry.
    async fn put(&self, key: &CacheKey, chunk: &Chunk, ttl: Duration) -> YoconfResult<()>;

    /// Remove the entry under `key`. Removing an absent key is not an error.
    async fn delete(&self, key: &CacheKey) -> YoconfResult<()>;

    /// All live entries belonging to exactly `project`.
    async fn project_entries(&self, project: &str) -> YoconfResult<Vec<(CacheKey, CacheEntry)>>;

    /// Get cache statistics.
    async fn stats(&self) -> YoconfResult<CacheStats>;
}

/// Statistics about cache usage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Number of cache hits.
    pub hits: u64,
    /// Number of cache misses, expired entries included.
    pub misses: u64,
    /// Number of entries currently in cache.
    pub entry_count: u64,
    /// Approximate payload size in bytes.
    pub memory_bytes: u64,
    /// Number of entries dropped because their TTL passed.
    pub evictions: u64,
}

impl CacheStats {
    /// Calculate the hit rate (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}
