//! In-process cache backend.
//!
//! Used by tests and by single-node deployments that do not need the cache
//! to survive a restart.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use yoconf_core::{CacheError, Chunk, YoconfResult};

use super::key::CacheKey;
use super::traits::{CacheBackend, CacheEntry, CacheStats};

fn poisoned() -> CacheError {
    CacheError::Unavailable {
        reason: "cache lock poisoned".to_string(),
    }
}

/// HashMap-backed cache with TTL enforcement on read.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCacheBackend {
    entries: Arc<RwLock<HashMap<CacheKey, CacheEntry>>>,
    stats: Arc<RwLock<CacheStats>>,
}

impl InMemoryCacheBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop one entry as if its TTL had passed.
    pub fn evict(&self, key: &CacheKey) -> bool {
        self.entries
            .write()
            .map(|mut entries| entries.remove(key).is_some())
            .unwrap_or(false)
    }

    /// Drop every entry.
    pub fn clear(&self) {
        if let Ok(mut entries) = self.entries.write() {
            entries.clear();
        }
    }

    /// Number of stored entries, expired ones included.
    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn record(&self, hit: bool) {
        if let Ok(mut stats) = self.stats.write() {
            if hit {
                stats.hits += 1;
            } else {
                stats.misses += 1;
            }
        }
    }

    fn record_evictions(&self, count: u64) {
        if count == 0 {
            return;
        }
        if let Ok(mut stats) = self.stats.write() {
            stats.evictions += count;
        }
    }
}

#[async_trait]
impl CacheBackend for InMemoryCacheBackend {
    async fn get(&self, key: &CacheKey) -> YoconfResult<Option<CacheEntry>> {
        let now = Utc::now();
        let mut entries = self.entries.write().map_err(|_| poisoned())?;
        let expired = matches!(entries.get(key), Some(entry) if entry.is_expired_at(now));
        let found = if expired {
            entries.remove(key);
            None
        } else {
            entries.get(key).cloned()
        };
        drop(entries);
        if expired {
            self.record_evictions(1);
        }
        self.record(found.is_some());
        Ok(found)
    }

    async fn put(&self, key: &CacheKey, chunk: &Chunk, ttl: Duration) -> YoconfResult<()> {
        let entry = CacheEntry::new(chunk.clone(), Utc::now(), ttl);
        self.entries
            .write()
            .map_err(|_| poisoned())?
            .insert(key.clone(), entry);
        Ok(())
    }

    async fn delete(&self, key: &CacheKey) -> YoconfResult<()> {
        self.entries.write().map_err(|_| poisoned())?.remove(key);
        Ok(())
    }

    async fn project_entries(&self, project: &str) -> YoconfResult<Vec<(CacheKey, CacheEntry)>> {
        let now = Utc::now();
        let mut entries = self.entries.write().map_err(|_| poisoned())?;
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired_at(now));
        let expired = (before - entries.len()) as u64;
        let live = entries
            .iter()
            .filter(|(key, _)| key.project() == project)
            .map(|(key, entry)| (key.clone(), entry.clone()))
            .collect();
        drop(entries);
        self.record_evictions(expired);
        Ok(live)
    }

    async fn stats(&self) -> YoconfResult<CacheStats> {
        let (entry_count, memory_bytes) = {
            let entries = self.entries.read().map_err(|_| poisoned())?;
            let bytes = entries.values().map(|e| e.chunk.data.len() as u64).sum();
            (entries.len() as u64, bytes)
        };
        let mut stats = self.stats.read().map_err(|_| poisoned())?.clone();
        stats.entry_count = entry_count;
        stats.memory_bytes = memory_bytes;
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TTL: Duration = Duration::from_secs(60);

    #[tokio::test]
    async fn test_put_get_delete() {
        let cache = InMemoryCacheBackend::new();
        let chunk = Chunk::new("billing", 1, "A=1", true);
        let key = CacheKey::for_chunk(&chunk);

        cache.put(&key, &chunk, TTL).await.unwrap();
        let entry = cache.get(&key).await.unwrap().unwrap();
        assert_eq!(entry.chunk, chunk);

        cache.delete(&key).await.unwrap();
        assert!(cache.get(&key).await.unwrap().is_none());
        // Deleting again is fine.
        cache.delete(&key).await.unwrap();
    }

    #[tokio::test]
    async fn test_expired_entry_reads_as_miss() {
        let cache = InMemoryCacheBackend::new();
        let chunk = Chunk::new("billing", 1, "A=1", true);
        let key = CacheKey::for_chunk(&chunk);

        cache.put(&key, &chunk, Duration::ZERO).await.unwrap();
        assert!(cache.get(&key).await.unwrap().is_none());
        assert!(cache.is_empty());

        let stats = cache.stats().await.unwrap();
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.evictions, 1);
    }

    #[tokio::test]
    async fn test_project_entries_matches_exact_project() {
        let cache = InMemoryCacheBackend::new();
        for chunk in [
            Chunk::new("billing", 1, "A=1", true),
            Chunk::new("billing", 2, "A=2", false),
            Chunk::new("billing:eu", 1, "B=1", true),
            Chunk::new("search", 1, "C=1", true),
        ] {
            cache.put(&CacheKey::for_chunk(&chunk), &chunk, TTL).await.unwrap();
        }

        let mut versions: Vec<u32> = cache
            .project_entries("billing")
            .await
            .unwrap()
            .into_iter()
            .map(|(key, _)| key.version())
            .collect();
        versions.sort_unstable();
        assert_eq!(versions, vec![1, 2]);
    }

    #[tokio::test]
    async fn test_stats_track_hits_and_size() {
        let cache = InMemoryCacheBackend::new();
        let chunk = Chunk::new("p", 1, "12345", true);
        let key = CacheKey::for_chunk(&chunk);
        cache.put(&key, &chunk, TTL).await.unwrap();
        cache.get(&key).await.unwrap();
        cache.get(&CacheKey::new("p", 2, true)).await.unwrap();

        let stats = cache.stats().await.unwrap();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.entry_count, 1);
        assert_eq!(stats.memory_bytes, 5);
    }

    #[tokio::test]
    async fn test_evict_helper() {
        let cache = InMemoryCacheBackend::new();
        let chunk = Chunk::new("p", 1, "x", true);
        let key = CacheKey::for_chunk(&chunk);
        cache.put(&key, &chunk, TTL).await.unwrap();
        assert!(cache.evict(&key));
        assert!(!cache.evict(&key));
        assert!(cache.get(&key).await.unwrap().is_none());
    }
}
