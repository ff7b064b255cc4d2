//! LMDB-backed cache implementation.
//!
//! Uses the heed crate (Rust bindings for LMDB) for a memory-mapped cache
//! that survives process restarts on the same host.
//!
//! # Value Layout
//!
//! `[cached_at: 8 bytes LE micros][expires_at: 8 bytes LE micros][chunk json]`
//!
//! Expired values are left in place until the next read or project scan
//! touches them.

use std::path::Path;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use heed::types::Bytes;
use heed::{Database, Env, EnvOpenOptions};
use yoconf_core::{CacheError, Chunk, YoconfError, YoconfResult};

use super::key::CacheKey;
use super::traits::{CacheBackend, CacheEntry, CacheStats};

const HEADER_LEN: usize = 16;

#[derive(Default)]
struct ScanResult {
    entries: Vec<(Vec<u8>, CacheEntry)>,
    corrupt: Vec<Vec<u8>>,
}

/// Error type for LMDB cache operations.
#[derive(Debug, thiserror::Error)]
pub enum LmdbCacheError {
    /// Failed to open or create the LMDB environment.
    #[error("Failed to open LMDB environment: {0}")]
    EnvOpen(String),

    /// Failed to open the database within the environment.
    #[error("Failed to open database: {0}")]
    DbOpen(String),

    #[error("Transaction error: {0}")]
    Transaction(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<LmdbCacheError> for YoconfError {
    fn from(e: LmdbCacheError) -> Self {
        match e {
            LmdbCacheError::Serialization(reason) | LmdbCacheError::Deserialization(reason) => {
                CacheError::Serialization { reason }.into()
            }
            other => CacheError::Unavailable {
                reason: other.to_string(),
            }
            .into(),
        }
    }
}

fn txn_err(e: heed::Error) -> LmdbCacheError {
    LmdbCacheError::Transaction(e.to_string())
}

/// LMDB-backed cache.
///
/// # Example
///
/// ```ignore
/// use yoconf_storage::cache::{CacheBackend, CacheKey, LmdbCacheBackend};
///
/// let backend = LmdbCacheBackend::new("/var/lib/yoconf/cache", 256)?;
/// let key = CacheKey::for_chunk(&chunk);
/// backend.put(&key, &chunk, Duration::from_secs(7200)).await?;
/// let cached = backend.get(&key).await?;
/// ```
pub struct LmdbCacheBackend {
    env: Env,
    db: Database<Bytes, Bytes>,
    stats: Arc<RwLock<CacheStats>>,
}

impl LmdbCacheBackend {
    /// Open (or create) an LMDB environment at `path` capped at `max_size_mb`.
    pub fn new<P: AsRef<Path>>(path: P, max_size_mb: usize) -> Result<Self, LmdbCacheError> {
        std::fs::create_dir_all(&path)?;

        // SAFETY: the environment directory is owned by this process; no other
        // handle to the same path is opened concurrently within it.
        let env = unsafe {
            EnvOpenOptions::new()
                .map_size(max_size_mb * 1024 * 1024)
                .max_dbs(1)
                .open(path.as_ref())
        }
        .map_err(|e| LmdbCacheError::EnvOpen(e.to_string()))?;

        let mut wtxn = env.write_txn().map_err(txn_err)?;
        let db: Database<Bytes, Bytes> = env
            .create_database(&mut wtxn, None)
            .map_err(|e| LmdbCacheError::DbOpen(e.to_string()))?;
        wtxn.commit().map_err(txn_err)?;

        Ok(Self {
            env,
            db,
            stats: Arc::new(RwLock::new(CacheStats::default())),
        })
    }

    fn encode_value(entry: &CacheEntry) -> Result<Vec<u8>, LmdbCacheError> {
        let json = serde_json::to_vec(&entry.chunk)
            .map_err(|e| LmdbCacheError::Serialization(e.to_string()))?;
        let mut bytes = Vec::with_capacity(HEADER_LEN + json.len());
        bytes.extend_from_slice(&entry.cached_at.timestamp_micros().to_le_bytes());
        bytes.extend_from_slice(&entry.expires_at.timestamp_micros().to_le_bytes());
        bytes.extend_from_slice(&json);
        Ok(bytes)
    }

    fn decode_value(bytes: &[u8]) -> Result<CacheEntry, LmdbCacheError> {
        if bytes.len() < HEADER_LEN {
            return Err(LmdbCacheError::Deserialization(
                "value shorter than header".into(),
            ));
        }
        let read_ts = |range: std::ops::Range<usize>| -> Result<DateTime<Utc>, LmdbCacheError> {
            let raw: [u8; 8] = bytes[range]
                .try_into()
                .map_err(|_| LmdbCacheError::Deserialization("Invalid timestamp".into()))?;
            DateTime::from_timestamp_micros(i64::from_le_bytes(raw))
                .ok_or_else(|| LmdbCacheError::Deserialization("Timestamp out of range".into()))
        };
        let cached_at = read_ts(0..8)?;
        let expires_at = read_ts(8..16)?;
        let chunk: Chunk = serde_json::from_slice(&bytes[HEADER_LEN..])
            .map_err(|e| LmdbCacheError::Deserialization(e.to_string()))?;
        Ok(CacheEntry {
            chunk,
            cached_at,
            expires_at,
        })
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

    fn remove_keys(&self, keys: &[Vec<u8>]) -> Result<u64, LmdbCacheError> {
        if keys.is_empty() {
            return Ok(0);
        }
        let mut wtxn = self.env.write_txn().map_err(txn_err)?;
        let mut deleted = 0u64;
        for key in keys {
            if self.db.delete(&mut wtxn, key).map_err(txn_err)? {
                deleted += 1;
            }
        }
        wtxn.commit().map_err(txn_err)?;
        if let Ok(mut stats) = self.stats.write() {
            stats.evictions += deleted;
        }
        Ok(deleted)
    }

    /// Decode every value under keys starting with `prefix`.
    ///
    /// Undecodable values are skipped and returned separately so the caller
    /// can drop them.
    fn scan_prefix(&self, prefix: &[u8]) -> Result<ScanResult, LmdbCacheError> {
        let rtxn = self.env.read_txn().map_err(txn_err)?;
        let mut scan = ScanResult::default();
        for result in self.db.prefix_iter(&rtxn, prefix).map_err(txn_err)? {
            let (key, value) = result.map_err(txn_err)?;
            match Self::decode_value(value) {
                Ok(entry) => scan.entries.push((key.to_vec(), entry)),
                Err(e) => {
                    tracing::warn!(
                        key = %String::from_utf8_lossy(key),
                        error = %e,
                        "Dropping undecodable cache value"
                    );
                    scan.corrupt.push(key.to_vec());
                }
            }
        }
        Ok(scan)
    }
}

#[async_trait]
impl CacheBackend for LmdbCacheBackend {
    async fn get(&self, key: &CacheKey) -> YoconfResult<Option<CacheEntry>> {
        let encoded_key = key.encode();
        let entry = {
            let rtxn = self.env.read_txn().map_err(txn_err)?;
            match self.db.get(&rtxn, encoded_key.as_bytes()).map_err(txn_err)? {
                Some(bytes) => Some(Self::decode_value(bytes)?),
                None => None,
            }
        };

        match entry {
            Some(entry) if entry.is_expired_at(Utc::now()) => {
                self.record(false);
                self.remove_keys(&[encoded_key.into_bytes()])?;
                Ok(None)
            }
            Some(entry) => {
                self.record(true);
                Ok(Some(entry))
            }
            None => {
                self.record(false);
                Ok(None)
            }
        }
    }

    async fn put(&self, key: &CacheKey, chunk: &Chunk, ttl: Duration) -> YoconfResult<()> {
        let entry = CacheEntry::new(chunk.clone(), Utc::now(), ttl);
        let bytes = Self::encode_value(&entry)?;

        let mut wtxn = self.env.write_txn().map_err(txn_err)?;
        self.db
            .put(&mut wtxn, key.encode().as_bytes(), &bytes)
            .map_err(txn_err)?;
        wtxn.commit().map_err(txn_err)?;
        Ok(())
    }

    async fn delete(&self, key: &CacheKey) -> YoconfResult<()> {
        let mut wtxn = self.env.write_txn().map_err(txn_err)?;
        self.db
            .delete(&mut wtxn, key.encode().as_bytes())
            .map_err(txn_err)?;
        wtxn.commit().map_err(txn_err)?;
        Ok(())
    }

    async fn project_entries(&self, project: &str) -> YoconfResult<Vec<(CacheKey, CacheEntry)>> {
        let prefix = CacheKey::project_prefix(project);
        let now = Utc::now();
        let scan = self.scan_prefix(prefix.as_bytes())?;
        let mut live = Vec::new();
        let mut expired = scan.corrupt;

        for (raw_key, entry) in scan.entries {
            let Some(key) = std::str::from_utf8(&raw_key).ok().and_then(CacheKey::decode) else {
                continue;
            };
            if key.project() != project {
                continue;
            }
            if entry.is_expired_at(now) {
                expired.push(raw_key);
            } else {
                live.push((key, entry));
            }
        }

        self.remove_keys(&expired)?;
        Ok(live)
    }

    async fn stats(&self) -> YoconfResult<CacheStats> {
        let (entry_count, memory_bytes) = {
            let rtxn = self.env.read_txn().map_err(txn_err)?;
            let mut count = 0u64;
            let mut bytes = 0u64;
            for result in self.db.iter(&rtxn).map_err(txn_err)? {
                let (_, value) = result.map_err(txn_err)?;
                count += 1;
                bytes += value.len() as u64;
            }
            (count, bytes)
        };
        let mut stats = self.stats.read().map(|s| s.clone()).unwrap_or_default();
        stats.entry_count = entry_count;
        stats.memory_bytes = memory_bytes;
        Ok(stats)
    }
}
