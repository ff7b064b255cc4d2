//! Chunk Service
//!
//! Sequences config store and cache calls for the client-facing operations
//! and owns the consistency contract between the two:
//!
//! - writes go store first, then cache; a cache failure on a write path is
//!   reported even though the store already changed
//! - reads go cache first and fall back to a single store read
//! - roll-on checkpoints the outgoing cached payload into a snapshot row
//!
//! Steps are independent retried units. Nothing is rolled back when a later
//! step fails, so a failed call can leave the store and cache partially
//! updated. Each step checks current state before acting, which makes
//! replaying the whole operation safe.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::Instrument;
use yoconf_core::{
    validate_project, validate_version, Chunk, RetryExecutor, RetryPolicy, Snapshot,
    StorageError, Version, YoconfError, YoconfResult,
};
use yoconf_storage::{CacheBackend, CacheEntry, CacheKey, ConfigStore};

use super::locks::ProjectLocks;

/// Default lifetime of a cached chunk.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(2 * 60 * 60);

/// Orchestrator over a [`ConfigStore`] and a [`CacheBackend`].
#[derive(Clone)]
pub struct ChunkService {
    store: Arc<dyn ConfigStore>,
    cache: Arc<dyn CacheBackend>,
    policy: RetryPolicy,
    cache_ttl: Duration,
    operation_timeout: Option<Duration>,
    locks: ProjectLocks,
    span: tracing::Span,
}

impl ChunkService {
    pub fn new(store: Arc<dyn ConfigStore>, cache: Arc<dyn CacheBackend>) -> Self {
        Self {
            store,
            cache,
            policy: RetryPolicy::default(),
            cache_ttl: DEFAULT_CACHE_TTL,
            operation_timeout: None,
            locks: ProjectLocks::new(),
            span: tracing::info_span!("chunk_service"),
        }
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    /// Stop starting new retry attempts once an operation has run this long.
    pub fn with_operation_timeout(mut self, timeout: Duration) -> Self {
        self.operation_timeout = Some(timeout);
        self
    }

    /// Parent span for every operation's span.
    pub fn with_span(mut self, span: tracing::Span) -> Self {
        self.span = span;
        self
    }

    pub fn store(&self) -> &Arc<dyn ConfigStore> {
        &self.store
    }

    pub fn cache(&self) -> &Arc<dyn CacheBackend> {
        &self.cache
    }

    fn executor(&self) -> RetryExecutor {
        let executor = RetryExecutor::new(self.policy);
        match self.operation_timeout {
            Some(timeout) => executor.with_deadline(Instant::now() + timeout),
            None => executor,
        }
    }

    // ========================================================================
    // CREATE
    // ========================================================================

    /// Store a new chunk, demoting the project's active row, then cache it.
    ///
    /// Replaying a create whose row is still stored exactly as requested is a
    /// no-op on the store, so a caller may retry after a cache failure without
    /// hitting `DuplicateVersion`. A row that has since changed, including a
    /// flipped active flag, is a `DuplicateVersion`.
    pub async fn create_config(&self, chunk: Chunk) -> YoconfResult<()> {
        chunk.validate()?;
        let span = tracing::info_span!(
            parent: &self.span,
            "create_config",
            project = %chunk.project,
            version = chunk.version,
        );

        self.create_locked(&chunk).instrument(span).await
    }

    async fn create_locked(&self, chunk: &Chunk) -> YoconfResult<()> {
        let retry = self.executor();
        let _guard = self.locks.acquire(&chunk.project).await;

        let stored = retry
            .run_with_value_if(
                "store.create",
                || self.store_create(chunk),
                YoconfError::is_transient,
            )
            .await?;

        let key = CacheKey::for_chunk(&stored);
        retry
            .run_if(
                "cache.put",
                || self.cache.put(&key, &stored, self.cache_ttl),
                YoconfError::is_transient,
            )
            .await?;

        tracing::info!(active = stored.active, "Chunk created");
        Ok(())
    }

    /// One retried unit: demote then insert, skipping a row already present.
    ///
    /// Returns the row as the store holds it.
    async fn store_create(&self, chunk: &Chunk) -> YoconfResult<Chunk> {
        if let Some(existing) = self
            .store
            .fetch_version(&chunk.project, chunk.version)
            .await?
        {
            if existing == *chunk {
                tracing::debug!("Identical chunk already stored, skipping insert");
                return Ok(existing);
            }
            return Err(StorageError::DuplicateVersion {
                project: chunk.project.clone(),
                version: chunk.version,
            }
            .into());
        }

        let demoted = self.store.demote_active(&chunk.project).await?;
        for previous in &demoted {
            tracing::debug!(demoted_version = previous.version, "Demoted active chunk");
        }
        self.store.insert(chunk).await?;
        Ok(chunk.clone())
    }

    // ========================================================================
    // ROLL ON
    // ========================================================================

    /// Promote `version` to active and checkpoint the outgoing cached payload.
    ///
    /// Returns the newly active chunk. Steps:
    /// 1. activate the version in the store
    /// 2. read the outgoing version's cached payload (miss or error means empty)
    /// 3. delete that cache entry
    /// 4. persist the payload as an inactive snapshot row
    /// 5. cache the newly active chunk (best-effort)
    pub async fn roll_on(&self, project: &str, version: Version) -> YoconfResult<Chunk> {
        validate_project(project)?;
        validate_version(version)?;
        let span = tracing::info_span!(parent: &self.span, "roll_on", project, version);

        self.roll_on_locked(project, version).instrument(span).await
    }

    async fn roll_on_locked(&self, project: &str, version: Version) -> YoconfResult<Chunk> {
        let retry = self.executor();
        let _guard = self.locks.acquire(project).await;

        let activation = retry
            .run_with_value_if(
                "store.activate_version",
                || self.store.activate_version(project, version),
                YoconfError::is_transient,
            )
            .await?;

        if activation.demoted.is_empty() {
            tracing::info!("No previously active version, skipping checkpoint");
        }

        for outgoing in &activation.demoted {
            let key = CacheKey::new(project, outgoing.version, true);
            let data = match self.cache.get(&key).await {
                Ok(Some(entry)) => entry.chunk.data,
                Ok(None) => {
                    tracing::warn!(
                        outgoing_version = outgoing.version,
                        "No cached payload for outgoing version, checkpointing empty data"
                    );
                    String::new()
                }
                Err(err) => {
                    tracing::warn!(
                        outgoing_version = outgoing.version,
                        error = %err,
                        "Cache read failed, checkpointing empty data"
                    );
                    String::new()
                }
            };

            retry
                .run_if(
                    "cache.delete",
                    || self.cache.delete(&key),
                    YoconfError::is_transient,
                )
                .await?;

            let snapshot = Snapshot::new(project, outgoing.version, data);
            retry
                .run_if(
                    "store.insert_snapshot",
                    || self.store.insert_snapshot(&snapshot),
                    YoconfError::is_transient,
                )
                .await?;
            tracing::debug!(
                snapshot_id = %snapshot.snapshot_id,
                outgoing_version = outgoing.version,
                "Checkpointed outgoing version"
            );
        }

        let activated = activation.activated;
        if let Err(err) = self
            .cache
            .put(&CacheKey::for_chunk(&activated), &activated, self.cache_ttl)
            .await
        {
            tracing::warn!(error = %err, "Failed to cache newly active chunk");
        }

        tracing::info!("Rolled on");
        Ok(activated)
    }

    // ========================================================================
    // READS
    // ========================================================================

    /// Active chunk of `project`, cache first.
    ///
    /// A cached active entry is served without checking the store, so a stale
    /// entry can win until it expires. On a miss or cache error the store is
    /// read once and the cache is left untouched.
    pub async fn get_config(&self, project: &str) -> YoconfResult<Chunk> {
        validate_project(project)?;
        let span = tracing::debug_span!(parent: &self.span, "get_config", project);

        async {
            match self.cache.project_entries(project).await {
                Ok(entries) => {
                    if let Some(entry) = latest_active(entries) {
                        tracing::debug!(version = entry.chunk.version, "Cache hit");
                        return Ok(entry.chunk);
                    }
                    tracing::debug!("Cache miss, reading store");
                }
                Err(err) => {
                    tracing::warn!(error = %err, "Cache read failed, reading store");
                }
            }
            self.store.fetch_active(project).await
        }
        .instrument(span)
        .await
    }

    /// Version numbers of `project` in insertion order.
    pub async fn list_versions(&self, project: &str) -> YoconfResult<Vec<Version>> {
        validate_project(project)?;
        self.store.list_versions(project).await
    }

    /// Roll-on snapshots of `project` in insertion order.
    pub async fn list_snapshots(&self, project: &str) -> YoconfResult<Vec<Snapshot>> {
        validate_project(project)?;
        self.store.list_snapshots(project).await
    }

    // ========================================================================
    // DELETE
    // ========================================================================

    /// Remove one version from the store.
    ///
    /// Single attempt, and cached entries for the version are left to expire.
    pub async fn delete_chunk(&self, project: &str, version: Version) -> YoconfResult<()> {
        validate_project(project)?;
        validate_version(version)?;
        let span = tracing::info_span!(parent: &self.span, "delete_chunk", project, version);

        self.store
            .delete_version(project, version)
            .instrument(span.clone())
            .await?;
        span.in_scope(|| tracing::info!("Chunk deleted"));
        Ok(())
    }

    pub async fn health_check(&self) -> YoconfResult<()> {
        self.store.health_check().await
    }
}

/// Most recently cached entry whose key is flagged active.
///
/// Ties on `cached_at` go to the higher version.
fn latest_active(entries: Vec<(CacheKey, CacheEntry)>) -> Option<CacheEntry> {
    entries
        .into_iter()
        .filter(|(key, _)| key.is_active())
        .map(|(_, entry)| entry)
        .max_by(|a, b| {
            a.cached_at
                .cmp(&b.cached_at)
                .then(a.chunk.version.cmp(&b.chunk.version))
        })
}
