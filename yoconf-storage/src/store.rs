//! Config store contract and in-memory implementation.
//!
//! The store is the durable source of truth: one row per (project, version)
//! with an active flag, plus the snapshot rows written by roll-on.

use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use yoconf_core::{Chunk, Snapshot, StorageError, Version, YoconfError, YoconfResult};

// ============================================================================
// STORE TRAIT
// ============================================================================

/// Result of promoting a version to active.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Activation {
    /// The promoted row, now active.
    pub activated: Chunk,
    /// Rows that were active before the call, as they were before demotion.
    /// Empty when the target was already the only active row.
    pub demoted: Vec<Chunk>,
}

/// Durable keyed record table for chunks.
///
/// Implementations provide single-row operations; sequencing across rows and
/// across the cache belongs to the orchestrator.
#[async_trait]
pub trait ConfigStore: Send + Sync {
    /// Insert a new row. Fails with `DuplicateVersion` if (project, version) exists.
    async fn insert(&self, chunk: &Chunk) -> YoconfResult<()>;

    /// Clear the active flag on every active row of `project`.
    ///
    /// Returns the demoted rows as they were before the update. No active row
    /// is not an error.
    async fn demote_active(&self, project: &str) -> YoconfResult<Vec<Chunk>>;

    /// Demote the current active row(s) and mark `version` active.
    ///
    /// Fails with `NotFound`, leaving every flag untouched, if the version
    /// does not exist. Re-activating the active version demotes nothing.
    async fn activate_version(&self, project: &str, version: Version) -> YoconfResult<Activation>;

    /// The active row of `project`, or `NotFound`.
    ///
    /// If an interrupted transition left several rows active, the most
    /// recently inserted one wins.
    async fn fetch_active(&self, project: &str) -> YoconfResult<Chunk>;

    async fn fetch_version(&self, project: &str, version: Version) -> YoconfResult<Option<Chunk>>;

    /// Version numbers of `project` in insertion order.
    async fn list_versions(&self, project: &str) -> YoconfResult<Vec<Version>>;

    /// Remove exactly one row, or fail with `NotFound`.
    async fn delete_version(&self, project: &str, version: Version) -> YoconfResult<()>;

    /// Persist a roll-on snapshot. Writing the same `snapshot_id` twice is a no-op.
    async fn insert_snapshot(&self, snapshot: &Snapshot) -> YoconfResult<()>;

    /// Snapshots of `project` in insertion order.
    async fn list_snapshots(&self, project: &str) -> YoconfResult<Vec<Snapshot>>;

    /// Cheap connectivity check for readiness.
    async fn health_check(&self) -> YoconfResult<()>;
}

// ============================================================================
// IN-MEMORY STORE
// ============================================================================

/// In-memory store for tests and single-node development.
#[derive(Debug, Clone, Default)]
pub struct InMemoryConfigStore {
    /// Rows in insertion order.
    chunks: Arc<RwLock<Vec<Chunk>>>,
    snapshots: Arc<RwLock<Vec<Snapshot>>>,
}

impl InMemoryConfigStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clear all data.
    pub fn clear(&self) {
        if let Ok(mut c) = self.chunks.write() {
            c.clear();
        }
        if let Ok(mut s) = self.snapshots.write() {
            s.clear();
        }
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.read().map(|c| c.len()).unwrap_or(0)
    }

    pub fn snapshot_count(&self) -> usize {
        self.snapshots.read().map(|s| s.len()).unwrap_or(0)
    }

    /// All rows of `project`, in insertion order.
    pub fn rows(&self, project: &str) -> Vec<Chunk> {
        self.chunks
            .read()
            .map(|c| c.iter().filter(|r| r.project == project).cloned().collect())
            .unwrap_or_default()
    }

    /// Number of rows of `project` currently flagged active.
    pub fn active_count(&self, project: &str) -> usize {
        self.rows(project).iter().filter(|r| r.active).count()
    }
}

fn demote_all(rows: &mut [Chunk], project: &str, except: Option<Version>) -> Vec<Chunk> {
    let mut demoted = Vec::new();
    for row in rows
        .iter_mut()
        .filter(|r| r.project == project && r.active && Some(r.version) != except)
    {
        demoted.push(row.clone());
        row.active = false;
    }
    demoted
}

#[async_trait]
impl ConfigStore for InMemoryConfigStore {
    async fn insert(&self, chunk: &Chunk) -> YoconfResult<()> {
        let mut rows = self
            .chunks
            .write()
            .map_err(|_| StorageError::LockPoisoned)?;
        if rows
            .iter()
            .any(|r| r.project == chunk.project && r.version == chunk.version)
        {
            return Err(StorageError::DuplicateVersion {
                project: chunk.project.clone(),
                version: chunk.version,
            }
            .into());
        }
        rows.push(chunk.clone());
        Ok(())
    }

    async fn demote_active(&self, project: &str) -> YoconfResult<Vec<Chunk>> {
        let mut rows = self
            .chunks
            .write()
            .map_err(|_| StorageError::LockPoisoned)?;
        Ok(demote_all(&mut rows, project, None))
    }

    async fn activate_version(&self, project: &str, version: Version) -> YoconfResult<Activation> {
        let mut rows = self
            .chunks
            .write()
            .map_err(|_| StorageError::LockPoisoned)?;
        let target = rows
            .iter()
            .position(|r| r.project == project && r.version == version)
            .ok_or_else(|| YoconfError::not_found(project, Some(version)))?;

        let demoted = demote_all(&mut rows, project, Some(version));
        rows[target].active = true;
        Ok(Activation {
            activated: rows[target].clone(),
            demoted,
        })
    }

    async fn fetch_active(&self, project: &str) -> YoconfResult<Chunk> {
        let rows = self
            .chunks
            .read()
            .map_err(|_| StorageError::LockPoisoned)?;
        rows.iter()
            .rev()
            .find(|r| r.project == project && r.active)
            .cloned()
            .ok_or_else(|| YoconfError::not_found(project, None))
    }

    async fn fetch_version(&self, project: &str, version: Version) -> YoconfResult<Option<Chunk>> {
        let rows = self
            .chunks
            .read()
            .map_err(|_| StorageError::LockPoisoned)?;
        Ok(rows
            .iter()
            .find(|r| r.project == project && r.version == version)
            .cloned())
    }

    async fn list_versions(&self, project: &str) -> YoconfResult<Vec<Version>> {
        let rows = self
            .chunks
            .read()
            .map_err(|_| StorageError::LockPoisoned)?;
        Ok(rows
            .iter()
            .filter(|r| r.project == project)
            .map(|r| r.version)
            .collect())
    }

    async fn delete_version(&self, project: &str, version: Version) -> YoconfResult<()> {
        let mut rows = self
            .chunks
            .write()
            .map_err(|_| StorageError::LockPoisoned)?;
        let index = rows
            .iter()
            .position(|r| r.project == project && r.version == version)
            .ok_or_else(|| YoconfError::not_found(project, Some(version)))?;
        rows.remove(index);
        Ok(())
    }

    async fn insert_snapshot(&self, snapshot: &Snapshot) -> YoconfResult<()> {
        let mut snapshots = self
            .snapshots
            .write()
            .map_err(|_| StorageError::LockPoisoned)?;
        if !snapshots
            .iter()
            .any(|s| s.snapshot_id == snapshot.snapshot_id)
        {
            snapshots.push(snapshot.clone());
        }
        Ok(())
    }

    async fn list_snapshots(&self, project: &str) -> YoconfResult<Vec<Snapshot>> {
        let snapshots = self
            .snapshots
            .read()
            .map_err(|_| StorageError::LockPoisoned)?;
        Ok(snapshots
            .iter()
            .filter(|s| s.project == project)
            .cloned()
            .collect())
    }

    async fn health_check(&self) -> YoconfResult<()> {
        self.chunks
            .read()
            .map(|_| ())
            .map_err(|_| StorageError::LockPoisoned.into())
    }
}
