//! Per-project write locks
//!
//! Serializes create and roll-on for the same project inside one process so
//! their store and cache steps cannot interleave. Different projects never
//! contend. A project's entry lives only while someone holds or waits on it.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

type LockMap = DashMap<String, Arc<Mutex<()>>>;

/// Map of project name to its async mutex.
#[derive(Debug, Clone, Default)]
pub struct ProjectLocks {
    locks: Arc<LockMap>,
}

impl ProjectLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `project`.
    ///
    /// The returned guard releases the lock when dropped, and removes the
    /// project's entry if no other caller is holding or waiting on it.
    pub async fn acquire(&self, project: &str) -> ProjectGuard {
        let lock = self
            .locks
            .entry(project.to_string())
            .or_default()
            .value()
            .clone();
        ProjectGuard {
            guard: Some(lock.lock_owned().await),
            project: project.to_string(),
            locks: Arc::clone(&self.locks),
        }
    }

    /// Number of tracked projects.
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

/// Exclusive access to one project.
pub struct ProjectGuard {
    guard: Option<OwnedMutexGuard<()>>,
    project: String,
    locks: Arc<LockMap>,
}

impl Drop for ProjectGuard {
    fn drop(&mut self) {
        drop(self.guard.take());
        // Only the map's own reference left: nobody holds or waits on it.
        // Waiters clone the Arc under the shard lock, so this check is atomic
        // with respect to `acquire`.
        self.locks
            .remove_if(self.project.as_str(), |_, lock| Arc::strong_count(lock) == 1);
    }
}
