//! yoconf Test Utilities
//!
//! Shared test infrastructure for the yoconf workspace:
//! - Proptest generators for chunks and project names
//! - Fixtures for common scenarios
//! - Fault-injecting store and cache wrappers
//! - Assertions on the error taxonomy

pub use yoconf_core::{
    Chunk, ErrorKind, RetryPolicy, Snapshot, Version, YoconfError, YoconfResult,
};
pub use yoconf_storage::{
    Activation, CacheBackend, CacheEntry, CacheKey, CacheStats, ConfigStore,
    InMemoryCacheBackend, InMemoryConfigStore,
};

use async_trait::async_trait;
use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

// ============================================================================
// FAULT INJECTION
// ============================================================================

#[derive(Debug, Clone, Copy, Default)]
struct FaultPlan {
    /// Fail before reaching the inner backend.
    before: u32,
    /// Apply on the inner backend, then report failure anyway.
    after: u32,
    always: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Injection {
    None,
    Before,
    After,
}

#[derive(Debug)]
struct FaultTable<Op> {
    plans: Mutex<HashMap<Op, FaultPlan>>,
    calls: Mutex<HashMap<Op, u32>>,
}

impl<Op> Default for FaultTable<Op> {
    fn default() -> Self {
        Self {
            plans: Mutex::new(HashMap::new()),
            calls: Mutex::new(HashMap::new()),
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl<Op: Copy + Eq + Hash> FaultTable<Op> {
    fn update(&self, op: Op, f: impl FnOnce(&mut FaultPlan)) {
        f(lock(&self.plans).entry(op).or_default());
    }

    fn record(&self, op: Op) -> Injection {
        *lock(&self.calls).entry(op).or_default() += 1;

        let mut plans = lock(&self.plans);
        let Some(plan) = plans.get_mut(&op) else {
            return Injection::None;
        };
        if plan.always {
            Injection::Before
        } else if plan.before > 0 {
            plan.before -= 1;
            Injection::Before
        } else if plan.after > 0 {
            plan.after -= 1;
            Injection::After
        } else {
            Injection::None
        }
    }

    fn calls(&self, op: Op) -> u32 {
        lock(&self.calls).get(&op).copied().unwrap_or(0)
    }

    fn heal(&self) {
        lock(&self.plans).clear();
    }

    async fn call<T, F, Fut>(
        &self,
        op: Op,
        fail: impl Fn(Op) -> YoconfError,
        f: F,
    ) -> YoconfResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = YoconfResult<T>>,
    {
        match self.record(op) {
            Injection::Before => Err(fail(op)),
            Injection::After => {
                f().await?;
                Err(fail(op))
            }
            Injection::None => f().await,
        }
    }
}

/// Store operations a [`FlakyStore`] can fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    Insert,
    DemoteActive,
    ActivateVersion,
    FetchActive,
    FetchVersion,
    ListVersions,
    DeleteVersion,
    InsertSnapshot,
    ListSnapshots,
    HealthCheck,
}

/// Cache operations a [`FlakyCache`] can fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheOp {
    Get,
    Put,
    Delete,
    ProjectEntries,
    Stats,
}

/// [`ConfigStore`] wrapper that returns `StoreUnavailable` on demand.
///
/// Every call is counted, failed or not.
#[derive(Debug, Clone)]
pub struct FlakyStore<S = InMemoryConfigStore> {
    inner: S,
    faults: Arc<FaultTable<StoreOp>>,
}

impl<S: ConfigStore> FlakyStore<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            faults: Arc::new(FaultTable::default()),
        }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Fail the next `n` calls of `op` without touching the inner store.
    pub fn fail_next(&self, op: StoreOp, n: u32) {
        self.faults.update(op, |plan| plan.before += n);
    }

    /// Apply the next `n` calls of `op`, then report them as failed.
    pub fn lose_ack_next(&self, op: StoreOp, n: u32) {
        self.faults.update(op, |plan| plan.after += n);
    }

    /// Fail every call of `op` until [`FlakyStore::heal`].
    pub fn fail_always(&self, op: StoreOp) {
        self.faults.update(op, |plan| plan.always = true);
    }

    pub fn heal(&self) {
        self.faults.heal();
    }

    /// Calls of `op` so far, including failed ones.
    pub fn calls(&self, op: StoreOp) -> u32 {
        self.faults.calls(op)
    }
}

fn store_fault(op: StoreOp) -> YoconfError {
    YoconfError::store_unavailable(format!("injected {:?} failure", op))
}

fn cache_fault(op: CacheOp) -> YoconfError {
    YoconfError::cache_unavailable(format!("injected {:?} failure", op))
}

#[async_trait]
impl<S: ConfigStore> ConfigStore for FlakyStore<S> {
    async fn insert(&self, chunk: &Chunk) -> YoconfResult<()> {
        self.faults
            .call(StoreOp::Insert, store_fault, || self.inner.insert(chunk))
            .await
    }

    async fn demote_active(&self, project: &str) -> YoconfResult<Vec<Chunk>> {
        self.faults
            .call(StoreOp::DemoteActive, store_fault, || {
                self.inner.demote_active(project)
            })
            .await
    }

    async fn activate_version(&self, project: &str, version: Version) -> YoconfResult<Activation> {
        self.faults
            .call(StoreOp::ActivateVersion, store_fault, || {
                self.inner.activate_version(project, version)
            })
            .await
    }

    async fn fetch_active(&self, project: &str) -> YoconfResult<Chunk> {
        self.faults
            .call(StoreOp::FetchActive, store_fault, || {
                self.inner.fetch_active(project)
            })
            .await
    }

    async fn fetch_version(&self, project: &str, version: Version) -> YoconfResult<Option<Chunk>> {
        self.faults
            .call(StoreOp::FetchVersion, store_fault, || {
                self.inner.fetch_version(project, version)
            })
            .await
    }

    async fn list_versions(&self, project: &str) -> YoconfResult<Vec<Version>> {
        self.faults
            .call(StoreOp::ListVersions, store_fault, || {
                self.inner.list_versions(project)
            })
            .await
    }

    async fn delete_version(&self, project: &str, version: Version) -> YoconfResult<()> {
        self.faults
            .call(StoreOp::DeleteVersion, store_fault, || {
                self.inner.delete_version(project, version)
            })
            .await
    }

    async fn insert_snapshot(&self, snapshot: &Snapshot) -> YoconfResult<()> {
        self.faults
            .call(StoreOp::InsertSnapshot, store_fault, || {
                self.inner.insert_snapshot(snapshot)
            })
            .await
    }

    async fn list_snapshots(&self, project: &str) -> YoconfResult<Vec<Snapshot>> {
        self.faults
            .call(StoreOp::ListSnapshots, store_fault, || {
                self.inner.list_snapshots(project)
            })
            .await
    }

    async fn health_check(&self) -> YoconfResult<()> {
        self.faults
            .call(StoreOp::HealthCheck, store_fault, || self.inner.health_check())
            .await
    }
}

/// [`CacheBackend`] wrapper that returns `CacheUnavailable` on demand.
#[derive(Debug, Clone)]
pub struct FlakyCache<C = InMemoryCacheBackend> {
    inner: C,
    faults: Arc<FaultTable<CacheOp>>,
}

impl<C: CacheBackend> FlakyCache<C> {
    pub fn new(inner: C) -> Self {
        Self {
            inner,
            faults: Arc::new(FaultTable::default()),
        }
    }

    pub fn inner(&self) -> &C {
        &self.inner
    }

    pub fn fail_next(&self, op: CacheOp, n: u32) {
        self.faults.update(op, |plan| plan.before += n);
    }

    pub fn fail_always(&self, op: CacheOp) {
        self.faults.update(op, |plan| plan.always = true);
    }

    pub fn heal(&self) {
        self.faults.heal();
    }

    pub fn calls(&self, op: CacheOp) -> u32 {
        self.faults.calls(op)
    }
}

#[async_trait]
impl<C: CacheBackend> CacheBackend for FlakyCache<C> {
    async fn get(&self, key: &CacheKey) -> YoconfResult<Option<CacheEntry>> {
        self.faults
            .call(CacheOp::Get, cache_fault, || self.inner.get(key))
            .await
    }

    async fn put(&self, key: &CacheKey, chunk: &Chunk, ttl: Duration) -> YoconfResult<()> {
        self.faults
            .call(CacheOp::Put, cache_fault, || self.inner.put(key, chunk, ttl))
            .await
    }

    async fn delete(&self, key: &CacheKey) -> YoconfResult<()> {
        self.faults
            .call(CacheOp::Delete, cache_fault, || self.inner.delete(key))
            .await
    }

    async fn project_entries(&self, project: &str) -> YoconfResult<Vec<(CacheKey, CacheEntry)>> {
        self.faults
            .call(CacheOp::ProjectEntries, cache_fault, || {
                self.inner.project_entries(project)
            })
            .await
    }

    async fn stats(&self) -> YoconfResult<CacheStats> {
        self.faults
            .call(CacheOp::Stats, cache_fault, || self.inner.stats())
            .await
    }
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for yoconf types.

    use super::*;
    use proptest::prelude::*;

    /// Project names, including ones containing the cache key delimiter.
    pub fn arb_project() -> impl Strategy<Value = String> {
        prop_oneof![
            4 => "[a-z][a-z0-9_-]{0,15}",
            1 => "[a-z]{1,6}:[a-z0-9:]{1,8}",
        ]
    }

    pub fn arb_version() -> impl Strategy<Value = Version> {
        1u32..=10_000
    }

    pub fn arb_data() -> impl Strategy<Value = String> {
        prop_oneof![
            Just(String::new()),
            "[ -~]{1,64}",
            "\\{\"[a-z]{1,8}\": [0-9]{1,4}\\}",
        ]
    }

    pub fn arb_chunk() -> impl Strategy<Value = Chunk> {
        (arb_project(), arb_version(), arb_data(), any::<bool>())
            .prop_map(|(project, version, data, active)| Chunk::new(project, version, data, active))
    }

    /// Distinct versions of one project, in insertion order.
    pub fn arb_version_history(max: usize) -> impl Strategy<Value = Vec<Version>> {
        proptest::collection::hash_set(arb_version(), 1..=max.max(1))
            .prop_map(|set| set.into_iter().collect())
    }

    pub fn arb_retry_policy() -> impl Strategy<Value = RetryPolicy> {
        (1u32..=8, 1u64..=2_000)
            .prop_map(|(attempts, ms)| RetryPolicy::new(attempts, Duration::from_millis(ms)))
    }
}

// ============================================================================
// FIXTURES
// ============================================================================

pub mod fixtures {
    //! Pre-built values for common scenarios.

    use super::*;

    pub fn chunk(project: &str, version: Version, data: &str, active: bool) -> Chunk {
        Chunk::new(project, version, data, active)
    }

    /// `billing` v1, active.
    pub fn billing_v1() -> Chunk {
        chunk("billing", 1, r#"{"rate": 10}"#, true)
    }

    /// `billing` v2, inactive until rolled on.
    pub fn billing_v2() -> Chunk {
        chunk("billing", 2, r#"{"rate": 12}"#, false)
    }

    /// Fresh in-memory backends wrapped for fault injection.
    pub fn flaky_backends() -> (FlakyStore, FlakyCache) {
        (
            FlakyStore::new(InMemoryConfigStore::new()),
            FlakyCache::new(InMemoryCacheBackend::new()),
        )
    }
}

// ============================================================================
// ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Assertions on the yoconf error taxonomy.

    use super::*;

    /// Assert that a result failed with the given kind.
    #[track_caller]
    pub fn assert_kind<T: std::fmt::Debug>(result: &YoconfResult<T>, kind: ErrorKind) {
        match result {
            Err(err) => assert_eq!(err.kind(), kind, "Wrong error kind for {:?}", err),
            Ok(value) => panic!("Expected {:?} error, got Ok({:?})", kind, value),
        }
    }

    #[track_caller]
    pub fn assert_ok<T: std::fmt::Debug>(result: &YoconfResult<T>) {
        assert!(result.is_ok(), "Expected Ok, got Err: {:?}", result);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assertions::*;
    use fixtures::*;

    #[tokio::test]
    async fn test_fail_next_then_recovers() {
        let (store, _) = flaky_backends();
        store.fail_next(StoreOp::Insert, 2);

        assert_kind(&store.insert(&billing_v1()).await, ErrorKind::StoreUnavailable);
        assert_kind(&store.insert(&billing_v1()).await, ErrorKind::StoreUnavailable);
        assert_ok(&store.insert(&billing_v1()).await);
        assert_eq!(store.calls(StoreOp::Insert), 3);
        assert_eq!(store.inner().chunk_count(), 1);
    }

    #[tokio::test]
    async fn test_lost_ack_applies_write() {
        let (store, _) = flaky_backends();
        store.lose_ack_next(StoreOp::Insert, 1);

        assert_kind(&store.insert(&billing_v1()).await, ErrorKind::StoreUnavailable);
        assert_eq!(store.inner().chunk_count(), 1);
    }

    #[tokio::test]
    async fn test_fail_always_until_heal() {
        let (_, cache) = flaky_backends();
        cache.fail_always(CacheOp::ProjectEntries);
        for _ in 0..3 {
            assert_kind(
                &cache.project_entries("billing").await,
                ErrorKind::CacheUnavailable,
            );
        }
        cache.heal();
        assert_ok(&cache.project_entries("billing").await);
        assert_eq!(cache.calls(CacheOp::ProjectEntries), 4);
    }
}
