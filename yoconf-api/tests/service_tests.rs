//! ChunkService behaviour over fault-injecting in-memory backends.
//!
//! Retry timing is asserted on tokio's paused clock.


use std::sync::Arc;
use std::time::Duration;

use test_support::*;
use tokio::time::Instant;
use yoconf_core::{Chunk, ErrorKind};
use yoconf_storage::{CacheBackend, CacheKey, ConfigStore};
use yoconf_test_utils::assertions::{assert_kind, assert_ok};
use yoconf_test_utils::fixtures::{billing_v1, billing_v2, chunk};
use yoconf_test_utils::{CacheOp, StoreOp};

// ============================================================================
// CREATE + GET
// ============================================================================

#[tokio::test(start_paused = true)]
async fn create_then_get_serves_cache_then_store() {
    let h = harness();
    h.service.create_config(billing_v1()).await.unwrap();

    let cached = h.service.get_config("billing").await.unwrap();
    assert_eq!(cached.data, billing_v1().data);
    assert_eq!(h.store.calls(StoreOp::FetchActive), 0);

    h.cache.inner().clear();
    let stored = h.service.get_config("billing").await.unwrap();
    assert_eq!(stored.data, billing_v1().data);
    assert_eq!(h.store.calls(StoreOp::FetchActive), 1);

    // The fallback path does not repopulate the cache.
    assert!(h.cache.inner().is_empty());
    h.service.get_config("billing").await.unwrap();
    assert_eq!(h.store.calls(StoreOp::FetchActive), 2);
}

#[tokio::test(start_paused = true)]
async fn create_demotes_previous_active_version() {
    let h = harness();
    h.service.create_config(billing_v1()).await.unwrap();
    h.service
        .create_config(chunk("billing", 2, "A=2", true))
        .await
        .unwrap();

    let rows = h.store.inner().rows("billing");
    assert_eq!(rows.len(), 2);
    assert!(!rows[0].active);
    assert!(rows[1].active);
    assert_eq!(h.service.get_config("billing").await.unwrap().version, 2);
}

#[tokio::test(start_paused = true)]
async fn create_rejects_invalid_input_before_any_call() {
    let h = harness();
    assert_kind(
        &h.service.create_config(chunk("  ", 1, "x", true)).await,
        ErrorKind::InvalidInput,
    );
    assert_kind(
        &h.service.create_config(chunk("billing", 0, "x", true)).await,
        ErrorKind::InvalidInput,
    );
    assert_eq!(h.store.calls(StoreOp::FetchVersion), 0);
    assert_eq!(h.cache.calls(CacheOp::Put), 0);
}

#[tokio::test(start_paused = true)]
async fn create_retries_transient_store_failures_with_backoff() {
    let h = harness();
    h.store.fail_next(StoreOp::FetchVersion, 2);

    let start = Instant::now();
    h.service.create_config(billing_v1()).await.unwrap();

    assert_eq!(start.elapsed(), Duration::from_secs(1 + 2));
    assert_eq!(h.store.calls(StoreOp::FetchVersion), 3);
    assert_eq!(h.store.inner().chunk_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn create_store_exhaustion_skips_cache() {
    let h = harness();
    h.store.fail_always(StoreOp::Insert);

    let start = Instant::now();
    let result = h.service.create_config(billing_v1()).await;

    assert_kind(&result, ErrorKind::StoreUnavailable);
    assert_eq!(start.elapsed(), Duration::from_secs(1 + 2 + 4 + 8 + 16));
    assert_eq!(h.store.calls(StoreOp::Insert), 5);
    assert_eq!(h.cache.calls(CacheOp::Put), 0);
}

#[tokio::test(start_paused = true)]
async fn create_duplicate_version_is_not_retried() {
    let h = harness();
    h.service.create_config(billing_v1()).await.unwrap();

    let result = h
        .service
        .create_config(chunk("billing", 1, "different", true))
        .await;
    assert_kind(&result, ErrorKind::DuplicateVersion);
    assert_eq!(h.store.calls(StoreOp::FetchVersion), 2);
}

#[tokio::test(start_paused = true)]
async fn create_cache_failure_is_reported_and_replay_is_idempotent() {
    let h = harness();
    h.cache.fail_always(CacheOp::Put);

    let result = h.service.create_config(billing_v1()).await;
    assert_kind(&result, ErrorKind::CacheUnavailable);
    assert_eq!(h.cache.calls(CacheOp::Put), 5);

    // The store write is not rolled back.
    assert_eq!(h.store.inner().chunk_count(), 1);

    h.cache.heal();
    assert_ok(&h.service.create_config(billing_v1()).await);
    assert_eq!(h.store.inner().chunk_count(), 1);
    assert_eq!(h.store.calls(StoreOp::Insert), 1);
    assert_eq!(h.cache.inner().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn create_replay_after_lost_insert_ack_succeeds() {
    let h = harness();
    h.store.lose_ack_next(StoreOp::Insert, 1);

    h.service.create_config(billing_v1()).await.unwrap();
    assert_eq!(h.store.inner().chunk_count(), 1);
    assert_eq!(h.store.inner().active_count("billing"), 1);
}

#[tokio::test(start_paused = true)]
async fn create_replay_after_roll_on_is_rejected_and_not_cached() {
    let h = harness();
    h.service
        .create_config(chunk("billing", 1, "A=1", true))
        .await
        .unwrap();
    h.service
        .create_config(chunk("billing", 2, "A=2", true))
        .await
        .unwrap();
    h.service.roll_on("billing", 1).await.unwrap();
    let puts = h.cache.calls(CacheOp::Put);

    // v2 is stored inactive now, so the replayed active create no longer matches.
    let replay = h
        .service
        .create_config(chunk("billing", 2, "A=2", true))
        .await;
    assert_kind(&replay, ErrorKind::DuplicateVersion);
    assert_eq!(h.cache.calls(CacheOp::Put), puts);

    let stale = h.cache.inner().get(&CacheKey::new("billing", 2, true)).await;
    assert!(matches!(stale, Ok(None)));
    let served = h.service.get_config("billing").await.unwrap();
    assert_eq!(served.version, 1);
    assert_eq!(served.data, "A=1");
    assert_eq!(h.store.inner().fetch_active("billing").await.unwrap().version, 1);
}

#[tokio::test(start_paused = true)]
async fn create_replay_of_inactive_row_caches_it_inactive() {
    let h = harness();
    h.service.create_config(billing_v1()).await.unwrap();
    h.service
        .create_config(chunk("billing", 2, "A=2", false))
        .await
        .unwrap();

    assert_ok(
        &h.service
            .create_config(chunk("billing", 2, "A=2", false))
            .await,
    );
    let inactive = h.cache.inner().get(&CacheKey::new("billing", 2, false)).await;
    assert!(matches!(inactive, Ok(Some(_))));
    let active = h.cache.inner().get(&CacheKey::new("billing", 2, true)).await;
    assert!(matches!(active, Ok(None)));
}

// ============================================================================
// ROLL ON
// ============================================================================

#[tokio::test(start_paused = true)]
async fn billing_roll_back_scenario() {
    let h = harness();
    h.service
        .create_config(chunk("billing", 1, "A=1", true))
        .await
        .unwrap();
    h.service
        .create_config(chunk("billing", 2, "A=2", true))
        .await
        .unwrap();
    assert!(!h.store.inner().rows("billing")[0].active);

    let activated = h.service.roll_on("billing", 1).await.unwrap();
    assert_eq!(activated.version, 1);
    assert!(activated.active);

    let current = h.service.get_config("billing").await.unwrap();
    assert_eq!(current.data, "A=1");

    let rows = h.store.inner().rows("billing");
    assert_eq!(rows.len(), 2);
    assert!(rows.iter().any(|r| r.version == 1 && r.active));
    assert!(rows.iter().any(|r| r.version == 2 && !r.active));

    let snapshots = h.service.list_snapshots("billing").await.unwrap();
    assert_eq!(snapshots.len(), 1);
    assert_eq!(snapshots[0].version, 2);
    assert_eq!(snapshots[0].data, "A=2");

    // The outgoing active entry is gone from the cache.
    let stale = h.cache.inner().get(&CacheKey::new("billing", 2, true)).await;
    assert!(matches!(stale, Ok(None)));
}

#[tokio::test(start_paused = true)]
async fn roll_on_missing_version_leaves_flags_unchanged() {
    let h = harness();
    h.service.create_config(billing_v1()).await.unwrap();

    let result = h.service.roll_on("billing", 9).await;
    assert_kind(&result, ErrorKind::NotFound);
    assert_eq!(h.store.calls(StoreOp::ActivateVersion), 1);

    let active = h.store.inner().fetch_active("billing").await.unwrap();
    assert_eq!(active.version, 1);
    assert_eq!(h.store.inner().snapshot_count(), 0);
    assert_eq!(h.cache.calls(CacheOp::Delete), 0);
}

#[tokio::test(start_paused = true)]
async fn roll_on_rejects_invalid_input() {
    let h = harness();
    assert_kind(&h.service.roll_on("", 1).await, ErrorKind::InvalidInput);
    assert_kind(&h.service.roll_on("billing", 0).await, ErrorKind::InvalidInput);
    assert_eq!(h.store.calls(StoreOp::ActivateVersion), 0);
}

#[tokio::test(start_paused = true)]
async fn roll_on_cache_read_failure_checkpoints_empty_data() {
    let h = harness();
    h.service.create_config(billing_v1()).await.unwrap();
    h.service
        .create_config(chunk("billing", 2, "A=2", true))
        .await
        .unwrap();

    h.cache.fail_next(CacheOp::Get, 1);
    h.service.roll_on("billing", 1).await.unwrap();

    let snapshots = h.service.list_snapshots("billing").await.unwrap();
    assert_eq!(snapshots.len(), 1);
    assert_eq!(snapshots[0].version, 2);
    assert_eq!(snapshots[0].data, "");
}

#[tokio::test(start_paused = true)]
async fn roll_on_without_previous_active_skips_checkpoint() {
    let h = harness();
    h.service.create_config(billing_v2()).await.unwrap();

    let activated = h.service.roll_on("billing", 2).await.unwrap();
    assert_eq!(activated.version, 2);
    assert_eq!(h.store.inner().snapshot_count(), 0);
    assert_eq!(h.cache.calls(CacheOp::Delete), 0);
    assert_eq!(h.service.get_config("billing").await.unwrap().version, 2);
}

#[tokio::test(start_paused = true)]
async fn roll_on_cache_delete_exhaustion_leaves_store_moved() {
    let h = harness();
    h.service.create_config(billing_v1()).await.unwrap();
    h.service
        .create_config(chunk("billing", 2, "A=2", true))
        .await
        .unwrap();
    h.cache.fail_always(CacheOp::Delete);

    let start = Instant::now();
    let result = h.service.roll_on("billing", 1).await;
    assert_kind(&result, ErrorKind::CacheUnavailable);
    assert_eq!(start.elapsed(), Duration::from_secs(1 + 2 + 4 + 8 + 16));

    // Activation already happened; the checkpoint did not.
    let active = h.store.inner().fetch_active("billing").await.unwrap();
    assert_eq!(active.version, 1);
    assert_eq!(h.store.inner().snapshot_count(), 0);

    // Replaying after recovery converges on the same active version.
    h.cache.heal();
    let activated = h.service.roll_on("billing", 1).await.unwrap();
    assert_eq!(activated.version, 1);
    assert_eq!(h.store.inner().active_count("billing"), 1);
}

#[tokio::test(start_paused = true)]
async fn roll_on_snapshot_insert_retries_then_succeeds() {
    let h = harness();
    h.service.create_config(billing_v1()).await.unwrap();
    h.service.create_config(billing_v2()).await.unwrap();
    h.service.roll_on("billing", 2).await.unwrap();
    h.store.fail_next(StoreOp::InsertSnapshot, 3);

    let start = Instant::now();
    h.service.roll_on("billing", 1).await.unwrap();
    assert_eq!(start.elapsed(), Duration::from_secs(1 + 2 + 4));

    // Creating v2 left no active row, so only the second roll-on checkpoints.
    let snapshots = h.service.list_snapshots("billing").await.unwrap();
    assert_eq!(snapshots.len(), 1);
    assert_eq!(snapshots[0].data, billing_v2().data);
}

#[tokio::test(start_paused = true)]
async fn roll_on_warm_put_failure_is_not_surfaced() {
    let h = harness();
    h.service.create_config(billing_v1()).await.unwrap();
    h.service.create_config(billing_v2()).await.unwrap();
    h.cache.fail_next(CacheOp::Put, 1);

    let activated = h.service.roll_on("billing", 2).await.unwrap();
    assert_eq!(activated.version, 2);
    assert_eq!(h.cache.calls(CacheOp::Put), 3);
}

#[tokio::test(start_paused = true)]
async fn concurrent_roll_ons_leave_one_active_row() {
    let h = harness();
    for v in 1..=3 {
        h.service
            .create_config(chunk("billing", v, &format!("A={v}"), v == 3))
            .await
            .unwrap();
    }

    let service = Arc::new(h.service.clone());
    let handles: Vec<_> = [1, 2, 1, 2]
        .into_iter()
        .map(|v| {
            let service = service.clone();
            tokio::spawn(async move { service.roll_on("billing", v).await })
        })
        .collect();
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    assert_eq!(h.store.inner().active_count("billing"), 1);
}

// ============================================================================
// READS AND DELETE
// ============================================================================

#[tokio::test(start_paused = true)]
async fn get_config_unknown_project_is_not_found() {
    let h = harness();
    assert_kind(&h.service.get_config("billing").await, ErrorKind::NotFound);
}

#[tokio::test(start_paused = true)]
async fn get_config_cache_error_falls_back_to_store() {
    let h = harness();
    h.service.create_config(billing_v1()).await.unwrap();
    h.cache.fail_next(CacheOp::ProjectEntries, 1);

    let chunk = h.service.get_config("billing").await.unwrap();
    assert_eq!(chunk.version, 1);
    assert_eq!(h.store.calls(StoreOp::FetchActive), 1);
}

#[tokio::test(start_paused = true)]
async fn get_config_store_read_is_single_attempt() {
    let h = harness();
    h.service.create_config(billing_v1()).await.unwrap();
    h.cache.inner().clear();
    h.store.fail_next(StoreOp::FetchActive, 1);

    let start = Instant::now();
    let result = h.service.get_config("billing").await;
    assert_kind(&result, ErrorKind::StoreUnavailable);
    assert_eq!(start.elapsed(), Duration::ZERO);
    assert_eq!(h.store.calls(StoreOp::FetchActive), 1);
}

#[tokio::test(start_paused = true)]
async fn delete_active_version_serves_stale_cache_until_evicted() {
    let h = harness();
    h.service.create_config(billing_v1()).await.unwrap();

    h.service.delete_chunk("billing", 1).await.unwrap();
    assert_eq!(h.store.inner().chunk_count(), 0);

    // Stale until the entry expires.
    let stale: Chunk = h.service.get_config("billing").await.unwrap();
    assert_eq!(stale.version, 1);

    h.cache.inner().evict(&CacheKey::new("billing", 1, true));
    assert_kind(&h.service.get_config("billing").await, ErrorKind::NotFound);
}

#[tokio::test(start_paused = true)]
async fn delete_is_single_attempt() {
    let h = harness();
    h.service.create_config(billing_v1()).await.unwrap();
    h.store.fail_next(StoreOp::DeleteVersion, 1);

    assert_kind(
        &h.service.delete_chunk("billing", 1).await,
        ErrorKind::StoreUnavailable,
    );
    assert_eq!(h.store.calls(StoreOp::DeleteVersion), 1);
    assert_kind(
        &h.service.delete_chunk("billing", 7).await,
        ErrorKind::NotFound,
    );
}

#[tokio::test(start_paused = true)]
async fn list_versions_in_insertion_order() {
    let h = harness();
    for v in [3, 1, 2] {
        h.service
            .create_config(chunk("billing", v, "x", false))
            .await
            .unwrap();
    }
    assert_eq!(
        h.service.list_versions("billing").await.unwrap(),
        vec![3, 1, 2]
    );
}

// ============================================================================
// OPERATION TIMEOUT
// ============================================================================

#[tokio::test(start_paused = true)]
async fn operation_timeout_stops_new_attempts_after_current_sleep() {
    let h = harness();
    let service = h
        .service
        .clone()
        .with_operation_timeout(Duration::from_millis(2_500));
    h.store.fail_always(StoreOp::FetchVersion);

    let start = Instant::now();
    let result = service.create_config(billing_v1()).await;

    assert_kind(&result, ErrorKind::StoreUnavailable);
    // The 2s sleep that crosses the deadline is not interrupted.
    assert_eq!(start.elapsed(), Duration::from_secs(3));
    assert_eq!(h.store.calls(StoreOp::FetchVersion), 2);
}
