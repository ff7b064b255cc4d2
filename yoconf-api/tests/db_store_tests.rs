//! PostgreSQL-backed ConfigStore tests.
//!
//! Run with `--features db-tests` against a database reachable through the
//! `YOCONF_DB_*` environment variables.

#![cfg(feature = "db-tests")]

use uuid::Uuid;
use yoconf_api::{DbClient, DbConfig};
use yoconf_core::{Chunk, ErrorKind, Snapshot, YoconfConfig, YoconfResult};
use yoconf_storage::ConfigStore;

async fn test_db() -> YoconfResult<DbClient> {
    let mut config = YoconfConfig::default();
    config.apply_env_overrides_from(|key| std::env::var(key).ok())?;
    DbClient::connect(&DbConfig::from(&config.database)).await
}

/// Unique project per test so runs do not collide.
fn project() -> String {
    format!("test-{}", Uuid::now_v7())
}

#[tokio::test]
async fn db_insert_and_duplicate() -> YoconfResult<()> {
    let db = test_db().await?;
    let p = project();

    db.insert(&Chunk::new(p.as_str(), 1, "A=1", true)).await?;
    let err = db
        .insert(&Chunk::new(p.as_str(), 1, "A=1", true))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::DuplicateVersion);

    let fetched = db.fetch_version(&p, 1).await?.unwrap();
    assert_eq!(fetched.data, "A=1");
    assert!(db.fetch_version(&p, 2).await?.is_none());
    Ok(())
}

#[tokio::test]
async fn db_activate_swaps_flags() -> YoconfResult<()> {
    let db = test_db().await?;
    let p = project();
    db.insert(&Chunk::new(p.as_str(), 1, "A=1", true)).await?;
    db.insert(&Chunk::new(p.as_str(), 2, "A=2", false)).await?;

    let activation = db.activate_version(&p, 2).await?;
    assert_eq!(activation.activated.version, 2);
    assert_eq!(activation.demoted.len(), 1);
    assert_eq!(activation.demoted[0].version, 1);
    assert_eq!(db.fetch_active(&p).await?.version, 2);

    // Re-activating is a no-op.
    let again = db.activate_version(&p, 2).await?;
    assert!(again.demoted.is_empty());

    let err = db.activate_version(&p, 9).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert_eq!(db.fetch_active(&p).await?.version, 2);
    Ok(())
}

#[tokio::test]
async fn db_demote_and_list_order() -> YoconfResult<()> {
    let db = test_db().await?;
    let p = project();
    for v in [3, 1, 2] {
        db.insert(&Chunk::new(p.as_str(), v, "x", v == 2)).await?;
    }
    assert_eq!(db.list_versions(&p).await?, vec![3, 1, 2]);

    let demoted = db.demote_active(&p).await?;
    assert_eq!(demoted.len(), 1);
    assert!(db.demote_active(&p).await?.is_empty());
    assert_eq!(db.fetch_active(&p).await.unwrap_err().kind(), ErrorKind::NotFound);
    Ok(())
}

#[tokio::test]
async fn db_delete_and_snapshots() -> YoconfResult<()> {
    let db = test_db().await?;
    let p = project();
    db.insert(&Chunk::new(p.as_str(), 1, "A=1", false)).await?;

    db.delete_version(&p, 1).await?;
    assert_eq!(
        db.delete_version(&p, 1).await.unwrap_err().kind(),
        ErrorKind::NotFound
    );

    let snapshot = Snapshot::new(p.as_str(), 1, "A=1");
    db.insert_snapshot(&snapshot).await?;
    db.insert_snapshot(&snapshot).await?;
    let snapshots = db.list_snapshots(&p).await?;
    assert_eq!(snapshots.len(), 1);
    assert_eq!(snapshots[0].snapshot_id, snapshot.snapshot_id);

    db.health_check().await
}
