//! Database Connection Pool Module
//!
//! PostgreSQL implementation of [`ConfigStore`] using deadpool-postgres.
//! Chunks live in `chunks` keyed by (project, version); roll-on
//! snapshots live in `chunk_snapshots` keyed by snapshot id. A `seq`
//! column on both tables records insertion order.

use async_trait::async_trait;
use deadpool_postgres::{Config, ManagerConfig, Pool, PoolConfig, RecyclingMethod, Runtime};
use std::time::Duration;
use tokio_postgres::error::SqlState;
use tokio_postgres::{NoTls, Row};
use yoconf_core::{
    Chunk, DatabaseSettings, Snapshot, StorageError, Timestamp, Version, YoconfError,
    YoconfResult,
};
use yoconf_storage::{Activation, ConfigStore};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS chunks (
    project    TEXT        NOT NULL,
    version    BIGINT      NOT NULL CHECK (version >= 1),
    data       TEXT        NOT NULL,
    active     BOOLEAN     NOT NULL DEFAULT FALSE,
    seq        BIGSERIAL,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    PRIMARY KEY (project, version)
);
CREATE INDEX IF NOT EXISTS chunks_active_idx
    ON chunks (project) WHERE active;

CREATE TABLE IF NOT EXISTS chunk_snapshots (
    snapshot_id UUID        PRIMARY KEY,
    project     TEXT        NOT NULL,
    version     BIGINT      NOT NULL,
    data        TEXT        NOT NULL,
    taken_at    TIMESTAMPTZ NOT NULL,
    seq         BIGSERIAL
);
CREATE INDEX IF NOT EXISTS chunk_snapshots_project_idx
    ON chunk_snapshots (project, seq);
"#;

// ============================================================================
// CONNECTION POOL CONFIGURATION
// ============================================================================

/// Database connection pool configuration.
#[derive(Debug, Clone)]
pub struct DbConfig {
    pub host: String,
    pub port: u16,
    pub dbname: String,
    pub user: String,
    pub password: String,
    /// Maximum pool size
    pub max_size: usize,
    /// Wait and connect timeout for pooled connections
    pub timeout: Duration,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self::from(&DatabaseSettings::default())
    }
}

impl From<&DatabaseSettings> for DbConfig {
    fn from(settings: &DatabaseSettings) -> Self {
        Self {
            host: settings.host.clone(),
            port: settings.port,
            dbname: settings.dbname.clone(),
            user: settings.user.clone(),
            password: settings.password.clone(),
            max_size: settings.max_size,
            timeout: Duration::from_secs(5),
        }
    }
}

impl DbConfig {
    /// Create a connection pool from this configuration.
    ///
    /// No connection is opened here; the first checkout connects.
    pub fn create_pool(&self) -> YoconfResult<Pool> {
        let mut cfg = Config::new();
        cfg.host = Some(self.host.clone());
        cfg.port = Some(self.port);
        cfg.dbname = Some(self.dbname.clone());
        cfg.user = Some(self.user.clone());
        cfg.password = Some(self.password.clone());

        cfg.manager = Some(ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        });

        let mut pool_cfg = PoolConfig::new(self.max_size);
        pool_cfg.timeouts.wait = Some(self.timeout);
        pool_cfg.timeouts.create = Some(self.timeout);
        cfg.pool = Some(pool_cfg);

        cfg.create_pool(Some(Runtime::Tokio1), NoTls)
            .map_err(|e| YoconfError::store_unavailable(format!("Failed to create pool: {}", e)))
    }
}

// ============================================================================
// ERROR MAPPING
// ============================================================================

fn pool_err(err: deadpool_postgres::PoolError) -> YoconfError {
    tracing::debug!(error = ?err, "Connection pool error");
    YoconfError::store_unavailable(format!("Failed to acquire database connection: {}", err))
}

fn pg_err(err: tokio_postgres::Error) -> YoconfError {
    tracing::debug!(error = ?err, "Database error");
    YoconfError::store_unavailable(err.to_string())
}

/// Row decode failures point at a schema mismatch, which no retry can fix.
fn row_err(err: impl std::fmt::Display) -> YoconfError {
    StorageError::Corrupt {
        reason: format!("Unexpected row shape: {}", err),
    }
    .into()
}

fn to_db_version(version: Version) -> i64 {
    i64::from(version)
}

fn from_db_version(raw: i64) -> YoconfResult<Version> {
    Version::try_from(raw).map_err(|_| {
        StorageError::Corrupt {
            reason: format!("Stored version {} out of range", raw),
        }
        .into()
    })
}

fn chunk_from_row(row: &Row) -> YoconfResult<Chunk> {
    Ok(Chunk {
        project: row.try_get("project").map_err(row_err)?,
        version: from_db_version(row.try_get("version").map_err(row_err)?)?,
        data: row.try_get("data").map_err(row_err)?,
        active: row.try_get("active").map_err(row_err)?,
    })
}

fn snapshot_from_row(row: &Row) -> YoconfResult<Snapshot> {
    let taken_at: Timestamp = row.try_get("taken_at").map_err(row_err)?;
    Ok(Snapshot {
        snapshot_id: row.try_get("snapshot_id").map_err(row_err)?,
        project: row.try_get("project").map_err(row_err)?,
        version: from_db_version(row.try_get("version").map_err(row_err)?)?,
        data: row.try_get("data").map_err(row_err)?,
        taken_at,
    })
}

// ============================================================================
// DATABASE CLIENT WRAPPER
// ============================================================================

/// Database client that wraps a connection pool.
#[derive(Clone)]
pub struct DbClient {
    pool: Pool,
}

impl DbClient {
    /// Create a new database client with the given pool.
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    /// Create a new database client from configuration.
    pub fn from_config(config: &DbConfig) -> YoconfResult<Self> {
        let pool = config.create_pool()?;
        Ok(Self::new(pool))
    }

    /// Build the pool, create the tables if missing and verify connectivity.
    pub async fn connect(config: &DbConfig) -> YoconfResult<Self> {
        let client = Self::from_config(config)?;
        client.ensure_schema().await?;
        Ok(client)
    }

    /// Get the current pool size for observability.
    pub fn pool_size(&self) -> usize {
        self.pool.status().size
    }

    async fn get_conn(&self) -> YoconfResult<deadpool_postgres::Object> {
        self.pool.get().await.map_err(pool_err)
    }

    /// Create tables and indexes if they do not exist.
    pub async fn ensure_schema(&self) -> YoconfResult<()> {
        let conn = self.get_conn().await?;
        conn.batch_execute(SCHEMA).await.map_err(pg_err)
    }
}

#[async_trait]
impl ConfigStore for DbClient {
    async fn insert(&self, chunk: &Chunk) -> YoconfResult<()> {
        let conn = self.get_conn().await?;
        let result = conn
            .execute(
                "INSERT INTO chunks (project, version, data, active) VALUES ($1, $2, $3, $4)",
                &[
                    &chunk.project,
                    &to_db_version(chunk.version),
                    &chunk.data,
                    &chunk.active,
                ],
            )
            .await;

        match result {
            Ok(_) => Ok(()),
            Err(err) if err.code() == Some(&SqlState::UNIQUE_VIOLATION) => {
                Err(StorageError::DuplicateVersion {
                    project: chunk.project.clone(),
                    version: chunk.version,
                }
                .into())
            }
            Err(err) => Err(pg_err(err)),
        }
    }

    async fn demote_active(&self, project: &str) -> YoconfResult<Vec<Chunk>> {
        let conn = self.get_conn().await?;
        let rows = conn
            .query(
                "UPDATE chunks SET active = FALSE WHERE project = $1 AND active \
                 RETURNING project, version, data, TRUE AS active",
                &[&project],
            )
            .await
            .map_err(pg_err)?;
        rows.iter().map(chunk_from_row).collect()
    }

    async fn activate_version(&self, project: &str, version: Version) -> YoconfResult<Activation> {
        let mut conn = self.get_conn().await?;
        let tx = conn.transaction().await.map_err(pg_err)?;
        let db_version = to_db_version(version);

        let target = tx
            .query_opt(
                "SELECT project, version, data, active FROM chunks \
                 WHERE project = $1 AND version = $2 FOR UPDATE",
                &[&project, &db_version],
            )
            .await
            .map_err(pg_err)?
            .ok_or_else(|| YoconfError::not_found(project, Some(version)))?;

        let demoted = tx
            .query(
                "UPDATE chunks SET active = FALSE \
                 WHERE project = $1 AND active AND version <> $2 \
                 RETURNING project, version, data, TRUE AS active",
                &[&project, &db_version],
            )
            .await
            .map_err(pg_err)?
            .iter()
            .map(chunk_from_row)
            .collect::<YoconfResult<Vec<_>>>()?;

        tx.execute(
            "UPDATE chunks SET active = TRUE WHERE project = $1 AND version = $2",
            &[&project, &db_version],
        )
        .await
        .map_err(pg_err)?;
        tx.commit().await.map_err(pg_err)?;

        let activated = chunk_from_row(&target)?.with_active(true);
        Ok(Activation { activated, demoted })
    }

    async fn fetch_active(&self, project: &str) -> YoconfResult<Chunk> {
        let conn = self.get_conn().await?;
        let row = conn
            .query_opt(
                "SELECT project, version, data, active FROM chunks \
                 WHERE project = $1 AND active ORDER BY seq DESC LIMIT 1",
                &[&project],
            )
            .await
            .map_err(pg_err)?
            .ok_or_else(|| YoconfError::not_found(project, None))?;
        chunk_from_row(&row)
    }

    async fn fetch_version(&self, project: &str, version: Version) -> YoconfResult<Option<Chunk>> {
        let conn = self.get_conn().await?;
        conn.query_opt(
            "SELECT project, version, data, active FROM chunks \
             WHERE project = $1 AND version = $2",
            &[&project, &to_db_version(version)],
        )
        .await
        .map_err(pg_err)?
        .as_ref()
        .map(chunk_from_row)
        .transpose()
    }

    async fn list_versions(&self, project: &str) -> YoconfResult<Vec<Version>> {
        let conn = self.get_conn().await?;
        let rows = conn
            .query(
                "SELECT version FROM chunks WHERE project = $1 ORDER BY seq",
                &[&project],
            )
            .await
            .map_err(pg_err)?;
        rows.iter()
            .map(|row| from_db_version(row.try_get("version").map_err(row_err)?))
            .collect()
    }

    async fn delete_version(&self, project: &str, version: Version) -> YoconfResult<()> {
        let conn = self.get_conn().await?;
        let deleted = conn
            .execute(
                "DELETE FROM chunks WHERE project = $1 AND version = $2",
                &[&project, &to_db_version(version)],
            )
            .await
            .map_err(pg_err)?;
        if deleted == 0 {
            return Err(YoconfError::not_found(project, Some(version)));
        }
        Ok(())
    }

    async fn insert_snapshot(&self, snapshot: &Snapshot) -> YoconfResult<()> {
        let conn = self.get_conn().await?;
        conn.execute(
            "INSERT INTO chunk_snapshots (snapshot_id, project, version, data, taken_at) \
             VALUES ($1, $2, $3, $4, $5) ON CONFLICT (snapshot_id) DO NOTHING",
            &[
                &snapshot.snapshot_id,
                &snapshot.project,
                &to_db_version(snapshot.version),
                &snapshot.data,
                &snapshot.taken_at,
            ],
        )
        .await
        .map_err(pg_err)?;
        Ok(())
    }

    async fn list_snapshots(&self, project: &str) -> YoconfResult<Vec<Snapshot>> {
        let conn = self.get_conn().await?;
        let rows = conn
            .query(
                "SELECT snapshot_id, project, version, data, taken_at FROM chunk_snapshots \
                 WHERE project = $1 ORDER BY seq",
                &[&project],
            )
            .await
            .map_err(pg_err)?;
        rows.iter().map(snapshot_from_row).collect()
    }

    async fn health_check(&self) -> YoconfResult<()> {
        let conn = self.get_conn().await?;
        conn.simple_query("SELECT 1").await.map_err(pg_err)?;
        Ok(())
    }
}
