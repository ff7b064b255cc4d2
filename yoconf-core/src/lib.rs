//! yoconf Core - Chunk model and shared machinery
//!
//! Data types for versioned configuration chunks, the error taxonomy shared
//! by every layer, the bounded retry executor and service configuration.
//! All other crates depend on this.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub mod config;
pub mod error;
pub mod retry;

pub use config::{
    CacheSettings, DatabaseSettings, LogFormat, LogSettings, RetrySettings, ServerSettings,
    ServiceSettings, YoconfConfig,
};
pub use error::{
    CacheError, ConfigError, ErrorKind, StorageError, ValidationError, YoconfError, YoconfResult,
};
pub use retry::{RetryExecutor, RetryPolicy};

// ============================================================================
// IDENTITY TYPES
// ============================================================================

/// Timestamp type using UTC timezone.
pub type Timestamp = DateTime<Utc>;

/// Caller-assigned chunk version. Versions start at 1.
pub type Version = u32;

// ============================================================================
// CHUNK
// ============================================================================

/// One versioned configuration record for a project.
///
/// `data` is opaque to every layer of the system.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub project: String,
    pub version: Version,
    pub data: String,
    #[serde(alias = "in_use")]
    pub active: bool,
}

impl Chunk {
    pub fn new(
        project: impl Into<String>,
        version: Version,
        data: impl Into<String>,
        active: bool,
    ) -> Self {
        Self {
            project: project.into(),
            version,
            data: data.into(),
            active,
        }
    }

    /// Fail fast on input that no store or cache call should ever see.
    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_project(&self.project)?;
        validate_version(self.version)
    }

    /// Same record with a different active flag.
    pub fn with_active(mut self, active: bool) -> Self {
        self.active = active;
        self
    }
}

/// Reject empty or whitespace-only project names.
pub fn validate_project(project: &str) -> Result<(), ValidationError> {
    if project.trim().is_empty() {
        return Err(ValidationError::RequiredFieldMissing {
            field: "project".to_string(),
        });
    }
    Ok(())
}

/// Reject version 0.
pub fn validate_version(version: Version) -> Result<(), ValidationError> {
    if version == 0 {
        return Err(ValidationError::InvalidValue {
            field: "version".to_string(),
            reason: "must be >= 1".to_string(),
        });
    }
    Ok(())
}

// ============================================================================
// SNAPSHOT
// ============================================================================

/// Historical inactive record written by roll-on.
///
/// Holds whatever payload the cache carried for the outgoing active version at
/// the moment of the swap, possibly empty. Identified by `snapshot_id` so a
/// replayed write lands on the same row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub snapshot_id: Uuid,
    pub project: String,
    pub version: Version,
    pub data: String,
    pub taken_at: Timestamp,
}

impl Snapshot {
    pub fn new(project: impl Into<String>, version: Version, data: impl Into<String>) -> Self {
        Self {
            snapshot_id: Uuid::now_v7(),
            project: project.into(),
            version,
            data: data.into(),
            taken_at: Utc::now(),
        }
    }
}
