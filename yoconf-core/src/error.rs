//! Error types for yoconf operations

use thiserror::Error;

/// Storage layer errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StorageError {
    #[error("Version {version} already exists for project {project}")]
    DuplicateVersion { project: String, version: u32 },

    #[error("Not found: project {project}{}", version.map(|v| format!(" version {v}")).unwrap_or_default())]
    NotFound {
        project: String,
        version: Option<u32>,
    },

    #[error("Store unavailable: {reason}")]
    Unavailable { reason: String },

    /// A stored row could not be decoded. Replaying the read cannot fix it.
    #[error("Corrupt stored row: {reason}")]
    Corrupt { reason: String },

    #[error("Storage lock poisoned")]
    LockPoisoned,
}

/// Cache layer errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CacheError {
    #[error("Cache unavailable: {reason}")]
    Unavailable { reason: String },

    #[error("Cache entry serialization failed: {reason}")]
    Serialization { reason: String },
}

/// Validation errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Required field missing: {field}")]
    RequiredFieldMissing { field: String },

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Failed to read configuration file {path}: {reason}")]
    Io { path: String, reason: String },

    #[error("Failed to parse configuration: {reason}")]
    Parse { reason: String },

    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },
}

/// Transport-agnostic classification of every error the orchestrator can return.
///
/// Adapters map these onto their own status conventions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidInput,
    DuplicateVersion,
    NotFound,
    StoreUnavailable,
    CacheUnavailable,
    Internal,
}

/// Master error type for all yoconf errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum YoconfError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

impl YoconfError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            YoconfError::Validation(_) => ErrorKind::InvalidInput,
            YoconfError::Storage(StorageError::DuplicateVersion { .. }) => {
                ErrorKind::DuplicateVersion
            }
            YoconfError::Storage(StorageError::NotFound { .. }) => ErrorKind::NotFound,
            YoconfError::Storage(StorageError::Unavailable { .. }) => ErrorKind::StoreUnavailable,
            YoconfError::Storage(StorageError::Corrupt { .. } | StorageError::LockPoisoned) => {
                ErrorKind::Internal
            }
            YoconfError::Cache(CacheError::Unavailable { .. }) => ErrorKind::CacheUnavailable,
            YoconfError::Cache(_) => ErrorKind::Internal,
            YoconfError::Config(_) => ErrorKind::Internal,
        }
    }

    /// Whether replaying the failed call can plausibly succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::StoreUnavailable | ErrorKind::CacheUnavailable
        )
    }

    pub fn not_found(project: impl Into<String>, version: Option<u32>) -> Self {
        StorageError::NotFound {
            project: project.into(),
            version,
        }
        .into()
    }

    pub fn store_unavailable(reason: impl Into<String>) -> Self {
        StorageError::Unavailable {
            reason: reason.into(),
        }
        .into()
    }

    pub fn cache_unavailable(reason: impl Into<String>) -> Self {
        CacheError::Unavailable {
            reason: reason.into(),
        }
        .into()
    }
}

/// Result type alias for yoconf operations.
pub type YoconfResult<T> = Result<T, YoconfError>;

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_error_display_duplicate_version() {
        let err = StorageError::DuplicateVersion {
            project: "billing".to_string(),
            version: 2,
        };
        let msg = format!("{}", err);
        assert!(msg.contains("already exists"));
        assert!(msg.contains("billing"));
        assert!(msg.contains('2'));
    }

    #[test]
    fn test_storage_error_display_not_found_with_and_without_version() {
        let with = StorageError::NotFound {
            project: "billing".to_string(),
            version: Some(7),
        };
        assert_eq!(format!("{}", with), "Not found: project billing version 7");

        let without = StorageError::NotFound {
            project: "billing".to_string(),
            version: None,
        };
        assert_eq!(format!("{}", without), "Not found: project billing");
    }

    #[test]
    fn test_config_error_display_invalid_value() {
        let err = ConfigError::InvalidValue {
            field: "server.http_port".to_string(),
            value: "0".to_string(),
            reason: "must be non-zero".to_string(),
        };
        let msg = format!("{}", err);
        assert!(msg.contains("server.http_port"));
        assert!(msg.contains("must be non-zero"));
    }

    #[test]
    fn test_kind_mapping() {
        let cases = [
            (
                YoconfError::from(ValidationError::RequiredFieldMissing {
                    field: "project".to_string(),
                }),
                ErrorKind::InvalidInput,
            ),
            (
                YoconfError::from(StorageError::DuplicateVersion {
                    project: "p".to_string(),
                    version: 1,
                }),
                ErrorKind::DuplicateVersion,
            ),
            (YoconfError::not_found("p", Some(1)), ErrorKind::NotFound),
            (
                YoconfError::store_unavailable("down"),
                ErrorKind::StoreUnavailable,
            ),
            (
                YoconfError::cache_unavailable("down"),
                ErrorKind::CacheUnavailable,
            ),
            (
                YoconfError::from(StorageError::LockPoisoned),
                ErrorKind::Internal,
            ),
            (
                YoconfError::from(StorageError::Corrupt {
                    reason: "bad column".to_string(),
                }),
                ErrorKind::Internal,
            ),
        ];
        for (err, kind) in cases {
            assert_eq!(err.kind(), kind, "{err}");
        }
    }

    #[test]
    fn test_only_unavailability_is_transient() {
        assert!(YoconfError::store_unavailable("timeout").is_transient());
        assert!(YoconfError::cache_unavailable("refused").is_transient());
        assert!(!YoconfError::not_found("p", None).is_transient());
        assert!(!YoconfError::from(StorageError::DuplicateVersion {
            project: "p".to_string(),
            version: 1,
        })
        .is_transient());
        assert!(!YoconfError::from(StorageError::Corrupt {
            reason: "version out of range".to_string(),
        })
        .is_transient());
        assert!(!YoconfError::from(CacheError::Serialization {
            reason: "bad json".to_string(),
        })
        .is_transient());
    }
}
