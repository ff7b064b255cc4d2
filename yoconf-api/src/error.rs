//! Error Types for the yoconf API
//!
//! This module defines error handling for the adapter layer:
//! - ApiError struct for structured error responses
//! - ErrorCode enum for categorizing errors
//! - IntoResponse implementation for Axum HTTP responses
//!
//! Core errors are translated through [`yoconf_core::ErrorKind`], so the
//! orchestrator never deals in transport status codes.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use yoconf_core::{ErrorKind, StorageError, ValidationError, YoconfError};

// ============================================================================
// ERROR CODE ENUM
// ============================================================================

/// Error codes for API responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // ========================================================================
    // Validation Errors (400)
    // ========================================================================
    /// Request contains invalid input data
    InvalidInput,

    /// Required field is missing from request
    MissingField,

    // ========================================================================
    // Not Found Errors (404)
    // ========================================================================
    /// Requested project or version does not exist
    ChunkNotFound,

    // ========================================================================
    // Conflict Errors (409)
    // ========================================================================
    /// A different chunk already exists under the same (project, version)
    DuplicateVersion,

    // ========================================================================
    // Server Errors (500, 503, 504)
    // ========================================================================
    /// Internal server error
    InternalError,

    /// Config store unreachable after retries
    StoreUnavailable,

    /// Cache unreachable after retries on a write path
    CacheUnavailable,

    /// Operation timed out
    Timeout,
}

impl ErrorCode {
    /// Get the HTTP status code for this error code.
    pub fn status_code(&self) -> StatusCode {
        match self {
            ErrorCode::InvalidInput | ErrorCode::MissingField => StatusCode::BAD_REQUEST,

            ErrorCode::ChunkNotFound => StatusCode::NOT_FOUND,

            ErrorCode::DuplicateVersion => StatusCode::CONFLICT,

            ErrorCode::StoreUnavailable | ErrorCode::CacheUnavailable => {
                StatusCode::SERVICE_UNAVAILABLE
            }

            ErrorCode::Timeout => StatusCode::GATEWAY_TIMEOUT,

            ErrorCode::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get a default message for this error code.
    pub fn default_message(&self) -> &'static str {
        match self {
            ErrorCode::InvalidInput => "Invalid input data",
            ErrorCode::MissingField => "Required field is missing",
            ErrorCode::ChunkNotFound => "Chunk not found",
            ErrorCode::DuplicateVersion => "Version already exists",
            ErrorCode::InternalError => "Internal server error",
            ErrorCode::StoreUnavailable => "Config store temporarily unavailable",
            ErrorCode::CacheUnavailable => "Cache temporarily unavailable",
            ErrorCode::Timeout => "Operation timed out",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

// ============================================================================
// API ERROR STRUCT
// ============================================================================

/// Structured error response for API operations.
///
/// Shared by the HTTP and gRPC adapters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiError {
    /// Error code categorizing the error
    pub code: ErrorCode,
    /// Human-readable error message
    pub message: String,
    /// Optional additional details
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    /// Create a new API error with the given code and message.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    /// Create a new API error with the given code, using the default message.
    pub fn from_code(code: ErrorCode) -> Self {
        Self::new(code, code.default_message())
    }

    /// Add additional details to the error.
    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Get the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        self.code.status_code()
    }

    // ========================================================================
    // Convenience constructors for common errors
    // ========================================================================

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidInput, message)
    }

    pub fn missing_field(field: &str) -> Self {
        Self::new(
            ErrorCode::MissingField,
            format!("Required field '{}' is missing", field),
        )
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ChunkNotFound, message)
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, message)
    }

    pub fn timeout() -> Self {
        Self::from_code(ErrorCode::Timeout)
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for ApiError {}

// ============================================================================
// AXUM INTEGRATION
// ============================================================================

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(self);
        (status, body).into_response()
    }
}

// ============================================================================
// CONVERSIONS FROM CORE ERRORS
// ============================================================================

impl From<YoconfError> for ApiError {
    fn from(err: YoconfError) -> Self {
        let message = err.to_string();
        match err.kind() {
            ErrorKind::InvalidInput => match err {
                YoconfError::Validation(ValidationError::RequiredFieldMissing { field }) => {
                    ApiError::missing_field(&field)
                }
                _ => ApiError::invalid_input(message),
            },
            ErrorKind::DuplicateVersion => {
                let api = ApiError::new(ErrorCode::DuplicateVersion, message);
                match err {
                    YoconfError::Storage(StorageError::DuplicateVersion { project, version }) => {
                        api.with_details(serde_json::json!({
                            "project": project,
                            "version": version,
                        }))
                    }
                    _ => api,
                }
            }
            ErrorKind::NotFound => {
                let api = ApiError::not_found(message);
                match err {
                    YoconfError::Storage(StorageError::NotFound { project, version }) => {
                        api.with_details(serde_json::json!({
                            "project": project,
                            "version": version,
                        }))
                    }
                    _ => api,
                }
            }
            ErrorKind::StoreUnavailable => {
                tracing::error!(error = %message, "Config store unavailable");
                ApiError::from_code(ErrorCode::StoreUnavailable)
            }
            ErrorKind::CacheUnavailable => {
                tracing::error!(error = %message, "Cache unavailable");
                ApiError::from_code(ErrorCode::CacheUnavailable)
            }
            ErrorKind::Internal => {
                // Log the full error, return a generic message
                tracing::error!(error = %message, "Internal error");
                ApiError::from_code(ErrorCode::InternalError)
            }
        }
    }
}

// ============================================================================
// RESULT TYPE ALIAS
// ============================================================================

/// Result type alias for API operations.
pub type ApiResult<T> = Result<T, ApiError>;
