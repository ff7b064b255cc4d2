//! yoconf API - Orchestrator and Adapters
//!
//! Hosts [`ChunkService`], which keeps the PostgreSQL config store and the
//! LMDB cache consistent, plus the HTTP control API, the read-only fetch
//! route and an optional gRPC read adapter (feature `grpc`).

pub mod db;
pub mod error;
#[cfg(feature = "grpc")]
pub mod grpc;
pub mod routes;
pub mod service;
pub mod state;
pub mod telemetry;
pub mod types;

// Re-export commonly used types
pub use db::{DbClient, DbConfig};
pub use error::{ApiError, ApiResult, ErrorCode};
pub use routes::create_router;
pub use service::{ChunkService, ProjectLocks, DEFAULT_CACHE_TTL};
pub use state::AppState;
pub use telemetry::init_tracing;
pub use types::*;
