//! REST API Routes Module
//!
//! - `/api/v1` control routes (create, roll-on, reads, delete)
//! - `/get/{project}` read-only fetch for config consumers
//! - `/health` liveness and readiness checks

pub mod chunks;
pub mod fetch;
pub mod health;

use std::time::Duration;

use axum::{
    error_handling::HandleErrorLayer,
    http::{header, Method},
    response::IntoResponse,
    BoxError, Router,
};
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::error::ApiError;
use crate::state::AppState;

pub use chunks::create_router as chunks_router;
pub use fetch::create_router as fetch_router;
pub use health::create_router as health_router;

/// Requests admitted at once before callers queue.
pub const MAX_CONCURRENT_REQUESTS: usize = 1024;

async fn handle_middleware_error(err: BoxError) -> impl IntoResponse {
    if err.is::<tower::timeout::error::Elapsed>() {
        ApiError::timeout()
    } else {
        ApiError::internal_error(format!("Unhandled middleware error: {}", err))
    }
}

/// Build the full HTTP router.
///
/// # Middleware Order (outer to inner)
/// 1. CORS
/// 2. Tracing
/// 3. Request timeout and concurrency limit
pub fn create_router(state: AppState, request_timeout: Duration) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE]);

    let guards = ServiceBuilder::new()
        .layer(HandleErrorLayer::new(handle_middleware_error))
        .timeout(request_timeout)
        .concurrency_limit(MAX_CONCURRENT_REQUESTS);

    Router::new()
        .nest("/api/v1", chunks::create_router(state.service.clone()))
        .merge(fetch::create_router(state.service.clone()))
        .nest(
            "/health",
            health::create_router(state.service.clone(), state.start_time),
        )
        .layer(guards)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}
