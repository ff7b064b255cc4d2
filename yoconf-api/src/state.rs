//! Shared application state for Axum routers.

use std::sync::Arc;

use axum::extract::FromRef;

use crate::service::ChunkService;

/// Application-wide state shared across all routes.
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<ChunkService>,
    pub start_time: std::time::Instant,
}

impl AppState {
    pub fn new(service: ChunkService) -> Self {
        Self {
            service: Arc::new(service),
            start_time: std::time::Instant::now(),
        }
    }
}

impl FromRef<AppState> for Arc<ChunkService> {
    fn from_ref(state: &AppState) -> Self {
        state.service.clone()
    }
}
