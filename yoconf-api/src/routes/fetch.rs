//! Read-only fetch route used by config consumers.

use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};
use std::sync::Arc;
use yoconf_core::Chunk;

use crate::{error::ApiResult, service::ChunkService};

/// GET /get/{project} - Active chunk, cache first
pub async fn fetch_config(
    State(service): State<Arc<ChunkService>>,
    Path(project): Path<String>,
) -> ApiResult<Json<Chunk>> {
    let chunk = service.get_config(&project).await?;
    Ok(Json(chunk))
}

pub fn create_router(service: Arc<ChunkService>) -> Router {
    Router::new()
        .route("/get/:project", get(fetch_config))
        .with_state(service)
}
