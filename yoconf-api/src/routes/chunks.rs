//! Chunk control routes
//!
//! Thin adapters over [`ChunkService`]: decode the request, call one
//! operation, translate the result. No retry or consistency logic lives here.

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{delete, get, post},
    Json, Router,
};
use std::sync::Arc;
use yoconf_core::{Chunk, Version};

use crate::{
    error::{ApiError, ApiResult},
    service::ChunkService,
    types::{CreateChunkRequest, ListSnapshotsResponse, ListVersionsResponse, RollOnRequest},
};

fn decode<T>(payload: Result<Json<T>, JsonRejection>) -> ApiResult<T> {
    payload
        .map(|Json(body)| body)
        .map_err(|rejection| ApiError::invalid_input(rejection.body_text()))
}

// ============================================================================
// ROUTE HANDLERS
// ============================================================================

/// POST /api/v1/chunks - Store a new chunk
pub async fn create_chunk(
    State(service): State<Arc<ChunkService>>,
    payload: Result<Json<CreateChunkRequest>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let chunk: Chunk = decode(payload)?.into();
    service.create_config(chunk.clone()).await?;
    Ok((StatusCode::CREATED, Json(chunk)))
}

/// POST /api/v1/projects/{project}/roll-on - Promote a stored version
pub async fn roll_on(
    State(service): State<Arc<ChunkService>>,
    Path(project): Path<String>,
    payload: Result<Json<RollOnRequest>, JsonRejection>,
) -> ApiResult<Json<Chunk>> {
    let req = decode(payload)?;
    let chunk = service.roll_on(&project, req.version).await?;
    Ok(Json(chunk))
}

/// GET /api/v1/projects/{project}/config - Active chunk of a project
pub async fn get_config(
    State(service): State<Arc<ChunkService>>,
    Path(project): Path<String>,
) -> ApiResult<Json<Chunk>> {
    Ok(Json(service.get_config(&project).await?))
}

/// GET /api/v1/projects/{project}/versions - Stored versions
pub async fn list_versions(
    State(service): State<Arc<ChunkService>>,
    Path(project): Path<String>,
) -> ApiResult<Json<ListVersionsResponse>> {
    let versions = service.list_versions(&project).await?;
    Ok(Json(ListVersionsResponse { project, versions }))
}

/// GET /api/v1/projects/{project}/snapshots - Roll-on checkpoints
pub async fn list_snapshots(
    State(service): State<Arc<ChunkService>>,
    Path(project): Path<String>,
) -> ApiResult<Json<ListSnapshotsResponse>> {
    let snapshots = service.list_snapshots(&project).await?;
    Ok(Json(ListSnapshotsResponse { project, snapshots }))
}

/// DELETE /api/v1/projects/{project}/versions/{version} - Remove a version
pub async fn delete_version(
    State(service): State<Arc<ChunkService>>,
    Path((project, version)): Path<(String, Version)>,
) -> ApiResult<StatusCode> {
    service.delete_chunk(&project, version).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ============================================================================
// ROUTER
// ============================================================================

/// Create the control router, mounted under `/api/v1`.
pub fn create_router(service: Arc<ChunkService>) -> Router {
    Router::new()
        .route("/chunks", post(create_chunk))
        .route("/projects/:project/roll-on", post(roll_on))
        .route("/projects/:project/config", get(get_config))
        .route("/projects/:project/versions", get(list_versions))
        .route("/projects/:project/snapshots", get(list_snapshots))
        .route("/projects/:project/versions/:version", delete(delete_version))
        .with_state(service)
}
