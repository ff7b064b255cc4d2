//! gRPC adapter
//!
//! Serves `GetConfig` plus the `CreateChunk`, `RollOn` and `DeleteChunk`
//! write calls over tonic. Compiled only with the `grpc` feature.

use std::sync::Arc;

use tonic::{Request, Response, Status};

use crate::error::{ApiError, ErrorCode};
use crate::service::ChunkService;

// Include the generated protobuf code
pub mod proto {
    tonic::include_proto!("yoconf");
}

use proto::config_service_server::{ConfigService, ConfigServiceServer};
use proto::{Chunk as ChunkMessage, DeleteRequest, GetConfigRequest, Resp, RollOnRequest};

/// Message returned by every successful write call.
const OK_MESSAGE: &str = "ok";

// ============================================================================
// CONVERSION HELPERS
// ============================================================================

/// Convert ApiError to tonic Status
impl From<ApiError> for Status {
    fn from(err: ApiError) -> Self {
        match err.code {
            ErrorCode::InvalidInput | ErrorCode::MissingField => {
                Status::invalid_argument(err.message)
            }
            ErrorCode::ChunkNotFound => Status::not_found(err.message),
            ErrorCode::DuplicateVersion => Status::already_exists(err.message),
            ErrorCode::StoreUnavailable | ErrorCode::CacheUnavailable => {
                Status::unavailable(err.message)
            }
            ErrorCode::Timeout => Status::deadline_exceeded(err.message),
            ErrorCode::InternalError => Status::internal(err.message),
        }
    }
}

impl From<yoconf_core::Chunk> for ChunkMessage {
    fn from(chunk: yoconf_core::Chunk) -> Self {
        Self {
            project: chunk.project,
            version: chunk.version,
            data: chunk.data,
            active: chunk.active,
        }
    }
}

impl From<ChunkMessage> for yoconf_core::Chunk {
    fn from(msg: ChunkMessage) -> Self {
        yoconf_core::Chunk::new(msg.project, msg.version, msg.data, msg.active)
    }
}

fn ok_resp() -> Response<Resp> {
    Response::new(Resp {
        message: OK_MESSAGE.to_string(),
    })
}

// ============================================================================
// SERVICE
// ============================================================================

#[derive(Clone)]
pub struct ConfigServiceImpl {
    service: Arc<ChunkService>,
}

impl ConfigServiceImpl {
    pub fn new(service: Arc<ChunkService>) -> Self {
        Self { service }
    }
}

#[tonic::async_trait]
impl ConfigService for ConfigServiceImpl {
    async fn get_config(
        &self,
        request: Request<GetConfigRequest>,
    ) -> Result<Response<ChunkMessage>, Status> {
        let project = request.into_inner().project;
        let chunk = self
            .service
            .get_config(&project)
            .await
            .map_err(ApiError::from)?;
        Ok(Response::new(chunk.into()))
    }

    async fn create_chunk(
        &self,
        request: Request<ChunkMessage>,
    ) -> Result<Response<Resp>, Status> {
        self.service
            .create_config(request.into_inner().into())
            .await
            .map_err(ApiError::from)?;
        Ok(ok_resp())
    }

    async fn roll_on(&self, request: Request<RollOnRequest>) -> Result<Response<Resp>, Status> {
        let req = request.into_inner();
        self.service
            .roll_on(&req.project, req.version)
            .await
            .map_err(ApiError::from)?;
        Ok(ok_resp())
    }

    async fn delete_chunk(
        &self,
        request: Request<DeleteRequest>,
    ) -> Result<Response<Resp>, Status> {
        let req = request.into_inner();
        self.service
            .delete_chunk(&req.project, req.version)
            .await
            .map_err(ApiError::from)?;
        Ok(ok_resp())
    }
}

/// Wrap the orchestrator in a tonic server.
pub fn create_service(service: Arc<ChunkService>) -> ConfigServiceServer<ConfigServiceImpl> {
    ConfigServiceServer::new(ConfigServiceImpl::new(service))
}
