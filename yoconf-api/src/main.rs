//! yoconf Server Entry Point
//!
//! Loads configuration, connects to PostgreSQL and opens the LMDB cache
//! through the retry executor, then serves HTTP (and gRPC with the `grpc`
//! feature) until Ctrl-C.

use std::future::Future;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use yoconf_api::{
    create_router, init_tracing, ApiError, ApiResult, AppState, ChunkService, DbClient, DbConfig,
};
use yoconf_core::{RetryExecutor, YoconfConfig, YoconfError};
use yoconf_storage::LmdbCacheBackend;

const DEFAULT_CONFIG_PATH: &str = "config.yaml";

#[tokio::main]
async fn main() -> ApiResult<()> {
    let config = load_config()?;
    init_tracing(&config.log)?;

    let connector = RetryExecutor::new(config.retry.policy());

    let db_config = DbConfig::from(&config.database);
    let db = connector
        .run_with_value("postgres.connect", || DbClient::connect(&db_config))
        .await?;
    tracing::info!(host = %db_config.host, dbname = %db_config.dbname, "Config store connected");

    let cache = connector
        .run_with_value("lmdb.open", || async {
            LmdbCacheBackend::new(&config.cache.path, config.cache.max_size_mb)
        })
        .await
        .map_err(YoconfError::from)?;
    tracing::info!(path = %config.cache.path, "Cache opened");

    let service = ChunkService::new(Arc::new(db), Arc::new(cache))
        .with_retry_policy(config.retry.policy())
        .with_cache_ttl(config.cache.ttl())
        .with_operation_timeout(config.service.operation_timeout())
        .with_span(tracing::info_span!("yoconf"));
    let state = AppState::new(service);

    let grpc = grpc_server(&config, &state)?;

    let app = create_router(state, config.server.request_timeout());
    let addr = parse_addr(&config.server.http_bind())?;
    tracing::info!(%addr, "Starting HTTP server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| ApiError::internal_error(format!("Failed to bind {}: {}", addr, e)))?;

    let server = axum::serve(listener, app);
    tokio::select! {
        result = server => {
            result.map_err(|e| ApiError::internal_error(format!("Server error: {}", e)))?;
        }
        result = grpc => {
            result?;
            tracing::warn!("gRPC server stopped");
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutdown signal received");
        }
    }

    Ok(())
}

/// gRPC server future, polled alongside HTTP so bind and serve errors stop
/// the process.
#[cfg(feature = "grpc")]
fn grpc_server(
    config: &YoconfConfig,
    state: &AppState,
) -> ApiResult<impl Future<Output = ApiResult<()>>> {
    let addr = parse_addr(&config.server.grpc_bind())?;
    let svc = yoconf_api::grpc::create_service(state.service.clone());
    tracing::info!(%addr, "Starting gRPC server");
    Ok(async move {
        tonic::transport::Server::builder()
            .add_service(svc)
            .serve(addr)
            .await
            .map_err(|e| ApiError::internal_error(format!("gRPC server error: {}", e)))
    })
}

#[cfg(not(feature = "grpc"))]
fn grpc_server(
    _config: &YoconfConfig,
    _state: &AppState,
) -> ApiResult<impl Future<Output = ApiResult<()>>> {
    Ok(std::future::pending())
}

/// `--config <path>`, then `YOCONF_CONFIG`, then `config.yaml`.
///
/// A missing default file means defaults plus environment overrides; a
/// missing explicit file is an error.
fn load_config() -> ApiResult<YoconfConfig> {
    let explicit = config_path_from_args(std::env::args().skip(1))
        .or_else(|| std::env::var("YOCONF_CONFIG").ok().map(PathBuf::from));

    let config = match explicit {
        Some(path) => YoconfConfig::load(path),
        None if PathBuf::from(DEFAULT_CONFIG_PATH).exists() => {
            YoconfConfig::load(DEFAULT_CONFIG_PATH)
        }
        None => {
            let mut config = YoconfConfig::default();
            let applied = config
                .apply_env_overrides_from(|key| std::env::var(key).ok())
                .and_then(|_| config.validate());
            applied.map(|_| config)
        }
    };
    config.map_err(|e| ApiError::invalid_input(format!("Invalid configuration: {}", e)))
}

fn config_path_from_args(mut args: impl Iterator<Item = String>) -> Option<PathBuf> {
    while let Some(arg) = args.next() {
        if arg == "--config" {
            return args.next().map(PathBuf::from);
        }
        if let Some(path) = arg.strip_prefix("--config=") {
            return Some(PathBuf::from(path));
        }
    }
    None
}

fn parse_addr(addr: &str) -> ApiResult<SocketAddr> {
    addr.parse::<SocketAddr>()
        .map_err(|e| ApiError::invalid_input(format!("Invalid bind address {}: {}", addr, e)))
}
