//! Tracing subscriber bootstrap for the server binary.
//!
//! Library code only emits through `tracing`; installing a subscriber is the
//! binary's job.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use yoconf_core::{LogFormat, LogSettings};

use crate::error::{ApiError, ApiResult};

/// Filter used when neither `RUST_LOG` nor `log.level` says otherwise.
pub const DEFAULT_FILTER: &str = "yoconf_api=debug,tower_http=info,info";

/// Build the env filter: `RUST_LOG` wins, then the configured level.
pub fn env_filter(settings: &LogSettings) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let directives = if settings.level.trim().is_empty() || settings.level == "info" {
            DEFAULT_FILTER.to_string()
        } else {
            settings.level.clone()
        };
        EnvFilter::try_new(&directives).unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
    })
}

/// Install the global subscriber.
///
/// Fails if a subscriber is already installed.
pub fn init_tracing(settings: &LogSettings) -> ApiResult<()> {
    let registry = tracing_subscriber::registry().with(env_filter(settings));

    let result = match settings.format {
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json())
            .try_init(),
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).try_init(),
    };
    result.map_err(|e| ApiError::internal_error(format!("Failed to init subscriber: {}", e)))?;

    tracing::info!(format = ?settings.format, "Tracing initialized");
    Ok(())
}
