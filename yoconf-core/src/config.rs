//! Service configuration
//!
//! Loaded from a YAML file, then overridden by `YOCONF_*` environment
//! variables. Every field has a default so an empty file is a valid
//! development configuration.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::retry::RetryPolicy;

// ============================================================================
// SECTIONS
// ============================================================================

/// Listener addresses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub addr: String,
    pub http_port: u16,
    pub grpc_port: u16,
    /// Upper bound on one HTTP request, retries included.
    pub request_timeout_secs: u64,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            addr: "0.0.0.0".to_string(),
            http_port: 8080,
            grpc_port: 9090,
            request_timeout_secs: 120,
        }
    }
}

impl ServerSettings {
    pub fn http_bind(&self) -> String {
        format!("{}:{}", self.addr, self.http_port)
    }

    pub fn grpc_bind(&self) -> String {
        format!("{}:{}", self.addr, self.grpc_port)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// PostgreSQL connection settings for the config store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseSettings {
    pub host: String,
    pub port: u16,
    pub dbname: String,
    pub user: String,
    pub password: String,
    pub max_size: usize,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            dbname: "yoconf".to_string(),
            user: "postgres".to_string(),
            password: String::new(),
            max_size: 16,
        }
    }
}

/// LMDB cache environment settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    pub path: String,
    pub max_size_mb: usize,
    pub ttl_secs: u64,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            path: "./data/cache".to_string(),
            max_size_mb: 256,
            ttl_secs: 2 * 60 * 60,
        }
    }
}

impl CacheSettings {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        let policy = RetryPolicy::default();
        Self {
            max_attempts: policy.max_attempts,
            initial_backoff_ms: policy.initial_backoff.as_millis() as u64,
        }
    }
}

impl RetrySettings {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.max_attempts,
            Duration::from_millis(self.initial_backoff_ms),
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceSettings {
    /// Bound on a whole orchestrator call, checked between retry attempts.
    pub operation_timeout_secs: u64,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            operation_timeout_secs: 30,
        }
    }
}

impl ServiceSettings {
    pub fn operation_timeout(&self) -> Duration {
        Duration::from_secs(self.operation_timeout_secs)
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogSettings {
    pub level: String,
    pub format: LogFormat,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

// ============================================================================
// ROOT CONFIGURATION
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct YoconfConfig {
    pub server: ServerSettings,
    pub database: DatabaseSettings,
    pub cache: CacheSettings,
    pub retry: RetrySettings,
    pub service: ServiceSettings,
    pub log: LogSettings,
}

impl YoconfConfig {
    /// Parse a YAML document.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(yaml).map_err(|e| ConfigError::Parse {
            reason: e.to_string(),
        })
    }

    /// Read and parse a YAML file without applying environment overrides.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Self::from_yaml_str(&contents)
    }

    /// Full load: file, then environment overrides, then validation.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let mut config = Self::from_file(path)?;
        config.apply_env_overrides_from(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `YOCONF_*` overrides read through `lookup`.
    ///
    /// Environment variables:
    /// - `YOCONF_ADDR`, `YOCONF_HTTP_PORT`, `YOCONF_GRPC_PORT`
    /// - `YOCONF_DB_HOST`, `YOCONF_DB_PORT`, `YOCONF_DB_NAME`, `YOCONF_DB_USER`, `YOCONF_DB_PASSWORD`
    /// - `YOCONF_CACHE_PATH`, `YOCONF_CACHE_TTL_SECS`
    /// - `YOCONF_LOG_LEVEL`
    pub fn apply_env_overrides_from<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("YOCONF_ADDR") {
            self.server.addr = v;
        }
        if let Some(v) = lookup("YOCONF_HTTP_PORT") {
            self.server.http_port = parse_var("YOCONF_HTTP_PORT", &v)?;
        }
        if let Some(v) = lookup("YOCONF_GRPC_PORT") {
            self.server.grpc_port = parse_var("YOCONF_GRPC_PORT", &v)?;
        }
        if let Some(v) = lookup("YOCONF_DB_HOST") {
            self.database.host = v;
        }
        if let Some(v) = lookup("YOCONF_DB_PORT") {
            self.database.port = parse_var("YOCONF_DB_PORT", &v)?;
        }
        if let Some(v) = lookup("YOCONF_DB_NAME") {
            self.database.dbname = v;
        }
        if let Some(v) = lookup("YOCONF_DB_USER") {
            self.database.user = v;
        }
        if let Some(v) = lookup("YOCONF_DB_PASSWORD") {
            self.database.password = v;
        }
        if let Some(v) = lookup("YOCONF_CACHE_PATH") {
            self.cache.path = v;
        }
        if let Some(v) = lookup("YOCONF_CACHE_TTL_SECS") {
            self.cache.ttl_secs = parse_var("YOCONF_CACHE_TTL_SECS", &v)?;
        }
        if let Some(v) = lookup("YOCONF_LOG_LEVEL") {
            self.log.level = v;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let checks = [
            ("server.http_port", self.server.http_port as u64),
            ("server.grpc_port", self.server.grpc_port as u64),
            ("server.request_timeout_secs", self.server.request_timeout_secs),
            ("retry.max_attempts", self.retry.max_attempts as u64),
            ("cache.ttl_secs", self.cache.ttl_secs),
            ("database.max_size", self.database.max_size as u64),
        ];
        for (field, value) in checks {
            if value == 0 {
                return Err(ConfigError::InvalidValue {
                    field: field.to_string(),
                    value: value.to_string(),
                    reason: "must be non-zero".to_string(),
                });
            }
        }
        Ok(())
    }
}

fn parse_var<T: std::str::FromStr>(name: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        field: name.to_string(),
        value: value.to_string(),
        reason: "cannot be parsed".to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn test_empty_document_yields_defaults() {
        let config = YoconfConfig::from_yaml_str("").unwrap();
        assert_eq!(config, YoconfConfig::default());
        assert_eq!(config.cache.ttl(), Duration::from_secs(7200));
        assert_eq!(config.retry.policy(), RetryPolicy::default());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_document_keeps_other_defaults() {
        let yaml = r#"
server:
  http_port: 8000
cache:
  ttl_secs: 60
log:
  format: json
"#;
        let config = YoconfConfig::from_yaml_str(yaml).unwrap();
        assert_eq!(config.server.http_port, 8000);
        assert_eq!(config.server.grpc_port, 9090);
        assert_eq!(config.cache.ttl_secs, 60);
        assert_eq!(config.log.format, LogFormat::Json);
        assert_eq!(config.server.http_bind(), "0.0.0.0:8000");
    }

    #[test]
    fn test_malformed_yaml_is_parse_error() {
        let err = YoconfConfig::from_yaml_str("server: [unclosed").unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn test_env_overrides_win_over_file() {
        let env: HashMap<&str, &str> = [
            ("YOCONF_HTTP_PORT", "9000"),
            ("YOCONF_DB_HOST", "db.internal"),
            ("YOCONF_CACHE_TTL_SECS", "30"),
        ]
        .into_iter()
        .collect();
        let mut config = YoconfConfig::default();
        config
            .apply_env_overrides_from(|k| env.get(k).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.server.http_port, 9000);
        assert_eq!(config.database.host, "db.internal");
        assert_eq!(config.cache.ttl_secs, 30);
    }

    #[test]
    fn test_unparseable_env_override_is_rejected() {
        let mut config = YoconfConfig::default();
        let err = config
            .apply_env_overrides_from(|k| (k == "YOCONF_GRPC_PORT").then(|| "http".to_string()))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref field, .. } if field == "YOCONF_GRPC_PORT"));
    }

    #[test]
    fn test_validate_rejects_zero_values() {
        let mut config = YoconfConfig::default();
        config.retry.max_attempts = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { ref field, .. }) if field == "retry.max_attempts"
        ));
    }

    #[test]
    fn test_from_file_reads_yaml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "server:\n  addr: 127.0.0.1").unwrap();
        let config = YoconfConfig::from_file(file.path()).unwrap();
        assert_eq!(config.server.addr, "127.0.0.1");

        let missing = YoconfConfig::from_file("/nonexistent/yoconf.yaml").unwrap_err();
        assert!(matches!(missing, ConfigError::Io { .. }));
    }
}
