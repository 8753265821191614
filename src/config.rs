//! Configuration management with validation and defaults
//!
//! Settings load from an optional TOML file, are overridden by `HASHDICE_*`
//! environment variables and are validated before use.

use crate::errors::ConfigurationError;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;
use std::time::Duration;

/// Top-level configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HashdiceConfig {
    pub engine: EngineConfig,
    pub oracle: OracleConfig,
    pub storage: StorageConfig,
    pub api: ApiConfig,
    pub monitoring: MonitoringConfig,
}

/// Settlement rules
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Fraction of each wager the house expects to keep
    pub house_edge: f64,
    /// Largest accepted target multiplier
    pub max_target: f64,
    /// Iteration count of a fresh chain's terminal commitment
    pub hash_iterations: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            house_edge: 0.01,
            max_target: 10_000.0,
            hash_iterations: 10_000,
        }
    }
}

/// Hash oracle endpoint
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct OracleConfig {
    pub base_url: String,
    pub request_timeout_ms: u64,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:9090".to_string(),
            request_timeout_ms: 5_000,
        }
    }
}

/// Ledger storage
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub data_directory: String,
    /// How long a transaction waits on a row lock before failing.
    ///
    /// A bet holds its locks across up to two oracle calls (terminal and step
    /// hash), so this must exceed twice `oracle.request_timeout_ms`.
    pub lock_timeout_ms: u64,
    /// Whether to clear the ledger on startup (testing only!)
    pub clear_on_start: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_directory: "./DB/ledger".to_string(),
            lock_timeout_ms: 12_000,
            clear_on_start: false,
        }
    }
}

/// HTTP API server
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,
    pub allowed_origins: Vec<String>,
    pub request_timeout_secs: u64,
}

impl ApiConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            allowed_origins: vec!["*".to_string()],
            request_timeout_secs: 30,
        }
    }
}

/// Logging configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitoringConfig {
    pub log_level: LogLevel,
    /// Full `EnvFilter` directive; takes precedence over `log_level`
    pub log_filter: Option<String>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

impl std::str::FromStr for LogLevel {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "error" => Ok(LogLevel::Error),
            "warn" => Ok(LogLevel::Warn),
            "info" => Ok(LogLevel::Info),
            "debug" => Ok(LogLevel::Debug),
            "trace" => Ok(LogLevel::Trace),
            _ => Err(()),
        }
    }
}

impl HashdiceConfig {
    /// Configuration for tests: short timeouts, ledger wiped on open
    pub fn testing() -> Self {
        Self {
            oracle: OracleConfig {
                request_timeout_ms: 1_000,
                ..Default::default()
            },
            storage: StorageConfig {
                lock_timeout_ms: 5_000,
                clear_on_start: true,
                ..Default::default()
            },
            monitoring: MonitoringConfig {
                log_level: LogLevel::Debug,
                log_filter: None,
            },
            ..Default::default()
        }
    }

    /// Validate configuration for logical consistency
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        let edge = self.engine.house_edge;
        if !(0.0..1.0).contains(&edge) {
            return Err(invalid("engine.house_edge", edge, "must be in [0, 1)"));
        }

        if !self.engine.max_target.is_finite() || self.engine.max_target <= 1.0 {
            return Err(invalid(
                "engine.max_target",
                self.engine.max_target,
                "must be a finite value above 1",
            ));
        }

        if self.engine.hash_iterations < 2 {
            return Err(invalid(
                "engine.hash_iterations",
                self.engine.hash_iterations,
                "a chain needs at least one step after its terminal hash",
            ));
        }

        if self.oracle.base_url.trim().is_empty() {
            return Err(ConfigurationError::MissingRequired("oracle.base_url".to_string()));
        }

        if self.oracle.request_timeout_ms == 0 {
            return Err(invalid("oracle.request_timeout_ms", 0, "cannot be zero"));
        }

        if self.storage.data_directory.trim().is_empty() {
            return Err(ConfigurationError::MissingRequired(
                "storage.data_directory".to_string(),
            ));
        }

        if self.storage.lock_timeout_ms <= self.oracle.request_timeout_ms.saturating_mul(2) {
            return Err(invalid(
                "storage.lock_timeout_ms",
                self.storage.lock_timeout_ms,
                "must exceed twice oracle.request_timeout_ms",
            ));
        }

        if self.api.port == 0 {
            return Err(invalid("api.port", 0, "port cannot be zero"));
        }

        Ok(())
    }

    pub fn oracle_timeout(&self) -> Duration {
        Duration::from_millis(self.oracle.request_timeout_ms)
    }


    /// Filter directive for `tracing_subscriber::EnvFilter`
    pub fn log_filter(&self) -> String {
        self.monitoring
            .log_filter
            .clone()
            .unwrap_or_else(|| {
                let level = self.monitoring.log_level.as_str();
                format!("hashdice={level},tower_http={level}")
            })
    }
}

fn invalid(field: &str, value: impl ToString, reason: &str) -> ConfigurationError {
    ConfigurationError::InvalidValue {
        field: field.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

/// Configuration loader with environment variable support
#[derive(Default)]
pub struct ConfigLoader {
    config_path: Option<String>,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self { config_path: None }
    }

    /// Set the configuration file path
    pub fn with_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_path = Some(path.as_ref().to_string_lossy().to_string());
        self
    }

    /// Load configuration from file and environment variables
    pub fn load(&self) -> Result<HashdiceConfig, ConfigurationError> {
        let mut config = match self.config_path {
            Some(ref path) => Self::load_from_file(path)?,
            None => HashdiceConfig::default(),
        };

        apply_overrides(&mut config, |key| env::var(key).ok())?;
        config.validate()?;

        Ok(config)
    }

    fn load_from_file(path: &str) -> Result<HashdiceConfig, ConfigurationError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigurationError::LoadFailed(format!("Failed to read {}: {}", path, e)))?;

        Ok(toml::from_str(&content)?)
    }
}

/// Apply `HASHDICE_*` overrides using `lookup` to resolve variables
pub fn apply_overrides<F>(config: &mut HashdiceConfig, lookup: F) -> Result<(), ConfigurationError>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(edge) = lookup("HASHDICE_HOUSE_EDGE") {
        config.engine.house_edge = parse_var("HASHDICE_HOUSE_EDGE", edge, "Invalid house edge")?;
    }

    if let Some(url) = lookup("HASHDICE_ORACLE_URL") {
        config.oracle.base_url = url;
    }
    if let Some(timeout) = lookup("HASHDICE_ORACLE_TIMEOUT_MS") {
        config.oracle.request_timeout_ms =
            parse_var("HASHDICE_ORACLE_TIMEOUT_MS", timeout, "Invalid timeout value")?;
    }

    if let Some(dir) = lookup("HASHDICE_DATA_DIR") {
        config.storage.data_directory = dir;
    }

    if let Some(host) = lookup("HASHDICE_API_HOST") {
        config.api.host = host;
    }
    if let Some(port) = lookup("HASHDICE_API_PORT") {
        config.api.port = parse_var("HASHDICE_API_PORT", port, "Invalid port number")?;
    }

    if let Some(level) = lookup("HASHDICE_LOG_LEVEL") {
        config.monitoring.log_level = parse_var("HASHDICE_LOG_LEVEL", level, "Unknown log level")?;
    }

    Ok(())
}

fn parse_var<T: std::str::FromStr>(
    field: &str,
    value: String,
    reason: &str,
) -> Result<T, ConfigurationError> {
    value.parse().map_err(|_| ConfigurationError::InvalidValue {
        field: field.to_string(),
        value,
        reason: reason.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_config_is_valid() {
        let config = HashdiceConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.engine.hash_iterations, 10_000);
        assert_eq!(config.engine.max_target, 10_000.0);
    }

    #[test]
    fn test_testing_config_is_valid() {
        let config = HashdiceConfig::testing();
        assert!(config.validate().is_ok());
        assert!(config.storage.clear_on_start);
    }

    #[test]
    fn test_invalid_house_edge() {
        let mut config = HashdiceConfig::default();
        config.engine.house_edge = 1.0;
        assert!(config.validate().is_err());

        config.engine.house_edge = -0.01;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_lock_timeout_must_outlast_oracle_calls() {
        let mut config = HashdiceConfig::default();
        assert!(config.storage.lock_timeout_ms > 2 * config.oracle.request_timeout_ms);

        config.storage.lock_timeout_ms = 2_000;
        assert!(matches!(
            config.validate(),
            Err(ConfigurationError::InvalidValue { ref field, .. }) if field == "storage.lock_timeout_ms"
        ));

        config.storage.lock_timeout_ms = 10_000;
        assert!(config.validate().is_err());

        config.storage.lock_timeout_ms = 10_001;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_api_request_timeout() {
        let mut api = ApiConfig::default();
        assert_eq!(api.request_timeout(), Duration::from_secs(30));

        api.request_timeout_secs = 2;
        assert_eq!(api.request_timeout(), Duration::from_secs(2));
    }

    #[test]
    fn test_single_iteration_chain_rejected() {
        let mut config = HashdiceConfig::default();
        config.engine.hash_iterations = 1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_toml_partial_sections_use_defaults() {
        let config: HashdiceConfig = toml::from_str(
            r#"
            [engine]
            house_edge = 0.02

            [oracle]
            base_url = "http://oracle:9000"
            "#,
        )
        .unwrap();

        assert_eq!(config.engine.house_edge, 0.02);
        assert_eq!(config.engine.max_target, 10_000.0);
        assert_eq!(config.oracle.base_url, "http://oracle:9000");
        assert_eq!(config.oracle.request_timeout_ms, 5_000);
        assert_eq!(config.api.port, 8080);
    }

    #[test]
    fn test_overrides_applied() {
        let vars: HashMap<&str, &str> = [
            ("HASHDICE_ORACLE_URL", "http://10.0.0.5:9090"),
            ("HASHDICE_API_PORT", "9999"),
            ("HASHDICE_LOG_LEVEL", "DEBUG"),
        ]
        .into_iter()
        .collect();

        let mut config = HashdiceConfig::default();
        apply_overrides(&mut config, |k| vars.get(k).map(|v| v.to_string())).unwrap();

        assert_eq!(config.oracle.base_url, "http://10.0.0.5:9090");
        assert_eq!(config.api.port, 9999);
        assert_eq!(config.monitoring.log_level, LogLevel::Debug);
    }

    #[test]
    fn test_bad_override_reports_field() {
        let mut config = HashdiceConfig::default();
        let err = apply_overrides(&mut config, |k| {
            (k == "HASHDICE_API_PORT").then(|| "not-a-port".to_string())
        })
        .unwrap_err();

        assert!(err.to_string().contains("HASHDICE_API_PORT"));
    }

    #[test]
    fn test_log_filter() {
        let mut config = HashdiceConfig::default();
        assert_eq!(config.log_filter(), "hashdice=info,tower_http=info");

        config.monitoring.log_filter = Some("trace".to_string());
        assert_eq!(config.log_filter(), "trace");
    }
}
