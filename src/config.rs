//! Configuration management for Tollgate.
//!
//! Only the service binary reads files and environment variables. The
//! limiter itself is configured through [`LimiterConfig`].

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;
use tracing::info;

use crate::error::{Result, TollgateError};
use crate::ratelimit::LimiterConfig;

/// Environment variable prefix, e.g. `TOLLGATE__LIMITER__REQUESTS=50`.
const ENV_PREFIX: &str = "TOLLGATE";

/// Main configuration for the Tollgate service.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TollgateConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Limiter parameters
    #[serde(default)]
    pub limiter: LimiterSettings,

    /// Idle bucket eviction
    #[serde(default)]
    pub eviction: EvictionConfig,

    /// Log output
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// gRPC server address
    #[serde(default = "default_grpc_addr")]
    pub grpc_addr: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            grpc_addr: default_grpc_addr(),
        }
    }
}

fn default_grpc_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 8081))
}

/// Limiter parameters as `requests` per `per_seconds`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimiterSettings {
    /// Burst capacity and requests allowed per window
    #[serde(default = "default_requests")]
    pub requests: u32,

    /// Window length in seconds
    #[serde(default = "default_per_seconds")]
    pub per_seconds: f64,

    /// Key used for callers without a usable identity
    #[serde(default = "default_anonymous_key")]
    pub anonymous_key: String,
}

impl Default for LimiterSettings {
    fn default() -> Self {
        Self {
            requests: default_requests(),
            per_seconds: default_per_seconds(),
            anonymous_key: default_anonymous_key(),
        }
    }
}

fn default_requests() -> u32 {
    100
}

fn default_per_seconds() -> f64 {
    60.0
}

fn default_anonymous_key() -> String {
    "anonymous".to_string()
}

impl LimiterSettings {
    /// Build the validated limiter configuration.
    pub fn limiter_config(&self) -> Result<LimiterConfig> {
        LimiterConfig::from_requests(self.requests, self.per_seconds)
    }
}

/// Idle bucket eviction configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvictionConfig {
    /// Whether the background sweeper runs
    #[serde(default = "default_eviction_enabled")]
    pub enabled: bool,

    /// Minimum idle time before a full bucket is dropped
    #[serde(default = "default_idle_ttl")]
    pub idle_ttl_secs: u64,

    /// Time between sweeps
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
}

impl Default for EvictionConfig {
    fn default() -> Self {
        Self {
            enabled: default_eviction_enabled(),
            idle_ttl_secs: default_idle_ttl(),
            sweep_interval_secs: default_sweep_interval(),
        }
    }
}

fn default_eviction_enabled() -> bool {
    true
}

fn default_idle_ttl() -> u64 {
    300
}

fn default_sweep_interval() -> u64 {
    60
}

impl EvictionConfig {
    pub fn idle_ttl(&self) -> Duration {
        Duration::from_secs(self.idle_ttl_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive, overridden by `RUST_LOG`
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn env_source() -> ::config::Environment {
    ::config::Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("__")
        .separator("__")
}

impl TollgateConfig {
    /// Load configuration from an optional YAML file, then `TOLLGATE__*`
    /// environment variables.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::load_with_env(path, env_source())
    }

    fn load_with_env(path: Option<&Path>, env: ::config::Environment) -> Result<Self> {
        let mut builder = ::config::Config::builder();

        if let Some(path) = path {
            info!(path = %path.display(), "Loading configuration file");
            builder = builder.add_source(
                ::config::File::from(path).format(::config::FileFormat::Yaml),
            );
        }

        builder
            .add_source(env)
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| TollgateError::Config(e.to_string()))
    }

    /// Load configuration from a file path.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Parse configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml)
            .map_err(|e| TollgateError::Config(format!("Failed to parse config: {}", e)))
    }
}
