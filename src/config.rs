//! Configuration management for Easytrip.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use crate::error::{Result, TripError};

/// Environment variable prefix for configuration overrides.
pub const ENV_PREFIX: &str = "EASYTRIP";

/// Shortest HMAC secret accepted for bearer tokens.
const MIN_SECRET_LENGTH: usize = 32;

/// Slowest refill accepted: one token every 1000 seconds.
const MIN_REFILL_PER_SECOND: f64 = 0.001;

/// Longest token lifetime accepted: one year.
pub const MAX_TOKEN_TTL_HOURS: u64 = 24 * 366;

/// Main configuration for the Easytrip service.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TripConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Rate limiting configuration
    #[serde(default)]
    pub rate_limiting: RateLimitingConfig,

    /// Storage configuration
    #[serde(default)]
    pub storage: StorageConfig,

    /// Credential configuration
    #[serde(default)]
    pub auth: AuthConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// HTTP listen address
    #[serde(default = "default_http_addr")]
    pub http_addr: SocketAddr,

    /// Upper bound on the storage work of a single request
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: default_http_addr(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

impl ServerConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

fn default_http_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 8080))
}

fn default_request_timeout() -> u64 {
    10
}

/// Per-client admission control configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitingConfig {
    /// Tokens added to each client bucket per second
    #[serde(default = "default_refill_per_second")]
    pub refill_per_second: f64,

    /// Bucket capacity, i.e. the largest burst a fresh client may send
    #[serde(default = "default_burst")]
    pub burst: u32,

    /// How often idle clients are swept
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,

    /// Idle time after which a client's state is dropped
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,
}

impl Default for RateLimitingConfig {
    fn default() -> Self {
        Self {
            refill_per_second: default_refill_per_second(),
            burst: default_burst(),
            sweep_interval_secs: default_sweep_interval(),
            idle_timeout_secs: default_idle_timeout(),
        }
    }
}

impl RateLimitingConfig {
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }
}

fn default_refill_per_second() -> f64 {
    2.0
}

fn default_burst() -> u32 {
    10
}

fn default_sweep_interval() -> u64 {
    60
}

fn default_idle_timeout() -> u64 {
    180
}

/// Storage configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Path of the SQLite database file
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// How long a connection waits on a locked database
    #[serde(default = "default_busy_timeout")]
    pub busy_timeout_ms: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            busy_timeout_ms: default_busy_timeout(),
        }
    }
}

fn default_database_path() -> String {
    "easytrip.db".to_string()
}

fn default_busy_timeout() -> u64 {
    5000
}

/// Bearer credential configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// HMAC secret for tokens; generated per process when unset
    #[serde(default)]
    pub jwt_secret: Option<String>,

    /// Lifetime of tokens issued by `add-user`
    #[serde(default = "default_token_ttl")]
    pub token_ttl_hours: u64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: None,
            token_ttl_hours: default_token_ttl(),
        }
    }
}

fn default_token_ttl() -> u64 {
    24
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive when RUST_LOG is unset
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON lines instead of human-readable output
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl TripConfig {
    /// Load configuration from a YAML file path.
    pub fn from_file(path: &str) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Parse configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: TripConfig =
            serde_yaml::from_str(yaml).map_err(|e| TripError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load layered configuration: optional YAML file, then `EASYTRIP__*` environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(
                config::File::from(path).format(config::FileFormat::Yaml),
            );
        }
        let config: TripConfig = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| TripError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the service cannot run with.
    pub fn validate(&self) -> Result<()> {
        let rl = &self.rate_limiting;
        if rl.burst == 0 {
            return Err(TripError::Config("rate_limiting.burst must be at least 1".into()));
        }
        if !(rl.refill_per_second.is_finite() && rl.refill_per_second >= MIN_REFILL_PER_SECOND) {
            return Err(TripError::Config(format!(
                "rate_limiting.refill_per_second must be a number of at least {}",
                MIN_REFILL_PER_SECOND
            )));
        }
        if rl.sweep_interval_secs == 0 || rl.idle_timeout_secs == 0 {
            return Err(TripError::Config(
                "rate_limiting sweep interval and idle timeout must be non-zero".into(),
            ));
        }
        if self.server.request_timeout_secs == 0 {
            return Err(TripError::Config("server.request_timeout_secs must be non-zero".into()));
        }
        if self.auth.token_ttl_hours == 0 || self.auth.token_ttl_hours > MAX_TOKEN_TTL_HOURS {
            return Err(TripError::Config(format!(
                "auth.token_ttl_hours must be between 1 and {}",
                MAX_TOKEN_TTL_HOURS
            )));
        }
        if let Some(secret) = &self.auth.jwt_secret {
            if secret.len() < MIN_SECRET_LENGTH {
                return Err(TripError::Config(format!(
                    "auth.jwt_secret must be at least {} bytes",
                    MIN_SECRET_LENGTH
                )));
            }
        }
        Ok(())
    }
}
