//! Configuration management for bitanalytics
//!
//! TOML file support, environment variable overrides, and defaults that
//! match the key scheme and Redis limits.
//!
//! ```toml
//! [redis]
//! url = "redis://127.0.0.1:6379"
//! pool_size = 16
//!
//! [tracking]
//! key_prefix = "bitanalytics"
//! track_hourly = false
//! max_identifier = 4294967295
//!
//! [logging]
//! log_level = "info"
//! ```

use crate::error::{Error, Result, ValidationError};
use crate::keys::{KeyBuilder, DEFAULT_PREFIX};
use crate::redis::RedisConfig;
use crate::types::{Identifier, MAX_BIT_OFFSET};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    /// Redis connection settings
    #[serde(default)]
    pub redis: RedisSection,

    /// Event tracking settings
    #[serde(default)]
    pub tracking: TrackingConfig,

    /// Logging settings
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Redis connection settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RedisSection {
    /// Redis server URL
    #[serde(default = "default_redis_url")]
    pub url: String,

    /// Maximum concurrent commands on the shared connection
    #[serde(default = "default_pool_size")]
    pub pool_size: u32,

    /// Timeout for establishing the connection, in milliseconds
    #[serde(default = "default_connection_timeout_ms")]
    pub connection_timeout_ms: u64,

    /// Keys requested per SCAN call (and per DEL batch) during cleanup
    #[serde(default = "default_scan_count")]
    pub scan_count: usize,

    /// Connect with TLS (`rediss://`)
    #[serde(default)]
    pub tls_enabled: bool,
}

/// Event tracking settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TrackingConfig {
    /// Prefix of every key written
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,

    /// Also mark hourly buckets when no explicit choice is made
    #[serde(default)]
    pub track_hourly: bool,

    /// Largest identifier accepted; bounds bitmap memory
    #[serde(default = "default_max_identifier")]
    pub max_identifier: Identifier,
}

/// Logging settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Log level (error, warn, info, debug, trace) or an EnvFilter directive
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

// Default value functions
fn default_redis_url() -> String {
    "redis://127.0.0.1:6379".to_string()
}
fn default_pool_size() -> u32 {
    16
}
fn default_connection_timeout_ms() -> u64 {
    5_000
}
fn default_scan_count() -> usize {
    500
}
fn default_key_prefix() -> String {
    DEFAULT_PREFIX.to_string()
}
fn default_max_identifier() -> Identifier {
    MAX_BIT_OFFSET
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for RedisSection {
    fn default() -> Self {
        Self {
            url: default_redis_url(),
            pool_size: default_pool_size(),
            connection_timeout_ms: default_connection_timeout_ms(),
            scan_count: default_scan_count(),
            tls_enabled: false,
        }
    }
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            key_prefix: default_key_prefix(),
            track_hourly: false,
            max_identifier: default_max_identifier(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

impl RedisSection {
    /// Connection settings for the Redis store
    pub fn to_redis_config(&self) -> RedisConfig {
        RedisConfig::with_url(self.url.clone())
            .pool_size(self.pool_size)
            .connection_timeout(Duration::from_millis(self.connection_timeout_ms))
            .scan_count(self.scan_count)
            .tls(self.tls_enabled)
    }
}

impl TrackingConfig {
    /// Key builder for the configured prefix
    pub fn key_builder(&self) -> Result<KeyBuilder> {
        KeyBuilder::new(self.key_prefix.clone())
    }

    /// Validate tracking settings
    pub fn validate(&self) -> Result<()> {
        self.key_builder()
            .map_err(|e| Error::Configuration(format!("tracking.key_prefix: {}", e)))?;

        if self.max_identifier == 0 || self.max_identifier > MAX_BIT_OFFSET {
            return Err(ValidationError::OutOfRange {
                field: "tracking.max_identifier".to_string(),
                value: self.max_identifier.to_string(),
                min: "1".to_string(),
                max: MAX_BIT_OFFSET.to_string(),
            }
            .into());
        }
        Ok(())
    }
}

impl Config {
    /// Load configuration from TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)?;

        toml::from_str(&contents).map_err(|e| {
            Error::Configuration(format!(
                "Failed to parse config file {}: {}",
                path.display(),
                e
            ))
        })
    }

    /// Load configuration with environment variable overrides
    pub fn from_file_with_env(path: impl AsRef<Path>) -> Result<Self> {
        let mut config = Self::from_file(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load from environment variables only
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env_overrides();
        config
    }

    /// Apply environment variable overrides
    ///
    /// Unparseable numeric or boolean values are ignored.
    pub fn apply_env_overrides(&mut self) {
        // Redis
        if let Ok(url) = std::env::var("BITANALYTICS_REDIS_URL") {
            self.redis.url = url;
        }

        // Tracking
        if let Ok(prefix) = std::env::var("BITANALYTICS_KEY_PREFIX") {
            self.tracking.key_prefix = prefix;
        }
        if let Ok(hourly) = std::env::var("BITANALYTICS_TRACK_HOURLY") {
            if let Ok(h) = hourly.parse() {
                self.tracking.track_hourly = h;
            }
        }
        if let Ok(max) = std::env::var("BITANALYTICS_MAX_IDENTIFIER") {
            if let Ok(m) = max.parse() {
                self.tracking.max_identifier = m;
            }
        }

        // Logging
        if let Ok(log_level) = std::env::var("RUST_LOG") {
            self.logging.log_level = log_level;
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        self.redis
            .to_redis_config()
            .validate()
            .map_err(Error::Configuration)?;

        self.tracking.validate()
    }

    /// Save configuration to TOML file
    pub fn save_to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let contents = toml::to_string_pretty(self)
            .map_err(|e| Error::Configuration(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path, contents)?;
        Ok(())
    }
}
