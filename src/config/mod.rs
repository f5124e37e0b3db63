//! Typed configuration from environment variables and an optional TOML file.
//!
//! `Config` loads once at startup and fails fast if required vars are missing.
//! Sensitive values are wrapped in secrecy::SecretString to prevent log leaks.
//! `DrainConfig` holds the dispatcher's tuning knobs and may come from a file.

pub mod secrets;

use crate::error::{Error, Result};
use secrecy::SecretString;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

#[derive(Debug)]
pub struct Config {
    /// Only the consumer needs it; see [`Config::database_url`].
    pub database_url: Option<SecretString>,
    pub mq_name: String,
    pub mq_token: SecretString,
    pub mq_base_url: String,
    pub s3_bucket: String,
    pub s3_endpoint: String,
    pub s3_region: Option<String>,
    pub results_base_url: String,
    pub deck_image_base_url: String,
    pub events_base_url: String,
    pub http_timeout: Duration,
    pub otel_endpoint: Option<String>,
    pub log_level: String,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// In local dev, call `dotenvy::dotenv().ok()` before this.
    pub fn from_env() -> Result<Self> {
        let http_timeout_secs = match std::env::var("HTTP_TIMEOUT_SECS") {
            Ok(raw) => raw.parse::<u64>().map_err(|_| {
                Error::Config(format!("HTTP_TIMEOUT_SECS must be an integer, got {raw:?}"))
            })?,
            Err(_) => 30,
        };

        Ok(Self {
            database_url: std::env::var("DATABASE_URL").ok().map(SecretString::from),
            mq_name: required_var("MQ_NAME")?,
            mq_token: SecretString::from(required_var("MQ_TOKEN")?),
            mq_base_url: var_or("MQ_BASE_URL", "https://simplemq.tk1b.api.sacloud.jp"),
            s3_bucket: var_or("S3_BUCKET", "vsrecorder"),
            s3_endpoint: var_or("S3_ENDPOINT", "https://s3.isk01.sakurastorage.jp"),
            s3_region: std::env::var("S3_REGION").ok(),
            results_base_url: var_or("RESULTS_BASE_URL", "https://players.pokemon-card.com"),
            deck_image_base_url: var_or("DECK_IMAGE_BASE_URL", "https://www.pokemon-card.com"),
            events_base_url: var_or("EVENTS_BASE_URL", "https://beta.vsrecorder.mobi"),
            http_timeout: Duration::from_secs(http_timeout_secs),
            otel_endpoint: std::env::var("OTEL_ENDPOINT").ok(),
            log_level: var_or("LOG_LEVEL", "info"),
        })
    }
}

impl Config {
    /// The database URL, or a config error naming the missing variable.
    pub fn database_url(&self) -> Result<&SecretString> {
        self.database_url.as_ref().ok_or_else(|| {
            Error::Config("required environment variable DATABASE_URL is not set".to_string())
        })
    }
}

fn required_var(name: &str) -> Result<String> {
    std::env::var(name)
        .map_err(|_| Error::Config(format!("required environment variable {name} is not set")))
}

fn var_or(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

/// Dispatcher tuning. Every field has a default, so an empty file is valid.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DrainConfig {
    /// Maximum number of messages processed at once.
    pub concurrency: usize,
    /// Capacity of the failure channel. Reports beyond it are dropped.
    pub failure_buffer: usize,
    /// Postgres pool size shared by all workers.
    pub db_max_connections: u32,
    /// Extend the message's visibility timeout before persisting results.
    pub extend_visibility: bool,
    /// Delete messages that end unacknowledged once they are older than this.
    /// Unset keeps them on the queue for redelivery indefinitely.
    pub discard_after_secs: Option<u64>,
    pub receive_backoff: BackoffConfig,
}

impl Default for DrainConfig {
    fn default() -> Self {
        Self {
            concurrency: 100,
            failure_buffer: 50,
            db_max_connections: 10,
            extend_visibility: true,
            discard_after_secs: None,
            receive_backoff: BackoffConfig::default(),
        }
    }
}

impl DrainConfig {
    /// Load from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("cannot read drain config {}: {e}", path.display()))
        })?;
        Self::from_toml(&content)
            .map_err(|e| Error::Config(format!("bad drain config {}: {e}", path.display())))
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(content).map_err(|e| Error::Config(e.to_string()))?;
        if config.concurrency == 0 {
            return Err(Error::Config("concurrency must be at least 1".to_string()));
        }
        if config.failure_buffer == 0 {
            return Err(Error::Config("failure_buffer must be at least 1".to_string()));
        }
        if config.db_max_connections == 0 {
            return Err(Error::Config("db_max_connections must be at least 1".to_string()));
        }
        Ok(config)
    }

    pub fn discard_after(&self) -> Option<Duration> {
        self.discard_after_secs.map(Duration::from_secs)
    }
}

/// Backoff applied when receiving from the queue fails.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BackoffConfig {
    pub initial_ms: u64,
    pub max_ms: u64,
    /// Consecutive failed receives tolerated before the drain stops receiving.
    pub max_retries: u32,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_ms: 500,
            max_ms: 30_000,
            max_retries: 10,
        }
    }
}

impl From<&BackoffConfig> for crate::retry::RetryConfig {
    fn from(config: &BackoffConfig) -> Self {
        crate::retry::RetryConfig::new(
            config.max_retries,
            Duration::from_millis(config.initial_ms),
            Duration::from_millis(config.max_ms),
            2.0,
        )
    }
}
