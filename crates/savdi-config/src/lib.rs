#![deny(unsafe_code)]

//! Configuration loading and validation for the savdi scanning client.
//!
//! Loads TOML configuration files and validates them before a client is
//! built from them. [`AppConfig`] is the central configuration structure;
//! [`ClientConfig`] carries the connection and timeout settings.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Network names accepted for `client.network`.
pub const NETWORKS: [&str; 5] = ["unix", "unixpacket", "tcp", "tcp4", "tcp6"];

/// Log level names accepted for `logging.level`.
pub const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Errors that can occur during configuration loading and validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("validation error: {0}")]
    Validation(String),
}

/// Top-level application configuration.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Scanning daemon connection settings.
    #[serde(default)]
    pub client: ClientConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Connection settings for the scanning daemon.
///
/// An empty `network` together with an empty `address` selects the
/// daemon's default unix socket.
///
/// ## TOML Example
///
/// ```toml
/// [client]
/// network = "tcp"
/// address = "127.0.0.1:4010"
/// connect_timeout_secs = 5
/// connect_retries = 2
/// connect_retry_delay_ms = 500
/// command_timeout_secs = 120
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Transport: "unix", "unixpacket", "tcp", "tcp4" or "tcp6".
    #[serde(default)]
    pub network: String,

    /// Socket path for unix transports, `host:port` for tcp transports.
    #[serde(default)]
    pub address: String,

    /// Per-attempt connect deadline in seconds (0 = no deadline).
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,

    /// Additional connect attempts after a timed-out first attempt.
    /// Negative values are clamped to 0 by the client.
    #[serde(default)]
    pub connect_retries: i64,

    /// Sleep between timed-out connect attempts, in milliseconds.
    #[serde(default = "default_connect_retry_delay_ms")]
    pub connect_retry_delay_ms: u64,

    /// Deadline for each request/response step in seconds (0 = no deadline).
    #[serde(default = "default_command_timeout_secs")]
    pub command_timeout_secs: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            network: String::new(),
            address: String::new(),
            connect_timeout_secs: default_connect_timeout_secs(),
            connect_retries: 0,
            connect_retry_delay_ms: default_connect_retry_delay_ms(),
            command_timeout_secs: default_command_timeout_secs(),
        }
    }
}

impl ClientConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn connect_retry_delay(&self) -> Duration {
        Duration::from_millis(self.connect_retry_delay_ms)
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }

    /// Whether the settings select one of the TCP transports.
    pub fn is_tcp(&self) -> bool {
        self.network.starts_with("tcp")
    }
}

fn default_connect_timeout_secs() -> u64 {
    15
}

fn default_connect_retry_delay_ms() -> u64 {
    1000
}

fn default_command_timeout_secs() -> u64 {
    60
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g. "info", "debug", "trace").
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "warn".to_string()
}

impl AppConfig {
    /// Load configuration from a TOML file at the given path using async I/O.
    pub async fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = tokio::fs::read_to_string(path).await?;
        Self::parse(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(s: &str) -> Result<Self, ConfigError> {
        let config: AppConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    ///
    /// Unix socket existence is not checked here; the client constructor
    /// does that when the socket is actually needed.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let client = &self.client;
        if client.network.is_empty() {
            if !client.address.is_empty() {
                return Err(ConfigError::Validation(
                    "client.network is required when client.address is set".to_string(),
                ));
            }
        } else if !NETWORKS.contains(&client.network.as_str()) {
            return Err(ConfigError::Validation(format!(
                "client.network must be one of {:?}, got {:?}",
                NETWORKS, client.network
            )));
        }
        if client.is_tcp() && client.address.is_empty() {
            return Err(ConfigError::Validation(format!(
                "client.address must not be empty for network {:?}",
                client.network
            )));
        }

        if !LOG_LEVELS.contains(&self.logging.level.as_str()) {
            return Err(ConfigError::Validation(format!(
                "logging.level must be one of {:?}, got {:?}",
                LOG_LEVELS, self.logging.level
            )));
        }

        Ok(())
    }
}
