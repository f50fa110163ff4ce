//! Configuration module for corkboard.

use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::{BoardError, Result};

/// Board service endpoint configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    /// Base URL of the board service API. Paths are joined onto it.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Bearer token sent with every request (empty = none).
    #[serde(default)]
    pub auth_token: String,
    /// Connect timeout in seconds.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    /// Total request timeout in seconds.
    #[serde(default = "default_total_timeout")]
    pub total_timeout_secs: u64,
    /// User agent string.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

fn default_base_url() -> String {
    "http://127.0.0.1:8080/board/api/v1/".to_string()
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_total_timeout() -> u64 {
    30
}

fn default_user_agent() -> String {
    format!("corkboard/{}", env!("CARGO_PKG_VERSION"))
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            auth_token: String::new(),
            connect_timeout_secs: default_connect_timeout(),
            total_timeout_secs: default_total_timeout(),
            user_agent: default_user_agent(),
        }
    }
}

/// Board content configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ContentConfig {
    /// Maximum number of drafts submitted per add request.
    #[serde(default = "default_add_chunk_size")]
    pub add_chunk_size: usize,
    /// Page size requested when listing contents.
    #[serde(default = "default_content_page_limit")]
    pub page_limit: usize,
}

fn default_add_chunk_size() -> usize {
    150
}

fn default_content_page_limit() -> usize {
    100
}

impl Default for ContentConfig {
    fn default() -> Self {
        Self {
            add_chunk_size: default_add_chunk_size(),
            page_limit: default_content_page_limit(),
        }
    }
}

/// Channel listing configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ChannelsConfig {
    /// Page size requested when listing channels.
    #[serde(default = "default_channels_page_limit")]
    pub page_limit: usize,
}

fn default_channels_page_limit() -> usize {
    100
}

impl Default for ChannelsConfig {
    fn default() -> Self {
        Self {
            page_limit: default_channels_page_limit(),
        }
    }
}

/// Realtime connection timers.
///
/// Reconnect backoff is not configured here; it belongs to the transport.
#[derive(Debug, Clone, Deserialize)]
pub struct RealtimeConfig {
    /// Interval between websocket pings, in milliseconds.
    #[serde(default = "default_ping_interval")]
    pub ping_interval_ms: u64,
    /// How long to wait for a pong before declaring the socket dead.
    #[serde(default = "default_pong_timeout")]
    pub pong_timeout_ms: u64,
    /// How long `disconnect` waits for the close handshake.
    #[serde(default = "default_force_close_delay")]
    pub force_close_delay_ms: u64,
    /// Prefix prepended to translated channel ids.
    #[serde(default = "default_binding_prefix")]
    pub binding_prefix: String,
}

fn default_ping_interval() -> u64 {
    15_000
}

fn default_pong_timeout() -> u64 {
    14_000
}

fn default_force_close_delay() -> u64 {
    2_000
}

fn default_binding_prefix() -> String {
    "board.".to_string()
}

impl RealtimeConfig {
    /// Ping interval as a duration.
    pub fn ping_interval(&self) -> Duration {
        Duration::from_millis(self.ping_interval_ms)
    }

    /// Pong timeout as a duration.
    pub fn pong_timeout(&self) -> Duration {
        Duration::from_millis(self.pong_timeout_ms)
    }

    /// Force-close delay as a duration.
    pub fn force_close_delay(&self) -> Duration {
        Duration::from_millis(self.force_close_delay_ms)
    }
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            ping_interval_ms: default_ping_interval(),
            pong_timeout_ms: default_pong_timeout(),
            force_close_delay_ms: default_force_close_delay(),
            binding_prefix: default_binding_prefix(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Path to the log file.
    #[serde(default = "default_log_file")]
    pub file: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_file() -> String {
    "logs/corkboard.log".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: default_log_file(),
        }
    }
}

/// Main configuration structure.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    /// Service endpoint configuration.
    #[serde(default)]
    pub service: ServiceConfig,
    /// Content configuration.
    #[serde(default)]
    pub content: ContentConfig,
    /// Channel listing configuration.
    #[serde(default)]
    pub channels: ChannelsConfig,
    /// Realtime configuration.
    #[serde(default)]
    pub realtime: RealtimeConfig,
    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(BoardError::Io)?;
        Self::parse(&content)
    }

    /// Load configuration from a TOML file and apply environment variable overrides.
    pub fn load_with_env<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(s: &str) -> Result<Self> {
        toml::from_str(s).map_err(|e| BoardError::Validation(format!("config parse error: {e}")))
    }

    /// Apply environment variable overrides to the configuration.
    ///
    /// Supported environment variables:
    /// - `CORKBOARD_BASE_URL`: Override the service base URL
    /// - `CORKBOARD_AUTH_TOKEN`: Override the bearer token
    pub fn apply_env_overrides(&mut self) {
        if let Ok(base_url) = std::env::var("CORKBOARD_BASE_URL") {
            if !base_url.is_empty() {
                self.service.base_url = base_url;
            }
        }
        if let Ok(token) = std::env::var("CORKBOARD_AUTH_TOKEN") {
            if !token.is_empty() {
                self.service.auth_token = token;
            }
        }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        url::Url::parse(&self.service.base_url).map_err(|e| {
            BoardError::Validation(format!("invalid base_url '{}': {e}", self.service.base_url))
        })?;
        if self.content.add_chunk_size == 0 {
            return Err(BoardError::Validation(
                "content.add_chunk_size must be at least 1".to_string(),
            ));
        }
        if self.content.page_limit == 0 || self.channels.page_limit == 0 {
            return Err(BoardError::Validation(
                "page_limit must be at least 1".to_string(),
            ));
        }
        if self.realtime.pong_timeout_ms >= self.realtime.ping_interval_ms {
            return Err(BoardError::Validation(
                "realtime.pong_timeout_ms must be shorter than ping_interval_ms".to_string(),
            ));
        }
        Ok(())
    }
}
