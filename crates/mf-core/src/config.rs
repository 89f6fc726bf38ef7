//! Configuration parsing for the market feed client.
//!
//! The runner reads a single JSON file with a `logging` block and a `feed`
//! block. Only `feed.endpoint` is mandatory.
//!
//! # Example config
//!
//! ```json
//! {
//!   "logging": { "module_name": "market_feed", "log_path": "/tmp/log", "level": "info" },
//!   "feed": {
//!     "endpoint": "wss://prices.example.com/ws",
//!     "client_id": "mobile-trading-app",
//!     "connect_timeout_ms": 10000,
//!     "reconnect": { "max_attempts": 5, "base_delay_ms": 1000 },
//!     "instruments": ["EURUSD"]
//!   }
//! }
//! ```

use std::collections::HashMap;
use std::time::Duration;

use serde::Deserialize;

use crate::error::FeedError;

/// Client identifier sent in the handshake when none is configured.
pub const DEFAULT_CLIENT_ID: &str = "market-feed-client";

/// Top-level application config, deserialized from a JSON file.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Logging metadata (module name, log path, level).
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Feed connection settings.
    pub feed: FeedConfig,
}

/// Logging block.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoggingConfig {
    pub module_name: Option<String>,
    pub log_path: Option<String>,
    pub level: Option<String>,
}

impl LoggingConfig {
    /// Returns the module name, used as the log file prefix.
    pub fn module_name(&self) -> &str {
        self.module_name.as_deref().unwrap_or("market_feed")
    }
}

/// Settings for one feed client.
#[derive(Debug, Clone, Deserialize)]
pub struct FeedConfig {
    /// WebSocket URL of the price server (`ws://` or `wss://`).
    pub endpoint: String,

    /// Identifier sent in the handshake (default: [`DEFAULT_CLIENT_ID`]).
    #[serde(default)]
    pub client_id: Option<String>,

    /// Version string sent in the handshake.
    #[serde(default = "default_client_version")]
    pub client_version: String,

    /// How long an attempt may stay in `Connecting` before it counts as failed.
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    /// Reconnection policy.
    #[serde(default)]
    pub reconnect: ReconnectConfig,

    /// WebSocket ping interval. `None` disables client pings.
    #[serde(default)]
    pub ping_interval_ms: Option<u64>,

    /// Extra HTTP headers for the WebSocket handshake.
    #[serde(default)]
    pub extra_headers: HashMap<String, String>,

    /// Symbols the runner subscribes to individually.
    #[serde(default)]
    pub instruments: Vec<String>,
}

/// Linear backoff: attempt `n` waits `n * base_delay_ms`.
#[derive(Debug, Clone, Deserialize)]
pub struct ReconnectConfig {
    /// Retries after which the client gives up until started again.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Backoff unit in milliseconds.
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
        }
    }
}

impl ReconnectConfig {
    /// Delay before reconnect attempt number `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.base_delay_ms.saturating_mul(u64::from(attempt)))
    }
}

impl FeedConfig {
    /// Config with every optional field at its default.
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            client_id: None,
            client_version: default_client_version(),
            connect_timeout_ms: default_connect_timeout_ms(),
            reconnect: ReconnectConfig::default(),
            ping_interval_ms: None,
            extra_headers: HashMap::new(),
            instruments: Vec::new(),
        }
    }

    /// Returns the client id sent in the handshake.
    pub fn client_id(&self) -> &str {
        self.client_id.as_deref().unwrap_or(DEFAULT_CLIENT_ID)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn ping_interval(&self) -> Option<Duration> {
        self.ping_interval_ms.filter(|&ms| ms > 0).map(Duration::from_millis)
    }

    /// Reject settings the feed client cannot run with.
    pub fn validate(&self) -> Result<(), FeedError> {
        let url = url::Url::parse(&self.endpoint)
            .map_err(|e| FeedError::Config(format!("invalid endpoint '{}': {e}", self.endpoint)))?;
        if !matches!(url.scheme(), "ws" | "wss") {
            return Err(FeedError::Config(format!("endpoint must be ws:// or wss://, got '{}'", url.scheme())));
        }
        if self.connect_timeout_ms == 0 {
            return Err(FeedError::Config("connect_timeout_ms must be > 0".into()));
        }
        if self.reconnect.base_delay_ms == 0 {
            return Err(FeedError::Config("reconnect.base_delay_ms must be > 0".into()));
        }
        if self.instruments.iter().any(|s| s.trim().is_empty()) {
            return Err(FeedError::Config("instrument symbols must be non-empty".into()));
        }
        Ok(())
    }
}

fn default_client_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

fn default_connect_timeout_ms() -> u64 {
    10_000
}

fn default_max_attempts() -> u32 {
    5
}

fn default_base_delay_ms() -> u64 {
    1_000
}

/// Parse and validate a JSON config document.
pub fn parse_config(content: &str) -> anyhow::Result<AppConfig> {
    let config: AppConfig = serde_json::from_str(content)?;
    config.feed.validate()?;
    Ok(config)
}

/// Load, parse and validate a JSON config file.
pub fn load_config(path: &std::path::Path) -> anyhow::Result<AppConfig> {
    let content = std::fs::read_to_string(path)?;
    parse_config(&content)
}
