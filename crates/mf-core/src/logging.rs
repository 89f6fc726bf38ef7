//! Logging initialization using the `tracing` ecosystem.
//!
//! Provides:
//! - Console output, either human-readable (colored) or one JSON object per line
//! - File output (daily rotation via `tracing-appender`)
//! - Configurable log level via env var `RUST_LOG` or explicit parameter

use anyhow::{Result, anyhow};
use tracing_subscriber::{EnvFilter, Layer, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize the global tracing subscriber.
///
/// Should be called once at program start. A second call returns an error
/// instead of panicking, so tests and embedders can call it defensively.
///
/// # Parameters
///
/// - `log_level`: default level if `RUST_LOG` env var is not set (e.g. `"info"`)
/// - `log_dir`: optional directory for daily-rotating log files
/// - `module_name`: used as the log file prefix (e.g. `"market_feed"`)
/// - `json`: emit console records as JSON instead of formatted text
pub fn init_logging(log_level: &str, log_dir: Option<&str>, module_name: &str, json: bool) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    let console_layer = if json {
        fmt::layer().json().with_target(true).with_current_span(false).boxed()
    } else {
        fmt::layer().with_target(true).with_thread_ids(true).with_ansi(true).boxed()
    };

    let file_layer = log_dir.map(|dir| {
        fmt::layer()
            .with_writer(tracing_appender::rolling::daily(dir, module_name))
            .with_ansi(false)
            .with_target(true)
            .with_thread_ids(true)
    });

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| anyhow!("logging already initialized: {e}"))
}
