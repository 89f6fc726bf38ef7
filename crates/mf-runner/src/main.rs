//! # mf-runner
//!
//! Console front-end for the market data feed client.
//!
//! Loads a JSON configuration file, connects to the configured price server
//! and logs every bulk snapshot and per-instrument update it receives.
//!
//! # Usage
//!
//! ```bash
//! mf-runner config.json --log-level info --symbol XAUUSD --symbol EURUSD
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use mf_core::ConnectionState;
use mf_core::ws::WsTransport;
use mf_feed::FeedClient;
use tracing::{info, warn};

/// Market Data Feed Runner.
#[derive(Parser)]
#[command(name = "mf-runner", about = "Market Data Feed Runner")]
struct Cli {
    /// Configuration file path (JSON).
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error). Overrides the config file.
    #[arg(short, long)]
    log_level: Option<String>,

    /// Optional log directory for file output. Overrides the config file.
    #[arg(long)]
    log_dir: Option<String>,

    /// Emit console logs as JSON lines.
    #[arg(long)]
    json_logs: bool,

    /// Extra instrument to follow, on top of the config file's list. Repeatable.
    #[arg(long = "symbol")]
    symbols: Vec<String>,

    /// Restart the feed this many seconds after it gives up reconnecting.
    /// Zero disables the restart.
    #[arg(long, default_value_t = 60)]
    retry_after_secs: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // 1. Load configuration
    let config = mf_core::config::load_config(&cli.config)?;

    // 2. Initialize logging
    let level = cli.log_level.as_deref().or(config.logging.level.as_deref()).unwrap_or("info");
    let log_dir = cli.log_dir.as_deref().or(config.logging.log_path.as_deref());
    mf_core::logging::init_logging(level, log_dir, config.logging.module_name(), cli.json_logs)?;

    info!("mf-runner starting, config={}, log_level={level}", cli.config.display());

    // 3. Build the client
    let mut symbols = config.feed.instruments.clone();
    for s in cli.symbols {
        if !symbols.contains(&s) {
            symbols.push(s);
        }
    }
    let transport = Arc::new(WsTransport::from_config(&config.feed));
    let client = FeedClient::new(config.feed, transport);

    client.subscribe(|batch| {
        info!("snapshot: {} instrument(s)", batch.len());
        for inst in batch {
            info!("  {:<8} {:>12} {:>8} {}", inst.symbol, inst.price, inst.change, inst.subtitle);
        }
        Ok(())
    });
    for symbol in &symbols {
        client.subscribe_to_instrument(symbol, |inst| {
            info!("update: {} {} ({})", inst.symbol, inst.price, inst.change);
            Ok(())
        });
    }
    info!("following {} instrument(s): {symbols:?}", symbols.len());

    // 4. Connect and watch
    client.start();
    let watchdog = (cli.retry_after_secs > 0).then(|| {
        let client = client.clone();
        let period = Duration::from_secs(cli.retry_after_secs);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if client.state() == ConnectionState::Disconnected && !client.is_reconnecting() {
                    warn!("feed disconnected, restarting");
                    client.start();
                }
            }
        })
    });

    info!("press Ctrl+C to stop");

    // 5. Wait for shutdown signal
    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received");

    if let Some(w) = watchdog {
        w.abort();
    }
    client.stop();
    client.remove_all_listeners();

    info!("feed stopped, goodbye");
    Ok(())
}
