//! api-relay: SSRF-hardened authenticated outbound HTTP relay.
//!
//! # Architecture Overview
//!
//! ```text
//!   Browser page (same origin)
//!       │  POST /api/relay  {url, method, body, auth, ...}
//!       ▼
//!   ┌───────────────────────────────────────────────────────┐
//!   │ http        request id → trace → rate limit → admission│
//!   │ relay       validate → allowlist → resolve + classify  │
//!   │             → fetch → redirect? re-check hop → fetch   │
//!   │             → capped body read → sanitize              │
//!   │ config      TOML + RELAY_* env, hot reload via ArcSwap │
//!   │ lifecycle   signals → Shutdown broadcast               │
//!   └───────────────────────────────────────────────────────┘
//!       │
//!       ▼
//!   Public upstream APIs only
//! ```

use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use api_relay::config::{self, watcher::ConfigWatcher};
use api_relay::lifecycle::{signals, Shutdown};
use api_relay::observability::{logging, metrics};
use api_relay::HttpServer;

#[derive(Parser)]
#[command(name = "api-relay")]
#[command(about = "SSRF-hardened authenticated outbound HTTP relay", long_about = None)]
struct Cli {
    /// Path to a TOML configuration file. Watched for changes when given.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = config::load(cli.config.as_deref())?;

    logging::init_logging(&config.observability);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "api-relay starting");
    tracing::info!(
        bind_address = %config.listener.bind_address,
        base_origin = %config.admission.base_origin,
        max_redirects = config.relay.max_redirects,
        allowed_domains = config.relay.allowed_domains.len(),
        rate_limit = config.rate_limit.enabled,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    // The watcher handle must outlive the server.
    let (_watcher, config_updates) = match &cli.config {
        Some(path) => {
            let (watcher, updates) = ConfigWatcher::new(path);
            match watcher.run() {
                Ok(handle) => (Some(handle), updates),
                Err(e) => {
                    tracing::warn!(error = %e, "Config hot reload disabled");
                    (None, updates)
                }
            }
        }
        None => (None, mpsc::unbounded_channel().1),
    };

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let shutdown = Shutdown::new();
    let server = HttpServer::new(config)?;
    let server_task = tokio::spawn(server.run(listener, config_updates, shutdown.subscribe()));

    signals::wait_for_signal().await;
    shutdown.trigger();

    server_task.await??;
    tracing::info!("Shutdown complete");
    Ok(())
}
