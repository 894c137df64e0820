//! Forward HTTP/HTTPS proxy.
//!
//! # Architecture Overview
//!
//! ```text
//!                     ┌──────────────────────────────────────────────────────┐
//!                     │                    FORWARD PROXY                     │
//!                     │                                                      │
//!   Client Request    │  ┌─────────┐    ┌─────────┐    ┌────────────────┐   │
//!   ──────────────────┼─▶│   net   │───▶│  http   │───▶│    security    │   │
//!                     │  │listener │    │ server  │    │ access/targets │   │
//!                     │  └─────────┘    └────┬────┘    └───────┬────────┘   │
//!                     │                      │                 │            │
//!                     │           CONNECT    │                 ▼            │
//!                     │                      ▼          ┌─────────────┐     │
//!                     │               ┌────────────┐    │   forward   │◀─┐  │
//!   ◀─────────────────┼───────────────│   tunnel   │    │  + cache    │  │  │
//!   Client Response   │               │   relay    │    └──────┬──────┘  │  │
//!                     │               └─────┬──────┘           │         │  │
//!                     └─────────────────────┼──────────────────┼─────────┼──┘
//!                                           ▼                  ▼         │
//!                                      Origin (TLS)       Origin (HTTP) ─┘
//! ```

use std::path::{Path, PathBuf};

use clap::Parser;

use forward_proxy::config::loader::load_or_default;
use forward_proxy::lifecycle::{signals, startup, Shutdown};
use forward_proxy::net::listener::Listener;
use forward_proxy::observability::{logging, metrics};
use forward_proxy::ProxyServer;

/// Config file picked up from the working directory when `--config` is absent.
const DEFAULT_CONFIG_FILE: &str = "config.toml";

#[derive(Parser)]
#[command(name = "forward-proxy", version)]
#[command(about = "Forward HTTP/HTTPS proxy with access control and response caching", long_about = None)]
struct Cli {
    /// Path to a TOML config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override server.host
    #[arg(long)]
    host: Option<String>,

    /// Override server.port
    #[arg(short, long)]
    port: Option<u16>,

    /// Override server.timeout (seconds)
    #[arg(short, long)]
    timeout: Option<u64>,

    /// Log at debug level
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config_path = cli.config.clone().or_else(|| {
        let default = Path::new(DEFAULT_CONFIG_FILE);
        default.exists().then(|| default.to_path_buf())
    });
    let (mut config, load_error) = load_or_default(config_path.as_deref());

    if let Some(host) = cli.host {
        config.server.host = host;
    }
    if let Some(port) = cli.port {
        config.server.port = port;
    }
    if let Some(timeout) = cli.timeout {
        config.server.timeout = timeout.max(1);
    }

    let log_file_error = logging::init_logging(&config.logging, cli.verbose)?;
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "forward-proxy starting");
    if let Some(e) = log_file_error {
        tracing::warn!(error = %e, "Log file unavailable, logging to stdout only");
    }

    match (&config_path, load_error) {
        (Some(path), Some(e)) => {
            tracing::warn!(path = %path.display(), error = %e, "Failed to load config, using defaults")
        }
        (Some(path), None) => tracing::info!(path = %path.display(), "Configuration loaded"),
        (None, _) => tracing::info!("No config file, using defaults"),
    }

    if config.metrics.enabled {
        match config.metrics.address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.metrics.address,
                "Failed to parse metrics address"
            ),
        }
    }

    let listener = Listener::bind(&config.server).await?;
    startup::announce(&config, listener.local_addr()?);

    let server = ProxyServer::new(config)?;

    let shutdown = Shutdown::new();
    let shutdown_rx = shutdown.subscribe();
    tokio::spawn(async move {
        signals::wait_for_signal().await;
        shutdown.trigger();
    });

    server.run(listener, shutdown_rx).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
