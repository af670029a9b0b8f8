//! verdict-daemon - policy decision server.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tokio::sync::watch;
use tracing::info;
use tracing_subscriber::EnvFilter;
use verdict_daemon::{DaemonConfig, Server, SharedStorage};

/// Policy decision daemon.
#[derive(Parser, Debug)]
#[command(name = "verdict-daemon")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to the daemon configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Listen address, overriding the configuration file
    #[arg(long)]
    listen: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_new(&cli.log_level).unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let mut config = match &cli.config {
        Some(path) => DaemonConfig::load(path)?,
        None => DaemonConfig::default(),
    };
    if let Some(listen) = cli.listen {
        config.listen = listen;
    }

    // The daemon starts with no policies; the control plane installs the
    // first snapshot through SharedStorage::apply_update.
    let state = Arc::new(SharedStorage::empty());
    info!("starting with empty policy storage");

    let server = Server::bind(config, Arc::clone(&state)).await?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("received interrupt");
            let _ = shutdown_tx.send(true);
        }
    });

    server.run(shutdown_rx).await
}
