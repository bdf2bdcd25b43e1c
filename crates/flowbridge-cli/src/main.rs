//! flowbridge - SSE streaming bridge server
//!
//! Mounts the chat and model-pull bridges over HTTP.

mod config;
mod server;

use anyhow::{Context, Result};
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use flowbridge_core::StreamBridge;

#[derive(Parser, Debug)]
#[command(name = "flowbridge", version, about = "SSE streaming bridge for agent chat and model pulls")]
struct Cli {
    /// Path to a TOML config file (defaults to <config dir>/flowbridge/config.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Address to listen on
    #[arg(short, long, default_value = "127.0.0.1:3000")]
    listen: SocketAddr,

    /// Log filter, e.g. "info" or "flowbridge_core=debug" (overrides RUST_LOG)
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_level.as_deref());

    let config = config::load(cli.config.as_deref())?;
    info!(
        "Heartbeat every {:?}, agent server at {}",
        config.heartbeat_interval(),
        config.chat.base_url
    );

    let bridge = StreamBridge::from_config(config).context("Failed to build upstream client")?;
    let app = server::router(Arc::new(bridge));

    let listener = tokio::net::TcpListener::bind(cli.listen)
        .await
        .with_context(|| format!("Failed to bind {}", cli.listen))?;
    info!("flowbridge listening on {}", cli.listen);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("flowbridge stopped");
    Ok(())
}

fn init_tracing(level: Option<&str>) {
    let filter = level
        .and_then(|l| EnvFilter::try_new(l).ok())
        .or_else(|| EnvFilter::try_from_default_env().ok())
        .unwrap_or_else(|| EnvFilter::new("info"));

    tracing_subscriber::fmt().with_env_filter(filter).init();
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
