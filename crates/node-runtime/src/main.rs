//! # Peer-Net Node Runtime
//!
//! Runs one protocol node over TCP.
//!
//! ## Startup Sequence
//!
//! 1. Resolve the config path (first argument, `PEER_NET_CONFIG`, or
//!    `peer-net.toml`)
//! 2. Load and validate the TOML config
//! 3. Install logging (`RUST_LOG` overrides the configured level)
//! 4. Start the node and dial the bootstrap peers
//! 5. Run until Ctrl+C, then send DISCONNECT to every peer

use anyhow::{Context, Result};
use tracing::info;

use node_runtime::{init_logging, resolve_config_path, NodeRuntime, CONFIG_ENV};
use peer_protocol::TomlConfigProvider;

#[tokio::main]
async fn main() -> Result<()> {
    let path = resolve_config_path(std::env::args().nth(1), std::env::var(CONFIG_ENV).ok());
    let settings = TomlConfigProvider::load(&path)
        .with_context(|| format!("failed to load config from {}", path.display()))?;

    init_logging(settings.logging())?;
    info!(config = %path.display(), "configuration loaded");

    let runtime = NodeRuntime::start(&settings).await?;

    info!("Node is running. Press Ctrl+C to stop.");
    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for Ctrl+C")?;

    info!("shutting down");
    runtime.shutdown().await
}
