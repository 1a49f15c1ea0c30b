//! # roomcast
//!
//! Room-scoped WebSocket chat server binary: loads settings, starts the
//! server and shuts it down gracefully on Ctrl-C.

#![deny(unsafe_code)]

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use roomcast_server::RoomcastServer;
use roomcast_settings::RoomcastSettings;

/// Room-scoped WebSocket chat server.
#[derive(Parser, Debug)]
#[command(name = "roomcast", about = "Room-scoped WebSocket chat server")]
struct Cli {
    /// Settings file (defaults to `~/.roomcast/settings.json`).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Host to bind (overrides settings).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind, 0 for auto-assign (overrides settings).
    #[arg(long)]
    port: Option<u16>,

    /// Log level filter, e.g. `info` or `roomcast_server=debug` (overrides settings).
    #[arg(long)]
    log_level: Option<String>,
}

impl Cli {
    /// Apply command-line overrides on top of loaded settings.
    fn apply(&self, settings: &mut RoomcastSettings) {
        if let Some(host) = &self.host {
            settings.server.host.clone_from(host);
        }
        if let Some(port) = self.port {
            settings.server.port = port;
        }
        if let Some(level) = &self.log_level {
            settings.logging.level.clone_from(level);
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();

    let path = args
        .config
        .clone()
        .unwrap_or_else(roomcast_settings::settings_path);
    let mut settings = roomcast_settings::load_settings_from_path(&path)
        .with_context(|| format!("Failed to load settings from {}", path.display()))?;
    args.apply(&mut settings);
    settings.validate().context("Invalid settings")?;

    roomcast_core::logging::init_subscriber(&settings.logging.level, settings.logging.json);

    let metrics_handle = roomcast_server::metrics::install_recorder()
        .context("Failed to install metrics recorder")?;

    let shutdown_timeout = settings.server.shutdown_timeout();
    let server = RoomcastServer::new(settings.server, metrics_handle);
    let (addr, handle) = server
        .listen()
        .await
        .with_context(|| format!("Failed to bind {}", server.config().bind_addr()))?;
    tracing::info!(%addr, "roomcast ready");

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;

    tracing::info!("Shutting down...");
    server
        .shutdown()
        .graceful_shutdown(vec![handle], shutdown_timeout)
        .await;
    Ok(())
}
