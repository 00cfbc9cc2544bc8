//! Encore Server - standalone headless server for Encore.
//!
//! Hosts the per-destination playback queues, the relay mounts listeners
//! connect to, and the HTTP/WebSocket API that accepts commands.

mod config;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use encore_core::{bind_listener, bootstrap_services, serve, AppState};
use tokio::signal;

use crate::config::ServerConfig;

/// Encore Server - per-destination playback queues with presence-aware pausing.
#[derive(Parser, Debug)]
#[command(name = "encore-server")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file (YAML).
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace).
    #[arg(short, long, default_value = "info", env = "ENCORE_LOG_LEVEL")]
    log_level: log::LevelFilter,

    /// Bind port (overrides config file).
    #[arg(short = 'p', long)]
    port: Option<u16>,

    /// Path to the yt-dlp executable (overrides config file).
    #[arg(long, value_name = "PATH")]
    ytdlp_path: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    env_logger::Builder::new()
        .filter_level(args.log_level)
        .format_timestamp_millis()
        .init();

    log::info!("Encore Server v{}", env!("CARGO_PKG_VERSION"));

    let mut config =
        ServerConfig::load(args.config.as_deref()).context("Failed to load configuration")?;

    // Apply CLI overrides
    if let Some(port) = args.port {
        config.bind_port = port;
    }
    if let Some(path) = args.ytdlp_path {
        config.ytdlp_path = path;
    }

    log::info!(
        "Configuration: bind_port={}, prefix='{}', destinations={:?}, yt-dlp={}",
        config.bind_port,
        config.command_prefix,
        config.destinations,
        config.ytdlp_path
    );

    let core_config = config.to_core_config();
    let services = bootstrap_services(&core_config).context("Failed to bootstrap services")?;

    log::info!("Services bootstrapped successfully");

    // Bind before spawning so a port conflict fails startup.
    let (port, listener) = bind_listener(core_config.preferred_port)
        .await
        .context("Failed to bind HTTP listener")?;

    let app_state = AppState::new(&services, Arc::new(core_config));
    let server_handle = tokio::spawn(async move {
        if let Err(e) = serve(app_state, port, listener).await {
            log::error!("Server error: {}", e);
        }
    });

    log::info!("HTTP server started on port {}", port);

    shutdown_signal().await;

    log::info!("Shutdown signal received, cleaning up...");

    services.shutdown().await;
    server_handle.abort();

    log::info!("Shutdown complete");
    Ok(())
}

/// Waits for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            log::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                log::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
