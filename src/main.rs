//! mdbeta - a beta-protocol voxel world server
//!
//! Server executable: loads configuration, opens the flat in-memory world and
//! serves clients until Ctrl-C.

mod config;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use config::{ServerConfig, DEFAULT_CONFIG_PATH};
use mdbeta_server::{Server, SessionContext};
use mdbeta_world::MemoryWorld;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(author, version, about = "Beta-protocol voxel world server", long_about = None)]
struct Args {
    /// Path to the TOML server configuration
    #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,
    /// Override the listen address
    #[arg(long)]
    bind: Option<SocketAddr>,
    /// Override the per-client view radius, in chunks
    #[arg(long)]
    view_radius: Option<i32>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let mut cfg = ServerConfig::load_from_path(&args.config);
    if let Some(bind) = args.bind {
        cfg.bind = bind;
    }
    if let Some(radius) = args.view_radius {
        cfg.view_radius = radius;
    }

    info!("Starting mdbeta v{}", env!("CARGO_PKG_VERSION"));

    // Sessions never run concurrently with each other: one scheduler thread.
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to build tokio runtime")?;
    runtime.block_on(serve(cfg))
}

async fn serve(cfg: ServerConfig) -> Result<()> {
    let world = Arc::new(MemoryWorld::new(cfg.spawn_pos()));
    let ctx = SessionContext::new(world, cfg.to_settings())
        .with_catalog(Arc::new(cfg.block_catalog()));
    let server = Arc::new(Server::new(ctx, cfg.ticks_per_second));

    let signal_server = Arc::clone(&server);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Ctrl-C received, shutting down");
                signal_server.shutdown();
            }
            Err(err) => warn!("Failed to listen for Ctrl-C: {}", err),
        }
    });

    server.run(cfg.bind).await?;
    info!("Server stopped");
    Ok(())
}
