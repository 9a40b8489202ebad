// This software is provided for non-commercial use only.
// Commercial use is strictly prohibited.
// If you use, modify, or redistribute this software, you must provide proper attribution to the original author.
// (c) 2026 Onur Tuna. All rights reserved.

//! NVR — multi-camera streaming and recording engine.
//!
//! Usage:
//!   nvr --config ./IT_RNVR.db [--debug]

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use nvr::config::ConfigStore;
use nvr::engine::Engine;
use nvr::media::adapter::Gst1Adapter;

#[derive(Parser)]
#[command(name = "nvr", about = "Multi-camera streaming and recording engine", version)]
struct Cli {
    /// Path to the SQLite configuration store.
    #[arg(short, long, default_value = "./IT_RNVR.db")]
    config: PathBuf,

    /// Enable verbose (debug-level) logging, overriding RUST_LOG.
    #[arg(long)]
    debug: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let default_filter = if cli.debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)))
        .init();

    let store = match ConfigStore::open(&cli.config) {
        Ok(s) => Arc::new(s),
        Err(e) => {
            error!(error = %e, config = %cli.config.display(), "failed to open configuration store");
            std::process::exit(1);
        }
    };

    let engine = match Engine::new(store, Arc::new(Gst1Adapter::new())) {
        Ok(e) => e,
        Err(e) => {
            error!(error = %e, "failed to initialize engine");
            std::process::exit(1);
        }
    };

    if let Err(e) = engine.start_enabled_on_boot() {
        error!(error = %e, "failed to start cameras on boot");
        std::process::exit(1);
    }

    info!("nvr running, press Ctrl+C to stop");
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("received Ctrl+C, shutting down"),
        Err(e) => error!(error = %e, "signal handler error"),
    }

    engine.shutdown();
}
