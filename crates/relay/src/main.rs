// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! fl-relay: reference WebSocket relay for floorlink dashboards.
//!
//! Answers heartbeats, keeps the canonical table of pushed offline items
//! and fans application traffic out to every other connected dashboard.

mod log;
mod server;
mod state;

use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// fl-relay: factory-floor dashboard relay server
#[derive(Parser, Debug)]
#[command(name = "fl-relay")]
#[command(about = "WebSocket relay server for floorlink dashboards")]
struct Args {
    /// Address to bind the server to
    #[arg(short, long, default_value = "0.0.0.0:7890")]
    bind: SocketAddr,

    /// Directory for the item log
    #[arg(short, long, default_value = ".")]
    data: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let args = Args::parse();

    // RUST_LOG wins over --verbose
    let default_level = if args.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("Starting fl-relay server");
    info!("  Bind address: {}", args.bind);
    info!("  Data directory: {}", args.data.display());

    let state = state::ServerState::new(&args.data)?;
    server::run(args.bind, state).await
}
