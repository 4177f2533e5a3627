//! repcoach-server - HTTP/SSE front end for the coaching workflow
//!
//! # Usage
//!
//! ```bash
//! # Write ~/.repcoach/settings.toml on first run and start on the default port
//! repcoach-server --init-config
//!
//! # Random port, verbose logging, explicit settings file
//! repcoach-server --port 0 -v -c ./settings.toml
//! ```
//!
//! # Features
//!
//! This binary requires the `cli` feature flag (enabled by default).

use std::sync::Arc;

use anyhow::Result;
use clap::Parser;

use repcoach::cli::{initialize, Args};
use repcoach::journal::MemoryJournal;
use repcoach::server::{build_workflow, start_server};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let settings = initialize(&args).await?;

    let addr = args.listen_addr(&settings)?;
    let workflow = build_workflow(&settings, Arc::new(MemoryJournal::new()))?;
    let (bound, shutdown) = start_server(addr, workflow).await?;
    tracing::info!("repcoach ready on http://{}", bound);

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutting down");
    shutdown.cancel();

    Ok(())
}
