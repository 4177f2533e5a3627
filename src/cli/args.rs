//! CLI argument parsing using clap.
//!
//! Defines the command-line interface for repcoach-server.

use clap::Parser;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;

use crate::settings::RepcoachSettings;

/// repcoach - session-based workout plan generation over HTTP/SSE
#[derive(Parser, Debug, Clone)]
#[command(name = "repcoach-server")]
#[command(version, about, long_about = None)]
pub struct Args {
    /// Bind address (overrides settings)
    #[arg(long, env = "REPCOACH_HOST")]
    pub host: Option<IpAddr>,

    /// Listen port, 0 for a random free port (overrides settings)
    #[arg(short = 'p', long, env = "REPCOACH_PORT")]
    pub port: Option<u16>,

    /// Settings file (default: ~/.repcoach/settings.toml)
    #[arg(short = 'c', long)]
    pub config: Option<PathBuf>,

    /// Write a settings template if none exists, then continue
    #[arg(long)]
    pub init_config: bool,

    /// Show verbose output (debug information)
    #[arg(short = 'v', long)]
    pub verbose: bool,
}

impl Args {
    /// Listen address: CLI values take precedence over settings.
    pub fn listen_addr(&self, settings: &RepcoachSettings) -> anyhow::Result<SocketAddr> {
        let host = match self.host {
            Some(host) => host,
            None => settings.server.host.parse().map_err(|e| {
                anyhow::anyhow!("Invalid server.host '{}': {}", settings.server.host, e)
            })?,
        };
        let port = self.port.unwrap_or(settings.server.port);
        Ok(SocketAddr::new(host, port))
    }
}
