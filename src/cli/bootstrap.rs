//! Process setup shared by the server binary: environment, logging, settings.

use anyhow::{Context, Result};

use super::args::Args;
use crate::settings::{settings_path, RepcoachSettings, SettingsManager};

/// Load `.env`, install the log subscriber and read settings.
pub async fn initialize(args: &Args) -> Result<RepcoachSettings> {
    // Load .env file if present
    if let Err(e) = dotenvy::dotenv() {
        // Only warn on errors other than file not found
        if !matches!(e, dotenvy::Error::Io(_)) {
            tracing::warn!("Failed to load .env file: {}", e);
        }
    }

    init_logging(args.verbose);

    let path = args.config.clone().unwrap_or_else(settings_path);
    let manager = SettingsManager::with_path(&path)
        .await
        .with_context(|| format!("Failed to load settings from {}", path.display()))?;

    if args.init_config {
        match manager.ensure_settings_file().await {
            Ok(true) => {
                manager.reload().await?;
            }
            Ok(false) => tracing::debug!("Settings file already exists at {:?}", manager.path()),
            Err(e) => tracing::warn!("Failed to create settings template: {}", e),
        }
    }

    Ok(manager.get().await)
}

fn init_logging(verbose: bool) {
    let log_level = if verbose { "debug" } else { "info" };
    let filter = tracing_subscriber::EnvFilter::from_default_env();
    let filter = match format!("repcoach={}", log_level).parse() {
        Ok(directive) => filter.add_directive(directive),
        Err(_) => filter,
    };
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
