//! Trapper - Main Entry Point

use anyhow::Context;
use std::path::PathBuf;
use tracing::info;
use trapper::{init_logging, run, AppConfig};

/// Configuration file read when no path is given
const DEFAULT_CONFIG: &str = "trapper.toml";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG));

    let config = AppConfig::load(&path)
        .with_context(|| format!("unable to read configuration {}", path.display()))?;

    init_logging(config.log_format, &config.log_level)?;

    info!("=== Trapper v{} ===", env!("CARGO_PKG_VERSION"));
    info!("Configuration loaded from {}", path.display());

    run(config).await
}
