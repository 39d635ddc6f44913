//! geobot - Main entry point.

use anyhow::Result;
use geobot::config::Config;
use geobot::logging::init_logging;
use geobot::start_server;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration (TOML file + environment overrides)
    let config = Config::load()?;

    // Initialize logging
    init_logging(
        &config.observability.log_level,
        &config.observability.log_format,
    );

    tracing::info!("geobot v{}", env!("CARGO_PKG_VERSION"));

    // Start the webhook server
    start_server(&config).await
}
