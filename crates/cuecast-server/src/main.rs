//! # cuecast
//!
//! Pairs one controller with any number of receivers in a code-addressed
//! room and relays the play signal between them.
//!
//! ## Usage
//!
//! ```bash
//! # Run with default settings
//! cuecast
//!
//! # Run with a specific config file
//! CUECAST_CONFIG=/path/to/cuecast.toml cuecast
//!
//! # Override single settings
//! CUECAST_PORT=8080 CUECAST_HOST=0.0.0.0 cuecast
//! ```

use anyhow::Result;
use cuecast_server::{config::Config, metrics, run_server};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "cuecast=debug,cuecast_server=debug,cuecast_core=debug,tower_http=debug".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load()?;

    tracing::info!("Starting cuecast server on {}:{}", config.host, config.port);

    metrics::init_metrics();

    run_server(config).await?;

    Ok(())
}
