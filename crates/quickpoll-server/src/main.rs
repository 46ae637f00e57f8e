//! # QuickPoll Server
//!
//! Real-time polling service.
//!
//! ## Usage
//!
//! ```bash
//! # Run with default settings (in-memory storage)
//! quickpoll
//!
//! # Run with a specific config file
//! QUICKPOLL_CONFIG=/path/to/quickpoll.toml quickpoll
//!
//! # Run with environment variables
//! QUICKPOLL_PORT=8080 QUICKPOLL_HOST=0.0.0.0 quickpoll
//! ```

use anyhow::Result;
use quickpoll_server::{config::Config, metrics, run_server};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "quickpoll=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load()?;

    tracing::info!(
        "Starting QuickPoll server on {}:{} ({:?} storage)",
        config.host,
        config.port,
        config.storage.backend
    );

    metrics::init_metrics();

    run_server(config).await?;

    Ok(())
}
