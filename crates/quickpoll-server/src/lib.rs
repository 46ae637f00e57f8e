//! # quickpoll-server
//!
//! HTTP and WebSocket front end for the QuickPoll core.
//!
//! - `POST /api/polls`, `GET /api/polls`, `GET /api/polls/:id`
//! - `POST /api/polls/:id/vote`
//! - `GET /health`
//! - WebSocket endpoint (default `/ws`) for live poll updates

pub mod api;
pub mod config;
pub mod error;
pub mod metrics;
pub mod state;
pub mod ws;

use anyhow::{Context, Result};
use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info};

pub use config::Config;
pub use state::AppState;

/// Build the application router.
pub fn router(state: Arc<AppState>) -> Router {
    let websocket_path = state.config.transport.websocket_path.clone();

    Router::new()
        .route("/api/polls", post(api::create_poll).get(api::list_polls))
        .route("/api/polls/:id", get(api::get_poll))
        .route("/api/polls/:id/vote", post(api::cast_vote))
        .route("/health", get(api::health))
        .route(&websocket_path, get(ws::ws_handler))
        .with_state(state)
}

/// Run the HTTP/WebSocket server.
///
/// # Errors
///
/// Returns an error if storage cannot be opened or the server fails to start.
pub async fn run_server(config: Config) -> Result<()> {
    // Start metrics server if enabled
    if config.metrics.enabled {
        if let Err(e) = metrics::start_metrics_server(config.metrics.port) {
            error!("Failed to start metrics server: {:#}", e);
        }
    }

    let addr = config.bind_addr()?;
    let state = Arc::new(AppState::from_config(config).await?);

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    serve(listener, state).await
}

/// Serve the application on an already bound listener.
///
/// # Errors
///
/// Returns an error if the server stops with an I/O failure.
pub async fn serve(listener: TcpListener, state: Arc<AppState>) -> Result<()> {
    let addr = listener.local_addr()?;

    info!("QuickPoll server listening on {}", addr);
    info!(
        "WebSocket endpoint: ws://{}{}",
        addr, state.config.transport.websocket_path
    );

    axum::serve(listener, router(state)).await?;

    Ok(())
}
