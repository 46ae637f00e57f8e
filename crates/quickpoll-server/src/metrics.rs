//! Metrics collection and export for QuickPoll.
//!
//! Uses the `metrics` crate for instrumentation and exports
//! to Prometheus format.

use anyhow::{Context, Result};
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use tracing::info;

/// Metric names.
pub mod names {
    pub const POLLS_CREATED_TOTAL: &str = "quickpoll_polls_created_total";
    pub const VOTES_TOTAL: &str = "quickpoll_votes_total";
    pub const VOTES_REJECTED_TOTAL: &str = "quickpoll_votes_rejected_total";
    pub const VOTE_LATENCY_SECONDS: &str = "quickpoll_vote_latency_seconds";
    pub const CONNECTIONS_TOTAL: &str = "quickpoll_connections_total";
    pub const CONNECTIONS_ACTIVE: &str = "quickpoll_connections_active";
    pub const SUBSCRIPTIONS_TOTAL: &str = "quickpoll_subscriptions_total";
    pub const POLLS_WATCHED: &str = "quickpoll_polls_watched";
    pub const UPDATES_DELIVERED_TOTAL: &str = "quickpoll_updates_delivered_total";
    pub const MESSAGES_TOTAL: &str = "quickpoll_messages_total";
    pub const ERRORS_TOTAL: &str = "quickpoll_errors_total";
}

/// Initialize the metrics system.
pub fn init_metrics() {
    metrics::describe_counter!(names::POLLS_CREATED_TOTAL, "Total number of polls created");
    metrics::describe_counter!(names::VOTES_TOTAL, "Total number of accepted votes");
    metrics::describe_counter!(
        names::VOTES_REJECTED_TOTAL,
        "Total number of rejected votes, by reason"
    );
    metrics::describe_histogram!(
        names::VOTE_LATENCY_SECONDS,
        "Time to validate, store and broadcast a vote in seconds"
    );
    metrics::describe_counter!(
        names::CONNECTIONS_TOTAL,
        "Total number of WebSocket connections since server start"
    );
    metrics::describe_gauge!(
        names::CONNECTIONS_ACTIVE,
        "Current number of active WebSocket connections"
    );
    metrics::describe_counter!(names::SUBSCRIPTIONS_TOTAL, "Total number of poll joins");
    metrics::describe_gauge!(
        names::POLLS_WATCHED,
        "Current number of polls with at least one subscriber"
    );
    metrics::describe_counter!(
        names::UPDATES_DELIVERED_TOTAL,
        "Total number of poll updates written to sockets"
    );
    metrics::describe_counter!(names::MESSAGES_TOTAL, "Total number of WebSocket messages");
    metrics::describe_counter!(names::ERRORS_TOTAL, "Total number of errors");

    info!("Metrics initialized");
}

/// Start the Prometheus metrics server.
///
/// # Errors
///
/// Returns an error if the exporter cannot be installed.
pub fn start_metrics_server(port: u16) -> Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .context("Failed to install Prometheus exporter")?;

    info!("Metrics server listening on {}", addr);
    Ok(())
}

/// Record a created poll.
pub fn record_poll_created() {
    counter!(names::POLLS_CREATED_TOTAL).increment(1);
}

/// Record an accepted vote and how long it took.
pub fn record_vote(seconds: f64) {
    counter!(names::VOTES_TOTAL).increment(1);
    histogram!(names::VOTE_LATENCY_SECONDS).record(seconds);
}

/// Record a rejected vote.
pub fn record_vote_rejected(reason: &'static str) {
    counter!(names::VOTES_REJECTED_TOTAL, "reason" => reason).increment(1);
}

/// Record a new connection.
pub fn record_connection() {
    counter!(names::CONNECTIONS_TOTAL).increment(1);
    gauge!(names::CONNECTIONS_ACTIVE).increment(1.0);
}

/// Record a disconnection.
pub fn record_disconnection() {
    gauge!(names::CONNECTIONS_ACTIVE).decrement(1.0);
}

/// Record a poll join.
pub fn record_subscription() {
    counter!(names::SUBSCRIPTIONS_TOTAL).increment(1);
}

/// Update the number of polls being watched.
pub fn set_polls_watched(count: usize) {
    gauge!(names::POLLS_WATCHED).set(count as f64);
}

/// Record a poll update written to a socket.
pub fn record_update_delivered() {
    counter!(names::UPDATES_DELIVERED_TOTAL).increment(1);
}

/// Record a WebSocket message.
pub fn record_message(direction: &'static str) {
    counter!(names::MESSAGES_TOTAL, "direction" => direction).increment(1);
}

/// Record an error.
pub fn record_error(error_type: &'static str) {
    counter!(names::ERRORS_TOTAL, "type" => error_type).increment(1);
}

/// Metrics guard that records disconnection on drop.
pub struct ConnectionMetricsGuard;

impl ConnectionMetricsGuard {
    /// Create a new metrics guard, recording a connection.
    #[must_use]
    pub fn new() -> Self {
        record_connection();
        Self
    }
}

impl Default for ConnectionMetricsGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ConnectionMetricsGuard {
    fn drop(&mut self) {
        record_disconnection();
    }
}
