//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Define gateway metrics (connections, requests, backend latency, framing)
//! - Expose a Prometheus-compatible scrape endpoint when configured
//!
//! # Metrics
//! - `gateway_connections_total` (counter): accepted connections by endpoint
//! - `gateway_active_connections` (gauge): open connections by endpoint
//! - `gateway_requests_total` (counter): completed requests by endpoint, outcome
//! - `gateway_backend_duration_seconds` (histogram): backend call latency
//! - `gateway_framing_errors_total` (counter): broken requests by endpoint
//!
//! # Design Decisions
//! - Without an installed recorder every update is a no-op, so tests and
//!   deployments without `metrics-address` pay nothing
//! - Labels are endpoint names and outcome labels; never keys or ids

use std::net::SocketAddr;
use std::time::Duration;

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Install the Prometheus recorder and its HTTP listener.
///
/// Must be called from within a Tokio runtime.
pub fn init_metrics(address: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(address).install()?;
    tracing::info!(address = %address, "Metrics endpoint listening");
    Ok(())
}

pub fn connection_opened(endpoint: &str) {
    metrics::counter!("gateway_connections_total", "endpoint" => endpoint.to_string()).increment(1);
    metrics::gauge!("gateway_active_connections", "endpoint" => endpoint.to_string()).increment(1.0);
}

pub fn connection_closed(endpoint: &str) {
    metrics::gauge!("gateway_active_connections", "endpoint" => endpoint.to_string()).decrement(1.0);
}

pub fn request_completed(endpoint: &str, outcome: &'static str) {
    metrics::counter!(
        "gateway_requests_total",
        "endpoint" => endpoint.to_string(),
        "outcome" => outcome
    )
    .increment(1);
}

pub fn backend_call_finished(endpoint: &str, elapsed: Duration) {
    metrics::histogram!("gateway_backend_duration_seconds", "endpoint" => endpoint.to_string())
        .record(elapsed.as_secs_f64());
}

pub fn framing_error(endpoint: &str) {
    metrics::counter!("gateway_framing_errors_total", "endpoint" => endpoint.to_string()).increment(1);
}
