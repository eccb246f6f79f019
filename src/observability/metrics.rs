//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Define proxy metrics (connections, failures, relayed bytes)
//! - Expose Prometheus-compatible metrics endpoint
//!
//! # Metrics
//! - `traproxy_connections_total` (counter): accepted client connections
//! - `traproxy_active_connections` (gauge): connections currently relayed
//! - `traproxy_resolve_failures_total` (counter): by reason
//! - `traproxy_upstream_connect_failures_total` (counter)
//! - `traproxy_handshake_failures_total` (counter): failed CONNECT negotiations
//! - `traproxy_relayed_bytes_total` (counter): by direction
//! - `traproxy_requests_total` (counter): framed HTTP requests by method
//!   (standard methods, everything else as `other`)
//! - `traproxy_task_panics_total` (counter): by task label
//!
//! # Design Decisions
//! - Recording is a no-op until a recorder is installed, so tests and
//!   metrics-disabled deployments pay nothing

use std::net::SocketAddr;

use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus recorder and its HTTP listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_connection_accepted() {
    metrics::counter!("traproxy_connections_total").increment(1);
}

pub fn connection_opened() {
    metrics::gauge!("traproxy_active_connections").increment(1.0);
}

pub fn connection_closed() {
    metrics::gauge!("traproxy_active_connections").decrement(1.0);
}

pub fn record_resolve_failure(reason: &'static str) {
    metrics::counter!("traproxy_resolve_failures_total", "reason" => reason).increment(1);
}

pub fn record_upstream_connect_failure() {
    metrics::counter!("traproxy_upstream_connect_failures_total").increment(1);
}

pub fn record_handshake_failure() {
    metrics::counter!("traproxy_handshake_failures_total").increment(1);
}

pub fn record_relayed_bytes(direction: &'static str, bytes: u64) {
    metrics::counter!("traproxy_relayed_bytes_total", "direction" => direction).increment(bytes);
}

/// `method` is client-supplied; it is bucketed into a fixed label set.
pub fn record_request(method: &[u8]) {
    metrics::counter!("traproxy_requests_total", "method" => method_label(method)).increment(1);
}

/// Label for a request method: a standard method name, or `other`.
pub fn method_label(method: &[u8]) -> &'static str {
    const KNOWN: [&str; 9] = ["GET", "POST", "PUT", "DELETE", "HEAD", "OPTIONS", "PATCH", "CONNECT", "TRACE"];
    KNOWN
        .into_iter()
        .find(|known| known.as_bytes() == method)
        .unwrap_or("other")
}

pub fn record_task_panic(task: &'static str) {
    metrics::counter!("traproxy_task_panics_total", "task" => task).increment(1);
}
