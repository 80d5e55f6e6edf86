//! Metrics collection and exposition.
//!
//! # Metrics
//! - `proxy_connections_accepted_total` (counter)
//! - `proxy_connections_rejected_total` (counter): over the handle bound
//! - `proxy_accept_errors_total` (counter): failed accepts, each followed by a pause
//! - `proxy_active_handles` (gauge): registry size
//! - `proxy_requests_total` (counter): by classification `kind`
//! - `proxy_upstream_connect_failures_total` (counter)
//! - `proxy_discovery_refreshes_total` (counter)
//! - `proxy_discovery_entries` (gauge)

use std::net::SocketAddr;

use metrics_exporter_prometheus::PrometheusBuilder;

/// Start the Prometheus scrape endpoint.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_accepted() {
    metrics::counter!("proxy_connections_accepted_total").increment(1);
}

pub fn record_rejected() {
    metrics::counter!("proxy_connections_rejected_total").increment(1);
}

pub fn record_accept_error() {
    metrics::counter!("proxy_accept_errors_total").increment(1);
}

pub fn record_active_handles(count: usize) {
    metrics::gauge!("proxy_active_handles").set(count as f64);
}

pub fn record_request(kind: &'static str) {
    metrics::counter!("proxy_requests_total", "kind" => kind).increment(1);
}

pub fn record_connect_failure() {
    metrics::counter!("proxy_upstream_connect_failures_total").increment(1);
}

pub fn record_discovery_refresh() {
    metrics::counter!("proxy_discovery_refreshes_total").increment(1);
}

pub fn record_discovery_entries(count: usize) {
    metrics::gauge!("proxy_discovery_entries").set(count as f64);
}
