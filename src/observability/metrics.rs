//! Metrics collection and exposition.
//!
//! # Metrics
//! - `docproxy_requests_total` (counter): requests by route, status
//! - `docproxy_request_duration_seconds` (histogram): latency until headers are sent
//! - `docproxy_rate_limited_total` (counter): requests rejected by the limiter
//! - `docproxy_upstream_errors_total` (counter): upstream failures by kind
//! - `docproxy_rate_limit_buckets` (gauge): tracked client buckets
//! - `docproxy_upstream_in_flight` (gauge): held upstream slots

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus recorder and its scrape listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

/// Record a finished request.
pub fn record_request(route: &'static str, status: u16, start: Instant) {
    counter!("docproxy_requests_total", "route" => route, "status" => status.to_string()).increment(1);
    histogram!("docproxy_request_duration_seconds", "route" => route)
        .record(start.elapsed().as_secs_f64());
}

pub fn record_rate_limited() {
    counter!("docproxy_rate_limited_total").increment(1);
}

pub fn record_upstream_error(kind: &'static str) {
    counter!("docproxy_upstream_errors_total", "kind" => kind).increment(1);
}

pub fn record_tracked_clients(count: usize) {
    gauge!("docproxy_rate_limit_buckets").set(count as f64);
}

pub fn upstream_in_flight(count: usize) {
    gauge!("docproxy_upstream_in_flight").set(count as f64);
}
