//! Metrics collection and exposition.
//!
//! # Metrics
//! - `relay_requests_total` (counter): relay calls by outcome, status
//! - `relay_request_duration_seconds` (histogram): end-to-end latency
//! - `relay_ssrf_blocked_total` (counter): rejected targets by reason, stage
//! - `relay_rate_limited_total` (counter): callers turned away
//! - `relay_redirects_total` (counter): redirect hops followed
//! - `relay_response_bytes` (histogram): upstream body sizes
//!
//! # Design Decisions
//! - Recording goes through the `metrics` facade; without an installed
//!   recorder every call is a no-op
//! - Labels stay low-cardinality (never hostnames or URLs)

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus recorder and its scrape endpoint.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_relay(outcome: &'static str, status: u16, start: Instant) {
    counter!(
        "relay_requests_total",
        "outcome" => outcome,
        "status" => status.to_string()
    )
    .increment(1);
    histogram!("relay_request_duration_seconds", "outcome" => outcome)
        .record(start.elapsed().as_secs_f64());
}

pub fn record_ssrf_block(reason: &'static str, stage: &'static str) {
    counter!("relay_ssrf_blocked_total", "reason" => reason, "stage" => stage).increment(1);
}

pub fn record_rate_limited() {
    counter!("relay_rate_limited_total").increment(1);
}

pub fn record_redirect() {
    counter!("relay_redirects_total").increment(1);
}

pub fn record_response_bytes(bytes: usize) {
    histogram!("relay_response_bytes").record(bytes as f64);
}
