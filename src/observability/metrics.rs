//! Metrics collection and exposition.
//!
//! # Metrics
//! - `mux_requests_total` (counter): inbound requests by status
//! - `mux_request_duration_seconds` (histogram): inbound latency
//! - `mux_admission_rejected_total` (counter): requests refused with 429
//! - `mux_inflight_requests` (gauge): occupied admission slots
//! - `mux_outbound_requests_total` (counter): outbound calls by outcome
//! - `mux_outbound_duration_seconds` (histogram): outbound latency
//! - `mux_targets_per_request` (histogram): fan-out width

use std::net::SocketAddr;
use std::time::{Duration, Instant};

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Install the Prometheus recorder and its scrape listener.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics exporter listening");
    Ok(())
}

pub fn record_request(status: u16, start: Instant) {
    counter!("mux_requests_total", "status" => status.to_string()).increment(1);
    histogram!("mux_request_duration_seconds").record(start.elapsed().as_secs_f64());
}

pub fn record_admission_rejected() {
    counter!("mux_admission_rejected_total").increment(1);
}

pub fn set_inflight(occupied: usize) {
    gauge!("mux_inflight_requests").set(occupied as f64);
}

pub fn record_outbound(outcome: &'static str, elapsed: Duration) {
    counter!("mux_outbound_requests_total", "outcome" => outcome).increment(1);
    histogram!("mux_outbound_duration_seconds").record(elapsed.as_secs_f64());
}

pub fn record_targets_per_request(count: usize) {
    histogram!("mux_targets_per_request").record(count as f64);
}
