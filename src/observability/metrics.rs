//! Metrics collection and exposition.
//!
//! # Metrics
//! - `guard_gate_verdicts_total` (counter): gate outcomes by reason
//! - `guard_ipc_duration_seconds` (histogram): gate → sidecar latency
//! - `guard_sidecar_checks_total` (counter): sidecar outcomes by reason
//! - `guard_sidecar_refresh_total` (counter): accepted-set refreshes by result
//! - `guard_accepted_set_size` (gauge): values currently accepted
//! - `guard_sidecar_degraded` (gauge): 1 while serving a stale set
//! - `guard_rotations_total` (counter): rotations by outcome
//! - `guard_rotation_phase` (gauge): numeric rotation phase

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus exporter on `addr`. Must run inside a tokio runtime.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_gate_verdict(outcome: &'static str) {
    counter!("guard_gate_verdicts_total", "outcome" => outcome).increment(1);
}

pub fn record_ipc_latency(start: Instant) {
    histogram!("guard_ipc_duration_seconds").record(start.elapsed().as_secs_f64());
}

pub fn record_sidecar_check(outcome: &'static str) {
    counter!("guard_sidecar_checks_total", "outcome" => outcome).increment(1);
}

pub fn record_refresh(result: &'static str) {
    counter!("guard_sidecar_refresh_total", "result" => result).increment(1);
}

pub fn record_accepted_set(size: usize, degraded: bool) {
    gauge!("guard_accepted_set_size").set(size as f64);
    gauge!("guard_sidecar_degraded").set(if degraded { 1.0 } else { 0.0 });
}

pub fn record_rotation(outcome: &'static str) {
    counter!("guard_rotations_total", "outcome" => outcome).increment(1);
}

pub fn record_rotation_phase(phase: u8) {
    gauge!("guard_rotation_phase").set(phase as f64);
}
