//! Metrics collection and exposition.
//!
//! # Metrics
//! - `resilience_calls_total` (counter): finished `execute` calls by policy, outcome
//! - `resilience_retries_total` (counter): scheduled retries by policy, severity
//! - `resilience_breaker_state` (gauge): 0=closed, 1=half-open, 2=open
//!
//! # Design Decisions
//! - Recording is a no-op until a recorder is installed
//! - Labels are policy/breaker names, never error messages

use std::net::SocketAddr;

use metrics_exporter_prometheus::PrometheusBuilder;

use crate::resilience::circuit_breaker::CircuitState;
use crate::resilience::classifier::ErrorSeverity;

/// Install the Prometheus recorder and its scrape listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_call(policy: &str, outcome: &'static str) {
    metrics::counter!(
        "resilience_calls_total",
        "policy" => policy.to_string(),
        "outcome" => outcome
    )
    .increment(1);
}

pub fn record_retry(policy: &str, severity: ErrorSeverity) {
    metrics::counter!(
        "resilience_retries_total",
        "policy" => policy.to_string(),
        "severity" => severity.as_str()
    )
    .increment(1);
}

pub fn record_breaker_state(breaker: &str, state: CircuitState) {
    let value = match state {
        CircuitState::Closed => 0.0,
        CircuitState::HalfOpen => 1.0,
        CircuitState::Open => 2.0,
    };
    metrics::gauge!("resilience_breaker_state", "breaker" => breaker.to_string()).set(value);
}
