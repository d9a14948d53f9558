//! Derived health evaluation.

use std::fmt;

use serde::Serialize;

use crate::config::HealthConfig;
use crate::health::stats::ErrorStats;
use crate::resilience::circuit_breaker::{BreakerStatus, CircuitState};

/// One reason the system is considered unhealthy.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "issue", rename_all = "snake_case")]
pub enum HealthIssue {
    HighFailureRate { rate: f64, threshold: f64 },
    HighRetryRate { rate: f64, threshold: f64 },
    CircuitOpen { breaker: String },
}

impl HealthIssue {
    /// Stable identifier, e.g. `high_failure_rate` or `circuit_open:database`.
    pub fn name(&self) -> String {
        match self {
            HealthIssue::HighFailureRate { .. } => "high_failure_rate".to_string(),
            HealthIssue::HighRetryRate { .. } => "high_retry_rate".to_string(),
            HealthIssue::CircuitOpen { breaker } => format!("circuit_open:{breaker}"),
        }
    }
}

impl fmt::Display for HealthIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HealthIssue::HighFailureRate { rate, threshold } => write!(
                f,
                "failure rate {:.1}% exceeds {:.1}%",
                rate * 100.0,
                threshold * 100.0
            ),
            HealthIssue::HighRetryRate { rate, threshold } => write!(
                f,
                "retry rate {:.1}% exceeds {:.1}%",
                rate * 100.0,
                threshold * 100.0
            ),
            HealthIssue::CircuitOpen { breaker } => write!(f, "circuit breaker '{breaker}' is open"),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub healthy: bool,
    pub issues: Vec<HealthIssue>,
    pub stats: ErrorStats,
    pub breakers: Vec<BreakerStatus>,
}

impl HealthReport {
    pub fn issue_names(&self) -> Vec<String> {
        self.issues.iter().map(HealthIssue::name).collect()
    }
}

/// Evaluate health from a stats snapshot and breaker statuses.
pub fn evaluate(stats: ErrorStats, breakers: Vec<BreakerStatus>, thresholds: &HealthConfig) -> HealthReport {
    let mut issues = Vec::new();

    if stats.failure_rate > thresholds.max_failure_rate {
        issues.push(HealthIssue::HighFailureRate {
            rate: stats.failure_rate,
            threshold: thresholds.max_failure_rate,
        });
    }

    if stats.retry_rate > thresholds.max_retry_rate {
        issues.push(HealthIssue::HighRetryRate {
            rate: stats.retry_rate,
            threshold: thresholds.max_retry_rate,
        });
    }

    issues.extend(
        breakers
            .iter()
            .filter(|b| b.state == CircuitState::Open)
            .map(|b| HealthIssue::CircuitOpen {
                breaker: b.name.clone(),
            }),
    );

    HealthReport {
        healthy: issues.is_empty(),
        issues,
        stats,
        breakers,
    }
}
