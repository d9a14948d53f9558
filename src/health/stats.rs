//! Call outcome statistics.
//!
//! # Responsibilities
//! - Count calls, failures, retries and recoveries
//! - Keep a histogram of failure labels
//! - Provide snapshots with uptime since the last reset
//!
//! # Design Decisions
//! - One collector per `Resilience`, reset only by an operator
//! - Recording never fails: a poisoned lock is recovered, counters saturate

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;
use tokio::time::Instant;

/// Snapshot of call statistics.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorStats {
    pub total_calls: u64,
    pub successful_calls: u64,
    pub failed_calls: u64,
    pub retried_calls: u64,
    pub recovered_calls: u64,
    pub error_types: BTreeMap<String, u64>,
    /// Unix milliseconds of the last reset.
    pub last_reset: u64,
    pub uptime_ms: u64,
    pub failure_rate: f64,
    pub retry_rate: f64,
}

#[derive(Debug)]
struct Counters {
    total_calls: u64,
    successful_calls: u64,
    failed_calls: u64,
    retried_calls: u64,
    recovered_calls: u64,
    error_types: HashMap<String, u64>,
    last_reset: Instant,
    last_reset_wall: SystemTime,
}

impl Counters {
    fn new() -> Self {
        Self {
            total_calls: 0,
            successful_calls: 0,
            failed_calls: 0,
            retried_calls: 0,
            recovered_calls: 0,
            error_types: HashMap::new(),
            last_reset: Instant::now(),
            last_reset_wall: SystemTime::now(),
        }
    }
}

#[derive(Debug)]
pub struct StatsCollector {
    counters: Mutex<Counters>,
}

impl Default for StatsCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl StatsCollector {
    pub fn new() -> Self {
        Self {
            counters: Mutex::new(Counters::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Counters> {
        self.counters.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record the outcome of one `execute` call.
    ///
    /// `retries` is the number of attempts after the first.
    pub fn record_call(&self, success: bool, error_type: Option<&str>, retries: u32, recovered: bool) {
        let mut c = self.lock();
        c.total_calls = c.total_calls.saturating_add(1);
        if success {
            c.successful_calls = c.successful_calls.saturating_add(1);
        } else {
            c.failed_calls = c.failed_calls.saturating_add(1);
        }
        if retries > 0 {
            c.retried_calls = c.retried_calls.saturating_add(1);
        }
        if recovered {
            c.recovered_calls = c.recovered_calls.saturating_add(1);
        }
        if let Some(label) = error_type {
            let count = c.error_types.entry(label.to_string()).or_insert(0);
            *count = count.saturating_add(1);
        }
    }

    pub fn snapshot(&self) -> ErrorStats {
        let c = self.lock();
        let rate = |n: u64| {
            if c.total_calls == 0 {
                0.0
            } else {
                n as f64 / c.total_calls as f64
            }
        };

        ErrorStats {
            total_calls: c.total_calls,
            successful_calls: c.successful_calls,
            failed_calls: c.failed_calls,
            retried_calls: c.retried_calls,
            recovered_calls: c.recovered_calls,
            error_types: c
                .error_types
                .iter()
                .map(|(k, v)| (k.clone(), *v))
                .collect(),
            last_reset: unix_millis(c.last_reset_wall),
            uptime_ms: u64::try_from(c.last_reset.elapsed().as_millis()).unwrap_or(u64::MAX),
            failure_rate: rate(c.failed_calls),
            retry_rate: rate(c.retried_calls),
        }
    }

    /// Zero all counters and restart the uptime clock.
    pub fn reset(&self) {
        *self.lock() = Counters::new();
    }
}

fn unix_millis(at: SystemTime) -> u64 {
    at.duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_record_and_snapshot() {
        let stats = StatsCollector::new();
        stats.record_call(true, None, 0, false);
        stats.record_call(true, None, 2, true);
        stats.record_call(false, Some("ECONNRESET"), 2, false);
        stats.record_call(false, Some("ECONNRESET"), 0, false);
        stats.record_call(false, Some("http_403"), 0, false);

        let snap = stats.snapshot();
        assert_eq!(snap.total_calls, 5);
        assert_eq!(snap.successful_calls, 2);
        assert_eq!(snap.failed_calls, 3);
        assert_eq!(snap.retried_calls, 2);
        assert_eq!(snap.recovered_calls, 1);
        assert_eq!(snap.error_types.get("ECONNRESET"), Some(&2));
        assert_eq!(snap.error_types.get("http_403"), Some(&1));
        assert!((snap.failure_rate - 0.6).abs() < f64::EPSILON);
        assert!((snap.retry_rate - 0.4).abs() < f64::EPSILON);
    }

    #[test]
    fn test_empty_rates_are_zero() {
        let snap = StatsCollector::new().snapshot();
        assert_eq!(snap.total_calls, 0);
        assert_eq!(snap.failure_rate, 0.0);
        assert_eq!(snap.retry_rate, 0.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_zeroes_and_restarts_uptime() {
        let stats = StatsCollector::new();
        stats.record_call(false, Some("timeout"), 1, false);
        tokio::time::advance(Duration::from_secs(5)).await;
        assert_eq!(stats.snapshot().uptime_ms, 5_000);

        stats.reset();
        let snap = stats.snapshot();
        assert_eq!(snap.total_calls, 0);
        assert!(snap.error_types.is_empty());
        assert_eq!(snap.uptime_ms, 0);
    }

    #[test]
    fn test_concurrent_recording() {
        let stats = std::sync::Arc::new(StatsCollector::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let stats = stats.clone();
                std::thread::spawn(move || {
                    for _ in 0..1_000 {
                        stats.record_call(false, Some("timeout"), 1, false);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        let snap = stats.snapshot();
        assert_eq!(snap.total_calls, 8_000);
        assert_eq!(snap.error_types.get("timeout"), Some(&8_000));
    }
}
