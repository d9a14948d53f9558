//! Circuit breaker for dependency protection.
//!
//! # States
//! - Closed: normal operation, calls pass through
//! - Open: dependency assumed down, calls fail fast
//! - Half-Open: probing whether the dependency recovered
//!
//! # State Transitions
//! ```text
//! Closed → Open: failures inside monitor window >= failure_threshold
//! Open → Half-Open: first can_call() at or after next_attempt
//! Half-Open → Closed: success_threshold consecutive successes
//! Half-Open → Open: any failure
//! ```
//!
//! # Design Decisions
//! - Per-resource breaker, created lazily by the registry
//! - All state behind one mutex; every method takes it exactly once
//! - Half-open admits at most `half_open_max_probes` calls in flight. The
//!   caller that performs the Open → Half-Open transition takes the first slot.
//!   A probe that never reports back is forgotten after `timeout`.
//! - `can_call` hands out an [`Admission`] stamped with the breaker's epoch.
//!   Only a probe admission from the current epoch may free a slot or count
//!   toward closing; late results from calls admitted earlier are recorded in
//!   the failure window and otherwise ignored.

use std::collections::VecDeque;
use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;

use crate::config::BreakerConfig;
use crate::observability::metrics;

/// Circuit breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    pub fn as_str(self) -> &'static str {
        match self {
            CircuitState::Closed => "CLOSED",
            CircuitState::Open => "OPEN",
            CircuitState::HalfOpen => "HALF_OPEN",
        }
    }
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Read-only snapshot of a breaker.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BreakerStatus {
    pub name: String,
    pub state: CircuitState,
    pub failure_count: usize,
    pub successes: u32,
    /// Milliseconds until a probe is admitted; only while open.
    pub next_attempt_in_ms: Option<u64>,
    /// Milliseconds since the last recorded failure.
    pub last_failure_ago_ms: Option<u64>,
    pub failure_threshold: u32,
    pub success_threshold: u32,
}

/// Permission to run one call, returned by [`CircuitBreaker::can_call`].
///
/// Hand it back to `on_success` or `on_failure` when the call finishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use = "report the outcome with on_success or on_failure"]
pub struct Admission {
    epoch: u64,
    probe: bool,
}

impl Admission {
    /// Whether this call holds a half-open probe slot.
    pub fn is_probe(&self) -> bool {
        self.probe
    }
}

#[derive(Debug)]
struct BreakerInner {
    config: BreakerConfig,
    state: CircuitState,
    failures: VecDeque<Instant>,
    successes: u32,
    next_attempt: Option<Instant>,
    last_failure: Option<Instant>,
    probes_in_flight: u32,
    last_probe_admitted: Option<Instant>,
    /// Bumped on every transition and whenever abandoned probes are forgotten.
    epoch: u64,
}

impl BreakerInner {
    fn prune(&mut self, now: Instant) {
        let window = self.config.monitor_window();
        while let Some(&oldest) = self.failures.front() {
            if now.saturating_duration_since(oldest) > window {
                self.failures.pop_front();
            } else {
                break;
            }
        }
    }

    fn try_admit_probe(&mut self, now: Instant) -> Option<Admission> {
        let stale = self
            .last_probe_admitted
            .is_some_and(|at| now.saturating_duration_since(at) >= self.config.timeout());
        if stale {
            self.probes_in_flight = 0;
            self.epoch += 1;
        }
        if self.probes_in_flight >= self.config.half_open_max_probes.max(1) {
            return None;
        }
        self.probes_in_flight += 1;
        self.last_probe_admitted = Some(now);
        Some(Admission {
            epoch: self.epoch,
            probe: true,
        })
    }

    /// Whether `admission` is a live probe of the current half-open period.
    fn is_current_probe(&self, admission: Admission) -> bool {
        self.state == CircuitState::HalfOpen && admission.probe && admission.epoch == self.epoch
    }

    fn release_probe(&mut self) {
        self.probes_in_flight = self.probes_in_flight.saturating_sub(1);
    }
}

/// A per-resource circuit breaker.
#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: BreakerConfig) -> Self {
        let name = name.into();
        metrics::record_breaker_state(&name, CircuitState::Closed);
        Self {
            name,
            inner: Mutex::new(BreakerInner {
                config,
                state: CircuitState::Closed,
                failures: VecDeque::new(),
                successes: 0,
                next_attempt: None,
                last_failure: None,
                probes_in_flight: 0,
                last_probe_admitted: None,
                epoch: 0,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn lock(&self) -> MutexGuard<'_, BreakerInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Admit a call, or `None` if it must be rejected now.
    ///
    /// While open, the first check at or after `next_attempt` moves the breaker
    /// to half-open and admits the caller as the probe.
    pub fn can_call(&self) -> Option<Admission> {
        let now = Instant::now();
        let mut inner = self.lock();
        inner.prune(now);

        match inner.state {
            CircuitState::Closed => Some(Admission {
                epoch: inner.epoch,
                probe: false,
            }),
            CircuitState::Open => match inner.next_attempt {
                Some(at) if now < at => None,
                _ => {
                    self.transition(&mut inner, CircuitState::HalfOpen, now);
                    inner.try_admit_probe(now)
                }
            },
            CircuitState::HalfOpen => {
                let admitted = inner.try_admit_probe(now);
                if admitted.is_none() {
                    tracing::debug!(breaker = %self.name, "Probe already in flight, rejecting call");
                }
                admitted
            }
        }
    }

    /// Record a successful call.
    pub fn on_success(&self, admission: Admission) {
        let now = Instant::now();
        let mut inner = self.lock();
        inner.prune(now);

        match inner.state {
            CircuitState::Closed => {}
            CircuitState::HalfOpen if !inner.is_current_probe(admission) => {
                tracing::debug!(breaker = %self.name, "Success from a non-probe call ignored while half-open");
            }
            CircuitState::HalfOpen => {
                inner.release_probe();
                inner.successes += 1;
                tracing::debug!(
                    breaker = %self.name,
                    successes = inner.successes,
                    threshold = inner.config.success_threshold,
                    "Half-open probe succeeded"
                );
                if inner.successes >= inner.config.success_threshold {
                    self.transition(&mut inner, CircuitState::Closed, now);
                }
            }
            CircuitState::Open => {
                tracing::debug!(breaker = %self.name, "Late success while open ignored");
            }
        }
    }

    /// Record a failed call.
    ///
    /// The failure always enters the window; while half-open only the current
    /// probe reopens the circuit.
    pub fn on_failure(&self, admission: Admission) {
        let now = Instant::now();
        let mut inner = self.lock();
        inner.last_failure = Some(now);
        inner.failures.push_back(now);
        inner.prune(now);

        match inner.state {
            CircuitState::Closed => {
                let threshold = inner.config.failure_threshold.max(1) as usize;
                if inner.failures.len() >= threshold {
                    self.transition(&mut inner, CircuitState::Open, now);
                }
            }
            CircuitState::HalfOpen if inner.is_current_probe(admission) => {
                inner.release_probe();
                self.transition(&mut inner, CircuitState::Open, now);
            }
            CircuitState::HalfOpen => {
                tracing::debug!(breaker = %self.name, "Late failure from a non-probe call while half-open");
            }
            CircuitState::Open => {}
        }
    }

    fn transition(&self, inner: &mut BreakerInner, to: CircuitState, now: Instant) {
        let from = inner.state;
        inner.state = to;
        inner.epoch += 1;
        inner.successes = 0;
        inner.probes_in_flight = 0;
        inner.last_probe_admitted = None;

        match to {
            CircuitState::Open => {
                let timeout = inner.config.timeout();
                inner.next_attempt = Some(now + timeout);
                tracing::warn!(
                    breaker = %self.name,
                    from = %from,
                    failures = inner.failures.len(),
                    retry_in_ms = timeout.as_millis() as u64,
                    "Circuit breaker opened"
                );
            }
            CircuitState::HalfOpen => {
                inner.next_attempt = None;
                tracing::info!(breaker = %self.name, "Circuit breaker half-open, admitting probe");
            }
            CircuitState::Closed => {
                inner.failures.clear();
                inner.next_attempt = None;
                inner.last_failure = None;
                tracing::info!(breaker = %self.name, from = %from, "Circuit breaker closed");
            }
        }

        metrics::record_breaker_state(&self.name, to);
    }

    /// Current state, without side effects.
    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    /// Snapshot for reporting.
    pub fn status(&self) -> BreakerStatus {
        let now = Instant::now();
        let mut inner = self.lock();
        inner.prune(now);

        let next_attempt_in_ms = match inner.state {
            CircuitState::Open => inner
                .next_attempt
                .map(|at| millis(at.saturating_duration_since(now))),
            _ => None,
        };

        BreakerStatus {
            name: self.name.clone(),
            state: inner.state,
            failure_count: inner.failures.len(),
            successes: inner.successes,
            next_attempt_in_ms,
            last_failure_ago_ms: inner
                .last_failure
                .map(|at| millis(now.saturating_duration_since(at))),
            failure_threshold: inner.config.failure_threshold,
            success_threshold: inner.config.success_threshold,
        }
    }

    /// Replace thresholds without touching the current state.
    pub fn reconfigure(&self, config: BreakerConfig) {
        let mut inner = self.lock();
        if inner.config != config {
            tracing::info!(breaker = %self.name, ?config, "Circuit breaker reconfigured");
            inner.config = config;
        }
    }

    /// Force the breaker closed. Operator use only.
    pub fn reset(&self) {
        let now = Instant::now();
        let mut inner = self.lock();
        self.transition(&mut inner, CircuitState::Closed, now);
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tokio::time::advance;

    fn config(failures: u32, successes: u32, timeout_ms: u64) -> BreakerConfig {
        BreakerConfig {
            failure_threshold: failures,
            success_threshold: successes,
            timeout_ms,
            monitor_window_ms: 60_000,
            half_open_max_probes: 1,
        }
    }

    fn fail(cb: &CircuitBreaker) {
        let admission = cb.can_call().expect("call should be admitted");
        cb.on_failure(admission);
    }

    fn succeed(cb: &CircuitBreaker) {
        let admission = cb.can_call().expect("call should be admitted");
        cb.on_success(admission);
    }

    fn open(cb: &CircuitBreaker, failures: u32) {
        for _ in 0..failures {
            fail(cb);
        }
        assert_eq!(cb.state(), CircuitState::Open);
    }

    #[tokio::test(start_paused = true)]
    async fn test_starts_closed() {
        let cb = CircuitBreaker::new("svc", BreakerConfig::default());
        assert_eq!(cb.state(), CircuitState::Closed);
        let first = cb.can_call().unwrap();
        assert!(!first.is_probe());
        assert!(cb.can_call().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_opens_after_threshold_within_window() {
        let cb = CircuitBreaker::new("svc", config(5, 3, 30_000));
        for _ in 0..4 {
            fail(&cb);
            advance(Duration::from_secs(2)).await;
        }
        assert_eq!(cb.state(), CircuitState::Closed);

        fail(&cb);
        assert_eq!(cb.state(), CircuitState::Open);
        assert!(cb.can_call().is_none());

        advance(Duration::from_millis(29_999)).await;
        assert!(cb.can_call().is_none());

        advance(Duration::from_millis(1)).await;
        assert!(cb.can_call().is_some_and(|a| a.is_probe()));
        assert_eq!(cb.state(), CircuitState::HalfOpen);
    }

    #[tokio::test(start_paused = true)]
    async fn test_old_failures_leave_the_window() {
        let cb = CircuitBreaker::new("svc", config(3, 1, 1_000));
        fail(&cb);
        fail(&cb);
        advance(Duration::from_secs(61)).await;

        assert_eq!(cb.status().failure_count, 0);
        fail(&cb);
        assert_eq!(cb.state(), CircuitState::Closed);
        assert_eq!(cb.status().failure_count, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_while_closed_keeps_window() {
        let cb = CircuitBreaker::new("svc", config(3, 1, 1_000));
        fail(&cb);
        fail(&cb);
        succeed(&cb);
        assert_eq!(cb.status().failure_count, 2);
        fail(&cb);
        assert_eq!(cb.state(), CircuitState::Open);
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_closes_after_success_threshold() {
        let cb = CircuitBreaker::new("svc", config(2, 3, 100));
        open(&cb, 2);
        advance(Duration::from_millis(100)).await;

        for _ in 0..2 {
            succeed(&cb);
            assert_eq!(cb.state(), CircuitState::HalfOpen);
        }
        succeed(&cb);

        let status = cb.status();
        assert_eq!(status.state, CircuitState::Closed);
        assert_eq!(status.failure_count, 0);
        assert_eq!(status.last_failure_ago_ms, None);
        assert_eq!(status.next_attempt_in_ms, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_failure_reopens() {
        let cb = CircuitBreaker::new("svc", config(2, 3, 100));
        open(&cb, 2);
        advance(Duration::from_millis(100)).await;

        succeed(&cb);
        succeed(&cb);
        fail(&cb);

        assert_eq!(cb.state(), CircuitState::Open);
        assert_eq!(cb.status().next_attempt_in_ms, Some(100));
        assert!(cb.can_call().is_none());

        // A fresh half-open period starts from zero successes.
        advance(Duration::from_millis(100)).await;
        assert!(cb.can_call().is_some());
        assert_eq!(cb.status().successes, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_probe_admission() {
        let cb = CircuitBreaker::new("svc", config(1, 1, 1_000));
        open(&cb, 1);
        advance(Duration::from_millis(1_000)).await;

        let probe = cb.can_call().unwrap();
        assert!(cb.can_call().is_none(), "second caller must not become a probe");
        assert_eq!(cb.state(), CircuitState::HalfOpen);

        cb.on_failure(probe);
        assert_eq!(cb.state(), CircuitState::Open);
        assert!(cb.can_call().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_late_closed_success_keeps_trial_slot() {
        let cb = CircuitBreaker::new("svc", config(1, 3, 100));
        let slow = cb.can_call().unwrap();
        open(&cb, 1);
        advance(Duration::from_millis(100)).await;

        let trial = cb.can_call().unwrap();
        assert!(trial.is_probe());

        // The call admitted while closed finishes during the trial call.
        cb.on_success(slow);
        assert_eq!(cb.status().successes, 0);
        assert!(cb.can_call().is_none(), "trial slot must still be held");

        cb.on_success(trial);
        assert_eq!(cb.status().successes, 1);
        assert!(cb.can_call().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_late_closed_failure_does_not_reopen() {
        let cb = CircuitBreaker::new("svc", config(1, 1, 100));
        let slow = cb.can_call().unwrap();
        open(&cb, 1);
        advance(Duration::from_millis(100)).await;

        let trial = cb.can_call().unwrap();
        cb.on_failure(slow);
        assert_eq!(cb.state(), CircuitState::HalfOpen);

        cb.on_success(trial);
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_abandoned_probe_expires() {
        let cb = CircuitBreaker::new("svc", config(1, 1, 500));
        open(&cb, 1);
        advance(Duration::from_millis(500)).await;

        let abandoned = cb.can_call().unwrap();
        assert!(cb.can_call().is_none());
        advance(Duration::from_millis(500)).await;
        let replacement = cb.can_call().unwrap();

        // The forgotten probe reporting late must not release the new one.
        cb.on_failure(abandoned);
        assert_eq!(cb.state(), CircuitState::HalfOpen);
        assert!(cb.can_call().is_none());

        cb.on_success(replacement);
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[test]
    fn test_concurrent_probes_are_serialized() {
        // Outside a runtime the breaker reads the real clock.
        let cb = Arc::new(CircuitBreaker::new("svc", config(1, 1, 20)));
        open(&cb, 1);
        std::thread::sleep(Duration::from_millis(30));

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let cb = cb.clone();
                std::thread::spawn(move || cb.can_call().is_some())
            })
            .collect();
        let admitted = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|admitted| *admitted)
            .count();
        assert_eq!(admitted, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_status_and_reset() {
        let cb = CircuitBreaker::new("db", config(2, 1, 10_000));
        fail(&cb);
        advance(Duration::from_millis(250)).await;
        fail(&cb);

        let status = cb.status();
        assert_eq!(status.name, "db");
        assert_eq!(status.state, CircuitState::Open);
        assert_eq!(status.failure_count, 2);
        assert_eq!(status.next_attempt_in_ms, Some(10_000));
        assert_eq!(status.last_failure_ago_ms, Some(0));

        cb.reset();
        assert_eq!(cb.state(), CircuitState::Closed);
        assert!(cb.can_call().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconfigure_keeps_state() {
        let cb = CircuitBreaker::new("db", config(2, 1, 10_000));
        fail(&cb);
        cb.reconfigure(config(1, 1, 10_000));
        assert_eq!(cb.state(), CircuitState::Closed);
        fail(&cb);
        assert_eq!(cb.state(), CircuitState::Open);
    }
}
