//! Exponential backoff with jitter.
//!
//! `attempt` is zero-based: the index of the attempt that just failed.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use rand::Rng;

use crate::config::RetryConfig;
use crate::resilience::classifier::{classify, Classify, ErrorSeverity};

/// Source of jitter samples in `[0, 1)`.
pub trait JitterSource: Send + Sync {
    fn sample(&self) -> f64;
}

/// Unseeded thread-local randomness.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadRngJitter;

impl JitterSource for ThreadRngJitter {
    fn sample(&self) -> f64 {
        rand::thread_rng().gen::<f64>()
    }
}

/// Always returns the same sample. `FixedJitter(0.0)` disables jitter.
#[derive(Debug, Clone, Copy)]
pub struct FixedJitter(pub f64);

impl JitterSource for FixedJitter {
    fn sample(&self) -> f64 {
        clamp_unit(self.0)
    }
}

/// Replays a known sequence of samples, cycling when exhausted.
#[derive(Debug)]
pub struct SequenceJitter {
    samples: Vec<f64>,
    next: AtomicUsize,
}

impl SequenceJitter {
    pub fn new(samples: Vec<f64>) -> Self {
        Self {
            samples,
            next: AtomicUsize::new(0),
        }
    }
}

impl JitterSource for SequenceJitter {
    fn sample(&self) -> f64 {
        if self.samples.is_empty() {
            return 0.0;
        }
        let idx = self.next.fetch_add(1, Ordering::Relaxed) % self.samples.len();
        clamp_unit(self.samples[idx])
    }
}

fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0 - f64::EPSILON)
    }
}

/// Delay before the next attempt.
///
/// A rate-limited failure carrying a wait hint uses the hint (capped at
/// `max_delay`) and skips the exponential formula.
pub fn compute_delay(
    severity: ErrorSeverity,
    retry_after: Option<Duration>,
    attempt: u32,
    config: &RetryConfig,
    jitter: &dyn JitterSource,
) -> Duration {
    if severity == ErrorSeverity::RateLimited {
        if let Some(hint) = retry_after {
            return hint.min(config.max_delay());
        }
    }

    let max_ms = config.max_delay_ms as f64;
    let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
    let exponential = config.base_delay_ms as f64 * config.backoff_factor.powi(exponent);
    let bounded = exponential.min(max_ms);
    let jitter_ms = bounded * config.jitter_factor * jitter.sample();

    Duration::from_millis((bounded + jitter_ms).floor() as u64)
}

/// Classify `error` and compute the delay before retrying it.
pub fn delay_for<E: Classify + ?Sized>(
    error: &E,
    attempt: u32,
    config: &RetryConfig,
    jitter: &dyn JitterSource,
) -> Duration {
    compute_delay(classify(error), error.retry_after(), attempt, config, jitter)
}
