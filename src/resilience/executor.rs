//! Resilient executor.
//!
//! # Data Flow
//! ```text
//! execute(policy, op)
//!     → resolve RetryConfig (preset + overrides) and breaker
//!     → per attempt:
//!         breaker.can_call()? None      → CircuitOpen failure
//!                             Some(adm) → race(op(), timeout)
//!         success → breaker.on_success(adm), record stats, return
//!         failure → classify → breaker.on_failure(adm) if admitted
//!                 → PERMANENT/CRITICAL: record stats, return error
//!                 → last attempt: record stats, return error
//!                 → otherwise sleep(compute_delay) and loop
//! ```

use std::future::Future;
use std::sync::{Arc, OnceLock};

use arc_swap::ArcSwap;

use crate::config::{BreakerConfig, ResilienceConfig, RetryConfig, RetryOverrides};
use crate::health::report::{self, HealthReport};
use crate::health::stats::{ErrorStats, StatsCollector};
use crate::observability::metrics;
use crate::resilience::backoff::{compute_delay, JitterSource, ThreadRngJitter};
use crate::resilience::circuit_breaker::{BreakerStatus, CircuitBreaker};
use crate::resilience::classifier::{classify, Classify};
use crate::resilience::error::ExecuteError;
use crate::resilience::registry::BreakerRegistry;
use crate::resilience::timeouts;

static GLOBAL: OnceLock<Arc<Resilience>> = OnceLock::new();

/// Owns policies, breakers and call statistics for one process.
pub struct Resilience {
    config: ArcSwap<ResilienceConfig>,
    breakers: BreakerRegistry,
    stats: StatsCollector,
    jitter: Arc<dyn JitterSource>,
}

impl std::fmt::Debug for Resilience {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Resilience")
            .field("breakers", &self.breakers.len())
            .finish_non_exhaustive()
    }
}

impl Default for Resilience {
    fn default() -> Self {
        Self::new(ResilienceConfig::default())
    }
}

impl Resilience {
    pub fn new(config: ResilienceConfig) -> Self {
        Self {
            config: ArcSwap::from_pointee(config),
            breakers: BreakerRegistry::new(),
            stats: StatsCollector::new(),
            jitter: Arc::new(ThreadRngJitter),
        }
    }

    /// Replace the jitter source, e.g. with `FixedJitter(0.0)` in tests.
    pub fn with_jitter(mut self, jitter: Arc<dyn JitterSource>) -> Self {
        self.jitter = jitter;
        self
    }

    /// The process-wide instance, created with defaults on first use.
    pub fn global() -> Arc<Resilience> {
        GLOBAL.get_or_init(|| Arc::new(Resilience::default())).clone()
    }

    /// Install `config` as the process-wide instance.
    ///
    /// If the instance already exists its policies are swapped instead.
    pub fn init_global(config: ResilienceConfig) -> Arc<Resilience> {
        let mut fresh = Some(config);
        let instance = GLOBAL.get_or_init(|| {
            let config = fresh.take().unwrap_or_default();
            Arc::new(Resilience::new(config))
        });
        if let Some(config) = fresh {
            instance.apply_config(&config);
        }
        instance.clone()
    }

    /// Swap presets and push breaker settings to live breakers.
    pub fn apply_config(&self, config: &ResilienceConfig) {
        self.config.store(Arc::new(config.clone()));
        self.breakers
            .reconfigure_all(|name| config.breaker_config(name));
        tracing::info!(
            policies = config.policies.len(),
            breakers = config.breakers.len(),
            "Resilience policies applied"
        );
    }

    pub fn config(&self) -> Arc<ResilienceConfig> {
        self.config.load_full()
    }

    pub fn retry_config(&self, policy: &str) -> RetryConfig {
        self.config.load().retry_config(policy)
    }

    fn breaker_config(&self, name: &str) -> BreakerConfig {
        self.config.load().breaker_config(name)
    }

    /// The breaker for `name`, created on first use.
    pub fn breaker(&self, name: &str) -> Arc<CircuitBreaker> {
        self.breakers
            .get_or_create(name, || self.breaker_config(name))
    }

    pub fn breakers(&self) -> &BreakerRegistry {
        &self.breakers
    }

    /// Bind a policy to a call site.
    pub fn policy(self: &Arc<Self>, name: impl Into<String>) -> PolicyHandle {
        PolicyHandle {
            resilience: self.clone(),
            policy: name.into(),
            overrides: RetryOverrides::default(),
        }
    }

    /// Run `operation` under the named policy.
    pub async fn execute<T, E, F, Fut>(&self, policy: &str, operation: F) -> Result<T, ExecuteError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Classify,
    {
        self.execute_with(policy, &RetryOverrides::default(), operation)
            .await
    }

    /// Run `operation` under the named policy with per-call overrides.
    pub async fn execute_with<T, E, F, Fut>(
        &self,
        policy: &str,
        overrides: &RetryOverrides,
        mut operation: F,
    ) -> Result<T, ExecuteError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Classify,
    {
        let config = self.retry_config(policy).with_overrides(overrides);
        let breaker = self.breaker(policy);
        let max_attempts = config.max_attempts.max(1);
        let mut attempt: u32 = 0;

        loop {
            let admission = breaker.can_call();
            let outcome = match admission {
                Some(_) => match timeouts::race(config.timeout(), operation()).await {
                    Ok(Ok(value)) => Ok(value),
                    Ok(Err(e)) => Err(ExecuteError::Operation(e)),
                    Err(after) => Err(ExecuteError::Timeout {
                        policy: policy.to_string(),
                        after,
                    }),
                },
                None => Err(ExecuteError::CircuitOpen {
                    name: breaker.name().to_string(),
                    state: breaker.state(),
                }),
            };

            let error = match outcome {
                Ok(value) => {
                    if let Some(admission) = admission {
                        breaker.on_success(admission);
                    }
                    let recovered = attempt > 0;
                    self.stats.record_call(true, None, attempt, recovered);
                    metrics::record_call(policy, "success");
                    if recovered {
                        tracing::info!(policy, attempts = attempt + 1, "Operation recovered after retry");
                    }
                    return Ok(value);
                }
                Err(error) => error,
            };

            let severity = classify(&error);
            // Rejected attempts were never admitted and are not reported back.
            if let Some(admission) = admission {
                breaker.on_failure(admission);
            }

            if !severity.is_retryable() {
                tracing::warn!(
                    policy,
                    attempt,
                    severity = %severity,
                    error = %error,
                    "Non-retryable failure"
                );
                self.stats
                    .record_call(false, Some(&error.error_type()), attempt, false);
                metrics::record_call(policy, "permanent_failure");
                return Err(error);
            }

            if attempt + 1 >= max_attempts {
                tracing::error!(
                    policy,
                    attempts = attempt + 1,
                    severity = %severity,
                    error = %error,
                    "Retries exhausted"
                );
                self.stats
                    .record_call(false, Some(&error.error_type()), attempt, false);
                metrics::record_call(policy, "exhausted");
                return Err(error);
            }

            let delay = compute_delay(
                severity,
                error.retry_after(),
                attempt,
                &config,
                self.jitter.as_ref(),
            );
            tracing::warn!(
                policy,
                attempt,
                severity = %severity,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "Operation failed, retrying"
            );
            metrics::record_retry(policy, severity);

            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }

    /// Snapshot of call statistics.
    pub fn error_stats(&self) -> ErrorStats {
        self.stats.snapshot()
    }

    pub fn circuit_breaker_statuses(&self) -> Vec<BreakerStatus> {
        self.breakers.statuses()
    }

    pub fn error_recovery_health(&self) -> HealthReport {
        let thresholds = self.config.load().health.clone();
        report::evaluate(self.error_stats(), self.circuit_breaker_statuses(), &thresholds)
    }

    /// Zero all call counters. Operator use only.
    pub fn reset_error_stats(&self) {
        self.stats.reset();
        tracing::warn!("Error statistics reset");
    }
}

/// A policy bound to a call site.
///
/// `handle.run(op)` behaves exactly like `resilience.execute_with(name, overrides, op)`.
#[derive(Debug, Clone)]
pub struct PolicyHandle {
    resilience: Arc<Resilience>,
    policy: String,
    overrides: RetryOverrides,
}

impl PolicyHandle {
    pub fn with_overrides(mut self, overrides: RetryOverrides) -> Self {
        self.overrides = overrides;
        self
    }

    pub fn name(&self) -> &str {
        &self.policy
    }

    pub async fn run<T, E, F, Fut>(&self, operation: F) -> Result<T, ExecuteError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Classify,
    {
        self.resilience
            .execute_with(&self.policy, &self.overrides, operation)
            .await
    }

    /// Wrap this policy around a `tower::Service`.
    pub fn layer(&self) -> crate::resilience::layer::ResilienceLayer {
        crate::resilience::layer::ResilienceLayer::new(self.clone())
    }
}
