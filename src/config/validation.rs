//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (attempts > 0, factors sane, thresholds > 0)
//! - Check probes reference usable URLs
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ResilienceConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use thiserror::Error;

use crate::config::schema::{BreakerConfig, ResilienceConfig, RetryConfig};

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("policy '{policy}': {reason}")]
    Policy { policy: String, reason: String },

    #[error("breaker '{breaker}': {reason}")]
    Breaker { breaker: String, reason: String },

    #[error("health: {0}")]
    Health(String),

    #[error("probe '{probe}': {reason}")]
    Probe { probe: String, reason: String },
}

/// Validate a parsed configuration.
pub fn validate_config(config: &ResilienceConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    for (name, policy) in &config.policies {
        for reason in check_policy(policy) {
            errors.push(ValidationError::Policy {
                policy: name.clone(),
                reason,
            });
        }
    }

    for (name, breaker) in &config.breakers {
        for reason in check_breaker(breaker) {
            errors.push(ValidationError::Breaker {
                breaker: name.clone(),
                reason,
            });
        }
    }

    for (label, rate) in [
        ("max_failure_rate", config.health.max_failure_rate),
        ("max_retry_rate", config.health.max_retry_rate),
    ] {
        if !(0.0..=1.0).contains(&rate) {
            errors.push(ValidationError::Health(format!(
                "{label} must be within 0.0..=1.0, got {rate}"
            )));
        }
    }

    for probe in &config.probes {
        if !(probe.url.starts_with("http://") || probe.url.starts_with("https://")) {
            errors.push(ValidationError::Probe {
                probe: probe.name.clone(),
                reason: format!("url '{}' must be http(s)", probe.url),
            });
        }
        if probe.interval_secs == 0 {
            errors.push(ValidationError::Probe {
                probe: probe.name.clone(),
                reason: "interval_secs must be > 0".to_string(),
            });
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_policy(policy: &RetryConfig) -> Vec<String> {
    let mut reasons = Vec::new();
    if policy.max_attempts == 0 {
        reasons.push("max_attempts must be > 0".to_string());
    }
    if policy.base_delay_ms > policy.max_delay_ms {
        reasons.push(format!(
            "base_delay_ms ({}) exceeds max_delay_ms ({})",
            policy.base_delay_ms, policy.max_delay_ms
        ));
    }
    if !(policy.backoff_factor.is_finite() && policy.backoff_factor >= 1.0) {
        reasons.push(format!("backoff_factor must be >= 1.0, got {}", policy.backoff_factor));
    }
    if !(0.0..=1.0).contains(&policy.jitter_factor) {
        reasons.push(format!(
            "jitter_factor must be within 0.0..=1.0, got {}",
            policy.jitter_factor
        ));
    }
    if policy.timeout_ms == Some(0) {
        reasons.push("timeout_ms must be > 0 when set".to_string());
    }
    reasons
}

fn check_breaker(breaker: &BreakerConfig) -> Vec<String> {
    let mut reasons = Vec::new();
    if breaker.failure_threshold == 0 {
        reasons.push("failure_threshold must be > 0".to_string());
    }
    if breaker.success_threshold == 0 {
        reasons.push("success_threshold must be > 0".to_string());
    }
    if breaker.monitor_window_ms == 0 {
        reasons.push("monitor_window_ms must be > 0".to_string());
    }
    if breaker.half_open_max_probes == 0 {
        reasons.push("half_open_max_probes must be > 0".to_string());
    }
    reasons
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::ProbeConfig;

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate_config(&ResilienceConfig::default()).is_ok());
    }

    #[test]
    fn test_collects_every_error() {
        let mut config = ResilienceConfig::default();
        config.policies.insert(
            "broken".into(),
            RetryConfig {
                max_attempts: 0,
                jitter_factor: 1.5,
                ..RetryConfig::default()
            },
        );
        config.breakers.insert(
            "broken".into(),
            BreakerConfig {
                failure_threshold: 0,
                ..BreakerConfig::default()
            },
        );
        config.probes.push(ProbeConfig {
            name: "ftp".into(),
            url: "ftp://example.org".into(),
            policy: "default".into(),
            interval_secs: 10,
        });

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 4);
        assert!(errors.iter().any(|e| matches!(e, ValidationError::Probe { .. })));
    }
}
