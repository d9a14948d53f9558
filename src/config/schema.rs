//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the resilience
//! core. All types derive Serde traits for deserialization from config files.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Name of the fallback retry policy used when a caller names an unknown one.
pub const DEFAULT_POLICY: &str = "default";

/// Fast, user-facing chat platform sends.
pub const CHAT_API_POLICY: &str = "chat_api";

/// Bulk or critical operations that are worth waiting for.
pub const CRITICAL_POLICY: &str = "critical";

/// Local datastore access.
pub const DATABASE_POLICY: &str = "database";

/// Placeholder admin token; the admin API will not start while it is set.
pub const DEFAULT_ADMIN_API_KEY: &str = "CHANGE_ME_IN_PRODUCTION";

/// Root configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ResilienceConfig {
    /// Retry policies by operation name. Entries replace the built-in preset of
    /// the same name.
    pub policies: BTreeMap<String, RetryConfig>,

    /// Circuit breaker settings by resource name.
    pub breakers: BTreeMap<String, BreakerConfig>,

    /// Health evaluation thresholds.
    pub health: HealthConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Admin API settings.
    pub admin: AdminConfig,

    /// Active dependency probes run by the daemon.
    pub probes: Vec<ProbeConfig>,
}

impl ResilienceConfig {
    /// Resolve the retry policy for `name`.
    ///
    /// Lookup order: configured entry, built-in preset, configured `default`,
    /// built-in default.
    pub fn retry_config(&self, name: &str) -> RetryConfig {
        self.policies
            .get(name)
            .cloned()
            .or_else(|| RetryConfig::preset(name))
            .or_else(|| self.policies.get(DEFAULT_POLICY).cloned())
            .unwrap_or_default()
    }

    /// Resolve the breaker settings for `name`, with the same lookup order as
    /// [`ResilienceConfig::retry_config`].
    pub fn breaker_config(&self, name: &str) -> BreakerConfig {
        self.breakers
            .get(name)
            .cloned()
            .or_else(|| BreakerConfig::preset(name))
            .or_else(|| self.breakers.get(DEFAULT_POLICY).cloned())
            .unwrap_or_default()
    }
}

/// Retry configuration for one named operation type.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts including the first one.
    pub max_attempts: u32,

    /// Base delay for exponential backoff in milliseconds.
    pub base_delay_ms: u64,

    /// Upper bound for any single delay in milliseconds.
    pub max_delay_ms: u64,

    /// Multiplier applied per attempt.
    pub backoff_factor: f64,

    /// Fraction of the bounded delay added as random jitter (0.0 - 1.0).
    pub jitter_factor: f64,

    /// Per-attempt timeout in milliseconds. `None` disables the race.
    pub timeout_ms: Option<u64>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1_000,
            max_delay_ms: 10_000,
            backoff_factor: 2.0,
            jitter_factor: 0.1,
            timeout_ms: None,
        }
    }
}

impl RetryConfig {
    /// Low-latency preset for user-facing sends.
    pub fn chat_api() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 500,
            max_delay_ms: 5_000,
            backoff_factor: 2.0,
            jitter_factor: 0.1,
            timeout_ms: Some(10_000),
        }
    }

    /// Patient preset for bulk and critical operations.
    pub fn critical() -> Self {
        Self {
            max_attempts: 5,
            base_delay_ms: 1_000,
            max_delay_ms: 30_000,
            backoff_factor: 2.0,
            jitter_factor: 0.2,
            timeout_ms: Some(30_000),
        }
    }

    /// Tight preset for local resources.
    pub fn database() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 100,
            max_delay_ms: 2_000,
            backoff_factor: 1.5,
            jitter_factor: 0.05,
            timeout_ms: Some(5_000),
        }
    }

    /// Built-in preset by name.
    pub fn preset(name: &str) -> Option<Self> {
        match name {
            DEFAULT_POLICY => Some(Self::default()),
            CHAT_API_POLICY => Some(Self::chat_api()),
            CRITICAL_POLICY => Some(Self::critical()),
            DATABASE_POLICY => Some(Self::database()),
            _ => None,
        }
    }

    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }

    /// Apply per-call overrides on top of this configuration.
    pub fn with_overrides(&self, overrides: &RetryOverrides) -> Self {
        Self {
            max_attempts: overrides.max_attempts.unwrap_or(self.max_attempts),
            base_delay_ms: overrides.base_delay_ms.unwrap_or(self.base_delay_ms),
            max_delay_ms: overrides.max_delay_ms.unwrap_or(self.max_delay_ms),
            backoff_factor: overrides.backoff_factor.unwrap_or(self.backoff_factor),
            jitter_factor: overrides.jitter_factor.unwrap_or(self.jitter_factor),
            timeout_ms: overrides.timeout_ms.unwrap_or(self.timeout_ms),
        }
    }
}

/// Per-call overrides merged over a named [`RetryConfig`].
///
/// `timeout_ms: Some(None)` explicitly disables the timeout of the preset.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct RetryOverrides {
    pub max_attempts: Option<u32>,
    pub base_delay_ms: Option<u64>,
    pub max_delay_ms: Option<u64>,
    pub backoff_factor: Option<f64>,
    pub jitter_factor: Option<f64>,
    pub timeout_ms: Option<Option<u64>>,
}

impl RetryOverrides {
    pub fn max_attempts(mut self, value: u32) -> Self {
        self.max_attempts = Some(value);
        self
    }

    pub fn base_delay_ms(mut self, value: u64) -> Self {
        self.base_delay_ms = Some(value);
        self
    }

    pub fn max_delay_ms(mut self, value: u64) -> Self {
        self.max_delay_ms = Some(value);
        self
    }

    pub fn backoff_factor(mut self, value: f64) -> Self {
        self.backoff_factor = Some(value);
        self
    }

    pub fn jitter_factor(mut self, value: f64) -> Self {
        self.jitter_factor = Some(value);
        self
    }

    pub fn timeout_ms(mut self, value: Option<u64>) -> Self {
        self.timeout_ms = Some(value);
        self
    }
}

/// Circuit breaker configuration for one named resource.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct BreakerConfig {
    /// Failures inside the monitor window that open the circuit.
    pub failure_threshold: u32,

    /// Consecutive half-open successes that close the circuit.
    pub success_threshold: u32,

    /// How long the circuit stays open before admitting a probe, in milliseconds.
    pub timeout_ms: u64,

    /// Sliding window for counting failures, in milliseconds.
    pub monitor_window_ms: u64,

    /// Concurrent probes admitted while half-open.
    pub half_open_max_probes: u32,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 3,
            timeout_ms: 60_000,
            monitor_window_ms: 60_000,
            half_open_max_probes: 1,
        }
    }
}

impl BreakerConfig {
    /// The chat platform API is noisy; tolerate more failures before opening.
    pub fn chat_api() -> Self {
        Self {
            failure_threshold: 10,
            success_threshold: 3,
            timeout_ms: 30_000,
            monitor_window_ms: 60_000,
            half_open_max_probes: 1,
        }
    }

    pub fn critical() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 3,
            timeout_ms: 60_000,
            monitor_window_ms: 120_000,
            half_open_max_probes: 1,
        }
    }

    /// A local datastore failing repeatedly is rarely noise.
    pub fn database() -> Self {
        Self {
            failure_threshold: 3,
            success_threshold: 2,
            timeout_ms: 30_000,
            monitor_window_ms: 60_000,
            half_open_max_probes: 1,
        }
    }

    pub fn preset(name: &str) -> Option<Self> {
        match name {
            DEFAULT_POLICY => Some(Self::default()),
            CHAT_API_POLICY => Some(Self::chat_api()),
            CRITICAL_POLICY => Some(Self::critical()),
            DATABASE_POLICY => Some(Self::database()),
            _ => None,
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn monitor_window(&self) -> Duration {
        Duration::from_millis(self.monitor_window_ms)
    }
}

/// Health evaluation thresholds.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct HealthConfig {
    /// Failure rate above which the system is unhealthy.
    pub max_failure_rate: f64,

    /// Retry rate above which the system is unhealthy.
    pub max_retry_rate: f64,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            max_failure_rate: 0.5,
            max_retry_rate: 0.25,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log output format.
    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Admin API configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Serve the admin API.
    pub enabled: bool,

    /// Bind address for the admin API.
    pub bind_address: String,

    /// Bearer token required on every admin request.
    pub api_key: String,

    /// Request timeout for admin handlers in seconds.
    pub request_timeout_secs: u64,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bind_address: "127.0.0.1:8081".to_string(),
            api_key: DEFAULT_ADMIN_API_KEY.to_string(),
            request_timeout_secs: 10,
        }
    }
}

impl AdminConfig {
    /// True while `api_key` is still the shipped placeholder or empty.
    pub fn has_placeholder_key(&self) -> bool {
        self.api_key.is_empty() || self.api_key == DEFAULT_ADMIN_API_KEY
    }
}

/// A dependency probed periodically by the daemon.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProbeConfig {
    /// Probe identifier for logging.
    pub name: String,

    /// URL fetched with GET.
    pub url: String,

    /// Retry policy and breaker name the probe runs under.
    #[serde(default = "default_probe_policy")]
    pub policy: String,

    /// Seconds between probe rounds.
    #[serde(default = "default_probe_interval")]
    pub interval_secs: u64,
}

fn default_probe_policy() -> String {
    DEFAULT_POLICY.to_string()
}

fn default_probe_interval() -> u64 {
    30
}
