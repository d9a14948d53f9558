//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → ResilienceConfig (validated, immutable)
//!     → Resilience::apply_config (policies swapped atomically)
//!
//! On file change:
//!     watcher.rs detects change
//!     → loader.rs loads new config
//!     → validation.rs validates
//!     → apply_updates swaps presets, reconfigures live breakers
//! ```
//!
//! # Design Decisions
//! - Retry and breaker presets are data, overridable per name
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use schema::{
    AdminConfig, BreakerConfig, HealthConfig, LogFormat, ObservabilityConfig, ProbeConfig,
    ResilienceConfig, RetryConfig, RetryOverrides,
};
pub use schema::{
    CHAT_API_POLICY, CRITICAL_POLICY, DATABASE_POLICY, DEFAULT_ADMIN_API_KEY, DEFAULT_POLICY,
};
