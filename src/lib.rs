//! Resilience core: error classification, retry with backoff, circuit
//! breaking and error statistics for calls to unreliable dependencies.

pub mod admin;
pub mod config;
pub mod health;
pub mod lifecycle;
pub mod observability;
pub mod probe;
pub mod resilience;

pub use config::ResilienceConfig;
pub use health::{ErrorStats, HealthReport};
pub use lifecycle::Shutdown;
pub use resilience::{Classify, ErrorSeverity, ExecuteError, Resilience};
