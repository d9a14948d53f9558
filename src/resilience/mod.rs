//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Caller operation:
//!     → registry.rs (lookup-or-create breaker by policy name)
//!     → circuit_breaker.rs (may this attempt run?)
//!     → timeouts.rs (race attempt against its deadline)
//!     → On failure: classifier.rs (severity), backoff.rs (delay)
//!     → executor.rs (loop, stats, final error)
//! ```
//!
//! # Design Decisions
//! - One canonical breaker implementation, parameterized per resource name
//! - The caller's last error is returned as-is, never replaced by a
//!   "retries exhausted" wrapper
//! - Breaker rejections follow the normal backoff schedule
//! - Direct calls, bound policies and the tower layer share one code path

pub mod backoff;
pub mod circuit_breaker;
pub mod classifier;
pub mod error;
pub mod executor;
pub mod layer;
pub mod registry;
pub mod timeouts;

pub use backoff::{compute_delay, delay_for, FixedJitter, JitterSource, SequenceJitter, ThreadRngJitter};
pub use circuit_breaker::{BreakerStatus, CircuitBreaker, CircuitState};
pub use classifier::{classify, Classify, ErrorSeverity};
pub use error::ExecuteError;
pub use executor::{PolicyHandle, Resilience};
pub use layer::{ResilienceLayer, ResilienceService};
pub use registry::BreakerRegistry;
