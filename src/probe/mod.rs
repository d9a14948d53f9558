//! Dependency probing.
//!
//! # Data Flow
//! ```text
//! ProbeMonitor (active.rs):
//!     interval tick per probe
//!     → Resilience::execute(probe.policy, GET url)
//!     → breaker + stats updated like any other call
//! ```

pub mod active;

pub use active::{ProbeError, ProbeMonitor};
