//! Health reporting subsystem.
//!
//! # Data Flow
//! ```text
//! Executor outcome (stats.rs):
//!     execute() finishes
//!     → record_call exactly once
//!     → counters + error-type histogram
//!
//! Health evaluation (report.rs):
//!     stats snapshot + breaker statuses
//!     → failure rate, retry rate, open breakers
//!     → HealthReport listing each issue
//! ```
//!
//! # Design Decisions
//! - Health is derived on demand, never stored
//! - Snapshots are side-effect free
//! - Counters live in memory only and start over on restart

pub mod report;
pub mod stats;

pub use report::{evaluate, HealthIssue, HealthReport};
pub use stats::{ErrorStats, StatsCollector};
