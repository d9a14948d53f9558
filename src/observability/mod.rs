//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Executor and breakers produce:
//!     → logging.rs (structured log events)
//!     → metrics.rs (counters, gauges)
//!
//! Consumers:
//!     → Log aggregation (stdout)
//!     → Metrics endpoint (Prometheus scrape)
//!     → Admin API snapshots (see admin/)
//! ```
//!
//! # Design Decisions
//! - Structured logging (JSON) for machine parsing
//! - Metrics are cheap (atomic increments)

pub mod logging;
pub mod metrics;
