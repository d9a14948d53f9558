//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Load config → Logging/metrics → Resilience::init_global
//!     → Config watcher, probes, admin API
//!
//! Shutdown (shutdown.rs):
//!     Signal received → broadcast to tasks → drain with deadline → exit
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown
//! ```
//!
//! # Design Decisions
//! - Ordered startup: config first, then core, then listeners
//! - Shutdown has timeout: remaining tasks are aborted after the deadline

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::Shutdown;
