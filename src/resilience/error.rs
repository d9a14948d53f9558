//! Errors surfaced by the executor.

use std::time::Duration;

use thiserror::Error;

use crate::resilience::circuit_breaker::CircuitState;
use crate::resilience::classifier::Classify;

/// Outcome of a failed `execute` call.
///
/// `Operation` holds the caller's last error exactly as the operation
/// returned it. The other variants are failures produced by the executor
/// itself for the final attempt.
#[derive(Debug, Error)]
pub enum ExecuteError<E> {
    #[error("{0}")]
    Operation(E),

    #[error("operation '{policy}' timed out after {}ms", .after.as_millis())]
    Timeout { policy: String, after: Duration },

    #[error("circuit breaker '{name}' is {state}, call rejected")]
    CircuitOpen { name: String, state: CircuitState },
}

impl<E> ExecuteError<E> {
    pub fn operation(&self) -> Option<&E> {
        match self {
            ExecuteError::Operation(e) => Some(e),
            _ => None,
        }
    }

    pub fn into_operation(self) -> Option<E> {
        match self {
            ExecuteError::Operation(e) => Some(e),
            _ => None,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, ExecuteError::Timeout { .. })
    }

    pub fn is_circuit_open(&self) -> bool {
        matches!(self, ExecuteError::CircuitOpen { .. })
    }
}

impl<E: Classify> Classify for ExecuteError<E> {
    fn status(&self) -> Option<u16> {
        self.operation().and_then(Classify::status)
    }

    fn code(&self) -> Option<&str> {
        match self {
            ExecuteError::Operation(e) => e.code(),
            ExecuteError::Timeout { .. } => Some("TIMEOUT"),
            ExecuteError::CircuitOpen { .. } => Some("CIRCUIT_OPEN"),
        }
    }

    fn retry_after(&self) -> Option<Duration> {
        self.operation().and_then(Classify::retry_after)
    }

    fn error_type(&self) -> String {
        match self {
            ExecuteError::Operation(e) => e.error_type(),
            ExecuteError::Timeout { .. } => "timeout".to_string(),
            ExecuteError::CircuitOpen { .. } => "circuit_open".to_string(),
        }
    }
}
