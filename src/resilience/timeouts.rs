//! Timeout enforcement.
//!
//! # Design Decisions
//! - Uses Tokio's timeout facilities; the losing future is dropped
//! - No limit means the operation runs to completion
//! - Timeout errors are distinct from operation errors

use std::future::Future;
use std::time::Duration;

/// Race `operation` against `limit`. Returns `Err(limit)` when the timer wins.
pub async fn race<F>(limit: Option<Duration>, operation: F) -> Result<F::Output, Duration>
where
    F: Future,
{
    match limit {
        Some(limit) => tokio::time::timeout(limit, operation)
            .await
            .map_err(|_| limit),
        None => Ok(operation.await),
    }
}
