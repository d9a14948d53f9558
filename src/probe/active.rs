//! Active dependency probing.
//!
//! # Responsibilities
//! - Periodically GET each configured dependency URL
//! - Run every probe under its resilience policy so failures feed the
//!   breakers and statistics the admin API reports

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use reqwest::header::RETRY_AFTER;
use thiserror::Error;
use tokio::sync::broadcast;
use tokio::task::JoinSet;
use tokio::time;

use crate::config::ProbeConfig;
use crate::resilience::classifier::Classify;
use crate::resilience::error::ExecuteError;
use crate::resilience::Resilience;

/// A probe attempt that did not produce a 2xx response.
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("probe returned HTTP {status}")]
    Status {
        status: u16,
        retry_after: Option<Duration>,
    },

    #[error("probe request failed: {0}")]
    Http(#[from] reqwest::Error),
}

impl Classify for ProbeError {
    fn status(&self) -> Option<u16> {
        match self {
            ProbeError::Status { status, .. } => Some(*status),
            ProbeError::Http(e) => Classify::status(e),
        }
    }

    fn code(&self) -> Option<&str> {
        match self {
            ProbeError::Status { .. } => None,
            ProbeError::Http(e) => Classify::code(e),
        }
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            ProbeError::Status { retry_after, .. } => *retry_after,
            ProbeError::Http(_) => None,
        }
    }
}

/// `Retry-After` in delta-seconds form. HTTP-date values are ignored.
pub fn parse_retry_after(headers: &reqwest::header::HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

#[derive(Clone)]
pub struct ProbeMonitor {
    resilience: Arc<Resilience>,
    client: reqwest::Client,
    probes: Vec<ProbeConfig>,
}

impl fmt::Debug for ProbeMonitor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProbeMonitor")
            .field("probes", &self.probes.len())
            .finish_non_exhaustive()
    }
}

impl ProbeMonitor {
    pub fn new(resilience: Arc<Resilience>, probes: Vec<ProbeConfig>) -> Self {
        let client = reqwest::Client::builder()
            .user_agent(concat!("resilience-core-probe/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_default();
        Self {
            resilience,
            client,
            probes,
        }
    }

    /// Probe every dependency on its own interval until `shutdown` fires.
    pub async fn run(self, shutdown: broadcast::Receiver<()>) {
        if self.probes.is_empty() {
            tracing::info!("No probes configured");
            return;
        }

        tracing::info!(probes = self.probes.len(), "Probe monitor starting");

        let mut tasks = JoinSet::new();
        for probe in self.probes.clone() {
            let monitor = self.clone();
            let mut shutdown = shutdown.resubscribe();
            tasks.spawn(async move {
                let mut ticker = time::interval(Duration::from_secs(probe.interval_secs.max(1)));
                ticker.set_missed_tick_behavior(time::MissedTickBehavior::Delay);
                loop {
                    tokio::select! {
                        _ = ticker.tick() => {
                            let _ = monitor.probe_once(&probe).await;
                        }
                        _ = shutdown.recv() => break,
                    }
                }
            });
        }

        while tasks.join_next().await.is_some() {}
        tracing::info!("Probe monitor stopped");
    }

    /// One probe round: GET the URL under the probe's policy.
    ///
    /// Returns the final status code on success.
    pub async fn probe_once(&self, probe: &ProbeConfig) -> Result<u16, ExecuteError<ProbeError>> {
        let result = self
            .resilience
            .execute(&probe.policy, || async move {
                let response = self.client.get(&probe.url).send().await?;
                let status = response.status();
                if status.is_success() {
                    Ok::<_, ProbeError>(status.as_u16())
                } else {
                    Err(ProbeError::Status {
                        status: status.as_u16(),
                        retry_after: parse_retry_after(response.headers()),
                    })
                }
            })
            .await;

        match &result {
            Ok(status) => {
                tracing::debug!(probe = %probe.name, status, "Probe succeeded");
            }
            Err(e) => {
                tracing::warn!(probe = %probe.name, url = %probe.url, error = %e, "Probe failed");
            }
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resilience::classifier::{classify, ErrorSeverity};
    use reqwest::header::{HeaderMap, HeaderValue};

    #[test]
    fn test_parse_retry_after_seconds() {
        let mut headers = HeaderMap::new();
        headers.insert(RETRY_AFTER, HeaderValue::from_static("7"));
        assert_eq!(parse_retry_after(&headers), Some(Duration::from_secs(7)));

        headers.insert(RETRY_AFTER, HeaderValue::from_static("Wed, 21 Oct 2015 07:28:00 GMT"));
        assert_eq!(parse_retry_after(&headers), None);

        assert_eq!(parse_retry_after(&HeaderMap::new()), None);
    }

    #[test]
    fn test_status_errors_classify_by_code() {
        let limited = ProbeError::Status {
            status: 429,
            retry_after: Some(Duration::from_secs(2)),
        };
        assert_eq!(classify(&limited), ErrorSeverity::RateLimited);
        assert_eq!(limited.retry_after(), Some(Duration::from_secs(2)));

        let down = ProbeError::Status {
            status: 503,
            retry_after: None,
        };
        assert_eq!(classify(&down), ErrorSeverity::ResourceUnavailable);
        assert_eq!(down.error_type(), "http_503");

        let missing = ProbeError::Status {
            status: 404,
            retry_after: None,
        };
        assert_eq!(classify(&missing), ErrorSeverity::Permanent);
    }
}
