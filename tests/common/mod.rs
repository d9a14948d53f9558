//! Shared utilities for integration and load testing.

#![allow(dead_code)]

use std::fmt;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use resilience_core::config::{BreakerConfig, ResilienceConfig, RetryConfig};
use resilience_core::resilience::{Classify, FixedJitter};
use resilience_core::Resilience;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

/// A canned HTTP reply from the mock backend.
pub struct MockReply {
    pub status: u16,
    pub body: String,
    pub retry_after_secs: Option<u64>,
}

impl MockReply {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
            retry_after_secs: None,
        }
    }

    pub fn retry_after(mut self, secs: u64) -> Self {
        self.retry_after_secs = Some(secs);
        self
    }
}

/// Start a programmable mock backend on an ephemeral port.
pub async fn start_programmable_backend<F, Fut>(f: F) -> SocketAddr
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = MockReply> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let f = Arc::new(f);

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((mut socket, _)) => {
                    let f = f.clone();
                    tokio::spawn(async move {
                        // Drain the request head before answering.
                        let mut buf = [0u8; 1024];
                        let _ = socket.read(&mut buf).await;

                        let reply = f().await;
                        let status_text = match reply.status {
                            200 => "200 OK",
                            404 => "404 Not Found",
                            429 => "429 Too Many Requests",
                            500 => "500 Internal Server Error",
                            502 => "502 Bad Gateway",
                            503 => "503 Service Unavailable",
                            _ => "200 OK",
                        };
                        let retry_after = reply
                            .retry_after_secs
                            .map(|s| format!("Retry-After: {s}\r\n"))
                            .unwrap_or_default();

                        let response_str = format!(
                            "HTTP/1.1 {}\r\n{}Content-Length: {}\r\nConnection: close\r\n\r\n{}",
                            status_text,
                            retry_after,
                            reply.body.len(),
                            reply.body
                        );
                        let _ = socket.write_all(response_str.as_bytes()).await;
                        let _ = socket.shutdown().await;
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    });
                }
                Err(_) => break,
            }
        }
    });

    addr
}

/// An address nothing listens on.
pub async fn unused_addr() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap()
}

/// Retry policy with no jitter, suitable for timing assertions.
pub fn policy(max_attempts: u32, base_delay_ms: u64, backoff_factor: f64) -> RetryConfig {
    RetryConfig {
        max_attempts,
        base_delay_ms,
        max_delay_ms: 30_000,
        backoff_factor,
        jitter_factor: 0.0,
        timeout_ms: None,
    }
}

/// Breaker settings that never trip during a test.
pub fn lenient_breaker() -> BreakerConfig {
    BreakerConfig {
        failure_threshold: 1_000,
        ..BreakerConfig::default()
    }
}

/// A fresh instance with `policies` installed and zero jitter.
pub fn resilience_with(policies: &[(&str, RetryConfig)], breakers: &[(&str, BreakerConfig)]) -> Arc<Resilience> {
    let mut config = ResilienceConfig::default();
    for (name, retry) in policies {
        config.policies.insert(name.to_string(), retry.clone());
    }
    for (name, breaker) in breakers {
        config.breakers.insert(name.to_string(), breaker.clone());
    }
    Arc::new(Resilience::new(config).with_jitter(Arc::new(FixedJitter(0.0))))
}

/// Test failure with an optional status code and retry hint.
#[derive(Debug, Clone, PartialEq)]
pub struct TestError {
    pub status: Option<u16>,
    pub retry_after: Option<Duration>,
    pub message: String,
}

impl TestError {
    pub fn transient(message: &str) -> Self {
        Self {
            status: None,
            retry_after: None,
            message: message.to_string(),
        }
    }

    pub fn status(status: u16, message: &str) -> Self {
        Self {
            status: Some(status),
            retry_after: None,
            message: message.to_string(),
        }
    }

    pub fn rate_limited(hint: Duration) -> Self {
        Self {
            status: Some(429),
            retry_after: Some(hint),
            message: "slow down".to_string(),
        }
    }
}

impl fmt::Display for TestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl Classify for TestError {
    fn status(&self) -> Option<u16> {
        self.status
    }

    fn retry_after(&self) -> Option<Duration> {
        self.retry_after
    }
}
