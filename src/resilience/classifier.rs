//! Failure classification.
//!
//! # Responsibilities
//! - Map a failure (status, code, retry hint, message) to an [`ErrorSeverity`]
//! - Decide whether a severity is worth retrying
//!
//! # Rules (first match wins)
//! ```text
//! unknown entity / 404          → PERMANENT
//! 401 / 403 / missing access    → PERMANENT
//! 400 (except 50035)            → PERMANENT
//! 429 / rate limit marker       → RATE_LIMITED
//! 5xx                           → RESOURCE_UNAVAILABLE
//! timeout / reset / refused ... → RESOURCE_UNAVAILABLE
//! type mismatch / null deref    → CRITICAL
//! anything else                 → TRANSIENT
//! ```

use std::fmt;
use std::io;
use std::time::Duration;

use serde::Serialize;

/// Chat platform code for an invalid form body. The request can succeed once
/// the payload shape is corrected, so it is not treated as a plain bad request.
pub const MALFORMED_PAYLOAD_CODE: &str = "50035";

/// Chat platform "Unknown <entity>" codes.
const UNKNOWN_ENTITY_CODES: &[&str] = &[
    "10003", "10004", "10007", "10008", "10011", "10013", "10014", "10015", "10062", "ENOENT",
];

/// Chat platform "Missing Access" / "Missing Permissions" plus OS permission codes.
const FORBIDDEN_CODES: &[&str] = &["50001", "50013", "EACCES", "EPERM"];

const RATE_LIMIT_CODES: &[&str] = &["RATE_LIMITED", "429"];

const NETWORK_CODES: &[&str] = &[
    "ETIMEDOUT",
    "ECONNRESET",
    "ECONNREFUSED",
    "ECONNABORTED",
    "ENOTFOUND",
    "EAI_AGAIN",
    "EPIPE",
    "ENOTCONN",
    "EHOSTUNREACH",
    "ENETUNREACH",
    "ABORT_ERR",
    "TIMEOUT",
    "CIRCUIT_OPEN",
];

const NETWORK_MESSAGES: &[&str] = &[
    "timed out",
    "timeout",
    "connection reset",
    "connection refused",
    "connection closed",
    "connection aborted",
    "socket hang up",
    "broken pipe",
    "dns",
    "getaddrinfo",
    "session closed",
    "transport closed",
    "websocket closed",
];

const DEFECT_CODES: &[&str] = &["TYPE_ERROR", "REFERENCE_ERROR", "DECODE_ERROR"];

const DEFECT_MESSAGES: &[&str] = &[
    "cannot read properties of undefined",
    "cannot read properties of null",
    "is not a function",
    "is not defined",
    "type mismatch",
    "invalid type",
    "null pointer",
];

/// Severity category of a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorSeverity {
    /// Unknown cause; a retry may help.
    Transient,
    /// The dependency asked us to slow down.
    RateLimited,
    /// Retrying cannot change the outcome.
    Permanent,
    /// The dependency is unreachable or failing.
    ResourceUnavailable,
    /// A defect in our own code.
    Critical,
}

impl ErrorSeverity {
    pub fn is_retryable(self) -> bool {
        matches!(
            self,
            ErrorSeverity::Transient | ErrorSeverity::RateLimited | ErrorSeverity::ResourceUnavailable
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ErrorSeverity::Transient => "TRANSIENT",
            ErrorSeverity::RateLimited => "RATE_LIMITED",
            ErrorSeverity::Permanent => "PERMANENT",
            ErrorSeverity::ResourceUnavailable => "RESOURCE_UNAVAILABLE",
            ErrorSeverity::Critical => "CRITICAL",
        }
    }
}

impl fmt::Display for ErrorSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Signals a failure exposes to the classifier.
///
/// Only `Display` is required; everything else defaults to "not present".
pub trait Classify: fmt::Display {
    /// Numeric HTTP-like status.
    fn status(&self) -> Option<u16> {
        None
    }

    /// Transport or platform code, e.g. `ECONNRESET` or `10008`.
    fn code(&self) -> Option<&str> {
        None
    }

    /// Explicit "retry after" hint from the dependency.
    fn retry_after(&self) -> Option<Duration> {
        None
    }

    /// Label for the error-type histogram.
    fn error_type(&self) -> String {
        if let Some(code) = self.code() {
            code.to_string()
        } else if let Some(status) = self.status() {
            format!("http_{status}")
        } else {
            "unknown".to_string()
        }
    }
}

/// Classify a failure.
pub fn classify<E: Classify + ?Sized>(error: &E) -> ErrorSeverity {
    let status = error.status();
    let code = error.code();
    let message = error.to_string().to_lowercase();

    let code_in = |table: &[&str]| code.is_some_and(|c| table.iter().any(|t| t.eq_ignore_ascii_case(c)));
    let message_has = |table: &[&str]| table.iter().any(|needle| message.contains(needle));

    if status == Some(404) || code_in(UNKNOWN_ENTITY_CODES) || mentions_unknown_entity(&message) {
        return ErrorSeverity::Permanent;
    }

    if matches!(status, Some(401) | Some(403))
        || code_in(FORBIDDEN_CODES)
        || message_has(&["forbidden", "missing permissions", "missing access", "unauthorized"])
    {
        return ErrorSeverity::Permanent;
    }

    let malformed_payload = code == Some(MALFORMED_PAYLOAD_CODE);
    if !malformed_payload && (status == Some(400) || message.contains("bad request")) {
        return ErrorSeverity::Permanent;
    }

    if status == Some(429)
        || code_in(RATE_LIMIT_CODES)
        || message_has(&["rate limit", "too many requests"])
    {
        return ErrorSeverity::RateLimited;
    }

    if status.is_some_and(|s| (500..=599).contains(&s)) {
        return ErrorSeverity::ResourceUnavailable;
    }

    if code_in(NETWORK_CODES) || message_has(NETWORK_MESSAGES) {
        return ErrorSeverity::ResourceUnavailable;
    }

    if code_in(DEFECT_CODES) || message_has(DEFECT_MESSAGES) {
        return ErrorSeverity::Critical;
    }

    ErrorSeverity::Transient
}

fn mentions_unknown_entity(message: &str) -> bool {
    const ENTITIES: &[&str] = &[
        "channel", "guild", "member", "message", "role", "user", "interaction", "webhook", "emoji",
    ];
    // "unknown <entity>" or "<entity> not found"; a bare "not found" (DNS, files) does not count.
    let unknown = message.match_indices("unknown ").any(|(idx, m)| {
        let rest = &message[idx + m.len()..];
        ENTITIES.iter().any(|entity| rest.starts_with(entity))
    });
    unknown
        || message.match_indices(" not found").any(|(idx, _)| {
            let before = &message[..idx];
            ENTITIES.iter().any(|entity| before.ends_with(entity))
        })
}

impl Classify for io::Error {
    fn code(&self) -> Option<&str> {
        let code = match self.kind() {
            io::ErrorKind::TimedOut => "ETIMEDOUT",
            io::ErrorKind::ConnectionReset => "ECONNRESET",
            io::ErrorKind::ConnectionRefused => "ECONNREFUSED",
            io::ErrorKind::ConnectionAborted => "ECONNABORTED",
            io::ErrorKind::BrokenPipe => "EPIPE",
            io::ErrorKind::NotConnected => "ENOTCONN",
            io::ErrorKind::NotFound => "ENOENT",
            io::ErrorKind::PermissionDenied => "EACCES",
            io::ErrorKind::InvalidData => "DECODE_ERROR",
            _ => return None,
        };
        Some(code)
    }
}

impl Classify for reqwest::Error {
    fn status(&self) -> Option<u16> {
        reqwest::Error::status(self).map(|s| s.as_u16())
    }

    fn code(&self) -> Option<&str> {
        if self.is_timeout() {
            Some("ETIMEDOUT")
        } else if self.is_connect() {
            Some("ECONNREFUSED")
        } else if self.is_decode() {
            Some("DECODE_ERROR")
        } else {
            None
        }
    }
}
