use std::error::Error;

use serde::{Deserialize, Serialize};

use crate::retry::config::RetryConfig;

/// Failure classes used to decide whether an error is worth retrying
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NetworkError,
    Timeout,
    RateLimit,
    ServiceUnavailable,
    DatabaseConnection,
    TemporaryFailure,
    NotRetryable,
}

impl ErrorKind {
    pub const RETRYABLE: [ErrorKind; 6] = [
        ErrorKind::NetworkError,
        ErrorKind::Timeout,
        ErrorKind::RateLimit,
        ErrorKind::ServiceUnavailable,
        ErrorKind::DatabaseConnection,
        ErrorKind::TemporaryFailure,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::NetworkError => "network_error",
            ErrorKind::Timeout => "timeout",
            ErrorKind::RateLimit => "rate_limit",
            ErrorKind::ServiceUnavailable => "service_unavailable",
            ErrorKind::DatabaseConnection => "database_connection",
            ErrorKind::TemporaryFailure => "temporary_failure",
            ErrorKind::NotRetryable => "not_retryable",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error carrying an HTTP-like status code, for callers that talk to
/// services through clients other than reqwest
#[derive(Debug, Clone, thiserror::Error)]
#[error("request failed with status {status}: {message}")]
pub struct StatusError {
    pub status: u16,
    pub message: String,
}

impl StatusError {
    pub fn new(status: u16, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

/// Classify an error. Typed errors anywhere in the source chain win over
/// keyword matching on the rendered messages.
pub fn classify(error: &(dyn Error + 'static), config: &RetryConfig) -> ErrorKind {
    let mut current = Some(error);
    let mut messages = Vec::new();

    while let Some(err) = current {
        if let Some(kind) = classify_typed(err, config) {
            return kind;
        }
        messages.push(err.to_string());
        current = err.source();
    }

    classify_message(&messages.join(": "))
}

fn classify_typed(error: &(dyn Error + 'static), config: &RetryConfig) -> Option<ErrorKind> {
    if error.is::<tokio::time::error::Elapsed>() {
        return Some(ErrorKind::Timeout);
    }

    if let Some(io) = error.downcast_ref::<std::io::Error>() {
        use std::io::ErrorKind as Io;
        return match io.kind() {
            Io::TimedOut => Some(ErrorKind::Timeout),
            Io::ConnectionRefused
            | Io::ConnectionReset
            | Io::ConnectionAborted
            | Io::NotConnected
            | Io::BrokenPipe
            | Io::AddrNotAvailable
            | Io::HostUnreachable
            | Io::NetworkUnreachable
            | Io::NetworkDown => Some(ErrorKind::NetworkError),
            Io::WouldBlock | Io::Interrupted => Some(ErrorKind::TemporaryFailure),
            _ => None,
        };
    }

    if let Some(status) = error.downcast_ref::<StatusError>() {
        return Some(classify_status(status.status, config));
    }

    if let Some(http) = error.downcast_ref::<reqwest::Error>() {
        if http.is_timeout() {
            return Some(ErrorKind::Timeout);
        }
        if http.is_connect() {
            return Some(ErrorKind::NetworkError);
        }
        if let Some(status) = http.status() {
            return Some(classify_status(status.as_u16(), config));
        }
    }

    None
}

/// Map a status code to its error class
pub fn classify_status(status: u16, config: &RetryConfig) -> ErrorKind {
    if !config.retryable_status_codes.contains(&status) {
        return ErrorKind::NotRetryable;
    }

    match status {
        429 => ErrorKind::RateLimit,
        503 => ErrorKind::ServiceUnavailable,
        408 | 504 => ErrorKind::Timeout,
        _ => ErrorKind::TemporaryFailure,
    }
}

/// Keyword fallback for errors with no recognizable type
pub fn classify_message(message: &str) -> ErrorKind {
    let message = message.to_lowercase();

    if message.contains("rate limit") || message.contains("too many requests") {
        ErrorKind::RateLimit
    } else if message.contains("timeout") || message.contains("timed out") {
        ErrorKind::Timeout
    } else if message.contains("503") || message.contains("unavailable") {
        ErrorKind::ServiceUnavailable
    } else if message.contains("database") || message.contains("connection") {
        ErrorKind::DatabaseConnection
    } else if message.contains("network") {
        ErrorKind::NetworkError
    } else if message.contains("temporar") || message.contains("try again") {
        ErrorKind::TemporaryFailure
    } else {
        ErrorKind::NotRetryable
    }
}
