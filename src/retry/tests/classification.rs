use super::super::*;
use crate::task_manager::BoxError;
use std::io;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
#[error("failed to load profile")]
struct ProfileError(#[source] io::Error);

#[tokio::test]
async fn test_classify_elapsed_as_timeout() {
    let elapsed = tokio::time::timeout(Duration::from_millis(1), std::future::pending::<()>())
        .await
        .unwrap_err();
    assert_eq!(classify(&elapsed, &RetryConfig::default()), ErrorKind::Timeout);
}

#[test]
fn test_classify_io_errors() {
    let config = RetryConfig::default();
    let cases = [
        (io::ErrorKind::ConnectionRefused, ErrorKind::NetworkError),
        (io::ErrorKind::ConnectionReset, ErrorKind::NetworkError),
        (io::ErrorKind::BrokenPipe, ErrorKind::NetworkError),
        (io::ErrorKind::TimedOut, ErrorKind::Timeout),
        (io::ErrorKind::Interrupted, ErrorKind::TemporaryFailure),
    ];

    for (io_kind, expected) in cases {
        let err = io::Error::new(io_kind, "boom");
        assert_eq!(classify(&err, &config), expected, "io kind {io_kind:?}");
    }
}

#[test]
fn test_classify_walks_source_chain() {
    let config = RetryConfig::default();
    let err = ProfileError(io::Error::new(io::ErrorKind::ConnectionReset, "peer reset"));
    assert_eq!(classify(&err, &config), ErrorKind::NetworkError);

    // untyped io errors fall back to keywords across the whole chain
    let err = ProfileError(io::Error::other("database connection lost"));
    assert_eq!(classify(&err, &config), ErrorKind::DatabaseConnection);
}

#[test]
fn test_classify_status_codes() {
    let config = RetryConfig::default();
    let cases = [
        (429, ErrorKind::RateLimit),
        (503, ErrorKind::ServiceUnavailable),
        (504, ErrorKind::Timeout),
        (408, ErrorKind::Timeout),
        (500, ErrorKind::TemporaryFailure),
        (502, ErrorKind::TemporaryFailure),
        (404, ErrorKind::NotRetryable),
        (400, ErrorKind::NotRetryable),
    ];

    for (status, expected) in cases {
        let err = StatusError::new(status, "upstream said no");
        assert_eq!(classify(&err, &config), expected, "status {status}");
    }
}

#[test]
fn test_status_codes_respect_config() {
    let config = RetryConfig::default().with_retryable_status_codes([503]);
    assert_eq!(
        classify(&StatusError::new(429, "slow down"), &config),
        ErrorKind::NotRetryable
    );
    assert_eq!(
        classify(&StatusError::new(503, "busy"), &config),
        ErrorKind::ServiceUnavailable
    );
}

#[test]
fn test_classify_keyword_fallback() {
    let config = RetryConfig::default();
    let cases = [
        ("Rate limit exceeded", ErrorKind::RateLimit),
        ("429 Too Many Requests", ErrorKind::RateLimit),
        ("request timed out", ErrorKind::Timeout),
        ("Timeout while reading body", ErrorKind::Timeout),
        ("HTTP 503", ErrorKind::ServiceUnavailable),
        ("Service Unavailable", ErrorKind::ServiceUnavailable),
        ("database is locked", ErrorKind::DatabaseConnection),
        ("connection pool exhausted", ErrorKind::DatabaseConnection),
        ("network unreachable", ErrorKind::NetworkError),
        ("temporarily overloaded", ErrorKind::TemporaryFailure),
        ("invalid input", ErrorKind::NotRetryable),
    ];

    for (message, expected) in cases {
        let err: BoxError = message.into();
        assert_eq!(classify(err.as_ref(), &config), expected, "message {message:?}");
    }
}

#[test]
fn test_retryable_set_per_preset() {
    let default = RetryConfig::default();
    for kind in ErrorKind::RETRYABLE {
        assert!(default.is_retryable(kind));
    }
    assert!(!default.is_retryable(ErrorKind::NotRetryable));

    let database = RetryConfig::database();
    assert!(database.is_retryable(ErrorKind::DatabaseConnection));
    assert!(!database.is_retryable(ErrorKind::RateLimit));

    let ml = RetryConfig::ml();
    assert_eq!(ml.max_attempts, 2);
    assert!(!ml.is_retryable(ErrorKind::DatabaseConnection));

    let api = RetryConfig::api();
    assert_eq!(api.max_attempts, 3);
    assert_eq!(api.rate_limit_multiplier, 5.0);
}

#[test]
fn test_error_kind_names() {
    assert_eq!(ErrorKind::RateLimit.to_string(), "rate_limit");
    assert_eq!(
        serde_json::to_string(&ErrorKind::DatabaseConnection).unwrap(),
        "\"database_connection\""
    );
}
