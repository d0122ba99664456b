// Retry Module - bounded retries with backoff and per-operation circuit breakers
//
// - Error classification by typed inspection with keyword fallback
// - Exponential backoff with jitter, longer delays for rate limits
// - Circuit breaker keyed by operation name
// - Retry statistics for observability
// - A tower layer applying the same contract to any cloneable-request service

pub mod backoff;
pub mod circuit_breaker;
pub mod classify;
pub mod config;
pub mod error;
pub mod layer;
pub mod retrier;
pub mod stats;

pub use backoff::{base_delay, calculate_delay};
pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitSnapshot, CircuitState};
pub use classify::{ErrorKind, StatusError, classify};
pub use config::RetryConfig;
pub use error::{CircuitOpenError, RetryError};
pub use layer::{RetryLayer, RetryService};
pub use retrier::{RetryWrapped, Retrier};
pub use stats::RetryStats;

#[cfg(test)]
mod tests;
