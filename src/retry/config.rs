use std::collections::HashSet;
use std::time::Duration;

use crate::retry::classify::ErrorKind;

/// Retry policy applied to one wrapped operation
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Total number of attempts including the first call
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub exponential_base: f64,
    pub jitter: bool,
    /// Jitter amplitude as a fraction of the computed delay (0.0-1.0)
    pub jitter_range: f64,
    /// Extra delay multiplier applied to rate-limited attempts
    pub rate_limit_multiplier: f64,
    pub retryable_errors: HashSet<ErrorKind>,
    pub retryable_status_codes: HashSet<u16>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            exponential_base: 2.0,
            jitter: true,
            jitter_range: 0.1,
            rate_limit_multiplier: 5.0,
            retryable_errors: ErrorKind::RETRYABLE.into_iter().collect(),
            retryable_status_codes: [408, 429, 500, 502, 503, 504].into_iter().collect(),
        }
    }
}

impl RetryConfig {
    /// Calls to external HTTP APIs
    pub fn api() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            ..Default::default()
        }
    }

    /// Database access; retries connection problems quickly and often
    pub fn database() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(10),
            retryable_errors: [
                ErrorKind::DatabaseConnection,
                ErrorKind::NetworkError,
                ErrorKind::Timeout,
                ErrorKind::TemporaryFailure,
            ]
            .into_iter()
            .collect(),
            ..Default::default()
        }
    }

    /// Model inference calls, which are slow and expensive to repeat
    pub fn ml() -> Self {
        Self {
            max_attempts: 2,
            initial_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(20),
            retryable_errors: [
                ErrorKind::Timeout,
                ErrorKind::ServiceUnavailable,
                ErrorKind::RateLimit,
                ErrorKind::TemporaryFailure,
            ]
            .into_iter()
            .collect(),
            ..Default::default()
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn with_initial_delay(mut self, initial_delay: Duration) -> Self {
        self.initial_delay = initial_delay;
        self
    }

    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    pub fn with_exponential_base(mut self, exponential_base: f64) -> Self {
        self.exponential_base = exponential_base;
        self
    }

    pub fn with_jitter_range(mut self, jitter_range: f64) -> Self {
        self.jitter = true;
        self.jitter_range = jitter_range;
        self
    }

    pub fn without_jitter(mut self) -> Self {
        self.jitter = false;
        self
    }

    pub fn with_retryable_errors(mut self, kinds: impl IntoIterator<Item = ErrorKind>) -> Self {
        self.retryable_errors = kinds.into_iter().collect();
        self
    }

    pub fn with_retryable_status_codes(mut self, codes: impl IntoIterator<Item = u16>) -> Self {
        self.retryable_status_codes = codes.into_iter().collect();
        self
    }

    pub fn is_retryable(&self, kind: ErrorKind) -> bool {
        kind != ErrorKind::NotRetryable && self.retryable_errors.contains(&kind)
    }
}
