use std::collections::HashMap;
use std::time::Duration;

use serde::Serialize;

use crate::retry::classify::ErrorKind;

/// Process-wide retry counters, read through `Retrier::stats`
#[derive(Debug, Clone, Default, Serialize)]
pub struct RetryStats {
    pub total_attempts: u64,
    /// Invocations that succeeded on a second or later attempt
    pub successful_retries: u64,
    /// Invocations that exhausted every attempt on retryable errors
    pub failed_after_retries: u64,
    pub circuit_open_rejections: u64,
    pub total_delay: Duration,
    pub errors_by_kind: HashMap<ErrorKind, u64>,
}

impl RetryStats {
    pub fn errors_of(&self, kind: ErrorKind) -> u64 {
        self.errors_by_kind.get(&kind).copied().unwrap_or(0)
    }
}
