use std::time::Duration;

use crate::task_manager::BoxError;

/// Returned without invoking the operation while its circuit is open
#[derive(Debug, Clone, thiserror::Error)]
#[error("circuit breaker open for '{operation}', retry after {retry_after:?}")]
pub struct CircuitOpenError {
    pub operation: String,
    pub retry_after: Duration,
}

#[derive(Debug, thiserror::Error)]
pub enum RetryError {
    #[error(transparent)]
    CircuitOpen(#[from] CircuitOpenError),

    /// The operation's own error from its final attempt, unchanged
    #[error(transparent)]
    Operation(BoxError),
}

impl RetryError {
    pub fn is_circuit_open(&self) -> bool {
        matches!(self, RetryError::CircuitOpen(_))
    }

    /// The original operation error, if the operation ran
    pub fn operation_error(&self) -> Option<&(dyn std::error::Error + Send + Sync + 'static)> {
        match self {
            RetryError::Operation(error) => Some(error.as_ref()),
            RetryError::CircuitOpen(_) => None,
        }
    }

    pub fn into_source(self) -> BoxError {
        match self {
            RetryError::Operation(error) => error,
            RetryError::CircuitOpen(error) => Box::new(error),
        }
    }
}
