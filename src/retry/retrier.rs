use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::retry::backoff::calculate_delay;
use crate::retry::circuit_breaker::{
    CircuitBreaker, CircuitBreakerConfig, CircuitSnapshot, CircuitState,
};
use crate::retry::classify::classify;
use crate::retry::config::RetryConfig;
use crate::retry::error::{CircuitOpenError, RetryError};
use crate::retry::stats::RetryStats;
use crate::task_manager::BoxError;

struct RetrierInner {
    breaker_config: CircuitBreakerConfig,
    breakers: Mutex<HashMap<String, CircuitBreaker>>,
    stats: Mutex<RetryStats>,
}

/// Runs fallible async operations with bounded retries.
///
/// Owns one circuit breaker per operation name; two different names never
/// share breaker state. Cloning shares breakers and statistics.
#[derive(Clone)]
pub struct Retrier {
    inner: Arc<RetrierInner>,
}

impl Default for Retrier {
    fn default() -> Self {
        Self::new(CircuitBreakerConfig::default())
    }
}

impl std::fmt::Debug for Retrier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Retrier")
            .field("breaker_config", &self.inner.breaker_config)
            .field("breakers", &self.inner.breakers.lock().len())
            .finish()
    }
}

impl Retrier {
    pub fn new(breaker_config: CircuitBreakerConfig) -> Self {
        Self {
            inner: Arc::new(RetrierInner {
                breaker_config,
                breakers: Mutex::new(HashMap::new()),
                stats: Mutex::new(RetryStats::default()),
            }),
        }
    }

    fn with_breaker<R>(&self, operation: &str, f: impl FnOnce(&mut CircuitBreaker) -> R) -> R {
        let mut breakers = self.inner.breakers.lock();
        let breaker = breakers
            .entry(operation.to_string())
            .or_insert_with(|| CircuitBreaker::new(self.inner.breaker_config.clone()));
        f(breaker)
    }

    fn admit(&self, operation: &str) -> Result<(), CircuitOpenError> {
        let rejected = self.with_breaker(operation, |breaker| {
            if breaker.can_execute() {
                None
            } else {
                Some(breaker.retry_after().unwrap_or(self.inner.breaker_config.cool_down))
            }
        });

        match rejected {
            None => Ok(()),
            Some(retry_after) => {
                self.inner.stats.lock().circuit_open_rejections += 1;
                tracing::warn!(
                    operation = %operation,
                    retry_after_ms = retry_after.as_millis() as u64,
                    "Circuit open, rejecting call"
                );
                Err(CircuitOpenError {
                    operation: operation.to_string(),
                    retry_after,
                })
            }
        }
    }

    /// Invoke `op` until it succeeds, fails with a non-retryable error, or
    /// `config.max_attempts` attempts have been made.
    ///
    /// The final error is the operation's own error, unchanged. While the
    /// operation's circuit is open the call fails with `CircuitOpen` without
    /// invoking `op`.
    pub async fn execute<T, F, Fut>(
        &self,
        operation: &str,
        config: &RetryConfig,
        mut op: F,
    ) -> Result<T, RetryError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, BoxError>>,
    {
        let max_attempts = config.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;
            self.admit(operation)?;
            self.inner.stats.lock().total_attempts += 1;

            let error = match op().await {
                Ok(value) => {
                    let closed = self.with_breaker(operation, CircuitBreaker::record_success);
                    if closed {
                        tracing::info!(operation = %operation, "Circuit closed after successful trials");
                    }
                    if attempt > 1 {
                        self.inner.stats.lock().successful_retries += 1;
                        tracing::info!(
                            operation = %operation,
                            attempt = attempt,
                            "Operation succeeded after retry"
                        );
                    }
                    return Ok(value);
                }
                Err(error) => error,
            };

            let kind = classify(error.as_ref(), config);
            let retryable = config.is_retryable(kind);
            let circuit = self.with_breaker(operation, |breaker| breaker.state());

            *self
                .inner
                .stats
                .lock()
                .errors_by_kind
                .entry(kind)
                .or_insert(0) += 1;

            if !retryable || attempt >= max_attempts || circuit != CircuitState::Closed {
                let opened = self.with_breaker(operation, CircuitBreaker::record_failure);
                if retryable && attempt >= max_attempts {
                    self.inner.stats.lock().failed_after_retries += 1;
                }

                tracing::warn!(
                    operation = %operation,
                    attempt = attempt,
                    max_attempts = max_attempts,
                    error_kind = %kind,
                    retryable = retryable,
                    circuit = %circuit,
                    error = %error,
                    "Operation failed, giving up"
                );
                if opened {
                    tracing::warn!(
                        operation = %operation,
                        cool_down_secs = self.inner.breaker_config.cool_down.as_secs(),
                        "Circuit opened"
                    );
                }
                return Err(RetryError::Operation(error));
            }

            let delay = calculate_delay(attempt, kind, config);
            self.inner.stats.lock().total_delay += delay;

            tracing::debug!(
                operation = %operation,
                attempt = attempt,
                error_kind = %kind,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "Operation failed, retrying"
            );

            tokio::time::sleep(delay).await;
        }
    }

    /// Bind an operation to a name and policy so it can be called repeatedly
    pub fn wrap<F>(&self, operation: impl Into<String>, config: RetryConfig, op: F) -> RetryWrapped<F> {
        RetryWrapped {
            retrier: self.clone(),
            operation: operation.into(),
            config,
            op,
        }
    }

    pub fn stats(&self) -> RetryStats {
        self.inner.stats.lock().clone()
    }

    pub fn reset_stats(&self) {
        *self.inner.stats.lock() = RetryStats::default();
    }

    /// State of the named operation's breaker, `Closed` if it has none yet
    pub fn circuit_state(&self, operation: &str) -> CircuitState {
        self.inner
            .breakers
            .lock()
            .get(operation)
            .map(CircuitBreaker::state)
            .unwrap_or(CircuitState::Closed)
    }

    pub fn circuit_states(&self) -> HashMap<String, CircuitSnapshot> {
        self.inner
            .breakers
            .lock()
            .iter()
            .map(|(name, breaker)| (name.clone(), breaker.snapshot()))
            .collect()
    }

    /// Force the named breaker closed. Returns false if it does not exist.
    pub fn reset_circuit(&self, operation: &str) -> bool {
        match self.inner.breakers.lock().get_mut(operation) {
            Some(breaker) => {
                breaker.reset();
                tracing::info!(operation = %operation, "Circuit reset");
                true
            }
            None => false,
        }
    }
}

/// An operation bound to a retrier, a name and a policy
pub struct RetryWrapped<F> {
    retrier: Retrier,
    operation: String,
    config: RetryConfig,
    op: F,
}

impl<F> RetryWrapped<F> {
    pub fn operation(&self) -> &str {
        &self.operation
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    pub async fn call<T, Fut>(&self) -> Result<T, RetryError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, BoxError>>,
    {
        self.retrier
            .execute(&self.operation, &self.config, &self.op)
            .await
    }
}
