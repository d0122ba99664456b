use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::task_manager::error::TaskManagerError;
use crate::task_manager::logging::{CorrelationId, panic_message};
use crate::task_manager::types::TaskOutcome;

/// Caller-side handle to a task scheduled through a `TaskManager`.
///
/// Dropping the handle does not cancel the task; the manager keeps tracking it.
#[derive(Debug)]
pub struct TaskHandle<T> {
    name: String,
    correlation_id: CorrelationId,
    token: CancellationToken,
    join_handle: JoinHandle<Result<T, TaskOutcome>>,
}

impl<T> TaskHandle<T> {
    pub(crate) fn new(
        name: String,
        correlation_id: CorrelationId,
        token: CancellationToken,
        join_handle: JoinHandle<Result<T, TaskOutcome>>,
    ) -> Self {
        Self {
            name,
            correlation_id,
            token,
            join_handle,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn correlation_id(&self) -> CorrelationId {
        self.correlation_id
    }

    /// Request cooperative cancellation without waiting
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn is_finished(&self) -> bool {
        self.join_handle.is_finished()
    }

    /// Wait for the task and return its value.
    ///
    /// Failures, panics and cancellations surface as `TaskDidNotComplete`
    /// carrying the recorded outcome.
    pub async fn join(self) -> Result<T, TaskManagerError> {
        let outcome = match self.join_handle.await {
            Ok(Ok(value)) => return Ok(value),
            Ok(Err(outcome)) => outcome,
            Err(e) if e.is_cancelled() => TaskOutcome::Abandoned,
            Err(e) => TaskOutcome::Panicked {
                message: panic_message(e.into_panic().as_ref()),
            },
        };

        Err(TaskManagerError::TaskDidNotComplete {
            name: self.name,
            outcome,
        })
    }
}
