use std::time::Duration;

use crate::task_manager::types::TaskOutcome;

/// Errors returned by task manager and registry operations
#[derive(Debug, thiserror::Error)]
pub enum TaskManagerError {
    #[error("task '{0}' not found")]
    TaskNotFound(String),

    #[error("task manager '{0}' is shut down and no longer accepts tasks")]
    AlreadyShutDown(String),

    #[error("a running task named '{0}' already exists")]
    DuplicateTask(String),

    #[error("timed out after {timeout:?} waiting for task '{name}'")]
    WaitTimeout { name: String, timeout: Duration },

    #[error("no tokio runtime available to schedule task '{0}'")]
    NoRuntime(String),

    #[error("task '{name}' did not complete: {outcome}")]
    TaskDidNotComplete { name: String, outcome: TaskOutcome },
}
