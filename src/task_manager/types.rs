use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Boxed error used by task bodies, wrapped operations and health probes
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Result type returned by managed task bodies
pub type TaskResult<T> = Result<T, BoxError>;

/// Observable state of a managed task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    Running,
    Completed,
    Failed,
    Cancelled,
    /// Aborted by the manager after it ignored cancellation
    Abandoned,
}

impl TaskState {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskState::Running => "running",
            TaskState::Completed => "completed",
            TaskState::Failed => "failed",
            TaskState::Cancelled => "cancelled",
            TaskState::Abandoned => "abandoned",
        }
    }
}

impl std::fmt::Display for TaskState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a task body ended, recorded at the task boundary
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    Completed,
    Failed { error: String },
    Cancelled,
    Panicked { message: String },
    Abandoned,
}

impl TaskOutcome {
    pub fn state(&self) -> TaskState {
        match self {
            TaskOutcome::Completed => TaskState::Completed,
            TaskOutcome::Failed { .. } | TaskOutcome::Panicked { .. } => TaskState::Failed,
            TaskOutcome::Cancelled => TaskState::Cancelled,
            TaskOutcome::Abandoned => TaskState::Abandoned,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, TaskOutcome::Completed)
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, TaskOutcome::Cancelled | TaskOutcome::Abandoned)
    }
}

impl std::fmt::Display for TaskOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskOutcome::Completed => write!(f, "completed"),
            TaskOutcome::Failed { error } => write!(f, "failed: {error}"),
            TaskOutcome::Cancelled => write!(f, "cancelled"),
            TaskOutcome::Panicked { message } => write!(f, "panicked: {message}"),
            TaskOutcome::Abandoned => write!(f, "abandoned"),
        }
    }
}

/// Task completion information published when a task body finishes
#[derive(Debug, Clone)]
pub struct TaskCompletion {
    pub task_name: String,
    pub outcome: TaskOutcome,
    pub duration: Duration,
}

/// Shutdown phases for coordinated task termination
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ShutdownPhase {
    /// Normal operation, not shutting down
    Running,
    /// Stop accepting new tasks
    StopAccepting,
    /// Waiting for running tasks to complete
    WaitingForTasks,
    /// Force terminating remaining tasks
    ForceTerminating,
    /// Shutdown complete
    Complete,
}

impl std::fmt::Display for ShutdownPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ShutdownPhase::Running => write!(f, "running"),
            ShutdownPhase::StopAccepting => write!(f, "stop_accepting"),
            ShutdownPhase::WaitingForTasks => write!(f, "waiting_for_tasks"),
            ShutdownPhase::ForceTerminating => write!(f, "force_terminating"),
            ShutdownPhase::Complete => write!(f, "complete"),
        }
    }
}

/// Point-in-time snapshot of one managed task
#[derive(Debug, Clone, Serialize)]
pub struct TaskStatus {
    pub name: String,
    pub state: TaskState,
    pub done: bool,
    pub cancelled: bool,
    pub cancel_on_shutdown: bool,
    pub created_at: DateTime<Utc>,
    pub running_time: Duration,
}

/// Statistics for task manager monitoring
#[derive(Debug, Clone, Serialize)]
pub struct TaskManagerStats {
    pub manager: String,
    pub total_tasks: usize,
    pub tasks_by_state: HashMap<TaskState, usize>,
    pub is_shutting_down: bool,
}
