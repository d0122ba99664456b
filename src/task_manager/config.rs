use crate::task_manager::types::ShutdownPhase;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Duration;

/// Configuration for task manager behavior
#[derive(Debug, Clone)]
pub struct TaskManagerConfig {
    /// Interval at which finished tasks are pruned from the table
    pub cleanup_interval: Duration,
}

impl Default for TaskManagerConfig {
    fn default() -> Self {
        Self {
            cleanup_interval: Duration::from_secs(60),
        }
    }
}

/// Status tracking for the shutdown process
#[derive(Debug, Clone, Serialize)]
pub struct ShutdownStatus {
    /// Current shutdown phase
    pub phase: ShutdownPhase,
    /// When shutdown was initiated
    pub started_at: Option<DateTime<Utc>>,
    /// Number of tasks tracked when shutdown started
    pub initial_task_count: usize,
    /// Tasks that observed cancellation and finished within the timeout
    pub tasks_cancelled: usize,
    /// Tasks that had to be aborted after the timeout
    pub tasks_abandoned: usize,
    /// Tasks created with cancel_on_shutdown = false, left running
    pub tasks_detached: usize,
    /// Whether every cancellable task finished within the timeout
    pub completed_gracefully: bool,
    pub elapsed: Duration,
}

impl ShutdownStatus {
    pub fn new() -> Self {
        Self {
            phase: ShutdownPhase::Running,
            started_at: None,
            initial_task_count: 0,
            tasks_cancelled: 0,
            tasks_abandoned: 0,
            tasks_detached: 0,
            completed_gracefully: false,
            elapsed: Duration::ZERO,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.phase == ShutdownPhase::Complete
    }
}

impl Default for ShutdownStatus {
    fn default() -> Self {
        Self::new()
    }
}
