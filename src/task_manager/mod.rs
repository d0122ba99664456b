// Task Manager Module - named pools of cancellable background tasks
//
// This module provides:
// - Task creation with cancellation tokens and watch-based completion tracking
// - Failure and panic containment at the task boundary
// - Structured logging with correlation IDs
// - Periodic cleanup of finished tasks
// - Timeout-bounded shutdown with phase tracking
// - A registry mapping service names to isolated task managers

pub mod types;
pub mod logging;
pub mod config;
pub mod error;
pub mod handle;
pub mod registry;
pub mod manager;

pub use types::{
    BoxError, ShutdownPhase, TaskCompletion, TaskManagerStats, TaskOutcome, TaskResult,
    TaskState, TaskStatus,
};

pub use logging::{CorrelationId, TaskFailure, TaskLoggingContext};
pub use config::{ShutdownStatus, TaskManagerConfig};
pub use error::TaskManagerError;
pub use handle::TaskHandle;
pub use registry::{RegistryShutdownReport, TaskRegistry};
pub use manager::TaskManager;

#[cfg(test)]
mod tests;
