use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{Span, field};
use uuid::Uuid;

/// Correlation ID for tracking operations across task boundaries
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq)]
pub struct CorrelationId(Uuid);

impl Default for CorrelationId {
    fn default() -> Self {
        Self::new()
    }
}

impl CorrelationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl std::fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Logging context attached to every managed task body
#[derive(Debug, Clone)]
pub struct TaskLoggingContext {
    pub correlation_id: CorrelationId,
    pub manager: String,
    pub task_name: String,
    pub start_time: u64,
}

impl TaskLoggingContext {
    pub fn new(correlation_id: CorrelationId, manager: &str, task_name: &str) -> Self {
        Self {
            correlation_id,
            manager: manager.to_string(),
            task_name: task_name.to_string(),
            start_time: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap_or_default()
                .as_millis() as u64,
        }
    }

    pub fn create_span(&self) -> Span {
        tracing::info_span!(
            "task_execution",
            correlation_id = %self.correlation_id,
            manager = %self.manager,
            task_name = %self.task_name,
            start_time = self.start_time,
            duration_ms = field::Empty,
            result = field::Empty,
        )
    }
}

/// Error details logged when a task body fails
#[derive(Debug, Clone)]
pub struct TaskFailure {
    pub task_name: String,
    pub message: String,
    pub error_chain: Vec<String>,
}

impl TaskFailure {
    pub fn from_error(task_name: &str, error: &(dyn std::error::Error + 'static)) -> Self {
        let mut error_chain = Vec::new();
        let mut source = error.source();
        while let Some(err) = source {
            error_chain.push(err.to_string());
            source = err.source();
        }

        Self {
            task_name: task_name.to_string(),
            message: error.to_string(),
            error_chain,
        }
    }

    pub fn log_structured(&self) {
        tracing::error!(
            task_name = %self.task_name,
            error = %self.message,
            error_chain = ?self.error_chain,
            "Task failed"
        );
    }
}

/// Extracts a readable message from a panic payload
pub fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, thiserror::Error)]
    #[error("outer failure")]
    struct Outer(#[source] std::io::Error);

    #[test]
    fn test_task_failure_collects_error_chain() {
        let err = Outer(std::io::Error::other("disk gone"));
        let failure = TaskFailure::from_error("writer", &err);
        assert_eq!(failure.message, "outer failure");
        assert_eq!(failure.error_chain, vec!["disk gone".to_string()]);
    }

    #[test]
    fn test_panic_message_variants() {
        let boxed: Box<dyn std::any::Any + Send> = Box::new("static str");
        assert_eq!(panic_message(boxed.as_ref()), "static str");
        let boxed: Box<dyn std::any::Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(boxed.as_ref()), "owned");
        let boxed: Box<dyn std::any::Any + Send> = Box::new(42u32);
        assert_eq!(panic_message(boxed.as_ref()), "unknown panic payload");
    }
}
