use thiserror::Error;

#[derive(Debug, Error)]
pub enum LifecycleError {
    /// `shutdown` was already called, by a signal or another caller
    #[error("shutdown already in progress")]
    AlreadyShuttingDown,
}
