// Lifecycle Module - process-wide shutdown coordination
//
// - Registration of services and cleanup callbacks
// - SIGINT/SIGTERM interception on a dedicated task
// - Concurrent, timeout-bounded shutdown of every participant

pub mod error;
pub mod manager;
pub mod signals;

pub use error::LifecycleError;
pub use manager::{LifecycleConfig, LifecycleManager, LifecycleShutdownReport, ManagedService};
pub use signals::wait_for_shutdown_signal;
