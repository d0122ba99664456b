use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures::FutureExt;
use futures::future::BoxFuture;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;

use crate::lifecycle::error::LifecycleError;
use crate::lifecycle::signals::wait_for_shutdown_signal;
use crate::task_manager::logging::panic_message;
use crate::task_manager::{BoxError, TaskManager, TaskRegistry};

/// A long-lived component that releases resources on shutdown
#[async_trait]
pub trait ManagedService: Send + Sync {
    fn name(&self) -> &str;

    async fn cleanup(&self) -> Result<(), BoxError> {
        Ok(())
    }
}

type CleanupFn = Box<dyn FnOnce() -> BoxFuture<'static, Result<(), BoxError>> + Send>;

#[derive(Debug, Clone)]
pub struct LifecycleConfig {
    /// Hard limit on the whole shutdown sweep
    pub shutdown_timeout: Duration,
    /// Terminate the process once shutdown finishes
    pub exit_process: bool,
    pub exit_code: i32,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            shutdown_timeout: Duration::from_secs(30),
            exit_process: false,
            exit_code: 0,
        }
    }
}

/// What happened to each shutdown participant
#[derive(Debug, Clone, Default, Serialize)]
pub struct LifecycleShutdownReport {
    pub completed: Vec<String>,
    pub failed: Vec<String>,
    /// Participants still running at the deadline, aborted
    pub timed_out: Vec<String>,
    pub elapsed: Duration,
    pub graceful: bool,
}

struct LifecycleInner {
    config: LifecycleConfig,
    registry: TaskRegistry,
    task_manager: TaskManager,
    services: Mutex<Vec<Arc<dyn ManagedService>>>,
    cleanups: Mutex<Vec<(String, CleanupFn)>>,
    shutdown_started: AtomicBool,
    shutdown_requested: CancellationToken,
    shutdown_complete: CancellationToken,
    report: Mutex<Option<LifecycleShutdownReport>>,
}

/// Single authority for orderly process shutdown
#[derive(Clone)]
pub struct LifecycleManager {
    inner: Arc<LifecycleInner>,
}

impl std::fmt::Debug for LifecycleManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LifecycleManager")
            .field("config", &self.inner.config)
            .field("services", &self.inner.services.lock().len())
            .field("cleanups", &self.inner.cleanups.lock().len())
            .field("shutting_down", &self.is_shutting_down())
            .finish()
    }
}

impl LifecycleManager {
    pub fn new(config: LifecycleConfig, registry: TaskRegistry, task_manager: TaskManager) -> Self {
        Self {
            inner: Arc::new(LifecycleInner {
                config,
                registry,
                task_manager,
                services: Mutex::new(Vec::new()),
                cleanups: Mutex::new(Vec::new()),
                shutdown_started: AtomicBool::new(false),
                shutdown_requested: CancellationToken::new(),
                shutdown_complete: CancellationToken::new(),
                report: Mutex::new(None),
            }),
        }
    }

    pub fn config(&self) -> &LifecycleConfig {
        &self.inner.config
    }

    pub fn registry(&self) -> &TaskRegistry {
        &self.inner.registry
    }

    pub fn task_manager(&self) -> &TaskManager {
        &self.inner.task_manager
    }

    pub fn register_service(&self, service: Arc<dyn ManagedService>) {
        if self.is_shutting_down() {
            tracing::warn!(service = %service.name(), "Service registered after shutdown began, ignoring");
            return;
        }
        tracing::debug!(service = %service.name(), "Registered service for shutdown");
        self.inner.services.lock().push(service);
    }

    pub fn register_cleanup<F, Fut>(&self, name: impl Into<String>, cleanup: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
    {
        let name = name.into();
        if self.is_shutting_down() {
            tracing::warn!(cleanup = %name, "Cleanup registered after shutdown began, ignoring");
            return;
        }
        tracing::debug!(cleanup = %name, "Registered cleanup callback");
        let cleanup: CleanupFn = Box::new(move || cleanup().boxed());
        self.inner.cleanups.lock().push((name, cleanup));
    }

    pub fn is_shutting_down(&self) -> bool {
        self.inner.shutdown_started.load(Ordering::SeqCst)
    }

    /// Resolves once shutdown has been requested
    pub async fn wait_for_shutdown(&self) {
        self.inner.shutdown_requested.cancelled().await;
    }

    /// Resolves once the shutdown sweep has finished
    pub async fn wait_for_shutdown_complete(&self) {
        self.inner.shutdown_complete.cancelled().await;
    }

    pub fn shutdown_report(&self) -> Option<LifecycleShutdownReport> {
        self.inner.report.lock().clone()
    }

    /// Spawn a task that runs `shutdown` on SIGINT or SIGTERM. The task exits
    /// quietly if shutdown is requested some other way first.
    pub fn install_signal_handlers(&self) -> JoinHandle<()> {
        let manager = self.clone();
        tokio::spawn(async move {
            tokio::select! {
                signal = wait_for_shutdown_signal() => {
                    tracing::info!(signal = signal, "Received termination signal");
                    if let Err(e) = manager.shutdown(None).await {
                        tracing::warn!(error = %e, "Signal-triggered shutdown skipped");
                    }
                }
                _ = manager.wait_for_shutdown() => {
                    tracing::debug!("Shutdown requested, signal listener exiting");
                }
            }
        })
    }

    /// Shut everything down.
    ///
    /// Runs every service cleanup, every cleanup callback, the registry's
    /// `shutdown_all` and the global task manager's `shutdown` concurrently.
    /// Whatever is still running after `timeout` (the configured default when
    /// `None`) is aborted and reported. Only the first call does any work.
    pub async fn shutdown(
        &self,
        timeout: Option<Duration>,
    ) -> Result<LifecycleShutdownReport, LifecycleError> {
        if self.inner.shutdown_started.swap(true, Ordering::SeqCst) {
            tracing::warn!("Shutdown already in progress, ignoring duplicate request");
            return Err(LifecycleError::AlreadyShuttingDown);
        }

        let timeout = timeout.unwrap_or(self.inner.config.shutdown_timeout);
        let started = Instant::now();
        let deadline = tokio::time::Instant::now() + timeout;
        // task pools must finish their own abort pass before the hard deadline
        let pool_timeout = timeout.saturating_sub(timeout / 10);

        tracing::info!(timeout_ms = timeout.as_millis() as u64, "Initiating graceful shutdown");
        self.inner.shutdown_requested.cancel();

        let services = std::mem::take(&mut *self.inner.services.lock());
        let cleanups = std::mem::take(&mut *self.inner.cleanups.lock());

        let mut participants = JoinSet::new();
        let mut remaining = Vec::new();

        for service in services {
            let name = format!("service:{}", service.name());
            remaining.push(name.clone());
            spawn_participant(&mut participants, name, async move { service.cleanup().await });
        }

        for (name, cleanup) in cleanups {
            let name = format!("cleanup:{name}");
            remaining.push(name.clone());
            spawn_participant(&mut participants, name, async move { cleanup().await });
        }

        let registry = self.inner.registry.clone();
        remaining.push("task_registry".to_string());
        spawn_participant(&mut participants, "task_registry".to_string(), async move {
            let report = registry.shutdown_all(pool_timeout).await;
            if report.failed.is_empty() {
                Ok(())
            } else {
                Err(format!("services failed to shut down: {:?}", report.failed).into())
            }
        });

        let task_manager = self.inner.task_manager.clone();
        remaining.push("global_task_manager".to_string());
        spawn_participant(&mut participants, "global_task_manager".to_string(), async move {
            let status = task_manager.shutdown(pool_timeout).await;
            if status.tasks_abandoned == 0 {
                Ok(())
            } else {
                Err(format!("{} tasks abandoned", status.tasks_abandoned).into())
            }
        });

        let mut report = LifecycleShutdownReport::default();
        loop {
            match tokio::time::timeout_at(deadline, participants.join_next()).await {
                Ok(Some(Ok((name, result)))) => {
                    if let Some(pos) = remaining.iter().position(|n| *n == name) {
                        remaining.swap_remove(pos);
                    }
                    match result {
                        Ok(()) => {
                            tracing::debug!(participant = %name, "Shutdown participant completed");
                            report.completed.push(name);
                        }
                        Err(error) => {
                            tracing::error!(participant = %name, error = %error, "Shutdown participant failed");
                            report.failed.push(name);
                        }
                    }
                }
                Ok(Some(Err(e))) => {
                    tracing::error!(error = %e, "Shutdown participant task failed");
                }
                Ok(None) => break,
                Err(_) => {
                    participants.abort_all();
                    remaining.sort();
                    tracing::warn!(
                        remaining = ?remaining,
                        timeout_ms = timeout.as_millis() as u64,
                        "Shutdown timeout reached, abandoning remaining participants"
                    );
                    report.timed_out = std::mem::take(&mut remaining);
                    break;
                }
            }
        }

        report.elapsed = started.elapsed();
        report.graceful = report.failed.is_empty() && report.timed_out.is_empty();
        *self.inner.report.lock() = Some(report.clone());

        tracing::info!(
            completed = report.completed.len(),
            failed = report.failed.len(),
            timed_out = report.timed_out.len(),
            elapsed_ms = report.elapsed.as_millis() as u64,
            graceful = report.graceful,
            "Shutdown complete"
        );

        self.inner.shutdown_complete.cancel();

        if self.inner.config.exit_process {
            tracing::info!(exit_code = self.inner.config.exit_code, "Exiting process");
            std::process::exit(self.inner.config.exit_code);
        }

        Ok(report)
    }
}

fn spawn_participant<F>(
    participants: &mut JoinSet<(String, Result<(), String>)>,
    name: String,
    work: F,
) where
    F: Future<Output = Result<(), BoxError>> + Send + 'static,
{
    participants.spawn(async move {
        let result = match AssertUnwindSafe(work).catch_unwind().await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(e.to_string()),
            Err(panic) => Err(format!("panicked: {}", panic_message(panic.as_ref()))),
        };
        (name, result)
    });
}
