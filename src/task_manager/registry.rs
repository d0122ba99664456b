use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::Serialize;

use crate::task_manager::config::{ShutdownStatus, TaskManagerConfig};
use crate::task_manager::manager::TaskManager;
use crate::task_manager::types::TaskManagerStats;

/// Outcome of shutting down every registered service
#[derive(Debug, Clone, Default, Serialize)]
pub struct RegistryShutdownReport {
    pub services: HashMap<String, ShutdownStatus>,
    /// Services whose shutdown task panicked or was cancelled
    pub failed: Vec<String>,
    pub elapsed: Duration,
}

/// Maps service names to their own task manager so subsystems get isolated
/// task pools. Constructed once per process and shared through the
/// application context.
#[derive(Clone, Default)]
pub struct TaskRegistry {
    services: Arc<Mutex<HashMap<String, TaskManager>>>,
    config: TaskManagerConfig,
}

impl std::fmt::Debug for TaskRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskRegistry")
            .field("services", &self.service_names())
            .finish()
    }
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::with_config(TaskManagerConfig::default())
    }

    /// Every manager created by this registry uses `config`
    pub fn with_config(config: TaskManagerConfig) -> Self {
        Self {
            services: Arc::new(Mutex::new(HashMap::new())),
            config,
        }
    }

    /// Return the manager for `name`, creating and starting it on first use
    pub fn register_service(&self, name: &str) -> TaskManager {
        let mut services = self.services.lock();
        if let Some(manager) = services.get(name) {
            return manager.clone();
        }

        let manager = TaskManager::with_config(name, self.config.clone());
        manager.start();
        services.insert(name.to_string(), manager.clone());

        tracing::info!(service = %name, "Registered service task manager");
        manager
    }

    pub fn get_service(&self, name: &str) -> Option<TaskManager> {
        self.services.lock().get(name).cloned()
    }

    /// Shut the service's manager down and remove it.
    /// Returns `None` when no such service is registered.
    pub async fn unregister_service(&self, name: &str, timeout: Duration) -> Option<ShutdownStatus> {
        let manager = self.services.lock().remove(name)?;
        let status = manager.shutdown(timeout).await;

        tracing::info!(
            service = %name,
            completed_gracefully = status.completed_gracefully,
            "Unregistered service task manager"
        );
        Some(status)
    }

    /// Shut every registered manager down concurrently.
    ///
    /// Each shutdown runs on its own spawned task; a failing one is logged and
    /// recorded without stopping the others.
    pub async fn shutdown_all(&self, timeout: Duration) -> RegistryShutdownReport {
        let started = Instant::now();
        let managers: Vec<(String, TaskManager)> = self.services.lock().drain().collect();

        if managers.is_empty() {
            tracing::debug!("No registered services to shut down");
            return RegistryShutdownReport::default();
        }

        tracing::info!(
            services = managers.len(),
            timeout_ms = timeout.as_millis() as u64,
            "Shutting down all registered services"
        );

        let shutdowns = managers.into_iter().map(|(name, manager)| {
            let handle = tokio::spawn(async move { manager.shutdown(timeout).await });
            async move { (name, handle.await) }
        });

        let mut report = RegistryShutdownReport::default();
        for (name, result) in futures::future::join_all(shutdowns).await {
            match result {
                Ok(status) => {
                    report.services.insert(name, status);
                }
                Err(e) => {
                    tracing::error!(service = %name, error = %e, "Service shutdown failed");
                    report.failed.push(name);
                }
            }
        }
        report.elapsed = started.elapsed();

        tracing::info!(
            services = report.services.len(),
            failed = report.failed.len(),
            elapsed_ms = report.elapsed.as_millis() as u64,
            "All registered services shut down"
        );
        report
    }

    pub fn service_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.services.lock().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn stats(&self) -> HashMap<String, TaskManagerStats> {
        self.services
            .lock()
            .iter()
            .map(|(name, manager)| (name.clone(), manager.stats()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.services.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.lock().is_empty()
    }
}
