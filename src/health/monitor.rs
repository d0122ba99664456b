use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures::FutureExt;
use futures::future::join_all;
use parking_lot::Mutex;

use crate::health::system::{ResourceThresholds, SystemMetrics, SystemSampler};
use crate::health::types::{
    ComponentHealth, HealthCheck, HealthHandler, HealthProbe, HealthStatus, HealthSummary,
    StatusChange,
};
use crate::lifecycle::ManagedService;
use crate::retry::{RetryError, Retrier};
use crate::task_manager::logging::panic_message;
use crate::task_manager::{BoxError, TaskManager, TaskManagerError};

const SYSTEM_LOOP_NAME: &str = "health_check:system_resources";

#[derive(Debug, Clone)]
pub struct HealthMonitorConfig {
    pub system_check_interval: Duration,
    pub thresholds: ResourceThresholds,
    /// How long `stop_monitoring` waits for each loop to unwind
    pub stop_timeout: Duration,
    pub disk_path: String,
}

impl Default for HealthMonitorConfig {
    fn default() -> Self {
        Self {
            system_check_interval: Duration::from_secs(10),
            thresholds: ResourceThresholds::default(),
            stop_timeout: Duration::from_secs(5),
            disk_path: "/".to_string(),
        }
    }
}

struct MonitorInner {
    config: HealthMonitorConfig,
    task_manager: TaskManager,
    retrier: Retrier,
    sampler: SystemSampler,
    checks: Mutex<HashMap<String, HealthCheck>>,
    components: Mutex<HashMap<String, ComponentHealth>>,
    handlers: Mutex<HashMap<String, HealthHandler>>,
    loops: Mutex<Vec<String>>,
    monitoring: AtomicBool,
    last_system: Mutex<Option<SystemMetrics>>,
}

/// Runs registered probes on their own loops and tracks component health.
///
/// Probe loops are scheduled on the supplied `TaskManager`; retry-enabled
/// probes go through the supplied `Retrier` under `health_probe:{name}`.
#[derive(Clone)]
pub struct HealthMonitor {
    inner: Arc<MonitorInner>,
}

impl std::fmt::Debug for HealthMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HealthMonitor")
            .field("checks", &self.inner.checks.lock().len())
            .field("monitoring", &self.is_monitoring())
            .finish()
    }
}

impl HealthMonitor {
    pub fn new(config: HealthMonitorConfig, task_manager: TaskManager, retrier: Retrier) -> Self {
        let sampler = SystemSampler::new(config.disk_path.clone());
        Self {
            inner: Arc::new(MonitorInner {
                config,
                task_manager,
                retrier,
                sampler,
                checks: Mutex::new(HashMap::new()),
                components: Mutex::new(HashMap::new()),
                handlers: Mutex::new(HashMap::new()),
                loops: Mutex::new(Vec::new()),
                monitoring: AtomicBool::new(false),
                last_system: Mutex::new(None),
            }),
        }
    }

    /// Register or replace a check. The component starts out `unknown`.
    pub fn register_health_check(&self, check: HealthCheck) {
        let name = check.name.clone();
        tracing::info!(
            component = %name,
            critical = check.critical,
            interval_secs = check.interval.as_secs(),
            "Registered health check"
        );

        self.inner
            .components
            .lock()
            .insert(name.clone(), ComponentHealth::new(&name, check.critical));
        self.inner.checks.lock().insert(name.clone(), check);

        if self.is_monitoring() {
            if let Err(e) = self.spawn_check_loop(&name) {
                tracing::warn!(component = %name, error = %e, "Failed to start health check loop");
            }
        }
    }

    /// Called with the component name when a critical component turns unhealthy
    pub fn register_failover_handler<F, Fut>(&self, component: &str, handler: F)
    where
        F: Fn(String) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
    {
        self.insert_handler(component.to_string(), handler);
    }

    /// Called with the component name when an unhealthy component recovers.
    /// Stored under `{component}_recovery`.
    pub fn register_recovery_handler<F, Fut>(&self, component: &str, handler: F)
    where
        F: Fn(String) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
    {
        self.insert_handler(format!("{component}_recovery"), handler);
    }

    fn insert_handler<F, Fut>(&self, key: String, handler: F)
    where
        F: Fn(String) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
    {
        let handler: HealthHandler = Arc::new(move |component| handler(component).boxed());
        tracing::debug!(handler = %key, "Registered health handler");
        self.inner.handlers.lock().insert(key, handler);
    }

    pub fn is_monitoring(&self) -> bool {
        self.inner.monitoring.load(Ordering::SeqCst)
    }

    /// Start one loop per registered check plus the system resource loop.
    /// Calling it while monitoring is a no-op. A loop that outlived an
    /// earlier stop, or was started before a failed start, is adopted
    /// instead of spawned again.
    pub fn start_monitoring(&self) -> Result<(), TaskManagerError> {
        if self.inner.monitoring.swap(true, Ordering::SeqCst) {
            tracing::debug!("Health monitoring already running");
            return Ok(());
        }

        let mut names: Vec<String> = self.inner.checks.lock().keys().cloned().collect();
        names.sort();

        let started = names
            .iter()
            .try_for_each(|name| self.spawn_check_loop(name))
            .and_then(|()| self.spawn_system_loop());

        if let Err(e) = started {
            self.inner.monitoring.store(false, Ordering::SeqCst);
            tracing::error!(error = %e, "Failed to start health monitoring");
            return Err(e);
        }

        tracing::info!(checks = names.len(), "Health monitoring started");
        Ok(())
    }

    /// Cancel every monitoring loop and wait for them to exit
    pub async fn stop_monitoring(&self) {
        self.inner.monitoring.store(false, Ordering::SeqCst);
        let loops = std::mem::take(&mut *self.inner.loops.lock());
        if loops.is_empty() {
            return;
        }

        let timeout = self.inner.config.stop_timeout;
        let task_manager = &self.inner.task_manager;
        join_all(loops.iter().map(|name| task_manager.cancel_task(name, timeout))).await;

        tracing::info!(loops = loops.len(), "Health monitoring stopped");
    }

    /// Run one component's probe now and fold the result into its record
    pub async fn check_component(&self, name: &str) -> Option<ComponentHealth> {
        let check = self.inner.checks.lock().get(name).cloned()?;
        let started = Instant::now();
        let result = self.run_probe(&check).await;
        let response_time = started.elapsed();

        let error = match &result {
            Ok(()) => None,
            Err(e) => {
                tracing::debug!(
                    component = %name,
                    response_time_ms = response_time.as_millis() as u64,
                    error = %e,
                    "Health probe failed"
                );
                Some(e.to_string())
            }
        };

        let (change, snapshot) = {
            let mut components = self.inner.components.lock();
            let component = components
                .entry(name.to_string())
                .or_insert_with(|| ComponentHealth::new(name, check.critical));
            component.critical = check.critical;
            let change = component.record_result(
                result.is_ok(),
                response_time,
                error,
                check.failure_threshold,
                check.recovery_threshold,
            );
            (change, component.clone())
        };

        if let Some(change) = change {
            self.on_status_change(&check, change, &snapshot).await;
        }

        Some(snapshot)
    }

    /// Probe every registered component once, sample the system, and
    /// return the resulting summary
    pub async fn check_all(&self) -> HealthSummary {
        let names: Vec<String> = self.inner.checks.lock().keys().cloned().collect();
        join_all(names.iter().map(|name| self.check_component(name))).await;

        let sampler = self.inner.sampler.clone();
        match tokio::task::spawn_blocking(move || sampler.sample()).await {
            Ok(metrics) => *self.inner.last_system.lock() = Some(metrics),
            Err(e) => tracing::warn!(error = %e, "System resource sampling failed"),
        }

        self.get_health_status()
    }

    pub fn get_health_status(&self) -> HealthSummary {
        let components: BTreeMap<String, ComponentHealth> = self
            .inner
            .components
            .lock()
            .iter()
            .map(|(name, health)| (name.clone(), health.clone()))
            .collect();
        let system = self.inner.last_system.lock().clone();

        HealthSummary::from_components(components, system, self.is_monitoring())
    }

    pub fn component_health(&self, name: &str) -> Option<ComponentHealth> {
        self.inner.components.lock().get(name).cloned()
    }

    pub fn latest_system_metrics(&self) -> Option<SystemMetrics> {
        self.inner.last_system.lock().clone()
    }

    async fn run_probe(&self, check: &HealthCheck) -> Result<(), BoxError> {
        let probe = check.probe.clone();
        let timeout = check.timeout;

        match &check.retry {
            Some(config) => {
                let operation = format!("health_probe:{}", check.name);
                self.inner
                    .retrier
                    .execute(&operation, config, || probe_once(probe.clone(), timeout))
                    .await
                    .map_err(RetryError::into_source)
            }
            None => probe_once(probe, timeout).await,
        }
    }

    async fn on_status_change(&self, check: &HealthCheck, change: StatusChange, health: &ComponentHealth) {
        match change.to {
            HealthStatus::Unhealthy => tracing::error!(
                component = %check.name,
                from = %change.from,
                to = %change.to,
                critical = check.critical,
                consecutive_failures = health.consecutive_failures,
                last_error = ?health.last_error,
                "Component became unhealthy"
            ),
            _ => tracing::info!(
                component = %check.name,
                from = %change.from,
                to = %change.to,
                "Component health changed"
            ),
        }

        match (change.from, change.to) {
            (_, HealthStatus::Unhealthy) if check.critical => {
                self.invoke_handler(&check.name, &check.name, "failover").await;
            }
            (HealthStatus::Unhealthy, HealthStatus::Healthy) => {
                let key = format!("{}_recovery", check.name);
                self.invoke_handler(&key, &check.name, "recovery").await;
            }
            _ => {}
        }
    }

    async fn invoke_handler(&self, key: &str, component: &str, kind: &'static str) {
        let handler = self.inner.handlers.lock().get(key).cloned();
        let Some(handler) = handler else {
            tracing::debug!(component = %component, kind = kind, "No handler registered");
            return;
        };

        tracing::info!(component = %component, kind = kind, "Invoking health handler");
        let call = handler(component.to_string());
        match AssertUnwindSafe(call).catch_unwind().await {
            Ok(Ok(())) => {
                tracing::info!(component = %component, kind = kind, "Health handler completed");
            }
            Ok(Err(e)) => {
                tracing::error!(component = %component, kind = kind, error = %e, "Health handler failed");
            }
            Err(payload) => {
                tracing::error!(
                    component = %component,
                    kind = kind,
                    panic = %panic_message(payload.as_ref()),
                    "Health handler panicked"
                );
            }
        }
    }

    fn spawn_check_loop(&self, name: &str) -> Result<(), TaskManagerError> {
        let task_name = format!("health_check:{name}");
        let weak: Weak<MonitorInner> = Arc::downgrade(&self.inner);
        let component = name.to_string();

        let spawned = self
            .inner
            .task_manager
            .create_task(Some(&task_name), true, move |token| async move {
                loop {
                    let Some(inner) = weak.upgrade() else { break };
                    let monitor = HealthMonitor { inner };
                    let interval = monitor.inner.checks.lock().get(&component).map(|c| c.interval);
                    let Some(interval) = interval else { break };

                    tokio::select! {
                        _ = token.cancelled() => break,
                        _ = monitor.check_component(&component) => {}
                    }
                    drop(monitor);

                    tokio::select! {
                        _ = token.cancelled() => break,
                        _ = tokio::time::sleep(interval) => {}
                    }
                }
                Ok::<_, BoxError>(())
            });

        self.track_loop(spawned, task_name)
    }

    fn spawn_system_loop(&self) -> Result<(), TaskManagerError> {
        let weak: Weak<MonitorInner> = Arc::downgrade(&self.inner);

        let spawned = self
            .inner
            .task_manager
            .create_task(Some(SYSTEM_LOOP_NAME), true, move |token| async move {
                loop {
                    let Some(inner) = weak.upgrade() else { break };
                    let sampler = inner.sampler.clone();
                    let interval = inner.config.system_check_interval;
                    drop(inner);

                    let sample = tokio::select! {
                        _ = token.cancelled() => break,
                        sample = tokio::task::spawn_blocking(move || sampler.sample()) => sample,
                    };

                    match sample {
                        Ok(metrics) => {
                            let Some(inner) = weak.upgrade() else { break };
                            let violations = inner.config.thresholds.violations(&metrics);
                            if !violations.is_empty() {
                                tracing::warn!(
                                    violations = ?violations,
                                    "System resource thresholds exceeded"
                                );
                            }
                            *inner.last_system.lock() = Some(metrics);
                        }
                        Err(e) => {
                            tracing::warn!(error = %e, "System resource sampling failed");
                        }
                    }

                    tokio::select! {
                        _ = token.cancelled() => break,
                        _ = tokio::time::sleep(interval) => {}
                    }
                }
                Ok::<_, BoxError>(())
            });

        self.track_loop(spawned, SYSTEM_LOOP_NAME.to_string())
    }

    /// Record `task_name` as one of this monitor's loops. A live task
    /// already holding the name counts as the loop.
    fn track_loop<T>(
        &self,
        spawned: Result<T, TaskManagerError>,
        task_name: String,
    ) -> Result<(), TaskManagerError> {
        match spawned {
            Ok(_) => {}
            Err(TaskManagerError::DuplicateTask(_)) => {
                tracing::debug!(task_name = %task_name, "Health check loop already running");
            }
            Err(e) => return Err(e),
        }

        let mut loops = self.inner.loops.lock();
        if !loops.contains(&task_name) {
            loops.push(task_name);
        }
        Ok(())
    }
}

/// One bounded probe attempt. `Ok(false)`, errors, panics and timeouts all
/// come back as `Err`.
async fn probe_once(probe: Arc<dyn HealthProbe>, timeout: Duration) -> Result<(), BoxError> {
    match tokio::time::timeout(timeout, AssertUnwindSafe(probe.check()).catch_unwind()).await {
        Ok(Ok(Ok(true))) => Ok(()),
        Ok(Ok(Ok(false))) => Err("probe reported unhealthy".into()),
        Ok(Ok(Err(e))) => Err(e),
        Ok(Err(payload)) => Err(format!("probe panicked: {}", panic_message(payload.as_ref())).into()),
        Err(elapsed) => Err(elapsed.into()),
    }
}

#[async_trait]
impl ManagedService for HealthMonitor {
    fn name(&self) -> &str {
        "health_monitor"
    }

    async fn cleanup(&self) -> Result<(), BoxError> {
        self.stop_monitoring().await;
        Ok(())
    }
}
