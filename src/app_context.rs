use std::sync::Arc;

use eyre::{Result, WrapErr};

use crate::{
    config::AppConfig,
    health::{HealthMonitor, HealthSummary, default_health_checks},
    lifecycle::LifecycleManager,
    retry::{Retrier, RetryConfig},
    task_manager::{TaskManager, TaskManagerConfig, TaskRegistry},
};

/// Name of the registry service that owns the health monitor's loops
const HEALTH_SERVICE: &str = "health_monitor";

/// Central application context that holds all shared resources
pub struct AppContext {
    pub config: AppConfig,
    pub registry: TaskRegistry,
    pub task_manager: TaskManager,
    pub retrier: Retrier,
    /// Policy applied to wrapped operations and the critical default probes
    pub retry_config: RetryConfig,
    pub health_monitor: HealthMonitor,
    pub lifecycle: LifecycleManager,
}

impl AppContext {
    /// Register the built-in probes enabled by the configuration
    pub fn register_default_probes(&self) -> Result<usize> {
        let client = reqwest::Client::builder()
            .build()
            .wrap_err("Failed to build HTTP client for health probes")?;

        let checks =
            default_health_checks(&self.config.health.probes, &client, &self.retry_config);
        let count = checks.len();
        for check in checks {
            self.health_monitor.register_health_check(check);
        }

        if count == 0 {
            tracing::warn!("No health probes configured. Use --help to see available options.");
        }
        Ok(count)
    }

    /// Start monitoring and block until shutdown has finished
    pub async fn run(self) -> Result<()> {
        self.register_default_probes()?;

        let signal_listener = self.lifecycle.install_signal_handlers();
        self.health_monitor
            .start_monitoring()
            .wrap_err("Failed to start health monitoring")?;

        tracing::info!(
            services = ?self.registry.service_names(),
            "Application running, waiting for shutdown signal"
        );

        self.lifecycle.wait_for_shutdown_complete().await;
        if let Err(e) = signal_listener.await {
            tracing::warn!(error = %e, "Signal listener ended abnormally");
        }

        match self.lifecycle.shutdown_report() {
            Some(report) if !report.graceful => tracing::warn!(
                failed = ?report.failed,
                timed_out = ?report.timed_out,
                "Application shut down with errors"
            ),
            _ => tracing::info!("Application shutdown complete"),
        }
        Ok(())
    }

    /// Probe every configured component once
    pub async fn health_snapshot(&self) -> Result<HealthSummary> {
        self.register_default_probes()?;
        Ok(self.health_monitor.check_all().await)
    }
}

#[derive(Default)]
pub struct AppBuilder {
    config: Option<AppConfig>,
    task_manager_config: Option<TaskManagerConfig>,
}

impl AppBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the application configuration
    pub fn with_config(mut self, config: AppConfig) -> Self {
        self.task_manager_config = Some(config.get_task_manager_config());
        self.config = Some(config);
        self
    }

    /// Override the task manager configuration derived from `AppConfig`
    pub fn with_task_manager_config(mut self, task_config: TaskManagerConfig) -> Self {
        self.task_manager_config = Some(task_config);
        self
    }

    /// Build the AppContext with validation
    pub fn build(self) -> Result<AppContext> {
        let config = self
            .config
            .ok_or_else(|| eyre::eyre!("AppConfig is required"))?;

        if config.lifecycle.shutdown_timeout_secs == 0 {
            return Err(eyre::eyre!("Shutdown timeout must be greater than zero"));
        }
        if config.retry.max_attempts == 0 {
            return Err(eyre::eyre!("Retry max_attempts must be at least 1"));
        }

        let task_config = self
            .task_manager_config
            .unwrap_or_else(|| config.get_task_manager_config());

        let registry = TaskRegistry::with_config(task_config.clone());
        let task_manager = TaskManager::with_config("global", task_config);
        task_manager.start();

        let retrier = Retrier::new(config.get_circuit_breaker_config());
        let retry_config = config.get_retry_config();
        let health_monitor = HealthMonitor::new(
            config.get_health_monitor_config(),
            registry.register_service(HEALTH_SERVICE),
            retrier.clone(),
        );

        let lifecycle = LifecycleManager::new(
            config.get_lifecycle_config(),
            registry.clone(),
            task_manager.clone(),
        );
        lifecycle.register_service(Arc::new(health_monitor.clone()));

        Ok(AppContext {
            config,
            registry,
            task_manager,
            retrier,
            retry_config,
            health_monitor,
            lifecycle,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_app_builder_fluent_interface() {
        let config = AppConfig::default();

        let builder = AppBuilder::new().with_config(config);

        assert!(builder.config.is_some());
        assert!(builder.task_manager_config.is_some());
    }

    #[test]
    fn test_app_builder_missing_config() {
        let builder = AppBuilder::new();
        let result = builder.build();
        assert!(result.is_err());
        let error_msg = result.err().unwrap().to_string();
        assert!(error_msg.contains("AppConfig is required"));
    }

    #[test]
    fn test_app_builder_rejects_zero_shutdown_timeout() {
        let mut config = AppConfig::default();
        config.lifecycle.shutdown_timeout_secs = 0;

        let result = AppBuilder::new().with_config(config).build();
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_configured_retry_reaches_critical_probes() {
        let mut config = AppConfig::default();
        config.retry.max_attempts = 6;
        config.retry.initial_delay_ms = 20;
        config.health.probes.system_resources = false;
        config.health.probes.database_addr = Some("127.0.0.1:1".to_string());

        let context = AppBuilder::new().with_config(config).build().unwrap();
        assert_eq!(context.retry_config.max_attempts, 6);

        let client = reqwest::Client::new();
        let checks =
            default_health_checks(&context.config.health.probes, &client, &context.retry_config);
        let retry = checks[0].retry.as_ref().unwrap();
        assert_eq!(retry.max_attempts, 6);
        assert_eq!(retry.initial_delay, Duration::from_millis(20));
    }

    #[tokio::test]
    async fn test_context_wires_components() {
        let mut config = AppConfig::default();
        config.health.probes.system_resources = false;
        config.health.probes.cache_addr = Some("127.0.0.1:1".to_string());

        let context = AppBuilder::new()
            .with_config(config)
            .with_task_manager_config(TaskManagerConfig {
                cleanup_interval: Duration::from_millis(50),
                ..TaskManagerConfig::default()
            })
            .build()
            .unwrap();

        assert_eq!(context.registry.service_names(), vec![HEALTH_SERVICE]);
        assert_eq!(context.register_default_probes().unwrap(), 1);
        assert!(context.health_monitor.component_health("cache").is_some());

        let report = context
            .lifecycle
            .shutdown(Some(Duration::from_secs(2)))
            .await
            .unwrap();
        assert!(report.graceful);
        assert!(report.completed.contains(&"service:health_monitor".to_string()));
        assert!(context.registry.is_empty());
    }
}
