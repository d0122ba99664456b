use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};

use crate::health::system::SystemMetrics;
use crate::retry::RetryConfig;
use crate::task_manager::BoxError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
    Unknown,
}

impl HealthStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            HealthStatus::Healthy => "healthy",
            HealthStatus::Degraded => "degraded",
            HealthStatus::Unhealthy => "unhealthy",
            HealthStatus::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A status transition produced by one probe result
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusChange {
    pub from: HealthStatus,
    pub to: HealthStatus,
}

/// Per-component health record, owned by the `HealthMonitor`
#[derive(Debug, Clone, Serialize)]
pub struct ComponentHealth {
    pub name: String,
    pub status: HealthStatus,
    pub critical: bool,
    pub consecutive_failures: u32,
    pub consecutive_successes: u32,
    pub total_checks: u64,
    pub total_failures: u64,
    pub last_response_time: Option<Duration>,
    pub last_error: Option<String>,
    pub last_check: Option<DateTime<Utc>>,
}

impl ComponentHealth {
    pub fn new(name: impl Into<String>, critical: bool) -> Self {
        Self {
            name: name.into(),
            status: HealthStatus::Unknown,
            critical,
            consecutive_failures: 0,
            consecutive_successes: 0,
            total_checks: 0,
            total_failures: 0,
            last_response_time: None,
            last_error: None,
            last_check: None,
        }
    }

    /// Fold one probe result into the record.
    ///
    /// Returns the transition when the status changed. An unknown component
    /// turns healthy on its first success; a degraded or unhealthy one needs
    /// `recovery_threshold` consecutive successes.
    pub fn record_result(
        &mut self,
        success: bool,
        response_time: Duration,
        error: Option<String>,
        failure_threshold: u32,
        recovery_threshold: u32,
    ) -> Option<StatusChange> {
        let from = self.status;

        self.total_checks += 1;
        self.last_response_time = Some(response_time);
        self.last_check = Some(Utc::now());

        if success {
            self.consecutive_successes += 1;
            self.consecutive_failures = 0;

            let recovered = match from {
                HealthStatus::Unknown | HealthStatus::Healthy => true,
                HealthStatus::Degraded | HealthStatus::Unhealthy => {
                    self.consecutive_successes >= recovery_threshold.max(1)
                }
            };
            if recovered {
                self.status = HealthStatus::Healthy;
            }
        } else {
            self.consecutive_failures += 1;
            self.consecutive_successes = 0;
            self.total_failures += 1;
            self.last_error = error;

            if from != HealthStatus::Unhealthy {
                self.status = if self.consecutive_failures >= failure_threshold.max(1) {
                    HealthStatus::Unhealthy
                } else {
                    HealthStatus::Degraded
                };
            }
        }

        (self.status != from).then_some(StatusChange {
            from,
            to: self.status,
        })
    }
}

/// Anything that can report whether a component is up
#[async_trait]
pub trait HealthProbe: Send + Sync {
    /// `Ok(false)` and `Err` both count as a failed check
    async fn check(&self) -> Result<bool, BoxError>;
}

/// Adapts an async closure into a `HealthProbe`
pub struct FnProbe<F> {
    f: F,
}

impl<F> FnProbe<F> {
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

#[async_trait]
impl<F, Fut> HealthProbe for FnProbe<F>
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = Result<bool, BoxError>> + Send,
{
    async fn check(&self) -> Result<bool, BoxError> {
        (self.f)().await
    }
}

/// A registered probe and how to run it
#[derive(Clone)]
pub struct HealthCheck {
    pub name: String,
    pub probe: Arc<dyn HealthProbe>,
    pub interval: Duration,
    pub timeout: Duration,
    pub failure_threshold: u32,
    pub recovery_threshold: u32,
    pub critical: bool,
    /// Retry the probe through the monitor's `Retrier` before counting a failure
    pub retry: Option<RetryConfig>,
}

impl std::fmt::Debug for HealthCheck {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HealthCheck")
            .field("name", &self.name)
            .field("interval", &self.interval)
            .field("timeout", &self.timeout)
            .field("failure_threshold", &self.failure_threshold)
            .field("recovery_threshold", &self.recovery_threshold)
            .field("critical", &self.critical)
            .field("retry", &self.retry.is_some())
            .finish()
    }
}

impl HealthCheck {
    pub fn new(name: impl Into<String>, probe: Arc<dyn HealthProbe>) -> Self {
        Self {
            name: name.into(),
            probe,
            interval: Duration::from_secs(30),
            timeout: Duration::from_secs(10),
            failure_threshold: 3,
            recovery_threshold: 2,
            critical: false,
            retry: None,
        }
    }

    pub fn from_fn<F, Fut>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<bool, BoxError>> + Send + 'static,
    {
        Self::new(name, Arc::new(FnProbe::new(f)))
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_failure_threshold(mut self, threshold: u32) -> Self {
        self.failure_threshold = threshold;
        self
    }

    pub fn with_recovery_threshold(mut self, threshold: u32) -> Self {
        self.recovery_threshold = threshold;
        self
    }

    pub fn critical(mut self, critical: bool) -> Self {
        self.critical = critical;
        self
    }

    pub fn with_retry(mut self, config: RetryConfig) -> Self {
        self.retry = Some(config);
        self
    }
}

/// Failover and recovery callbacks receive the component name
pub type HealthHandler =
    Arc<dyn Fn(String) -> BoxFuture<'static, Result<(), BoxError>> + Send + Sync>;

#[derive(Debug, Clone, Serialize)]
pub struct HealthSummary {
    pub overall_status: HealthStatus,
    /// Share of healthy components, 100 when none are registered
    pub uptime_percentage: f64,
    pub monitoring: bool,
    pub components: BTreeMap<String, ComponentHealth>,
    pub system: Option<SystemMetrics>,
    pub timestamp: DateTime<Utc>,
}

impl HealthSummary {
    pub fn from_components(
        components: BTreeMap<String, ComponentHealth>,
        system: Option<SystemMetrics>,
        monitoring: bool,
    ) -> Self {
        let overall_status = overall_status(components.values());
        let uptime_percentage = if components.is_empty() {
            100.0
        } else {
            let healthy = components
                .values()
                .filter(|c| c.status == HealthStatus::Healthy)
                .count();
            healthy as f64 / components.len() as f64 * 100.0
        };

        Self {
            overall_status,
            uptime_percentage,
            monitoring,
            components,
            system,
            timestamp: Utc::now(),
        }
    }
}

fn overall_status<'a>(components: impl Iterator<Item = &'a ComponentHealth>) -> HealthStatus {
    let mut status = HealthStatus::Healthy;
    for component in components {
        match component.status {
            HealthStatus::Unhealthy if component.critical => return HealthStatus::Unhealthy,
            HealthStatus::Unhealthy | HealthStatus::Degraded => status = HealthStatus::Degraded,
            HealthStatus::Healthy | HealthStatus::Unknown => {}
        }
    }
    status
}
