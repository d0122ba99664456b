use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::net::TcpStream;

use crate::health::system::{ResourceThresholds, SystemResourceProbe, SystemSampler};
use crate::health::types::{HealthCheck, HealthProbe};
use crate::retry::{RetryConfig, StatusError};
use crate::task_manager::BoxError;

/// Healthy when a TCP connection to `addr` can be opened
#[derive(Debug, Clone)]
pub struct TcpProbe {
    addr: String,
}

impl TcpProbe {
    pub fn new(addr: impl Into<String>) -> Self {
        Self { addr: addr.into() }
    }
}

#[async_trait]
impl HealthProbe for TcpProbe {
    async fn check(&self) -> Result<bool, BoxError> {
        TcpStream::connect(&self.addr).await?;
        Ok(true)
    }
}

/// Healthy when a GET on `url` returns a success status
#[derive(Debug, Clone)]
pub struct HttpProbe {
    client: Client,
    url: String,
}

impl HttpProbe {
    pub fn new(client: Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }

    pub fn from_url(url: impl Into<String>) -> Result<Self, reqwest::Error> {
        let client = Client::builder().build()?;
        Ok(Self::new(client, url))
    }
}

#[async_trait]
impl HealthProbe for HttpProbe {
    async fn check(&self) -> Result<bool, BoxError> {
        let response = self.client.get(&self.url).send().await?;
        let status = response.status();
        if status.is_success() {
            Ok(true)
        } else {
            Err(StatusError::new(status.as_u16(), format!("GET {} returned {}", self.url, status)).into())
        }
    }
}

/// Targets for the built-in probes. An absent target skips its probe.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DefaultProbeConfig {
    pub database_addr: Option<String>,
    pub api_url: Option<String>,
    pub ml_url: Option<String>,
    pub cache_addr: Option<String>,
    pub system_resources: bool,
    pub disk_path: String,
    pub thresholds: ResourceThresholds,
}

impl Default for DefaultProbeConfig {
    fn default() -> Self {
        Self {
            database_addr: None,
            api_url: None,
            ml_url: None,
            cache_addr: None,
            system_resources: true,
            disk_path: "/".to_string(),
            thresholds: ResourceThresholds::default(),
        }
    }
}

/// Build the standard set of checks: database and api are critical; ml,
/// cache and system resources are not. The critical checks retry under
/// `retry`; the database check narrows it to connection-level failures.
pub fn default_health_checks(
    config: &DefaultProbeConfig,
    client: &Client,
    retry: &RetryConfig,
) -> Vec<HealthCheck> {
    let mut checks = Vec::new();

    if let Some(addr) = &config.database_addr {
        checks.push(
            HealthCheck::new("database", Arc::new(TcpProbe::new(addr.clone())))
                .with_interval(Duration::from_secs(30))
                .with_timeout(Duration::from_secs(5))
                .critical(true)
                .with_retry(
                    retry
                        .clone()
                        .with_retryable_errors(RetryConfig::database().retryable_errors),
                ),
        );
    }

    if let Some(url) = &config.api_url {
        checks.push(
            HealthCheck::new("api", Arc::new(HttpProbe::new(client.clone(), url.clone())))
                .with_interval(Duration::from_secs(30))
                .with_timeout(Duration::from_secs(10))
                .critical(true)
                .with_retry(retry.clone()),
        );
    }

    if let Some(url) = &config.ml_url {
        checks.push(
            HealthCheck::new("ml", Arc::new(HttpProbe::new(client.clone(), url.clone())))
                .with_interval(Duration::from_secs(60))
                .with_timeout(Duration::from_secs(15)),
        );
    }

    if let Some(addr) = &config.cache_addr {
        checks.push(
            HealthCheck::new("cache", Arc::new(TcpProbe::new(addr.clone())))
                .with_interval(Duration::from_secs(30))
                .with_timeout(Duration::from_secs(5))
                .with_failure_threshold(5),
        );
    }

    if config.system_resources {
        let probe = SystemResourceProbe::new(
            SystemSampler::new(config.disk_path.clone()),
            config.thresholds.clone(),
        );
        checks.push(
            HealthCheck::new("system", Arc::new(probe))
                .with_interval(Duration::from_secs(60))
                .with_timeout(Duration::from_secs(5))
                .with_recovery_threshold(1),
        );
    }

    checks
}
