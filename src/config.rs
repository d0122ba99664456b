use eyre::WrapErr;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::time::Duration;

use crate::cli::RunArgs;
use crate::health::{DefaultProbeConfig, HealthMonitorConfig};
use crate::lifecycle::LifecycleConfig;
use crate::retry::{CircuitBreakerConfig, RetryConfig};
use crate::task_manager::TaskManagerConfig;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub log_level: String,
    pub task_manager: TaskManagerSettings,
    pub retry: RetrySettings,
    pub circuit_breaker: CircuitBreakerSettings,
    pub health: HealthSettings,
    pub lifecycle: LifecycleSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskManagerSettings {
    pub cleanup_interval_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub exponential_base: f64,
    pub jitter: bool,
    pub jitter_range: f64,
    pub rate_limit_multiplier: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerSettings {
    pub failure_threshold: u32,
    pub cool_down_secs: u64,
    pub half_open_successes: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthSettings {
    pub system_check_interval_secs: u64,
    pub stop_timeout_secs: u64,
    pub probes: DefaultProbeConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LifecycleSettings {
    pub shutdown_timeout_secs: u64,
    pub exit_process: bool,
    pub exit_code: i32,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            task_manager: TaskManagerSettings::default(),
            retry: RetrySettings::default(),
            circuit_breaker: CircuitBreakerSettings::default(),
            health: HealthSettings::default(),
            lifecycle: LifecycleSettings::default(),
        }
    }
}

impl Default for TaskManagerSettings {
    fn default() -> Self {
        Self {
            cleanup_interval_secs: 60,
        }
    }
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_ms: 1_000,
            max_delay_ms: 60_000,
            exponential_base: 2.0,
            jitter: true,
            jitter_range: 0.1,
            rate_limit_multiplier: 5.0,
        }
    }
}

impl Default for CircuitBreakerSettings {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            cool_down_secs: 60,
            half_open_successes: 3,
        }
    }
}

impl Default for HealthSettings {
    fn default() -> Self {
        Self {
            system_check_interval_secs: 10,
            stop_timeout_secs: 5,
            probes: DefaultProbeConfig::default(),
        }
    }
}

impl Default for LifecycleSettings {
    fn default() -> Self {
        Self {
            shutdown_timeout_secs: 30,
            exit_process: false,
            exit_code: 0,
        }
    }
}

impl AppConfig {
    /// Load configuration from a YAML file. Missing fields take their defaults.
    pub fn from_file(path: &str) -> eyre::Result<Self> {
        let file = File::open(path).wrap_err_with(|| format!("Failed to open config file {path}"))?;
        serde_yaml::from_reader(file).wrap_err_with(|| format!("Failed to parse config file {path}"))
    }

    /// Build the effective configuration: the config file when given, then
    /// command line and environment overrides on top
    pub fn from_run_args(args: &RunArgs, cli_log_level: &str) -> eyre::Result<Self> {
        let mut config = match &args.config {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };

        config.log_level = cli_log_level.to_string();

        let probes = &mut config.health.probes;
        if let Some(addr) = &args.database_addr {
            probes.database_addr = Some(addr.clone());
        }
        if let Some(url) = &args.api_url {
            probes.api_url = Some(url.clone());
        }
        if let Some(url) = &args.ml_url {
            probes.ml_url = Some(url.clone());
        }
        if let Some(addr) = &args.cache_addr {
            probes.cache_addr = Some(addr.clone());
        }
        if args.no_system_probe {
            probes.system_resources = false;
        }
        if let Some(secs) = args.shutdown_timeout_secs {
            config.lifecycle.shutdown_timeout_secs = secs;
        }

        Ok(config)
    }

    pub fn to_yaml(&self) -> eyre::Result<String> {
        serde_yaml::to_string(self).wrap_err("Failed to serialize configuration")
    }

    pub fn get_task_manager_config(&self) -> TaskManagerConfig {
        TaskManagerConfig {
            cleanup_interval: Duration::from_secs(self.task_manager.cleanup_interval_secs),
        }
    }

    /// Default policy for wrapped operations; retryable kinds and status
    /// codes keep their defaults
    pub fn get_retry_config(&self) -> RetryConfig {
        let config = RetryConfig::default()
            .with_max_attempts(self.retry.max_attempts)
            .with_initial_delay(Duration::from_millis(self.retry.initial_delay_ms))
            .with_max_delay(Duration::from_millis(self.retry.max_delay_ms))
            .with_exponential_base(self.retry.exponential_base);

        let config = if self.retry.jitter {
            config.with_jitter_range(self.retry.jitter_range)
        } else {
            config.without_jitter()
        };

        RetryConfig {
            rate_limit_multiplier: self.retry.rate_limit_multiplier,
            ..config
        }
    }

    pub fn get_circuit_breaker_config(&self) -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_threshold: self.circuit_breaker.failure_threshold,
            cool_down: Duration::from_secs(self.circuit_breaker.cool_down_secs),
            half_open_successes: self.circuit_breaker.half_open_successes,
        }
    }

    pub fn get_health_monitor_config(&self) -> HealthMonitorConfig {
        HealthMonitorConfig {
            system_check_interval: Duration::from_secs(self.health.system_check_interval_secs),
            thresholds: self.health.probes.thresholds.clone(),
            stop_timeout: Duration::from_secs(self.health.stop_timeout_secs),
            disk_path: self.health.probes.disk_path.clone(),
        }
    }

    pub fn get_lifecycle_config(&self) -> LifecycleConfig {
        LifecycleConfig {
            shutdown_timeout: Duration::from_secs(self.lifecycle.shutdown_timeout_secs),
            exit_process: self.lifecycle.exit_process,
            exit_code: self.lifecycle.exit_code,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_app_config_default() {
        let config = AppConfig::default();
        assert_eq!(config.log_level, "info");
        assert_eq!(config.retry.max_attempts, 3);
        assert!(!config.lifecycle.exit_process);
        assert!(config.health.probes.system_resources);
        assert!(config.health.probes.database_addr.is_none());
    }

    #[test]
    fn test_partial_yaml_fills_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "retry:\n  max_attempts: 7\nhealth:\n  probes:\n    database_addr: \"10.0.0.5:5432\"\n"
        )
        .unwrap();

        let config = AppConfig::from_file(file.path().to_str().unwrap()).unwrap();
        assert_eq!(config.retry.max_attempts, 7);
        assert_eq!(config.retry.initial_delay_ms, 1_000);
        assert_eq!(
            config.health.probes.database_addr.as_deref(),
            Some("10.0.0.5:5432")
        );
        assert_eq!(config.lifecycle.shutdown_timeout_secs, 30);
    }

    #[test]
    fn test_missing_config_file_is_an_error() {
        let result = AppConfig::from_file("nonexistent-config.yaml");
        assert!(result.is_err());
        assert!(format!("{:?}", result.unwrap_err()).contains("nonexistent-config.yaml"));
    }

    #[test]
    fn test_run_args_override_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "health:\n  probes:\n    cache_addr: \"cache:6379\"\n    api_url: \"http://old/health\"\n"
        )
        .unwrap();

        let args = RunArgs {
            config: Some(file.path().to_str().unwrap().to_string()),
            api_url: Some("http://new/health".to_string()),
            no_system_probe: true,
            shutdown_timeout_secs: Some(12),
            ..RunArgs::default()
        };

        let config = AppConfig::from_run_args(&args, "debug").unwrap();
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.health.probes.api_url.as_deref(), Some("http://new/health"));
        assert_eq!(config.health.probes.cache_addr.as_deref(), Some("cache:6379"));
        assert!(!config.health.probes.system_resources);
        assert_eq!(
            config.get_lifecycle_config().shutdown_timeout,
            Duration::from_secs(12)
        );
    }

    #[test]
    fn test_derived_configs() {
        let mut config = AppConfig::default();
        config.retry.jitter = false;
        config.retry.initial_delay_ms = 250;
        config.circuit_breaker.failure_threshold = 2;

        let retry = config.get_retry_config();
        assert!(!retry.jitter);
        assert_eq!(retry.initial_delay, Duration::from_millis(250));
        assert_eq!(retry.rate_limit_multiplier, 5.0);

        assert_eq!(config.get_circuit_breaker_config().failure_threshold, 2);
        assert_eq!(
            config.get_task_manager_config().cleanup_interval,
            Duration::from_secs(60)
        );
        assert_eq!(
            config.get_health_monitor_config().system_check_interval,
            Duration::from_secs(10)
        );
    }

    #[test]
    fn test_yaml_round_trip() {
        let mut config = AppConfig::default();
        config.health.probes.ml_url = Some("http://ml:9000/health".to_string());

        let yaml = config.to_yaml().unwrap();
        let parsed: AppConfig = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(parsed.health.probes.ml_url, config.health.probes.ml_url);
    }
}
