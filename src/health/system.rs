use std::path::PathBuf;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::health::types::HealthProbe;
use crate::task_manager::BoxError;

/// Limits above which a system sample logs a warning
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceThresholds {
    pub cpu_percent: f64,
    pub memory_percent: f64,
    pub disk_percent: f64,
    pub max_connections: u64,
}

impl Default for ResourceThresholds {
    fn default() -> Self {
        Self {
            cpu_percent: 80.0,
            memory_percent: 85.0,
            disk_percent: 90.0,
            max_connections: 1000,
        }
    }
}

impl ResourceThresholds {
    /// Describe every metric above its limit. Missing metrics never violate.
    pub fn violations(&self, metrics: &SystemMetrics) -> Vec<String> {
        let mut violations = Vec::new();

        if let Some(cpu) = metrics.cpu_percent.filter(|v| *v > self.cpu_percent) {
            violations.push(format!("cpu {cpu:.1}% > {:.1}%", self.cpu_percent));
        }
        if let Some(memory) = metrics.memory_percent.filter(|v| *v > self.memory_percent) {
            violations.push(format!("memory {memory:.1}% > {:.1}%", self.memory_percent));
        }
        if let Some(disk) = metrics.disk_percent.filter(|v| *v > self.disk_percent) {
            violations.push(format!("disk {disk:.1}% > {:.1}%", self.disk_percent));
        }
        if let Some(connections) = metrics.connections.filter(|v| *v > self.max_connections) {
            violations.push(format!(
                "connections {connections} > {}",
                self.max_connections
            ));
        }

        violations
    }
}

/// One system resource sample. Fields are `None` when the source is unavailable.
#[derive(Debug, Clone, Serialize)]
pub struct SystemMetrics {
    pub cpu_percent: Option<f64>,
    pub memory_percent: Option<f64>,
    pub disk_percent: Option<f64>,
    pub connections: Option<u64>,
    pub sampled_at: DateTime<Utc>,
}

/// One-minute load average as a percentage of available cores
pub fn parse_loadavg(contents: &str, cores: usize) -> Option<f64> {
    let load: f64 = contents.split_whitespace().next()?.parse().ok()?;
    Some(load / cores.max(1) as f64 * 100.0)
}

/// Used memory percentage from `/proc/meminfo`
pub fn parse_meminfo(contents: &str) -> Option<f64> {
    let mut total = None;
    let mut available = None;

    for line in contents.lines() {
        let mut parts = line.split_whitespace();
        match parts.next() {
            Some("MemTotal:") => total = parts.next().and_then(|v| v.parse::<f64>().ok()),
            Some("MemAvailable:") => available = parts.next().and_then(|v| v.parse::<f64>().ok()),
            _ => {}
        }
    }

    let total = total.filter(|t| *t > 0.0)?;
    Some((total - available?) / total * 100.0)
}

/// Established sockets in a `/proc/net/tcp` table
pub fn count_established(contents: &str) -> u64 {
    contents
        .lines()
        .skip(1)
        .filter(|line| line.split_whitespace().nth(3) == Some("01"))
        .count() as u64
}

/// Used space percentage of the filesystem holding `path`
#[cfg(unix)]
pub fn disk_usage(path: &str) -> Result<f64, String> {
    use std::mem::MaybeUninit;

    let c_path = std::ffi::CString::new(path).map_err(|e| e.to_string())?;
    let mut stat = MaybeUninit::<libc::statvfs>::uninit();

    let result = unsafe { libc::statvfs(c_path.as_ptr(), stat.as_mut_ptr()) };
    if result != 0 {
        return Err(format!("statvfs failed for {path}"));
    }

    let stat = unsafe { stat.assume_init() };
    let total = stat.f_blocks as u64 * stat.f_frsize as u64;
    if total == 0 {
        return Err(format!("filesystem at {path} reports zero size"));
    }
    let free = stat.f_bfree as u64 * stat.f_frsize as u64;
    Ok((total - free) as f64 / total as f64 * 100.0)
}

#[cfg(not(unix))]
pub fn disk_usage(path: &str) -> Result<f64, String> {
    Err(format!("disk usage unsupported on this platform for {path}"))
}

/// Reads system metrics from procfs and statvfs. Sampling blocks on file
/// reads, so async callers run it through `spawn_blocking`.
#[derive(Debug, Clone)]
pub struct SystemSampler {
    proc_root: PathBuf,
    disk_path: String,
}

impl Default for SystemSampler {
    fn default() -> Self {
        Self::new("/")
    }
}

impl SystemSampler {
    pub fn new(disk_path: impl Into<String>) -> Self {
        Self {
            proc_root: PathBuf::from("/proc"),
            disk_path: disk_path.into(),
        }
    }

    /// Read procfs files from `proc_root` instead of `/proc`
    pub fn with_proc_root(mut self, proc_root: impl Into<PathBuf>) -> Self {
        self.proc_root = proc_root.into();
        self
    }

    pub fn sample(&self) -> SystemMetrics {
        let cores = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);

        let cpu_percent = self
            .read("loadavg")
            .and_then(|contents| parse_loadavg(&contents, cores));
        let memory_percent = self.read("meminfo").and_then(|contents| parse_meminfo(&contents));

        let connections = ["net/tcp", "net/tcp6"]
            .iter()
            .filter_map(|table| self.read(table))
            .map(|contents| count_established(&contents))
            .reduce(|a, b| a + b);

        let disk_percent = match disk_usage(&self.disk_path) {
            Ok(percent) => Some(percent),
            Err(e) => {
                tracing::debug!(path = %self.disk_path, error = %e, "Disk usage unavailable");
                None
            }
        };

        SystemMetrics {
            cpu_percent,
            memory_percent,
            disk_percent,
            connections,
            sampled_at: Utc::now(),
        }
    }

    fn read(&self, relative: &str) -> Option<String> {
        std::fs::read_to_string(self.proc_root.join(relative)).ok()
    }
}

/// Fails when any sampled metric exceeds its threshold
#[derive(Debug, Clone, Default)]
pub struct SystemResourceProbe {
    sampler: SystemSampler,
    thresholds: ResourceThresholds,
}

impl SystemResourceProbe {
    pub fn new(sampler: SystemSampler, thresholds: ResourceThresholds) -> Self {
        Self {
            sampler,
            thresholds,
        }
    }
}

#[async_trait]
impl HealthProbe for SystemResourceProbe {
    async fn check(&self) -> Result<bool, BoxError> {
        let sampler = self.sampler.clone();
        let metrics = tokio::task::spawn_blocking(move || sampler.sample()).await?;

        let violations = self.thresholds.violations(&metrics);
        if violations.is_empty() {
            Ok(true)
        } else {
            Err(format!("resource thresholds exceeded: {}", violations.join(", ")).into())
        }
    }
}
