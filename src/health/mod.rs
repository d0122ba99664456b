// Health Module - periodic component probing with failover hooks
//
// This module provides:
// - A consecutive-count state machine per component
// - Failover and recovery handlers fired on status transitions
// - Probe loops scheduled through a TaskManager
// - Linux system resource sampling with threshold warnings
// - TCP, HTTP and system-resource probes

pub mod types;
pub mod system;
pub mod probes;
pub mod monitor;

pub use types::{
    ComponentHealth, FnProbe, HealthCheck, HealthHandler, HealthProbe, HealthStatus, HealthSummary,
    StatusChange,
};
pub use system::{ResourceThresholds, SystemMetrics, SystemResourceProbe, SystemSampler};
pub use probes::{DefaultProbeConfig, HttpProbe, TcpProbe, default_health_checks};
pub use monitor::{HealthMonitor, HealthMonitorConfig};

#[cfg(test)]
mod tests;
