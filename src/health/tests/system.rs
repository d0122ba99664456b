use super::super::system::{count_established, parse_loadavg, parse_meminfo};
use super::super::*;
use crate::retry::{ErrorKind, RetryConfig};
use chrono::Utc;

const TCP_TABLE: &str = "\
  sl  local_address rem_address   st tx_queue rx_queue tr tm->when retrnsmt   uid  timeout inode
   0: 0100007F:1F90 00000000:0000 0A 00000000:00000000 00:00000000 00000000  1000        0 1 1
   1: 0100007F:1F90 0100007F:D2F0 01 00000000:00000000 00:00000000 00000000  1000        0 2 1
   2: 0100007F:D2F0 0100007F:1F90 01 00000000:00000000 00:00000000 00000000  1000        0 3 1
   3: 0100007F:D2F2 0100007F:1F90 06 00000000:00000000 00:00000000 00000000  1000        0 4 1
";

const MEMINFO: &str = "\
MemTotal:        1000 kB
MemFree:          100 kB
MemAvailable:     250 kB
Buffers:           10 kB
";

#[test]
fn test_parse_loadavg_scales_by_cores() {
    assert_eq!(parse_loadavg("1.00 0.50 0.25 1/100 4242\n", 4), Some(25.0));
    assert_eq!(parse_loadavg("2.00 0.50 0.25 1/100 4242\n", 0), Some(200.0));
    assert_eq!(parse_loadavg("", 4), None);
    assert_eq!(parse_loadavg("garbage", 4), None);
}

#[test]
fn test_parse_meminfo_uses_available_memory() {
    assert_eq!(parse_meminfo(MEMINFO), Some(75.0));
    assert_eq!(parse_meminfo("MemTotal: 1000 kB\n"), None);
    assert_eq!(parse_meminfo("MemTotal: 0 kB\nMemAvailable: 0 kB\n"), None);
}

#[test]
fn test_count_established_skips_header_and_other_states() {
    assert_eq!(count_established(TCP_TABLE), 2);
    assert_eq!(count_established(""), 0);
}

#[test]
fn test_threshold_violations() {
    let thresholds = ResourceThresholds::default();
    let metrics = SystemMetrics {
        cpu_percent: Some(95.0),
        memory_percent: Some(50.0),
        disk_percent: None,
        connections: Some(1500),
        sampled_at: Utc::now(),
    };

    let violations = thresholds.violations(&metrics);
    assert_eq!(violations.len(), 2);
    assert!(violations[0].starts_with("cpu"));
    assert!(violations[1].starts_with("connections"));

    let quiet = SystemMetrics {
        cpu_percent: None,
        memory_percent: None,
        disk_percent: None,
        connections: None,
        sampled_at: Utc::now(),
    };
    assert!(thresholds.violations(&quiet).is_empty());
}

#[test]
fn test_sampler_reads_proc_root() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir(dir.path().join("net")).unwrap();
    std::fs::write(dir.path().join("loadavg"), "0.10 0.05 0.01 1/100 4242\n").unwrap();
    std::fs::write(dir.path().join("meminfo"), MEMINFO).unwrap();
    std::fs::write(dir.path().join("net/tcp"), TCP_TABLE).unwrap();

    let metrics = SystemSampler::new("/").with_proc_root(dir.path()).sample();
    assert!(metrics.cpu_percent.is_some());
    assert_eq!(metrics.memory_percent, Some(75.0));
    // tcp6 is absent so only the ipv4 table counts
    assert_eq!(metrics.connections, Some(2));
}

#[test]
fn test_sampler_tolerates_missing_sources() {
    let dir = tempfile::tempdir().unwrap();
    let metrics = SystemSampler::new("/definitely/not/a/mount")
        .with_proc_root(dir.path())
        .sample();

    assert_eq!(metrics.cpu_percent, None);
    assert_eq!(metrics.memory_percent, None);
    assert_eq!(metrics.connections, None);
    assert_eq!(metrics.disk_percent, None);
}

#[tokio::test]
async fn test_system_probe_fails_on_violation() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("meminfo"), MEMINFO).unwrap();

    let sampler = SystemSampler::new("/").with_proc_root(dir.path());
    let strict = ResourceThresholds {
        memory_percent: 50.0,
        disk_percent: 100.0,
        ..ResourceThresholds::default()
    };
    let error = SystemResourceProbe::new(sampler.clone(), strict)
        .check()
        .await
        .unwrap_err();
    assert!(error.to_string().contains("memory"));

    let relaxed = ResourceThresholds {
        memory_percent: 90.0,
        disk_percent: 100.0,
        ..ResourceThresholds::default()
    };
    assert!(SystemResourceProbe::new(sampler, relaxed).check().await.unwrap());
}

#[tokio::test]
async fn test_tcp_probe_against_local_listener() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    assert!(TcpProbe::new(addr.to_string()).check().await.unwrap());

    drop(listener);
    assert!(TcpProbe::new(addr.to_string()).check().await.is_err());
}

#[test]
fn test_default_checks_follow_configured_targets() {
    let client = reqwest::Client::new();
    let retry = RetryConfig::default().with_max_attempts(4);

    let none = DefaultProbeConfig {
        system_resources: false,
        ..DefaultProbeConfig::default()
    };
    assert!(default_health_checks(&none, &client, &retry).is_empty());

    let all = DefaultProbeConfig {
        database_addr: Some("127.0.0.1:5432".into()),
        api_url: Some("http://127.0.0.1:8080/health".into()),
        ml_url: Some("http://127.0.0.1:9000/health".into()),
        cache_addr: Some("127.0.0.1:6379".into()),
        ..DefaultProbeConfig::default()
    };
    let checks = default_health_checks(&all, &client, &retry);
    let names: Vec<&str> = checks.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, vec!["database", "api", "ml", "cache", "system"]);

    let critical: Vec<&str> = checks
        .iter()
        .filter(|c| c.critical)
        .map(|c| c.name.as_str())
        .collect();
    assert_eq!(critical, vec!["database", "api"]);
    let database_retry = checks[0].retry.as_ref().unwrap();
    assert_eq!(database_retry.max_attempts, 4);
    assert!(database_retry.is_retryable(ErrorKind::NetworkError));
    assert!(!database_retry.is_retryable(ErrorKind::ServerError));
    assert_eq!(checks[1].retry.as_ref().unwrap().max_attempts, 4);
    assert!(checks[2].retry.is_none());
    assert_eq!(checks[3].failure_threshold, 5);
}
