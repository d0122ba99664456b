use super::super::*;
use std::collections::BTreeMap;
use std::time::Duration;

const RT: Duration = Duration::from_millis(5);

fn component(status: HealthStatus, critical: bool) -> ComponentHealth {
    let mut health = ComponentHealth::new("component", critical);
    health.status = status;
    health
}

#[test]
fn test_first_success_makes_unknown_healthy() {
    let mut health = ComponentHealth::new("db", true);
    assert_eq!(health.status, HealthStatus::Unknown);

    let change = health.record_result(true, RT, None, 3, 2);
    assert_eq!(
        change,
        Some(StatusChange {
            from: HealthStatus::Unknown,
            to: HealthStatus::Healthy
        })
    );
    assert_eq!(health.total_checks, 1);
    assert_eq!(health.consecutive_successes, 1);
    assert_eq!(health.last_response_time, Some(RT));
    assert!(health.last_check.is_some());
}

#[test]
fn test_consecutive_failures_degrade_then_fail() {
    let mut health = ComponentHealth::new("db", true);
    health.record_result(true, RT, None, 3, 2);

    let first = health.record_result(false, RT, Some("refused".into()), 3, 2);
    assert_eq!(first.map(|c| c.to), Some(HealthStatus::Degraded));

    let second = health.record_result(false, RT, Some("refused".into()), 3, 2);
    assert_eq!(second, None);
    assert_eq!(health.status, HealthStatus::Degraded);

    let third = health.record_result(false, RT, Some("refused".into()), 3, 2);
    assert_eq!(
        third,
        Some(StatusChange {
            from: HealthStatus::Degraded,
            to: HealthStatus::Unhealthy
        })
    );

    // Further failures keep it unhealthy without another transition
    let fourth = health.record_result(false, RT, Some("still refused".into()), 3, 2);
    assert_eq!(fourth, None);
    assert_eq!(health.status, HealthStatus::Unhealthy);
    assert_eq!(health.consecutive_failures, 4);
    assert_eq!(health.total_failures, 4);
    assert_eq!(health.last_error.as_deref(), Some("still refused"));
}

#[test]
fn test_recovery_requires_consecutive_successes() {
    let mut health = component(HealthStatus::Unhealthy, true);

    assert_eq!(health.record_result(true, RT, None, 3, 2), None);
    assert_eq!(health.status, HealthStatus::Unhealthy);

    // A failure in between resets the success streak
    health.record_result(false, RT, Some("flap".into()), 3, 2);
    assert_eq!(health.record_result(true, RT, None, 3, 2), None);

    let change = health.record_result(true, RT, None, 3, 2);
    assert_eq!(
        change,
        Some(StatusChange {
            from: HealthStatus::Unhealthy,
            to: HealthStatus::Healthy
        })
    );
    // The last error stays visible after recovery
    assert_eq!(health.last_error.as_deref(), Some("flap"));
}

#[test]
fn test_degraded_needs_recovery_threshold_successes() {
    let mut health = ComponentHealth::new("db", true);
    health.record_result(true, RT, None, 3, 2);
    assert_eq!(health.status, HealthStatus::Healthy);

    health.record_result(false, RT, Some("refused".into()), 3, 2);
    health.record_result(false, RT, Some("refused".into()), 3, 2);
    assert_eq!(health.status, HealthStatus::Degraded);

    // One success resets the failure streak but does not restore healthy
    assert_eq!(health.record_result(true, RT, None, 3, 2), None);
    assert_eq!(health.status, HealthStatus::Degraded);
    assert_eq!(health.consecutive_failures, 0);

    let change = health.record_result(true, RT, None, 3, 2);
    assert_eq!(
        change,
        Some(StatusChange {
            from: HealthStatus::Degraded,
            to: HealthStatus::Healthy
        })
    );
}

#[test]
fn test_interleaved_success_does_not_heal_degraded() {
    let mut health = component(HealthStatus::Degraded, false);
    health.consecutive_failures = 2;

    health.record_result(true, RT, None, 3, 2);
    assert_eq!(health.status, HealthStatus::Degraded);

    // F,S,F,S never accumulates two consecutive successes
    health.record_result(false, RT, None, 3, 2);
    assert_eq!(health.status, HealthStatus::Degraded);
    health.record_result(true, RT, None, 3, 2);
    assert_eq!(health.status, HealthStatus::Degraded);
    assert_eq!(health.consecutive_failures, 0);
}

#[test]
fn test_zero_thresholds_behave_like_one() {
    let mut health = ComponentHealth::new("cache", false);
    health.record_result(false, RT, None, 0, 0);
    assert_eq!(health.status, HealthStatus::Unhealthy);

    health.record_result(true, RT, None, 0, 0);
    assert_eq!(health.status, HealthStatus::Healthy);
}

#[test]
fn test_overall_status_rules() {
    let summarize = |entries: Vec<(&str, HealthStatus, bool)>| {
        let components: BTreeMap<String, ComponentHealth> = entries
            .into_iter()
            .map(|(name, status, critical)| {
                let mut health = ComponentHealth::new(name, critical);
                health.status = status;
                (name.to_string(), health)
            })
            .collect();
        HealthSummary::from_components(components, None, false)
    };

    let empty = summarize(vec![]);
    assert_eq!(empty.overall_status, HealthStatus::Healthy);
    assert_eq!(empty.uptime_percentage, 100.0);

    let critical_down = summarize(vec![
        ("db", HealthStatus::Unhealthy, true),
        ("cache", HealthStatus::Healthy, false),
    ]);
    assert_eq!(critical_down.overall_status, HealthStatus::Unhealthy);
    assert_eq!(critical_down.uptime_percentage, 50.0);

    let optional_down = summarize(vec![
        ("db", HealthStatus::Healthy, true),
        ("cache", HealthStatus::Unhealthy, false),
    ]);
    assert_eq!(optional_down.overall_status, HealthStatus::Degraded);

    let degraded = summarize(vec![
        ("db", HealthStatus::Degraded, true),
        ("api", HealthStatus::Healthy, true),
    ]);
    assert_eq!(degraded.overall_status, HealthStatus::Degraded);

    let mixed = summarize(vec![
        ("a", HealthStatus::Healthy, true),
        ("b", HealthStatus::Healthy, false),
        ("c", HealthStatus::Unknown, false),
        ("d", HealthStatus::Degraded, false),
    ]);
    assert_eq!(mixed.overall_status, HealthStatus::Degraded);
    assert_eq!(mixed.uptime_percentage, 50.0);
}

#[test]
fn test_status_serializes_snake_case() {
    assert_eq!(serde_json::to_string(&HealthStatus::Unhealthy).unwrap(), "\"unhealthy\"");
    assert_eq!(HealthStatus::Degraded.to_string(), "degraded");
}
