use super::super::*;
use std::time::{Duration, Instant};
use tokio::time::sleep;

#[tokio::test]
async fn test_register_service_is_idempotent() {
    let registry = TaskRegistry::new();

    let first = registry.register_service("ingest");
    let second = registry.register_service("ingest");
    assert_eq!(registry.len(), 1);

    first
        .create_task(Some("loop"), true, |token| async move {
            token.cancelled().await;
            Ok::<_, BoxError>(())
        })
        .unwrap();

    // Both handles refer to the same manager
    assert_eq!(second.len(), 1);
    assert!(second.get_task_status("loop").is_some());
    assert_eq!(registry.get_service("ingest").map(|m| m.len()), Some(1));
    assert!(registry.get_service("missing").is_none());

    registry.shutdown_all(Duration::from_secs(1)).await;
}

#[tokio::test]
async fn test_services_are_isolated() {
    let registry = TaskRegistry::new();
    let api = registry.register_service("api");
    let worker = registry.register_service("worker");

    api.create_task(Some("same_name"), true, |_token| async { Ok::<_, BoxError>(()) })
        .unwrap();
    worker
        .create_task(Some("same_name"), true, |_token| async { Ok::<_, BoxError>(()) })
        .unwrap();

    assert_eq!(registry.service_names(), vec!["api".to_string(), "worker".to_string()]);
    let stats = registry.stats();
    assert_eq!(stats["api"].total_tasks, 1);
    assert_eq!(stats["worker"].total_tasks, 1);

    registry.shutdown_all(Duration::from_secs(1)).await;
}

#[tokio::test]
async fn test_unregister_service() {
    let registry = TaskRegistry::new();
    let manager = registry.register_service("ephemeral");

    assert!(registry.unregister_service("missing", Duration::from_millis(10)).await.is_none());

    let status = registry
        .unregister_service("ephemeral", Duration::from_millis(100))
        .await
        .unwrap();
    assert_eq!(status.phase, ShutdownPhase::Complete);
    assert!(manager.is_shutting_down());
    assert!(registry.is_empty());

    // A later registration under the same name gets a fresh manager
    let fresh = registry.register_service("ephemeral");
    assert!(!fresh.is_shutting_down());
    registry.shutdown_all(Duration::from_millis(100)).await;
}

#[tokio::test]
async fn test_shutdown_all_runs_concurrently() {
    let registry = TaskRegistry::new();
    let timeout = Duration::from_millis(200);

    for service in ["one", "two", "three"] {
        let manager = registry.register_service(service);
        manager
            .create_task(Some("stuck"), true, |_token| async {
                sleep(Duration::from_secs(10)).await;
                Ok::<_, BoxError>(())
            })
            .unwrap();
    }

    let started = Instant::now();
    let report = registry.shutdown_all(timeout).await;
    let elapsed = started.elapsed();

    // Bounded by one timeout, not the sum of three
    assert!(elapsed >= timeout);
    assert!(elapsed < Duration::from_millis(550));
    assert_eq!(report.services.len(), 3);
    assert!(report.failed.is_empty());
    assert!(report.services.values().all(|s| s.tasks_abandoned == 1));
    assert!(registry.is_empty());
}

#[tokio::test]
async fn test_shutdown_all_tolerates_empty_and_shut_down_managers() {
    let registry = TaskRegistry::new();
    let empty = registry.shutdown_all(Duration::from_millis(50)).await;
    assert!(empty.services.is_empty());

    let already = registry.register_service("already");
    registry.register_service("idle");
    already.shutdown(Duration::from_millis(50)).await;

    let report = registry.shutdown_all(Duration::from_millis(50)).await;
    assert_eq!(report.services.len(), 2);
    assert!(report.failed.is_empty());
    assert!(report.services["already"].is_complete());
    assert!(report.services["idle"].completed_gracefully);
}
