use super::super::*;
use std::time::{Duration, Instant};
use tokio::time::sleep;

#[tokio::test]
async fn test_cancel_cooperative_task() {
    let manager = TaskManager::new("cancel");

    manager
        .create_task(Some("loop"), true, |token| async move {
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = sleep(Duration::from_millis(5)) => {}
                }
            }
            Ok::<_, BoxError>(())
        })
        .unwrap();

    assert!(manager.cancel_task("loop", Duration::from_secs(1)).await);
    // Cancelled tasks that finished are removed
    assert!(manager.get_task_status("loop").is_none());
    assert!(manager.is_empty());
}

#[tokio::test]
async fn test_cancel_unknown_or_finished_task() {
    let manager = TaskManager::new("cancel");

    assert!(!manager.cancel_task("missing", Duration::from_millis(10)).await);

    manager
        .create_task(Some("finished"), true, |_token| async { Ok::<_, BoxError>(()) })
        .unwrap();
    manager.wait_for_task("finished", None).await.unwrap();

    assert!(!manager.cancel_task("finished", Duration::from_millis(10)).await);
    assert!(manager.get_task_status("finished").is_some());
}

#[tokio::test]
async fn test_cancel_uncooperative_task_times_out() {
    let manager = TaskManager::new("cancel");

    manager
        .create_task(Some("stubborn"), true, |_token| async {
            sleep(Duration::from_secs(10)).await;
            Ok::<_, BoxError>(())
        })
        .unwrap();

    let started = Instant::now();
    assert!(manager.cancel_task("stubborn", Duration::from_millis(50)).await);
    assert!(started.elapsed() < Duration::from_secs(1));

    // Cancellation was issued but the task is still tracked
    let status = manager.get_task_status("stubborn").unwrap();
    assert!(status.cancelled);
    assert!(!status.done);

    let report = manager.shutdown(Duration::from_millis(50)).await;
    assert_eq!(report.tasks_abandoned, 1);
}

#[tokio::test]
async fn test_handle_cancel_records_cancelled_outcome() {
    let manager = TaskManager::new("cancel");

    let handle = manager
        .create_task(Some("listener"), true, |token| async move {
            token.cancelled().await;
            Err::<(), BoxError>("listener stopped".into())
        })
        .unwrap();

    handle.cancel();
    assert!(handle.is_cancelled());

    match handle.join().await {
        Err(TaskManagerError::TaskDidNotComplete { name, outcome }) => {
            assert_eq!(name, "listener");
            assert_eq!(outcome, TaskOutcome::Cancelled);
        }
        other => panic!("unexpected join result: {other:?}"),
    }

    let status = manager.get_task_status("listener").unwrap();
    assert_eq!(status.state, TaskState::Cancelled);
    assert!(status.cancelled);
}

#[tokio::test]
async fn test_running_time_tracks_elapsed() {
    let manager = TaskManager::new("timing");

    manager
        .create_task(Some("sleeper"), true, |_token| async {
            sleep(Duration::from_millis(30)).await;
            Ok::<_, BoxError>(())
        })
        .unwrap();

    sleep(Duration::from_millis(10)).await;
    let running = manager.get_task_status("sleeper").unwrap();
    assert!(running.running_time >= Duration::from_millis(10));

    manager.wait_for_task("sleeper", None).await.unwrap();
    let finished = manager.get_task_status("sleeper").unwrap();
    assert!(finished.running_time >= Duration::from_millis(30));
}
