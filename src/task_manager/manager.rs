use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use futures::FutureExt;
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::{AbortHandle, JoinHandle};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::task_manager::config::{ShutdownStatus, TaskManagerConfig};
use crate::task_manager::error::TaskManagerError;
use crate::task_manager::handle::TaskHandle;
use crate::task_manager::logging::{CorrelationId, TaskFailure, TaskLoggingContext, panic_message};
use crate::task_manager::types::{
    ShutdownPhase, TaskCompletion, TaskManagerStats, TaskOutcome, TaskResult, TaskState,
    TaskStatus,
};

/// One task tracked by a manager
struct ManagedTask {
    name: String,
    correlation_id: CorrelationId,
    created_at: DateTime<Utc>,
    started: Instant,
    cancel_on_shutdown: bool,
    token: CancellationToken,
    abort: AbortHandle,
    done_rx: watch::Receiver<Option<TaskCompletion>>,
}

impl ManagedTask {
    fn completion(&self) -> Option<TaskCompletion> {
        self.done_rx.borrow().clone()
    }

    fn is_done(&self) -> bool {
        self.done_rx.borrow().is_some() || self.abort.is_finished()
    }

    fn state(&self) -> TaskState {
        match self.completion() {
            Some(completion) => completion.outcome.state(),
            None if self.abort.is_finished() => TaskState::Abandoned,
            None => TaskState::Running,
        }
    }

    fn status(&self) -> TaskStatus {
        let completion = self.completion();
        let running_time = completion
            .as_ref()
            .map(|c| c.duration)
            .unwrap_or_else(|| self.started.elapsed());

        TaskStatus {
            name: self.name.clone(),
            state: self.state(),
            done: self.is_done(),
            cancelled: self.token.is_cancelled(),
            cancel_on_shutdown: self.cancel_on_shutdown,
            created_at: self.created_at,
            running_time,
        }
    }
}

/// Wait until the task publishes its completion. A closed channel with no
/// completion means the task was aborted before it could report.
async fn await_completion(
    task_name: String,
    started: Instant,
    mut rx: watch::Receiver<Option<TaskCompletion>>,
) -> TaskCompletion {
    let completion = match rx.wait_for(|c| c.is_some()).await {
        Ok(value) => value.clone(),
        Err(_) => None,
    };

    completion.unwrap_or_else(|| TaskCompletion {
        task_name,
        outcome: TaskOutcome::Abandoned,
        duration: started.elapsed(),
    })
}

struct CleanupLoop {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

struct ManagerInner {
    name: String,
    config: TaskManagerConfig,
    tasks: Mutex<HashMap<String, ManagedTask>>,
    task_counter: AtomicU64,
    shutdown_started: AtomicBool,
    shutdown_status: Mutex<ShutdownStatus>,
    cleanup: Mutex<Option<CleanupLoop>>,
}

impl Drop for ManagerInner {
    fn drop(&mut self) {
        if let Some(cleanup) = self.cleanup.get_mut().take() {
            cleanup.token.cancel();
        }
    }
}

/// Named owner of a collection of concurrently running tasks.
///
/// Cloning is cheap and every clone refers to the same task collection.
#[derive(Clone)]
pub struct TaskManager {
    inner: Arc<ManagerInner>,
}

impl std::fmt::Debug for TaskManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskManager")
            .field("name", &self.inner.name)
            .field("tasks", &self.len())
            .field("shutting_down", &self.is_shutting_down())
            .finish()
    }
}

impl TaskManager {
    /// Create a new TaskManager with default configuration
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_config(name, TaskManagerConfig::default())
    }

    /// Create a new TaskManager with custom configuration
    pub fn with_config(name: impl Into<String>, config: TaskManagerConfig) -> Self {
        Self {
            inner: Arc::new(ManagerInner {
                name: name.into(),
                config,
                tasks: Mutex::new(HashMap::new()),
                task_counter: AtomicU64::new(0),
                shutdown_started: AtomicBool::new(false),
                shutdown_status: Mutex::new(ShutdownStatus::new()),
                cleanup: Mutex::new(None),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn config(&self) -> &TaskManagerConfig {
        &self.inner.config
    }

    /// Start the periodic cleanup loop. Calling it again is a no-op.
    pub fn start(&self) {
        let mut cleanup = self.inner.cleanup.lock();
        if cleanup.is_some() || self.is_shutting_down() {
            return;
        }

        let Ok(runtime) = Handle::try_current() else {
            tracing::warn!(
                manager = %self.inner.name,
                "No tokio runtime available, periodic task cleanup disabled"
            );
            return;
        };

        let token = CancellationToken::new();
        let loop_token = token.clone();
        let weak: Weak<ManagerInner> = Arc::downgrade(&self.inner);
        let period = self.inner.config.cleanup_interval.max(Duration::from_millis(1));

        let handle = runtime.spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // the first tick completes immediately
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = loop_token.cancelled() => break,
                    _ = ticker.tick() => {
                        let Some(inner) = weak.upgrade() else { break };
                        TaskManager { inner }.cleanup_completed();
                    }
                }
            }
        });

        tracing::debug!(
            manager = %self.inner.name,
            interval_secs = period.as_secs(),
            "Task cleanup loop started"
        );

        *cleanup = Some(CleanupLoop { token, handle });
    }

    /// Schedule `work` on the runtime and track it under `name`.
    ///
    /// `work` receives the task's cancellation token. When `name` is `None` a
    /// name of the form `{manager}-task-{n}` is generated. Failures and panics
    /// inside the task are logged at the task boundary and never propagate to
    /// the manager.
    pub fn create_task<T, F, Fut>(
        &self,
        name: Option<&str>,
        cancel_on_shutdown: bool,
        work: F,
    ) -> Result<TaskHandle<T>, TaskManagerError>
    where
        T: Send + 'static,
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = TaskResult<T>> + Send + 'static,
    {
        let task_name = match name {
            Some(name) => name.to_string(),
            None => {
                let n = self.inner.task_counter.fetch_add(1, Ordering::SeqCst) + 1;
                format!("{}-task-{}", self.inner.name, n)
            }
        };

        if self.is_shutting_down() {
            tracing::warn!(
                manager = %self.inner.name,
                task_name = %task_name,
                "Task creation rejected, manager is shut down"
            );
            return Err(TaskManagerError::AlreadyShutDown(self.inner.name.clone()));
        }

        let token = CancellationToken::new();
        let correlation_id = CorrelationId::new();
        let (done_tx, done_rx) = watch::channel(None);
        let work_future = work(token.clone());

        let logging_context = TaskLoggingContext::new(correlation_id, &self.inner.name, &task_name);
        let span = logging_context.create_span();
        let span_for_recording = span.clone();
        let boundary_token = token.clone();
        let boundary_name = task_name.clone();

        let wrapped = async move {
            tracing::debug!("Starting task execution");

            let started = Instant::now();
            let result = AssertUnwindSafe(work_future).catch_unwind().await;
            let duration = started.elapsed();
            span_for_recording.record("duration_ms", duration.as_millis() as u64);

            let (outcome, value) = match result {
                Ok(Ok(value)) => (TaskOutcome::Completed, Some(value)),
                Ok(Err(error)) if boundary_token.is_cancelled() => {
                    tracing::debug!(error = %error, "Task exited with error after cancellation");
                    (TaskOutcome::Cancelled, None)
                }
                Ok(Err(error)) => {
                    TaskFailure::from_error(&boundary_name, error.as_ref()).log_structured();
                    (
                        TaskOutcome::Failed {
                            error: error.to_string(),
                        },
                        None,
                    )
                }
                Err(payload) => {
                    let message = panic_message(payload.as_ref());
                    tracing::error!(panic = %message, "Task panicked");
                    (TaskOutcome::Panicked { message }, None)
                }
            };

            span_for_recording.record("result", outcome.state().as_str());
            tracing::debug!(
                duration_ms = duration.as_millis() as u64,
                outcome = %outcome,
                "Task finished"
            );

            done_tx.send_replace(Some(TaskCompletion {
                task_name: boundary_name,
                outcome: outcome.clone(),
                duration,
            }));

            match value {
                Some(value) => Ok(value),
                None => Err(outcome),
            }
        }
        .instrument(span);

        let mut tasks = self.inner.tasks.lock();

        // re-checked under the lock so shutdown never misses a task
        if self.is_shutting_down() {
            return Err(TaskManagerError::AlreadyShutDown(self.inner.name.clone()));
        }

        if let Some(existing) = tasks.get(&task_name) {
            if !existing.is_done() {
                return Err(TaskManagerError::DuplicateTask(task_name));
            }
            tracing::debug!(
                manager = %self.inner.name,
                task_name = %task_name,
                "Replacing finished task with the same name"
            );
        }

        let runtime =
            Handle::try_current().map_err(|_| TaskManagerError::NoRuntime(task_name.clone()))?;
        let join_handle = runtime.spawn(wrapped);

        tasks.insert(
            task_name.clone(),
            ManagedTask {
                name: task_name.clone(),
                correlation_id,
                created_at: Utc::now(),
                started: Instant::now(),
                cancel_on_shutdown,
                token: token.clone(),
                abort: join_handle.abort_handle(),
                done_rx,
            },
        );
        drop(tasks);

        tracing::debug!(
            manager = %self.inner.name,
            task_name = %task_name,
            correlation_id = %correlation_id,
            cancel_on_shutdown = cancel_on_shutdown,
            "Task created"
        );

        Ok(TaskHandle::new(task_name, correlation_id, token, join_handle))
    }

    /// Cancel one task and wait up to `timeout` for it to unwind.
    ///
    /// Returns whether cancellation was issued; `false` when the task is
    /// unknown or already done.
    pub async fn cancel_task(&self, name: &str, timeout: Duration) -> bool {
        let (token, correlation_id, started, rx) = {
            let tasks = self.inner.tasks.lock();
            match tasks.get(name) {
                Some(task) if !task.is_done() => (
                    task.token.clone(),
                    task.correlation_id,
                    task.started,
                    task.done_rx.clone(),
                ),
                _ => return false,
            }
        };

        token.cancel();

        match tokio::time::timeout(timeout, await_completion(name.to_string(), started, rx)).await {
            Ok(completion) => {
                let mut tasks = self.inner.tasks.lock();
                if tasks
                    .get(name)
                    .is_some_and(|task| task.correlation_id == correlation_id)
                {
                    tasks.remove(name);
                }
                tracing::info!(
                    manager = %self.inner.name,
                    task_name = %name,
                    outcome = %completion.outcome,
                    "Task cancelled"
                );
            }
            Err(_) => {
                tracing::warn!(
                    manager = %self.inner.name,
                    task_name = %name,
                    timeout_ms = timeout.as_millis() as u64,
                    "Task did not finish within cancellation timeout"
                );
            }
        }

        true
    }

    /// Wait for a task to finish, optionally bounded by `timeout`
    pub async fn wait_for_task(
        &self,
        name: &str,
        timeout: Option<Duration>,
    ) -> Result<TaskCompletion, TaskManagerError> {
        let (started, rx) = {
            let tasks = self.inner.tasks.lock();
            let task = tasks
                .get(name)
                .ok_or_else(|| TaskManagerError::TaskNotFound(name.to_string()))?;
            (task.started, task.done_rx.clone())
        };

        let wait = await_completion(name.to_string(), started, rx);
        match timeout {
            Some(timeout) => tokio::time::timeout(timeout, wait).await.map_err(|_| {
                TaskManagerError::WaitTimeout {
                    name: name.to_string(),
                    timeout,
                }
            }),
            None => Ok(wait.await),
        }
    }

    pub fn get_task_status(&self, name: &str) -> Option<TaskStatus> {
        self.inner.tasks.lock().get(name).map(ManagedTask::status)
    }

    pub fn get_all_tasks_status(&self) -> Vec<TaskStatus> {
        let mut statuses: Vec<TaskStatus> = self
            .inner
            .tasks
            .lock()
            .values()
            .map(ManagedTask::status)
            .collect();
        statuses.sort_by(|a, b| a.name.cmp(&b.name));
        statuses
    }

    /// Remove every finished task from the collection, returning how many
    pub fn cleanup_completed(&self) -> usize {
        let mut tasks = self.inner.tasks.lock();
        let before = tasks.len();
        tasks.retain(|_, task| !task.is_done());
        let removed = before - tasks.len();

        if removed > 0 {
            tracing::debug!(
                manager = %self.inner.name,
                removed = removed,
                remaining = tasks.len(),
                "Cleaned up completed tasks"
            );
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.inner.tasks.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.tasks.lock().is_empty()
    }

    pub fn is_shutting_down(&self) -> bool {
        self.inner.shutdown_started.load(Ordering::SeqCst)
    }

    pub fn shutdown_status(&self) -> ShutdownStatus {
        self.inner.shutdown_status.lock().clone()
    }

    pub fn stats(&self) -> TaskManagerStats {
        let tasks = self.inner.tasks.lock();
        let mut tasks_by_state = HashMap::new();
        for task in tasks.values() {
            *tasks_by_state.entry(task.state()).or_insert(0) += 1;
        }

        TaskManagerStats {
            manager: self.inner.name.clone(),
            total_tasks: tasks.len(),
            tasks_by_state,
            is_shutting_down: self.is_shutting_down(),
        }
    }

    fn transition_shutdown_phase(&self, new_phase: ShutdownPhase) {
        let mut status = self.inner.shutdown_status.lock();
        let old_phase = status.phase;
        status.phase = new_phase;

        tracing::debug!(
            manager = %self.inner.name,
            old_phase = %old_phase,
            new_phase = %new_phase,
            "Shutdown phase transition"
        );
    }

    /// Shut the manager down.
    ///
    /// Stops accepting tasks, stops the cleanup loop, cancels every task
    /// created with `cancel_on_shutdown`, waits for them concurrently up to
    /// `timeout`, aborts whatever is left and clears the collection. A second
    /// call logs a warning and returns the current status.
    pub async fn shutdown(&self, timeout: Duration) -> ShutdownStatus {
        if self.inner.shutdown_started.swap(true, Ordering::SeqCst) {
            tracing::warn!(
                manager = %self.inner.name,
                "Shutdown already initiated, ignoring duplicate call"
            );
            return self.shutdown_status();
        }

        let started = Instant::now();
        self.inner.shutdown_status.lock().started_at = Some(Utc::now());
        self.transition_shutdown_phase(ShutdownPhase::StopAccepting);

        if let Some(cleanup) = self.inner.cleanup.lock().take() {
            cleanup.token.cancel();
            cleanup.handle.abort();
        }

        let (cancellable, detached, initial_task_count) = {
            let tasks = self.inner.tasks.lock();
            let mut cancellable = Vec::new();
            let mut detached = Vec::new();
            for task in tasks.values().filter(|task| !task.is_done()) {
                if task.cancel_on_shutdown {
                    task.token.cancel();
                    cancellable.push((task.name.clone(), task.started, task.done_rx.clone()));
                } else {
                    detached.push(task.name.clone());
                }
            }
            (cancellable, detached, tasks.len())
        };

        self.inner.shutdown_status.lock().initial_task_count = initial_task_count;

        tracing::info!(
            manager = %self.inner.name,
            initial_task_count = initial_task_count,
            cancelling = cancellable.len(),
            timeout_ms = timeout.as_millis() as u64,
            "Shutting down task manager"
        );

        self.transition_shutdown_phase(ShutdownPhase::WaitingForTasks);

        let names: Vec<String> = cancellable.iter().map(|(name, _, _)| name.clone()).collect();
        let waits = cancellable
            .into_iter()
            .map(|(name, task_started, rx)| await_completion(name, task_started, rx));
        let graceful = tokio::time::timeout(timeout, futures::future::join_all(waits))
            .await
            .is_ok();

        let mut abandoned = Vec::new();
        if !graceful {
            self.transition_shutdown_phase(ShutdownPhase::ForceTerminating);
            let tasks = self.inner.tasks.lock();
            for name in &names {
                if let Some(task) = tasks.get(name).filter(|task| !task.is_done()) {
                    task.abort.abort();
                    abandoned.push(name.clone());
                }
            }
            drop(tasks);

            tracing::warn!(
                manager = %self.inner.name,
                abandoned = ?abandoned,
                timeout_ms = timeout.as_millis() as u64,
                "Tasks did not finish within shutdown timeout, aborting"
            );
        }

        if !detached.is_empty() {
            tracing::info!(
                manager = %self.inner.name,
                detached = ?detached,
                "Leaving tasks not flagged for cancellation running"
            );
        }

        self.inner.tasks.lock().clear();
        self.transition_shutdown_phase(ShutdownPhase::Complete);

        let final_status = {
            let mut status = self.inner.shutdown_status.lock();
            status.tasks_cancelled = names.len() - abandoned.len();
            status.tasks_abandoned = abandoned.len();
            status.tasks_detached = detached.len();
            status.completed_gracefully = abandoned.is_empty();
            status.elapsed = started.elapsed();
            status.clone()
        };

        tracing::info!(
            manager = %self.inner.name,
            shutdown_duration_ms = final_status.elapsed.as_millis() as u64,
            completed_gracefully = final_status.completed_gracefully,
            tasks_cancelled = final_status.tasks_cancelled,
            tasks_abandoned = final_status.tasks_abandoned,
            "Shutdown complete"
        );

        final_status
    }
}
