//! Task lifecycle executor.
//!
//! [`TaskExecutor::submit`] admits a `pending` task and returns. The task then
//! runs on its own tokio task, tracked by a [`TaskTracker`] and bounded by a
//! semaphore:
//!
//! ```text
//! pending ──► running ──► completed
//!    │           └──────► failed
//!    └──────────────────► failed      (no handler for the type)
//! ```
//!
//! Every transition is written to the [`TaskStore`] and then handed to the
//! [`TaskNotifier`]. All transitions for one id happen on the same spawned
//! task, so they are strictly ordered.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use futures::FutureExt;
use metrics::{counter, gauge};
use relay_core::{RelayError, Result, Task, TaskId, TaskStatus};
use serde_json::Value;
use tokio::sync::Semaphore;
use tokio::time::Instant;
use tokio_util::task::TaskTracker;
use tracing::{Instrument, debug, error, info, warn};

use crate::handler::{HandlerTable, TaskHandler};
use crate::notifier::TaskNotifier;
use crate::store::TaskStore;

/// Default number of tasks allowed to run at once.
pub const DEFAULT_MAX_CONCURRENT: usize = 8;

/// Default upper bound on one handler invocation.
pub const DEFAULT_HANDLER_TIMEOUT: Duration = Duration::from_secs(60);

/// Executor tuning.
#[derive(Clone, Debug)]
pub struct ExecutorConfig {
    /// Tasks allowed in `running` at the same time.
    pub max_concurrent: usize,
    /// Handler invocations exceeding this fail the task.
    pub handler_timeout: Duration,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            max_concurrent: DEFAULT_MAX_CONCURRENT,
            handler_timeout: DEFAULT_HANDLER_TIMEOUT,
        }
    }
}

/// Runs tasks detached from the submitter and enforces the lifecycle.
#[derive(Clone)]
pub struct TaskExecutor {
    inner: Arc<Inner>,
}

struct Inner {
    handlers: HandlerTable,
    store: Arc<dyn TaskStore>,
    notifier: Arc<dyn TaskNotifier>,
    in_flight: DashMap<TaskId, Instant>,
    permits: Arc<Semaphore>,
    tracker: TaskTracker,
    handler_timeout: Duration,
}

impl TaskExecutor {
    /// Build an executor over a dispatch table, a store, and a notifier.
    pub fn new(
        handlers: HandlerTable,
        store: Arc<dyn TaskStore>,
        notifier: Arc<dyn TaskNotifier>,
        config: ExecutorConfig,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                handlers,
                store,
                notifier,
                in_flight: DashMap::new(),
                permits: Arc::new(Semaphore::new(config.max_concurrent.max(1))),
                tracker: TaskTracker::new(),
                handler_timeout: config.handler_timeout,
            }),
        }
    }

    /// Admit `task` and schedule it. Returns without waiting for the handler.
    ///
    /// Fails with [`RelayError::AlreadyRunning`] while an execution for the
    /// same id is in flight, and with [`RelayError::AlreadyFinished`] once the
    /// id has reached a terminal state.
    pub async fn submit(&self, task: Task) -> Result<()> {
        let id = task.id.clone();
        match self.inner.in_flight.entry(id.clone()) {
            Entry::Occupied(_) => return Err(RelayError::AlreadyRunning(id.into_inner())),
            Entry::Vacant(slot) => {
                let _ = slot.insert(Instant::now());
            }
        }

        if let Err(e) = self.admit(&task).await {
            let _ = self.inner.in_flight.remove(&id);
            return Err(e);
        }

        counter!("tasks_submitted_total").increment(1);
        debug!(task_id = %id, task_type = %task.task_type, "task submitted");

        let span = tracing::info_span!("task", task_id = %id, task_type = %task.task_type);
        let inner = Arc::clone(&self.inner);
        let _ = self
            .inner
            .tracker
            .spawn(async move { inner.execute(task).await }.instrument(span));
        Ok(())
    }

    /// Whether an execution for `id` is in flight.
    pub fn is_running(&self, id: &TaskId) -> bool {
        self.inner.in_flight.contains_key(id)
    }

    /// Number of admitted tasks that have not finished.
    pub fn in_flight(&self) -> usize {
        self.inner.in_flight.len()
    }

    /// Wait up to `drain` for in-flight tasks. Returns `true` if all finished.
    ///
    /// Tasks still queued for a permit are failed instead of started.
    pub async fn shutdown(&self, drain: Duration) -> bool {
        let _ = self.inner.tracker.close();
        self.inner.permits.close();
        let pending = self.inner.tracker.len();
        if pending > 0 {
            info!(pending, "waiting for in-flight tasks");
        }
        let drained = tokio::time::timeout(drain, self.inner.tracker.wait())
            .await
            .is_ok();
        if !drained {
            warn!(
                remaining = self.inner.tracker.len(),
                "task drain window elapsed"
            );
        }
        drained
    }

    async fn admit(&self, task: &Task) -> Result<()> {
        reject_non_pending(task)?;
        match self.inner.store.load(&task.id).await? {
            Some(stored) => reject_non_pending(&stored),
            None => Ok(self.inner.store.save(task).await?),
        }
    }
}

fn reject_non_pending(task: &Task) -> Result<()> {
    match task.status {
        TaskStatus::Pending => Ok(()),
        TaskStatus::Running => Err(RelayError::AlreadyRunning(task.id.to_string())),
        TaskStatus::Completed | TaskStatus::Failed => {
            Err(RelayError::AlreadyFinished(task.id.to_string()))
        }
    }
}

impl Inner {
    async fn execute(self: Arc<Self>, mut task: Task) {
        let Ok(_permit) = Arc::clone(&self.permits).acquire_owned().await else {
            let _ = task.fail("Task executor is shutting down");
            self.finish(&task).await;
            return;
        };

        let Some(handler) = self.handlers.get(&task.task_type) else {
            let message = format!("No handler registered for task type: {}", task.task_type);
            warn!(error = %message, "task rejected");
            let _ = task.fail(message);
            counter!("tasks_failed_total", "type" => task.task_type.to_string()).increment(1);
            self.finish(&task).await;
            return;
        };

        let _ = task.start();
        gauge!("tasks_running").increment(1.0);
        self.record(&task).await;
        info!("task running");

        let started = Instant::now();
        let outcome = self.run_handler(handler, &task).await;
        gauge!("tasks_running").decrement(1.0);

        let type_label = task.task_type.to_string();
        match outcome {
            Ok(output) => {
                let _ = task.complete(output);
                counter!("tasks_completed_total", "type" => type_label).increment(1);
                info!(elapsed = ?started.elapsed(), "task completed");
            }
            Err(message) => {
                warn!(error = %message, "task failed");
                let _ = task.fail(message);
                counter!("tasks_failed_total", "type" => type_label).increment(1);
            }
        }
        self.finish(&task).await;
    }

    async fn run_handler(
        &self,
        handler: Arc<dyn TaskHandler>,
        task: &Task,
    ) -> std::result::Result<Value, String> {
        let snapshot = task.clone();
        let call = async move { handler.handle(&snapshot).await };
        match tokio::time::timeout(self.handler_timeout, AssertUnwindSafe(call).catch_unwind())
            .await
        {
            Ok(Ok(Ok(output))) => Ok(output),
            Ok(Ok(Err(err))) => Err(err.to_string()),
            Ok(Err(_panic)) => {
                error!("task handler panicked");
                Err("Task handler panicked".to_owned())
            }
            Err(_elapsed) => Err(format!(
                "Task handler timed out after {:?}",
                self.handler_timeout
            )),
        }
    }

    /// Persist, notify, and release the in-flight slot.
    async fn finish(&self, task: &Task) {
        self.record(task).await;
        let _ = self.in_flight.remove(&task.id);
    }

    async fn record(&self, task: &Task) {
        if let Err(e) = self.store.save(task).await {
            error!(task_id = %task.id, error = %e, "failed to persist task transition");
        }
        self.notifier.task_changed(task);
    }
}
