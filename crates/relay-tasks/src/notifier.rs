//! Outbound seam for task status changes.

use relay_core::Task;

/// Receives every task transition the executor makes.
///
/// The server implements this by publishing `task_update` to the task's
/// `user:<id>` and `session:<id>` rooms. Implementations must not block.
#[cfg_attr(test, mockall::automock)]
pub trait TaskNotifier: Send + Sync {
    /// `task` has just been persisted in its new state.
    fn task_changed(&self, task: &Task);
}

/// Notifier that drops every update.
pub struct NoopNotifier;

impl TaskNotifier for NoopNotifier {
    fn task_changed(&self, _task: &Task) {}
}
