//! Task handler trait and the dispatch table keyed by task type.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use relay_core::{Task, TaskType};
use serde_json::Value;

use crate::errors::HandlerError;

/// One pluggable unit of work for a task type.
///
/// Handlers receive a read-only snapshot of the task. They never touch its
/// status; the executor owns every transition.
#[async_trait]
pub trait TaskHandler: Send + Sync {
    /// Run the task and return its output.
    async fn handle(&self, task: &Task) -> Result<Value, HandlerError>;
}

/// Map from [`TaskType`] to its handler.
#[derive(Clone, Default)]
pub struct HandlerTable {
    handlers: HashMap<TaskType, Arc<dyn TaskHandler>>,
}

impl HandlerTable {
    /// Empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for `task_type`, replacing any previous one.
    pub fn register(&mut self, task_type: TaskType, handler: impl TaskHandler + 'static) {
        let _ = self.handlers.insert(task_type, Arc::new(handler));
    }

    /// Builder form of [`register`](Self::register).
    #[must_use]
    pub fn with(mut self, task_type: TaskType, handler: impl TaskHandler + 'static) -> Self {
        self.register(task_type, handler);
        self
    }

    /// Handler for `task_type`.
    pub fn get(&self, task_type: &TaskType) -> Option<Arc<dyn TaskHandler>> {
        self.handlers.get(task_type).cloned()
    }

    /// Whether a handler exists for `task_type`.
    pub fn contains(&self, task_type: &TaskType) -> bool {
        self.handlers.contains_key(task_type)
    }

    /// Registered type names, sorted.
    pub fn types(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .handlers
            .keys()
            .map(|t| t.as_str().to_owned())
            .collect();
        names.sort();
        names
    }
}
