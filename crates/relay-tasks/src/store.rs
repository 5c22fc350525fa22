//! Key-addressed task record store.

use async_trait::async_trait;
use dashmap::DashMap;
use relay_core::{Task, TaskId, UserId};

use crate::errors::StoreError;

/// Where task records live.
///
/// The executor reads and writes whole records by id. Nothing here assumes a
/// relational backend.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Fetch one record.
    async fn load(&self, id: &TaskId) -> Result<Option<Task>, StoreError>;

    /// Insert or replace a record.
    async fn save(&self, task: &Task) -> Result<(), StoreError>;

    /// All tasks owned by `user_id`, newest first.
    async fn list_for_user(&self, user_id: &UserId) -> Result<Vec<Task>, StoreError>;
}

/// In-process store backed by a [`DashMap`].
#[derive(Default)]
pub struct MemoryTaskStore {
    tasks: DashMap<TaskId, Task>,
}

impl MemoryTaskStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records.
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

#[async_trait]
impl TaskStore for MemoryTaskStore {
    async fn load(&self, id: &TaskId) -> Result<Option<Task>, StoreError> {
        Ok(self.tasks.get(id).map(|t| t.value().clone()))
    }

    async fn save(&self, task: &Task) -> Result<(), StoreError> {
        let _ = self.tasks.insert(task.id.clone(), task.clone());
        Ok(())
    }

    async fn list_for_user(&self, user_id: &UserId) -> Result<Vec<Task>, StoreError> {
        let mut tasks: Vec<Task> = self
            .tasks
            .iter()
            .filter(|entry| &entry.user_id == user_id)
            .map(|entry| entry.value().clone())
            .collect();
        tasks.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(tasks)
    }
}
