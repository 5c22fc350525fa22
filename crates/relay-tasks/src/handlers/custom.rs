//! `custom` tasks: free-form requests answered by the completion collaborator.

use std::sync::Arc;

use async_trait::async_trait;
use relay_core::Task;
use relay_core::time::timestamp;
use serde_json::{Value, json};

use crate::completion::{ChatMessage, CompletionClient};
use crate::errors::HandlerError;
use crate::handler::TaskHandler;

const SYSTEM_PROMPT: &str = "You are an AI assistant helping with custom tasks.";

/// Describes the task to the completion service and returns its reply.
pub struct CustomHandler {
    completion: Arc<dyn CompletionClient>,
}

impl CustomHandler {
    /// Handler backed by `completion`.
    pub fn new(completion: Arc<dyn CompletionClient>) -> Self {
        Self { completion }
    }
}

fn describe(task: &Task) -> String {
    format!(
        "Task: {}\nDescription: {}\nInput: {}",
        task.title,
        task.description.as_deref().unwrap_or(""),
        task.input
    )
}

#[async_trait]
impl TaskHandler for CustomHandler {
    async fn handle(&self, task: &Task) -> Result<Value, HandlerError> {
        let result = self
            .completion
            .complete(&[
                ChatMessage::system(SYSTEM_PROMPT),
                ChatMessage::user(describe(task)),
            ])
            .await
            .map_err(|e| match e {
                HandlerError::Collaborator(msg) => {
                    HandlerError::Collaborator(format!("Custom task processing failed: {msg}"))
                }
                other => other,
            })?;
        Ok(json!({"result": result, "timestamp": timestamp()}))
    }
}
