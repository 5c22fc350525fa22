//! `data_analysis` tasks, answered by the completion collaborator.

use std::sync::Arc;

use async_trait::async_trait;
use relay_core::Task;
use relay_core::time::timestamp;
use serde_json::{Value, json};

use crate::completion::{ChatMessage, CompletionClient};
use crate::errors::HandlerError;
use crate::handler::TaskHandler;

const SYSTEM_PROMPT: &str =
    "You are a data analysis assistant. Analyze the provided data and provide insights.";

/// Sends `{data, analysis_type}` to the completion service.
pub struct DataAnalysisHandler {
    completion: Arc<dyn CompletionClient>,
}

impl DataAnalysisHandler {
    /// Handler backed by `completion`.
    pub fn new(completion: Arc<dyn CompletionClient>) -> Self {
        Self { completion }
    }
}

#[async_trait]
impl TaskHandler for DataAnalysisHandler {
    async fn handle(&self, task: &Task) -> Result<Value, HandlerError> {
        let data = task
            .input
            .get("data")
            .filter(|v| !v.is_null())
            .ok_or_else(|| HandlerError::invalid("missing 'data'"))?;
        let analysis_type = task
            .input
            .get("analysis_type")
            .and_then(Value::as_str)
            .unwrap_or("general");

        let prompt = format!("Please analyze this data: {data}\n\nAnalysis type: {analysis_type}");
        let analysis = self
            .completion
            .complete(&[ChatMessage::system(SYSTEM_PROMPT), ChatMessage::user(prompt)])
            .await
            .map_err(|e| match e {
                HandlerError::Collaborator(msg) => {
                    HandlerError::Collaborator(format!("Data analysis failed: {msg}"))
                }
                other => other,
            })?;

        Ok(json!({"analysis": analysis, "timestamp": timestamp()}))
    }
}
