//! `github_integration` tasks.
//!
//! Requests are validated and acknowledged. No GitHub API call is made.

use async_trait::async_trait;
use relay_core::Task;
use relay_core::time::timestamp;
use serde_json::{Value, json};
use tracing::info;

use super::required_str;
use crate::errors::HandlerError;
use crate::handler::TaskHandler;

/// Acknowledges repository operations.
pub struct GithubHandler;

#[async_trait]
impl TaskHandler for GithubHandler {
    async fn handle(&self, task: &Task) -> Result<Value, HandlerError> {
        let operation = required_str(&task.input, "operation")?;
        let repository = required_str(&task.input, "repository")?;
        info!(operation, repository, "github operation recorded");
        Ok(json!({
            "operation": operation,
            "repository": repository,
            "result": format!("GitHub {operation} operation completed successfully"),
            "timestamp": timestamp(),
        }))
    }
}
