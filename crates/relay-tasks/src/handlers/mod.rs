//! Built-in handlers for the five known task types.

mod custom;
mod data_analysis;
mod file_management;
mod github;
mod web_scraping;

pub use custom::CustomHandler;
pub use data_analysis::DataAnalysisHandler;
pub use file_management::FileManagementHandler;
pub use github::GithubHandler;
pub use web_scraping::WebScrapingHandler;

use std::path::PathBuf;
use std::sync::Arc;

use relay_core::TaskType;
use serde_json::Value;

use crate::completion::CompletionClient;
use crate::errors::HandlerError;
use crate::handler::HandlerTable;

/// Dispatch table with every built-in handler registered.
pub fn builtin_handlers(
    workspace_root: impl Into<PathBuf>,
    completion: Arc<dyn CompletionClient>,
) -> HandlerTable {
    HandlerTable::new()
        .with(
            TaskType::FileManagement,
            FileManagementHandler::new(workspace_root),
        )
        .with(TaskType::WebScraping, WebScrapingHandler::new())
        .with(
            TaskType::DataAnalysis,
            DataAnalysisHandler::new(Arc::clone(&completion)),
        )
        .with(TaskType::GithubIntegration, GithubHandler)
        .with(TaskType::Custom, CustomHandler::new(completion))
}

fn required_str<'a>(input: &'a Value, key: &str) -> Result<&'a str, HandlerError> {
    input
        .get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| HandlerError::invalid(format!("missing '{key}'")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::completion::ChatMessage;
    use async_trait::async_trait;
    use serde_json::json;

    struct Silent;

    #[async_trait]
    impl CompletionClient for Silent {
        async fn complete(&self, _messages: &[ChatMessage]) -> Result<String, HandlerError> {
            Ok(String::new())
        }
    }

    #[test]
    fn builtin_covers_every_known_type() {
        let table = builtin_handlers("/tmp", Arc::new(Silent));
        for t in TaskType::KNOWN {
            assert!(table.contains(&t), "missing handler for {t}");
        }
    }

    #[test]
    fn required_str_rejects_missing_and_empty() {
        let input = json!({"a": "x", "b": "", "c": 3});
        assert_eq!(required_str(&input, "a").unwrap(), "x");
        assert!(required_str(&input, "b").is_err());
        assert!(required_str(&input, "c").is_err());
        assert!(required_str(&input, "d").is_err());
    }
}
