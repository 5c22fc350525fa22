//! `file_management` tasks: read, write, delete, list, and organize files
//! beneath a workspace root.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use relay_core::Task;
use relay_core::time::timestamp;
use serde_json::{Value, json};
use tokio::fs;
use tracing::debug;

use super::required_str;
use crate::errors::HandlerError;
use crate::handler::TaskHandler;

/// Subdirectory for files without an extension during `organize`.
const NO_EXTENSION_DIR: &str = "no_extension";

/// Filesystem operations confined to one root directory.
pub struct FileManagementHandler {
    root: PathBuf,
}

impl FileManagementHandler {
    /// Handler rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Join a relative path onto the root. Absolute paths and `..` are rejected.
    fn resolve(&self, relative: &str) -> Result<PathBuf, HandlerError> {
        let rel = Path::new(relative);
        for component in rel.components() {
            match component {
                Component::Normal(_) | Component::CurDir => {}
                Component::ParentDir => {
                    return Err(HandlerError::invalid(format!(
                        "path escapes workspace: {relative}"
                    )));
                }
                Component::RootDir | Component::Prefix(_) => {
                    return Err(HandlerError::invalid(format!(
                        "path must be relative: {relative}"
                    )));
                }
            }
        }
        Ok(self.root.join(rel))
    }

    async fn read(&self, rel: &str) -> Result<Value, HandlerError> {
        let content = fs::read_to_string(self.resolve(rel)?)
            .await
            .map_err(|e| io_failure("read", rel, &e))?;
        Ok(json!({"operation": "read", "path": rel, "content": content}))
    }

    async fn write(&self, rel: &str, content: &str) -> Result<Value, HandlerError> {
        let path = self.resolve(rel)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| io_failure("write", rel, &e))?;
        }
        fs::write(&path, content)
            .await
            .map_err(|e| io_failure("write", rel, &e))?;
        Ok(json!({
            "operation": "write",
            "path": rel,
            "bytesWritten": content.len(),
            "success": true
        }))
    }

    async fn delete(&self, rel: &str) -> Result<Value, HandlerError> {
        let path = self.resolve(rel)?;
        if path == self.root {
            return Err(HandlerError::invalid("refusing to delete the workspace root"));
        }
        let meta = fs::metadata(&path)
            .await
            .map_err(|e| io_failure("delete", rel, &e))?;
        let result = if meta.is_dir() {
            fs::remove_dir_all(&path).await
        } else {
            fs::remove_file(&path).await
        };
        result.map_err(|e| io_failure("delete", rel, &e))?;
        Ok(json!({"operation": "delete", "path": rel, "success": true}))
    }

    async fn list(&self, rel: &str) -> Result<Value, HandlerError> {
        let path = self.resolve(rel)?;
        let mut entries = Vec::new();
        let mut dir = fs::read_dir(&path)
            .await
            .map_err(|e| io_failure("list", rel, &e))?;
        while let Some(entry) = dir
            .next_entry()
            .await
            .map_err(|e| io_failure("list", rel, &e))?
        {
            let meta = entry
                .metadata()
                .await
                .map_err(|e| io_failure("list", rel, &e))?;
            entries.push(json!({
                "name": entry.file_name().to_string_lossy(),
                "isDir": meta.is_dir(),
                "size": meta.len(),
            }));
        }
        entries.sort_by(|a, b| a["name"].as_str().cmp(&b["name"].as_str()));
        Ok(json!({"operation": "list", "path": rel, "files": entries}))
    }

    /// Move the files directly inside `rel` into per-extension subdirectories.
    async fn organize(&self, rel: &str) -> Result<Value, HandlerError> {
        let dir_path = self.resolve(rel)?;
        let mut files = Vec::new();
        let mut dir = fs::read_dir(&dir_path)
            .await
            .map_err(|e| io_failure("organize", rel, &e))?;
        while let Some(entry) = dir
            .next_entry()
            .await
            .map_err(|e| io_failure("organize", rel, &e))?
        {
            let is_file = entry
                .file_type()
                .await
                .map_err(|e| io_failure("organize", rel, &e))?
                .is_file();
            if is_file {
                files.push(entry.path());
            }
        }
        files.sort();

        let mut moved = Vec::with_capacity(files.len());
        for file in files {
            let Some(name) = file.file_name().map(|n| n.to_string_lossy().into_owned()) else {
                continue;
            };
            let bucket = file.extension().map_or_else(
                || NO_EXTENSION_DIR.to_owned(),
                |e| e.to_string_lossy().to_lowercase(),
            );
            let target_dir = dir_path.join(&bucket);
            fs::create_dir_all(&target_dir)
                .await
                .map_err(|e| io_failure("organize", rel, &e))?;
            fs::rename(&file, target_dir.join(&name))
                .await
                .map_err(|e| io_failure("organize", rel, &e))?;
            moved.push(json!({"file": name, "to": bucket}));
        }
        debug!(path = rel, moved = moved.len(), "organized directory");
        Ok(json!({
            "operation": "organize",
            "path": rel,
            "moved": moved,
            "organized": true
        }))
    }
}

fn io_failure(op: &str, rel: &str, err: &std::io::Error) -> HandlerError {
    HandlerError::Failed(format!("File {op} failed for {rel}: {err}"))
}

#[async_trait]
impl TaskHandler for FileManagementHandler {
    async fn handle(&self, task: &Task) -> Result<Value, HandlerError> {
        let input = &task.input;
        let operation = required_str(input, "operation")?;
        let path = input.get("path").and_then(Value::as_str).unwrap_or(".");

        let mut output = match operation {
            "read" => self.read(path).await?,
            "write" => {
                let content = input
                    .get("content")
                    .and_then(Value::as_str)
                    .ok_or_else(|| HandlerError::invalid("missing 'content'"))?;
                self.write(path, content).await?
            }
            "delete" => self.delete(path).await?,
            "list" => self.list(path).await?,
            "organize" => self.organize(path).await?,
            other => {
                return Err(HandlerError::Failed(format!(
                    "Unknown file operation: {other}"
                )));
            }
        };
        output["timestamp"] = Value::String(timestamp());
        Ok(output)
    }
}
