//! `file_write` / `file_read`: filesystem actions, grounded on the
//! original's `action_file_write`/`action_file_read`. Relative paths
//! resolve against the run's `base_dir` context key.

use std::path::{Path, PathBuf};

use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::workflow::registry::ActionError;

/// Parameter shape for `type: file_write`; drives `ActionMetadata::parameter_schema`.
#[derive(Debug, Deserialize, JsonSchema)]
#[allow(dead_code)]
pub struct FileWriteParams {
    /// Path, resolved relative to the run's `base_dir` unless absolute.
    pub path: String,
    pub content: String,
}

/// Parameter shape for `type: file_read`.
#[derive(Debug, Deserialize, JsonSchema)]
#[allow(dead_code)]
pub struct FileReadParams {
    pub path: String,
}

fn resolve_path(path_str: &str, context: &Value) -> PathBuf {
    let path = Path::new(path_str);
    if path.is_absolute() {
        return path.to_path_buf();
    }
    let base_dir = context
        .get("base_dir")
        .and_then(|v| v.as_str())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."));
    base_dir.join(path)
}

pub async fn action_file_write(params: Value, context: Value) -> Result<Value, ActionError> {
    let path_str = params
        .get("path")
        .and_then(|v| v.as_str())
        .ok_or_else(|| ActionError::new("path is required"))?;
    let content = params.get("content").and_then(|v| v.as_str()).unwrap_or_default();

    let file_path = resolve_path(path_str, &context);
    if let Some(parent) = file_path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| ActionError::new(format!("failed to create {}: {e}", parent.display())))?;
    }
    std::fs::write(&file_path, content)
        .map_err(|e| ActionError::new(format!("failed to write {}: {e}", file_path.display())))?;

    let size = file_path
        .metadata()
        .map(|m| m.len())
        .map_err(|e| ActionError::new(format!("failed to stat {}: {e}", file_path.display())))?;

    Ok(json!({
        "written": true,
        "path": file_path.display().to_string(),
        "size": size,
    }))
}

pub async fn action_file_read(params: Value, context: Value) -> Result<Value, ActionError> {
    let path_str = params
        .get("path")
        .and_then(|v| v.as_str())
        .ok_or_else(|| ActionError::new("path is required"))?;

    let file_path = resolve_path(path_str, &context);
    if !file_path.exists() {
        return Err(ActionError::new(format!("File not found: {}", file_path.display())));
    }
    let content = std::fs::read_to_string(&file_path)
        .map_err(|e| ActionError::new(format!("failed to read {}: {e}", file_path.display())))?;
    let size = content.len() as u64;

    Ok(json!({
        "content": content.clone(),
        "text": content,
        "path": file_path.display().to_string(),
        "size": size,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn write_then_read_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let context = json!({"base_dir": dir.path().display().to_string()});

        let write_result = action_file_write(
            json!({"path": "out/hello.txt", "content": "hi there"}),
            context.clone(),
        )
        .await
        .unwrap();
        assert_eq!(write_result["written"], json!(true));
        assert_eq!(write_result["size"], json!(8));

        let read_result = action_file_read(json!({"path": "out/hello.txt"}), context).await.unwrap();
        assert_eq!(read_result["content"], json!("hi there"));
        assert_eq!(read_result["text"], json!("hi there"));
    }

    #[tokio::test]
    async fn write_missing_path_errors() {
        let err = action_file_write(json!({"content": "x"}), json!({})).await.unwrap_err();
        assert!(err.0.contains("path is required"));
    }

    #[tokio::test]
    async fn read_missing_file_errors() {
        let dir = tempfile::tempdir().unwrap();
        let context = json!({"base_dir": dir.path().display().to_string()});
        let err = action_file_read(json!({"path": "nope.txt"}), context).await.unwrap_err();
        assert!(err.0.contains("not found"));
    }

    #[tokio::test]
    async fn absolute_path_is_used_verbatim() {
        let dir = tempfile::tempdir().unwrap();
        let abs = dir.path().join("abs.txt");
        let result = action_file_write(
            json!({"path": abs.display().to_string(), "content": "abs"}),
            json!({"base_dir": "/somewhere/else"}),
        )
        .await
        .unwrap();
        assert_eq!(result["path"], json!(abs.display().to_string()));
    }
}
