//! `log`: debug-output action, grounded on the original's `action_log`.
//!
//! Emits the (already template-expanded) message at the requested
//! `tracing` level and echoes it back under `text` so later steps can
//! reference it via `{{ step_id.text }}` -- the default `StepCondition`
//! field and the canonical `when` target.

use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::workflow::registry::ActionError;

/// Parameter shape for `type: log`, used only to derive the editor-facing
/// JSON schema in `ActionMetadata::parameter_schema` -- the handler itself
/// reads straight from the untyped `params` value.
#[derive(Debug, Deserialize, JsonSchema)]
#[allow(dead_code)]
pub struct LogParams {
    /// Text to emit, after template expansion.
    pub message: String,
    /// `debug` | `info` | `warning` | `error`; defaults to `info`.
    pub level: Option<String>,
}

pub async fn action_log(params: Value, _context: Value) -> Result<Value, ActionError> {
    let message = params
        .get("message")
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string();
    let level = params
        .get("level")
        .and_then(|v| v.as_str())
        .unwrap_or("info")
        .to_lowercase();

    match level.as_str() {
        "debug" => tracing::debug!(target: "relay::workflow", "{message}"),
        "warning" | "warn" => tracing::warn!(target: "relay::workflow", "{message}"),
        "error" => tracing::error!(target: "relay::workflow", "{message}"),
        _ => tracing::info!(target: "relay::workflow", "{message}"),
    }

    Ok(json!({
        "logged": true,
        "message": message,
        "text": message,
    }))
}
