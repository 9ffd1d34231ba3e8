//! `subworkflow`: nested-run action with depth + cycle detection.
//!
//! `_call_chain` is carried as an ordered list, not a set, so a cycle error
//! can reproduce the full path that led back to the repeated workflow name.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use relay_types::workflow::{RunStatus, StepStatus};
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tokio_util::sync::CancellationToken;

use crate::workflow::definition::Loader;
use crate::workflow::executor::{Executor, RESERVED_CONTROL_KEYS};
use crate::workflow::registry::{Action, ActionError};

const DEFAULT_MAX_DEPTH: u64 = 5;

/// Typed subset of `type: subworkflow`'s parameters, for
/// `ActionMetadata::parameter_schema`. Arbitrary extra keys are forwarded
/// as nested-run context and stay out of the typed schema.
#[derive(Debug, Deserialize, JsonSchema)]
#[allow(dead_code)]
pub struct SubworkflowParams {
    pub workflow_name: String,
    /// Defaults to 5.
    pub max_depth: Option<u64>,
    /// Defaults to false.
    pub continue_on_error: Option<bool>,
}

/// `type: subworkflow` action. Holds the shared `Loader`/`Executor` it
/// needs to resolve and run a nested workflow -- state the bare `Action`
/// closure impl can't capture, so this implements the trait directly.
pub struct SubworkflowAction {
    loader: Arc<Loader>,
    executor: Arc<Executor>,
}

impl SubworkflowAction {
    pub fn new(loader: Arc<Loader>, executor: Arc<Executor>) -> Self {
        Self { loader, executor }
    }
}

impl Action for SubworkflowAction {
    fn handle(
        &self,
        params: Value,
        context: Value,
    ) -> Pin<Box<dyn Future<Output = Result<Value, ActionError>> + Send>> {
        let loader = self.loader.clone();
        let executor = self.executor.clone();
        Box::pin(async move { run_subworkflow(loader, executor, params, context).await })
    }
}

async fn run_subworkflow(
    loader: Arc<Loader>,
    executor: Arc<Executor>,
    params: Value,
    context: Value,
) -> Result<Value, ActionError> {
    let workflow_name = params
        .get("workflow_name")
        .and_then(|v| v.as_str())
        .ok_or_else(|| ActionError::new("workflow_name is required"))?
        .to_string();

    let max_depth = params
        .get("max_depth")
        .and_then(|v| v.as_u64())
        .unwrap_or(DEFAULT_MAX_DEPTH);
    let continue_on_error = params
        .get("continue_on_error")
        .and_then(|v| v.as_bool())
        .unwrap_or(false);

    let call_chain: Vec<String> = context
        .get("_call_chain")
        .and_then(|v| v.as_array())
        .map(|arr| arr.iter().filter_map(|v| v.as_str().map(String::from)).collect())
        .unwrap_or_default();

    if call_chain.contains(&workflow_name) {
        let path = call_chain.join(" -> ");
        let message = format!("Circular dependency detected: {workflow_name} is already in call chain: {path}");
        return guard_failure(message, continue_on_error);
    }
    if call_chain.len() as u64 >= max_depth {
        let path = call_chain.join(" -> ");
        let message = format!("Maximum subworkflow depth ({max_depth}) exceeded. Call chain: {path}");
        return guard_failure(message, continue_on_error);
    }

    let workflow = match loader.load(&workflow_name) {
        Ok(wf) => wf,
        Err(e) => {
            let message = format!("Failed to load workflow '{workflow_name}': {}", e.message());
            return guard_failure(message, continue_on_error);
        }
    };

    let mut extra_context = Map::new();
    if let Value::Object(map) = &params {
        for (key, value) in map {
            if RESERVED_CONTROL_KEYS.contains(&key.as_str()) {
                continue;
            }
            extra_context.insert(key.clone(), value.clone());
        }
    }

    let mut nested_chain = call_chain;
    nested_chain.push(workflow_name.clone());

    let run_log = executor
        .run_with_chain(&workflow, CancellationToken::new(), nested_chain, extra_context)
        .await;

    let mut results = Map::new();
    for step in &run_log.steps {
        if step.status != StepStatus::Skipped {
            results.insert(step.id.clone(), step.result.clone());
        }
    }

    let success = run_log.status == RunStatus::Success;
    let status = match run_log.status {
        RunStatus::Success => "success",
        RunStatus::Failed => "failed",
        RunStatus::Stopped => "stopped",
        RunStatus::Running => "running",
    };

    Ok(json!({
        "success": success,
        "status": status,
        "run_id": run_log.run_id,
        "results": Value::Object(results),
        "error": run_log.error,
    }))
}

fn guard_failure(message: String, continue_on_error: bool) -> Result<Value, ActionError> {
    tracing::error!("{message}");
    if continue_on_error {
        Ok(json!({
            "success": false,
            "status": "failed",
            "run_id": Value::Null,
            "results": {},
            "error": message,
        }))
    } else {
        Err(ActionError::new(message))
    }
}
