//! Action Registry: process-wide mapping from step `type` to handler.
//!
//! `register` overwrites silently (last write wins); `lookup` never blocks
//! on a write once startup has finished since reads go through `DashMap`'s
//! sharded locks.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use dashmap::DashMap;
use serde_json::Value;
use thiserror::Error;

/// Error surfaced by an action handler. Never a mapped `status: failed`
/// result -- the executor is the only place that turns this into a
/// `StepRecord`.
#[derive(Debug, Error, Clone)]
#[error("{0}")]
pub struct ActionError(pub String);

impl ActionError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }
}

type ActionFuture = Pin<Box<dyn Future<Output = Result<Value, ActionError>> + Send>>;

/// A registered step implementation.
///
/// `params` has already been expanded by the template engine; `context` is
/// the run's accumulated `RunContext` as a JSON object.
pub trait Action: Send + Sync {
    fn handle(&self, params: Value, context: Value) -> ActionFuture;
}

/// Blanket impl so a plain async closure-like function can be registered
/// directly, mirroring the Python original's bare `async def` actions.
impl<F, Fut> Action for F
where
    F: Fn(Value, Value) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Value, ActionError>> + Send + 'static,
{
    fn handle(&self, params: Value, context: Value) -> ActionFuture {
        Box::pin(self(params, context))
    }
}

/// Editor-facing description of an action; opaque to the executor.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct ActionMetadata {
    pub title: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub parameter_schema: Value,
    #[serde(default)]
    pub output_schema: Value,
}

#[derive(Clone)]
struct Entry {
    handler: Arc<dyn Action>,
    metadata: Option<ActionMetadata>,
}

/// Concurrent `type -> action` map. Cheap to clone -- internally an
/// `Arc<DashMap<..>>` -- so it can be threaded through the executor,
/// scheduler, and CLI without a shared-reference lifetime.
#[derive(Clone, Default)]
pub struct ActionRegistry {
    actions: Arc<DashMap<String, Entry>>,
}

impl ActionRegistry {
    pub fn new() -> Self {
        Self {
            actions: Arc::new(DashMap::new()),
        }
    }

    /// Register a handler under `action_type`. Last write wins.
    pub fn register(
        &self,
        action_type: impl Into<String>,
        handler: Arc<dyn Action>,
        metadata: Option<ActionMetadata>,
    ) {
        let action_type = action_type.into();
        tracing::debug!(action_type = action_type.as_str(), "registering action");
        self.actions.insert(action_type, Entry { handler, metadata });
    }

    pub fn lookup(&self, action_type: &str) -> Option<Arc<dyn Action>> {
        self.actions.get(action_type).map(|e| e.handler.clone())
    }

    pub fn lookup_metadata(&self, action_type: &str) -> Option<ActionMetadata> {
        self.actions.get(action_type).and_then(|e| e.metadata.clone())
    }

    pub fn has(&self, action_type: &str) -> bool {
        self.actions.contains_key(action_type)
    }

    /// Registered type names, sorted.
    pub fn list(&self) -> Vec<String> {
        let mut types: Vec<String> = self.actions.iter().map(|e| e.key().clone()).collect();
        types.sort();
        types
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    async fn echo(params: Value, _context: Value) -> Result<Value, ActionError> {
        Ok(params)
    }

    #[tokio::test]
    async fn register_and_lookup_round_trips() {
        let registry = ActionRegistry::new();
        registry.register("echo", Arc::new(echo), None);

        let handler = registry.lookup("echo").expect("registered");
        let result = handler.handle(json!({"text": "hi"}), json!({})).await.unwrap();
        assert_eq!(result, json!({"text": "hi"}));
    }

    #[test]
    fn lookup_missing_returns_none() {
        let registry = ActionRegistry::new();
        assert!(registry.lookup("nope").is_none());
        assert!(!registry.has("nope"));
    }

    #[test]
    fn last_write_wins_on_overwrite() {
        let registry = ActionRegistry::new();
        registry.register(
            "x",
            Arc::new(echo),
            Some(ActionMetadata {
                title: "first".to_string(),
                ..Default::default()
            }),
        );
        registry.register(
            "x",
            Arc::new(echo),
            Some(ActionMetadata {
                title: "second".to_string(),
                ..Default::default()
            }),
        );
        assert_eq!(registry.lookup_metadata("x").unwrap().title, "second");
    }

    #[test]
    fn list_is_sorted() {
        let registry = ActionRegistry::new();
        registry.register("zeta", Arc::new(echo), None);
        registry.register("alpha", Arc::new(echo), None);
        registry.register("mid", Arc::new(echo), None);
        assert_eq!(registry.list(), vec!["alpha", "mid", "zeta"]);
    }
}
