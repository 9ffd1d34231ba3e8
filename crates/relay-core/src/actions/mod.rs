//! Built-in reference actions: `log`, `file_write`, `file_read`, `http`,
//! `subworkflow`.
//!
//! Everything beyond these is a third-party action body (spreadsheet,
//! chat, LLM integrations) out of scope for this crate; these five exist
//! so the registry and executor have at least one concrete, fully tested
//! action each.

pub mod file_ops;
pub mod http;
pub mod log;
pub mod subworkflow;

use std::sync::Arc;

use serde_json::Value;

use crate::workflow::definition::Loader;
use crate::workflow::executor::Executor;
use crate::workflow::registry::{ActionMetadata, ActionRegistry};

fn schema_metadata<T: schemars::JsonSchema>(title: &str, category: &str) -> ActionMetadata {
    let schema = schemars::schema_for!(T);
    ActionMetadata {
        title: title.to_string(),
        category: category.to_string(),
        parameter_schema: serde_json::to_value(&schema).unwrap_or(Value::Null),
        output_schema: Value::Null,
    }
}

/// Registers every built-in action under its canonical `type` string, each
/// with an `ActionMetadata` whose `parameter_schema` is derived straight
/// from the action's Rust parameter struct via `schemars`, rather than
/// hand-maintained in parallel with the handler.
pub fn register_builtins(registry: &ActionRegistry, loader: Arc<Loader>, executor: Arc<Executor>) {
    registry.register(
        "log",
        Arc::new(log::action_log),
        Some(schema_metadata::<log::LogParams>("Log", "debug")),
    );
    registry.register(
        "file_write",
        Arc::new(file_ops::action_file_write),
        Some(schema_metadata::<file_ops::FileWriteParams>("Write File", "filesystem")),
    );
    registry.register(
        "file_read",
        Arc::new(file_ops::action_file_read),
        Some(schema_metadata::<file_ops::FileReadParams>("Read File", "filesystem")),
    );
    registry.register(
        "http",
        Arc::new(http::action_http),
        Some(schema_metadata::<http::HttpParams>("HTTP Request", "integration")),
    );
    registry.register(
        "subworkflow",
        Arc::new(subworkflow::SubworkflowAction::new(loader, executor)),
        Some(schema_metadata::<subworkflow::SubworkflowParams>("Run Subworkflow", "control-flow")),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn builtins_register_with_parameter_schemas() {
        let registry = ActionRegistry::new();
        let loader = Arc::new(Loader::new(std::env::temp_dir().join("relay-builtins-test"), "yaml", "yml"));
        let executor = Arc::new(Executor::new(
            ActionRegistry::new(),
            std::env::temp_dir(),
            Duration::from_secs(1),
            chrono::FixedOffset::east_opt(9 * 3600).unwrap(),
        ));
        register_builtins(&registry, loader, executor);

        assert_eq!(
            registry.list(),
            vec!["file_read", "file_write", "http", "log", "subworkflow"]
        );
        let log_meta = registry.lookup_metadata("log").unwrap();
        assert_eq!(log_meta.title, "Log");
        assert!(log_meta.parameter_schema.get("properties").is_some());
    }
}
