//! Workflow definition and run-log domain types.
//!
//! These mirror the on-disk YAML shape and the JSONL run journal shape
//! one-for-one; see `relay-core::workflow::definition` for parsing and
//! validation and `relay-core::workflow::journal` for persistence.

use std::collections::BTreeMap;

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use serde_json::Value;

fn default_true() -> bool {
    true
}

fn default_field() -> String {
    "text".to_string()
}

// ---------------------------------------------------------------------------
// Trigger
// ---------------------------------------------------------------------------

/// How a workflow is launched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Trigger {
    /// Launched only via `manual_run`.
    Manual,
    /// Launched by the scheduler on a cron expression.
    Schedule {
        /// Five-field cron expression, evaluated in the configured timezone.
        cron: String,
    },
    /// Reserved; not driven by the core.
    Webhook {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        path: Option<String>,
    },
}

impl Trigger {
    /// The tag string used in list summaries and CLI output.
    pub fn kind(&self) -> &'static str {
        match self {
            Trigger::Manual => "manual",
            Trigger::Schedule { .. } => "schedule",
            Trigger::Webhook { .. } => "webhook",
        }
    }

    /// The cron expression, if this is a schedule trigger.
    pub fn cron(&self) -> Option<&str> {
        match self {
            Trigger::Schedule { cron } => Some(cron.as_str()),
            _ => None,
        }
    }
}

impl Default for Trigger {
    fn default() -> Self {
        Trigger::Manual
    }
}

// ---------------------------------------------------------------------------
// StepCondition
// ---------------------------------------------------------------------------

/// How a `StepCondition` compares the actual value to `equals`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchKind {
    #[default]
    Equals,
    Contains,
}

/// Guard evaluated before a step runs; see `relay-core::workflow::executor`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepCondition {
    /// Id of a previously executed step in this run.
    pub step: String,

    /// Output key of that step.
    #[serde(default = "default_field")]
    pub field: String,

    /// Comparand.
    pub equals: Value,

    /// Comparison method.
    #[serde(default, rename = "match")]
    pub match_kind: MatchKind,

    /// Trim whitespace before comparing (strings only).
    #[serde(default = "default_true")]
    pub trim: bool,

    /// Fold case before comparing (strings only).
    #[serde(default = "default_true")]
    pub case_insensitive: bool,
}

// ---------------------------------------------------------------------------
// Step
// ---------------------------------------------------------------------------

/// One step of a workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    /// Unique (within the workflow) step id.
    pub id: String,

    /// Action type, looked up in the registry at run time.
    #[serde(rename = "type")]
    pub step_type: String,

    /// Opaque parameters, expanded by the template engine before dispatch.
    #[serde(default)]
    pub params: serde_json::Map<String, Value>,

    /// Optional execution guard.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub when: Option<StepCondition>,

    /// UI hints; preserved on round-trip, otherwise opaque to the core.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<serde_json::Map<String, Value>>,
}

// ---------------------------------------------------------------------------
// Workflow
// ---------------------------------------------------------------------------

/// The static, on-disk workflow definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workflow {
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Grouping only; no semantic effect.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub folder: Option<String>,

    #[serde(default = "default_true")]
    pub enabled: bool,

    pub trigger: Trigger,

    pub steps: Vec<Step>,
}

/// Row of `Loader::list()`: a summary suitable for dashboard rendering even
/// when the underlying file fails to parse or validate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowInfo {
    pub name: String,
    pub filename: String,
    pub trigger_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cron: Option<String>,
    pub step_count: usize,
    pub is_valid: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub folder: Option<String>,
}

// ---------------------------------------------------------------------------
// RunLog / StepRecord
// ---------------------------------------------------------------------------

/// Terminal (or in-flight) status of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Success,
    Failed,
    Stopped,
}

/// Outcome of one step within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Success,
    Failed,
    Skipped,
}

/// Record of a single step's execution, appended to `RunLog::steps`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepRecord {
    pub id: String,
    #[serde(rename = "type")]
    pub step_type: String,
    pub status: StepStatus,

    /// The action's return value on success, or `{reason, when}` on skip.
    #[serde(default)]
    pub result: Value,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// One execution instance of a workflow; the unit persisted to the journal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunLog {
    pub run_id: String,
    pub workflow: String,
    pub status: RunStatus,
    pub started_at: DateTime<FixedOffset>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<FixedOffset>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub steps: Vec<StepRecord>,
}

impl RunLog {
    /// Start a new, in-flight run log.
    pub fn start(run_id: String, workflow: String, started_at: DateTime<FixedOffset>) -> Self {
        Self {
            run_id,
            workflow,
            status: RunStatus::Running,
            started_at,
            ended_at: None,
            error: None,
            steps: Vec::new(),
        }
    }
}

/// `latest_map` result: workflow name -> its most recent `RunLog`.
pub type LatestRunMap = BTreeMap<String, RunLog>;

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_workflow() -> Workflow {
        Workflow {
            name: "daily-digest".to_string(),
            description: Some("Summarize overnight activity".to_string()),
            folder: Some("reports".to_string()),
            enabled: true,
            trigger: Trigger::Schedule {
                cron: "0 9 * * *".to_string(),
            },
            steps: vec![
                Step {
                    id: "gather".to_string(),
                    step_type: "log".to_string(),
                    params: serde_json::Map::from_iter([(
                        "message".to_string(),
                        json!("hi"),
                    )]),
                    when: None,
                    meta: Some(serde_json::Map::from_iter([(
                        "x".to_string(),
                        json!(120),
                    )])),
                },
                Step {
                    id: "notify".to_string(),
                    step_type: "log".to_string(),
                    params: serde_json::Map::from_iter([(
                        "message".to_string(),
                        json!("{{ gather.text }}!"),
                    )]),
                    when: Some(StepCondition {
                        step: "gather".to_string(),
                        field: "text".to_string(),
                        equals: json!("hi"),
                        match_kind: MatchKind::Equals,
                        trim: true,
                        case_insensitive: true,
                    }),
                    meta: None,
                },
            ],
        }
    }

    #[test]
    fn yaml_round_trip_preserves_structure() {
        let wf = sample_workflow();
        let yaml = serde_yaml_ng::to_string(&wf).unwrap();
        let reloaded: Workflow = serde_yaml_ng::from_str(&yaml).unwrap();
        assert_eq!(wf, reloaded);
    }

    #[test]
    fn json_round_trip_preserves_structure() {
        let wf = sample_workflow();
        let json = serde_json::to_string(&wf).unwrap();
        let reloaded: Workflow = serde_json::from_str(&json).unwrap();
        assert_eq!(wf, reloaded);
    }

    #[test]
    fn trigger_defaults_are_field_level() {
        let yaml = "step: gather\nequals: hi\n";
        let cond: StepCondition = serde_yaml_ng::from_str(yaml).unwrap();
        assert_eq!(cond.field, "text");
        assert_eq!(cond.match_kind, MatchKind::Equals);
        assert!(cond.trim);
        assert!(cond.case_insensitive);
    }

    #[test]
    fn workflow_enabled_defaults_true() {
        let yaml = "name: x\ntrigger:\n  type: manual\nsteps:\n  - id: a\n    type: log\n";
        let wf: Workflow = serde_yaml_ng::from_str(yaml).unwrap();
        assert!(wf.enabled);
    }

    #[test]
    fn trigger_kind_and_cron_accessors() {
        let manual = Trigger::Manual;
        assert_eq!(manual.kind(), "manual");
        assert_eq!(manual.cron(), None);

        let scheduled = Trigger::Schedule {
            cron: "*/5 * * * *".to_string(),
        };
        assert_eq!(scheduled.kind(), "schedule");
        assert_eq!(scheduled.cron(), Some("*/5 * * * *"));
    }

    #[test]
    fn run_log_start_is_running_with_no_end() {
        let started = DateTime::parse_from_rfc3339("2026-07-28T09:00:00+09:00").unwrap();
        let log = RunLog::start("20260728_090000_ab12".to_string(), "wf".to_string(), started);
        assert_eq!(log.status, RunStatus::Running);
        assert!(log.ended_at.is_none());
        assert!(log.steps.is_empty());
    }

    #[test]
    fn step_record_serializes_skip_shape() {
        let rec = StepRecord {
            id: "notify".to_string(),
            step_type: "log".to_string(),
            status: StepStatus::Skipped,
            result: json!({"reason": "condition_not_met", "when": {"step": "gather"}}),
            error: None,
        };
        let v = serde_json::to_value(&rec).unwrap();
        assert_eq!(v["result"]["reason"], "condition_not_met");
        assert!(v.get("error").is_none());
    }
}
