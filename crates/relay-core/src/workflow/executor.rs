//! Executor: drives a workflow from its first step to a terminal
//! status. Single-threaded per run, strictly sequential across steps.

use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Days, FixedOffset, Utc};
use rand::RngCore;
use relay_types::workflow::{
    MatchKind, RunLog, RunStatus, Step, StepCondition, StepRecord, StepStatus, Workflow,
};
use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;

use super::registry::ActionRegistry;
use super::template::TemplateEngine;

/// Default per-step invocation deadline (spec default: 300s).
pub const DEFAULT_STEP_TIMEOUT_SECS: u64 = 300;

/// Names the subworkflow action reserves; never forwarded into the nested
/// run's context as plain params.
pub const RESERVED_CONTROL_KEYS: [&str; 3] = ["workflow_name", "max_depth", "continue_on_error"];

pub struct Executor {
    registry: ActionRegistry,
    templates: TemplateEngine,
    base_dir: PathBuf,
    default_step_timeout: Duration,
    timezone: FixedOffset,
}

impl Executor {
    pub fn new(
        registry: ActionRegistry,
        base_dir: PathBuf,
        default_step_timeout: Duration,
        timezone: FixedOffset,
    ) -> Self {
        Self {
            registry,
            templates: TemplateEngine::new(),
            base_dir,
            default_step_timeout,
            timezone,
        }
    }

    pub fn registry(&self) -> &ActionRegistry {
        &self.registry
    }

    /// Run `workflow` as a top-level invocation (empty subworkflow chain,
    /// no forwarded context).
    pub async fn run(&self, workflow: &Workflow, cancel: CancellationToken) -> RunLog {
        self.run_with_chain(workflow, cancel, Vec::new(), Map::new())
            .await
    }

    /// Run `workflow`, seeding `_call_chain` and forwarding `extra_context`
    /// on top of the built-in keys. Used directly by the top-level run
    /// (empty chain/context) and by the subworkflow action for nested runs.
    pub async fn run_with_chain(
        &self,
        workflow: &Workflow,
        cancel: CancellationToken,
        call_chain: Vec<String>,
        extra_context: Map<String, Value>,
    ) -> RunLog {
        let run_id = generate_run_id(&self.timezone);
        let started_at = Utc::now().with_timezone(&self.timezone);
        let mut context = self.build_context(&run_id, &workflow.name, &started_at, call_chain, extra_context);

        let mut log = RunLog::start(run_id.clone(), workflow.name.clone(), started_at);

        tracing::info!(run_id = run_id.as_str(), workflow = workflow.name.as_str(), "starting run");

        'steps: for step in &workflow.steps {
            if cancel.is_cancelled() {
                log.status = RunStatus::Stopped;
                log.error = Some("cancelled".to_string());
                break 'steps;
            }

            if let Some(cond) = &step.when {
                match self.evaluate_when(cond, &context) {
                    WhenOutcome::Matched => {}
                    WhenOutcome::NotMatched(reason) => {
                        log.steps.push(skipped_record(step, &reason, cond));
                        continue 'steps;
                    }
                }
            }

            let Some(handler) = self.registry.lookup(&step.step_type) else {
                let error = format!("Unknown action type: {}", step.step_type);
                log.steps.push(StepRecord {
                    id: step.id.clone(),
                    step_type: step.step_type.clone(),
                    status: StepStatus::Failed,
                    result: Value::Null,
                    error: Some(error.clone()),
                });
                log.status = RunStatus::Failed;
                log.error = Some(error);
                break 'steps;
            };

            let params_value = Value::Object(step.params.clone());
            let context_value = Value::Object(context.clone());
            let rendered_params = match self.templates.render_value(&params_value, &context_value) {
                Ok(v) => v,
                Err(e) => {
                    let error = e.to_string();
                    log.steps.push(StepRecord {
                        id: step.id.clone(),
                        step_type: step.step_type.clone(),
                        status: StepStatus::Failed,
                        result: Value::Null,
                        error: Some(error.clone()),
                    });
                    log.status = RunStatus::Failed;
                    log.error = Some(error);
                    break 'steps;
                }
            };

            let invocation = handler.handle(rendered_params, context_value);

            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    log.steps.push(StepRecord {
                        id: step.id.clone(),
                        step_type: step.step_type.clone(),
                        status: StepStatus::Failed,
                        result: Value::Null,
                        error: Some("cancelled".to_string()),
                    });
                    log.status = RunStatus::Stopped;
                    log.error = Some("cancelled".to_string());
                    break 'steps;
                }
                result = tokio::time::timeout(self.default_step_timeout, invocation) => {
                    match result {
                        Err(_elapsed) => {
                            let error = format!(
                                "Step execution timed out after {} seconds",
                                self.default_step_timeout.as_secs()
                            );
                            log.steps.push(StepRecord {
                                id: step.id.clone(),
                                step_type: step.step_type.clone(),
                                status: StepStatus::Failed,
                                result: Value::Null,
                                error: Some(error.clone()),
                            });
                            log.status = RunStatus::Failed;
                            log.error = Some(error);
                            break 'steps;
                        }
                        Ok(Err(action_err)) => {
                            let error = action_err.0;
                            log.steps.push(StepRecord {
                                id: step.id.clone(),
                                step_type: step.step_type.clone(),
                                status: StepStatus::Failed,
                                result: Value::Null,
                                error: Some(error.clone()),
                            });
                            log.status = RunStatus::Failed;
                            log.error = Some(error);
                            break 'steps;
                        }
                        Ok(Ok(value)) => {
                            context.insert(step.id.clone(), value.clone());
                            log.steps.push(StepRecord {
                                id: step.id.clone(),
                                step_type: step.step_type.clone(),
                                status: StepStatus::Success,
                                result: value,
                                error: None,
                            });
                        }
                    }
                }
            }
        }

        if log.error.is_none() {
            log.status = RunStatus::Success;
        }
        log.ended_at = Some(Utc::now().with_timezone(&self.timezone));

        tracing::info!(
            run_id = log.run_id.as_str(),
            workflow = workflow.name.as_str(),
            status = ?log.status,
            "run finished"
        );

        log
    }

    fn build_context(
        &self,
        run_id: &str,
        workflow_name: &str,
        started_at: &DateTime<FixedOffset>,
        call_chain: Vec<String>,
        extra: Map<String, Value>,
    ) -> Map<String, Value> {
        let today = started_at.date_naive();
        let yesterday = today.checked_sub_days(Days::new(1)).unwrap_or(today);
        let tomorrow = today.checked_add_days(Days::new(1)).unwrap_or(today);

        let mut ctx = Map::new();
        ctx.insert("run_id".to_string(), Value::String(run_id.to_string()));
        ctx.insert("workflow".to_string(), Value::String(workflow_name.to_string()));
        ctx.insert("now".to_string(), Value::String(started_at.to_rfc3339()));
        ctx.insert("today".to_string(), Value::String(today.to_string()));
        ctx.insert("yesterday".to_string(), Value::String(yesterday.to_string()));
        ctx.insert("tomorrow".to_string(), Value::String(tomorrow.to_string()));
        ctx.insert(
            "today_ymd".to_string(),
            Value::String(started_at.format("%Y%m%d").to_string()),
        );
        ctx.insert(
            "now_ymd_hms".to_string(),
            Value::String(started_at.format("%Y%m%d_%H%M%S").to_string()),
        );
        ctx.insert(
            "base_dir".to_string(),
            Value::String(self.base_dir.display().to_string()),
        );
        ctx.insert(
            "_call_chain".to_string(),
            Value::Array(call_chain.into_iter().map(Value::String).collect()),
        );
        for (k, v) in extra {
            ctx.insert(k, v);
        }
        ctx
    }

    fn evaluate_when(&self, cond: &StepCondition, context: &Map<String, Value>) -> WhenOutcome {
        let Some(step_result) = context.get(&cond.step) else {
            return WhenOutcome::NotMatched(format!("condition_step_missing:{}", cond.step));
        };

        let actual = match step_result {
            Value::Object(map) => map.get(&cond.field),
            _ => None,
        };
        let Some(actual) = actual else {
            return WhenOutcome::NotMatched(format!("condition_field_missing:{}", cond.field));
        };

        let matched = match (actual, &cond.equals) {
            (Value::String(a), Value::String(b)) => {
                let left = normalize_string(a, cond.trim, cond.case_insensitive);
                let right = normalize_string(b, cond.trim, cond.case_insensitive);
                match cond.match_kind {
                    MatchKind::Contains => left.contains(&right),
                    MatchKind::Equals => left == right,
                }
            }
            (a, b) => a == b,
        };

        if matched {
            WhenOutcome::Matched
        } else {
            WhenOutcome::NotMatched("condition_not_met".to_string())
        }
    }
}

enum WhenOutcome {
    Matched,
    NotMatched(String),
}

fn normalize_string(value: &str, trim: bool, case_insensitive: bool) -> String {
    let mut text = if trim { value.trim() } else { value }.to_string();
    if case_insensitive {
        text = text.to_lowercase();
    }
    text
}

fn skipped_record(step: &Step, reason: &str, cond: &StepCondition) -> StepRecord {
    StepRecord {
        id: step.id.clone(),
        step_type: step.step_type.clone(),
        status: StepStatus::Skipped,
        result: serde_json::json!({
            "reason": reason,
            "when": cond,
        }),
        error: None,
    }
}

/// `YYYYMMDD_HHMMSS_xxxx`, `xxxx` being 4 cryptographically-sourced hex
/// characters. Collision within the same second is assumed practically
/// impossible.
pub fn generate_run_id(timezone: &FixedOffset) -> String {
    let now = Utc::now().with_timezone(timezone);
    let mut bytes = [0u8; 2];
    rand::thread_rng().fill_bytes(&mut bytes);
    format!("{}_{:02x}{:02x}", now.format("%Y%m%d_%H%M%S"), bytes[0], bytes[1])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::registry::ActionError;
    use relay_types::workflow::Trigger;
    use serde_json::json;
    use std::sync::Arc;

    fn jst() -> FixedOffset {
        FixedOffset::east_opt(9 * 3600).unwrap()
    }

    fn executor() -> Executor {
        Executor::new(
            ActionRegistry::new(),
            PathBuf::from("/tmp/relay-test"),
            Duration::from_secs(1),
            jst(),
        )
    }

    fn workflow(steps: Vec<Step>) -> Workflow {
        Workflow {
            name: "wf".to_string(),
            description: None,
            folder: None,
            enabled: true,
            trigger: Trigger::Manual,
            steps,
        }
    }

    fn log_step(id: &str, message_template: &str) -> Step {
        Step {
            id: id.to_string(),
            step_type: "log".to_string(),
            params: serde_json::Map::from_iter([(
                "message".to_string(),
                json!(message_template),
            )]),
            when: None,
            meta: None,
        }
    }

    async fn echo_as_text(params: Value, _ctx: Value) -> Result<Value, ActionError> {
        let message = params.get("message").and_then(|v| v.as_str()).unwrap_or_default();
        Ok(json!({"text": message}))
    }

    #[tokio::test]
    async fn s1_linear_success() {
        let exec = executor();
        exec.registry().register("log", Arc::new(echo_as_text), None);

        let wf = workflow(vec![
            log_step("step1", "hi"),
            log_step("step2", "{{ step1.text }}!"),
        ]);
        let log = exec.run(&wf, CancellationToken::new()).await;

        assert_eq!(log.status, RunStatus::Success);
        assert_eq!(log.steps.len(), 2);
        assert_eq!(log.steps[0].result, json!({"text": "hi"}));
        assert_eq!(log.steps[1].result, json!({"text": "hi!"}));
    }

    #[tokio::test]
    async fn s2_conditional_skip() {
        let exec = executor();
        exec.registry().register("log", Arc::new(echo_as_text), None);

        let mut step2 = log_step("step2", "nope");
        step2.when = Some(StepCondition {
            step: "step1".to_string(),
            field: "text".to_string(),
            equals: json!("bye"),
            match_kind: MatchKind::Equals,
            trim: true,
            case_insensitive: true,
        });

        let wf = workflow(vec![log_step("step1", "hi"), step2]);
        let log = exec.run(&wf, CancellationToken::new()).await;

        assert_eq!(log.status, RunStatus::Success);
        assert_eq!(log.steps[1].status, StepStatus::Skipped);
        assert_eq!(log.steps[1].result["reason"], json!("condition_not_met"));
    }

    #[tokio::test]
    async fn s3_unknown_action_halts_run() {
        let exec = executor();
        exec.registry().register("log", Arc::new(echo_as_text), None);

        let unknown = Step {
            id: "step2".to_string(),
            step_type: "unknown_xyz".to_string(),
            params: serde_json::Map::new(),
            when: None,
            meta: None,
        };
        let wf = workflow(vec![log_step("step1", "ok"), unknown, log_step("step3", "never")]);
        let log = exec.run(&wf, CancellationToken::new()).await;

        assert_eq!(log.status, RunStatus::Failed);
        assert_eq!(log.steps.len(), 2);
        assert!(log.steps[1].error.as_ref().unwrap().contains("Unknown action type: unknown_xyz"));
    }

    #[tokio::test]
    async fn s4_timeout_fails_run() {
        let mut exec = executor();
        exec.default_step_timeout = Duration::from_millis(50);
        exec.registry().register(
            "slow",
            Arc::new(|_params: Value, _ctx: Value| async move {
                tokio::time::sleep(Duration::from_secs(1)).await;
                Ok(json!({}))
            }),
            None,
        );

        let wf = workflow(vec![Step {
            id: "step1".to_string(),
            step_type: "slow".to_string(),
            params: serde_json::Map::new(),
            when: None,
            meta: None,
        }]);
        let log = exec.run(&wf, CancellationToken::new()).await;

        assert_eq!(log.status, RunStatus::Failed);
        assert!(log.steps[0].error.as_ref().unwrap().contains("timed out"));
    }

    #[tokio::test]
    async fn cancellation_marks_run_stopped() {
        let mut exec = executor();
        exec.default_step_timeout = Duration::from_secs(5);
        exec.registry().register(
            "slow",
            Arc::new(|_params: Value, _ctx: Value| async move {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(json!({}))
            }),
            None,
        );

        let wf = workflow(vec![Step {
            id: "step1".to_string(),
            step_type: "slow".to_string(),
            params: serde_json::Map::new(),
            when: None,
            meta: None,
        }]);

        let token = CancellationToken::new();
        let token2 = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            token2.cancel();
        });

        let log = exec.run(&wf, token).await;
        assert_eq!(log.status, RunStatus::Stopped);
    }

    #[test]
    fn evaluate_when_reports_missing_step() {
        let exec = executor();
        let cond = StepCondition {
            step: "gather".to_string(),
            field: "text".to_string(),
            equals: json!("x"),
            match_kind: MatchKind::Equals,
            trim: true,
            case_insensitive: true,
        };
        let outcome = exec.evaluate_when(&cond, &Map::new());
        match outcome {
            WhenOutcome::NotMatched(reason) => assert!(reason.starts_with("condition_step_missing")),
            WhenOutcome::Matched => panic!("expected not matched"),
        }
    }

    #[test]
    fn evaluate_when_idempotent() {
        let exec = executor();
        let mut context = Map::new();
        context.insert("gather".to_string(), json!({"text": "HI"}));
        let cond = StepCondition {
            step: "gather".to_string(),
            field: "text".to_string(),
            equals: json!("hi"),
            match_kind: MatchKind::Equals,
            trim: true,
            case_insensitive: true,
        };
        let first = matches!(exec.evaluate_when(&cond, &context), WhenOutcome::Matched);
        let second = matches!(exec.evaluate_when(&cond, &context), WhenOutcome::Matched);
        assert_eq!(first, second);
        assert!(first);
    }
}
