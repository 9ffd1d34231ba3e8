//! Workflow Model & Loader: parse/validate/discover/load/save.
//!
//! Mirrors the Python original's `WorkflowLoader` contract -- `load` never
//! raises, it returns `(workflow, None)` or `(None, error)` as first-class
//! values (here, a `Result<Workflow, LoadError>`).

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use relay_types::workflow::{Trigger, Workflow, WorkflowInfo};
use thiserror::Error;

/// Errors the loader can report for a single workflow lookup. Never
/// raised for a missing/malformed *file* -- those become `Err` values
/// returned from `load`, not panics or process-level errors.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("workflow '{0}' not found")]
    Missing(String),
    #[error("YAML syntax error: {0}")]
    Parse(String),
    #[error("validation error at {path}: {message}")]
    Validation { path: String, message: String },
    #[error("workflow file is empty")]
    Empty,
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl LoadError {
    pub fn message(&self) -> String {
        self.to_string()
    }
}

/// Validate structural constraints not already enforced by `serde`
/// (`Trigger`/`Step` shape is type-level; this covers cross-field rules).
pub fn validate(workflow: &Workflow) -> Result<(), LoadError> {
    if workflow.name.trim().is_empty() {
        return Err(LoadError::Validation {
            path: "name".to_string(),
            message: "workflow name must not be empty".to_string(),
        });
    }

    if workflow.steps.is_empty() {
        return Err(LoadError::Validation {
            path: "steps".to_string(),
            message: "workflow must have at least one step".to_string(),
        });
    }

    if let Trigger::Schedule { cron } = &workflow.trigger {
        if cron.trim().is_empty() {
            return Err(LoadError::Validation {
                path: "trigger.cron".to_string(),
                message: "cron expression must not be empty".to_string(),
            });
        }
    }

    let mut seen_ids = HashSet::new();
    for (i, step) in workflow.steps.iter().enumerate() {
        if step.id.trim().is_empty() {
            return Err(LoadError::Validation {
                path: format!("steps[{i}].id"),
                message: "step id must not be empty".to_string(),
            });
        }
        if !step
            .id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            return Err(LoadError::Validation {
                path: format!("steps[{i}].id"),
                message: format!(
                    "step id '{}' must match [A-Za-z0-9_]",
                    step.id
                ),
            });
        }
        if !seen_ids.insert(step.id.clone()) {
            return Err(LoadError::Validation {
                path: format!("steps[{i}].id"),
                message: format!("duplicate step id '{}'", step.id),
            });
        }
        if let Some(when) = &step.when {
            if when.step.trim().is_empty() {
                return Err(LoadError::Validation {
                    path: format!("steps[{i}].when.step"),
                    message: "condition must reference a step id".to_string(),
                });
            }
        }
    }

    Ok(())
}

pub fn parse_workflow_yaml(yaml: &str) -> Result<Workflow, LoadError> {
    if yaml.trim().is_empty() {
        return Err(LoadError::Empty);
    }
    let workflow: Workflow =
        serde_yaml_ng::from_str(yaml).map_err(|e| LoadError::Parse(e.to_string()))?;
    validate(&workflow)?;
    Ok(workflow)
}

pub fn serialize_workflow_yaml(workflow: &Workflow) -> Result<String, LoadError> {
    serde_yaml_ng::to_string(workflow).map_err(|e| LoadError::Parse(e.to_string()))
}

/// Loads/saves/discovers workflow definition files under a directory,
/// using `primary_ext` (wins on conflict) and `secondary_ext`.
pub struct Loader {
    dir: PathBuf,
    primary_ext: String,
    secondary_ext: String,
}

impl Loader {
    pub fn new(dir: impl Into<PathBuf>, primary_ext: impl Into<String>, secondary_ext: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            primary_ext: primary_ext.into(),
            secondary_ext: secondary_ext.into(),
        }
    }

    fn candidate_path(&self, name: &str) -> Option<PathBuf> {
        let primary = self.dir.join(format!("{name}.{}", self.primary_ext));
        if primary.exists() {
            return Some(primary);
        }
        let secondary = self.dir.join(format!("{name}.{}", self.secondary_ext));
        if secondary.exists() {
            return Some(secondary);
        }
        None
    }

    /// Load and validate workflow `name`. Never panics on a missing or
    /// malformed file -- the failure modes are all `LoadError` variants.
    pub fn load(&self, name: &str) -> Result<Workflow, LoadError> {
        let path = self
            .candidate_path(name)
            .ok_or_else(|| LoadError::Missing(name.to_string()))?;
        let content = std::fs::read_to_string(&path)?;
        parse_workflow_yaml(&content)
    }

    /// Save `workflow` under `<dir>/<workflow.name>.<primary_ext>`, creating
    /// the directory if needed.
    pub fn save(&self, workflow: &Workflow) -> Result<PathBuf, LoadError> {
        if !self.dir.exists() {
            std::fs::create_dir_all(&self.dir)?;
        }
        let path = self.dir.join(format!("{}.{}", workflow.name, self.primary_ext));
        let yaml = serialize_workflow_yaml(workflow)?;
        std::fs::write(&path, yaml)?;
        Ok(path)
    }

    /// All workflow files under `dir`, sorted by stem.
    fn discover_files(&self) -> Vec<PathBuf> {
        let mut files = Vec::new();
        if let Ok(entries) = std::fs::read_dir(&self.dir) {
            for entry in entries.flatten() {
                let path = entry.path();
                if !path.is_file() {
                    continue;
                }
                if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
                    if ext == self.primary_ext || ext == self.secondary_ext {
                        files.push(path);
                    }
                }
            }
        }
        files.sort_by_key(|p| p.file_stem().map(|s| s.to_os_string()));
        files
    }

    /// Summaries for every workflow file under `dir`, valid or not.
    pub fn list(&self) -> Vec<WorkflowInfo> {
        self.discover_files()
            .into_iter()
            .map(|path| {
                let stem = path
                    .file_stem()
                    .and_then(|s| s.to_str())
                    .unwrap_or_default()
                    .to_string();
                let filename = path
                    .file_name()
                    .and_then(|s| s.to_str())
                    .unwrap_or_default()
                    .to_string();

                match std::fs::read_to_string(&path).map_err(LoadError::from).and_then(|c| parse_workflow_yaml(&c)) {
                    Ok(wf) => WorkflowInfo {
                        name: wf.name,
                        filename,
                        trigger_type: wf.trigger.kind().to_string(),
                        cron: wf.trigger.cron().map(|s| s.to_string()),
                        step_count: wf.steps.len(),
                        is_valid: true,
                        error: None,
                        enabled: wf.enabled,
                        folder: wf.folder,
                    },
                    Err(e) => WorkflowInfo {
                        name: stem,
                        filename,
                        trigger_type: "unknown".to_string(),
                        cron: None,
                        step_count: 0,
                        is_valid: false,
                        error: Some(e.message()),
                        enabled: false,
                        folder: None,
                    },
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_types::workflow::Step;

    fn minimal_workflow(name: &str) -> Workflow {
        Workflow {
            name: name.to_string(),
            description: None,
            folder: None,
            enabled: true,
            trigger: Trigger::Manual,
            steps: vec![Step {
                id: "a".to_string(),
                step_type: "log".to_string(),
                params: serde_json::Map::new(),
                when: None,
                meta: None,
            }],
        }
    }

    #[test]
    fn validate_rejects_empty_steps() {
        let mut wf = minimal_workflow("x");
        wf.steps.clear();
        let err = validate(&wf).unwrap_err();
        assert!(err.to_string().contains("at least one step"));
    }

    #[test]
    fn validate_rejects_duplicate_ids() {
        let mut wf = minimal_workflow("x");
        wf.steps.push(wf.steps[0].clone());
        let err = validate(&wf).unwrap_err();
        assert!(err.to_string().contains("duplicate step id"));
    }

    #[test]
    fn validate_rejects_bad_id_characters() {
        let mut wf = minimal_workflow("x");
        wf.steps[0].id = "bad id!".to_string();
        let err = validate(&wf).unwrap_err();
        assert!(err.to_string().contains("[A-Za-z0-9_]"));
    }

    #[test]
    fn parse_empty_yaml_is_empty_error() {
        let err = parse_workflow_yaml("").unwrap_err();
        assert!(matches!(err, LoadError::Empty));
    }

    #[test]
    fn save_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let loader = Loader::new(dir.path(), "yaml", "yml");
        let wf = minimal_workflow("daily-digest");
        loader.save(&wf).unwrap();

        let loaded = loader.load("daily-digest").unwrap();
        assert_eq!(loaded.name, wf.name);
        assert_eq!(loaded.steps.len(), wf.steps.len());
    }

    #[test]
    fn load_missing_workflow_is_missing_error() {
        let dir = tempfile::tempdir().unwrap();
        let loader = Loader::new(dir.path(), "yaml", "yml");
        let err = loader.load("nope").unwrap_err();
        assert!(matches!(err, LoadError::Missing(_)));
    }

    #[test]
    fn primary_extension_wins_over_secondary() {
        let dir = tempfile::tempdir().unwrap();
        let loader = Loader::new(dir.path(), "yaml", "yml");
        std::fs::write(
            dir.path().join("dup.yaml"),
            serialize_workflow_yaml(&minimal_workflow("dup-primary")).unwrap(),
        )
        .unwrap();
        std::fs::write(
            dir.path().join("dup.yml"),
            serialize_workflow_yaml(&minimal_workflow("dup-secondary")).unwrap(),
        )
        .unwrap();

        let loaded = loader.load("dup").unwrap();
        assert_eq!(loaded.name, "dup-primary");
    }

    #[test]
    fn list_reports_invalid_files_without_failing() {
        let dir = tempfile::tempdir().unwrap();
        let loader = Loader::new(dir.path(), "yaml", "yml");
        loader.save(&minimal_workflow("good")).unwrap();
        std::fs::write(dir.path().join("broken.yaml"), "steps: []\nname: broken\n").unwrap();

        let infos = loader.list();
        assert_eq!(infos.len(), 2);
        let broken = infos.iter().find(|i| i.name == "broken").unwrap();
        assert!(!broken.is_valid);
        assert!(broken.error.is_some());
        let good = infos.iter().find(|i| i.name == "good").unwrap();
        assert!(good.is_valid);
    }

    #[test]
    fn meta_survives_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let loader = Loader::new(dir.path(), "yaml", "yml");
        let mut wf = minimal_workflow("with-meta");
        wf.steps[0].meta = Some(serde_json::Map::from_iter([(
            "x".to_string(),
            serde_json::json!(12),
        )]));
        loader.save(&wf).unwrap();

        let loaded = loader.load("with-meta").unwrap();
        assert_eq!(loaded.steps[0].meta, wf.steps[0].meta);
    }
}
