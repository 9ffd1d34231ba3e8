//! Run Journal: append-only daily JSONL log of terminated runs.
//!
//! One file per calendar day, `YYYYMMDD.<ext>`, each line a self-contained
//! `RunLog`. Writes are open-append-close so they tolerate cohabitation
//! with the retention sweep; readers skip malformed lines with a warning
//! instead of failing the whole scan.

use std::path::{Path, PathBuf};

use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use relay_types::workflow::{LatestRunMap, RunLog};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum JournalError {
    #[error("failed to create runs directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to append to {path}: {source}")]
    Append {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to serialize run log: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Summary returned by `cleanup`.
#[derive(Debug, Clone, serde::Serialize)]
pub struct CleanupReport {
    pub retention_days: u32,
    pub cutoff_date: NaiveDate,
    pub deleted_count: usize,
    pub deleted_files: Vec<String>,
    pub deleted_size_bytes: u64,
    pub kept_count: usize,
}

/// Daily append-only JSONL run log under `<base_dir>/runs/`.
pub struct Journal {
    runs_dir: PathBuf,
    ext: String,
    timezone: FixedOffset,
}

impl Journal {
    pub fn new(runs_dir: impl Into<PathBuf>, ext: impl Into<String>, timezone: FixedOffset) -> Self {
        Self {
            runs_dir: runs_dir.into(),
            ext: ext.into(),
            timezone,
        }
    }

    fn file_for(&self, date: NaiveDate) -> PathBuf {
        self.runs_dir.join(format!("{}.{}", date.format("%Y%m%d"), self.ext))
    }

    /// Append a fully terminated `RunLog` to today's file. Partial
    /// (still-running) logs are never written.
    pub fn save(&self, run_log: &RunLog) -> Result<(), JournalError> {
        std::fs::create_dir_all(&self.runs_dir).map_err(|source| JournalError::CreateDir {
            path: self.runs_dir.clone(),
            source,
        })?;

        let today = Utc::now().with_timezone(&self.timezone).date_naive();
        let path = self.file_for(today);

        let mut line = serde_json::to_string(run_log)?;
        line.push('\n');

        use std::io::Write;
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|source| JournalError::Append {
                path: path.clone(),
                source,
            })?;
        file.write_all(line.as_bytes())
            .map_err(|source| JournalError::Append { path, source })?;

        tracing::debug!(run_id = run_log.run_id.as_str(), "run log saved");
        Ok(())
    }

    /// All daily journal files, sorted by date descending (newest first).
    fn journal_files_newest_first(&self) -> Vec<PathBuf> {
        let mut files: Vec<PathBuf> = std::fs::read_dir(&self.runs_dir)
            .into_iter()
            .flatten()
            .flatten()
            .map(|e| e.path())
            .filter(|p| p.is_file() && p.extension().and_then(|e| e.to_str()) == Some(self.ext.as_str()))
            .collect();
        files.sort_by(|a, b| b.file_stem().cmp(&a.file_stem()));
        files
    }

    fn read_file(&self, path: &Path, workflow_filter: Option<&str>) -> Vec<RunLog> {
        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) => {
                tracing::error!(path = %path.display(), error = %e, "failed to read journal file");
                return Vec::new();
            }
        };

        let mut runs = Vec::new();
        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match serde_json::from_str::<RunLog>(line) {
                Ok(run) => {
                    if workflow_filter.is_none_or(|w| run.workflow == w) {
                        runs.push(run);
                    }
                }
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "skipping malformed journal line");
                }
            }
        }
        runs
    }

    fn scan(&self, workflow_filter: Option<&str>) -> Vec<RunLog> {
        let mut runs = Vec::new();
        for file in self.journal_files_newest_first() {
            runs.extend(self.read_file(&file, workflow_filter));
        }
        runs.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        runs
    }

    pub fn runs_for(&self, workflow: &str, limit: usize, offset: usize) -> Vec<RunLog> {
        let runs = self.scan(Some(workflow));
        runs.into_iter().skip(offset).take(limit).collect()
    }

    pub fn all_runs(&self, limit: usize, offset: usize, workflow_filter: Option<&str>) -> Vec<RunLog> {
        let runs = self.scan(workflow_filter);
        runs.into_iter().skip(offset).take(limit).collect()
    }

    pub fn count_runs_for(&self, workflow: &str) -> usize {
        self.scan(Some(workflow)).len()
    }

    pub fn count_all_runs(&self, workflow_filter: Option<&str>) -> usize {
        self.scan(workflow_filter).len()
    }

    /// Most recent run for `workflow`, if any.
    pub fn latest(&self, workflow: &str) -> Option<RunLog> {
        self.runs_for(workflow, 1, 0).into_iter().next()
    }

    /// Most recent run per workflow name in `workflows`, reading each
    /// journal file at most once. Only names with at least one run appear
    /// in the result.
    pub fn latest_map(&self, workflows: &[String]) -> LatestRunMap {
        let wanted: std::collections::HashSet<&str> = workflows.iter().map(|s| s.as_str()).collect();
        let mut latest: LatestRunMap = LatestRunMap::new();

        for file in self.journal_files_newest_first() {
            for run in self.read_file(&file, None) {
                if !wanted.contains(run.workflow.as_str()) {
                    continue;
                }
                latest
                    .entry(run.workflow.clone())
                    .and_modify(|existing| {
                        if run.started_at > existing.started_at {
                            *existing = run.clone();
                        }
                    })
                    .or_insert(run);
            }
        }
        latest
    }

    /// Delete journal files strictly older than `now - retention_days`
    /// (in the configured timezone). Files whose stem isn't a bare
    /// `YYYYMMDD` date are left untouched.
    pub fn cleanup(&self, retention_days: u32) -> CleanupReport {
        let cutoff = Utc::now().with_timezone(&self.timezone).date_naive() - chrono::Days::new(retention_days as u64);

        let mut deleted_files = Vec::new();
        let mut deleted_size = 0u64;
        let mut kept_count = 0usize;

        for entry in std::fs::read_dir(&self.runs_dir).into_iter().flatten().flatten() {
            let path = entry.path();
            if !path.is_file() || path.extension().and_then(|e| e.to_str()) != Some(self.ext.as_str()) {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let Ok(file_date) = NaiveDate::parse_from_str(stem, "%Y%m%d") else {
                tracing::warn!(path = %path.display(), "skipped non-date journal file");
                continue;
            };

            if file_date < cutoff {
                let size = entry.metadata().map(|m| m.len()).unwrap_or(0);
                match std::fs::remove_file(&path) {
                    Ok(()) => {
                        deleted_size += size;
                        deleted_files.push(path.file_name().unwrap().to_string_lossy().into_owned());
                    }
                    Err(e) => tracing::error!(path = %path.display(), error = %e, "failed to delete journal file"),
                }
            } else {
                kept_count += 1;
            }
        }

        tracing::info!(deleted = deleted_files.len(), "journal retention sweep completed");

        CleanupReport {
            retention_days,
            cutoff_date: cutoff,
            deleted_count: deleted_files.len(),
            deleted_files,
            deleted_size_bytes: deleted_size,
            kept_count,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_types::workflow::{RunStatus, StepRecord, StepStatus};

    fn jst() -> FixedOffset {
        FixedOffset::east_opt(9 * 3600).unwrap()
    }

    fn sample_log(workflow: &str, started_at: DateTime<FixedOffset>) -> RunLog {
        RunLog {
            run_id: format!("{}_ab12", started_at.format("%Y%m%d_%H%M%S")),
            workflow: workflow.to_string(),
            status: RunStatus::Success,
            started_at,
            ended_at: Some(started_at),
            error: None,
            steps: vec![StepRecord {
                id: "s1".to_string(),
                step_type: "log".to_string(),
                status: StepStatus::Success,
                result: serde_json::json!({"text": "hi"}),
                error: None,
            }],
        }
    }

    #[test]
    fn save_then_runs_for_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let journal = Journal::new(dir.path(), "jsonl", jst());
        let log = sample_log("wf", Utc::now().with_timezone(&jst()));
        journal.save(&log).unwrap();

        let runs = journal.runs_for("wf", 10, 0);
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].run_id, log.run_id);
    }

    #[test]
    fn scan_sorts_newest_first_and_applies_offset_limit() {
        let dir = tempfile::tempdir().unwrap();
        let journal = Journal::new(dir.path(), "jsonl", jst());
        let now = Utc::now().with_timezone(&jst());
        journal.save(&sample_log("wf", now - chrono::Duration::seconds(10))).unwrap();
        journal.save(&sample_log("wf", now)).unwrap();

        let runs = journal.all_runs(10, 0, None);
        assert_eq!(runs.len(), 2);
        assert!(runs[0].started_at > runs[1].started_at);

        let paged = journal.all_runs(1, 1, None);
        assert_eq!(paged.len(), 1);
        assert_eq!(paged[0].started_at, runs[1].started_at);
    }

    #[test]
    fn malformed_lines_are_skipped_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let journal = Journal::new(dir.path(), "jsonl", jst());
        let today = Utc::now().with_timezone(&jst()).date_naive();
        let path = journal.file_for(today);
        std::fs::write(&path, "not json\n{\"broken\n").unwrap();

        let runs = journal.all_runs(10, 0, None);
        assert!(runs.is_empty());
    }

    #[test]
    fn latest_map_reads_each_file_once_and_keeps_most_recent() {
        let dir = tempfile::tempdir().unwrap();
        let journal = Journal::new(dir.path(), "jsonl", jst());
        let now = Utc::now().with_timezone(&jst());
        journal.save(&sample_log("a", now - chrono::Duration::seconds(10))).unwrap();
        journal.save(&sample_log("a", now)).unwrap();
        journal.save(&sample_log("b", now)).unwrap();

        let latest = journal.latest_map(&["a".to_string(), "b".to_string(), "c".to_string()]);
        assert_eq!(latest.len(), 2);
        assert_eq!(latest["a"].started_at, now);
        assert!(!latest.contains_key("c"));
    }

    #[test]
    fn cleanup_deletes_only_files_older_than_retention() {
        let dir = tempfile::tempdir().unwrap();
        let journal = Journal::new(dir.path(), "jsonl", jst());
        let today = Utc::now().with_timezone(&jst()).date_naive();

        let old = today - chrono::Days::new(31);
        let borderline = today - chrono::Days::new(29);

        std::fs::write(journal.file_for(old), "{}\n").unwrap();
        std::fs::write(journal.file_for(borderline), "{}\n").unwrap();
        std::fs::write(journal.file_for(today), "{}\n").unwrap();
        std::fs::write(dir.path().join("not-a-date.jsonl"), "{}\n").unwrap();

        let report = journal.cleanup(30);
        assert_eq!(report.deleted_count, 1);
        assert_eq!(report.deleted_files, vec![format!("{}.jsonl", old.format("%Y%m%d"))]);
        assert_eq!(report.kept_count, 2);
        assert!(dir.path().join("not-a-date.jsonl").exists());
    }
}
