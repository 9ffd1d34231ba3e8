//! Backup Manager: snapshot a workflow definition file before
//! overwrite, pruning to the newest N per workflow.

use std::path::PathBuf;

use chrono::{FixedOffset, Utc};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BackupError {
    #[error("failed to create backup directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write backup {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// One snapshot entry, newest-first in `BackupManager::list`.
#[derive(Debug, Clone, serde::Serialize)]
pub struct BackupEntry {
    pub filename: String,
    pub timestamp: String,
    pub size: u64,
}

/// Writes definition snapshots under `<backup_dir>/<workflow_name>/` and
/// prunes each workflow's directory to the newest `max_backups` files.
pub struct BackupManager {
    backup_dir: PathBuf,
    ext: String,
    max_backups: usize,
    timezone: FixedOffset,
}

impl BackupManager {
    pub fn new(backup_dir: impl Into<PathBuf>, ext: impl Into<String>, max_backups: usize, timezone: FixedOffset) -> Self {
        Self {
            backup_dir: backup_dir.into(),
            ext: ext.into(),
            max_backups,
            timezone,
        }
    }

    fn workflow_dir(&self, workflow_name: &str) -> PathBuf {
        self.backup_dir.join(workflow_name)
    }

    /// Snapshot `previous_content` for `workflow_name` before it gets
    /// overwritten. A no-op (returns `Ok(None)`) when there's nothing to
    /// back up.
    pub fn backup(&self, workflow_name: &str, previous_content: &str) -> Result<Option<PathBuf>, BackupError> {
        if previous_content.is_empty() {
            return Ok(None);
        }

        let dir = self.workflow_dir(workflow_name);
        std::fs::create_dir_all(&dir).map_err(|source| BackupError::CreateDir {
            path: dir.clone(),
            source,
        })?;

        let timestamp = Utc::now().with_timezone(&self.timezone).format("%Y%m%d_%H%M%S");
        let path = dir.join(format!("{timestamp}.{}", self.ext));
        std::fs::write(&path, previous_content).map_err(|source| BackupError::Write {
            path: path.clone(),
            source,
        })?;
        tracing::info!(path = %path.display(), "backup created");

        self.cleanup_old_backups(&dir);
        Ok(Some(path))
    }

    fn cleanup_old_backups(&self, dir: &std::path::Path) {
        let mut backups = self.snapshot_files(dir);
        backups.sort_by_key(|(_, mtime)| std::cmp::Reverse(*mtime));

        for (path, _) in backups.into_iter().skip(self.max_backups) {
            if let Err(e) = std::fs::remove_file(&path) {
                tracing::warn!(path = %path.display(), error = %e, "failed to remove old backup");
            } else {
                tracing::debug!(path = %path.display(), "old backup removed");
            }
        }
    }

    fn snapshot_files(&self, dir: &std::path::Path) -> Vec<(PathBuf, std::time::SystemTime)> {
        std::fs::read_dir(dir)
            .into_iter()
            .flatten()
            .flatten()
            .filter_map(|entry| {
                let path = entry.path();
                if path.extension().and_then(|e| e.to_str()) != Some(self.ext.as_str()) {
                    return None;
                }
                let mtime = entry.metadata().and_then(|m| m.modified()).ok()?;
                Some((path, mtime))
            })
            .collect()
    }

    /// Snapshots for `workflow_name`, newest first.
    pub fn list(&self, workflow_name: &str) -> Vec<BackupEntry> {
        let dir = self.workflow_dir(workflow_name);
        if !dir.exists() {
            return Vec::new();
        }

        let mut entries: Vec<(PathBuf, std::time::SystemTime)> = self.snapshot_files(&dir);
        entries.sort_by_key(|(_, mtime)| std::cmp::Reverse(*mtime));

        entries
            .into_iter()
            .map(|(path, _)| {
                let filename = path.file_name().unwrap().to_string_lossy().into_owned();
                let timestamp = path.file_stem().unwrap().to_string_lossy().into_owned();
                let size = std::fs::metadata(&path).map(|m| m.len()).unwrap_or(0);
                BackupEntry { filename, timestamp, size }
            })
            .collect()
    }
}
