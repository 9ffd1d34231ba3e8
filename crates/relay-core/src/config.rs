//! `RelayConfig` resolution: defaults -> `relay.toml` -> `RELAY_*` env vars.
//!
//! CLI flags are applied by the caller (`relay-cli`) after `RelayConfig::load`
//! returns, by overwriting the relevant field directly.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

fn default_configured_timezone() -> String {
    "+09:00".to_string()
}

fn default_step_timeout_secs() -> u64 {
    300
}

fn default_journal_retention_days() -> u32 {
    30
}

fn default_max_backups() -> usize {
    10
}

fn default_workflow_primary_ext() -> String {
    "yaml".to_string()
}

fn default_workflow_secondary_ext() -> String {
    "yml".to_string()
}

fn default_journal_ext() -> String {
    "jsonl".to_string()
}

/// Process-wide configuration for the workflow host.
///
/// Resolution order: built-in defaults, then `<base_dir>/relay.toml` (if
/// present), then `RELAY_*` environment variables, each layer overriding
/// the previous one field-by-field.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    /// Filesystem root that `workflows/`, `runs/`, `backups/`, `secrets/`
    /// and `relay.toml` itself are resolved relative to.
    #[serde(default = "default_base_dir")]
    pub base_dir: PathBuf,

    /// Fixed UTC offset (e.g. `+09:00`) used for all timestamps, cron
    /// evaluation, day boundaries, and retention cutoffs.
    #[serde(default = "default_configured_timezone")]
    pub configured_timezone: String,

    /// Default per-step invocation deadline.
    #[serde(default = "default_step_timeout_secs")]
    pub default_step_timeout_secs: u64,

    /// Journal files older than this many days are deleted by the
    /// retention sweep.
    #[serde(default = "default_journal_retention_days")]
    pub journal_retention_days: u32,

    /// Number of definition snapshots kept per workflow by the backup
    /// manager.
    #[serde(default = "default_max_backups")]
    pub max_backups: usize,

    /// Preferred workflow file extension; wins over `workflow_secondary_ext`
    /// when both exist for the same stem.
    #[serde(default = "default_workflow_primary_ext")]
    pub workflow_primary_ext: String,

    /// Fallback workflow file extension.
    #[serde(default = "default_workflow_secondary_ext")]
    pub workflow_secondary_ext: String,

    /// Extension for daily journal files (without the leading dot).
    #[serde(default = "default_journal_ext")]
    pub journal_ext: String,
}

fn default_base_dir() -> PathBuf {
    PathBuf::from(".")
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            base_dir: default_base_dir(),
            configured_timezone: default_configured_timezone(),
            default_step_timeout_secs: default_step_timeout_secs(),
            journal_retention_days: default_journal_retention_days(),
            max_backups: default_max_backups(),
            workflow_primary_ext: default_workflow_primary_ext(),
            workflow_secondary_ext: default_workflow_secondary_ext(),
            journal_ext: default_journal_ext(),
        }
    }
}

/// Errors encountered while resolving configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid value for {0}: {1}")]
    InvalidEnvValue(&'static str, String),
}

impl RelayConfig {
    /// Resolve configuration: defaults, then `<base_dir>/relay.toml` if it
    /// exists, then `RELAY_*` env var overrides. `.env` at `base_dir` is
    /// loaded first, best-effort, so env overrides can come from it too.
    pub fn load(base_dir: &Path) -> Result<Self, ConfigError> {
        let _ = dotenvy::from_path(base_dir.join(".env"));

        let mut config = Self {
            base_dir: base_dir.to_path_buf(),
            ..Self::default()
        };

        let toml_path = base_dir.join("relay.toml");
        if toml_path.exists() {
            let raw = std::fs::read_to_string(&toml_path).map_err(|source| ConfigError::Read {
                path: toml_path.clone(),
                source,
            })?;
            let from_file: RelayConfigFile =
                toml::from_str(&raw).map_err(|source| ConfigError::Parse {
                    path: toml_path.clone(),
                    source,
                })?;
            from_file.apply(&mut config);
        }

        config.apply_env()?;
        Ok(config)
    }

    fn apply_env(&mut self) -> Result<(), ConfigError> {
        if let Ok(v) = std::env::var("RELAY_BASE_DIR") {
            self.base_dir = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("RELAY_CONFIGURED_TIMEZONE") {
            self.configured_timezone = v;
        }
        if let Ok(v) = std::env::var("RELAY_DEFAULT_STEP_TIMEOUT_SECS") {
            self.default_step_timeout_secs = v.parse().map_err(|_| {
                ConfigError::InvalidEnvValue("RELAY_DEFAULT_STEP_TIMEOUT_SECS", v)
            })?;
        }
        if let Ok(v) = std::env::var("RELAY_JOURNAL_RETENTION_DAYS") {
            self.journal_retention_days = v
                .parse()
                .map_err(|_| ConfigError::InvalidEnvValue("RELAY_JOURNAL_RETENTION_DAYS", v))?;
        }
        if let Ok(v) = std::env::var("RELAY_MAX_BACKUPS") {
            self.max_backups = v
                .parse()
                .map_err(|_| ConfigError::InvalidEnvValue("RELAY_MAX_BACKUPS", v))?;
        }
        Ok(())
    }

    pub fn workflows_dir(&self) -> PathBuf {
        self.base_dir.join("workflows")
    }

    pub fn runs_dir(&self) -> PathBuf {
        self.base_dir.join("runs")
    }

    pub fn backups_dir(&self) -> PathBuf {
        self.base_dir.join("backups")
    }

    pub fn secrets_dir(&self) -> PathBuf {
        self.base_dir.join("secrets")
    }

    /// Parse `configured_timezone` into a `chrono::FixedOffset`.
    pub fn timezone_offset(&self) -> chrono::FixedOffset {
        parse_fixed_offset(&self.configured_timezone).unwrap_or_else(|| {
            tracing::warn!(
                value = self.configured_timezone.as_str(),
                "invalid configured_timezone, falling back to +09:00"
            );
            chrono::FixedOffset::east_opt(9 * 3600).expect("constant offset")
        })
    }
}

fn parse_fixed_offset(s: &str) -> Option<chrono::FixedOffset> {
    let s = s.trim();
    let (sign, rest) = match s.as_bytes().first() {
        Some(b'+') => (1, &s[1..]),
        Some(b'-') => (-1, &s[1..]),
        _ => return None,
    };
    let (h, m) = rest.split_once(':')?;
    let h: i32 = h.parse().ok()?;
    let m: i32 = m.parse().ok()?;
    chrono::FixedOffset::east_opt(sign * (h * 3600 + m * 60))
}

/// Shape of `relay.toml`; every field optional so a partial file only
/// overrides what it mentions.
#[derive(Debug, Default, Deserialize)]
struct RelayConfigFile {
    configured_timezone: Option<String>,
    default_step_timeout_secs: Option<u64>,
    journal_retention_days: Option<u32>,
    max_backups: Option<usize>,
    workflow_primary_ext: Option<String>,
    workflow_secondary_ext: Option<String>,
    journal_ext: Option<String>,
}

impl RelayConfigFile {
    fn apply(self, config: &mut RelayConfig) {
        if let Some(v) = self.configured_timezone {
            config.configured_timezone = v;
        }
        if let Some(v) = self.default_step_timeout_secs {
            config.default_step_timeout_secs = v;
        }
        if let Some(v) = self.journal_retention_days {
            config.journal_retention_days = v;
        }
        if let Some(v) = self.max_backups {
            config.max_backups = v;
        }
        if let Some(v) = self.workflow_primary_ext {
            config.workflow_primary_ext = v;
        }
        if let Some(v) = self.workflow_secondary_ext {
            config.workflow_secondary_ext = v;
        }
        if let Some(v) = self.journal_ext {
            config.journal_ext = v;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_timezone_is_jst() {
        let config = RelayConfig::default();
        assert_eq!(config.configured_timezone, "+09:00");
        assert_eq!(config.timezone_offset().local_minus_utc(), 9 * 3600);
    }

    #[test]
    fn parse_fixed_offset_handles_negative() {
        let off = parse_fixed_offset("-05:30").unwrap();
        assert_eq!(off.local_minus_utc(), -(5 * 3600 + 30 * 60));
    }

    #[test]
    fn load_applies_relay_toml_over_defaults() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("relay.toml"),
            "configured_timezone = \"+00:00\"\nmax_backups = 3\n",
        )
        .unwrap();

        let config = RelayConfig::load(dir.path()).unwrap();
        assert_eq!(config.configured_timezone, "+00:00");
        assert_eq!(config.max_backups, 3);
        assert_eq!(config.default_step_timeout_secs, 300);
    }

    #[test]
    fn load_without_relay_toml_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = RelayConfig::load(dir.path()).unwrap();
        assert_eq!(config.configured_timezone, "+09:00");
        assert_eq!(config.journal_retention_days, 30);
    }
}
