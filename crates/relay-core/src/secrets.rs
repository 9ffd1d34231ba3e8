//! Two-link secret resolution: environment variable, then `secrets/*.txt`.
//!
//! One key per integration. The environment variable takes precedence over
//! its file counterpart; if neither is present the caller gets an error
//! naming both places it looked.

use std::path::{Path, PathBuf};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SecretError {
    #[error("secret '{name}' not found: checked env var {env_var} and file {file_path}")]
    NotFound {
        name: String,
        env_var: String,
        file_path: String,
    },
    #[error("failed to read secret file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Resolves the secret for `name` (e.g. `"OPENAI_API_KEY"`).
///
/// Looks up the environment variable `name` verbatim first, then
/// `<secrets_dir>/<name>.txt`, trimming trailing newlines from the file.
pub fn resolve_secret(secrets_dir: &Path, name: &str) -> Result<String, SecretError> {
    if let Ok(value) = std::env::var(name) {
        if !value.is_empty() {
            return Ok(value);
        }
    }

    let file_path = secrets_dir.join(format!("{name}.txt"));
    match std::fs::read_to_string(&file_path) {
        Ok(content) => Ok(content.trim_end_matches(['\n', '\r']).to_string()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(SecretError::NotFound {
            name: name.to_string(),
            env_var: name.to_string(),
            file_path: file_path.display().to_string(),
        }),
        Err(source) => Err(SecretError::Read {
            path: file_path,
            source,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_var_takes_precedence_over_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("DEMO_KEY.txt"), "from-file").unwrap();
        // SAFETY: test-local env var, no concurrent access to this name.
        unsafe { std::env::set_var("RELAY_SECRET_TEST_ENV_PRECEDENCE", "from-env") };
        let value = resolve_secret(dir.path(), "RELAY_SECRET_TEST_ENV_PRECEDENCE").unwrap();
        assert_eq!(value, "from-env");
        unsafe { std::env::remove_var("RELAY_SECRET_TEST_ENV_PRECEDENCE") };
    }

    #[test]
    fn falls_back_to_file_when_env_absent() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("FILE_ONLY_KEY.txt"), "secret-value\n").unwrap();
        let value = resolve_secret(dir.path(), "FILE_ONLY_KEY").unwrap();
        assert_eq!(value, "secret-value");
    }

    #[test]
    fn errors_name_both_locations_when_missing() {
        let dir = tempfile::tempdir().unwrap();
        let err = resolve_secret(dir.path(), "MISSING_KEY").unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("MISSING_KEY"));
        assert!(msg.contains("MISSING_KEY.txt"));
    }
}
