//! Playground configuration.
//!
//! Every field has a default, so a config file only needs the values it
//! changes:
//!
//! ```json
//! {
//!   "run_delay_ms": 0,
//!   "theme": "dark",
//!   "sandbox": { "timeout_ms": 2000, "capabilities": { "modals": false } }
//! }
//! ```

use crate::runtime::SandboxConfig;
use crate::theme::Theme;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaygroundConfig {
    pub sandbox: SandboxConfig,
    /// Pause before a run compiles, so the busy indicator is visible
    /// (default: 300ms)
    pub run_delay_ms: u64,
    pub theme: Theme,
}

impl Default for PlaygroundConfig {
    fn default() -> Self {
        Self {
            sandbox: SandboxConfig::default(),
            run_delay_ms: 300,
            theme: Theme::default(),
        }
    }
}

impl PlaygroundConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        tracing::debug!(path = %path.display(), "loaded playground config");
        Ok(config)
    }

    pub fn run_delay(&self) -> Duration {
        Duration::from_millis(self.run_delay_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("playground.json");
        std::fs::write(
            &path,
            r#"{"theme": "dark", "sandbox": {"capabilities": {"popups": false}}}"#,
        )
        .unwrap();

        let config = PlaygroundConfig::load(&path).unwrap();
        assert_eq!(config.theme, Theme::Dark);
        assert_eq!(config.run_delay(), Duration::from_millis(300));
        assert_eq!(config.sandbox.timeout_ms, Some(5_000));
        assert!(!config.sandbox.capabilities.popups);
        assert!(config.sandbox.capabilities.scripts);
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = PlaygroundConfig::load(&dir.path().join("nope.json")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn test_malformed_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, r#"{"theme": "sepia"}"#).unwrap();

        let err = PlaygroundConfig::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
        assert!(err.to_string().contains("bad.json"));
    }
}
