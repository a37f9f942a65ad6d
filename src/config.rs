use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

pub const DEFAULT_API_BASE: &str = "http://127.0.0.1:5001/api";

/// Settings read from `config.toml`. Command-line flags and `TMUXDASH_*`
/// environment variables override these.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Base URL of the dashboard backend, including the `/api` prefix.
    #[serde(default = "default_api_base")]
    pub api_base: String,
    /// Period of the scheduled snapshot poll.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Per-request timeout; a timed-out request is reported as a network error.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    /// Default user for the startup password login when `--user` is absent.
    #[serde(default)]
    pub user: Option<String>,
}

fn default_api_base() -> String {
    DEFAULT_API_BASE.to_string()
}

fn default_poll_interval_ms() -> u64 {
    3000
}

fn default_request_timeout_ms() -> u64 {
    10_000
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base: default_api_base(),
            poll_interval_ms: default_poll_interval_ms(),
            request_timeout_ms: default_request_timeout_ms(),
            user: None,
        }
    }
}

impl Config {
    /// `~/.config/tmuxdash/config.toml` (platform equivalent elsewhere).
    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Could not determine config directory")?
            .join("tmuxdash");
        Ok(config_dir.join("config.toml"))
    }

    /// Load from `path`, or from [`Config::config_path`] when `None`.
    /// A missing file yields the defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => Self::config_path()?,
        };
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config from {}", path.display()))?;
        let config: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config from {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        anyhow::ensure!(self.poll_interval_ms > 0, "poll_interval_ms must be positive");
        anyhow::ensure!(
            self.request_timeout_ms > 0,
            "request_timeout_ms must be positive"
        );
        Ok(())
    }

    /// Both durations are non-zero once `load` has validated them.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load(Some(dir.path().join("absent.toml").as_path())).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.poll_interval(), Duration::from_secs(3));
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "api_base = \"http://dash:8080/api\"\nuser = \"ops\"\n").unwrap();
        let config = Config::load(Some(path.as_path())).unwrap();
        assert_eq!(config.api_base, "http://dash:8080/api");
        assert_eq!(config.user.as_deref(), Some("ops"));
        assert_eq!(config.poll_interval_ms, 3000);
        assert_eq!(config.request_timeout(), Duration::from_secs(10));
    }

    #[test]
    fn test_invalid_file_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "poll_interval_ms = \"soon\"").unwrap();
        let err = Config::load(Some(path.as_path())).unwrap_err();
        assert!(format!("{err}").contains("Failed to parse config"));

        fs::write(&path, "poll_interval_ms = 0").unwrap();
        assert!(Config::load(Some(path.as_path())).is_err());
    }
}
