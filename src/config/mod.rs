//! Runtime configuration.
//!
//! Loads `deskpilot.yaml` from the working directory or the user config
//! directory, then applies `DESKPILOT_*` environment overrides. Every
//! field has a default, so a missing file still yields a usable config.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use dirs::config_dir;
use serde::{Deserialize, Serialize};

use deskpilot_core::agent::AgentConfig;
use deskpilot_core::desktop::DesktopConfig;
use deskpilot_core::llm::ModelConfig;

/// Default configuration file name
const CONFIG_FILE_NAME: &str = "deskpilot.yaml";

/// Default config directory name
const CONFIG_DIR_NAME: &str = "deskpilot";

/// Main configuration structure
#[derive(Debug, Default, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct Config {
    /// WebSocket listener settings
    pub server: ServerConfig,

    /// Model provider connection
    pub model: ModelConfig,

    /// Desktop backend connection
    pub desktop: DesktopConfig,

    /// Interaction limits and system prompt
    pub agent: AgentConfig,

    /// Log level and optional log file
    pub log: LogConfig,
}

/// Listener settings
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8787,
        }
    }
}

/// Logging settings
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct LogConfig {
    /// One of `error`, `warn`, `info`, `debug`, `trace`.
    pub level: String,
    /// Append log lines to this file when set.
    pub file: Option<PathBuf>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
        }
    }
}

impl Config {
    /// Load configuration, with fallback to defaults.
    ///
    /// An explicit path must exist; the search chain tolerates absence.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let mut config = match explicit {
            Some(path) => Self::load_from_file(path)?,
            None => match find_config_file() {
                Some(path) => Self::load_from_file(&path)?,
                None => Self::default(),
            },
        };
        config.apply_env();
        Ok(config)
    }

    /// Load configuration from a specific file path
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {:?}", path.as_ref()))?;

        let config: Config = serde_yml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path.as_ref()))?;

        Ok(config)
    }

    /// Environment overrides beat file values.
    fn apply_env(&mut self) {
        if let Ok(key) =
            std::env::var("DESKPILOT_API_KEY").or_else(|_| std::env::var("ANTHROPIC_API_KEY"))
        {
            self.model.api_key = Some(key);
        }
        if let Ok(url) = std::env::var("DESKPILOT_MODEL_BASE_URL") {
            self.model.base_url = url;
        }
        if let Ok(model) = std::env::var("DESKPILOT_MODEL") {
            self.model.model = model;
        }
        if let Ok(url) = std::env::var("DESKPILOT_DESKTOP_BASE_URL") {
            self.desktop.base_url = url;
        }
        if let Ok(key) = std::env::var("DESKPILOT_DESKTOP_API_KEY") {
            self.desktop.api_key = Some(key);
        }
        if let Ok(host) = std::env::var("DESKPILOT_HOST") {
            self.server.host = host;
        }
        if let Ok(port) = std::env::var("DESKPILOT_PORT") {
            match port.parse() {
                Ok(port) => self.server.port = port,
                Err(_) => log::warn!("ignoring non-numeric DESKPILOT_PORT: {port}"),
            }
        }
        if let Ok(level) = std::env::var("DESKPILOT_LOG") {
            self.log.level = level;
        }
    }
}

/// Find the configuration file in standard locations
pub fn find_config_file() -> Option<PathBuf> {
    // Check current directory first
    if let Ok(cwd) = std::env::current_dir() {
        let path = cwd.join(CONFIG_FILE_NAME);
        if path.exists() {
            return Some(path);
        }
    }

    // Check config directory
    if let Some(dir) = config_dir() {
        let path = dir.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME);
        if path.exists() {
            return Some(path);
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 8787);
        assert_eq!(config.model.base_url, "https://api.anthropic.com");
        assert_eq!(config.agent.max_turns, 30);
        assert_eq!(config.log.level, "info");
        assert!(config.log.file.is_none());
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let yaml = "\
server:
  port: 9000
model:
  model: claude-opus-4-20250514
  api_key: sk-test
";
        let config: Config = serde_yml::from_str(yaml).unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.model.model, "claude-opus-4-20250514");
        assert_eq!(config.model.api_key.as_deref(), Some("sk-test"));
        assert_eq!(config.desktop.base_url, "http://localhost:8333");
        assert_eq!(config.agent.max_duration_secs, 300);
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("deskpilot.yaml");
        fs::write(&path, "agent:\n  max_turns: 5\n").unwrap();

        let config = Config::load_from_file(&path).unwrap();
        assert_eq!(config.agent.max_turns, 5);

        let missing = Config::load_from_file(dir.path().join("absent.yaml"));
        assert!(missing.is_err());
    }

    #[test]
    fn test_env_overrides() {
        std::env::set_var("DESKPILOT_API_KEY", "sk-env");
        std::env::set_var("DESKPILOT_PORT", "9999");
        std::env::set_var("DESKPILOT_LOG", "debug");

        let mut config = Config::default();
        config.apply_env();

        assert_eq!(config.model.api_key.as_deref(), Some("sk-env"));
        assert_eq!(config.server.port, 9999);
        assert_eq!(config.log.level, "debug");

        // A value that does not parse leaves the field alone.
        std::env::set_var("DESKPILOT_PORT", "not-a-port");
        let mut config = Config::default();
        config.apply_env();
        assert_eq!(config.server.port, 8787);

        std::env::remove_var("DESKPILOT_API_KEY");
        std::env::remove_var("DESKPILOT_PORT");
        std::env::remove_var("DESKPILOT_LOG");
    }
}
