//! User configuration for the codeact CLI
//!
//! Configuration file: ~/.config/codeact/config.toml (or platform equivalent)

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::agent::AgentConfig;
use crate::sandbox::{PolicyOverrides, SecurityMode};

/// User configuration for the codeact CLI
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct UserConfig {
    #[serde(default)]
    pub agent: AgentSection,

    #[serde(default)]
    pub sandbox: SandboxSection,

    #[serde(default)]
    pub repl: ReplConfig,
}

/// Turn loop settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentSection {
    /// Model name (falls back to llm.toml)
    pub model: Option<String>,
    pub system_prompt: Option<String>,
    pub max_turns: usize,
    pub command_timeout_secs: u64,
    pub llm_timeout_secs: u64,
    pub max_output_len: usize,
    pub native_tools: bool,
}

/// Sandbox settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SandboxSection {
    pub mode: SecurityMode,
    /// `auto`, `bubblewrap`, `firejail` or `unconfined`
    pub enforcer: String,
    #[serde(flatten)]
    pub overrides: PolicyOverrides,
}

/// REPL-specific configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplConfig {
    /// Maximum history entries to keep
    #[serde(default = "default_history_size")]
    pub history_size: usize,
}

fn default_history_size() -> usize {
    1000
}

impl Default for AgentSection {
    fn default() -> Self {
        let defaults = AgentConfig::default();
        Self {
            model: None,
            system_prompt: None,
            max_turns: defaults.max_turns,
            command_timeout_secs: defaults.command_timeout_secs,
            llm_timeout_secs: defaults.llm_timeout_secs,
            max_output_len: defaults.max_output_len,
            native_tools: defaults.native_tools,
        }
    }
}

impl Default for SandboxSection {
    fn default() -> Self {
        Self {
            mode: SecurityMode::default(),
            enforcer: "auto".to_string(),
            overrides: PolicyOverrides::default(),
        }
    }
}

impl Default for ReplConfig {
    fn default() -> Self {
        Self {
            history_size: default_history_size(),
        }
    }
}

impl UserConfig {
    /// Load user configuration from default location
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;

        if !path.exists() {
            return Ok(Self::default());
        }

        Self::load_from(&path)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {}", path.display()))?;

        toml::from_str(&content).with_context(|| format!("Failed to parse config from {}", path.display()))
    }

    /// Get the configuration file path
    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir().ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;

        Ok(config_dir.join("codeact").join("config.toml"))
    }

    /// REPL line history file, next to the config file
    pub fn history_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("codeact").join("history.txt"))
    }

    /// Agent settings for `model`, before CLI overrides
    pub fn agent_config(&self, model: impl Into<String>) -> AgentConfig {
        let mut config = AgentConfig::new(model)
            .with_max_turns(self.agent.max_turns)
            .with_command_timeout(self.agent.command_timeout_secs)
            .with_llm_timeout(self.agent.llm_timeout_secs)
            .with_max_output_len(self.agent.max_output_len)
            .with_native_tools(self.agent.native_tools);
        if let Some(prompt) = &self.agent.system_prompt {
            config = config.with_system_prompt(prompt.clone());
        }
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = UserConfig::default();
        assert_eq!(config.repl.history_size, 1000);
        assert_eq!(config.sandbox.mode, SecurityMode::Moderate);
        assert_eq!(config.sandbox.enforcer, "auto");
        assert_eq!(config.agent.max_turns, AgentConfig::default().max_turns);
    }

    #[test]
    fn test_parse_config() {
        let toml = r#"
[agent]
model = "qwen2.5-coder:7b"
max_turns = 4

[sandbox]
mode = "strict"
enforcer = "firejail"
allowed_domains = ["pypi.org"]
extra_deny_read = ["~/.secrets"]
allow_local_binding = true

[repl]
history_size = 50
"#;

        let config: UserConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.agent.model.as_deref(), Some("qwen2.5-coder:7b"));
        assert_eq!(config.agent.max_turns, 4);
        assert_eq!(config.agent.llm_timeout_secs, AgentConfig::default().llm_timeout_secs);
        assert_eq!(config.sandbox.mode, SecurityMode::Strict);
        assert_eq!(config.sandbox.enforcer, "firejail");
        assert_eq!(config.sandbox.overrides.allowed_domains, vec!["pypi.org".to_string()]);
        assert!(config.sandbox.overrides.allow_local_binding);
        assert_eq!(config.repl.history_size, 50);
    }

    #[test]
    fn test_unknown_mode_rejected() {
        let result: Result<UserConfig, _> = toml::from_str("[sandbox]\nmode = \"paranoid\"\n");
        assert!(result.is_err());
    }

    #[test]
    fn test_load_from_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[agent]\nsystem_prompt = \"be brief\"\ncommand_timeout_secs = 5\n").unwrap();

        let config = UserConfig::load_from(&path).unwrap();
        let agent = config.agent_config("llama3.2");
        assert_eq!(agent.system_prompt.as_deref(), Some("be brief"));
        assert_eq!(agent.command_timeout_secs, 5);
        assert_eq!(agent.model, "llama3.2");
    }

    #[test]
    fn test_load_from_bad_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[agent\n").unwrap();

        let err = UserConfig::load_from(&path).unwrap_err();
        assert!(err.to_string().contains("Failed to parse config"));
    }
}
