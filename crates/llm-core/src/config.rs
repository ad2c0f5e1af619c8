//! Configuration management for llm.toml

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::ollama::OllamaClient;
use crate::openai::{OpenAiClient, DEFAULT_OPENAI_URL};
use crate::types::{ChatModel, LlmError};

/// Environment override for the model name
pub const MODEL_ENV: &str = "CODEACT_MODEL";
/// Environment override for the endpoint
pub const BASE_URL_ENV: &str = "CODEACT_BASE_URL";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub llm: LlmConfig,
}

/// Which backend speaks to the model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Ollama,
    #[serde(alias = "openai-compatible")]
    OpenAi,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LlmConfig {
    #[serde(default = "default_provider")]
    pub provider: Provider,
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Full endpoint; overrides host/port when set
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default = "default_model")]
    pub model: String,
    /// Variable holding the API key for the openai provider
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_provider() -> Provider {
    Provider::Ollama
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    11434
}

fn default_model() -> String {
    "llama3.2".to_string()
}

fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

fn default_request_timeout() -> u64 {
    300
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            host: default_host(),
            port: default_port(),
            base_url: None,
            model: default_model(),
            api_key_env: default_api_key_env(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

impl Config {
    /// Load configuration from llm.toml
    pub fn load() -> Result<Self> {
        Self::load_from(Self::find_config_path()?)
    }

    /// Try to load configuration, returning None if not found
    pub fn try_load() -> Option<Self> {
        Self::load().ok()
    }

    /// Create a minimal default configuration for when llm.toml is missing
    pub fn default_minimal() -> Self {
        Self {
            llm: LlmConfig::default(),
        }
    }

    /// Load configuration from a specific path
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read {}", path.as_ref().display()))?;

        toml::from_str(&content)
            .with_context(|| format!("Failed to parse {}", path.as_ref().display()))
    }

    /// Find llm.toml by searching current directory and parents
    pub fn find_config_path() -> Result<PathBuf> {
        let mut current = std::env::current_dir()?;

        for _ in 0..10 {
            let candidate = current.join("llm.toml");
            if candidate.exists() {
                return Ok(candidate);
            }
            if !current.pop() {
                break;
            }
        }

        anyhow::bail!("llm.toml not found in current directory or parents")
    }

    /// Apply `CODEACT_MODEL` / `CODEACT_BASE_URL` overrides
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(model) = std::env::var(MODEL_ENV) {
            if !model.trim().is_empty() {
                self.llm.model = model;
            }
        }
        if let Ok(url) = std::env::var(BASE_URL_ENV) {
            if !url.trim().is_empty() {
                self.llm.base_url = Some(url);
            }
        }
        self
    }

    /// Endpoint for the configured provider
    pub fn base_url(&self) -> String {
        if let Some(ref url) = self.llm.base_url {
            return url.clone();
        }
        match self.llm.provider {
            Provider::Ollama => format!("http://{}:{}", self.llm.host, self.llm.port),
            Provider::OpenAi => DEFAULT_OPENAI_URL.to_string(),
        }
    }

    /// Build the configured chat backend
    ///
    /// Fails when the openai provider has no key in its environment variable.
    pub fn connect(&self) -> Result<Arc<dyn ChatModel>, LlmError> {
        let timeout = Duration::from_secs(self.llm.request_timeout_secs);
        match self.llm.provider {
            Provider::Ollama => Ok(Arc::new(OllamaClient::new(self.base_url(), timeout)?)),
            Provider::OpenAi => Ok(Arc::new(OpenAiClient::from_env(
                self.base_url(),
                &self.llm.api_key_env,
                timeout,
            )?)),
        }
    }
}
