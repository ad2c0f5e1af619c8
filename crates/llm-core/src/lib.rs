//! llm-core: language model access for the codeact agent
//!
//! Provides:
//! - Configuration loading (llm.toml)
//! - The `ChatModel` trait and shared chat types
//! - Ollama and OpenAI-compatible clients

pub mod config;
pub mod ollama;
pub mod openai;
pub mod types;

pub use config::{Config, LlmConfig, Provider};
pub use ollama::{Model, OllamaClient, OllamaStatus};
pub use openai::OpenAiClient;
pub use types::{ChatMessage, ChatModel, ChatRequest, ChatResponse, LlmError, NativeToolCall, Role, ToolSchema};
