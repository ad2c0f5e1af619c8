//! Ollama API client

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use crate::types::{ChatMessage, ChatModel, ChatRequest, ChatResponse, LlmError, NativeToolCall, ToolSchema};

/// Ollama service status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OllamaStatus {
    /// Service is running and ready
    Running,
    /// Service is stopped or unreachable
    Stopped,
}

/// Model information from Ollama API
#[derive(Debug, Clone, Deserialize)]
pub struct Model {
    pub name: String,
    pub size: u64,
    #[serde(default)]
    pub modified_at: String,
}

impl Model {
    /// Get human-readable size
    pub fn size_human(&self) -> String {
        let gb = self.size as f64 / (1024.0 * 1024.0 * 1024.0);
        format!("{:.1} GB", gb)
    }
}

#[derive(Debug, Deserialize)]
struct TagsResponse {
    models: Vec<Model>,
}

#[derive(Debug, Serialize)]
struct OllamaChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    stream: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<OllamaTool<'a>>,
}

#[derive(Debug, Serialize)]
struct OllamaTool<'a> {
    #[serde(rename = "type")]
    tool_type: &'static str,
    function: &'a ToolSchema,
}

#[derive(Debug, Deserialize)]
struct OllamaChatResponse {
    message: OllamaReplyMessage,
}

#[derive(Debug, Deserialize)]
struct OllamaReplyMessage {
    #[serde(default)]
    content: String,
    #[serde(default)]
    tool_calls: Vec<OllamaToolCall>,
}

#[derive(Debug, Deserialize)]
struct OllamaToolCall {
    function: NativeToolCall,
}

/// Ollama API client
#[derive(Debug, Clone)]
pub struct OllamaClient {
    base_url: String,
    client: reqwest::Client,
}

impl OllamaClient {
    /// Create a new client with the given request timeout
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, LlmError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Check if Ollama is running
    pub async fn health_check(&self) -> bool {
        let url = format!("{}/api/tags", self.base_url);

        match self
            .client
            .get(&url)
            .timeout(Duration::from_secs(5))
            .send()
            .await
        {
            Ok(resp) => resp.status().is_success(),
            Err(_) => false,
        }
    }

    /// Get current status
    pub async fn status(&self) -> OllamaStatus {
        if self.health_check().await {
            OllamaStatus::Running
        } else {
            OllamaStatus::Stopped
        }
    }

    /// List all available models
    pub async fn list_models(&self) -> Result<Vec<Model>, LlmError> {
        let url = format!("{}/api/tags", self.base_url);

        let resp: TagsResponse = self
            .client
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        Ok(resp.models)
    }
}

#[async_trait]
impl ChatModel for OllamaClient {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse, LlmError> {
        let url = format!("{}/api/chat", self.base_url);

        let body = OllamaChatRequest {
            model: &request.model,
            messages: request.messages(),
            stream: false,
            tools: request
                .tools
                .iter()
                .map(|function| OllamaTool {
                    tool_type: "function",
                    function,
                })
                .collect(),
        };

        debug!(model = %request.model, messages = body.messages.len(), "Sending Ollama chat request");

        let response = self.client.post(&url).json(&body).send().await?;
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_else(|_| "(no body)".into());
            return Err(LlmError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let reply: OllamaChatResponse = response
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(format!("failed to parse chat response: {e}")))?;

        Ok(ChatResponse {
            content: reply.message.content,
            tool_calls: reply.message.tool_calls.into_iter().map(|c| c.function).collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_client_trims_base_url() {
        let client = OllamaClient::new("http://localhost:11434/", Duration::from_secs(1)).unwrap();
        assert_eq!(client.base_url(), "http://localhost:11434");
    }

    #[test]
    fn test_request_serializes_tools() {
        let schema = ToolSchema {
            name: "bash".into(),
            description: "run bash".into(),
            parameters: json!({"type": "object"}),
        };
        let body = OllamaChatRequest {
            model: "llama3.2",
            messages: vec![ChatMessage::user("hi")],
            stream: false,
            tools: vec![OllamaTool {
                tool_type: "function",
                function: &schema,
            }],
        };

        let value = serde_json::to_value(&body).unwrap();
        assert_eq!(value["stream"], false);
        assert_eq!(value["tools"][0]["type"], "function");
        assert_eq!(value["tools"][0]["function"]["name"], "bash");
    }

    #[test]
    fn test_response_parses_tool_calls() {
        let raw = r#"{
            "model": "llama3.2",
            "message": {
                "role": "assistant",
                "content": "",
                "tool_calls": [{"function": {"name": "python", "arguments": {"code": "print(1)"}}}]
            },
            "done": true
        }"#;

        let reply: OllamaChatResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(reply.message.tool_calls.len(), 1);
        assert_eq!(reply.message.tool_calls[0].function.name, "python");
    }

    #[test]
    fn test_model_size_human() {
        let model = Model {
            name: "x".into(),
            size: 4 * 1024 * 1024 * 1024,
            modified_at: String::new(),
        };
        assert_eq!(model.size_human(), "4.0 GB");
    }
}
