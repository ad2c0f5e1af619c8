//! OpenAI-compatible chat completions client

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

use crate::types::{ChatMessage, ChatModel, ChatRequest, ChatResponse, LlmError, NativeToolCall, ToolSchema};

pub const DEFAULT_OPENAI_URL: &str = "https://api.openai.com/v1";

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<FunctionTool<'a>>,
}

#[derive(Debug, Serialize)]
struct FunctionTool<'a> {
    #[serde(rename = "type")]
    tool_type: &'static str,
    function: &'a ToolSchema,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ReplyMessage,
}

#[derive(Debug, Deserialize)]
struct ReplyMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<ReplyToolCall>,
}

#[derive(Debug, Deserialize)]
struct ReplyToolCall {
    function: ReplyFunction,
}

/// Arguments arrive as a JSON-encoded string
#[derive(Debug, Deserialize)]
struct ReplyFunction {
    name: String,
    #[serde(default)]
    arguments: String,
}

/// Client for any server speaking the `/chat/completions` protocol
#[derive(Debug, Clone)]
pub struct OpenAiClient {
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl OpenAiClient {
    /// Create a client, failing when the key is empty
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>, timeout: Duration) -> Result<Self, LlmError> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(LlmError::MissingApiKey("an API key".into()));
        }

        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            client,
        })
    }

    /// Create a client reading the key from `key_env`
    pub fn from_env(base_url: impl Into<String>, key_env: &str, timeout: Duration) -> Result<Self, LlmError> {
        let key = std::env::var(key_env).map_err(|_| LlmError::MissingApiKey(key_env.to_string()))?;
        Self::new(base_url, key, timeout).map_err(|e| match e {
            LlmError::MissingApiKey(_) => LlmError::MissingApiKey(key_env.to_string()),
            other => other,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl ChatModel for OpenAiClient {
    fn name(&self) -> &str {
        "openai"
    }

    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse, LlmError> {
        let url = format!("{}/chat/completions", self.base_url);

        let body = CompletionRequest {
            model: &request.model,
            messages: request.messages(),
            tools: request
                .tools
                .iter()
                .map(|function| FunctionTool {
                    tool_type: "function",
                    function,
                })
                .collect(),
        };

        debug!(model = %request.model, messages = body.messages.len(), "Sending chat completion request");

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_else(|_| "(no body)".into());
            return Err(LlmError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let reply: CompletionResponse = response
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(format!("failed to parse completion: {e}")))?;

        let message = reply
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| LlmError::InvalidResponse("response has no choices".into()))?
            .message;

        Ok(ChatResponse {
            content: message.content.unwrap_or_default(),
            tool_calls: message.tool_calls.into_iter().filter_map(decode_tool_call).collect(),
        })
    }
}

fn decode_tool_call(call: ReplyToolCall) -> Option<NativeToolCall> {
    let arguments = if call.function.arguments.trim().is_empty() {
        Value::Object(Default::default())
    } else {
        match serde_json::from_str(&call.function.arguments) {
            Ok(v) => v,
            Err(e) => {
                warn!(tool = %call.function.name, error = %e, "Dropping tool call with malformed arguments");
                return None;
            }
        }
    };

    Some(NativeToolCall {
        name: call.function.name,
        arguments,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_key_rejected() {
        let err = OpenAiClient::new(DEFAULT_OPENAI_URL, "  ", Duration::from_secs(1)).unwrap_err();
        assert!(matches!(err, LlmError::MissingApiKey(_)));
    }

    #[test]
    fn test_missing_env_key_names_variable() {
        let err = OpenAiClient::from_env(DEFAULT_OPENAI_URL, "CODEACT_TEST_KEY_THAT_IS_NOT_SET", Duration::from_secs(1))
            .unwrap_err();
        assert!(err.to_string().contains("CODEACT_TEST_KEY_THAT_IS_NOT_SET"));
    }

    #[test]
    fn test_decode_tool_call_arguments() {
        let raw = r#"{"choices": [{"message": {"content": null, "tool_calls": [
            {"id": "c1", "type": "function", "function": {"name": "bash", "arguments": "{\"code\": \"ls\"}"}},
            {"id": "c2", "type": "function", "function": {"name": "bash", "arguments": "{not json"}}
        ]}}]}"#;

        let reply: CompletionResponse = serde_json::from_str(raw).unwrap();
        let message = reply.choices.into_iter().next().unwrap().message;
        let calls: Vec<_> = message.tool_calls.into_iter().filter_map(decode_tool_call).collect();

        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].arguments["code"], "ls");
    }
}
