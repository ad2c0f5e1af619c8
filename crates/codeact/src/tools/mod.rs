//! Tool framework for code-acting execution
//!
//! The model acts by emitting snippets; each snippet becomes a [`ToolCall`]
//! which a registered [`Tool`] turns into a [`ToolResult`].

pub mod builtin;
pub mod executor;
pub mod parser;
pub mod registry;
pub mod router;
pub mod security;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use crate::sandbox::{SandboxPolicy, SecurityMode};
use executor::CodeExecutor;

/// What a tool call asks for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolKind {
    UserInput,
    Bash,
    JavaScript,
    Python,
}

impl ToolKind {
    /// Map a language tag to a kind; `js` and friends are normalized
    pub fn from_language(tag: &str) -> Option<Self> {
        match tag.trim().to_lowercase().as_str() {
            "bash" | "sh" | "shell" => Some(Self::Bash),
            "javascript" | "js" | "node" => Some(Self::JavaScript),
            "python" | "py" | "python3" => Some(Self::Python),
            _ => None,
        }
    }

    pub fn is_code(&self) -> bool {
        !matches!(self, Self::UserInput)
    }

    /// Registered tool name
    pub fn tool_name(&self) -> &'static str {
        match self {
            Self::UserInput => "request_user_input",
            Self::Bash => "bash",
            Self::JavaScript => "javascript",
            Self::Python => "python",
        }
    }
}

impl std::fmt::Display for ToolKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.tool_name())
    }
}

/// A parsed request to run code or ask the human
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub kind: ToolKind,
    /// Code, or the prompt for `UserInput`
    pub payload: String,
    pub issued_at: DateTime<Utc>,
}

impl ToolCall {
    pub fn new(kind: ToolKind, payload: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            kind,
            payload: payload.into(),
            issued_at: Utc::now(),
        }
    }
}

/// Why a tool call did not succeed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Process exited non-zero
    Execution,
    /// Killed after the wall-clock limit
    Timeout,
    /// The user refused to run it
    Denied,
    /// Could not be started at all
    Internal,
}

/// Result of tool execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    pub tool_call_id: String,
    pub kind: ToolKind,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureKind>,
    /// stdout lines, and stderr lines prefixed with `[stderr] `, in arrival order
    #[serde(default)]
    pub logs: Vec<String>,
    pub execution_time_ms: u64,
}

impl ToolResult {
    /// Create a successful result
    pub fn success(call: &ToolCall, output: impl Into<String>) -> Self {
        Self {
            tool_call_id: call.id.clone(),
            kind: call.kind,
            success: true,
            output: Some(output.into()),
            error: None,
            failure: None,
            logs: Vec::new(),
            execution_time_ms: 0,
        }
    }

    /// Create a failed result
    pub fn failure(call: &ToolCall, failure: FailureKind, error: impl Into<String>) -> Self {
        Self {
            tool_call_id: call.id.clone(),
            kind: call.kind,
            success: false,
            output: None,
            error: Some(error.into()),
            failure: Some(failure),
            logs: Vec::new(),
            execution_time_ms: 0,
        }
    }

    /// Echo a user-input prompt back without running anything
    pub fn user_input(call: &ToolCall) -> Self {
        Self::success(call, call.payload.clone())
    }

    pub fn with_logs(mut self, logs: Vec<String>) -> Self {
        self.logs = logs;
        self
    }

    pub fn with_output(mut self, output: impl Into<String>) -> Self {
        self.output = Some(output.into());
        self
    }

    pub fn with_elapsed(mut self, elapsed_ms: u64) -> Self {
        self.execution_time_ms = elapsed_ms;
        self
    }

    pub fn is_timeout(&self) -> bool {
        self.failure == Some(FailureKind::Timeout)
    }

    /// Output plus logs, for substring checks
    pub fn combined_text(&self) -> String {
        let mut text = self.output.clone().unwrap_or_default();
        for line in &self.logs {
            text.push('\n');
            text.push_str(line);
        }
        text
    }
}

/// Context provided to tools during execution
#[derive(Debug, Clone)]
pub struct ToolContext {
    pub working_dir: PathBuf,
    pub mode: SecurityMode,
    pub policy: Arc<SandboxPolicy>,
    pub executor: Arc<CodeExecutor>,
}

/// Schema for a tool parameter
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParameterProperty {
    /// Parameter type (string, number, boolean, array, object)
    #[serde(rename = "type")]
    pub param_type: String,
    pub description: String,
    /// Enum values if applicable
    #[serde(rename = "enum", skip_serializing_if = "Option::is_none")]
    pub enum_values: Option<Vec<String>>,
}

impl ParameterProperty {
    pub fn string(description: impl Into<String>) -> Self {
        Self {
            param_type: "string".to_string(),
            description: description.into(),
            enum_values: None,
        }
    }

    pub fn with_enum(mut self, values: Vec<String>) -> Self {
        self.enum_values = Some(values);
        self
    }
}

/// Schema describing tool parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParameterSchema {
    /// Type is always "object"
    #[serde(rename = "type")]
    pub schema_type: String,
    pub properties: HashMap<String, ParameterProperty>,
    #[serde(default)]
    pub required: Vec<String>,
}

impl ParameterSchema {
    pub fn new() -> Self {
        Self {
            schema_type: "object".to_string(),
            properties: HashMap::new(),
            required: Vec::new(),
        }
    }

    pub fn with_property(mut self, name: impl Into<String>, prop: ParameterProperty) -> Self {
        self.properties.insert(name.into(), prop);
        self
    }

    pub fn with_required(mut self, name: impl Into<String>, prop: ParameterProperty) -> Self {
        let name = name.into();
        self.properties.insert(name.clone(), prop);
        self.required.push(name);
        self
    }
}

impl Default for ParameterSchema {
    fn default() -> Self {
        Self::new()
    }
}

/// A tool registered up front with the agent
#[async_trait]
pub trait Tool: Send + Sync {
    /// Get the tool name
    fn name(&self) -> &str;

    /// Get a description of what the tool does
    fn description(&self) -> &str;

    /// The call kind this tool serves
    fn kind(&self) -> ToolKind;

    /// Get the parameter schema
    fn parameters_schema(&self) -> ParameterSchema;

    /// Whether Inquire mode asks before running it
    fn needs_confirmation(&self) -> bool {
        self.kind().is_code()
    }

    /// Build a call from native function-call arguments
    fn call_from_args(&self, args: &Value) -> Option<ToolCall>;

    /// Execute the call
    async fn execute(&self, call: &ToolCall, ctx: &ToolContext) -> ToolResult;

    /// Convert to a schema for the LLM
    fn to_schema(&self) -> llm_core::ToolSchema {
        llm_core::ToolSchema {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: serde_json::to_value(self.parameters_schema()).unwrap_or(Value::Null),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_from_language() {
        assert_eq!(ToolKind::from_language("js"), Some(ToolKind::JavaScript));
        assert_eq!(ToolKind::from_language("Python"), Some(ToolKind::Python));
        assert_eq!(ToolKind::from_language("bash"), Some(ToolKind::Bash));
        assert_eq!(ToolKind::from_language("ruby"), None);
    }

    #[test]
    fn test_tool_call_ids_are_unique() {
        let a = ToolCall::new(ToolKind::Bash, "ls");
        let b = ToolCall::new(ToolKind::Bash, "ls");
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_user_input_result_echoes_prompt() {
        let call = ToolCall::new(ToolKind::UserInput, "Which file?");
        let result = ToolResult::user_input(&call);
        assert!(result.success);
        assert_eq!(result.output.as_deref(), Some("Which file?"));
        assert_eq!(result.tool_call_id, call.id);
    }

    #[test]
    fn test_combined_text_includes_logs() {
        let call = ToolCall::new(ToolKind::Bash, "ls");
        let result = ToolResult::success(&call, "a").with_logs(vec!["[stderr] b".into()]);
        assert_eq!(result.combined_text(), "a\n[stderr] b");
    }

    #[test]
    fn test_schema_serializes_enum_key() {
        let schema = ParameterSchema::new()
            .with_required("language", ParameterProperty::string("lang").with_enum(vec!["bash".into()]));
        let value = serde_json::to_value(schema).unwrap();
        assert_eq!(value["properties"]["language"]["enum"][0], "bash");
        assert_eq!(value["required"][0], "language");
    }
}
