//! Asking the human for information

use async_trait::async_trait;
use serde_json::Value;

use crate::tools::{ParameterProperty, ParameterSchema, Tool, ToolCall, ToolContext, ToolKind, ToolResult};

/// Surfaces a question to the user; the loop halts until it is answered
#[derive(Debug, Default, Clone, Copy)]
pub struct UserInputTool;

#[async_trait]
impl Tool for UserInputTool {
    fn name(&self) -> &str {
        ToolKind::UserInput.tool_name()
    }

    fn description(&self) -> &str {
        "Ask the user a question when information is missing. Work stops until they answer."
    }

    fn kind(&self) -> ToolKind {
        ToolKind::UserInput
    }

    fn parameters_schema(&self) -> ParameterSchema {
        ParameterSchema::new().with_required("prompt", ParameterProperty::string("The question to ask"))
    }

    fn call_from_args(&self, args: &Value) -> Option<ToolCall> {
        let prompt = args
            .get("prompt")
            .or_else(|| args.get("question"))
            .and_then(|v| v.as_str())?
            .trim();
        (!prompt.is_empty()).then(|| ToolCall::new(ToolKind::UserInput, prompt))
    }

    async fn execute(&self, call: &ToolCall, _ctx: &ToolContext) -> ToolResult {
        ToolResult::user_input(call)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_call_from_args() {
        let call = UserInputTool.call_from_args(&json!({"prompt": " Which file? "})).unwrap();
        assert_eq!(call.kind, ToolKind::UserInput);
        assert_eq!(call.payload, "Which file?");
        assert!(UserInputTool.call_from_args(&json!({})).is_none());
    }

    #[test]
    fn test_does_not_need_confirmation() {
        assert!(!UserInputTool.needs_confirmation());
    }
}
