//! Snippet execution tools

use async_trait::async_trait;
use serde_json::Value;

use crate::tools::{ParameterProperty, ParameterSchema, Tool, ToolCall, ToolContext, ToolKind, ToolResult};

/// Runs a bash, JavaScript or Python snippet through the session's executor
#[derive(Debug, Clone, Copy)]
pub struct CodeTool {
    kind: ToolKind,
}

impl CodeTool {
    pub fn new(kind: ToolKind) -> Self {
        Self { kind }
    }
}

#[async_trait]
impl Tool for CodeTool {
    fn name(&self) -> &str {
        self.kind.tool_name()
    }

    fn description(&self) -> &str {
        match self.kind {
            ToolKind::JavaScript => "Run a JavaScript snippet with node and return what it prints.",
            ToolKind::Python => "Run a Python 3 snippet and return what it prints.",
            _ => "Execute a bash command in the working directory and return the output.",
        }
    }

    fn kind(&self) -> ToolKind {
        self.kind
    }

    fn parameters_schema(&self) -> ParameterSchema {
        let description = match self.kind {
            ToolKind::JavaScript => "The JavaScript source to run",
            ToolKind::Python => "The Python source to run",
            _ => "The bash command to execute",
        };
        ParameterSchema::new().with_required("code", ParameterProperty::string(description))
    }

    fn call_from_args(&self, args: &Value) -> Option<ToolCall> {
        let code = args
            .get("code")
            .or_else(|| args.get("command"))
            .and_then(|v| v.as_str())?
            .trim();
        (!code.is_empty()).then(|| ToolCall::new(self.kind, code))
    }

    async fn execute(&self, call: &ToolCall, ctx: &ToolContext) -> ToolResult {
        ctx.executor.execute(call, &ctx.policy, &ctx.working_dir).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sandbox::{SandboxPolicy, SecurityMode, UnconfinedEnforcer};
    use crate::tools::executor::CodeExecutor;
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;
    use tempfile::TempDir;

    fn context(dir: &TempDir) -> ToolContext {
        ToolContext {
            working_dir: dir.path().to_path_buf(),
            mode: SecurityMode::Moderate,
            policy: Arc::new(SandboxPolicy::default()),
            executor: Arc::new(CodeExecutor::new(Arc::new(UnconfinedEnforcer::new()), Duration::from_secs(10))),
        }
    }

    #[test]
    fn test_call_from_args() {
        let tool = CodeTool::new(ToolKind::Python);
        let call = tool.call_from_args(&json!({"code": "  print(1)\n"})).unwrap();
        assert_eq!(call.kind, ToolKind::Python);
        assert_eq!(call.payload, "print(1)");

        let bash = CodeTool::new(ToolKind::Bash);
        assert_eq!(bash.call_from_args(&json!({"command": "ls"})).unwrap().payload, "ls");
        assert!(bash.call_from_args(&json!({"code": "   "})).is_none());
        assert!(bash.call_from_args(&json!({"code": 5})).is_none());
    }

    #[test]
    fn test_schema_requires_code() {
        let schema = CodeTool::new(ToolKind::JavaScript).to_schema();
        assert_eq!(schema.name, "javascript");
        assert_eq!(schema.parameters["required"][0], "code");
    }

    #[tokio::test]
    async fn test_bash_tool_executes() {
        let dir = TempDir::new().unwrap();
        let ctx = context(&dir);
        let call = ToolCall::new(ToolKind::Bash, "echo 'hello world'");

        let result = CodeTool::new(ToolKind::Bash).execute(&call, &ctx).await;
        assert!(result.success);
        assert_eq!(result.output.as_deref(), Some("hello world"));
        assert_eq!(result.tool_call_id, call.id);
    }
}
