//! Tool registry for managing available tools

use std::collections::HashMap;
use std::sync::Arc;

use llm_core::{NativeToolCall, ToolSchema};
use tracing::debug;

use super::{Tool, ToolCall, ToolKind};

/// Registry of available tools
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    /// Register a tool, replacing any tool with the same name
    pub fn register<T: Tool + 'static>(&mut self, tool: T) {
        let name = tool.name().to_string();
        self.tools.insert(name, Arc::new(tool));
    }

    /// Get a tool by name
    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    /// Get the tool serving a call kind
    pub fn get_by_kind(&self, kind: ToolKind) -> Option<Arc<dyn Tool>> {
        self.tools.values().find(|t| t.kind() == kind).cloned()
    }

    /// Registered tool names, sorted
    pub fn list_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tools.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }

    /// Schemas for the LLM API, sorted by name
    pub fn schemas(&self) -> Vec<ToolSchema> {
        let mut schemas: Vec<ToolSchema> = self.tools.values().map(|t| t.to_schema()).collect();
        schemas.sort_by(|a, b| a.name.cmp(&b.name));
        schemas
    }

    /// Convert a structured call returned by the model.
    ///
    /// Unknown tools and unusable arguments yield `None`, mirroring how the
    /// text parser drops malformed fragments.
    pub fn call_from_native(&self, native: &NativeToolCall) -> Option<ToolCall> {
        let Some(tool) = self.get(&native.name) else {
            debug!(tool = %native.name, "Model called an unknown tool");
            return None;
        };

        let call = tool.call_from_args(&native.arguments);
        if call.is_none() {
            debug!(tool = %native.name, "Dropping native tool call with unusable arguments");
        }
        call
    }

    /// Number of registered tools
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.list_names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::{ParameterProperty, ParameterSchema, ToolContext, ToolResult};
    use async_trait::async_trait;
    use serde_json::{json, Value};

    struct MockTool;

    #[async_trait]
    impl Tool for MockTool {
        fn name(&self) -> &str {
            "mock"
        }

        fn description(&self) -> &str {
            "A mock tool for testing"
        }

        fn kind(&self) -> ToolKind {
            ToolKind::Bash
        }

        fn parameters_schema(&self) -> ParameterSchema {
            ParameterSchema::new().with_required("code", ParameterProperty::string("code"))
        }

        fn call_from_args(&self, args: &Value) -> Option<ToolCall> {
            let code = args.get("code")?.as_str()?;
            Some(ToolCall::new(ToolKind::Bash, code))
        }

        async fn execute(&self, call: &ToolCall, _ctx: &ToolContext) -> ToolResult {
            ToolResult::success(call, "mock output")
        }
    }

    #[test]
    fn test_registry_register_and_get() {
        let mut registry = ToolRegistry::new();
        registry.register(MockTool);

        assert_eq!(registry.len(), 1);
        assert!(registry.get("mock").is_some());
        assert!(registry.get("nonexistent").is_none());
        assert!(registry.get_by_kind(ToolKind::Bash).is_some());
        assert!(registry.get_by_kind(ToolKind::Python).is_none());
    }

    #[test]
    fn test_registry_schemas() {
        let mut registry = ToolRegistry::new();
        registry.register(MockTool);

        let schemas = registry.schemas();
        assert_eq!(schemas.len(), 1);
        assert_eq!(schemas[0].name, "mock");
        assert_eq!(schemas[0].parameters["required"][0], "code");
    }

    #[test]
    fn test_call_from_native() {
        let mut registry = ToolRegistry::new();
        registry.register(MockTool);

        let call = registry
            .call_from_native(&NativeToolCall {
                name: "mock".into(),
                arguments: json!({"code": "ls"}),
            })
            .unwrap();
        assert_eq!(call.kind, ToolKind::Bash);
        assert_eq!(call.payload, "ls");

        let unknown = NativeToolCall {
            name: "web_search".into(),
            arguments: json!({}),
        };
        assert!(registry.call_from_native(&unknown).is_none());

        let bad_args = NativeToolCall {
            name: "mock".into(),
            arguments: json!({"cmd": 1}),
        };
        assert!(registry.call_from_native(&bad_args).is_none());
    }
}
