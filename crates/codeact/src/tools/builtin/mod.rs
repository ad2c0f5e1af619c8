//! Built-in tools for the agent

mod code;
mod user_input;

pub use code::CodeTool;
pub use user_input::UserInputTool;

use super::registry::ToolRegistry;
use super::ToolKind;

/// Create a registry with the three code tools and `request_user_input`
pub fn create_default_registry() -> ToolRegistry {
    let mut registry = ToolRegistry::new();

    registry.register(UserInputTool);

    // Run under the sandbox policy
    registry.register(CodeTool::new(ToolKind::Bash));
    registry.register(CodeTool::new(ToolKind::JavaScript));
    registry.register(CodeTool::new(ToolKind::Python));

    registry
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_registry_covers_every_kind() {
        let registry = create_default_registry();
        assert_eq!(registry.list_names(), vec!["bash", "javascript", "python", "request_user_input"]);

        for kind in [ToolKind::UserInput, ToolKind::Bash, ToolKind::JavaScript, ToolKind::Python] {
            let tool = registry.get_by_kind(kind).unwrap();
            assert_eq!(tool.name(), kind.tool_name());
        }
    }

    #[test]
    fn test_only_code_tools_need_confirmation() {
        let registry = create_default_registry();
        assert!(!registry.get("request_user_input").unwrap().needs_confirmation());
        assert!(registry.get("python").unwrap().needs_confirmation());
    }
}
