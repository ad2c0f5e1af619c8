//! Built-in system prompt

use std::path::Path;

use super::completion::COMPLETION_MARKER;
use crate::sandbox::{SecurityMode, FORBIDDEN_AREA};
use crate::tools::parser::{TOOL_CALL_CLOSE, TOOL_CALL_OPEN, USER_INPUT_CLOSE, USER_INPUT_OPEN};
use crate::tools::registry::ToolRegistry;

/// Build the default system prompt for a session
pub fn system_prompt(working_dir: &Path, mode: SecurityMode, registry: &ToolRegistry) -> String {
    let mut prompt = String::new();

    prompt.push_str(
        "You are a coding agent. You act by writing code that is executed for you, \
         then you read its output and decide what to do next.\n\n",
    );
    prompt.push_str(&format!("Working directory: {}\n", working_dir.display()));
    prompt.push_str(&format!("Security mode: {}\n\n", mode));

    prompt.push_str("## Available Tools\n");
    for tool in registry.schemas() {
        prompt.push_str(&format!("- {}: {}\n", tool.name, tool.description));
    }
    prompt.push('\n');

    prompt.push_str("## How to act\n");
    prompt.push_str(
        "- Put code in a fenced block tagged with its language: ```bash, ```javascript or ```python.\n",
    );
    prompt.push_str(&format!(
        "- Alternatively emit {}{{\"code\": \"...\", \"language\": \"python\"}}{}.\n",
        TOOL_CALL_OPEN, TOOL_CALL_CLOSE
    ));
    prompt.push_str(&format!(
        "- If you need information only the user has, write {}your question{} and stop.\n",
        USER_INPUT_OPEN, USER_INPUT_CLOSE
    ));
    prompt.push_str("- Blocks run one after another, in the order you write them.\n");
    prompt.push_str("- Print results to stdout; you will see stdout and stderr of every block.\n");
    prompt.push('\n');

    prompt.push_str("## Rules\n");
    prompt.push_str("- Only the working directory and the temp directory are writable.\n");
    prompt.push_str(&format!("- Never touch `{}` inside the working directory.\n", FORBIDDEN_AREA));
    prompt.push_str("- Network access is limited to localhost unless the user allowed more.\n");
    prompt.push_str(&format!(
        "- When the task is done, answer without code and include {} in your reply.\n",
        COMPLETION_MARKER
    ));

    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::builtin::create_default_registry;

    #[test]
    fn test_prompt_documents_markers() {
        let prompt = system_prompt(Path::new("/work"), SecurityMode::Strict, &create_default_registry());

        assert!(prompt.contains("Working directory: /work"));
        assert!(prompt.contains("Security mode: strict"));
        assert!(prompt.contains("<request_user_input>"));
        assert!(prompt.contains("<tool_call>"));
        assert!(prompt.contains(COMPLETION_MARKER));
        assert!(prompt.contains("- python:"));
    }
}
