//! Confirmation handling for Inquire mode

use async_trait::async_trait;
use std::io::{self, IsTerminal, Write};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, warn};

use super::ToolCall;

/// Check if stdin is connected to a terminal
pub fn is_interactive() -> bool {
    io::stdin().is_terminal()
}

/// Result of a confirmation prompt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmationResult {
    Approved,
    Denied,
}

/// Asks whether a snippet may run
#[async_trait]
pub trait ConfirmationHandler: Send + Sync {
    async fn confirm(&self, call: &ToolCall) -> ConfirmationResult;
}

/// Prompts on the terminal; denies when stdin is not a TTY
#[derive(Debug, Default, Clone, Copy)]
pub struct TerminalConfirmation;

#[async_trait]
impl ConfirmationHandler for TerminalConfirmation {
    async fn confirm(&self, call: &ToolCall) -> ConfirmationResult {
        if !is_interactive() {
            warn!(kind = %call.kind, "Non-interactive mode: denying snippet that requires confirmation");
            eprintln!(
                "\x1b[93m[Warning]\x1b[0m Inquire mode: {} snippet needs confirmation but stdin is not a TTY.",
                call.kind
            );
            return ConfirmationResult::Denied;
        }

        println!();
        println!("\x1b[93m[inquire]\x1b[0m \x1b[1m{}\x1b[0m snippet:", call.kind);
        for line in call.payload.lines() {
            println!("  {}", line);
        }
        println!();
        print!("Run it? [y/N] ");
        if let Err(e) = io::stdout().flush() {
            debug!(error = %e, "Failed to flush stdout");
        }

        // Async stdin keeps the runtime free while waiting
        let mut reader = BufReader::new(tokio::io::stdin());
        let mut input = String::new();
        if reader.read_line(&mut input).await.is_err() {
            debug!("Failed to read stdin, denying");
            return ConfirmationResult::Denied;
        }

        let result = match input.trim().to_lowercase().as_str() {
            "y" | "yes" => ConfirmationResult::Approved,
            _ => ConfirmationResult::Denied,
        };

        debug!(kind = %call.kind, result = ?result, "User confirmation response");
        result
    }
}

/// A confirmation handler that always approves
#[derive(Debug, Default, Clone, Copy)]
pub struct AutoApprove;

#[async_trait]
impl ConfirmationHandler for AutoApprove {
    async fn confirm(&self, _call: &ToolCall) -> ConfirmationResult {
        ConfirmationResult::Approved
    }
}

/// A confirmation handler that always denies
#[derive(Debug, Default, Clone, Copy)]
pub struct AutoDeny;

#[async_trait]
impl ConfirmationHandler for AutoDeny {
    async fn confirm(&self, _call: &ToolCall) -> ConfirmationResult {
        ConfirmationResult::Denied
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::ToolKind;

    #[tokio::test]
    async fn test_auto_approve() {
        let call = ToolCall::new(ToolKind::Bash, "ls");
        assert_eq!(AutoApprove.confirm(&call).await, ConfirmationResult::Approved);
    }

    #[tokio::test]
    async fn test_auto_deny() {
        let call = ToolCall::new(ToolKind::Python, "print(1)");
        assert_eq!(AutoDeny.confirm(&call).await, ConfirmationResult::Denied);
    }

    #[test]
    fn test_is_interactive_in_test() {
        let _result = super::is_interactive();
    }
}
