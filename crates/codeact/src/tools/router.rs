//! Tool routing and dispatch

use std::sync::Arc;

use tracing::{debug, info, instrument, warn};

use super::registry::ToolRegistry;
use super::security::{ConfirmationHandler, ConfirmationResult};
use super::{FailureKind, ToolCall, ToolContext, ToolResult};
use crate::sandbox::SecurityMode;

pub const DENIED_MESSAGE: &str = "Execution denied by user";

/// Router for dispatching tool calls
pub struct ToolRouter {
    registry: ToolRegistry,
    confirmation: Arc<dyn ConfirmationHandler>,
}

impl ToolRouter {
    /// Create a new router with the given registry and confirmation handler
    pub fn new(registry: ToolRegistry, confirmation: Arc<dyn ConfirmationHandler>) -> Self {
        Self { registry, confirmation }
    }

    /// Route a single tool call. Every outcome, including a missing tool or
    /// a refusal, comes back as a `ToolResult`.
    #[instrument(skip(self, ctx), fields(kind = %call.kind, call_id = %call.id))]
    pub async fn route(&self, call: &ToolCall, ctx: &ToolContext) -> ToolResult {
        let tool = match self.registry.get_by_kind(call.kind) {
            Some(t) => t,
            None => {
                warn!(kind = %call.kind, "No tool registered");
                return ToolResult::failure(call, FailureKind::Internal, format!("No tool registered for {}", call.kind));
            }
        };

        if ctx.mode == SecurityMode::Inquire && tool.needs_confirmation() {
            debug!("Requesting user confirmation");
            match self.confirmation.confirm(call).await {
                ConfirmationResult::Approved => {
                    debug!("User approved tool execution");
                }
                ConfirmationResult::Denied => {
                    info!(tool = tool.name(), "User denied tool execution");
                    return ToolResult::failure(call, FailureKind::Denied, DENIED_MESSAGE);
                }
            }
        }

        info!(tool = tool.name(), "Executing tool");
        let result = tool.execute(call, ctx).await;
        if result.success {
            info!(
                tool = tool.name(),
                output_len = result.output.as_deref().map_or(0, str::len),
                elapsed_ms = result.execution_time_ms,
                "Tool executed successfully"
            );
        } else {
            warn!(tool = tool.name(), failure = ?result.failure, error = ?result.error, "Tool execution failed");
        }
        result
    }

    /// Get a reference to the registry
    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }
}

impl std::fmt::Debug for ToolRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRouter")
            .field("registry", &self.registry)
            .finish()
    }
}
