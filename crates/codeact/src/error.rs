//! Errors that cross the public boundary of the agent

/// Errors returned by the agent API.
///
/// Only `Configuration` is expected in practice; it stops a task from starting.
/// Everything that goes wrong while a task runs (bad tool output, timeouts,
/// model transport errors, exhausted turns) is folded into the task result
/// instead and never surfaces here.
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("invalid task transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },
}

pub type AgentResult<T> = std::result::Result<T, AgentError>;
