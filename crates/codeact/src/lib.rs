//! codeact: a code-acting agent
//!
//! Provides:
//! - The turn loop that asks a model for code and runs it (`agent`)
//! - Tool call parsing, registry, routing and sandboxed execution (`tools`)
//! - Security modes, sandbox policies and their enforcers (`sandbox`)
//! - Session and user configuration (`session`, `config`)

pub mod agent;
pub mod config;
pub mod error;
pub mod sandbox;
pub mod session;
pub mod tools;

pub use agent::{AgentConfig, Orchestrator, TaskOutcome, TaskStatus};
pub use error::{AgentError, AgentResult};
pub use sandbox::{EnforcerKind, SandboxPolicy, SecurityMode};
pub use session::Session;
pub use tools::{ToolCall, ToolKind, ToolResult};
