//! Agent framework for code-acting task execution
//!
//! Implements a turn loop: ask the model, run the snippets it wrote, feed the
//! results back, and stop once the task looks finished.

mod agent_loop;
pub mod completion;
mod prompts;
mod state;

pub use agent_loop::{Orchestrator, TaskOutcome, FAILURE_MESSAGE, TRANSPORT_ERROR_PREFIX};
pub use completion::{evaluate, is_complete, Rule, Verdict, COMPLETION_MARKER};
pub use prompts::system_prompt;
pub use state::{AgentConfig, AgentState, Task, TaskStatus};
