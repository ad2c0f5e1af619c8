//! Agent state management

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::{AgentError, AgentResult};
use crate::tools::executor::DEFAULT_MAX_OUTPUT_LEN;
use crate::tools::{ToolCall, ToolResult};

/// Configuration for the agent
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Model to use
    pub model: String,
    /// Replaces the built-in system prompt when set
    pub system_prompt: Option<String>,
    /// Turns per task before giving up
    pub max_turns: usize,
    /// Wall-clock limit for one snippet
    pub command_timeout_secs: u64,
    /// Wall-clock limit for one model call
    pub llm_timeout_secs: u64,
    /// Cap on the captured stdout of one snippet
    pub max_output_len: usize,
    /// Offer tool schemas to models with native function calling
    pub native_tools: bool,
    /// Print turns and tool outcomes to stdout
    pub verbose: bool,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            model: "llama3.2".to_string(),
            system_prompt: None,
            max_turns: 10,
            command_timeout_secs: 60,
            llm_timeout_secs: 300,
            max_output_len: DEFAULT_MAX_OUTPUT_LEN,
            native_tools: true,
            verbose: false,
        }
    }
}

impl AgentConfig {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            ..Default::default()
        }
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    pub fn with_max_turns(mut self, max: usize) -> Self {
        self.max_turns = max;
        self
    }

    pub fn with_command_timeout(mut self, secs: u64) -> Self {
        self.command_timeout_secs = secs;
        self
    }

    pub fn with_llm_timeout(mut self, secs: u64) -> Self {
        self.llm_timeout_secs = secs;
        self
    }

    pub fn with_max_output_len(mut self, len: usize) -> Self {
        self.max_output_len = len;
        self
    }

    pub fn with_native_tools(mut self, enabled: bool) -> Self {
        self.native_tools = enabled;
        self
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Reject settings the loop cannot run with
    pub fn validate(&self) -> AgentResult<()> {
        if self.model.trim().is_empty() {
            return Err(AgentError::Configuration("model name is empty".into()));
        }
        if self.max_turns == 0 {
            return Err(AgentError::Configuration("max_turns must be at least 1".into()));
        }
        if self.command_timeout_secs == 0 || self.llm_timeout_secs == 0 {
            return Err(AgentError::Configuration("timeouts must be at least one second".into()));
        }
        if self.max_output_len == 0 {
            return Err(AgentError::Configuration("max_output_len must be positive".into()));
        }
        Ok(())
    }
}

/// Lifecycle of a task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    InProgress,
    WaitingForInput,
    Completed,
    Failed,
}

impl TaskStatus {
    pub fn can_transition_to(self, next: TaskStatus) -> bool {
        use TaskStatus::*;
        matches!(
            (self, next),
            (Pending, InProgress)
                | (InProgress, WaitingForInput)
                | (InProgress, Completed)
                | (InProgress, Failed)
                | (WaitingForInput, InProgress)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::WaitingForInput => "waiting_for_input",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One user request and everything run on its behalf
#[derive(Debug, Clone, Serialize)]
pub struct Task {
    pub id: String,
    pub description: String,
    pub status: TaskStatus,
    pub tool_calls: Vec<ToolCall>,
    /// Parallel to `tool_calls`
    pub results: Vec<ToolResult>,
    /// Turns that executed at least one tool call
    pub current_step: usize,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Task {
    pub fn new(description: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            description: description.into(),
            status: TaskStatus::Pending,
            tool_calls: Vec::new(),
            results: Vec::new(),
            current_step: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Move to `next`, rejecting edges outside the lifecycle
    pub fn transition(&mut self, next: TaskStatus) -> AgentResult<()> {
        if !self.status.can_transition_to(next) {
            return Err(AgentError::InvalidTransition {
                from: self.status.to_string(),
                to: next.to_string(),
            });
        }
        self.status = next;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Record one turn's executed calls with their results
    pub fn record_turn(&mut self, calls: Vec<ToolCall>, results: Vec<ToolResult>) {
        debug_assert_eq!(calls.len(), results.len());
        debug_assert!(calls.iter().zip(&results).all(|(c, r)| c.id == r.tool_call_id));

        self.tool_calls.extend(calls);
        self.results.extend(results);
        self.current_step += 1;
        self.updated_at = Utc::now();
    }

    /// The prompt of the user-input call the task is waiting on
    pub fn pending_prompt(&self) -> Option<&str> {
        if self.status != TaskStatus::WaitingForInput {
            return None;
        }
        self.tool_calls.last().map(|c| c.payload.as_str())
    }
}

/// State of one orchestrator across tasks
#[derive(Debug)]
pub struct AgentState {
    pub current_task: Option<Task>,
    pub completed_tasks: Vec<Task>,
    pub session_start: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
}

impl AgentState {
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            current_task: None,
            completed_tasks: Vec::new(),
            session_start: now,
            last_activity: now,
        }
    }

    pub fn touch(&mut self) {
        self.last_activity = Utc::now();
    }

    /// Move the current task to `completed_tasks` once it is terminal
    pub fn archive_current(&mut self) -> Option<&Task> {
        let terminal = self.current_task.as_ref().is_some_and(|t| t.status.is_terminal());
        if !terminal {
            return None;
        }
        let task = self.current_task.take()?;
        self.completed_tasks.push(task);
        self.touch();
        self.completed_tasks.last()
    }

    /// True while a task is parked on a question for the user
    pub fn is_waiting(&self) -> bool {
        self.current_task
            .as_ref()
            .is_some_and(|t| t.status == TaskStatus::WaitingForInput)
    }
}

impl Default for AgentState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::ToolKind;

    #[test]
    fn test_agent_config_builder() {
        let config = AgentConfig::new("qwen2.5-coder")
            .with_max_turns(3)
            .with_command_timeout(5)
            .with_system_prompt("be brief");

        assert_eq!(config.model, "qwen2.5-coder");
        assert_eq!(config.max_turns, 3);
        assert_eq!(config.command_timeout_secs, 5);
        assert_eq!(config.system_prompt.as_deref(), Some("be brief"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_agent_config_rejects_zero_turns() {
        let err = AgentConfig::default().with_max_turns(0).validate().unwrap_err();
        assert!(matches!(err, AgentError::Configuration(_)));
        assert!(AgentConfig::new(" ").validate().is_err());
        assert!(AgentConfig::default().with_llm_timeout(0).validate().is_err());
    }

    #[test]
    fn test_valid_transitions() {
        let mut task = Task::new("list files");
        task.transition(TaskStatus::InProgress).unwrap();
        task.transition(TaskStatus::WaitingForInput).unwrap();
        task.transition(TaskStatus::InProgress).unwrap();
        task.transition(TaskStatus::Completed).unwrap();
        assert!(task.status.is_terminal());
    }

    #[test]
    fn test_invalid_transitions_rejected() {
        let mut task = Task::new("list files");
        let err = task.transition(TaskStatus::Completed).unwrap_err();
        assert!(matches!(err, AgentError::InvalidTransition { .. }));
        assert_eq!(task.status, TaskStatus::Pending);

        task.transition(TaskStatus::InProgress).unwrap();
        task.transition(TaskStatus::Failed).unwrap();
        assert!(task.transition(TaskStatus::InProgress).is_err());
        assert_eq!(err.to_string(), "invalid task transition from pending to completed");
    }

    #[test]
    fn test_record_turn_keeps_pairs() {
        let mut task = Task::new("run ls");
        let call = ToolCall::new(ToolKind::Bash, "ls");
        let result = ToolResult::success(&call, "a.txt");

        task.record_turn(vec![call], vec![result]);
        assert_eq!(task.tool_calls.len(), task.results.len());
        assert_eq!(task.current_step, 1);
        assert_eq!(task.results[0].tool_call_id, task.tool_calls[0].id);
    }

    #[test]
    fn test_pending_prompt() {
        let mut task = Task::new("deploy");
        task.transition(TaskStatus::InProgress).unwrap();
        let call = ToolCall::new(ToolKind::UserInput, "Which region?");
        let result = ToolResult::user_input(&call);
        task.record_turn(vec![call], vec![result]);
        assert_eq!(task.pending_prompt(), None);

        task.transition(TaskStatus::WaitingForInput).unwrap();
        assert_eq!(task.pending_prompt(), Some("Which region?"));
    }

    #[test]
    fn test_archive_only_terminal_tasks() {
        let mut state = AgentState::new();
        let mut task = Task::new("x");
        task.transition(TaskStatus::InProgress).unwrap();
        state.current_task = Some(task);
        assert!(state.archive_current().is_none());

        if let Some(task) = state.current_task.as_mut() {
            task.transition(TaskStatus::Completed).unwrap();
        }
        assert!(state.archive_current().is_some());
        assert!(state.current_task.is_none());
        assert_eq!(state.completed_tasks.len(), 1);
    }
}
