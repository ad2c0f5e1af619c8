//! Agent loop implementation

use std::sync::Arc;

use llm_core::{ChatMessage, ChatModel, ChatRequest, ChatResponse, ToolSchema};
use tokio::time::{timeout, Duration};
use tracing::{debug, info, instrument, warn};

use super::completion;
use super::prompts;
use super::state::{AgentConfig, AgentState, Task, TaskStatus};
use crate::error::{AgentError, AgentResult};
use crate::sandbox::SandboxEnforcer;
use crate::session::Session;
use crate::tools::executor::CodeExecutor;
use crate::tools::parser::parse_tool_calls;
use crate::tools::router::ToolRouter;
use crate::tools::{FailureKind, ToolCall, ToolContext, ToolKind, ToolResult};

/// Returned when the turn budget runs out
pub const FAILURE_MESSAGE: &str = "I failed to generate a valid response.";

/// Prefix of the assistant message recorded when the model cannot be reached
pub const TRANSPORT_ERROR_PREFIX: &str = "[LLM transport error] ";

const MAX_STDERR_LINES: usize = 50;

// ANSI colors
const GREEN: &str = "\x1b[92m";
const YELLOW: &str = "\x1b[93m";
const CYAN: &str = "\x1b[96m";
const DIM: &str = "\x1b[2m";
const RESET: &str = "\x1b[0m";

/// What a call to [`Orchestrator::run`] ended with
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskOutcome {
    pub task_id: String,
    pub status: TaskStatus,
    /// Final answer, the fixed failure message, or the question for the user
    pub message: String,
}

impl TaskOutcome {
    pub fn is_waiting(&self) -> bool {
        self.status == TaskStatus::WaitingForInput
    }
}

/// Drives tasks through model turns and tool execution
pub struct Orchestrator {
    model: Arc<dyn ChatModel>,
    router: ToolRouter,
    executor: Arc<CodeExecutor>,
    session: Session,
    config: AgentConfig,
    state: AgentState,
    history: Vec<ChatMessage>,
}

impl Orchestrator {
    pub fn new(
        model: Arc<dyn ChatModel>,
        router: ToolRouter,
        enforcer: Arc<dyn SandboxEnforcer>,
        session: Session,
        config: AgentConfig,
    ) -> AgentResult<Self> {
        config.validate()?;
        if router.registry().is_empty() {
            return Err(AgentError::Configuration("no tools registered".into()));
        }

        let executor = CodeExecutor::new(enforcer, Duration::from_secs(config.command_timeout_secs))
            .with_max_output_len(config.max_output_len);

        info!(
            backend = model.name(),
            model = %config.model,
            enforcer = executor.enforcer_name(),
            max_turns = config.max_turns,
            "Orchestrator ready"
        );

        Ok(Self {
            model,
            router,
            executor: Arc::new(executor),
            session,
            config,
            state: AgentState::new(),
            history: Vec::new(),
        })
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Changes take effect on the next tool call
    pub fn session_mut(&mut self) -> &mut Session {
        &mut self.session
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    pub fn enforcer_name(&self) -> &'static str {
        self.executor.enforcer_name()
    }

    pub fn state(&self) -> &AgentState {
        &self.state
    }

    pub fn history(&self) -> &[ChatMessage] {
        &self.history
    }

    pub fn clear_history(&mut self) {
        self.history.clear();
    }

    /// Start a task with `input`, or answer the question a waiting task asked
    #[instrument(skip(self, input), fields(model = %self.config.model))]
    pub async fn run(&mut self, input: &str) -> AgentResult<TaskOutcome> {
        self.state.touch();
        let input = input.trim();

        let mut task = match self.state.current_task.take() {
            Some(mut task) if task.status == TaskStatus::WaitingForInput => {
                task.transition(TaskStatus::InProgress)?;
                info!(task_id = %task.id, "Resuming task with user input");
                task
            }
            stale => {
                if let Some(task) = stale {
                    warn!(task_id = %task.id, status = %task.status, "Dropping unfinished task");
                }
                let mut task = Task::new(input);
                task.transition(TaskStatus::InProgress)?;
                info!(task_id = %task.id, task_len = input.len(), max_turns = self.config.max_turns, "Starting task");
                task
            }
        };

        self.history.push(ChatMessage::user(input));
        let outcome = self.drive(&mut task).await;

        self.state.current_task = Some(task);
        self.state.archive_current();
        outcome
    }

    async fn drive(&mut self, task: &mut Task) -> AgentResult<TaskOutcome> {
        let system_prompt = self.system_prompt();
        let tools = if self.config.native_tools {
            self.router.registry().schemas()
        } else {
            Vec::new()
        };

        for turn in 1..=self.config.max_turns {
            debug!(turn, messages = self.history.len(), "Starting turn");
            if self.config.verbose {
                println!("{}[Turn {}]{}", DIM, turn, RESET);
            }

            let reply = match self.ask_model(&system_prompt, &tools).await {
                Ok(reply) => reply,
                Err(detail) => {
                    warn!(turn, error = %detail, "LLM request failed");
                    self.history
                        .push(ChatMessage::assistant(format!("{}{}", TRANSPORT_ERROR_PREFIX, detail)));
                    continue;
                }
            };

            let calls = self.extract_calls(&reply);
            if calls.is_empty() {
                info!(turn, "Model answered without tool calls");
                self.history.push(ChatMessage::assistant(reply.content.clone()));
                return finish(task, TaskStatus::Completed, reply.content);
            }

            self.history.push(ChatMessage::assistant(assistant_record(&reply.content, &calls)));

            let (executed, results) = self.execute_turn(calls).await;
            for (call, result) in executed.iter().zip(&results) {
                if call.kind != ToolKind::UserInput {
                    self.history.push(ChatMessage::user(format_tool_result(call, result)));
                }
            }

            let start = task.tool_calls.len();
            task.record_turn(executed, results);
            let calls = &task.tool_calls[start..];
            let results = &task.results[start..];

            if let Some(question) = calls.iter().find(|c| c.kind == ToolKind::UserInput) {
                let question = question.payload.clone();
                info!(turn, task_id = %task.id, "Waiting for user input");
                task.transition(TaskStatus::WaitingForInput)?;
                return Ok(TaskOutcome {
                    task_id: task.id.clone(),
                    status: TaskStatus::WaitingForInput,
                    message: question,
                });
            }

            let verdict = completion::evaluate(task, calls, results, &reply.content);
            debug!(turn, complete = verdict.complete, rule = ?verdict.rule, "Completion verdict");
            if verdict.complete {
                let message = completion_message(&reply.content, results);
                return finish(task, TaskStatus::Completed, message);
            }
        }

        warn!(task_id = %task.id, max_turns = self.config.max_turns, "Turn budget exhausted");
        finish(task, TaskStatus::Failed, FAILURE_MESSAGE.to_string())
    }

    fn system_prompt(&self) -> String {
        match &self.config.system_prompt {
            Some(prompt) => prompt.clone(),
            None => prompts::system_prompt(self.session.working_dir(), self.session.mode(), self.router.registry()),
        }
    }

    /// One bounded model call; failures come back as a description
    async fn ask_model(&self, system_prompt: &str, tools: &[ToolSchema]) -> Result<ChatResponse, String> {
        let request = ChatRequest::new(self.config.model.as_str(), system_prompt)
            .with_history(self.history.clone())
            .with_tools(tools.to_vec());

        let limit = Duration::from_secs(self.config.llm_timeout_secs);
        match timeout(limit, self.model.chat(&request)).await {
            Ok(Ok(reply)) => Ok(reply),
            Ok(Err(e)) => Err(e.to_string()),
            Err(_) => Err(format!("request timed out after {} seconds", self.config.llm_timeout_secs)),
        }
    }

    /// Native structured calls win; otherwise parse the reply text
    fn extract_calls(&self, reply: &ChatResponse) -> Vec<ToolCall> {
        let native: Vec<ToolCall> = reply
            .tool_calls
            .iter()
            .filter_map(|c| self.router.registry().call_from_native(c))
            .collect();
        if !native.is_empty() {
            debug!(count = native.len(), "Using native tool calls");
            return native;
        }

        let parsed = parse_tool_calls(&reply.content);
        debug!(count = parsed.len(), "Parsed tool calls from reply text");
        parsed
    }

    /// Run calls in order, stopping after the first user-input request
    async fn execute_turn(&self, calls: Vec<ToolCall>) -> (Vec<ToolCall>, Vec<ToolResult>) {
        let ctx = self.tool_context();
        let mut executed = Vec::with_capacity(calls.len());
        let mut results = Vec::with_capacity(calls.len());

        for call in calls {
            let result = self.router.route(&call, &ctx).await;
            if self.config.verbose {
                print_result(&call, &result);
            }

            let halt = call.kind == ToolKind::UserInput;
            executed.push(call);
            results.push(result);
            if halt {
                break;
            }
        }

        (executed, results)
    }

    fn tool_context(&self) -> ToolContext {
        ToolContext {
            working_dir: self.session.working_dir().to_path_buf(),
            mode: self.session.mode(),
            policy: self.session.policy(),
            executor: Arc::clone(&self.executor),
        }
    }
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("model", &self.model.name())
            .field("router", &self.router)
            .field("session", &self.session)
            .field("config", &self.config)
            .finish()
    }
}

fn finish(task: &mut Task, status: TaskStatus, message: String) -> AgentResult<TaskOutcome> {
    task.transition(status)?;
    info!(task_id = %task.id, status = %status, steps = task.current_step, "Task finished");
    Ok(TaskOutcome {
        task_id: task.id.clone(),
        status,
        message,
    })
}

/// The assistant turn as kept in history; native calls with no text are rendered as fences
fn assistant_record(content: &str, calls: &[ToolCall]) -> String {
    if !content.trim().is_empty() {
        return content.to_string();
    }
    calls
        .iter()
        .map(|c| match c.kind {
            ToolKind::UserInput => format!("<request_user_input>{}</request_user_input>", c.payload),
            kind => format!("```{}\n{}\n```", kind.tool_name(), c.payload),
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Tool output as fed back to the model
fn format_tool_result(call: &ToolCall, result: &ToolResult) -> String {
    let status = match (result.success, result.failure) {
        (true, _) => "success",
        (false, Some(FailureKind::Timeout)) => "timeout",
        (false, Some(FailureKind::Denied)) => "denied",
        (false, _) => "error",
    };

    let mut text = format!("Tool result ({}, {}):\n", call.kind, status);
    match result.output.as_deref() {
        Some(output) if !output.is_empty() => text.push_str(output),
        _ => text.push_str("(no output)"),
    }

    let stderr: Vec<&String> = result
        .logs
        .iter()
        .filter(|l| l.starts_with("[stderr] "))
        .take(MAX_STDERR_LINES)
        .collect();
    for line in stderr {
        text.push('\n');
        text.push_str(line);
    }

    if let Some(error) = &result.error {
        text.push_str("\nError: ");
        text.push_str(error);
    }
    text
}

/// Reply text followed by what the snippets printed
fn completion_message(reply: &str, results: &[ToolResult]) -> String {
    let mut message = reply.trim().to_string();
    for output in results.iter().filter_map(|r| r.output.as_deref()).filter(|o| !o.is_empty()) {
        if !message.is_empty() {
            message.push_str("\n\n");
        }
        message.push_str(output);
    }
    message
}

fn print_result(call: &ToolCall, result: &ToolResult) {
    print!("{}[{}]{} ", CYAN, call.kind, RESET);
    if result.success {
        println!("{}OK{} {}({} ms){}", GREEN, RESET, DIM, result.execution_time_ms, RESET);
    } else {
        println!(
            "{}Failed{} {}",
            YELLOW,
            RESET,
            result.error.as_deref().unwrap_or("unknown error")
        );
    }
}
