//! Interactive REPL driving the orchestrator
//!
//! Every line that is not a slash command becomes a task. When a task stops
//! to ask a question, the next line is sent back as the answer.

use anyhow::Result;
use rustyline::error::ReadlineError;
use rustyline::history::DefaultHistory;
use rustyline::{Config as EditorConfig, Editor};

use codeact::agent::{Orchestrator, TaskOutcome, TaskStatus};
use codeact::config::UserConfig;
use codeact::sandbox::SecurityMode;

// ANSI colors
const GREEN: &str = "\x1b[92m";
const BLUE: &str = "\x1b[94m";
const YELLOW: &str = "\x1b[93m";
const CYAN: &str = "\x1b[96m";
const DIM: &str = "\x1b[2m";
const BOLD: &str = "\x1b[1m";
const RESET: &str = "\x1b[0m";

/// A parsed slash command
#[derive(Debug, PartialEq, Eq)]
enum Command<'a> {
    Help,
    Quit,
    Mode(Option<&'a str>),
    Cd(Option<&'a str>),
    Status,
    Clear,
    Unknown(&'a str),
}

fn parse_command(input: &str) -> Command<'_> {
    let (cmd, args) = match input.split_once(char::is_whitespace) {
        Some((cmd, args)) => (cmd, args.trim()),
        None => (input, ""),
    };
    let args = (!args.is_empty()).then_some(args);

    match cmd {
        "/help" | "/h" | "/?" => Command::Help,
        "/exit" | "/quit" | "/q" => Command::Quit,
        "/mode" => Command::Mode(args),
        "/cd" => Command::Cd(args),
        "/status" => Command::Status,
        "/clear" => Command::Clear,
        other => Command::Unknown(other),
    }
}

/// Run the interactive REPL until `/quit` or end of input
pub async fn run(orchestrator: &mut Orchestrator, history_size: usize) -> Result<()> {
    let editor_config = EditorConfig::builder().max_history_size(history_size)?.build();
    let mut rl: Editor<(), DefaultHistory> = Editor::with_config(editor_config)?;

    let history_path = UserConfig::history_path();
    if let Some(path) = &history_path {
        let _ = rl.load_history(path);
    }

    print_welcome(orchestrator);

    loop {
        let prompt = if orchestrator.state().is_waiting() {
            format!("{}answer>{} ", YELLOW, RESET)
        } else {
            format!("{}codeact>{} ", CYAN, RESET)
        };

        match rl.readline(&prompt) {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }

                let _ = rl.add_history_entry(line);

                if line.starts_with('/') {
                    match handle_slash_command(orchestrator, line) {
                        Ok(true) => break,
                        Ok(false) => continue,
                        Err(e) => {
                            eprintln!("{}Error:{} {}", YELLOW, RESET, e);
                            continue;
                        }
                    }
                }

                match orchestrator.run(line).await {
                    Ok(outcome) => print_outcome(&outcome),
                    Err(e) => eprintln!("{}Error:{} {}", YELLOW, RESET, e),
                }
            }
            Err(ReadlineError::Interrupted) => {
                println!("{}^C{}", DIM, RESET);
                continue;
            }
            Err(ReadlineError::Eof) => {
                println!("{}Goodbye!{}", DIM, RESET);
                break;
            }
            Err(e) => {
                eprintln!("{}Error:{} {}", YELLOW, RESET, e);
                break;
            }
        }
    }

    if let Some(path) = &history_path {
        if let Some(parent) = path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        let _ = rl.save_history(path);
    }

    Ok(())
}

/// Print the result of one `run` call
pub fn print_outcome(outcome: &TaskOutcome) {
    match outcome.status {
        TaskStatus::Completed => {
            println!();
            println!("{}", outcome.message);
            println!();
        }
        TaskStatus::WaitingForInput => {
            println!("{}?{} {}", YELLOW, RESET, outcome.message);
        }
        TaskStatus::Failed => {
            println!("{}Failed:{} {}", YELLOW, RESET, outcome.message);
        }
        TaskStatus::Pending | TaskStatus::InProgress => {
            println!("{}[{}]{} {}", DIM, outcome.status, RESET, outcome.message);
        }
    }
}

fn print_welcome(orchestrator: &Orchestrator) {
    let session = orchestrator.session();
    println!();
    println!("{}codeact{} - code-acting agent", BOLD, RESET);
    println!("{}Model:{}     {}{}{}", DIM, RESET, BLUE, orchestrator.config().model, RESET);
    println!("{}Directory:{} {}", DIM, RESET, session.working_dir().display());
    println!("{}Mode:{}      {}", DIM, RESET, session.mode());
    println!("Type {}/help{} for commands", CYAN, RESET);
    println!();
}

/// Handle a slash command; `Ok(true)` means exit
fn handle_slash_command(orchestrator: &mut Orchestrator, input: &str) -> Result<bool> {
    match parse_command(input) {
        Command::Help => print_help(),
        Command::Quit => {
            println!("{}Goodbye!{}", DIM, RESET);
            return Ok(true);
        }
        Command::Mode(None) => {
            println!("Security mode: {}", orchestrator.session().mode());
            let modes: Vec<&str> = SecurityMode::ALL.iter().map(|m| m.as_str()).collect();
            println!("{}Available:{} {}", DIM, RESET, modes.join(", "));
        }
        Command::Mode(Some(name)) => {
            let mode: SecurityMode = name.parse()?;
            orchestrator.session_mut().set_mode(mode);
            println!("{}Security mode:{} {}", GREEN, RESET, mode);
        }
        Command::Cd(None) => {
            println!("{}", orchestrator.session().working_dir().display());
        }
        Command::Cd(Some(dir)) => {
            orchestrator.session_mut().change_dir(dir)?;
            println!(
                "{}Working directory:{} {}",
                GREEN,
                RESET,
                orchestrator.session().working_dir().display()
            );
        }
        Command::Status => print_status(orchestrator),
        Command::Clear => {
            orchestrator.clear_history();
            println!("{}Conversation cleared{}", DIM, RESET);
        }
        Command::Unknown(cmd) => {
            println!("{}Unknown command:{} {}", YELLOW, RESET, cmd);
            println!("Type {}/help{} for available commands", CYAN, RESET);
        }
    }
    Ok(false)
}

fn print_status(orchestrator: &Orchestrator) {
    let session = orchestrator.session();
    let state = orchestrator.state();

    println!("{}Session{}", BOLD, RESET);
    println!("  Model:      {}", orchestrator.config().model);
    println!("  Directory:  {}", session.working_dir().display());
    println!("  Mode:       {}", session.mode());
    println!("  Sandbox:    {}", orchestrator.enforcer_name());
    println!("  Max turns:  {}", orchestrator.config().max_turns);
    println!("  Messages:   {}", orchestrator.history().len());
    println!("  Tasks done: {}", state.completed_tasks.len());

    if let Some(task) = &state.current_task {
        println!(
            "  Current:    {} ({}, {} tool calls)",
            task.description,
            task.status,
            task.tool_calls.len()
        );
        if let Some(question) = task.pending_prompt() {
            println!("  Waiting on: {}", question);
        }
    }
}

fn print_help() {
    println!();
    println!("{}Commands:{}", BOLD, RESET);
    println!("  {}/help{}, /h, /?      Show this help", CYAN, RESET);
    println!("  {}/mode{} [name]      Show or set the security mode (strict, moderate, inquire)", CYAN, RESET);
    println!("  {}/cd{} [dir]         Show or change the working directory", CYAN, RESET);
    println!("  {}/status{}           Show session and task state", CYAN, RESET);
    println!("  {}/clear{}            Forget the conversation history", CYAN, RESET);
    println!("  {}/exit{}, /quit, /q  Exit the REPL", CYAN, RESET);
    println!();
    println!("{}Tips:{}", DIM, RESET);
    println!("  - Anything else is sent to the agent as a task");
    println!("  - When the agent asks a question, your next line is the answer");
    println!("  - Press Ctrl+D to exit");
    println!();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple_commands() {
        assert_eq!(parse_command("/help"), Command::Help);
        assert_eq!(parse_command("/q"), Command::Quit);
        assert_eq!(parse_command("/status"), Command::Status);
        assert_eq!(parse_command("/clear"), Command::Clear);
    }

    #[test]
    fn test_parse_command_arguments() {
        assert_eq!(parse_command("/mode strict"), Command::Mode(Some("strict")));
        assert_eq!(parse_command("/mode"), Command::Mode(None));
        assert_eq!(parse_command("/cd   ../other dir "), Command::Cd(Some("../other dir")));
        assert_eq!(parse_command("/cd"), Command::Cd(None));
    }

    #[test]
    fn test_parse_unknown_command() {
        assert_eq!(parse_command("/frobnicate now"), Command::Unknown("/frobnicate"));
    }
}
