//! codeact: a code-acting agent for local and hosted LLMs
//!
//! The model answers a task by writing bash, JavaScript or Python snippets,
//! which run sandboxed in the working directory until the task is done.

mod repl;

use anyhow::{Context, Result};
use clap::Parser;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use codeact::agent::{Orchestrator, TaskStatus};
use codeact::config::UserConfig;
use codeact::sandbox::{EnforcerKind, SandboxEnforcer, SecurityMode};
use codeact::session::Session;
use codeact::tools::builtin::create_default_registry;
use codeact::tools::router::ToolRouter;
use codeact::tools::security::{is_interactive, TerminalConfirmation};
use llm_core::{OllamaClient, OllamaStatus, Provider};

const YELLOW: &str = "\x1b[93m";
const RESET: &str = "\x1b[0m";

#[derive(Debug, Parser)]
#[command(name = "codeact")]
#[command(about = "Code-acting agent: the model writes code, codeact runs it", version)]
struct Cli {
    /// Task to run once; starts the REPL when omitted
    prompt: Vec<String>,

    /// Model to use (overrides config)
    #[arg(short, long, env = "CODEACT_MODEL")]
    model: Option<String>,

    /// Security mode: strict, moderate or inquire
    #[arg(long)]
    mode: Option<SecurityMode>,

    /// Turns per task before giving up
    #[arg(long)]
    max_turns: Option<usize>,

    /// Timeout for one snippet, in seconds
    #[arg(long)]
    timeout: Option<u64>,

    /// Working directory for executed code
    #[arg(short = 'C', long)]
    directory: Option<PathBuf>,

    /// Sandbox backend: auto, bubblewrap, firejail or unconfined
    #[arg(long)]
    enforcer: Option<String>,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();

    let user_config = UserConfig::load()?;
    let llm_config = llm_core::Config::try_load()
        .unwrap_or_else(llm_core::Config::default_minimal)
        .with_env_overrides();
    let mut orchestrator = build_orchestrator(&cli, &user_config, &llm_config)?;
    preflight(&llm_config, &orchestrator.config().model).await;

    if cli.prompt.is_empty() {
        return repl::run(&mut orchestrator, user_config.repl.history_size).await;
    }

    let status = run_once(&mut orchestrator, &cli.prompt.join(" ")).await?;
    if status != TaskStatus::Completed {
        std::process::exit(1);
    }
    Ok(())
}

fn build_orchestrator(cli: &Cli, user_config: &UserConfig, llm_config: &llm_core::Config) -> Result<Orchestrator> {
    let model = llm_config
        .connect()
        .with_context(|| format!("Failed to set up the {} backend", llm_config.base_url()))?;

    let model_name = cli
        .model
        .clone()
        .or_else(|| user_config.agent.model.clone())
        .unwrap_or_else(|| llm_config.llm.model.clone());

    let mut agent_config = user_config.agent_config(model_name).with_verbose(cli.verbose);
    if let Some(turns) = cli.max_turns {
        agent_config = agent_config.with_max_turns(turns);
    }
    if let Some(secs) = cli.timeout {
        agent_config = agent_config.with_command_timeout(secs);
    }

    let directory = match &cli.directory {
        Some(dir) => dir.clone(),
        None => std::env::current_dir().context("Failed to determine current directory")?,
    };
    let mode = cli.mode.unwrap_or(user_config.sandbox.mode);
    let session = Session::new(&directory, mode, user_config.sandbox.overrides.clone())?;

    let enforcer_name = cli.enforcer.as_deref().unwrap_or(&user_config.sandbox.enforcer);
    let enforcer = select_enforcer(enforcer_name)?;

    let router = ToolRouter::new(create_default_registry(), Arc::new(TerminalConfirmation));
    let orchestrator = Orchestrator::new(model, router, enforcer, session, agent_config)?;
    Ok(orchestrator)
}

/// Warn early when a local Ollama is down or lacks the model
async fn preflight(llm_config: &llm_core::Config, model: &str) {
    if llm_config.llm.provider != Provider::Ollama {
        return;
    }
    let client = match OllamaClient::new(llm_config.base_url(), Duration::from_secs(5)) {
        Ok(client) => client,
        Err(e) => {
            warn!(error = %e, "Could not build Ollama client for preflight");
            return;
        }
    };

    if client.status().await == OllamaStatus::Stopped {
        eprintln!("{}Warning:{} Ollama is not reachable at {}", YELLOW, RESET, client.base_url());
        return;
    }

    match client.list_models().await {
        Ok(models) => {
            let found = models
                .iter()
                .any(|m| m.name == model || m.name.split(':').next() == Some(model));
            if !found {
                eprintln!("{}Warning:{} model '{}' is not pulled. Available:", YELLOW, RESET, model);
                for m in &models {
                    eprintln!("  {} ({})", m.name, m.size_human());
                }
            }
        }
        Err(e) => warn!(error = %e, "Failed to list Ollama models"),
    }
}

/// Resolve `auto` to an installed backend, or parse an explicit name
fn select_enforcer(name: &str) -> Result<Arc<dyn SandboxEnforcer>> {
    let kind = if name.trim().eq_ignore_ascii_case("auto") {
        match EnforcerKind::detect() {
            Some(kind) => kind,
            None => anyhow::bail!(
                "No sandbox backend found (install bubblewrap or firejail), \
                 or pass --enforcer unconfined to run code without one"
            ),
        }
    } else {
        name.parse::<EnforcerKind>()?
    };

    if kind == EnforcerKind::Unconfined {
        warn!("Running code without a sandbox");
    }
    info!(enforcer = kind.name(), "Sandbox backend selected");
    Ok(kind.build())
}

/// Run one task, answering its questions from the terminal when possible
async fn run_once(orchestrator: &mut Orchestrator, task: &str) -> Result<TaskStatus> {
    let mut outcome = orchestrator.run(task).await?;

    while outcome.is_waiting() {
        repl::print_outcome(&outcome);
        if !is_interactive() {
            eprintln!("Task needs user input but stdin is not a terminal");
            return Ok(outcome.status);
        }

        print!("> ");
        std::io::stdout().flush()?;
        let mut answer = String::new();
        let mut reader = BufReader::new(tokio::io::stdin());
        if reader.read_line(&mut answer).await? == 0 {
            return Ok(outcome.status);
        }
        outcome = orchestrator.run(&answer).await?;
    }

    repl::print_outcome(&outcome);
    Ok(outcome.status)
}
