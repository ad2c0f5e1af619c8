//! Runs one tool call under the sandbox policy

use std::io::Write;
use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Instant;

use nix::sys::signal::{killpg, Signal};
use nix::unistd::Pid;
use tempfile::NamedTempFile;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio::time::{timeout, Duration};
use tracing::{debug, instrument, warn};

use super::{FailureKind, ToolCall, ToolKind, ToolResult};
use crate::sandbox::{shell_quote, SandboxEnforcer, SandboxPolicy};

/// Default cap on the `output` field
pub const DEFAULT_MAX_OUTPUT_LEN: usize = 50_000;

const STDERR_PREFIX: &str = "[stderr] ";

/// How long to keep reading after the child exits
const PIPE_GRACE: Duration = Duration::from_millis(250);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stream {
    Stdout,
    Stderr,
}

/// Spawns snippets through a [`SandboxEnforcer`] with a hard timeout
#[derive(Debug, Clone)]
pub struct CodeExecutor {
    enforcer: Arc<dyn SandboxEnforcer>,
    timeout: Duration,
    max_output_len: usize,
}

impl CodeExecutor {
    pub fn new(enforcer: Arc<dyn SandboxEnforcer>, timeout: Duration) -> Self {
        Self {
            enforcer,
            timeout,
            max_output_len: DEFAULT_MAX_OUTPUT_LEN,
        }
    }

    pub fn with_max_output_len(mut self, len: usize) -> Self {
        self.max_output_len = len;
        self
    }

    pub fn enforcer_name(&self) -> &'static str {
        self.enforcer.name()
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Execute `call` in `working_dir`. Never fails; problems are reported
    /// in the returned result.
    #[instrument(skip_all, fields(call_id = %call.id, kind = %call.kind))]
    pub async fn execute(&self, call: &ToolCall, policy: &SandboxPolicy, working_dir: &Path) -> ToolResult {
        let started = Instant::now();

        let result = match call.kind {
            ToolKind::UserInput => return ToolResult::user_input(call),
            ToolKind::Bash => self.run(call, &call.payload, policy, working_dir).await,
            ToolKind::JavaScript | ToolKind::Python => {
                let script = match write_script(call.kind, &call.payload) {
                    Ok(script) => script,
                    Err(e) => {
                        warn!(error = %e, "Failed to write script file");
                        return ToolResult::failure(call, FailureKind::Internal, format!("Failed to write script: {}", e));
                    }
                };

                let command = format!(
                    "{} {}",
                    interpreter(call.kind),
                    shell_quote(&script.path().to_string_lossy())
                );
                let result = self.run(call, &command, policy, working_dir).await;
                // Removes the file
                drop(script);
                result
            }
        };

        let elapsed = started.elapsed().as_millis() as u64;
        debug!(success = result.success, elapsed_ms = elapsed, "Tool call finished");
        result.with_elapsed(elapsed)
    }

    async fn run(&self, call: &ToolCall, command: &str, policy: &SandboxPolicy, working_dir: &Path) -> ToolResult {
        let wrapped = match self.enforcer.wrap(policy, command) {
            Ok(wrapped) => wrapped,
            Err(e) => {
                warn!(enforcer = self.enforcer.name(), error = %e, "Sandbox enforcer rejected command");
                return ToolResult::failure(
                    call,
                    FailureKind::Internal,
                    format!("Sandbox enforcer {} failed: {:#}", self.enforcer.name(), e),
                );
            }
        };

        let mut child = match Command::new("bash")
            .arg("-c")
            .arg(&wrapped)
            .current_dir(working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .process_group(0)
            .kill_on_drop(true)
            .spawn()
        {
            Ok(child) => child,
            Err(e) => {
                warn!(error = %e, "Failed to spawn process");
                return ToolResult::failure(call, FailureKind::Internal, format!("Failed to start process: {}", e));
            }
        };

        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut readers = Vec::with_capacity(2);
        if let Some(stdout) = child.stdout.take() {
            readers.push(tokio::spawn(forward_lines(stdout, Stream::Stdout, tx.clone())));
        }
        if let Some(stderr) = child.stderr.take() {
            readers.push(tokio::spawn(forward_lines(stderr, Stream::Stderr, tx.clone())));
        }
        drop(tx);

        let mut lines = Captured::default();

        let collect = async {
            let status = loop {
                tokio::select! {
                    Some((stream, line)) = rx.recv() => lines.push(stream, line),
                    status = child.wait() => break status,
                }
            };

            // A backgrounded descendant can hold the pipes open after the child exits
            let drain = async {
                while let Some((stream, line)) = rx.recv().await {
                    lines.push(stream, line);
                }
            };
            if timeout(PIPE_GRACE, drain).await.is_err() {
                debug!("Pipes still open after exit, detaching readers");
            }
            status
        };

        let outcome = timeout(self.timeout, collect).await;

        if outcome.is_err() {
            let secs = self.timeout.as_secs();
            warn!(timeout_secs = secs, "Execution timed out, killing process group");
            kill_group(&mut child).await;
        }

        for reader in &readers {
            reader.abort();
        }
        while let Ok((stream, line)) = rx.try_recv() {
            lines.push(stream, line);
        }
        let output = truncate_output(lines.stdout.join("\n").trim(), self.max_output_len);

        match outcome {
            Ok(Ok(status)) => {
                if status.success() {
                    ToolResult::success(call, output).with_logs(lines.logs)
                } else {
                    let error = match status.code() {
                        Some(code) => format!("Process exited with code {}", code),
                        None => "Process terminated by a signal".to_string(),
                    };
                    debug!(%error, "Process failed");
                    ToolResult::failure(call, FailureKind::Execution, error)
                        .with_output(output)
                        .with_logs(lines.logs)
                }
            }
            Ok(Err(e)) => ToolResult::failure(call, FailureKind::Internal, format!("Failed to wait for process: {}", e))
                .with_logs(lines.logs),
            Err(_) => ToolResult::failure(
                call,
                FailureKind::Timeout,
                format!("Execution timed out after {} seconds", self.timeout.as_secs()),
            )
            .with_output(output)
            .with_logs(lines.logs),
        }
    }
}

/// Lines read so far, in arrival order
#[derive(Debug, Default)]
struct Captured {
    logs: Vec<String>,
    stdout: Vec<String>,
}

impl Captured {
    fn push(&mut self, stream: Stream, line: String) {
        match stream {
            Stream::Stdout => {
                self.logs.push(line.clone());
                self.stdout.push(line);
            }
            Stream::Stderr => self.logs.push(format!("{}{}", STDERR_PREFIX, line)),
        }
    }
}

/// SIGKILL the child's whole process group, then reap the child
async fn kill_group(child: &mut Child) {
    if let Some(pid) = child.id() {
        if let Err(e) = killpg(Pid::from_raw(pid as i32), Signal::SIGKILL) {
            warn!(pid, error = %e, "Failed to kill process group");
        }
    }
    if let Err(e) = child.kill().await {
        debug!(error = %e, "Child already gone");
    }
}

fn interpreter(kind: ToolKind) -> &'static str {
    match kind {
        ToolKind::JavaScript => "node",
        _ => "python3",
    }
}

/// Write a script to a uniquely named temp file; the file goes away when the guard drops
fn write_script(kind: ToolKind, code: &str) -> std::io::Result<NamedTempFile> {
    let suffix = match kind {
        ToolKind::JavaScript => ".js",
        _ => ".py",
    };

    let mut file = tempfile::Builder::new().prefix("codeact-").suffix(suffix).tempfile()?;
    file.write_all(code.as_bytes())?;
    file.write_all(b"\n")?;
    file.flush()?;
    Ok(file)
}

async fn forward_lines<R>(reader: R, stream: Stream, tx: mpsc::UnboundedSender<(Stream, String)>)
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();

    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(_) => {
                let line = String::from_utf8_lossy(&buf)
                    .trim_end_matches(|c| c == '\n' || c == '\r')
                    .to_string();
                if tx.send((stream, line)).is_err() {
                    break;
                }
            }
        }
    }
}

fn truncate_output(text: &str, max_len: usize) -> String {
    if text.len() <= max_len {
        return text.to_string();
    }

    let mut end = max_len;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}\n\n[Output truncated at {} bytes]", &text[..end], max_len)
}
