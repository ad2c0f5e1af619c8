//! Adapters that wrap a command so the sandbox policy is enforced at spawn time
//!
//! Supports bubblewrap and firejail on Linux. `UnconfinedEnforcer` passes
//! commands through untouched and must be picked explicitly.

use anyhow::Result;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, warn};

use super::SandboxPolicy;
use crate::error::AgentError;

/// Turns a raw command into one that runs under the policy.
///
/// The returned string is executed with `bash -c`.
pub trait SandboxEnforcer: Send + Sync + std::fmt::Debug {
    /// Display name
    fn name(&self) -> &'static str;

    /// Wrap `command` so it runs under `policy`
    fn wrap(&self, policy: &SandboxPolicy, command: &str) -> Result<String>;
}

/// Available enforcement backends
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnforcerKind {
    Bubblewrap,
    Firejail,
    /// No enforcement at all
    Unconfined,
}

impl EnforcerKind {
    /// Detect the best available backend
    ///
    /// Returns `None` when neither bubblewrap nor firejail is installed; the
    /// caller decides whether running unconfined is acceptable.
    pub fn detect() -> Option<Self> {
        if is_command_available("bwrap") {
            debug!("Sandbox backend: bubblewrap");
            return Some(Self::Bubblewrap);
        }

        if is_command_available("firejail") {
            debug!("Sandbox backend: firejail");
            return Some(Self::Firejail);
        }

        debug!("No sandbox backend available");
        None
    }

    /// Get the display name
    pub fn name(&self) -> &'static str {
        match self {
            Self::Bubblewrap => "bubblewrap",
            Self::Firejail => "firejail",
            Self::Unconfined => "unconfined",
        }
    }

    pub fn build(&self) -> Arc<dyn SandboxEnforcer> {
        match self {
            Self::Bubblewrap => Arc::new(BubblewrapEnforcer),
            Self::Firejail => Arc::new(FirejailEnforcer),
            Self::Unconfined => Arc::new(UnconfinedEnforcer::new()),
        }
    }
}

impl FromStr for EnforcerKind {
    type Err = AgentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "bubblewrap" | "bwrap" => Ok(Self::Bubblewrap),
            "firejail" => Ok(Self::Firejail),
            "unconfined" | "none" => Ok(Self::Unconfined),
            other => Err(AgentError::Configuration(format!("unknown sandbox enforcer '{}'", other))),
        }
    }
}

/// Check if a command is available in PATH
fn is_command_available(cmd: &str) -> bool {
    which::which(cmd).is_ok()
}

/// Quote a word for a POSIX shell
pub fn shell_quote(word: &str) -> String {
    let safe = !word.is_empty()
        && word
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.' | '/' | '=' | ':' | ',' | '+' | '@' | '%'));

    if safe {
        word.to_string()
    } else {
        format!("'{}'", word.replace('\'', r"'\''"))
    }
}

fn join_args(args: &[String]) -> String {
    args.iter().map(|a| shell_quote(a)).collect::<Vec<_>>().join(" ")
}

/// Paths matched by a deny-read pattern that currently exist
fn existing_matches(pattern: &str) -> Vec<String> {
    match glob::glob(pattern) {
        Ok(paths) => paths
            .filter_map(|p| p.ok())
            .map(|p| p.to_string_lossy().into_owned())
            .collect(),
        Err(_) => Vec::new(),
    }
}

fn exists(path: &str) -> bool {
    Path::new(path).exists()
}

fn isolate_network(policy: &SandboxPolicy) -> bool {
    policy.loopback_only() && !policy.allow_local_binding
}

/// bubblewrap: read-only root with writable holes
#[derive(Debug, Default, Clone, Copy)]
pub struct BubblewrapEnforcer;

impl SandboxEnforcer for BubblewrapEnforcer {
    fn name(&self) -> &'static str {
        "bubblewrap"
    }

    fn wrap(&self, policy: &SandboxPolicy, command: &str) -> Result<String> {
        let mut args: Vec<String> = vec!["bwrap".into(), "--ro-bind".into(), "/".into(), "/".into()];
        args.extend(["--dev", "/dev", "--proc", "/proc"].map(String::from));

        for path in &policy.allow_write {
            if path.starts_with("/dev") || path.starts_with("/proc") || !exists(path) {
                continue;
            }
            args.extend(["--bind".to_string(), path.clone(), path.clone()]);
        }

        // Mounted after the writable binds so nested denies win
        for path in &policy.deny_write {
            if path.starts_with("/proc") || path.starts_with("/sys") || !exists(path) {
                continue;
            }
            args.extend(["--ro-bind".to_string(), path.clone(), path.clone()]);
        }

        for pattern in &policy.deny_read {
            for path in existing_matches(pattern) {
                if Path::new(&path).is_dir() {
                    args.extend(["--tmpfs".to_string(), path]);
                } else {
                    args.extend(["--ro-bind".to_string(), "/dev/null".to_string(), path]);
                }
            }
        }

        if isolate_network(policy) {
            args.push("--unshare-net".into());
        }
        args.push("--new-session".into());
        args.push("--die-with-parent".into());
        args.extend(["--".to_string(), "bash".to_string(), "-c".to_string(), command.to_string()]);

        Ok(join_args(&args))
    }
}

/// firejail: read-only home with writable holes, blacklist for secrets
#[derive(Debug, Default, Clone, Copy)]
pub struct FirejailEnforcer;

impl SandboxEnforcer for FirejailEnforcer {
    fn name(&self) -> &'static str {
        "firejail"
    }

    fn wrap(&self, policy: &SandboxPolicy, command: &str) -> Result<String> {
        let mut args: Vec<String> = vec!["firejail".into(), "--quiet".into(), "--noprofile".into()];

        // firejail expands `~` itself
        args.push("--read-only=~".into());
        for path in &policy.allow_write {
            if path.starts_with("/dev") || path.starts_with("/proc") || !exists(path) {
                continue;
            }
            args.push(format!("--read-write={}", path));
        }

        // After the writable holes so nested denies win
        for path in &policy.deny_write {
            if exists(path) {
                args.push(format!("--read-only={}", path));
            }
        }
        for pattern in &policy.deny_read {
            args.push(format!("--blacklist={}", pattern));
        }
        if isolate_network(policy) {
            args.push("--net=none".into());
        }
        args.extend(["--".to_string(), "bash".to_string(), "-c".to_string(), command.to_string()]);

        Ok(join_args(&args))
    }
}

/// Runs commands as-is
#[derive(Debug, Clone, Copy)]
pub struct UnconfinedEnforcer;

impl UnconfinedEnforcer {
    pub fn new() -> Self {
        warn!("Running without a sandbox: the security policy is not enforced");
        Self
    }
}

impl Default for UnconfinedEnforcer {
    fn default() -> Self {
        Self::new()
    }
}

impl SandboxEnforcer for UnconfinedEnforcer {
    fn name(&self) -> &'static str {
        "unconfined"
    }

    fn wrap(&self, _policy: &SandboxPolicy, command: &str) -> Result<String> {
        Ok(command.to_string())
    }
}
