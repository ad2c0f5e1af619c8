//! Working directory, security mode and the policy derived from them

use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

use crate::error::{AgentError, AgentResult};
use crate::sandbox::{build_policy, PolicyOverrides, SandboxPolicy, SecurityMode};

/// Where code runs and under which rules.
///
/// The policy is rebuilt, never mutated, whenever the directory or mode
/// changes; results already handed out keep the old `Arc`.
#[derive(Debug, Clone)]
pub struct Session {
    working_dir: PathBuf,
    mode: SecurityMode,
    overrides: PolicyOverrides,
    policy: Arc<SandboxPolicy>,
    pub started_at: DateTime<Utc>,
}

impl Session {
    pub fn new(working_dir: impl AsRef<Path>, mode: SecurityMode, overrides: PolicyOverrides) -> AgentResult<Self> {
        let working_dir = resolve_dir(working_dir.as_ref())?;
        let policy = Arc::new(build_policy(&working_dir, mode, &overrides));

        info!(working_dir = %working_dir.display(), mode = %mode, "Session started");
        Ok(Self {
            working_dir,
            mode,
            overrides,
            policy,
            started_at: Utc::now(),
        })
    }

    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    pub fn mode(&self) -> SecurityMode {
        self.mode
    }

    pub fn overrides(&self) -> &PolicyOverrides {
        &self.overrides
    }

    pub fn policy(&self) -> Arc<SandboxPolicy> {
        Arc::clone(&self.policy)
    }

    /// Move to `dir`, relative paths resolve against the current directory
    pub fn change_dir(&mut self, dir: impl AsRef<Path>) -> AgentResult<()> {
        let dir = dir.as_ref();
        let target = if dir.is_absolute() {
            dir.to_path_buf()
        } else {
            self.working_dir.join(dir)
        };

        self.working_dir = resolve_dir(&target)?;
        self.refresh_policy();
        debug!(working_dir = %self.working_dir.display(), "Changed working directory");
        Ok(())
    }

    pub fn set_mode(&mut self, mode: SecurityMode) {
        self.mode = mode;
        self.refresh_policy();
        debug!(mode = %mode, "Changed security mode");
    }

    /// Rebuild the policy, picking up a newly created `forbidden_area`
    pub fn refresh_policy(&mut self) {
        self.policy = Arc::new(build_policy(&self.working_dir, self.mode, &self.overrides));
    }
}

fn resolve_dir(dir: &Path) -> AgentResult<PathBuf> {
    let canonical = dir
        .canonicalize()
        .map_err(|e| AgentError::Configuration(format!("working directory {}: {}", dir.display(), e)))?;

    if !canonical.is_dir() {
        return Err(AgentError::Configuration(format!(
            "working directory {} is not a directory",
            canonical.display()
        )));
    }
    Ok(canonical)
}
