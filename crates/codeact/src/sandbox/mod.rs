//! Sandbox policy for executed code
//!
//! A `SecurityMode` preset is turned into a concrete `SandboxPolicy` by
//! [`build_policy`]. The policy is handed to a [`SandboxEnforcer`], which
//! wraps commands so the rules hold at spawn time.

mod enforcer;
mod policy;

pub use enforcer::{
    shell_quote, BubblewrapEnforcer, EnforcerKind, FirejailEnforcer, SandboxEnforcer, UnconfinedEnforcer,
};
pub use policy::{build_policy, FORBIDDEN_AREA};

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;

use crate::error::AgentError;

/// Coarse preset controlling how much the executed code may touch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SecurityMode {
    /// Workspace and temp only, no tool caches
    Strict,
    /// Workspace, temp and developer caches
    #[default]
    Moderate,
    /// Same paths as Moderate, but every snippet is confirmed by the user first
    Inquire,
}

impl SecurityMode {
    pub const ALL: [SecurityMode; 3] = [SecurityMode::Strict, SecurityMode::Moderate, SecurityMode::Inquire];

    /// Whether developer cache directories are writable
    pub fn allows_tool_caches(&self) -> bool {
        !matches!(self, SecurityMode::Strict)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SecurityMode::Strict => "strict",
            SecurityMode::Moderate => "moderate",
            SecurityMode::Inquire => "inquire",
        }
    }
}

impl std::fmt::Display for SecurityMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SecurityMode {
    type Err = AgentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "strict" => Ok(SecurityMode::Strict),
            "moderate" => Ok(SecurityMode::Moderate),
            "inquire" => Ok(SecurityMode::Inquire),
            other => Err(AgentError::Configuration(format!(
                "unknown security mode '{}' (expected strict, moderate or inquire)",
                other
            ))),
        }
    }
}

/// Caller additions applied on top of a mode preset
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyOverrides {
    pub extra_allow_write: Vec<String>,
    pub extra_deny_read: Vec<String>,
    pub extra_deny_write: Vec<String>,
    /// Added to the loopback defaults
    pub allowed_domains: Vec<String>,
    pub denied_domains: Vec<String>,
    pub allow_local_binding: bool,
}

/// Concrete filesystem and network rules for one working directory.
///
/// Built once by [`build_policy`] and never mutated; share it through an `Arc`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SandboxPolicy {
    pub allow_write: Vec<String>,
    pub deny_write: Vec<String>,
    pub deny_read: Vec<String>,
    pub allowed_domains: Vec<String>,
    pub denied_domains: Vec<String>,
    pub allow_local_binding: bool,
}

impl SandboxPolicy {
    /// Deny rules win over allow rules
    pub fn can_write(&self, path: &Path) -> bool {
        !any_path_match(&self.deny_write, path) && any_path_match(&self.allow_write, path)
    }

    pub fn can_read(&self, path: &Path) -> bool {
        !any_path_match(&self.deny_read, path)
    }

    /// Denied domains win over allowed ones
    pub fn allows_domain(&self, host: &str) -> bool {
        let host = host.trim().trim_end_matches('.');
        !self.denied_domains.iter().any(|d| domain_matches(d, host))
            && self.allowed_domains.iter().any(|d| domain_matches(d, host))
    }

    /// True when nothing beyond the loopback interface is reachable
    pub fn loopback_only(&self) -> bool {
        self.allowed_domains.iter().all(|d| is_loopback(d))
    }
}

pub(crate) fn is_loopback(host: &str) -> bool {
    matches!(host, "localhost" | "127.0.0.1" | "::1")
}

/// Whether `pattern` covers `path`, either as a glob or as a directory prefix
pub fn path_matches(pattern: &str, path: &Path) -> bool {
    if path.starts_with(pattern) {
        return true;
    }
    match glob::Pattern::new(pattern) {
        Ok(p) => p.matches_path(path),
        Err(_) => false,
    }
}

fn any_path_match(patterns: &[String], path: &Path) -> bool {
    patterns.iter().any(|p| path_matches(p, path))
}

/// Exact or dot-suffix match; `*.example.com` covers subdomains only
pub fn domain_matches(entry: &str, host: &str) -> bool {
    let entry = entry.trim().trim_end_matches('.').to_lowercase();
    let host = host.to_lowercase();

    if let Some(base) = entry.strip_prefix("*.") {
        return host.ends_with(&format!(".{}", base));
    }

    host == entry || host.ends_with(&format!(".{}", entry))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_from_str() {
        assert_eq!("Strict".parse::<SecurityMode>().unwrap(), SecurityMode::Strict);
        assert_eq!(" inquire ".parse::<SecurityMode>().unwrap(), SecurityMode::Inquire);
        let err = "paranoid".parse::<SecurityMode>().unwrap_err();
        assert!(matches!(err, AgentError::Configuration(_)));
    }

    #[test]
    fn test_mode_display_round_trips() {
        for mode in SecurityMode::ALL {
            assert_eq!(mode.to_string().parse::<SecurityMode>().unwrap(), mode);
        }
    }

    #[test]
    fn test_path_matches_prefix_and_glob() {
        assert!(path_matches("/etc", Path::new("/etc/hosts")));
        assert!(!path_matches("/etc", Path::new("/etcetera")));
        assert!(path_matches("/home/u/.ssh/id_*", Path::new("/home/u/.ssh/id_rsa")));
        assert!(!path_matches("/home/u/.ssh/id_*", Path::new("/home/u/.ssh/known_hosts")));
    }

    #[test]
    fn test_deny_write_wins() {
        let policy = SandboxPolicy {
            allow_write: vec!["/work".into()],
            deny_write: vec!["/work/secret".into()],
            ..Default::default()
        };

        assert!(policy.can_write(Path::new("/work/src/main.rs")));
        assert!(!policy.can_write(Path::new("/work/secret/key")));
        assert!(!policy.can_write(Path::new("/elsewhere")));
    }

    #[test]
    fn test_domain_matching() {
        assert!(domain_matches("example.com", "example.com"));
        assert!(domain_matches("example.com", "API.example.com"));
        assert!(!domain_matches("example.com", "badexample.com"));
        assert!(domain_matches("*.example.com", "a.example.com"));
        assert!(!domain_matches("*.example.com", "example.com"));
    }

    #[test]
    fn test_denied_domain_wins() {
        let policy = SandboxPolicy {
            allowed_domains: vec!["github.com".into()],
            denied_domains: vec!["gist.github.com".into()],
            ..Default::default()
        };

        assert!(policy.allows_domain("api.github.com"));
        assert!(!policy.allows_domain("gist.github.com"));
        assert!(!policy.allows_domain("example.org"));
    }
}
