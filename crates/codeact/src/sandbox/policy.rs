//! Security mode presets turned into concrete rules

use std::path::{Path, PathBuf};
use tracing::debug;

use super::{PolicyOverrides, SandboxPolicy, SecurityMode};

/// A directory with this name inside the working directory is never writable
pub const FORBIDDEN_AREA: &str = "forbidden_area";

const LOOPBACK_DOMAINS: [&str; 3] = ["localhost", "127.0.0.1", "::1"];

#[cfg(target_os = "macos")]
const PLATFORM_WRITABLE: &[&str] = &[
    "/dev/null",
    "/dev/stdout",
    "/dev/stderr",
    "/dev/tty",
    "/private/tmp",
    "/private/var/folders",
];

#[cfg(not(target_os = "macos"))]
const PLATFORM_WRITABLE: &[&str] = &["/dev/null", "/dev/stdout", "/dev/stderr", "/dev/tty"];

/// Package manager and toolchain caches, relative to the home directory
const TOOL_CACHES: &[&str] = &[
    ".cache",
    ".npm",
    ".yarn",
    ".cargo/registry",
    ".cargo/git",
    ".rustup",
    ".m2/repository",
    ".gradle/caches",
    ".local/share/pnpm",
];

/// Credential files, relative to the home directory
const CREDENTIAL_PATTERNS: &[&str] = &[
    ".ssh/id_*",
    ".aws/credentials",
    ".aws/config",
    ".config/gcloud/**",
    ".azure/**",
    ".kube/config",
    ".docker/config.json",
    ".netrc",
];

const STRICT_DENY_READ: &[&str] = &["/etc/passwd", "/etc/shadow"];

const SYSTEM_DENY_WRITE: &[&str] = &["/etc", "/bin", "/sbin", "/usr/bin", "/usr/sbin", "/boot", "/proc", "/sys"];

const HOME_DENY_WRITE: &[&str] = &[".ssh", ".aws", ".kube"];

/// Build the policy for `working_dir` under `mode`.
///
/// Reads the filesystem once to look for `<working_dir>/forbidden_area`;
/// call it again whenever the working directory changes.
pub fn build_policy(working_dir: &Path, mode: SecurityMode, overrides: &PolicyOverrides) -> SandboxPolicy {
    build_policy_with_home(working_dir, mode, overrides, dirs::home_dir().as_deref())
}

pub(crate) fn build_policy_with_home(
    working_dir: &Path,
    mode: SecurityMode,
    overrides: &PolicyOverrides,
    home: Option<&Path>,
) -> SandboxPolicy {
    let mut policy = SandboxPolicy::default();

    // Writable paths
    let temp = std::env::temp_dir();
    push_path(&mut policy.allow_write, &temp);
    if let Ok(canonical) = temp.canonicalize() {
        push_path(&mut policy.allow_write, &canonical);
    }
    push_path(&mut policy.allow_write, working_dir);
    for path in PLATFORM_WRITABLE {
        push_unique(&mut policy.allow_write, path.to_string());
    }
    if mode.allows_tool_caches() {
        if let Some(home) = home {
            for cache in TOOL_CACHES {
                push_path(&mut policy.allow_write, &home.join(cache));
            }
        }
    }
    for extra in &overrides.extra_allow_write {
        push_unique(&mut policy.allow_write, expand_home(extra, home));
    }

    // Unreadable paths
    if let Some(home) = home {
        for pattern in CREDENTIAL_PATTERNS {
            push_path(&mut policy.deny_read, &home.join(pattern));
        }
    }
    if mode == SecurityMode::Strict {
        for path in STRICT_DENY_READ {
            push_unique(&mut policy.deny_read, path.to_string());
        }
    }
    for extra in &overrides.extra_deny_read {
        push_unique(&mut policy.deny_read, expand_home(extra, home));
    }

    // Unwritable paths
    for path in SYSTEM_DENY_WRITE {
        push_unique(&mut policy.deny_write, path.to_string());
    }
    if let Some(home) = home {
        for dir in HOME_DENY_WRITE {
            push_path(&mut policy.deny_write, &home.join(dir));
        }
    }
    for extra in &overrides.extra_deny_write {
        push_unique(&mut policy.deny_write, expand_home(extra, home));
    }
    let forbidden = working_dir.join(FORBIDDEN_AREA);
    if forbidden.exists() {
        debug!(path = %forbidden.display(), "Working directory has a forbidden area");
        push_path(&mut policy.deny_write, &forbidden);
    }

    // Network
    for domain in LOOPBACK_DOMAINS {
        push_unique(&mut policy.allowed_domains, domain.to_string());
    }
    for domain in &overrides.allowed_domains {
        push_unique(&mut policy.allowed_domains, domain.trim().to_lowercase());
    }
    for domain in &overrides.denied_domains {
        push_unique(&mut policy.denied_domains, domain.trim().to_lowercase());
    }
    policy.allow_local_binding = overrides.allow_local_binding;

    debug!(
        mode = %mode,
        working_dir = %working_dir.display(),
        allow_write = policy.allow_write.len(),
        deny_write = policy.deny_write.len(),
        deny_read = policy.deny_read.len(),
        allowed_domains = policy.allowed_domains.len(),
        "Built sandbox policy"
    );

    policy
}

fn push_unique(list: &mut Vec<String>, value: String) {
    if !value.is_empty() && !list.contains(&value) {
        list.push(value);
    }
}

fn push_path(list: &mut Vec<String>, path: &Path) {
    push_unique(list, path.to_string_lossy().into_owned());
}

/// Expand a leading `~/` against the home directory
fn expand_home(pattern: &str, home: Option<&Path>) -> String {
    match (pattern.strip_prefix("~/"), home) {
        (Some(rest), Some(home)) => home.join(rest).to_string_lossy().into_owned(),
        _ if pattern == "~" => home
            .map(|h| h.to_string_lossy().into_owned())
            .unwrap_or_else(|| pattern.to_string()),
        _ => PathBuf::from(pattern).to_string_lossy().into_owned(),
    }
}
