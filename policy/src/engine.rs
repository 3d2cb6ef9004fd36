//! Deterministic path/command policy engine.
//!
//! Matching order for both `check_path` and `check_command` is fixed:
//! always-deny blacklist/denylist first, then the operation-specific
//! allowlist, then default deny. No caller can opt out of a step.

use std::collections::HashMap;
use std::path::Path;

use globset::{Glob, GlobSet, GlobSetBuilder};
use sentinel_config::{AllowedCommand, PolicyFile};
use sentinel_core::WorkspaceRoot;
use sentinel_scanners::{CredentialScanner, CredentialScannerError};
use sentinel_types::BlockReason;

use crate::blacklist::CommandBlacklist;
use crate::injection_patterns::{first_blocked_argument, first_blocked_substring};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Read,
    Write,
    Create,
}

#[derive(Debug, thiserror::Error)]
pub enum PolicyEngineError {
    #[error("invalid glob pattern {pattern:?} in policy file: {source}")]
    InvalidGlob {
        pattern: String,
        #[source]
        source: globset::Error,
    },
    #[error("invalid credential pattern in policy file: {0}")]
    InvalidCredentialPattern(#[from] CredentialScannerError),
}

fn build_glob_set(patterns: &[String]) -> Result<GlobSet, PolicyEngineError> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern).map_err(|source| PolicyEngineError::InvalidGlob {
            pattern: pattern.clone(),
            source,
        })?;
        builder.add(glob);
    }
    builder
        .build()
        .map_err(|source| PolicyEngineError::InvalidGlob {
            pattern: patterns.join(","),
            source,
        })
}

pub struct PolicyEngine {
    workspace: WorkspaceRoot,
    writable: GlobSet,
    read_allowed: GlobSet,
    blocked_paths: GlobSet,
    sensitive_paths: GlobSet,
    allowed_commands: HashMap<String, AllowedCommand>,
    blocked_patterns: Vec<String>,
    blacklist: CommandBlacklist,
    credential_scanner: CredentialScanner,
}

impl PolicyEngine {
    pub fn new(workspace: WorkspaceRoot, policy: &PolicyFile) -> Result<Self, PolicyEngineError> {
        Ok(Self {
            workspace,
            writable: build_glob_set(&policy.writable_paths)?,
            read_allowed: build_glob_set(&policy.read_allowed_paths)?,
            blocked_paths: build_glob_set(&policy.blocked_paths)?,
            sensitive_paths: build_glob_set(&policy.sensitive_paths)?,
            allowed_commands: policy.allowed_commands.clone(),
            blocked_patterns: policy.blocked_patterns.clone(),
            blacklist: CommandBlacklist::with_defaults(),
            credential_scanner: CredentialScanner::with_operator_patterns(&policy.credential_patterns)?,
        })
    }

    #[must_use]
    pub fn workspace(&self) -> &WorkspaceRoot {
        &self.workspace
    }

    /// The credential scanner built from this policy's operator-supplied
    /// patterns plus the built-in set, for callers that run scans gated on
    /// policy configuration rather than the default scanner.
    #[must_use]
    pub fn credential_scanner(&self) -> &CredentialScanner {
        &self.credential_scanner
    }

    /// Is `path` under the sensitive-paths catalog (credentials, shadow
    /// files, ssh keys, etc.)? Used by the sensitive-path scanner
    /// independently of read/write permission.
    #[must_use]
    pub fn is_sensitive(&self, path: &Path) -> bool {
        self.sensitive_paths.is_match(path)
    }

    /// Check whether `raw_path` may be used for `operation`, normalizing it
    /// against the workspace root first. Order: null-byte/traversal rejection
    /// (via `WorkspaceRoot::normalize`) -> blocked-paths denylist ->
    /// operation-specific allowlist -> default deny.
    pub fn check_path(&self, raw_path: &str, operation: Operation) -> Result<(), BlockReason> {
        let normalized = self.workspace.normalize(raw_path).map_err(|source| {
            BlockReason::policy("path_normalization", source.to_string())
        })?;

        if self.blocked_paths.is_match(&normalized) {
            return Err(BlockReason::policy(
                "blocked_path",
                format!("{} is on the blocked-paths list", normalized.display()),
            ));
        }

        let allowed = match operation {
            Operation::Read => self.read_allowed.is_match(&normalized) || self.writable.is_match(&normalized),
            Operation::Write | Operation::Create => self.writable.is_match(&normalized),
        };

        if allowed {
            Ok(())
        } else {
            Err(BlockReason::policy(
                "path_not_allowlisted",
                format!("{} is not in the {operation:?} allowlist", normalized.display()),
            ))
        }
    }

    /// Check whether `command` may be executed. Order: chaining/substitution
    /// substrings -> always-deny blacklist -> command-head allowlist ->
    /// (for `path_constrained` commands) every path-like argument through
    /// `check_path`.
    pub fn check_command(&self, command: &str) -> Result<(), BlockReason> {
        if let Some(pattern) = first_blocked_substring(command) {
            return Err(BlockReason::policy(
                "blocked_command_pattern",
                format!("command contains disallowed sequence {pattern:?}"),
            ));
        }
        for pattern in &self.blocked_patterns {
            if command.contains(pattern.as_str()) {
                return Err(BlockReason::policy(
                    "blocked_command_pattern",
                    format!("command contains disallowed sequence {pattern:?}"),
                ));
            }
        }
        if let Some(reason) = self.blacklist.check(command) {
            return Err(BlockReason::policy("command_blacklist", reason));
        }

        let tokens = shell_words::split(command).map_err(|source| {
            BlockReason::policy("command_tokenization", source.to_string())
        })?;
        let Some(head) = tokens.first() else {
            return Err(BlockReason::policy("empty_command", "command has no tokens"));
        };
        let args = &tokens[1..];

        if let Some(pattern) = first_blocked_argument(args) {
            return Err(BlockReason::policy(
                "blocked_command_argument",
                format!("argument {pattern:?} is not permitted"),
            ));
        }

        let Some(allowed) = self.allowed_commands.get(head.as_str()) else {
            return Err(BlockReason::policy(
                "command_not_allowlisted",
                format!("{head} is not an allowlisted command"),
            ));
        };

        if allowed.path_constrained {
            for arg in args {
                if looks_like_path(arg) {
                    self.check_path(arg, Operation::Read)?;
                }
            }
        }

        Ok(())
    }
}

/// Heuristic: an argument that isn't an option flag and contains a path
/// separator or a dot (plausible filename) is treated as a path argument
/// for `path_constrained` commands.
fn looks_like_path(arg: &str) -> bool {
    !arg.starts_with('-') && (arg.contains('/') || arg.contains('.'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use sentinel_config::PolicyFile;
    use std::collections::HashMap;

    fn test_engine(dir: &std::path::Path) -> PolicyEngine {
        let workspace = WorkspaceRoot::new(dir).unwrap();
        let mut allowed_commands = HashMap::new();
        allowed_commands.insert("cat".to_string(), AllowedCommand { path_constrained: true });
        allowed_commands.insert("ls".to_string(), AllowedCommand { path_constrained: true });
        allowed_commands.insert("echo".to_string(), AllowedCommand { path_constrained: false });
        let policy = PolicyFile {
            writable_paths: vec!["**".to_string()],
            read_allowed_paths: vec!["**".to_string()],
            blocked_paths: vec!["**/secrets/**".to_string()],
            allowed_commands,
            blocked_patterns: Vec::new(),
            credential_patterns: Vec::new(),
            sensitive_paths: vec!["**/.ssh/**".to_string()],
            network_allowlist: Vec::new(),
        };
        PolicyEngine::new(workspace, &policy).unwrap()
    }

    #[test]
    fn allows_path_within_writable_root() {
        let dir = tempfile::tempdir().unwrap();
        let engine = test_engine(dir.path());
        assert!(engine.check_path("notes.txt", Operation::Write).is_ok());
    }

    #[test]
    fn denies_blocked_path_even_if_writable() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("secrets")).unwrap();
        let engine = test_engine(dir.path());
        assert!(engine.check_path("secrets/key.pem", Operation::Read).is_err());
    }

    #[test]
    fn denies_traversal_outside_root() {
        let dir = tempfile::tempdir().unwrap();
        let engine = test_engine(dir.path());
        assert!(engine.check_path("../../etc/passwd", Operation::Read).is_err());
    }

    #[test]
    fn allows_allowlisted_command() {
        let dir = tempfile::tempdir().unwrap();
        let engine = test_engine(dir.path());
        assert!(engine.check_command("echo hello").is_ok());
    }

    #[test]
    fn denies_non_allowlisted_command() {
        let dir = tempfile::tempdir().unwrap();
        let engine = test_engine(dir.path());
        assert!(engine.check_command("curl http://evil.example").is_err());
    }

    #[test]
    fn denies_command_chaining() {
        let dir = tempfile::tempdir().unwrap();
        let engine = test_engine(dir.path());
        assert!(engine.check_command("echo hi && rm -rf /").is_err());
    }

    #[test]
    fn denies_path_constrained_command_escaping_root() {
        let dir = tempfile::tempdir().unwrap();
        let engine = test_engine(dir.path());
        assert!(engine.check_command("cat ../../etc/passwd").is_err());
    }

    #[test]
    fn denies_safe_head_with_one_unsafe_argument_among_several() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("notes.txt"), "hi").unwrap();
        let engine = test_engine(dir.path());
        assert!(engine.check_command("cat notes.txt /etc/shadow").is_err());
    }

    #[test]
    fn denies_blacklisted_command_even_if_head_allowlisted() {
        let dir = tempfile::tempdir().unwrap();
        let mut allowed_commands = HashMap::new();
        allowed_commands.insert("rm".to_string(), AllowedCommand { path_constrained: true });
        let workspace = WorkspaceRoot::new(dir.path()).unwrap();
        let policy = PolicyFile {
            writable_paths: vec!["**".to_string()],
            read_allowed_paths: vec!["**".to_string()],
            blocked_paths: Vec::new(),
            allowed_commands,
            blocked_patterns: Vec::new(),
            credential_patterns: Vec::new(),
            sensitive_paths: Vec::new(),
            network_allowlist: Vec::new(),
        };
        let engine = PolicyEngine::new(workspace, &policy).unwrap();
        assert!(engine.check_command("rm -rf /").is_err());
    }
}
