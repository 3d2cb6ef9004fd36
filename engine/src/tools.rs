//! Tool executor: the closed set of tools a plan's
//! `ToolCall` steps may invoke, each gated by the policy engine before any
//! filesystem or process access.

use std::collections::HashSet;

use sentinel_core::digest_hex;
use sentinel_policy::{Operation, PolicyEngine};
use sentinel_store::{ProvenanceStore, ProvenanceStoreError};
use sentinel_types::{BlockReason, DataId, DataSource, TrustLevel};
use serde_json::Value;

#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("policy denied: {0}")]
    PolicyDenied(#[from] BlockReason),
    #[error("unknown tool {0:?}")]
    UnknownTool(String),
    #[error("missing required argument {0:?}")]
    MissingArgument(&'static str),
    #[error("unexpected argument {0:?}")]
    UnexpectedArgument(String),
    #[error("argument {0:?} carries a disallowed flag")]
    DangerousFlag(String),
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("provenance store error: {0}")]
    Provenance(#[from] ProvenanceStoreError),
}

impl ToolError {
    /// Policy denial is a terminal block for the step; every
    /// other variant is a transient step failure with no retry.
    #[must_use]
    pub fn is_terminal_block(&self) -> bool {
        matches!(self, Self::PolicyDenied(_))
    }
}

pub enum ToolOutcome {
    FileWritten { path: String },
    FileRead { path: String, content: String, trust: TrustLevel, data_id: DataId },
    DirectoryCreated { path: String },
    DirectoryListed { path: String, entries: Vec<String> },
    CommandOutput { stdout: String, stderr: String, exit_code: i32 },
}

/// Flags with no legitimate use from a constrained shell/container tool
///: host mounts, privileged mode, host namespace sharing,
/// capability grants, security-opt overrides, device passthrough.
const DANGEROUS_FLAG_PREFIXES: &[&str] = &[
    "--privileged",
    "--cap-add",
    "--security-opt",
    "--device",
    "--network=host",
    "--pid=host",
    "--ipc=host",
    "--userns=host",
    "-v",
    "--volume",
    "--mount",
];

fn reject_dangerous_flags(args: &[String]) -> Result<(), ToolError> {
    for arg in args {
        if DANGEROUS_FLAG_PREFIXES.iter().any(|flag| arg.starts_with(flag)) {
            return Err(ToolError::DangerousFlag(arg.clone()));
        }
    }
    Ok(())
}

#[must_use]
pub fn known_tool_names() -> HashSet<String> {
    ["file_write", "file_read", "mkdir", "shell", "list_directory"]
        .into_iter()
        .map(str::to_string)
        .collect()
}

/// Workspace-relative paths a tool call's arguments mention, so the
/// orchestrator can pull in the provenance of any file the call reads
/// without the caller having explicitly bound it to a `${variable}`
/// reference. Without this, a `shell` call naming a just-written file by
/// its literal path instead of a variable would slip past the trust gate.
#[must_use]
pub fn referenced_paths(tool_name: &str, arguments: &Value) -> Vec<String> {
    match tool_name {
        "file_read" | "file_write" | "mkdir" | "list_directory" => arguments
            .get("path")
            .and_then(Value::as_str)
            .map(|path| vec![path.to_string()])
            .unwrap_or_default(),
        "shell" => arguments
            .get("command")
            .and_then(Value::as_str)
            .map(|command| {
                shell_words::split(command)
                    .unwrap_or_default()
                    .into_iter()
                    .filter(|token| !token.starts_with('-') && (token.contains('/') || token.contains('.')))
                    .collect()
            })
            .unwrap_or_default(),
        _ => Vec::new(),
    }
}

fn string_arg<'a>(arguments: &'a Value, name: &'static str) -> Result<&'a str, ToolError> {
    arguments
        .get(name)
        .and_then(Value::as_str)
        .ok_or(ToolError::MissingArgument(name))
}

fn reject_unknown_keys(arguments: &Value, allowed: &[&str]) -> Result<(), ToolError> {
    let Some(object) = arguments.as_object() else {
        return Ok(());
    };
    for key in object.keys() {
        if !allowed.contains(&key.as_str()) {
            return Err(ToolError::UnexpectedArgument(key.clone()));
        }
    }
    Ok(())
}

pub struct ToolExecutor<'a> {
    policy: &'a PolicyEngine,
    provenance: &'a ProvenanceStore,
}

impl<'a> ToolExecutor<'a> {
    #[must_use]
    pub fn new(policy: &'a PolicyEngine, provenance: &'a ProvenanceStore) -> Self {
        Self { policy, provenance }
    }

    /// `input_data_id` is the data id the orchestrator already proved
    /// trust-safe for this call (the content being written, for
    /// `file_write`); ignored by tools with no such input.
    pub fn execute(
        &self,
        tool_name: &str,
        arguments: &Value,
        input_data_id: Option<DataId>,
    ) -> Result<ToolOutcome, ToolError> {
        match tool_name {
            "file_write" => self.file_write(arguments, input_data_id),
            "file_read" => self.file_read(arguments),
            "mkdir" => self.mkdir(arguments),
            "shell" => self.shell(arguments),
            "list_directory" => self.list_directory(arguments),
            other => Err(ToolError::UnknownTool(other.to_string())),
        }
    }

    fn file_write(&self, arguments: &Value, input_data_id: Option<DataId>) -> Result<ToolOutcome, ToolError> {
        reject_unknown_keys(arguments, &["path", "content"])?;
        let path = string_arg(arguments, "path")?;
        let content = string_arg(arguments, "content")?;
        self.policy.check_path(path, Operation::Write)?;

        let resolved = self.policy.workspace().normalize(path).map_err(|source| {
            BlockReason::policy("path_normalization", source.to_string())
        })?;
        std::fs::write(&resolved, content)?;

        if let Some(writer) = input_data_id {
            self.provenance.record_file_write(path, writer)?;
        }
        Ok(ToolOutcome::FileWritten { path: path.to_string() })
    }

    fn file_read(&self, arguments: &Value) -> Result<ToolOutcome, ToolError> {
        reject_unknown_keys(arguments, &["path"])?;
        let path = string_arg(arguments, "path")?;
        self.policy.check_path(path, Operation::Read)?;

        let resolved = self.policy.workspace().normalize(path).map_err(|source| {
            BlockReason::policy("path_normalization", source.to_string())
        })?;
        let content = std::fs::read_to_string(&resolved)?;

        let writer = self.provenance.get_file_writer(path)?;
        let trust = match writer {
            Some(writer_id) => self
                .provenance
                .get(writer_id)?
                .map(|data| data.trust)
                .unwrap_or(TrustLevel::Untrusted),
            None => TrustLevel::Trusted,
        };
        let data_id = self.provenance.create_tagged_data(
            DataSource::File,
            trust,
            digest_hex(&content),
            writer.into_iter().collect(),
        )?;

        Ok(ToolOutcome::FileRead { path: path.to_string(), content, trust, data_id })
    }

    fn mkdir(&self, arguments: &Value) -> Result<ToolOutcome, ToolError> {
        reject_unknown_keys(arguments, &["path"])?;
        let path = string_arg(arguments, "path")?;
        self.policy.check_path(path, Operation::Create)?;

        let resolved = self.policy.workspace().normalize(path).map_err(|source| {
            BlockReason::policy("path_normalization", source.to_string())
        })?;
        std::fs::create_dir_all(&resolved)?;
        Ok(ToolOutcome::DirectoryCreated { path: path.to_string() })
    }

    fn list_directory(&self, arguments: &Value) -> Result<ToolOutcome, ToolError> {
        reject_unknown_keys(arguments, &["path"])?;
        let path = string_arg(arguments, "path")?;
        self.policy.check_path(path, Operation::Read)?;

        let resolved = self.policy.workspace().normalize(path).map_err(|source| {
            BlockReason::policy("path_normalization", source.to_string())
        })?;
        let mut entries: Vec<String> = std::fs::read_dir(&resolved)?
            .filter_map(Result::ok)
            .map(|entry| entry.file_name().to_string_lossy().into_owned())
            .collect();
        entries.sort();
        Ok(ToolOutcome::DirectoryListed { path: path.to_string(), entries })
    }

    fn shell(&self, arguments: &Value) -> Result<ToolOutcome, ToolError> {
        reject_unknown_keys(arguments, &["command", "flags"])?;
        let command = string_arg(arguments, "command")?;

        if let Some(flags) = arguments.get("flags") {
            let flags: Vec<String> = flags
                .as_array()
                .map(|items| items.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
                .unwrap_or_default();
            reject_dangerous_flags(&flags)?;
        }

        self.policy.check_command(command)?;

        let output = std::process::Command::new("sh")
            .arg("-c")
            .arg(command)
            .current_dir(self.policy.workspace().path())
            .output()?;
        Ok(ToolOutcome::CommandOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            exit_code: output.status.code().unwrap_or(-1),
        })
    }
}
