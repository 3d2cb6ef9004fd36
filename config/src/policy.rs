//! Policy file schema.

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AllowedCommand {
    #[serde(default)]
    pub path_constrained: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CredentialPattern {
    pub id: String,
    pub regex: String,
    #[serde(default)]
    pub allowlist_substrings: Vec<String>,
}

/// Deserialized form of the YAML policy file. Unknown top-level keys are
/// rejected at load.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PolicyFile {
    #[serde(default)]
    pub writable_paths: Vec<String>,
    #[serde(default)]
    pub read_allowed_paths: Vec<String>,
    #[serde(default)]
    pub blocked_paths: Vec<String>,
    #[serde(default)]
    pub allowed_commands: HashMap<String, AllowedCommand>,
    #[serde(default)]
    pub blocked_patterns: Vec<String>,
    #[serde(default)]
    pub credential_patterns: Vec<CredentialPattern>,
    #[serde(default)]
    pub sensitive_paths: Vec<String>,
    #[serde(default)]
    pub network_allowlist: Vec<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum PolicyFileError {
    #[error("failed to read policy file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse policy file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },
}

impl PolicyFile {
    pub fn load(path: &Path) -> Result<Self, PolicyFileError> {
        let raw = std::fs::read_to_string(path).map_err(|source| PolicyFileError::Io {
            path: path.display().to_string(),
            source,
        })?;
        serde_yaml::from_str(&raw).map_err(|source| PolicyFileError::Parse {
            path: path.display().to_string(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loads_minimal_policy_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("policy.yaml");
        std::fs::write(
            &path,
            r"
writable_paths:
  - /workspace/**
blocked_paths:
  - /etc/shadow
allowed_commands:
  cat:
    path_constrained: true
  ls:
    path_constrained: true
blocked_patterns:
  - '&&'
credential_patterns:
  - id: aws_access_key
    regex: 'AKIA[0-9A-Z]{16}'
sensitive_paths:
  - /etc/shadow
network_allowlist: []
",
        )
        .unwrap();

        let policy = PolicyFile::load(&path).unwrap();
        assert_eq!(policy.writable_paths, vec!["/workspace/**".to_string()]);
        assert!(policy.allowed_commands["cat"].path_constrained);
    }

    #[test]
    fn rejects_unknown_top_level_key() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("policy.yaml");
        std::fs::write(&path, "not_a_real_key: true\n").unwrap();
        assert!(PolicyFile::load(&path).is_err());
    }
}
