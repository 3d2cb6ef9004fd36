//! Structured block reasons.
//!
//! Replaces exception-driven block propagation with a value every layer can
//! construct, return, and log identically: policy denials, scan blocks, and
//! trust-gate denials all reduce to the same shape.

use serde::{Deserialize, Serialize};

use crate::scan::Severity;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockKind {
    PolicyDenied,
    ScanBlocked,
    TrustGateDenied,
}

/// `{scanner, rule_id, detail}` — the attribution every block carries so an
/// operator can tell exactly which layer fired.
#[derive(Debug, Clone, Serialize, Deserialize, thiserror::Error)]
#[error("{kind:?} by {scanner}: {detail}")]
pub struct BlockReason {
    pub kind: BlockKind,
    /// Scanner or policy-rule id that fired, e.g. `policy:blocked_command`
    /// or `credential_scanner`.
    pub scanner: String,
    pub detail: String,
    pub severity: Severity,
}

impl BlockReason {
    #[must_use]
    pub fn policy(rule_id: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            kind: BlockKind::PolicyDenied,
            scanner: format!("policy:{}", rule_id.into()),
            detail: detail.into(),
            severity: Severity::High,
        }
    }

    #[must_use]
    pub fn scan(scanner: impl Into<String>, detail: impl Into<String>, severity: Severity) -> Self {
        Self {
            kind: BlockKind::ScanBlocked,
            scanner: scanner.into(),
            detail: detail.into(),
            severity,
        }
    }

    #[must_use]
    pub fn trust_gate(detail: impl Into<String>) -> Self {
        Self {
            kind: BlockKind::TrustGateDenied,
            scanner: "provenance_trust_gate".to_string(),
            detail: detail.into(),
            severity: Severity::Critical,
        }
    }
}
