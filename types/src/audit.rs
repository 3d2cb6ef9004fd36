//! Audit log records.
//!
//! The distilled spec names an `audit_log` table (§6) without defining its
//! row shape; this fills that gap so the table is actually populated by
//! every PolicyDenied / ScanBlocked / TrustGateDenied / AuthError occurrence.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditKind {
    PolicyDenied,
    ScanBlocked,
    TrustGateDenied,
    PlannerRefused,
    AuthError,
    Fatal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    pub timestamp_unix_ms: i64,
    pub actor: String,
    pub kind: AuditKind,
    pub detail: String,
}
