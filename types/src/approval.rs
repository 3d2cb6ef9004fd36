//! Approval queue records.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::ids::{ApprovalId, SessionId};
use crate::plan::Plan;

/// Terminal/non-terminal state of a [`PendingApproval`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalStatus {
    Pending,
    Granted,
    Denied,
    Expired,
    NotFound,
}

impl ApprovalStatus {
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Granted | Self::Denied | Self::Expired)
    }
}

/// A plan awaiting operator approval before execution resumes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingApproval {
    pub approval_id: ApprovalId,
    pub plan: Plan,
    pub source_key: String,
    pub user_request: String,
    pub session_id: SessionId,
    /// Milliseconds since the Unix epoch.
    pub created_at_unix_ms: i64,
    pub ttl: Duration,
    pub status: ApprovalStatus,
    pub reason: Option<String>,
}

impl PendingApproval {
    #[must_use]
    pub fn new(
        plan: Plan,
        source_key: impl Into<String>,
        user_request: impl Into<String>,
        session_id: SessionId,
        created_at_unix_ms: i64,
        ttl: Duration,
    ) -> Self {
        Self {
            approval_id: ApprovalId::generate(),
            plan,
            source_key: source_key.into(),
            user_request: user_request.into(),
            session_id,
            created_at_unix_ms,
            ttl,
            status: ApprovalStatus::Pending,
            reason: None,
        }
    }

    /// Whether this approval has aged past its ttl as of `now_unix_ms`:
    /// `(now - created_at) <= ttl` must hold for any `Pending` approval,
    /// so the queue rejects stale reads.
    #[must_use]
    pub fn is_expired_at(&self, now_unix_ms: i64) -> bool {
        let age_ms = now_unix_ms.saturating_sub(self.created_at_unix_ms);
        age_ms < 0 || (age_ms as u128) > self.ttl.as_millis()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dummy_plan() -> Plan {
        Plan {
            summary: "noop".into(),
            steps: vec![],
        }
    }

    #[test]
    fn fresh_approval_is_not_expired() {
        let approval = PendingApproval::new(
            dummy_plan(),
            "src-1",
            "request",
            SessionId::generate(),
            1_000,
            Duration::from_secs(60),
        );
        assert!(!approval.is_expired_at(1_500));
    }

    #[test]
    fn approval_past_ttl_is_expired() {
        let approval = PendingApproval::new(
            dummy_plan(),
            "src-1",
            "request",
            SessionId::generate(),
            1_000,
            Duration::from_secs(60),
        );
        assert!(approval.is_expired_at(1_000 + 61_000));
    }
}
