//! Approval queue: durable `PendingApproval` records keyed by
//! an unguessable `ApprovalId` (128-bit v4 UUID). Expired entries are
//! reaped lazily on read, never eagerly, so a slow operator never races a
//! background sweep.

use std::path::Path;

use parking_lot::Mutex;
use rusqlite::{OptionalExtension, params};
use sentinel_types::{ApprovalId, ApprovalStatus, PendingApproval};

use crate::sqlite_util::open_secure_db;

#[derive(Debug, thiserror::Error)]
pub enum ApprovalQueueError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS approvals (
    approval_id TEXT PRIMARY KEY,
    approval_json TEXT NOT NULL
);
";

pub struct ApprovalQueue {
    conn: Mutex<rusqlite::Connection>,
}

/// Result of `check`: the approval's current status plus the plan and an
/// optional reason, or `NotFound`/`Expired` with no plan.
pub struct ApprovalCheck {
    pub status: ApprovalStatus,
    pub approval: Option<PendingApproval>,
}

impl ApprovalQueue {
    pub fn open(path: &Path) -> Result<Self, ApprovalQueueError> {
        let conn = open_secure_db(path).map_err(|e| {
            rusqlite::Error::InvalidPath(std::path::PathBuf::from(e.to_string()))
        })?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    #[must_use]
    pub fn open_in_memory() -> Self {
        let conn = rusqlite::Connection::open_in_memory().expect("in-memory sqlite always opens");
        conn.execute_batch(SCHEMA).expect("schema is valid SQL");
        Self { conn: Mutex::new(conn) }
    }

    fn load(&self, id: ApprovalId) -> Result<Option<PendingApproval>, ApprovalQueueError> {
        let conn = self.conn.lock();
        let json: Option<String> = conn
            .query_row(
                "SELECT approval_json FROM approvals WHERE approval_id = ?1",
                params![id.to_string()],
                |row| row.get(0),
            )
            .optional()?;
        json.map(|j| serde_json::from_str(&j)).transpose().map_err(Into::into)
    }

    fn save(&self, approval: &PendingApproval) -> Result<(), ApprovalQueueError> {
        let json = serde_json::to_string(approval)?;
        let conn = self.conn.lock();
        conn.execute(
            "INSERT OR REPLACE INTO approvals (approval_id, approval_json) VALUES (?1, ?2)",
            params![approval.approval_id.to_string(), json],
        )?;
        Ok(())
    }

    pub fn create(&self, approval: PendingApproval) -> Result<ApprovalId, ApprovalQueueError> {
        let id = approval.approval_id;
        self.save(&approval)?;
        Ok(id)
    }

    /// Reads the current status, expiring the entry in place (and
    /// persisting the `Expired` status) if its ttl has elapsed.
    pub fn check(
        &self,
        id: ApprovalId,
        now_unix_ms: i64,
    ) -> Result<ApprovalCheck, ApprovalQueueError> {
        let Some(mut approval) = self.load(id)? else {
            return Ok(ApprovalCheck {
                status: ApprovalStatus::NotFound,
                approval: None,
            });
        };

        if approval.status == ApprovalStatus::Pending && approval.is_expired_at(now_unix_ms) {
            approval.status = ApprovalStatus::Expired;
            self.save(&approval)?;
        }

        Ok(ApprovalCheck {
            status: approval.status,
            approval: Some(approval),
        })
    }

    /// Submits an operator decision. No-op (returns the current state) if
    /// the approval is already in a terminal state or does not exist.
    pub fn submit(
        &self,
        id: ApprovalId,
        granted: bool,
        reason: Option<String>,
        now_unix_ms: i64,
    ) -> Result<ApprovalCheck, ApprovalQueueError> {
        let checked = self.check(id, now_unix_ms)?;
        let Some(mut approval) = checked.approval else {
            return Ok(checked);
        };
        if approval.status.is_terminal() {
            return Ok(ApprovalCheck {
                status: approval.status,
                approval: Some(approval),
            });
        }

        approval.status = if granted {
            ApprovalStatus::Granted
        } else {
            ApprovalStatus::Denied
        };
        approval.reason = reason;
        self.save(&approval)?;

        Ok(ApprovalCheck {
            status: approval.status,
            approval: Some(approval),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sentinel_types::{Plan, SessionId};
    use std::time::Duration;

    fn sample_approval() -> PendingApproval {
        PendingApproval::new(
            Plan { summary: "noop".into(), steps: vec![] },
            "source-a",
            "do the thing",
            SessionId::generate(),
            0,
            Duration::from_secs(60),
        )
    }

    #[test]
    fn create_then_check_is_pending() {
        let queue = ApprovalQueue::open_in_memory();
        let approval = sample_approval();
        let id = queue.create(approval).unwrap();
        let check = queue.check(id, 1000).unwrap();
        assert_eq!(check.status, ApprovalStatus::Pending);
    }

    #[test]
    fn check_after_ttl_reports_expired() {
        let queue = ApprovalQueue::open_in_memory();
        let approval = sample_approval();
        let id = queue.create(approval).unwrap();
        let check = queue.check(id, 120_000).unwrap();
        assert_eq!(check.status, ApprovalStatus::Expired);
    }

    #[test]
    fn submit_grants_and_is_terminal() {
        let queue = ApprovalQueue::open_in_memory();
        let approval = sample_approval();
        let id = queue.create(approval).unwrap();
        let check = queue.submit(id, true, None, 1000).unwrap();
        assert_eq!(check.status, ApprovalStatus::Granted);

        let second = queue.submit(id, false, Some("too late".into()), 2000).unwrap();
        assert_eq!(second.status, ApprovalStatus::Granted);
    }

    #[test]
    fn unknown_id_is_not_found() {
        let queue = ApprovalQueue::open_in_memory();
        let check = queue.check(ApprovalId::generate(), 0).unwrap();
        assert_eq!(check.status, ApprovalStatus::NotFound);
    }
}
