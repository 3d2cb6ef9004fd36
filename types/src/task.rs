//! Final result of one `handle_task` invocation.

use serde::{Deserialize, Serialize};

use crate::ids::ApprovalId;
use crate::session::ConversationAction;

/// High-level status of a completed or suspended task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Success,
    Blocked,
    Refused,
    AwaitingApproval,
    Error,
}

/// Result of executing one plan step, surfaced back to the API caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepResult {
    pub step_index: usize,
    pub description: String,
    pub succeeded: bool,
    pub detail: Option<String>,
}

/// Conversation-analyzer output attached to a [`TaskResult`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationSnapshot {
    pub action: ConversationAction,
    pub warnings: Vec<String>,
    pub risk_score: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskResult {
    pub task_id: String,
    pub status: TaskStatus,
    pub plan_summary: Option<String>,
    pub step_results: Vec<StepResult>,
    pub conversation: ConversationSnapshot,
    pub approval_id: Option<ApprovalId>,
    /// Populated for `Blocked`/`Refused`/`Error`, naming the scanner/rule
    /// that fired.
    pub reason: Option<String>,
}
