//! A single error surface for the orchestrator/server boundary:
//! every block/transient/fatal kind below maps to one variant here, which
//! the HTTP layer converts into a status code and JSON body.

use sentinel_clients::{PlannerError, WorkerError};
use sentinel_store::{ApprovalQueueError, ProvenanceStoreError, SessionStoreError};
use sentinel_types::{BlockKind, BlockReason, PlanValidationError};

use crate::pipeline::PipelineError;
use crate::tools::ToolError;

#[derive(Debug, thiserror::Error)]
pub enum SentinelError {
    /// A deterministic rule or scanner blocked the request. Recorded as a
    /// turn, never retried.
    #[error("blocked: {0}")]
    Blocked(#[from] BlockReason),

    /// The planner explicitly declined to produce a plan. Not an error
    /// condition from the caller's perspective, but distinct from a block.
    #[error("planner refused: {0}")]
    PlannerRefused(String),

    /// The planner's output failed structural validation.
    #[error("invalid plan: {0}")]
    InvalidPlan(#[from] PlanValidationError),

    /// Outbound planner/worker transport failure, after any internal retry
    /// budget is exhausted.
    #[error("upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    /// Malformed request input, surfaced with HTTP 422 semantics.
    #[error("validation error: {0}")]
    Validation(String),

    /// Missing or incorrect credential.
    #[error("authentication error: {0}")]
    Auth(String),

    /// A required scanner, the policy file, or a backing store is
    /// unreachable; the service fails closed.
    #[error("fatal: {0}")]
    Fatal(String),
}

impl SentinelError {
    #[must_use]
    pub fn block_kind(&self) -> Option<BlockKind> {
        match self {
            Self::Blocked(reason) => Some(reason.kind),
            _ => None,
        }
    }
}

impl From<PipelineError> for SentinelError {
    fn from(error: PipelineError) -> Self {
        match error {
            PipelineError::Blocked(reason) => Self::Blocked(reason),
            PipelineError::Worker(error) => Self::UpstreamUnavailable(error.to_string()),
            PipelineError::EmptyWorkerResponse => Self::UpstreamUnavailable(error.to_string()),
            PipelineError::Provenance(error) => Self::Fatal(error.to_string()),
        }
    }
}

impl From<ToolError> for SentinelError {
    fn from(error: ToolError) -> Self {
        if error.is_terminal_block() {
            match error {
                ToolError::PolicyDenied(reason) => Self::Blocked(reason),
                _ => unreachable!("is_terminal_block implies PolicyDenied"),
            }
        } else {
            Self::Validation(error.to_string())
        }
    }
}

impl From<PlannerError> for SentinelError {
    fn from(error: PlannerError) -> Self {
        match error {
            PlannerError::Invalid(validation) => Self::InvalidPlan(validation),
            other => Self::UpstreamUnavailable(other.to_string()),
        }
    }
}

impl From<WorkerError> for SentinelError {
    fn from(error: WorkerError) -> Self {
        Self::UpstreamUnavailable(error.to_string())
    }
}

impl From<ProvenanceStoreError> for SentinelError {
    fn from(error: ProvenanceStoreError) -> Self {
        Self::Fatal(error.to_string())
    }
}

impl From<SessionStoreError> for SentinelError {
    fn from(error: SessionStoreError) -> Self {
        match error {
            SessionStoreError::CapacityReached(limit) => {
                Self::Validation(format!("session capacity ({limit}) reached"))
            }
            other => Self::Fatal(other.to_string()),
        }
    }
}

impl From<ApprovalQueueError> for SentinelError {
    fn from(error: ApprovalQueueError) -> Self {
        Self::Fatal(error.to_string())
    }
}
