//! Narrow client traits for the gateway's external collaborators: the
//! remote planner and the local worker model.

pub mod http;
pub mod planner;
pub mod retry;
pub mod worker;

pub use planner::{PlannerClient, PlannerError, PlannerOutcome, RemotePlannerClient};
pub use worker::{RemoteWorkerClient, WorkerClient, WorkerError};
