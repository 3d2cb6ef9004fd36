//! Durable state for the gateway: provenance (trust derivation), session
//! history, the approval queue, and the in-process event bus.

pub mod approval;
pub mod event_bus;
pub mod provenance;
pub mod session;
pub mod sqlite_util;

pub use approval::{ApprovalCheck, ApprovalQueue, ApprovalQueueError};
pub use event_bus::{Event, EventBus, Subscription};
pub use provenance::{ProvenanceStore, ProvenanceStoreError};
pub use session::{SessionStore, SessionStoreError};
