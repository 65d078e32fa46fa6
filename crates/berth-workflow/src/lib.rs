//! berth-workflow — the asynchronous provisioning and deprovisioning
//! orchestrator.
//!
//! Provisioning a host or a schema takes minutes and can fail at any
//! point, so neither runs inside a request. Instead, two step-state-
//! machines drive the work to completion across scheduler ticks:
//!
//! - creation: `INSTANCE → INSTANCE_READY(loop) → SCHEMA → CLONE`
//!   (shared-tenant requests enter at `SCHEMA`)
//! - deletion: `PREPARING(loop) → DELETING → RESETTING_PASSWORD(loop)`
//!
//! Continuation state rides an at-least-once queue inside the encrypted
//! envelope. Each poller tick receives a batch, decodes, dispatches to
//! the processor bound to the step, then either re-enqueues the next
//! step or marks the workflow terminal; the message is acknowledged
//! exactly once whatever the outcome. Within a tick messages are
//! processed sequentially; cross-process duplicate delivery is tolerated
//! by keeping every step idempotent, not by locking.

pub mod context;
pub mod creation;
pub mod deletion;
pub mod error;
pub mod messages;
pub mod service;

pub use context::WorkflowContext;
pub use creation::CreationEngine;
pub use deletion::DeletionEngine;
pub use error::{WorkflowError, WorkflowResult};
pub use messages::{CreationMessage, CreationStep, DeletionMessage, DeletionStep};
pub use service::{CreateResponse, DatabaseService, HostDetails, StatusResponse, UserResponse};
