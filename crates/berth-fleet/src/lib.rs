//! berth-fleet — lifecycle management for managed database hosts.
//!
//! Wraps the raw `HostProvider` contract with the policies the
//! orchestrator cares about: host creation from the configured template,
//! readiness predicates, master-password rotation, tag reconciliation,
//! the template-change guard, and the startup bootstrap that guarantees
//! the configured default shared hosts exist.

pub mod bootstrap;
pub mod error;
pub mod manager;

pub use bootstrap::ensure_default_hosts;
pub use error::{FleetError, FleetResult};
pub use manager::{CPU_METRIC, FleetManager, tag_keys};
