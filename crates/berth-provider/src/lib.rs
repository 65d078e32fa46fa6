//! berth-provider — the narrow contracts berth consumes from the outside
//! world.
//!
//! The orchestrator drives three collaborators it does not implement in
//! depth: the cloud host control API, a SQL statement runner, and the
//! external clone utility. Each is a trait here, with an in-memory
//! implementation (`MemoryFleet`, `MemorySql`, `MemoryClone`) that backs
//! tests and the daemon's dev mode.

pub mod error;
pub mod memory;
pub mod traits;
pub mod types;

pub use error::{ProviderError, ProviderResult};
pub use memory::{MemoryClone, MemoryFleet, MemorySql};
pub use traits::{CloneTool, HostProvider, SqlExecutor};
pub use types::*;
