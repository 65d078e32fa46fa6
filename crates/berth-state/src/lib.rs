//! berth-state — embedded status store for berth.
//!
//! Backed by [redb](https://docs.rs/redb), this is the single source of
//! truth for the externally visible state of every logical database. One
//! record per database, JSON-serialized into redb's `&[u8]` value column.
//!
//! Workflow steps read-modify-write records with no cross-step locking;
//! the last writer wins. That is an accepted design point given
//! at-least-once queue delivery: duplicate step delivery re-runs
//! idempotent provider calls rather than corrupting the record.
//!
//! The `RecordStore` is `Clone` + `Send` + `Sync` (backed by
//! `Arc<Database>`) and can be shared across async tasks.

pub mod error;
pub mod store;
pub mod tables;
pub mod types;

pub use error::{StateError, StateResult};
pub use store::RecordStore;
pub use types::*;
