//! berth-schema — tenant schema and user provisioning.
//!
//! Builds the DDL statement sets that create, rotate, verify, and drop
//! tenant schemas, executing them through the `SqlExecutor` contract;
//! also renders and runs the external clone utility through `CloneTool`.

pub mod clone;
pub mod error;
pub mod schema;

pub use clone::{CLONE_TIMER, CloneRunner};
pub use error::{SchemaError, SchemaResult};
pub use schema::SchemaManager;
