//! berth-ids — deterministic identifier allocation.
//!
//! Every resource the orchestrator creates is named here. A tenant's
//! free-form category string becomes a database id (underscore-joined, with
//! a random alphanumeric suffix for collision resistance), and the database
//! id maps onto a host name (hyphen-joined, environment-prefixed) that must
//! fit the provider's 63-character DNS-label-derived limit.

pub mod allocator;

pub use allocator::IdAllocator;
