//! berth-placement — choosing a shared host for a new schema.
//!
//! Placement is a greedy decision under fleet-wide resource pressure: of
//! the shared hosts in the active deploy color that are tagged as fleet
//! defaults and currently ready, pick the one whose worst CPU sample over
//! the trailing two hours is lowest. Finding nothing is a normal outcome
//! (no capacity) the caller must handle, not an error.

pub mod selector;

pub use selector::{PLACEMENT_TIMER, PlacementCandidate, PlacementSelector};
