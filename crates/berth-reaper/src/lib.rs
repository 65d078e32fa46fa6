//! berth-reaper — the batch sweep that permanently destroys resources
//! whose records have sat DELETED past the retention window.
//!
//! Soft deletion only revokes credentials; the reaper is what actually
//! destroys hosts and drops schemas, then removes the status records.
//! Every record is processed independently: one record's failure is
//! logged and skipped, never aborts the batch, and never removes the
//! failing record's row.

pub mod reaper;

pub use reaper::{ReapSummary, Reaper};
