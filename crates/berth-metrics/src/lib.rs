//! berth-metrics — process-local metrics for the orchestrator.
//!
//! Counters and duration timers in a lock-protected registry, rendered in
//! the Prometheus text exposition format for scraping via the API's
//! `/metrics` route. Kept deliberately small; anything needing labels
//! beyond a name does not live here.

pub mod prometheus;
pub mod registry;

pub use prometheus::render_prometheus;
pub use registry::{Metrics, TimerGuard};
