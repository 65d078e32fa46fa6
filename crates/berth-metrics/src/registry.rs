//! Metrics registry — named counters and duration timers.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

/// Aggregated observations for one timer.
#[derive(Debug, Default, Clone, Copy)]
pub struct TimerStats {
    pub count: u64,
    pub total_ms: u64,
    pub max_ms: u64,
}

#[derive(Default)]
struct Registry {
    counters: HashMap<String, Arc<AtomicU64>>,
    timers: HashMap<String, TimerStats>,
}

/// Shared metrics handle. Cloning is cheap; all clones feed one registry.
#[derive(Clone, Default)]
pub struct Metrics {
    inner: Arc<Mutex<Registry>>,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Increment a named counter.
    pub fn inc(&self, name: &str) {
        self.add(name, 1);
    }

    /// Add to a named counter.
    pub fn add(&self, name: &str, delta: u64) {
        let counter = {
            let mut registry = self.inner.lock().expect("metrics registry poisoned");
            registry
                .counters
                .entry(name.to_string())
                .or_default()
                .clone()
        };
        counter.fetch_add(delta, Ordering::Relaxed);
    }

    /// Current value of a counter (0 when never touched).
    pub fn counter(&self, name: &str) -> u64 {
        let registry = self.inner.lock().expect("metrics registry poisoned");
        registry
            .counters
            .get(name)
            .map(|c| c.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    /// Start timing; the observation is recorded when the guard drops.
    pub fn start_timer(&self, name: &str) -> TimerGuard {
        TimerGuard {
            metrics: self.clone(),
            name: name.to_string(),
            started: Instant::now(),
        }
    }

    /// Record one duration observation directly.
    pub fn observe_ms(&self, name: &str, elapsed_ms: u64) {
        let mut registry = self.inner.lock().expect("metrics registry poisoned");
        let stats = registry.timers.entry(name.to_string()).or_default();
        stats.count += 1;
        stats.total_ms += elapsed_ms;
        stats.max_ms = stats.max_ms.max(elapsed_ms);
    }

    /// Aggregated stats for a timer (zeros when never observed).
    pub fn timer(&self, name: &str) -> TimerStats {
        let registry = self.inner.lock().expect("metrics registry poisoned");
        registry.timers.get(name).copied().unwrap_or_default()
    }

    /// Snapshot all counters and timers, sorted by name.
    pub fn snapshot(&self) -> (Vec<(String, u64)>, Vec<(String, TimerStats)>) {
        let registry = self.inner.lock().expect("metrics registry poisoned");
        let mut counters: Vec<(String, u64)> = registry
            .counters
            .iter()
            .map(|(name, c)| (name.clone(), c.load(Ordering::Relaxed)))
            .collect();
        counters.sort_by(|a, b| a.0.cmp(&b.0));
        let mut timers: Vec<(String, TimerStats)> = registry
            .timers
            .iter()
            .map(|(name, stats)| (name.clone(), *stats))
            .collect();
        timers.sort_by(|a, b| a.0.cmp(&b.0));
        (counters, timers)
    }
}

/// Drop guard recording a timer observation.
pub struct TimerGuard {
    metrics: Metrics,
    name: String,
    started: Instant,
}

impl Drop for TimerGuard {
    fn drop(&mut self) {
        let elapsed_ms = self.started.elapsed().as_millis() as u64;
        self.metrics.observe_ms(&self.name, elapsed_ms);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate() {
        let metrics = Metrics::new();
        metrics.inc("steps_processed");
        metrics.add("steps_processed", 2);
        assert_eq!(metrics.counter("steps_processed"), 3);
        assert_eq!(metrics.counter("never_touched"), 0);
    }

    #[test]
    fn timer_guard_records_on_drop() {
        let metrics = Metrics::new();
        {
            let _guard = metrics.start_timer("placement_duration");
        }
        let stats = metrics.timer("placement_duration");
        assert_eq!(stats.count, 1);
    }

    #[test]
    fn observe_tracks_max() {
        let metrics = Metrics::new();
        metrics.observe_ms("clone_duration", 10);
        metrics.observe_ms("clone_duration", 250);
        metrics.observe_ms("clone_duration", 40);
        let stats = metrics.timer("clone_duration");
        assert_eq!(stats.count, 3);
        assert_eq!(stats.total_ms, 300);
        assert_eq!(stats.max_ms, 250);
    }
}
