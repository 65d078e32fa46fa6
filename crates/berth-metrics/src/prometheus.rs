//! Prometheus text exposition format.
//!
//! Renders the registry snapshot into the Prometheus text format for
//! scraping by a Prometheus server or compatible agent.

use crate::registry::Metrics;

/// Render all counters and timers into Prometheus text format.
pub fn render_prometheus(metrics: &Metrics) -> String {
    let (counters, timers) = metrics.snapshot();
    let mut out = String::new();

    for (name, value) in counters {
        out.push_str(&format!("# TYPE berth_{name} counter\n"));
        out.push_str(&format!("berth_{name} {value}\n"));
    }

    for (name, stats) in timers {
        out.push_str(&format!("# TYPE berth_{name}_ms summary\n"));
        out.push_str(&format!("berth_{name}_ms_count {}\n", stats.count));
        out.push_str(&format!("berth_{name}_ms_sum {}\n", stats.total_ms));
        out.push_str(&format!("berth_{name}_ms_max {}\n", stats.max_ms));
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_counters_and_timers() {
        let metrics = Metrics::new();
        metrics.inc("steps_processed");
        metrics.observe_ms("placement_duration", 12);

        let text = render_prometheus(&metrics);
        assert!(text.contains("berth_steps_processed 1\n"));
        assert!(text.contains("berth_placement_duration_ms_count 1\n"));
        assert!(text.contains("berth_placement_duration_ms_sum 12\n"));
    }
}
