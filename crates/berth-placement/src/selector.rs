//! The shared-host selector.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use berth_config::BerthConfig;
use berth_fleet::{CPU_METRIC, FleetManager, FleetResult, tag_keys};
use berth_metrics::Metrics;
use berth_provider::{Host, Tag};

/// Timer name for the placement hot path.
pub const PLACEMENT_TIMER: &str = "placement_duration";

/// Rolling window of CPU samples considered per candidate.
const CPU_WINDOW: Duration = Duration::from_secs(2 * 60 * 60);

/// An eligible shared host and the load that ranked it. Ephemeral; never
/// persisted.
#[derive(Debug, Clone)]
pub struct PlacementCandidate {
    pub host: Host,
    pub max_cpu: f64,
    pub tags: Vec<Tag>,
}

/// Chooses the least-loaded eligible shared host.
pub struct PlacementSelector {
    fleet: Arc<FleetManager>,
    config: Arc<BerthConfig>,
    metrics: Metrics,
}

impl PlacementSelector {
    pub fn new(fleet: Arc<FleetManager>, config: Arc<BerthConfig>, metrics: Metrics) -> Self {
        Self {
            fleet,
            config,
            metrics,
        }
    }

    /// Find the shared host with the lowest maximum CPU sample over the
    /// trailing window. `None` means no eligible host exists right now.
    ///
    /// This sits on the hot path of every shared-tenant creation; the
    /// wall-clock duration lands in the `placement_duration` timer.
    pub async fn find_shared_host(&self) -> FleetResult<Option<PlacementCandidate>> {
        let _timer = self.metrics.start_timer(PLACEMENT_TIMER);

        let provider = self.fleet.provider().clone();
        let mut best: Option<PlacementCandidate> = None;
        let mut page_token = None;

        loop {
            let page = provider.list_hosts(page_token.take()).await?;

            for host in page.hosts {
                // Only hosts of the active deploy color are in play; blue
                // and green fleets coexist during a deploy.
                if !host.id.contains(&self.config.deploy_color) {
                    debug!(host_id = %host.id, "skipping host outside the active deploy color");
                    continue;
                }

                let tags = match provider.list_tags(&host.id).await {
                    Ok(tags) => tags,
                    Err(e) => {
                        warn!(host_id = %host.id, error = %e, "error fetching host tags");
                        continue;
                    }
                };
                let fleet_default = tags
                    .iter()
                    .find(|t| t.key == tag_keys::FLEET_DEFAULT)
                    .map(|t| t.value.as_str());
                if fleet_default != Some(self.config.managed_service_tag.as_str()) {
                    continue;
                }
                if !self.fleet.is_ready(&host) {
                    continue;
                }

                let samples = provider
                    .metric_samples(&host.id, CPU_METRIC, CPU_WINDOW)
                    .await?;
                // A host with no samples in the window scores zero and is
                // maximally attractive; fresh pool hosts fill first.
                let max_cpu = samples.iter().copied().fold(0.0_f64, f64::max);

                debug!(host_id = %host.id, max_cpu, "placement candidate");
                let better = match &best {
                    Some(current) => max_cpu < current.max_cpu,
                    None => true,
                };
                if better {
                    best = Some(PlacementCandidate {
                        host,
                        max_cpu,
                        tags,
                    });
                }
            }

            match page.next {
                Some(next) => page_token = Some(next),
                None => break,
            }
        }

        match &best {
            Some(candidate) => {
                debug!(host_id = %candidate.host.id, max_cpu = candidate.max_cpu, "shared host selected")
            }
            None => warn!("no eligible shared host found"),
        }
        Ok(best)
    }
}
