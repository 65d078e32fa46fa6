//! FleetManager — host lifecycle operations over the provider contract.

use std::sync::Arc;

use tracing::{debug, error, warn};

use berth_config::BerthConfig;
use berth_provider::{Host, HostPatch, HostProvider, HostSpec, Tag};

use crate::error::{FleetError, FleetResult};

/// Metric name for host CPU utilization.
pub const CPU_METRIC: &str = "cpu_utilization";

/// Tag keys applied to hosts this service manages.
pub mod tag_keys {
    /// Which service asked for the host.
    pub const SERVICE: &str = "service";
    pub const SERVICE_COMPONENT: &str = "service_component";
    /// Which deployment of this service manages the host.
    pub const MANAGED_BY: &str = "managed_by";
    /// Present only on shared hosts eligible for placement.
    pub const FLEET_DEFAULT: &str = "fleet_default";
    pub const ENVIRONMENT: &str = "environment";
}

/// Provider statuses in which a host accepts schema work.
const READY_STATUSES: [&str; 3] = ["available", "modifying", "backing-up"];

/// Host lifecycle manager.
pub struct FleetManager {
    provider: Arc<dyn HostProvider>,
    config: Arc<BerthConfig>,
}

impl FleetManager {
    pub fn new(provider: Arc<dyn HostProvider>, config: Arc<BerthConfig>) -> Self {
        Self { provider, config }
    }

    pub fn provider(&self) -> &Arc<dyn HostProvider> {
        &self.provider
    }

    /// Create a shared host from the template, marked as a placement
    /// candidate via the fleet-default tag.
    pub async fn create_shared_host(
        &self,
        host_id: &str,
        master_user: &str,
        master_password: &str,
        db_name: &str,
    ) -> FleetResult<Host> {
        let template = &self.config.host_template;
        self.create_host(
            host_id,
            master_user,
            master_password,
            &prefix_class(&template.instance_class),
            template.storage_gb,
            db_name,
            true,
            &self.config.service_tag,
            &self.config.service_component_tag,
        )
        .await
    }

    /// Create a dedicated host sized per request, tagged with the
    /// requesting service's identity.
    pub async fn create_dedicated_host(
        &self,
        host_id: &str,
        master_password: &str,
        service_tag: &str,
        service_component_tag: &str,
        instance_class: &str,
        storage_gb: u32,
    ) -> FleetResult<Host> {
        let template = &self.config.host_template;
        self.create_host(
            host_id,
            &template.master_user,
            master_password,
            &prefix_class(instance_class),
            storage_gb,
            &template.db_name,
            false,
            service_tag,
            service_component_tag,
        )
        .await
    }

    #[allow(clippy::too_many_arguments)]
    async fn create_host(
        &self,
        host_id: &str,
        master_user: &str,
        master_password: &str,
        instance_class: &str,
        storage_gb: u32,
        db_name: &str,
        is_default: bool,
        service_tag: &str,
        service_component_tag: &str,
    ) -> FleetResult<Host> {
        let template = &self.config.host_template;
        let spec = HostSpec {
            id: host_id.to_string(),
            master_user: master_user.to_string(),
            master_password: master_password.to_string(),
            instance_class: instance_class.to_string(),
            storage_gb,
            engine: template.engine.clone(),
            engine_version: template.engine_version.clone(),
            db_name: db_name.to_string(),
            port: template.port,
            multi_az: template.multi_az,
            publicly_accessible: template.publicly_accessible,
            subnet_group: template.subnet_group.clone(),
            security_group: template.security_group.clone(),
            tags: self.desired_tags(service_tag, service_component_tag, is_default),
        };
        debug!(
            host_id,
            instance_class,
            storage_gb,
            subnet_group = %template.subnet_group,
            "creating host"
        );

        match self.provider.create_host(&spec).await {
            Ok(host) => {
                debug!(host_id = %host.id, "host created");
                Ok(host)
            }
            Err(e) => {
                error!(host_id, error = %e, "provider rejected host creation");
                Err(FleetError::Creation {
                    host_id: host_id.to_string(),
                    message: e.to_string(),
                })
            }
        }
    }

    /// Whether a host accepts schema work (creation path).
    pub fn is_ready(&self, host: &Host) -> bool {
        READY_STATUSES.contains(&host.status.as_str())
    }

    /// Whether a host is strictly available (deletion gate).
    pub fn is_available(&self, host: &Host) -> bool {
        host.status == "available"
    }

    /// Describe a host by full provider id. Provider errors are logged and
    /// reported as absence; callers treat absence as "not ready yet" or
    /// "already gone" by context.
    pub async fn get_host(&self, host_id: &str) -> Option<Host> {
        match self.provider.describe_host(host_id).await {
            Ok(host) => host,
            Err(e) => {
                warn!(host_id, error = %e, "error looking up host");
                None
            }
        }
    }

    /// Rotate the master password on a host, applied immediately. The
    /// destructive-intent guard of the deletion workflow.
    pub async fn modify_master_password(&self, host_id: &str, password: &str) -> FleetResult<()> {
        let patch = HostPatch {
            master_password: Some(password.to_string()),
            apply_immediately: true,
            ..HostPatch::default()
        };
        self.provider
            .modify_host(host_id, &patch)
            .await
            .map_err(|e| FleetError::Deletion {
                host_id: host_id.to_string(),
                message: e.to_string(),
            })
    }

    /// Destroy a host, skipping any final snapshot.
    pub async fn delete_host(&self, host_id: &str) -> FleetResult<()> {
        self.provider
            .delete_host(host_id)
            .await
            .map_err(|e| FleetError::Deletion {
                host_id: host_id.to_string(),
                message: e.to_string(),
            })
    }

    /// The tag set a host of ours should carry.
    pub fn desired_tags(
        &self,
        service_tag: &str,
        service_component_tag: &str,
        is_default: bool,
    ) -> Vec<Tag> {
        let mut tags = vec![
            Tag::new(tag_keys::SERVICE, service_tag),
            Tag::new(tag_keys::SERVICE_COMPONENT, service_component_tag),
            Tag::new(tag_keys::MANAGED_BY, &self.config.managed_service_tag),
            Tag::new(tag_keys::ENVIRONMENT, &self.config.environment_tag),
        ];
        // The fleet-default tag marks shared placement candidates only.
        if is_default {
            tags.push(Tag::new(
                tag_keys::FLEET_DEFAULT,
                &self.config.managed_service_tag,
            ));
        }
        tags
    }

    /// Bring a default host's tags in line with the configured set:
    /// remove extras, add what is missing.
    pub async fn reconcile_default_tags(&self, host_id: &str) -> FleetResult<()> {
        let desired = self.desired_tags(
            &self.config.service_tag,
            &self.config.service_component_tag,
            true,
        );
        let current = self.provider.list_tags(host_id).await?;

        let extras: Vec<String> = current
            .iter()
            .filter(|t| !desired.contains(t))
            .map(|t| t.key.clone())
            .collect();
        if !extras.is_empty() {
            debug!(host_id, keys = ?extras, "removing stray tags");
            self.provider.remove_tags(host_id, &extras).await?;
        }

        let missing: Vec<Tag> = desired
            .iter()
            .filter(|t| !current.contains(t))
            .cloned()
            .collect();
        if !missing.is_empty() {
            debug!(host_id, count = missing.len(), "adding default tags");
            self.provider.add_tags(host_id, &missing).await?;
        }
        Ok(())
    }

    /// Apply an operator-requested template change to an existing host,
    /// guarding the provider's storage constraints: no shrink, and any
    /// increase must be at least 10 percent.
    pub async fn check_template_changes(
        &self,
        host: &Host,
        storage_gb: u32,
        instance_class: &str,
    ) -> FleetResult<()> {
        let mut patch = HostPatch {
            apply_immediately: true,
            ..HostPatch::default()
        };
        let wanted_class = prefix_class(instance_class);

        if host.storage_gb != storage_gb {
            if storage_gb < host.storage_gb {
                error!(
                    host_id = %host.id,
                    current = host.storage_gb,
                    requested = storage_gb,
                    "config requested a storage decrease"
                );
                return Err(FleetError::StorageShrink(host.id.clone()));
            }
            if (storage_gb as f64) < host.storage_gb as f64 * 1.1 {
                error!(
                    host_id = %host.id,
                    current = host.storage_gb,
                    requested = storage_gb,
                    "storage increase below the 10 percent minimum"
                );
                return Err(FleetError::StorageGrowthBelowMinimum(host.id.clone()));
            }
            debug!(
                host_id = %host.id,
                from = host.storage_gb,
                to = storage_gb,
                "updating allocated storage"
            );
            patch.storage_gb = Some(storage_gb);
        }

        if host.instance_class != wanted_class {
            debug!(
                host_id = %host.id,
                from = %host.instance_class,
                to = %wanted_class,
                "changing instance class"
            );
            patch.instance_class = Some(wanted_class);
        }

        if patch.storage_gb.is_some() || patch.instance_class.is_some() {
            self.provider.modify_host(&host.id, &patch).await?;
        }
        Ok(())
    }
}

/// Provider classes carry a "db." prefix; requests and config use the
/// bare name.
pub fn prefix_class(class: &str) -> String {
    if class.starts_with("db.") {
        class.to_string()
    } else {
        format!("db.{class}")
    }
}
