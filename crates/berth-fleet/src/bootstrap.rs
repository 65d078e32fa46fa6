//! Startup bootstrap for the default shared hosts.
//!
//! The daemon guarantees every configured default shared host exists in
//! the active deploy color: absent hosts are created with their vault
//! credentials, present hosts get their tags reconciled and any template
//! changes applied. Reconciliation failures on an existing host are
//! logged and skipped; a missing host that cannot be created aborts
//! startup.

use std::sync::Arc;

use tracing::{debug, error};

use berth_config::{BerthConfig, PasswordVault};
use berth_ids::IdAllocator;

use crate::error::{FleetError, FleetResult};
use crate::manager::FleetManager;

/// Ensure every configured default shared host exists and matches config.
pub async fn ensure_default_hosts(
    manager: &FleetManager,
    config: &Arc<BerthConfig>,
    vault: &PasswordVault,
    allocator: &IdAllocator,
) -> FleetResult<()> {
    for default in &config.default_shared_hosts {
        let colored_id = format!("{}_{}", config.deploy_color, default.identifier);
        let host_name = allocator.host_name(&colored_id);

        match manager.get_host(&host_name).await {
            None => {
                let credentials = vault
                    .credentials(&colored_id)
                    .ok_or_else(|| FleetError::MissingCredentials(colored_id.clone()))?;
                debug!(host = %host_name, "default shared host absent, creating");
                manager
                    .create_shared_host(
                        &host_name,
                        &credentials.username,
                        &credentials.password,
                        &default.db_name,
                    )
                    .await?;
            }
            Some(host) => {
                debug!(host = %host_name, "default shared host exists, checking tags");
                if let Err(e) = manager.reconcile_default_tags(&host_name).await {
                    error!(host = %host_name, error = %e, "could not reconcile tags");
                }
                if let Err(e) = manager
                    .check_template_changes(&host, default.storage_gb, &default.instance_class)
                    .await
                {
                    error!(host = %host_name, error = %e, "could not apply template changes");
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use berth_config::MasterCredentials;
    use berth_provider::{HostProvider, MemoryFleet};

    fn vault() -> PasswordVault {
        PasswordVault::from_entries([(
            "blue_pool_1".to_string(),
            MasterCredentials {
                username: "postgres".to_string(),
                password: "hunter2".to_string(),
            },
        )])
    }

    #[tokio::test]
    async fn creates_missing_default_host() {
        let config = Arc::new(BerthConfig::sample());
        let fleet = Arc::new(MemoryFleet::auto_available());
        let manager = FleetManager::new(fleet.clone(), config.clone());
        let allocator = IdAllocator::new(&config.identifier_prefix);

        ensure_default_hosts(&manager, &config, &vault(), &allocator)
            .await
            .unwrap();

        let host = fleet
            .describe_host("berth-stage-blue-pool-1")
            .await
            .unwrap();
        assert!(host.is_some());
    }

    #[tokio::test]
    async fn missing_vault_entry_aborts() {
        let config = Arc::new(BerthConfig::sample());
        let fleet = Arc::new(MemoryFleet::auto_available());
        let manager = FleetManager::new(fleet, config.clone());
        let allocator = IdAllocator::new(&config.identifier_prefix);

        let err = ensure_default_hosts(&manager, &config, &PasswordVault::default(), &allocator)
            .await
            .unwrap_err();
        assert!(matches!(err, FleetError::MissingCredentials(_)));
    }

    #[tokio::test]
    async fn existing_host_is_reconciled_not_recreated() {
        let config = Arc::new(BerthConfig::sample());
        let fleet = Arc::new(MemoryFleet::auto_available());
        let manager = FleetManager::new(fleet.clone(), config.clone());
        let allocator = IdAllocator::new(&config.identifier_prefix);

        ensure_default_hosts(&manager, &config, &vault(), &allocator)
            .await
            .unwrap();
        // Second run finds the host and must not fail on the duplicate.
        ensure_default_hosts(&manager, &config, &vault(), &allocator)
            .await
            .unwrap();
    }
}
