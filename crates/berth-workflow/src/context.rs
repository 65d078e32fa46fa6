//! Shared dependencies of the workflow engines.

use std::sync::Arc;

use berth_config::{BerthConfig, PasswordVault};
use berth_fleet::FleetManager;
use berth_ids::IdAllocator;
use berth_metrics::Metrics;
use berth_placement::PlacementSelector;
use berth_provider::{Host, SqlConnection};
use berth_schema::{CloneRunner, SchemaManager};
use berth_state::RecordStore;

use crate::error::{WorkflowError, WorkflowResult};

/// Everything a step processor can touch. Built once at startup and
/// shared read-only; processors keep no state of their own, and any
/// per-request scratch lives in locals.
pub struct WorkflowContext {
    pub config: Arc<BerthConfig>,
    pub store: RecordStore,
    pub fleet: Arc<FleetManager>,
    pub allocator: IdAllocator,
    pub placement: PlacementSelector,
    pub schema: SchemaManager,
    pub cloner: CloneRunner,
    pub vault: PasswordVault,
    pub metrics: Metrics,
}

impl WorkflowContext {
    /// The master connection for a shared host, credentialed from the
    /// vault.
    pub fn master_connection(&self, host: &Host) -> WorkflowResult<SqlConnection> {
        let instance_id = self.allocator.instance_id(&host.id);
        let credentials = self
            .vault
            .credentials(&instance_id)
            .ok_or(berth_fleet::FleetError::MissingCredentials(instance_id))?;
        let endpoint = host
            .endpoint
            .as_ref()
            .ok_or_else(|| WorkflowError::NotFound(host.id.clone()))?;
        Ok(SqlConnection {
            host: endpoint.address.clone(),
            port: endpoint.port,
            user: credentials.username.clone(),
            password: credentials.password.clone(),
            database: host.db_name.clone(),
        })
    }

    /// The master connection for a dedicated host, whose master password
    /// is the password carried by the workflow message.
    pub fn dedicated_master_connection(
        &self,
        host: &Host,
        password: &str,
    ) -> WorkflowResult<SqlConnection> {
        let endpoint = host
            .endpoint
            .as_ref()
            .ok_or_else(|| WorkflowError::NotFound(host.id.clone()))?;
        Ok(SqlConnection {
            host: endpoint.address.clone(),
            port: endpoint.port,
            user: host.master_user.clone(),
            password: password.to_string(),
            database: host.db_name.clone(),
        })
    }
}
