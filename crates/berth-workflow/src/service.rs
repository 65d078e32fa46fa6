//! DatabaseService — the operations the HTTP layer calls.
//!
//! Request-time failures here are synchronous and map to structured
//! error payloads; everything asynchronous is visible only through the
//! status-read path. The service owns the one synchronous reclamation
//! path in the system: soft-deleting a SHARED database rotates its
//! schema password and marks it DELETED immediately, with no workflow,
//! because no dedicated host lifecycle is involved.

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, error};

use berth_config::InstanceClass;
use berth_state::{ConnectionFacts, CreationRequest, DbStatus, Tenancy};

use crate::context::WorkflowContext;
use crate::creation::CreationEngine;
use crate::deletion::DeletionEngine;
use crate::error::{WorkflowError, WorkflowResult};

/// Response to an accepted creation request. The password is returned
/// exactly once, here.
#[derive(Debug, Clone, Serialize)]
pub struct CreateResponse {
    pub database_id: String,
    pub password: String,
}

/// Externally visible status of a database.
#[derive(Debug, Clone, Serialize)]
pub struct StatusResponse {
    pub database_id: String,
    pub status: DbStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Response to a temp-user request.
#[derive(Debug, Clone, Serialize)]
pub struct UserResponse {
    pub username: String,
    pub password: String,
}

/// Inspection view of one host.
#[derive(Debug, Clone, Serialize)]
pub struct HostDetails {
    pub id: String,
    pub instance_class: String,
    pub total_ram_gb: u32,
    pub total_cores: u32,
    pub storage_gb: u32,
    pub db_name: String,
    pub master_user: String,
    pub address: String,
    pub port: u16,
    pub status: String,
}

/// The public face of the orchestrator.
pub struct DatabaseService {
    ctx: Arc<WorkflowContext>,
    creation: Arc<CreationEngine>,
    deletion: Arc<DeletionEngine>,
}

impl DatabaseService {
    pub fn new(
        ctx: Arc<WorkflowContext>,
        creation: Arc<CreationEngine>,
        deletion: Arc<DeletionEngine>,
    ) -> Self {
        Self {
            ctx,
            creation,
            deletion,
        }
    }

    /// Accept a creation request. When the request names a clone source,
    /// the source must exist before anything is enqueued.
    pub async fn create_database(&self, request: CreationRequest) -> WorkflowResult<CreateResponse> {
        if let Some(source_id) = &request.source_database_id {
            if self.ctx.store.get(source_id)?.is_none() {
                error!(source_id, "clone source not found");
                return Err(WorkflowError::NotFound(source_id.clone()));
            }
        }

        let (database_id, password) = self.creation.request_creation(request).await?;
        Ok(CreateResponse {
            database_id,
            password,
        })
    }

    /// Status of a database. The read path never writes.
    pub fn database_status(&self, database_id: &str) -> WorkflowResult<StatusResponse> {
        let record = self
            .ctx
            .store
            .get(database_id)?
            .ok_or_else(|| WorkflowError::NotFound(database_id.to_string()))?;
        Ok(StatusResponse {
            database_id: record.id,
            status: record.status,
            message: record.status_message,
        })
    }

    /// Connection facts for a READY database.
    pub fn connection_info(&self, database_id: &str) -> WorkflowResult<ConnectionFacts> {
        let record = self
            .ctx
            .store
            .get(database_id)?
            .filter(|r| r.status == DbStatus::Ready)
            .ok_or_else(|| WorkflowError::NotFound(database_id.to_string()))?;
        record
            .connection()
            .ok_or_else(|| WorkflowError::NotFound(database_id.to_string()))
    }

    /// Soft-delete a database. SHARED databases are reclaimed here,
    /// synchronously; DEDICATED databases enter the deletion workflow.
    pub async fn delete_database(&self, database_id: &str) -> WorkflowResult<()> {
        let record = self
            .ctx
            .store
            .get(database_id)?
            .ok_or_else(|| WorkflowError::NotFound(database_id.to_string()))?;

        if record.status == DbStatus::Deleted {
            debug!(database_id, "database already reports as deleted");
            return Ok(());
        }

        let Some(instance_id) = record.instance_id.clone() else {
            debug!(database_id, "record carries no placement yet");
            return Err(WorkflowError::NotFound(database_id.to_string()));
        };
        let tenancy = record.tenancy.unwrap_or(Tenancy::Shared);
        let host_name = self.ctx.allocator.host_name(&instance_id);

        match self.ctx.fleet.get_host(&host_name).await {
            Some(host) => match tenancy {
                Tenancy::Shared => {
                    let facts = record
                        .connection()
                        .ok_or_else(|| WorkflowError::NotFound(database_id.to_string()))?;
                    let master = self.ctx.master_connection(&host)?;
                    let fresh_password = berth_config::secrets::generate_password();

                    match self
                        .ctx
                        .schema
                        .change_schema_password(&master, &facts.schema, &facts.user, &fresh_password)
                        .await
                    {
                        Ok(()) => {
                            self.mark_deleted(database_id)?;
                            debug!(database_id, "database deleted");
                            Ok(())
                        }
                        Err(e) => {
                            // The schema is gone, most likely because the
                            // host was rebuilt underneath us. The record is
                            // still reclaimed.
                            error!(
                                database_id,
                                host = %host.id,
                                error = %e,
                                "schema not found on host during delete"
                            );
                            self.mark_deleted(database_id)?;
                            Err(WorkflowError::Deletion {
                                database_id: database_id.to_string(),
                                message: format!(
                                    "schema {} not found on host {}: {e}; record marked deleted",
                                    facts.schema, host.id
                                ),
                            })
                        }
                    }
                }
                Tenancy::Dedicated => self.deletion.request_soft_delete(database_id).await,
            },
            None => {
                debug!(database_id, host = %host_name, "host already gone, marking deleted");
                self.mark_deleted(database_id)?;
                Ok(())
            }
        }
    }

    /// Create or rotate the short-lived operational role on a READY
    /// database, valid for one hour.
    pub async fn create_temp_user(&self, database_id: &str) -> WorkflowResult<UserResponse> {
        let record = self
            .ctx
            .store
            .get(database_id)?
            .ok_or_else(|| WorkflowError::NotFound(database_id.to_string()))?;
        if record.status != DbStatus::Ready {
            debug!(database_id, status = ?record.status, "not in a state to run queries");
            return Err(WorkflowError::InvalidState {
                database_id: database_id.to_string(),
                status: format!("{:?}", record.status),
            });
        }

        let facts = record
            .connection()
            .ok_or_else(|| WorkflowError::NotFound(database_id.to_string()))?;
        let instance_id = record
            .instance_id
            .ok_or_else(|| WorkflowError::NotFound(database_id.to_string()))?;
        let host_name = self.ctx.allocator.host_name(&instance_id);
        let host = self
            .ctx
            .fleet
            .get_host(&host_name)
            .await
            .ok_or(WorkflowError::HostNotFound(host_name))?;

        let master = self.ctx.master_connection(&host)?;
        let password = berth_config::secrets::generate_password();
        let valid_until = (Utc::now() + chrono::Duration::minutes(60))
            .format("%Y-%m-%d %H:%M")
            .to_string();

        self.ctx
            .schema
            .create_temp_user(&master, &facts.schema, &password, &valid_until)
            .await?;

        Ok(UserResponse {
            username: "mq_user".to_string(),
            password,
        })
    }

    /// Inspection view of a host by its unprefixed instance id.
    pub async fn host_details(&self, instance_id: &str) -> WorkflowResult<HostDetails> {
        let host_name = self.ctx.allocator.host_name(instance_id);
        let host = self
            .ctx
            .fleet
            .get_host(&host_name)
            .await
            .ok_or(WorkflowError::HostNotFound(host_name))?;

        let bare_class = host
            .instance_class
            .strip_prefix("db.")
            .unwrap_or(&host.instance_class);
        let class = self
            .ctx
            .config
            .instance_class(bare_class)
            .ok_or_else(|| WorkflowError::UnknownInstanceClass(bare_class.to_string()))?;
        let endpoint = host
            .endpoint
            .as_ref()
            .ok_or_else(|| WorkflowError::HostNotFound(host.id.clone()))?;

        Ok(HostDetails {
            id: host.id.clone(),
            instance_class: class.class.clone(),
            total_ram_gb: class.total_ram_gb,
            total_cores: class.total_cores,
            storage_gb: host.storage_gb,
            db_name: host.db_name.clone(),
            master_user: host.master_user.clone(),
            address: endpoint.address.clone(),
            port: endpoint.port,
            status: host.status.clone(),
        })
    }

    /// The configured instance-class catalog.
    pub fn instance_classes(&self) -> Vec<InstanceClass> {
        self.ctx.config.instance_classes.clone()
    }

    fn mark_deleted(&self, database_id: &str) -> WorkflowResult<()> {
        self.ctx
            .store
            .update_status(database_id, DbStatus::Deleted, None)?;
        Ok(())
    }
}
