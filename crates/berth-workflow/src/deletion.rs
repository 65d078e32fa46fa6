//! Deletion workflow engine.
//!
//! Dedicated databases are reclaimed in three steps: wait for the host to
//! be strictly available, rotate its master password (revoking the old
//! credential), then wait for the host to settle and hand the new
//! password to the tenant schema's own role. Host absence at any step is
//! "not ready yet" and self-loops; deletion must ride out transient host
//! visibility gaps rather than fail.
//!
//! Shared databases never enter this engine; they are reclaimed
//! synchronously in `service::DatabaseService::delete_database`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use berth_envelope::Envelope;
use berth_queue::{QueueMessage, WorkQueue};
use berth_state::DbStatus;

use crate::context::WorkflowContext;
use crate::error::{WorkflowError, WorkflowResult};
use crate::messages::{
    DeletionMessage, DeletionStep, MESSAGE_BODY, decode_attributes, encode_attributes,
};

const MAX_BATCH: usize = 10;

/// One step processor of the deletion state machine.
#[async_trait]
trait DeleteStepProcessor: Send + Sync {
    async fn process(
        &self,
        ctx: &WorkflowContext,
        database_id: &str,
        password: &str,
    ) -> WorkflowResult<Option<DeletionStep>>;
}

/// Dispatch table, total over the step enum, built once.
struct StepRegistry {
    preparing: PreparingProcessor,
    deleting: DeletingProcessor,
    resetting_password: ResettingPasswordProcessor,
}

impl StepRegistry {
    fn new() -> Self {
        Self {
            preparing: PreparingProcessor,
            deleting: DeletingProcessor,
            resetting_password: ResettingPasswordProcessor,
        }
    }

    fn get(&self, step: DeletionStep) -> &dyn DeleteStepProcessor {
        match step {
            DeletionStep::Preparing => &self.preparing,
            DeletionStep::Deleting => &self.deleting,
            DeletionStep::ResettingPassword => &self.resetting_password,
        }
    }
}

/// The deletion engine: soft-delete intake plus the queue poller.
pub struct DeletionEngine {
    ctx: Arc<WorkflowContext>,
    queue: Arc<dyn WorkQueue>,
    envelope: Envelope,
    registry: StepRegistry,
}

impl DeletionEngine {
    pub fn new(ctx: Arc<WorkflowContext>, queue: Arc<dyn WorkQueue>, envelope: Envelope) -> Self {
        Self {
            ctx,
            queue,
            envelope,
            registry: StepRegistry::new(),
        }
    }

    /// Mark the record DELETING and enqueue the first deletion step with
    /// a fresh password. Once this runs there is no cancelling; the
    /// workflow drives to DELETED.
    pub async fn request_soft_delete(&self, database_id: &str) -> WorkflowResult<()> {
        self.ctx
            .store
            .update_status(database_id, DbStatus::Deleting, None)?;
        let password = berth_config::secrets::generate_password();
        self.request_step(database_id, DeletionStep::Preparing, &password)
            .await
    }

    /// Seal and enqueue one deletion continuation.
    pub async fn request_step(
        &self,
        database_id: &str,
        step: DeletionStep,
        password: &str,
    ) -> WorkflowResult<()> {
        let message = DeletionMessage {
            database_id: database_id.to_string(),
            step,
            password: password.to_string(),
        };
        let attributes = encode_attributes(&self.envelope, &message).map_err(|e| {
            error!(database_id, error = %e, "error sealing deletion message");
            WorkflowError::Envelope(e)
        })?;
        self.queue.send(MESSAGE_BODY, attributes).await?;
        Ok(())
    }

    /// Fixed-rate poll loop; owned by the daemon supervisor via the
    /// shutdown channel.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let tick = Duration::from_secs(self.ctx.config.deletion_queue.tick_secs);
        info!(tick_secs = tick.as_secs(), "deletion engine started");

        loop {
            tokio::select! {
                _ = tokio::time::sleep(tick) => {
                    if let Err(e) = self.tick().await {
                        error!(error = %e, "deletion tick failed");
                    }
                }
                _ = shutdown.changed() => {
                    info!("deletion engine shutting down");
                    break;
                }
            }
        }
    }

    /// One poll: receive a batch, process sequentially, acknowledge each
    /// non-skipped message exactly once.
    pub async fn tick(&self) -> WorkflowResult<()> {
        let batch = self.queue.receive(MAX_BATCH).await?;
        for message in batch {
            if message.attributes.is_empty() {
                continue;
            }
            self.process_message(&message).await;
            if let Err(e) = self.queue.ack(&message.receipt).await {
                warn!(error = %e, "error acknowledging deletion message");
            }
        }
        Ok(())
    }

    async fn process_message(&self, queued: &QueueMessage) {
        self.ctx.metrics.inc("deletion_steps_received");

        let message: DeletionMessage = match decode_attributes(&self.envelope, queued) {
            Ok(message) => message,
            Err(e) => {
                error!(error = %e, "error decoding received deletion message");
                self.record_error("", &e.to_string());
                return;
            }
        };

        debug!(
            step = ?message.step,
            database_id = %message.database_id,
            "processing deletion step"
        );

        let outcome = self
            .registry
            .get(message.step)
            .process(&self.ctx, &message.database_id, &message.password)
            .await;

        match outcome {
            Ok(Some(next)) => {
                if let Err(e) = self
                    .request_step(&message.database_id, next, &message.password)
                    .await
                {
                    error!(
                        database_id = %message.database_id,
                        step = ?next,
                        error = %e,
                        "error enqueueing next deletion step"
                    );
                    self.record_error(&message.database_id, &e.to_string());
                }
            }
            Ok(None) => {
                if let Err(e) =
                    self.ctx
                        .store
                        .update_status(&message.database_id, DbStatus::Deleted, None)
                {
                    error!(database_id = %message.database_id, error = %e, "error marking record deleted");
                }
            }
            Err(e) => {
                let status_message = format!("Error processing deletion step: {e}");
                error!(database_id = %message.database_id, "{status_message}");
                self.record_error(&message.database_id, &status_message);
            }
        }
    }

    fn record_error(&self, database_id: &str, message: &str) {
        self.ctx.metrics.inc("deletion_steps_failed");
        if let Err(e) =
            self.ctx
                .store
                .update_status(database_id, DbStatus::Error, Some(message.to_string()))
        {
            error!(database_id, error = %e, "error writing ERROR status");
        }
    }
}

// ── Step processors ────────────────────────────────────────────────

/// PREPARING: wait until the host is strictly available before touching
/// its credentials.
struct PreparingProcessor;

#[async_trait]
impl DeleteStepProcessor for PreparingProcessor {
    async fn process(
        &self,
        ctx: &WorkflowContext,
        database_id: &str,
        _password: &str,
    ) -> WorkflowResult<Option<DeletionStep>> {
        debug!(database_id, "checking whether host is ready for password rotation");

        let host_name = ctx.allocator.host_name(database_id);
        let Some(host) = ctx.fleet.get_host(&host_name).await else {
            return Ok(Some(DeletionStep::Preparing));
        };

        if ctx.fleet.is_available(&host) {
            Ok(Some(DeletionStep::Deleting))
        } else {
            Ok(Some(DeletionStep::Preparing))
        }
    }
}

/// DELETING: rotate the host master password. The old credential dies
/// here; anything still connecting with it is cut off.
struct DeletingProcessor;

#[async_trait]
impl DeleteStepProcessor for DeletingProcessor {
    async fn process(
        &self,
        ctx: &WorkflowContext,
        database_id: &str,
        password: &str,
    ) -> WorkflowResult<Option<DeletionStep>> {
        debug!(database_id, "rotating host master password");

        let host_name = ctx.allocator.host_name(database_id);
        let Some(host) = ctx.fleet.get_host(&host_name).await else {
            return Ok(Some(DeletionStep::Deleting));
        };

        ctx.fleet.modify_master_password(&host.id, password).await?;
        Ok(Some(DeletionStep::ResettingPassword))
    }
}

/// RESETTING_PASSWORD: wait for the rotation to settle, then apply the
/// same password to the tenant schema's role, completing the handoff.
struct ResettingPasswordProcessor;

#[async_trait]
impl DeleteStepProcessor for ResettingPasswordProcessor {
    async fn process(
        &self,
        ctx: &WorkflowContext,
        database_id: &str,
        password: &str,
    ) -> WorkflowResult<Option<DeletionStep>> {
        debug!(database_id, "checking whether password rotation settled");

        let host_name = ctx.allocator.host_name(database_id);
        let Some(host) = ctx.fleet.get_host(&host_name).await else {
            return Ok(Some(DeletionStep::ResettingPassword));
        };

        if !ctx.fleet.is_ready(&host) {
            return Ok(Some(DeletionStep::ResettingPassword));
        }

        let master = ctx.dedicated_master_connection(&host, password)?;
        ctx.schema
            .change_schema_password(&master, database_id, database_id, password)
            .await?;
        debug!(database_id, "password handoff finished");
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use berth_config::{BerthConfig, PasswordVault};
    use berth_fleet::FleetManager;
    use berth_ids::IdAllocator;
    use berth_metrics::Metrics;
    use berth_placement::PlacementSelector;
    use berth_provider::{MemoryClone, MemoryFleet, MemorySql};
    use berth_queue::MemoryQueue;
    use berth_schema::{CloneRunner, SchemaManager};
    use berth_state::RecordStore;

    struct Harness {
        engine: Arc<DeletionEngine>,
        ctx: Arc<WorkflowContext>,
        fleet: Arc<MemoryFleet>,
        sql: Arc<MemorySql>,
        queue: Arc<MemoryQueue>,
    }

    fn harness() -> Harness {
        let config = Arc::new(BerthConfig::sample());
        let fleet = Arc::new(MemoryFleet::new());
        let sql = Arc::new(MemorySql::new());
        let queue = Arc::new(MemoryQueue::new("berth-delete", Duration::from_secs(30)));
        let metrics = Metrics::new();
        let manager = Arc::new(FleetManager::new(fleet.clone(), config.clone()));

        let ctx = Arc::new(WorkflowContext {
            config: config.clone(),
            store: RecordStore::open_in_memory().unwrap(),
            fleet: manager.clone(),
            allocator: IdAllocator::new(&config.identifier_prefix),
            placement: PlacementSelector::new(manager, config.clone(), metrics.clone()),
            schema: SchemaManager::new(sql.clone()),
            cloner: CloneRunner::new(
                Arc::new(MemoryClone::new()),
                config.clone_config.clone(),
                metrics.clone(),
            ),
            vault: PasswordVault::default(),
            metrics,
        });
        let engine = Arc::new(DeletionEngine::new(
            ctx.clone(),
            queue.clone(),
            Envelope::derive("open sesame", "sel gris"),
        ));
        Harness {
            engine,
            ctx,
            fleet,
            sql,
            queue,
        }
    }

    /// Put a dedicated host for the database into the fleet.
    async fn add_dedicated_host(h: &Harness, database_id: &str, status: &str) -> String {
        let host_name = h.ctx.allocator.host_name(database_id);
        let spec = berth_provider::HostSpec {
            id: host_name.clone(),
            master_user: "postgres".to_string(),
            master_password: "old-master".to_string(),
            instance_class: "db.m4.large".to_string(),
            storage_gb: 100,
            engine: "postgres".to_string(),
            engine_version: "15.4".to_string(),
            db_name: "postgres".to_string(),
            port: 5432,
            multi_az: false,
            publicly_accessible: false,
            subnet_group: String::new(),
            security_group: String::new(),
            tags: vec![],
        };
        use berth_provider::HostProvider;
        h.fleet.create_host(&spec).await.unwrap();
        h.fleet.set_status(&host_name, status).await;
        host_name
    }

    #[tokio::test]
    async fn soft_delete_marks_deleting_and_enqueues_preparing() {
        let h = harness();
        h.engine.request_soft_delete("acme_1a2b").await.unwrap();

        let record = h.ctx.store.get("acme_1a2b").unwrap().unwrap();
        assert_eq!(record.status, DbStatus::Deleting);
        assert_eq!(h.queue.depth().await, 1);
    }

    #[tokio::test]
    async fn full_deletion_progression() {
        let h = harness();
        let host_name = add_dedicated_host(&h, "acme_1a2b", "available").await;
        h.engine.request_soft_delete("acme_1a2b").await.unwrap();

        // PREPARING: host available, advance to DELETING.
        h.engine.tick().await.unwrap();
        assert_eq!(
            h.ctx.store.get("acme_1a2b").unwrap().unwrap().status,
            DbStatus::Deleting
        );

        // DELETING: master password rotated; host starts resetting.
        h.engine.tick().await.unwrap();
        use berth_provider::HostProvider;
        let host = h.fleet.describe_host(&host_name).await.unwrap().unwrap();
        assert_eq!(host.status, "resetting-master-credentials");

        // RESETTING_PASSWORD self-loops while the rotation settles.
        h.engine.tick().await.unwrap();
        assert_eq!(
            h.ctx.store.get("acme_1a2b").unwrap().unwrap().status,
            DbStatus::Deleting
        );
        assert_eq!(h.queue.depth().await, 1);

        // Host settles; the schema role gets the new password and the
        // record goes DELETED.
        h.fleet.set_status(&host_name, "available").await;
        h.engine.tick().await.unwrap();
        assert_eq!(
            h.ctx.store.get("acme_1a2b").unwrap().unwrap().status,
            DbStatus::Deleted
        );
        let statements = h.sql.statements().await;
        assert!(statements.iter().any(|s| s.starts_with("ALTER USER acme_1a2b")));
        assert!(h.queue.receive(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn preparing_self_loops_when_host_absent() {
        let h = harness();
        let next = PreparingProcessor
            .process(&h.ctx, "ghost_1", "p4ss")
            .await
            .unwrap();
        assert_eq!(next, Some(DeletionStep::Preparing));
    }

    #[tokio::test]
    async fn deleting_self_loops_when_host_absent() {
        let h = harness();
        let next = DeletingProcessor
            .process(&h.ctx, "ghost_1", "p4ss")
            .await
            .unwrap();
        assert_eq!(next, Some(DeletionStep::Deleting));
    }

    #[tokio::test]
    async fn resetting_password_self_loops_when_host_absent() {
        let h = harness();
        let next = ResettingPasswordProcessor
            .process(&h.ctx, "ghost_1", "p4ss")
            .await
            .unwrap();
        assert_eq!(next, Some(DeletionStep::ResettingPassword));
    }

    #[tokio::test]
    async fn preparing_self_loops_until_strictly_available() {
        let h = harness();
        add_dedicated_host(&h, "acme_1a2b", "backing-up").await;
        // backing-up is ready for creation but not available for deletion.
        let next = PreparingProcessor
            .process(&h.ctx, "acme_1a2b", "p4ss")
            .await
            .unwrap();
        assert_eq!(next, Some(DeletionStep::Preparing));
    }

    #[tokio::test]
    async fn schema_failure_during_handoff_sets_error_status() {
        let h = harness();
        let host_name = add_dedicated_host(&h, "acme_1a2b", "available").await;
        h.fleet.set_status(&host_name, "available").await;
        h.sql.fail_on("ALTER USER").await;

        h.engine
            .request_step("acme_1a2b", DeletionStep::ResettingPassword, "p4ss")
            .await
            .unwrap();
        h.engine.tick().await.unwrap();

        let record = h.ctx.store.get("acme_1a2b").unwrap().unwrap();
        assert_eq!(record.status, DbStatus::Error);
        assert!(record
            .status_message
            .unwrap()
            .starts_with("Error processing deletion step"));
    }
}
