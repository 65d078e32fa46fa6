//! Creation workflow engine.
//!
//! Drives a database from accepted request to READY across scheduler
//! ticks. The step processors hold no state; everything a step needs
//! arrives in the decoded continuation and the shared context, and the
//! dispatch table is a total match built at engine construction, so an
//! unknown step is unrepresentable at runtime.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use berth_envelope::Envelope;
use berth_queue::{QueueMessage, WorkQueue};
use berth_state::{ConnectionFacts, CreationRequest, DbStatus, Tenancy};

use crate::context::WorkflowContext;
use crate::error::{WorkflowError, WorkflowResult};
use crate::messages::{
    CreationMessage, CreationStep, MESSAGE_BODY, decode_attributes, encode_attributes,
};

/// Most messages handled per tick.
const MAX_BATCH: usize = 10;

/// One step processor of the creation state machine.
///
/// Returns the next step to enqueue, or `None` when the workflow is done
/// and the record should go READY.
#[async_trait]
trait CreateStepProcessor: Send + Sync {
    async fn process(
        &self,
        ctx: &WorkflowContext,
        database_id: &str,
        password: &str,
        request: &CreationRequest,
    ) -> WorkflowResult<Option<CreationStep>>;
}

/// Dispatch table, one field per step. Built once at engine construction;
/// the `match` in `get` is total over the step enum.
struct StepRegistry {
    instance: InstanceProcessor,
    instance_ready: InstanceReadyProcessor,
    schema: SchemaProcessor,
    clone: CloneProcessor,
}

impl StepRegistry {
    fn new() -> Self {
        Self {
            instance: InstanceProcessor,
            instance_ready: InstanceReadyProcessor,
            schema: SchemaProcessor,
            clone: CloneProcessor,
        }
    }

    fn get(&self, step: CreationStep) -> &dyn CreateStepProcessor {
        match step {
            CreationStep::Instance => &self.instance,
            CreationStep::InstanceReady => &self.instance_ready,
            CreationStep::Schema => &self.schema,
            CreationStep::Clone => &self.clone,
        }
    }
}

/// The creation engine: request intake plus the queue poller.
pub struct CreationEngine {
    ctx: Arc<WorkflowContext>,
    queue: Arc<dyn WorkQueue>,
    envelope: Envelope,
    registry: StepRegistry,
}

impl CreationEngine {
    pub fn new(ctx: Arc<WorkflowContext>, queue: Arc<dyn WorkQueue>, envelope: Envelope) -> Self {
        Self {
            ctx,
            queue,
            envelope,
            registry: StepRegistry::new(),
        }
    }

    /// Accept a creation request: allocate the id and password, record
    /// CREATING, and enqueue the first step. Returns `(database_id,
    /// password)` for the caller's response.
    pub async fn request_creation(
        &self,
        request: CreationRequest,
    ) -> WorkflowResult<(String, String)> {
        let database_id = self.ctx.allocator.allocate(&request.category);
        debug!(database_id, "starting creation process");

        let password = berth_config::secrets::generate_password();
        let first_step = match request.tenancy {
            Tenancy::Dedicated => CreationStep::Instance,
            Tenancy::Shared => CreationStep::Schema,
        };

        self.ctx.store.update_status(
            &database_id,
            DbStatus::Creating,
            Some(format!("{database_id} is still being created")),
        )?;
        debug!(database_id, "record added to the status store");

        self.request_step(&database_id, &password, first_step, &request)
            .await?;
        debug!(database_id, step = ?first_step, "creation step enqueued");

        Ok((database_id, password))
    }

    /// Seal and enqueue one continuation.
    pub async fn request_step(
        &self,
        database_id: &str,
        password: &str,
        step: CreationStep,
        request: &CreationRequest,
    ) -> WorkflowResult<()> {
        let message = CreationMessage {
            database_id: database_id.to_string(),
            password: password.to_string(),
            step,
            request: request.clone(),
        };
        let attributes = encode_attributes(&self.envelope, &message).map_err(|e| {
            error!(database_id, error = %e, "error sealing creation message");
            WorkflowError::Envelope(e)
        })?;
        self.queue.send(MESSAGE_BODY, attributes).await?;
        Ok(())
    }

    /// Fixed-rate poll loop; owned by the daemon supervisor via the
    /// shutdown channel.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let tick = Duration::from_secs(self.ctx.config.creation_queue.tick_secs);
        info!(tick_secs = tick.as_secs(), "creation engine started");

        loop {
            tokio::select! {
                _ = tokio::time::sleep(tick) => {
                    if let Err(e) = self.tick().await {
                        error!(error = %e, "creation tick failed");
                    }
                }
                _ = shutdown.changed() => {
                    info!("creation engine shutting down");
                    break;
                }
            }
        }
    }

    /// One poll: receive a batch and process it sequentially. Every
    /// non-skipped message is acknowledged exactly once, whatever its
    /// outcome.
    pub async fn tick(&self) -> WorkflowResult<()> {
        let batch = self.queue.receive(MAX_BATCH).await?;
        for message in batch {
            if message.attributes.is_empty() {
                // Not yet deliverable; leave unacknowledged so the queue
                // redelivers it.
                continue;
            }
            self.process_message(&message).await;
            if let Err(e) = self.queue.ack(&message.receipt).await {
                warn!(error = %e, "error acknowledging creation message");
            }
        }
        Ok(())
    }

    async fn process_message(&self, queued: &QueueMessage) {
        self.ctx.metrics.inc("creation_steps_received");

        let message: CreationMessage = match decode_attributes(&self.envelope, queued) {
            Ok(message) => message,
            Err(e) => {
                // The database id is inside the ciphertext, so the error
                // record can only land on the empty id.
                error!(error = %e, "error decoding received creation message");
                self.record_error("", &e.to_string());
                return;
            }
        };

        debug!(
            step = ?message.step,
            database_id = %message.database_id,
            "processing creation step"
        );

        let outcome = self
            .registry
            .get(message.step)
            .process(
                &self.ctx,
                &message.database_id,
                &message.password,
                &message.request,
            )
            .await;

        match outcome {
            Ok(Some(next)) => {
                if let Err(e) = self
                    .request_step(&message.database_id, &message.password, next, &message.request)
                    .await
                {
                    error!(
                        database_id = %message.database_id,
                        step = ?next,
                        error = %e,
                        "error enqueueing next creation step"
                    );
                    self.record_error(&message.database_id, &e.to_string());
                }
            }
            Ok(None) => {
                if let Err(e) =
                    self.ctx
                        .store
                        .update_status(&message.database_id, DbStatus::Ready, None)
                {
                    error!(database_id = %message.database_id, error = %e, "error marking record ready");
                }
            }
            Err(e) => {
                error!(
                    database_id = %message.database_id,
                    step = ?message.step,
                    error = %e,
                    "error processing creation step"
                );
                self.record_error(&message.database_id, &e.to_string());
            }
        }
    }

    fn record_error(&self, database_id: &str, message: &str) {
        self.ctx.metrics.inc("creation_steps_failed");
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

/// INSTANCE: request a dedicated host sized per request or template.
struct InstanceProcessor;

#[async_trait]
impl CreateStepProcessor for InstanceProcessor {
    async fn process(
        &self,
        ctx: &WorkflowContext,
        database_id: &str,
        password: &str,
        request: &CreationRequest,
    ) -> WorkflowResult<Option<CreationStep>> {
        debug!(database_id, "instance creation step beginning");

        let template = &ctx.config.host_template;
        let instance_class = request
            .instance_class
            .as_deref()
            .unwrap_or(&template.instance_class);
        let storage_gb = request.instance_storage_gb.unwrap_or(template.storage_gb);

        let host_name = ctx.allocator.host_name(database_id);
        let host = ctx
            .fleet
            .create_dedicated_host(
                &host_name,
                password,
                &request.service_tag,
                &request.service_component_tag,
                instance_class,
                storage_gb,
            )
            .await?;

        // Provisional record until the host is up: no endpoint yet.
        let facts = ConnectionFacts {
            host: "pending".to_string(),
            user: host.master_user.clone(),
            port: -1,
            schema: host.db_name.clone(),
        };
        ctx.store.put_facts(
            database_id,
            &facts,
            &ctx.allocator.instance_id(&host.id),
            request.tenancy,
            request.locality,
            &request.service_tag,
        )?;

        Ok(Some(CreationStep::InstanceReady))
    }
}

/// INSTANCE_READY: poll the host; self-loop until it is ready, then
/// write the final connection facts.
struct InstanceReadyProcessor;

#[async_trait]
impl CreateStepProcessor for InstanceReadyProcessor {
    async fn process(
        &self,
        ctx: &WorkflowContext,
        database_id: &str,
        _password: &str,
        request: &CreationRequest,
    ) -> WorkflowResult<Option<CreationStep>> {
        debug!(database_id, "instance readiness poll");

        let record = ctx
            .store
            .get(database_id)?
            .ok_or_else(|| WorkflowError::NotFound(database_id.to_string()))?;
        let instance_id = record
            .instance_id
            .ok_or_else(|| WorkflowError::NotFound(database_id.to_string()))?;

        let host_name = ctx.allocator.host_name(&instance_id);
        let Some(host) = ctx.fleet.get_host(&host_name).await else {
            // Disappearing between steps is fatal for creation.
            return Err(WorkflowError::HostNotFound(host_name));
        };

        if !ctx.fleet.is_ready(&host) {
            return Ok(Some(CreationStep::InstanceReady));
        }

        let endpoint = host
            .endpoint
            .as_ref()
            .ok_or_else(|| WorkflowError::HostNotFound(host.id.clone()))?;
        let facts = ConnectionFacts {
            host: endpoint.address.clone(),
            user: host.master_user.clone(),
            port: endpoint.port as i32,
            schema: host.db_name.clone(),
        };
        ctx.store.put_facts(
            database_id,
            &facts,
            &instance_id,
            request.tenancy,
            request.locality,
            &request.service_tag,
        )?;

        Ok(Some(CreationStep::Schema))
    }
}

/// SCHEMA: place (shared) or resolve (dedicated) the host, then create
/// the tenant schema and role on it.
struct SchemaProcessor;

#[async_trait]
impl CreateStepProcessor for SchemaProcessor {
    async fn process(
        &self,
        ctx: &WorkflowContext,
        database_id: &str,
        password: &str,
        request: &CreationRequest,
    ) -> WorkflowResult<Option<CreationStep>> {
        debug!(database_id, "schema creation beginning");

        let schema_name = database_id;
        let user = database_id;

        let (host, master) = match request.tenancy {
            Tenancy::Shared => {
                debug!(database_id, "creating schema on a shared host");
                let candidate = ctx
                    .placement
                    .find_shared_host()
                    .await?
                    .ok_or_else(|| WorkflowError::Capacity(database_id.to_string()))?;
                let master = ctx.master_connection(&candidate.host)?;
                (candidate.host, master)
            }
            Tenancy::Dedicated => {
                debug!(database_id, "creating schema on the dedicated host");
                let record = ctx
                    .store
                    .get(database_id)?
                    .ok_or_else(|| WorkflowError::NotFound(database_id.to_string()))?;
                let instance_id = record
                    .instance_id
                    .ok_or_else(|| WorkflowError::NotFound(database_id.to_string()))?;
                let host_name = ctx.allocator.host_name(&instance_id);
                let host = ctx
                    .fleet
                    .get_host(&host_name)
                    .await
                    .ok_or(WorkflowError::HostNotFound(host_name))?;
                let master = ctx.dedicated_master_connection(&host, password)?;
                (host, master)
            }
        };

        ctx.schema
            .create_schema(&master, schema_name, user, password)
            .await?;

        let endpoint = host
            .endpoint
            .as_ref()
            .ok_or_else(|| WorkflowError::HostNotFound(host.id.clone()))?;
        let facts = ConnectionFacts {
            host: endpoint.address.clone(),
            user: user.to_string(),
            port: endpoint.port as i32,
            schema: schema_name.to_string(),
        };
        ctx.store.put_facts(
            database_id,
            &facts,
            &ctx.allocator.instance_id(&host.id),
            request.tenancy,
            request.locality,
            &request.service_tag,
        )?;
        debug!(database_id, host = %facts.host, "schema step completed");

        if request.source_database_id.is_some() {
            Ok(Some(CreationStep::Clone))
        } else {
            Ok(None)
        }
    }
}

/// CLONE: seed the fresh schema from the source database.
struct CloneProcessor;

#[async_trait]
impl CreateStepProcessor for CloneProcessor {
    async fn process(
        &self,
        ctx: &WorkflowContext,
        database_id: &str,
        password: &str,
        request: &CreationRequest,
    ) -> WorkflowResult<Option<CreationStep>> {
        debug!(database_id, "cloning step beginning");

        let source_id = request
            .source_database_id
            .as_deref()
            .ok_or_else(|| WorkflowError::MissingCloneSource(database_id.to_string()))?;

        let target_record = ctx
            .store
            .get(database_id)?
            .ok_or_else(|| WorkflowError::NotFound(database_id.to_string()))?;
        let target_facts = target_record
            .connection()
            .ok_or_else(|| WorkflowError::NotFound(database_id.to_string()))?;
        let target_instance = target_record
            .instance_id
            .clone()
            .ok_or_else(|| WorkflowError::NotFound(database_id.to_string()))?;
        let target_host_name = ctx.allocator.host_name(&target_instance);
        let target_host = ctx
            .fleet
            .get_host(&target_host_name)
            .await
            .ok_or(WorkflowError::HostNotFound(target_host_name))?;

        let source_record = ctx
            .store
            .get(source_id)?
            .ok_or_else(|| WorkflowError::NotFound(source_id.to_string()))?;
        let source_facts = source_record
            .connection()
            .ok_or_else(|| WorkflowError::NotFound(source_id.to_string()))?;

        let source_master = if source_facts.host == target_facts.host {
            // Same-host fast path: reuse the target host's master
            // credentials.
            match target_record.tenancy {
                Some(Tenancy::Dedicated) => {
                    ctx.dedicated_master_connection(&target_host, password)?
                }
                _ => ctx.master_connection(&target_host)?,
            }
        } else {
            let source_instance = source_record
                .instance_id
                .ok_or_else(|| WorkflowError::NotFound(source_id.to_string()))?;
            let source_host_name = ctx.allocator.host_name(&source_instance);
            let source_host = ctx
                .fleet
                .get_host(&source_host_name)
                .await
                .ok_or(WorkflowError::HostNotFound(source_host_name))?;
            ctx.master_connection(&source_host)?
        };

        let target_conn = berth_provider::SqlConnection {
            host: target_facts.host.clone(),
            port: target_facts.port as u16,
            user: target_facts.user.clone(),
            password: password.to_string(),
            database: target_facts.schema.clone(),
        };

        debug!(
            source_schema = %source_facts.schema,
            target_schema = %target_conn.database,
            "cloning starting"
        );
        ctx.cloner
            .clone_schema(&source_master, &source_facts.schema, &target_conn)
            .await?;

        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    use berth_config::{BerthConfig, MasterCredentials, PasswordVault};
    use berth_fleet::{FleetManager, tag_keys};
    use berth_ids::IdAllocator;
    use berth_metrics::Metrics;
    use berth_placement::PlacementSelector;
    use berth_provider::{
        HostProvider, HostSpec, MemoryClone, MemoryFleet, MemorySql, Tag,
    };
    use berth_queue::{AttributeValue, MemoryQueue};
    use berth_schema::{CloneRunner, SchemaManager};
    use berth_state::{DatabaseRecord, Locality, RecordStore};

    struct Harness {
        engine: Arc<CreationEngine>,
        ctx: Arc<WorkflowContext>,
        fleet: Arc<MemoryFleet>,
        sql: Arc<MemorySql>,
        cloner: Arc<MemoryClone>,
        queue: Arc<MemoryQueue>,
        envelope: Envelope,
    }

    fn harness() -> Harness {
        let config = Arc::new(BerthConfig::sample());
        let fleet = Arc::new(MemoryFleet::new());
        let sql = Arc::new(MemorySql::new());
        let cloner = Arc::new(MemoryClone::new());
        let queue = Arc::new(MemoryQueue::new("berth-create", Duration::from_secs(30)));
        let metrics = Metrics::new();
        let manager = Arc::new(FleetManager::new(fleet.clone(), config.clone()));
        let vault = PasswordVault::from_entries([(
            "blue_pool_1".to_string(),
            MasterCredentials {
                username: "postgres".to_string(),
                password: "hunter2".to_string(),
            },
        )]);

        let ctx = Arc::new(WorkflowContext {
            config: config.clone(),
            store: RecordStore::open_in_memory().unwrap(),
            fleet: manager.clone(),
            allocator: IdAllocator::new(&config.identifier_prefix),
            placement: PlacementSelector::new(manager, config.clone(), metrics.clone()),
            schema: SchemaManager::new(sql.clone()),
            cloner: CloneRunner::new(cloner.clone(), config.clone_config.clone(), metrics.clone()),
            vault,
            metrics,
        });
        let envelope = Envelope::derive("open sesame", "sel gris");
        let engine = Arc::new(CreationEngine::new(
            ctx.clone(),
            queue.clone(),
            envelope.clone(),
        ));
        Harness {
            engine,
            ctx,
            fleet,
            sql,
            cloner,
            queue,
            envelope,
        }
    }

    fn pool_spec(id: &str) -> HostSpec {
        HostSpec {
            id: id.to_string(),
            master_user: "postgres".to_string(),
            master_password: "hunter2".to_string(),
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
            tags: vec![Tag::new(tag_keys::FLEET_DEFAULT, "berth-managed")],
        }
    }

    async fn add_pool_host(h: &Harness) {
        h.fleet
            .create_host(&pool_spec("berth-stage-blue-pool-1"))
            .await
            .unwrap();
        h.fleet.set_status("berth-stage-blue-pool-1", "available").await;
    }

    fn shared_request() -> CreationRequest {
        CreationRequest {
            category: "acme".to_string(),
            tenancy: Tenancy::Shared,
            locality: Locality::Us,
            instance_class: None,
            instance_storage_gb: None,
            source_database_id: None,
            service_tag: "acme".to_string(),
            service_component_tag: "acme-api".to_string(),
            highly_available: false,
        }
    }

    fn dedicated_request(source: Option<&str>) -> CreationRequest {
        CreationRequest {
            tenancy: Tenancy::Dedicated,
            instance_class: Some("r4.xlarge".to_string()),
            instance_storage_gb: Some(200),
            source_database_id: source.map(str::to_string),
            ..shared_request()
        }
    }

    #[tokio::test]
    async fn shared_creation_reaches_ready_after_one_schema_step() {
        let h = harness();
        add_pool_host(&h).await;

        let (database_id, password) = h
            .engine
            .request_creation(shared_request())
            .await
            .unwrap();
        assert!(!password.is_empty());
        assert_eq!(
            h.ctx.store.get(&database_id).unwrap().unwrap().status,
            DbStatus::Creating
        );
        assert_eq!(h.queue.depth().await, 1);

        h.engine.tick().await.unwrap();

        let record = h.ctx.store.get(&database_id).unwrap().unwrap();
        assert_eq!(record.status, DbStatus::Ready);
        let facts = record.connection().unwrap();
        assert_eq!(facts.host, "berth-stage-blue-pool-1.db.internal");
        assert_eq!(facts.user, database_id);
        assert_eq!(facts.schema, database_id);
        assert_eq!(record.instance_id.as_deref(), Some("blue_pool_1"));

        let statements = h.sql.statements().await;
        assert!(statements.iter().any(|s| s.contains("CREATE DATABASE")));
        // Queue fully drained and acknowledged.
        assert!(h.queue.receive(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn dedicated_creation_with_clone_walks_every_step() {
        let h = harness();
        add_pool_host(&h).await;

        // Source database living on the shared pool host.
        let mut source = DatabaseRecord::new("src_1", DbStatus::Ready, None);
        source.host = Some("berth-stage-blue-pool-1.db.internal".to_string());
        source.user = Some("src_1".to_string());
        source.port = Some(5432);
        source.schema = Some("src_1".to_string());
        source.instance_id = Some("blue_pool_1".to_string());
        source.tenancy = Some(Tenancy::Shared);
        h.ctx.store.put(&source).unwrap();

        let (database_id, _) = h
            .engine
            .request_creation(dedicated_request(Some("src_1")))
            .await
            .unwrap();
        let host_name = h.ctx.allocator.host_name(&database_id);

        // INSTANCE: host requested, provisional record written.
        h.engine.tick().await.unwrap();
        let record = h.ctx.store.get(&database_id).unwrap().unwrap();
        assert_eq!(record.host.as_deref(), Some("pending"));
        assert_eq!(record.port, Some(-1));
        let host = h.fleet.describe_host(&host_name).await.unwrap().unwrap();
        assert_eq!(host.instance_class, "db.r4.xlarge");
        assert_eq!(host.storage_gb, 200);

        // INSTANCE_READY self-loops while the host is still creating.
        h.engine.tick().await.unwrap();
        assert_eq!(
            h.ctx.store.get(&database_id).unwrap().unwrap().status,
            DbStatus::Creating
        );
        assert_eq!(h.queue.depth().await, 1);

        // Host comes up; INSTANCE_READY writes the real endpoint.
        h.fleet.set_status(&host_name, "available").await;
        h.engine.tick().await.unwrap();
        let record = h.ctx.store.get(&database_id).unwrap().unwrap();
        assert_eq!(
            record.host.as_deref(),
            Some(format!("{host_name}.db.internal").as_str())
        );

        // SCHEMA runs on the dedicated master connection.
        h.engine.tick().await.unwrap();
        let statements = h.sql.statements().await;
        assert!(statements.iter().any(|s| s.contains(&format!("CREATE DATABASE {database_id}"))));

        // CLONE runs the utility and the record goes READY.
        h.engine.tick().await.unwrap();
        let record = h.ctx.store.get(&database_id).unwrap().unwrap();
        assert_eq!(record.status, DbStatus::Ready);

        let commands = h.cloner.commands().await;
        assert_eq!(commands.len(), 1);
        assert!(commands[0].contains("berth-stage-blue-pool-1.db.internal"));
        assert!(commands[0].contains(&format!("{host_name}.db.internal")));
        assert!(commands[0].contains("src_1"));
    }

    #[tokio::test]
    async fn no_capacity_is_fatal_with_one_status_write_and_one_ack() {
        let h = harness();
        // No hosts at all.
        let (database_id, _) = h.engine.request_creation(shared_request()).await.unwrap();

        h.engine.tick().await.unwrap();

        let record = h.ctx.store.get(&database_id).unwrap().unwrap();
        assert_eq!(record.status, DbStatus::Error);
        assert!(record.status_message.unwrap().contains("no shared capacity"));
        // Acked: nothing left to receive, nothing in flight.
        assert!(h.queue.receive(10).await.unwrap().is_empty());
        assert_eq!(h.ctx.metrics.counter("creation_steps_failed"), 1);
    }

    #[tokio::test]
    async fn provider_rejection_surfaces_as_error_status() {
        let h = harness();
        h.fleet.reject_creates(true).await;

        let (database_id, _) = h
            .engine
            .request_creation(dedicated_request(None))
            .await
            .unwrap();
        h.engine.tick().await.unwrap();

        let record = h.ctx.store.get(&database_id).unwrap().unwrap();
        assert_eq!(record.status, DbStatus::Error);
        assert!(record.status_message.unwrap().contains("rejected"));
    }

    #[tokio::test]
    async fn unknown_version_sets_error_and_acknowledges() {
        let h = harness();
        let attributes = HashMap::from([
            (
                "version".to_string(),
                AttributeValue::String("v9".to_string()),
            ),
            ("iv".to_string(), AttributeValue::Binary(vec![0; 16])),
            ("payload".to_string(), AttributeValue::Binary(vec![0; 32])),
        ]);
        h.queue.send(MESSAGE_BODY, attributes).await.unwrap();

        h.engine.tick().await.unwrap();

        // The id is unknowable, so the error record lands on the empty id.
        let record = h.ctx.store.get("").unwrap().unwrap();
        assert_eq!(record.status, DbStatus::Error);
        assert!(h.queue.receive(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn empty_attribute_messages_are_skipped_without_ack() {
        let config_tick = Duration::from_millis(20);
        let h = harness();
        let queue = Arc::new(MemoryQueue::new("berth-create", config_tick));
        let engine = CreationEngine::new(h.ctx.clone(), queue.clone(), h.envelope.clone());

        queue.send(MESSAGE_BODY, HashMap::new()).await.unwrap();
        engine.tick().await.unwrap();

        // Unacknowledged: the message comes back after the visibility
        // timeout.
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(queue.receive(10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn stale_redelivery_overwrites_terminal_status() {
        // Documents the accepted last-writer-wins design point: a stale
        // duplicate delivery processed after READY can regress the record.
        let h = harness();
        add_pool_host(&h).await;

        let (database_id, password) = h.engine.request_creation(shared_request()).await.unwrap();
        h.engine.tick().await.unwrap();
        assert_eq!(
            h.ctx.store.get(&database_id).unwrap().unwrap().status,
            DbStatus::Ready
        );

        // The queue redelivers the SCHEMA step after the fleet lost its
        // capacity; the processor fails and the ERROR write lands on a
        // READY record.
        h.fleet.delete_host("berth-stage-blue-pool-1").await.unwrap();
        h.engine
            .request_step(&database_id, &password, CreationStep::Schema, &shared_request())
            .await
            .unwrap();
        h.engine.tick().await.unwrap();

        assert_eq!(
            h.ctx.store.get(&database_id).unwrap().unwrap().status,
            DbStatus::Error
        );
    }
}
