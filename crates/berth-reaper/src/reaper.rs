//! The retention sweep.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use berth_config::OperatorToken;
use berth_state::{DatabaseRecord, Tenancy, store::now_ms};
use berth_workflow::{WorkflowContext, WorkflowError, WorkflowResult};

/// Result of one sweep.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct ReapSummary {
    pub examined: usize,
    pub reaped: usize,
    pub failed: usize,
}

/// Destroys soft-deleted databases past their retention window.
pub struct Reaper {
    ctx: Arc<WorkflowContext>,
    token: OperatorToken,
}

impl Reaper {
    pub fn new(ctx: Arc<WorkflowContext>, token: OperatorToken) -> Self {
        Self { ctx, token }
    }

    /// Operator-triggered sweep. The presented token must match the
    /// static operator token; this is a shared operator secret, not a
    /// per-user credential, so exact match is sufficient.
    pub async fn reap(&self, presented_token: &str) -> WorkflowResult<ReapSummary> {
        if !self.token.allows(presented_token) {
            return Err(WorkflowError::Forbidden);
        }
        self.sweep().await
    }

    /// One sweep over every DELETED record older than the retention
    /// delay. Each record stands alone; failures are counted, logged,
    /// and skipped.
    pub async fn sweep(&self) -> WorkflowResult<ReapSummary> {
        let retention_ms = self.ctx.config.reap_retention_secs * 1_000;
        let cutoff = now_ms().saturating_sub(retention_ms);
        let due = self.ctx.store.deleted_before(cutoff)?;

        let mut summary = ReapSummary {
            examined: due.len(),
            ..ReapSummary::default()
        };

        for record in due {
            match self.reap_one(&record).await {
                Ok(()) => {
                    summary.reaped += 1;
                    self.ctx.metrics.inc("records_reaped");
                }
                Err(e) => {
                    summary.failed += 1;
                    self.ctx.metrics.inc("reap_failures");
                    error!(
                        database_id = %record.id,
                        host = record.host.as_deref().unwrap_or("-"),
                        schema = record.schema.as_deref().unwrap_or("-"),
                        error = %e,
                        "error reaping database"
                    );
                }
            }
        }

        info!(
            examined = summary.examined,
            reaped = summary.reaped,
            failed = summary.failed,
            "reap sweep finished"
        );
        Ok(summary)
    }

    /// Destroy one record's backing resources, then remove the record.
    /// The record row survives any teardown failure.
    async fn reap_one(&self, record: &DatabaseRecord) -> WorkflowResult<()> {
        debug!(database_id = %record.id, "hard deleting");

        if let Some(instance_id) = &record.instance_id {
            let host_name = self.ctx.allocator.host_name(instance_id);
            match self.ctx.fleet.get_host(&host_name).await {
                Some(host) => match record.tenancy {
                    Some(Tenancy::Dedicated) => {
                        debug!(database_id = %record.id, host = %host.id, "deleting dedicated host");
                        self.ctx.fleet.delete_host(&host.id).await?;
                    }
                    _ => {
                        let facts = record
                            .connection()
                            .ok_or_else(|| WorkflowError::NotFound(record.id.clone()))?;
                        let master = self.ctx.master_connection(&host)?;
                        // Check before dropping so a second sweep stays
                        // idempotent.
                        if self.ctx.schema.schema_exists(&master, &facts.schema).await? {
                            self.ctx
                                .schema
                                .hard_delete_schema(&master, &facts.user, &facts.schema)
                                .await?;
                            warn!(schema = %facts.schema, host = %host.id, "schema dropped");
                        } else {
                            warn!(schema = %facts.schema, host = %host.id, "schema already gone");
                        }
                    }
                },
                None => {
                    warn!(database_id = %record.id, host = %host_name, "host not found for record");
                }
            }
        }

        self.ctx.store.delete(&record.id)?;
        Ok(())
    }

    /// Scheduled sweep loop; owned by the daemon supervisor via the
    /// shutdown channel.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let tick = Duration::from_secs(self.ctx.config.reap_tick_secs);
        info!(tick_secs = tick.as_secs(), "reaper started");

        loop {
            tokio::select! {
                _ = tokio::time::sleep(tick) => {
                    if let Err(e) = self.sweep().await {
                        error!(error = %e, "reap sweep failed");
                    }
                }
                _ = shutdown.changed() => {
                    info!("reaper shutting down");
                    break;
                }
            }
        }
    }
}
