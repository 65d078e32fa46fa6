//! Clone utility invocation.
//!
//! Renders the configured command template with source/target connection
//! parameters and runs it through the `CloneTool` contract under a hard
//! timeout. Stdout is logged; stderr is accumulated and becomes the error
//! message on failure.

use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info};

use berth_config::CloneConfig;
use berth_metrics::Metrics;
use berth_provider::{CloneTool, SqlConnection};

use crate::error::{SchemaError, SchemaResult};

/// Timer name for clone runs.
pub const CLONE_TIMER: &str = "clone_duration";

/// Runs the external clone utility.
pub struct CloneRunner {
    tool: Arc<dyn CloneTool>,
    config: CloneConfig,
    metrics: Metrics,
}

impl CloneRunner {
    pub fn new(tool: Arc<dyn CloneTool>, config: CloneConfig, metrics: Metrics) -> Self {
        Self {
            tool,
            config,
            metrics,
        }
    }

    /// Clone `source_schema` on the source connection into the target
    /// connection's schema. Any failure (non-zero exit, timeout, tool
    /// error) is fatal and reported with the accumulated stderr.
    pub async fn clone_schema(
        &self,
        source: &SqlConnection,
        source_schema: &str,
        target: &SqlConnection,
    ) -> SchemaResult<()> {
        let command = render_command(&self.config.command, source, source_schema, target);
        let timeout = Duration::from_secs(self.config.timeout_secs);

        info!(
            source_schema,
            source_host = %source.host,
            target_schema = %target.database,
            target_host = %target.host,
            "clone starting"
        );

        let _timer = self.metrics.start_timer(CLONE_TIMER);
        let outcome = self
            .tool
            .run(&command, timeout)
            .await
            .map_err(|e| SchemaError::CloneFailed(e.to_string()))?;

        for line in outcome.stdout.lines() {
            info!(source_schema, target_schema = %target.database, line, "clone output");
        }

        if outcome.exit_code != 0 {
            error!(
                source_schema,
                target_schema = %target.database,
                exit_code = outcome.exit_code,
                "clone failed"
            );
            let detail = if outcome.stderr.is_empty() {
                format!("clone exited with status {}", outcome.exit_code)
            } else {
                outcome.stderr
            };
            return Err(SchemaError::CloneFailed(detail));
        }

        info!(source_schema, target_schema = %target.database, "clone finished");
        Ok(())
    }
}

fn render_command(
    template: &str,
    source: &SqlConnection,
    source_schema: &str,
    target: &SqlConnection,
) -> String {
    let substitutions = [
        ("${source_user}", source.user.as_str()),
        ("${source_password}", source.password.as_str()),
        ("${source_host}", source.host.as_str()),
        ("${source_schema}", source_schema),
        ("${target_user}", target.user.as_str()),
        ("${target_password}", target.password.as_str()),
        ("${target_host}", target.host.as_str()),
        ("${target_schema}", target.database.as_str()),
    ];
    let mut command = template.to_string();
    for (placeholder, value) in substitutions {
        command = command.replace(placeholder, value);
    }
    command = command.replace("${source_port}", &source.port.to_string());
    command.replace("${target_port}", &target.port.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use berth_provider::MemoryClone;

    fn conn(host: &str, user: &str, database: &str) -> SqlConnection {
        SqlConnection {
            host: host.to_string(),
            port: 5432,
            user: user.to_string(),
            password: "p4ss".to_string(),
            database: database.to_string(),
        }
    }

    fn runner(tool: Arc<MemoryClone>) -> CloneRunner {
        let config = CloneConfig {
            command: "berth-clone --from ${source_host}/${source_schema} --to ${target_host}/${target_schema} --port ${target_port}".to_string(),
            timeout_secs: 30,
        };
        CloneRunner::new(tool, config, Metrics::new())
    }

    #[tokio::test]
    async fn renders_and_runs_the_command() {
        let tool = Arc::new(MemoryClone::new());
        let runner = runner(tool.clone());
        runner
            .clone_schema(
                &conn("src.db.internal", "postgres", "postgres"),
                "src_schema",
                &conn("dst.db.internal", "acme_1a2b", "acme_1a2b"),
            )
            .await
            .unwrap();

        let commands = tool.commands().await;
        assert_eq!(
            commands,
            vec![
                "berth-clone --from src.db.internal/src_schema --to dst.db.internal/acme_1a2b --port 5432"
                    .to_string()
            ]
        );
    }

    #[tokio::test]
    async fn nonzero_exit_reports_stderr() {
        let tool = Arc::new(MemoryClone::new());
        tool.set_outcome(3, "pg_dump: connection refused").await;
        let runner = runner(tool);
        let err = runner
            .clone_schema(
                &conn("src.db.internal", "postgres", "postgres"),
                "src_schema",
                &conn("dst.db.internal", "acme_1a2b", "acme_1a2b"),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, SchemaError::CloneFailed(message) if message.contains("connection refused")));
    }
}
