//! The collaborator traits.
//!
//! All three are object-safe async traits; the orchestrator holds them as
//! `Arc<dyn ...>` so tests and dev mode can swap in the in-memory
//! implementations.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::ProviderResult;
use crate::types::*;

/// The cloud control API for managed database hosts.
#[async_trait]
pub trait HostProvider: Send + Sync {
    async fn create_host(&self, spec: &HostSpec) -> ProviderResult<Host>;

    /// `None` when the host does not exist (not an error; workflow steps
    /// treat absence as "not ready yet" or "already gone" by context).
    async fn describe_host(&self, id: &str) -> ProviderResult<Option<Host>>;

    /// Paginated fleet enumeration.
    async fn list_hosts(&self, page_token: Option<String>) -> ProviderResult<HostPage>;

    async fn modify_host(&self, id: &str, patch: &HostPatch) -> ProviderResult<()>;

    async fn delete_host(&self, id: &str) -> ProviderResult<()>;

    async fn list_tags(&self, id: &str) -> ProviderResult<Vec<Tag>>;

    async fn add_tags(&self, id: &str, tags: &[Tag]) -> ProviderResult<()>;

    async fn remove_tags(&self, id: &str, keys: &[String]) -> ProviderResult<()>;

    /// Per-period maxima of a named metric over the trailing window.
    async fn metric_samples(
        &self,
        id: &str,
        metric: &str,
        window: Duration,
    ) -> ProviderResult<Vec<f64>>;
}

/// Runs a statement set against one database, in order, on one connection.
#[async_trait]
pub trait SqlExecutor: Send + Sync {
    async fn execute(&self, conn: &SqlConnection, statements: &[String]) -> ProviderResult<()>;

    /// Run a single-row single-column boolean query (existence checks).
    async fn query_bool(&self, conn: &SqlConnection, statement: &str) -> ProviderResult<bool>;
}

/// Invokes the external clone utility.
#[async_trait]
pub trait CloneTool: Send + Sync {
    /// Run the rendered command, bounded by `timeout`. A timeout is an
    /// error; a non-zero exit is reported in the outcome, not an error.
    async fn run(&self, command: &str, timeout: Duration) -> ProviderResult<CloneOutcome>;
}
