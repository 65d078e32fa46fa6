//! In-memory collaborators.
//!
//! `MemoryFleet`, `MemorySql`, and `MemoryClone` implement the provider
//! traits entirely in process. They back the test suites and the daemon's
//! dev mode, and expose small scripting knobs (status changes, scripted
//! failures) so partial-failure paths can be exercised deterministically.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::{ProviderError, ProviderResult};
use crate::traits::{CloneTool, HostProvider, SqlExecutor};
use crate::types::*;

const PAGE_SIZE: usize = 2;

struct FleetEntry {
    host: Host,
    tags: Vec<Tag>,
    cpu: Vec<f64>,
}

/// An in-memory host fleet.
#[derive(Default)]
pub struct MemoryFleet {
    hosts: Mutex<HashMap<String, FleetEntry>>,
    /// When true, freshly created hosts are immediately "available" with
    /// an endpoint (dev mode); otherwise they start "creating".
    auto_available: bool,
    reject_creates: Mutex<bool>,
}

impl MemoryFleet {
    pub fn new() -> Self {
        Self::default()
    }

    /// A fleet whose new hosts come up "available" at once.
    pub fn auto_available() -> Self {
        Self {
            auto_available: true,
            ..Self::default()
        }
    }

    /// Script the next `create_host` calls to be rejected.
    pub async fn reject_creates(&self, reject: bool) {
        *self.reject_creates.lock().await = reject;
    }

    /// Insert a host directly (test setup).
    pub async fn insert_host(&self, host: Host, tags: Vec<Tag>) {
        self.hosts.lock().await.insert(
            host.id.clone(),
            FleetEntry {
                host,
                tags,
                cpu: Vec::new(),
            },
        );
    }

    /// Force a host's provider status.
    pub async fn set_status(&self, id: &str, status: &str) {
        if let Some(entry) = self.hosts.lock().await.get_mut(id) {
            entry.host.status = status.to_string();
            if entry.host.endpoint.is_none() && status != "creating" {
                entry.host.endpoint = Some(endpoint_for(&entry.host.id, 5432));
            }
        }
    }

    /// Set the CPU samples returned for a host.
    pub async fn set_cpu(&self, id: &str, samples: Vec<f64>) {
        if let Some(entry) = self.hosts.lock().await.get_mut(id) {
            entry.cpu = samples;
        }
    }

}

fn endpoint_for(id: &str, port: u16) -> Endpoint {
    Endpoint {
        address: format!("{id}.db.internal"),
        port,
    }
}

#[async_trait]
impl HostProvider for MemoryFleet {
    async fn create_host(&self, spec: &HostSpec) -> ProviderResult<Host> {
        if *self.reject_creates.lock().await {
            return Err(ProviderError::Rejected(format!(
                "host creation rejected for {}",
                spec.id
            )));
        }
        let mut hosts = self.hosts.lock().await;
        if hosts.contains_key(&spec.id) {
            return Err(ProviderError::Rejected(format!(
                "host {} already exists",
                spec.id
            )));
        }

        let host = Host {
            id: spec.id.clone(),
            status: if self.auto_available {
                "available".to_string()
            } else {
                "creating".to_string()
            },
            endpoint: self
                .auto_available
                .then(|| endpoint_for(&spec.id, spec.port)),
            master_user: spec.master_user.clone(),
            db_name: spec.db_name.clone(),
            instance_class: spec.instance_class.clone(),
            storage_gb: spec.storage_gb,
            multi_az: spec.multi_az,
        };
        hosts.insert(
            spec.id.clone(),
            FleetEntry {
                host: host.clone(),
                tags: spec.tags.clone(),
                cpu: Vec::new(),
            },
        );
        debug!(host_id = %spec.id, "memory fleet created host");
        Ok(host)
    }

    async fn describe_host(&self, id: &str) -> ProviderResult<Option<Host>> {
        Ok(self.hosts.lock().await.get(id).map(|e| e.host.clone()))
    }

    async fn list_hosts(&self, page_token: Option<String>) -> ProviderResult<HostPage> {
        let hosts = self.hosts.lock().await;
        let mut all: Vec<&FleetEntry> = hosts.values().collect();
        all.sort_by(|a, b| a.host.id.cmp(&b.host.id));

        let start: usize = page_token
            .as_deref()
            .and_then(|t| t.parse().ok())
            .unwrap_or(0);
        let page: Vec<Host> = all
            .iter()
            .skip(start)
            .take(PAGE_SIZE)
            .map(|e| e.host.clone())
            .collect();
        let next = (start + PAGE_SIZE < all.len()).then(|| (start + PAGE_SIZE).to_string());
        Ok(HostPage { hosts: page, next })
    }

    async fn modify_host(&self, id: &str, patch: &HostPatch) -> ProviderResult<()> {
        let mut hosts = self.hosts.lock().await;
        let entry = hosts
            .get_mut(id)
            .ok_or_else(|| ProviderError::Rejected(format!("host {id} not found")))?;
        if patch.master_password.is_some() {
            entry.host.status = "resetting-master-credentials".to_string();
        }
        if let Some(class) = &patch.instance_class {
            entry.host.instance_class = class.clone();
        }
        if let Some(storage) = patch.storage_gb {
            entry.host.storage_gb = storage;
        }
        Ok(())
    }

    async fn delete_host(&self, id: &str) -> ProviderResult<()> {
        let removed = self.hosts.lock().await.remove(id).is_some();
        if removed {
            Ok(())
        } else {
            Err(ProviderError::Rejected(format!("host {id} not found")))
        }
    }

    async fn list_tags(&self, id: &str) -> ProviderResult<Vec<Tag>> {
        Ok(self
            .hosts
            .lock()
            .await
            .get(id)
            .map(|e| e.tags.clone())
            .unwrap_or_default())
    }

    async fn add_tags(&self, id: &str, tags: &[Tag]) -> ProviderResult<()> {
        if let Some(entry) = self.hosts.lock().await.get_mut(id) {
            for tag in tags {
                entry.tags.retain(|t| t.key != tag.key);
                entry.tags.push(tag.clone());
            }
        }
        Ok(())
    }

    async fn remove_tags(&self, id: &str, keys: &[String]) -> ProviderResult<()> {
        if let Some(entry) = self.hosts.lock().await.get_mut(id) {
            entry.tags.retain(|t| !keys.contains(&t.key));
        }
        Ok(())
    }

    async fn metric_samples(
        &self,
        id: &str,
        _metric: &str,
        _window: Duration,
    ) -> ProviderResult<Vec<f64>> {
        Ok(self
            .hosts
            .lock()
            .await
            .get(id)
            .map(|e| e.cpu.clone())
            .unwrap_or_default())
    }
}

/// An in-memory SQL runner that records every statement set it executes.
#[derive(Default)]
pub struct MemorySql {
    executed: Mutex<Vec<(SqlConnection, Vec<String>)>>,
    /// Substring that makes `execute` fail when any statement contains it.
    fail_on: Mutex<Option<String>>,
    /// Scripted answers for `query_bool`, front first; defaults to true.
    bool_answers: Mutex<VecDeque<bool>>,
}

impl MemorySql {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `execute` fail whenever a statement contains `needle`.
    pub async fn fail_on(&self, needle: &str) {
        *self.fail_on.lock().await = Some(needle.to_string());
    }

    /// Queue an answer for the next `query_bool` call.
    pub async fn push_bool(&self, answer: bool) {
        self.bool_answers.lock().await.push_back(answer);
    }

    /// Every statement executed so far, flattened.
    pub async fn statements(&self) -> Vec<String> {
        self.executed
            .lock()
            .await
            .iter()
            .flat_map(|(_, s)| s.clone())
            .collect()
    }

    /// Connections used so far.
    pub async fn connections(&self) -> Vec<SqlConnection> {
        self.executed.lock().await.iter().map(|(c, _)| c.clone()).collect()
    }
}

#[async_trait]
impl SqlExecutor for MemorySql {
    async fn execute(&self, conn: &SqlConnection, statements: &[String]) -> ProviderResult<()> {
        if let Some(needle) = self.fail_on.lock().await.as_deref() {
            if statements.iter().any(|s| s.contains(needle)) {
                return Err(ProviderError::Sql(format!(
                    "statement matching {needle:?} failed"
                )));
            }
        }
        self.executed
            .lock()
            .await
            .push((conn.clone(), statements.to_vec()));
        Ok(())
    }

    async fn query_bool(&self, _conn: &SqlConnection, _statement: &str) -> ProviderResult<bool> {
        Ok(self.bool_answers.lock().await.pop_front().unwrap_or(true))
    }
}

/// An in-memory clone tool with a scripted outcome.
pub struct MemoryClone {
    outcome: Mutex<CloneOutcome>,
    commands: Mutex<Vec<String>>,
}

impl Default for MemoryClone {
    fn default() -> Self {
        Self {
            outcome: Mutex::new(CloneOutcome {
                exit_code: 0,
                stdout: String::new(),
                stderr: String::new(),
            }),
            commands: Mutex::new(Vec::new()),
        }
    }
}

impl MemoryClone {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script the outcome of subsequent runs.
    pub async fn set_outcome(&self, exit_code: i32, stderr: &str) {
        *self.outcome.lock().await = CloneOutcome {
            exit_code,
            stdout: String::new(),
            stderr: stderr.to_string(),
        };
    }

    /// Commands passed to the tool so far.
    pub async fn commands(&self) -> Vec<String> {
        self.commands.lock().await.clone()
    }
}

#[async_trait]
impl CloneTool for MemoryClone {
    async fn run(&self, command: &str, _timeout: Duration) -> ProviderResult<CloneOutcome> {
        self.commands.lock().await.push(command.to_string());
        Ok(self.outcome.lock().await.clone())
    }
}
