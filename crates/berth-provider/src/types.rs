//! Domain types crossing the collaborator boundary.

use serde::{Deserialize, Serialize};

/// Network endpoint of a host, absent until the provider finishes
/// provisioning it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    pub address: String,
    pub port: u16,
}

/// A managed relational-database compute instance as the provider
/// reports it. Statuses are provider strings ("creating", "available",
/// "modifying", ...); the fleet layer owns the readiness predicates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Host {
    /// Full provider-side identifier (environment prefix included).
    pub id: String,
    pub status: String,
    pub endpoint: Option<Endpoint>,
    pub master_user: String,
    pub db_name: String,
    pub instance_class: String,
    pub storage_gb: u32,
    pub multi_az: bool,
}

/// Everything needed to create a host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostSpec {
    pub id: String,
    pub master_user: String,
    pub master_password: String,
    pub instance_class: String,
    pub storage_gb: u32,
    pub engine: String,
    pub engine_version: String,
    pub db_name: String,
    pub port: u16,
    pub multi_az: bool,
    pub publicly_accessible: bool,
    pub subnet_group: String,
    pub security_group: String,
    pub tags: Vec<Tag>,
}

/// Partial update applied to an existing host.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HostPatch {
    pub master_password: Option<String>,
    pub instance_class: Option<String>,
    pub storage_gb: Option<u32>,
    pub apply_immediately: bool,
}

/// One key/value tag on a host.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Tag {
    pub key: String,
    pub value: String,
}

impl Tag {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// One page of a host listing.
#[derive(Debug, Clone)]
pub struct HostPage {
    pub hosts: Vec<Host>,
    /// Opaque token for the next page; `None` on the last page.
    pub next: Option<String>,
}

/// Connection parameters for running SQL against one database on a host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqlConnection {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    /// Database (namespace) the connection opens into.
    pub database: String,
}

/// Captured result of a clone utility run.
#[derive(Debug, Clone)]
pub struct CloneOutcome {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}
