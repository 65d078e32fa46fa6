//! Domain types for the berth status store.
//!
//! A `DatabaseRecord` is the one-row-per-database truth the HTTP layer
//! reads and the workflow engines advance. Connection facts are populated
//! progressively as the creation workflow runs; `status` transitions are
//! monotonic per workflow (CREATING→READY|ERROR, DELETING→DELETED) except
//! that ERROR may be re-entered by a retried request.

use serde::{Deserialize, Serialize};

/// Unique identifier for a logical database.
pub type DatabaseId = String;

/// Externally visible lifecycle status of a database.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DbStatus {
    Creating,
    Ready,
    Error,
    Deleting,
    Deleted,
}

/// Whether a database lives on a pooled host or its own host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Tenancy {
    Shared,
    Dedicated,
}

/// Region class the database's data must stay in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Locality {
    Us,
    Eu,
}

/// The immutable parameters of a creation request, carried through every
/// creation step inside the envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreationRequest {
    /// Free-form tenant category; seeds the database id.
    pub category: String,
    pub tenancy: Tenancy,
    pub locality: Locality,
    /// Compute class override for dedicated hosts (template default when absent).
    pub instance_class: Option<String>,
    /// Storage override in gigabytes for dedicated hosts.
    pub instance_storage_gb: Option<u32>,
    /// When present, the new database is seeded by cloning this one.
    pub source_database_id: Option<String>,
    pub service_tag: String,
    pub service_component_tag: String,
    pub highly_available: bool,
}

/// Connection facts for a provisioned database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionFacts {
    pub host: String,
    pub user: String,
    pub port: i32,
    pub schema: String,
}

/// One record per logical database.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatabaseRecord {
    pub id: DatabaseId,
    pub status: DbStatus,
    /// Last error or informational text.
    pub status_message: Option<String>,
    pub host: Option<String>,
    pub user: Option<String>,
    pub port: Option<i32>,
    pub schema: Option<String>,
    /// Unprefixed id of the hosting compute resource.
    pub instance_id: Option<String>,
    pub tenancy: Option<Tenancy>,
    pub locality: Option<Locality>,
    pub service_tag: Option<String>,
    /// Epoch millis of the last status write.
    pub updated_at_ms: u64,
}

impl DatabaseRecord {
    /// A fresh record in the given status with no connection facts yet.
    pub fn new(id: impl Into<DatabaseId>, status: DbStatus, message: Option<String>) -> Self {
        Self {
            id: id.into(),
            status,
            status_message: message,
            host: None,
            user: None,
            port: None,
            schema: None,
            instance_id: None,
            tenancy: None,
            locality: None,
            service_tag: None,
            updated_at_ms: 0,
        }
    }

    /// The connection facts, once every field has been populated.
    pub fn connection(&self) -> Option<ConnectionFacts> {
        Some(ConnectionFacts {
            host: self.host.clone()?,
            user: self.user.clone()?,
            port: self.port?,
            schema: self.schema.clone()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_serializes_screaming() {
        assert_eq!(serde_json::to_string(&DbStatus::Creating).unwrap(), "\"CREATING\"");
        assert_eq!(serde_json::to_string(&Tenancy::Dedicated).unwrap(), "\"DEDICATED\"");
        assert_eq!(serde_json::to_string(&Locality::Eu).unwrap(), "\"EU\"");
    }

    #[test]
    fn connection_requires_all_facts() {
        let mut record = DatabaseRecord::new("acme_4f2k", DbStatus::Creating, None);
        assert!(record.connection().is_none());

        record.host = Some("pool-1.db.internal".to_string());
        record.user = Some("acme_4f2k".to_string());
        record.port = Some(5432);
        assert!(record.connection().is_none());

        record.schema = Some("acme_4f2k".to_string());
        let conn = record.connection().unwrap();
        assert_eq!(conn.port, 5432);
        assert_eq!(conn.host, "pool-1.db.internal");
    }
}
