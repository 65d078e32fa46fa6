//! RecordStore — redb-backed persistence for database records.
//!
//! Provides the narrow contract the orchestrator consumes: get, put,
//! status update, query-by-status, retention query, and delete. Status
//! updates are read-modify-write with no compare-and-set; see the crate
//! docs for why that is acceptable here.

use std::path::Path;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use redb::{Database, ReadableDatabase, ReadableTable};
use tracing::debug;

use crate::error::{StateError, StateResult};
use crate::tables::RECORDS;
use crate::types::*;

/// Convert any `Display` error into a `StateError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StateError::$variant(e.to_string())
    };
}

/// Epoch milliseconds now.
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Thread-safe status store backed by redb.
#[derive(Clone)]
pub struct RecordStore {
    db: Arc<Database>,
}

impl RecordStore {
    /// Open (or create) a persistent store at the given path.
    pub fn open(path: &Path) -> StateResult<Self> {
        let db = Database::create(path).map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!(?path, "record store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory store (for testing).
    pub fn open_in_memory() -> StateResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!("in-memory record store opened");
        Ok(store)
    }

    /// Create all tables if they don't exist yet.
    fn ensure_tables(&self) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        // Opening a table in a write transaction creates it if absent.
        txn.open_table(RECORDS).map_err(map_err!(Table))?;
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    /// Get a record by database id.
    pub fn get(&self, id: &str) -> StateResult<Option<DatabaseRecord>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(RECORDS).map_err(map_err!(Table))?;
        match table.get(id).map_err(map_err!(Read))? {
            Some(guard) => {
                let record: DatabaseRecord =
                    serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }

    /// Insert or replace a whole record.
    pub fn put(&self, record: &DatabaseRecord) -> StateResult<()> {
        let value = serde_json::to_vec(record).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(RECORDS).map_err(map_err!(Table))?;
            table
                .insert(record.id.as_str(), value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    /// Set the status (and message) of a record, stamping `updated_at_ms`.
    /// Creates the record when absent, matching the original upsert
    /// semantics of the status write path.
    pub fn update_status(
        &self,
        id: &str,
        status: DbStatus,
        message: Option<String>,
    ) -> StateResult<()> {
        let mut record = self
            .get(id)?
            .unwrap_or_else(|| DatabaseRecord::new(id, status, None));
        record.status = status;
        record.status_message = message;
        record.updated_at_ms = now_ms();
        self.put(&record)?;
        debug!(database_id = id, status = ?status, "status updated");
        Ok(())
    }

    /// Write the connection facts and placement identity of a record,
    /// preserving its status fields. Creates the record when absent.
    pub fn put_facts(
        &self,
        id: &str,
        facts: &ConnectionFacts,
        instance_id: &str,
        tenancy: Tenancy,
        locality: Locality,
        service_tag: &str,
    ) -> StateResult<()> {
        let mut record = self
            .get(id)?
            .unwrap_or_else(|| DatabaseRecord::new(id, DbStatus::Creating, None));
        record.host = Some(facts.host.clone());
        record.user = Some(facts.user.clone());
        record.port = Some(facts.port);
        record.schema = Some(facts.schema.clone());
        record.instance_id = Some(instance_id.to_string());
        record.tenancy = Some(tenancy);
        record.locality = Some(locality);
        record.service_tag = Some(service_tag.to_string());
        self.put(&record)?;
        debug!(database_id = id, instance_id, "connection facts stored");
        Ok(())
    }

    /// All records currently in the given status.
    pub fn query_by_status(&self, status: DbStatus) -> StateResult<Vec<DatabaseRecord>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(RECORDS).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (_, value) = entry.map_err(map_err!(Read))?;
            let record: DatabaseRecord =
                serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
            if record.status == status {
                results.push(record);
            }
        }
        Ok(results)
    }

    /// DELETED records whose last status write is older than `cutoff_ms`.
    pub fn deleted_before(&self, cutoff_ms: u64) -> StateResult<Vec<DatabaseRecord>> {
        let mut deleted = self.query_by_status(DbStatus::Deleted)?;
        deleted.retain(|r| r.updated_at_ms < cutoff_ms);
        Ok(deleted)
    }

    /// Remove a record. Returns true if it existed.
    pub fn delete(&self, id: &str) -> StateResult<bool> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let existed;
        {
            let mut table = txn.open_table(RECORDS).map_err(map_err!(Table))?;
            existed = table.remove(id).map_err(map_err!(Write))?.is_some();
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(database_id = id, existed, "record deleted");
        Ok(existed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn facts(host: &str) -> ConnectionFacts {
        ConnectionFacts {
            host: host.to_string(),
            user: "acme_1a2b".to_string(),
            port: 5432,
            schema: "acme_1a2b".to_string(),
        }
    }

    #[test]
    fn update_status_upserts_and_stamps_time() {
        let store = RecordStore::open_in_memory().unwrap();
        store
            .update_status("acme_1a2b", DbStatus::Creating, Some("acme_1a2b is still being created".into()))
            .unwrap();

        let record = store.get("acme_1a2b").unwrap().unwrap();
        assert_eq!(record.status, DbStatus::Creating);
        assert!(record.updated_at_ms > 0);
        assert!(record.host.is_none());
    }

    #[test]
    fn put_facts_preserves_status() {
        let store = RecordStore::open_in_memory().unwrap();
        store.update_status("acme_1a2b", DbStatus::Creating, None).unwrap();
        store
            .put_facts(
                "acme_1a2b",
                &facts("pool-1.db.internal"),
                "blue_pool_1",
                Tenancy::Shared,
                Locality::Us,
                "acme",
            )
            .unwrap();

        let record = store.get("acme_1a2b").unwrap().unwrap();
        assert_eq!(record.status, DbStatus::Creating);
        assert_eq!(record.connection().unwrap().host, "pool-1.db.internal");
        assert_eq!(record.tenancy, Some(Tenancy::Shared));
    }

    #[test]
    fn query_by_status_filters() {
        let store = RecordStore::open_in_memory().unwrap();
        store.update_status("a_1", DbStatus::Ready, None).unwrap();
        store.update_status("b_2", DbStatus::Deleted, None).unwrap();
        store.update_status("c_3", DbStatus::Deleted, None).unwrap();

        assert_eq!(store.query_by_status(DbStatus::Ready).unwrap().len(), 1);
        assert_eq!(store.query_by_status(DbStatus::Deleted).unwrap().len(), 2);
        assert!(store.query_by_status(DbStatus::Error).unwrap().is_empty());
    }

    #[test]
    fn deleted_before_honors_cutoff() {
        let store = RecordStore::open_in_memory().unwrap();

        let mut old = DatabaseRecord::new("old_1", DbStatus::Deleted, None);
        old.updated_at_ms = 1_000;
        store.put(&old).unwrap();

        let mut fresh = DatabaseRecord::new("fresh_2", DbStatus::Deleted, None);
        fresh.updated_at_ms = 50_000;
        store.put(&fresh).unwrap();

        let due = store.deleted_before(10_000).unwrap();
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].id, "old_1");
    }

    #[test]
    fn delete_reports_existence() {
        let store = RecordStore::open_in_memory().unwrap();
        store.update_status("a_1", DbStatus::Deleted, None).unwrap();
        assert!(store.delete("a_1").unwrap());
        assert!(!store.delete("a_1").unwrap());
        assert!(store.get("a_1").unwrap().is_none());
    }

    #[test]
    fn persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("records.redb");
        {
            let store = RecordStore::open(&path).unwrap();
            store.update_status("a_1", DbStatus::Ready, None).unwrap();
        }
        let store = RecordStore::open(&path).unwrap();
        assert_eq!(store.get("a_1").unwrap().unwrap().status, DbStatus::Ready);
    }
}
