//! redb table definitions for the berth status store.
//!
//! A single table keyed by database id with JSON-serialized records. Status
//! queries scan the table; fleets are small enough that a secondary index
//! is not worth its write amplification here.

use redb::TableDefinition;

/// Database records keyed by `{database_id}`.
pub const RECORDS: TableDefinition<&str, &[u8]> = TableDefinition::new("records");
