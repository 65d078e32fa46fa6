//! Tenant DDL statement sets.
//!
//! Every operation builds its statement list and hands it to the
//! `SqlExecutor` in one call per connection, matching how the statements
//! must share a session. Identifiers come from the id allocator and are
//! lowercase `[a-z0-9_]`, so they are interpolated directly.

use std::sync::Arc;

use tracing::{debug, error};

use berth_provider::{SqlConnection, SqlExecutor};

use crate::error::{SchemaError, SchemaResult};

/// Extensions installed into every fresh tenant schema.
const EXTENSIONS: [&str; 5] = [
    "hstore",
    "pg_buffercache",
    "pg_stat_statements",
    "pgstattuple",
    "postgres_fdw",
];

/// Builds and executes tenant schema operations.
pub struct SchemaManager {
    sql: Arc<dyn SqlExecutor>,
}

impl SchemaManager {
    pub fn new(sql: Arc<dyn SqlExecutor>) -> Self {
        Self { sql }
    }

    /// Create the tenant role and schema, wire up ownership and default
    /// privileges, then install extensions on a second connection into
    /// the fresh schema.
    pub async fn create_schema(
        &self,
        master: &SqlConnection,
        schema: &str,
        user: &str,
        password: &str,
    ) -> SchemaResult<()> {
        debug!(schema, host = %master.host, owner = user, "creating schema");

        let statements = vec![
            format!("CREATE USER {user} CREATEDB;"),
            format!("ALTER USER {user} PASSWORD '{password}';"),
            format!("GRANT {user} TO {master_user};", master_user = master.user),
            format!("CREATE DATABASE {schema} OWNER = {user};"),
            format!("ALTER DEFAULT PRIVILEGES FOR ROLE {user} GRANT SELECT ON TABLES TO {user};"),
        ];
        self.sql
            .execute(master, &statements)
            .await
            .map_err(|e| self.operation_error("creating schema", schema, e))?;

        let extensions: Vec<String> = EXTENSIONS
            .iter()
            .map(|ext| format!("CREATE EXTENSION IF NOT EXISTS {ext};"))
            .collect();
        self.sql
            .execute(&connect_to(master, schema), &extensions)
            .await
            .map_err(|e| self.operation_error("adding extensions to", schema, e))?;

        debug!(schema, "schema created");
        Ok(())
    }

    /// Rotate a tenant role's password. Used both to revoke access on
    /// soft delete and to finish the dedicated deletion handoff.
    pub async fn change_schema_password(
        &self,
        master: &SqlConnection,
        schema: &str,
        user: &str,
        password: &str,
    ) -> SchemaResult<()> {
        let statements = vec![format!("ALTER USER {user} PASSWORD '{password}';")];
        self.sql
            .execute(master, &statements)
            .await
            .map_err(|e| self.operation_error("rotating password for", schema, e))
    }

    /// Whether the schema still exists on the host. The reaper checks
    /// before dropping so a second run stays idempotent.
    pub async fn schema_exists(&self, master: &SqlConnection, schema: &str) -> SchemaResult<bool> {
        let statement = format!(
            "SELECT EXISTS(SELECT datname FROM pg_database WHERE datname = '{schema}')"
        );
        self.sql
            .query_bool(master, &statement)
            .await
            .map_err(|e| self.operation_error("checking existence of", schema, e))
    }

    /// Drop the schema and its owning role.
    pub async fn hard_delete_schema(
        &self,
        master: &SqlConnection,
        user: &str,
        schema: &str,
    ) -> SchemaResult<()> {
        let statements = vec![
            format!("DROP DATABASE {schema};"),
            format!("DROP USER {user};"),
        ];
        self.sql
            .execute(master, &statements)
            .await
            .map_err(|e| self.operation_error("dropping", schema, e))
    }

    /// Create or rotate the short-lived operational role on a tenant
    /// schema, valid until the given timestamp.
    pub async fn create_temp_user(
        &self,
        master: &SqlConnection,
        schema: &str,
        password: &str,
        valid_until: &str,
    ) -> SchemaResult<()> {
        let statement = format!(
            "DO\n$$\nBEGIN\n   IF NOT EXISTS (\n      SELECT *\n      FROM   pg_catalog.pg_user\n      WHERE  usename = 'mq_user') THEN\n      CREATE ROLE mq_user LOGIN PASSWORD '{password}' valid until '{valid_until}';\n      GRANT SELECT,DELETE,UPDATE ON ALL TABLES IN SCHEMA PUBLIC TO mq_user;\n   ELSE\n      ALTER ROLE mq_user LOGIN PASSWORD '{password}' valid until '{valid_until}';\n      GRANT SELECT,DELETE,UPDATE ON ALL TABLES IN SCHEMA PUBLIC TO mq_user;\n   END IF;\nEND\n$$;"
        );
        self.sql
            .execute(&connect_to(master, schema), &[statement])
            .await
            .map_err(|e| self.operation_error("creating temp user on", schema, e))
    }

    fn operation_error(
        &self,
        action: &str,
        schema: &str,
        cause: berth_provider::ProviderError,
    ) -> SchemaError {
        error!(schema, error = %cause, "sql error {action} schema");
        SchemaError::Operation(cause.to_string())
    }
}

/// The same credentials pointed at a different database on the host.
pub fn connect_to(conn: &SqlConnection, database: &str) -> SqlConnection {
    SqlConnection {
        database: database.to_string(),
        ..conn.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use berth_provider::MemorySql;

    fn master() -> SqlConnection {
        SqlConnection {
            host: "pool-1.db.internal".to_string(),
            port: 5432,
            user: "postgres".to_string(),
            password: "hunter2".to_string(),
            database: "postgres".to_string(),
        }
    }

    #[tokio::test]
    async fn create_schema_runs_ddl_then_extensions() {
        let sql = Arc::new(MemorySql::new());
        let manager = SchemaManager::new(sql.clone());
        manager
            .create_schema(&master(), "acme_1a2b", "acme_1a2b", "p4ss")
            .await
            .unwrap();

        let statements = sql.statements().await;
        assert!(statements[0].starts_with("CREATE USER acme_1a2b"));
        assert!(statements.iter().any(|s| s == "CREATE DATABASE acme_1a2b OWNER = acme_1a2b;"));
        assert!(statements.iter().any(|s| s.contains("CREATE EXTENSION IF NOT EXISTS hstore")));

        // Extensions run on a connection into the new schema.
        let connections = sql.connections().await;
        assert_eq!(connections[0].database, "postgres");
        assert_eq!(connections[1].database, "acme_1a2b");
    }

    #[tokio::test]
    async fn create_schema_propagates_sql_failure() {
        let sql = Arc::new(MemorySql::new());
        sql.fail_on("CREATE DATABASE").await;
        let manager = SchemaManager::new(sql);
        let err = manager
            .create_schema(&master(), "acme_1a2b", "acme_1a2b", "p4ss")
            .await
            .unwrap_err();
        assert!(matches!(err, SchemaError::Operation(_)));
    }

    #[tokio::test]
    async fn password_rotation_is_one_alter() {
        let sql = Arc::new(MemorySql::new());
        let manager = SchemaManager::new(sql.clone());
        manager
            .change_schema_password(&master(), "acme_1a2b", "acme_1a2b", "newpass")
            .await
            .unwrap();
        let statements = sql.statements().await;
        assert_eq!(statements, vec!["ALTER USER acme_1a2b PASSWORD 'newpass';".to_string()]);
    }

    #[tokio::test]
    async fn hard_delete_drops_schema_then_role() {
        let sql = Arc::new(MemorySql::new());
        let manager = SchemaManager::new(sql.clone());
        manager
            .hard_delete_schema(&master(), "acme_1a2b", "acme_1a2b")
            .await
            .unwrap();
        let statements = sql.statements().await;
        assert_eq!(statements[0], "DROP DATABASE acme_1a2b;");
        assert_eq!(statements[1], "DROP USER acme_1a2b;");
    }

    #[tokio::test]
    async fn existence_check_uses_scripted_answer() {
        let sql = Arc::new(MemorySql::new());
        sql.push_bool(false).await;
        let manager = SchemaManager::new(sql);
        assert!(!manager.schema_exists(&master(), "acme_1a2b").await.unwrap());
    }
}
