//! Schema handle passed to migrations.

use crate::client::{Connection, trace_sql};
use crate::error::{OrmError, OrmResult};
use crate::qb::{self, QueryBuilder};
use crate::schema::TableBlueprint;
use crate::value::Value;
use std::collections::HashSet;

/// Result of a schema operation that may be skipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaOutcome {
    /// The statement ran.
    Applied,
    /// A precondition made the statement unnecessary (table already there, or
    /// already gone). Not an error.
    Skipped,
}

impl SchemaOutcome {
    pub fn is_applied(self) -> bool {
        self == SchemaOutcome::Applied
    }

    pub fn is_skipped(self) -> bool {
        self == SchemaOutcome::Skipped
    }
}

/// Execution context for one migration batch.
///
/// Wraps the connection and caches the set of existing tables. The cache is
/// filled from `information_schema.tables` on first use and dropped after every
/// statement that can change the table set.
pub struct Schema<'a> {
    conn: &'a mut dyn Connection,
    tables: Option<HashSet<String>>,
}

impl<'a> Schema<'a> {
    pub fn new(conn: &'a mut dyn Connection) -> Self {
        Self { conn, tables: None }
    }

    /// The underlying connection.
    pub fn connection(&mut self) -> &mut (dyn Connection + 'a) {
        &mut *self.conn
    }

    /// Whether `table` exists in the connection's database.
    pub async fn table_exists(&mut self, table: &str) -> OrmResult<bool> {
        if self.tables.is_none() {
            self.tables = Some(self.load_tables().await?);
        }
        Ok(self
            .tables
            .as_ref()
            .is_some_and(|tables| tables.contains(table)))
    }

    async fn load_tables(&mut self) -> OrmResult<HashSet<String>> {
        let database = self.conn.database_name().to_string();
        let rows = qb::table(&mut *self.conn, "information_schema.tables")
            .select(["TABLE_NAME AS name"])
            .where_eq("TABLE_SCHEMA", database)
            .get()
            .await?;
        rows.iter().map(|row| row.try_get::<String>("name")).collect()
    }

    /// Forget cached table names.
    pub fn invalidate(&mut self) {
        self.tables = None;
    }

    /// Create `table`, unless it already exists.
    pub async fn create<F>(&mut self, table: &str, define: F) -> OrmResult<SchemaOutcome>
    where
        F: FnOnce(&mut TableBlueprint) + Send,
    {
        if self.table_exists(table).await? {
            tracing::info!(table, "table already exists, skipping create");
            return Ok(SchemaOutcome::Skipped);
        }

        let mut blueprint = TableBlueprint::new(table);
        define(&mut blueprint);
        self.run(&blueprint.build_create_table()).await?;
        self.invalidate();
        tracing::info!(table, "created table");
        Ok(SchemaOutcome::Applied)
    }

    /// Alter an existing table. Fails with a schema error when the table is missing.
    pub async fn alter<F>(&mut self, table: &str, define: F) -> OrmResult<SchemaOutcome>
    where
        F: FnOnce(&mut TableBlueprint) + Send,
    {
        if !self.table_exists(table).await? {
            return Err(OrmError::schema(format!(
                "cannot alter table `{table}`: it does not exist"
            )));
        }

        let mut blueprint = TableBlueprint::new(table);
        define(&mut blueprint);
        if blueprint.is_empty() {
            tracing::info!(table, "no changes declared, skipping alter");
            return Ok(SchemaOutcome::Skipped);
        }
        self.run(&blueprint.build_alter_table()).await?;
        tracing::info!(table, "altered table");
        Ok(SchemaOutcome::Applied)
    }

    /// Drop `table`, unless it is already gone.
    pub async fn drop(&mut self, table: &str) -> OrmResult<SchemaOutcome> {
        if !self.table_exists(table).await? {
            tracing::info!(table, "table does not exist, skipping drop");
            return Ok(SchemaOutcome::Skipped);
        }
        self.run(&format!("DROP TABLE `{table}`")).await?;
        self.invalidate();
        tracing::info!(table, "dropped table");
        Ok(SchemaOutcome::Applied)
    }

    /// `DROP TABLE IF EXISTS`, without consulting the cache.
    pub async fn drop_if_exists(&mut self, table: &str) -> OrmResult<SchemaOutcome> {
        self.run(&format!("DROP TABLE IF EXISTS `{table}`")).await?;
        self.invalidate();
        Ok(SchemaOutcome::Applied)
    }

    /// Rename `from` to `to`. Both a missing source and an existing target are
    /// schema errors.
    pub async fn rename(&mut self, from: &str, to: &str) -> OrmResult<SchemaOutcome> {
        if !self.table_exists(from).await? {
            return Err(OrmError::schema(format!(
                "cannot rename table `{from}`: it does not exist"
            )));
        }
        if self.table_exists(to).await? {
            return Err(OrmError::schema(format!(
                "cannot rename table `{from}` to `{to}`: target already exists"
            )));
        }
        self.run(&format!("RENAME TABLE `{from}` TO `{to}`")).await?;
        self.invalidate();
        tracing::info!(from, to, "renamed table");
        Ok(SchemaOutcome::Applied)
    }

    /// Run a raw statement. The table cache is dropped afterwards since the
    /// statement may have created or removed tables.
    pub async fn execute(&mut self, sql: &str, params: &[Value]) -> OrmResult<u64> {
        trace_sql(sql, params);
        let affected = self.conn.execute(sql, params).await?;
        self.invalidate();
        Ok(affected)
    }

    /// Query builder over `table`, for data migrations.
    pub fn query(&mut self, table: &str) -> QueryBuilder<'_, dyn Connection + 'a> {
        qb::table(&mut *self.conn, table)
    }

    async fn run(&mut self, sql: &str) -> OrmResult<()> {
        trace_sql(sql, &[]);
        self.conn.execute(sql, &[]).await?;
        Ok(())
    }
}
