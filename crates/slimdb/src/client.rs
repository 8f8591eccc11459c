//! Connection trait consumed by the query builder and the migration engine.

use crate::error::OrmResult;
use crate::row::Row;
use crate::value::Value;

/// A database connection that executes `?`-placeholder SQL with positional parameters.
///
/// The trait is object safe so migrations can receive `&mut dyn Connection`.
/// Methods take `&mut self`: a connection carries transaction state and is
/// driven by one caller at a time.
///
/// Implementations report statement failures as [`OrmError::Execution`](crate::OrmError::Execution)
/// carrying the offending SQL.
#[async_trait::async_trait]
pub trait Connection: Send {
    /// Execute a statement that produces rows.
    async fn query(&mut self, sql: &str, params: &[Value]) -> OrmResult<Vec<Row>>;

    /// Execute a statement and return the number of affected rows.
    async fn execute(&mut self, sql: &str, params: &[Value]) -> OrmResult<u64>;

    /// Start a transaction.
    async fn begin_transaction(&mut self) -> OrmResult<()>;

    /// Commit the open transaction.
    async fn commit(&mut self) -> OrmResult<()>;

    /// Roll back the open transaction. A no-op when none is open.
    async fn rollback(&mut self) -> OrmResult<()>;

    /// Whether a transaction is currently open.
    fn in_transaction(&self) -> bool;

    /// Identifier generated by the last `INSERT` on this connection.
    fn last_insert_id(&self) -> Option<u64>;

    /// Name of the database (schema) this connection is bound to.
    fn database_name(&self) -> &str;
}

#[async_trait::async_trait]
impl<C: Connection + ?Sized> Connection for &mut C {
    async fn query(&mut self, sql: &str, params: &[Value]) -> OrmResult<Vec<Row>> {
        (**self).query(sql, params).await
    }

    async fn execute(&mut self, sql: &str, params: &[Value]) -> OrmResult<u64> {
        (**self).execute(sql, params).await
    }

    async fn begin_transaction(&mut self) -> OrmResult<()> {
        (**self).begin_transaction().await
    }

    async fn commit(&mut self) -> OrmResult<()> {
        (**self).commit().await
    }

    async fn rollback(&mut self) -> OrmResult<()> {
        (**self).rollback().await
    }

    fn in_transaction(&self) -> bool {
        (**self).in_transaction()
    }

    fn last_insert_id(&self) -> Option<u64> {
        (**self).last_insert_id()
    }

    fn database_name(&self) -> &str {
        (**self).database_name()
    }
}

/// Emit the statement about to run on the `slimdb.sql` tracing target.
pub(crate) fn trace_sql(sql: &str, params: &[Value]) {
    const MAX_SQL_LENGTH: usize = 200;
    if sql.len() > MAX_SQL_LENGTH {
        let mut end = MAX_SQL_LENGTH;
        while !sql.is_char_boundary(end) {
            end -= 1;
        }
        tracing::debug!(
            target: "slimdb.sql",
            param_count = params.len(),
            sql = %format_args!("{}...", &sql[..end]),
        );
    } else {
        tracing::debug!(target: "slimdb.sql", param_count = params.len(), sql = %sql);
    }
}
