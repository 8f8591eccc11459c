use super::clause::{Connector, Join, JoinKind, Op, OrderDirection, Predicate, StatementKind};
use super::page::{self, Page};
use super::query::Query;
use crate::client::{Connection, trace_sql};
use crate::error::{OrmError, OrmResult};
use crate::row::{FromRow, Row};
use crate::value::Value;

/// Fluent statement builder bound to a connection.
///
/// Mutators validate eagerly: an unknown operator or sort direction fails at
/// the call that supplied it. Terminal methods render the current [`Query`],
/// run it and interpret the result.
///
/// ```ignore
/// let rows = QueryBuilder::new(&mut conn)
///     .table("products")
///     .select(["name", "price"])
///     .where_("price", "<", 5000)?
///     .order_by("price", "desc")?
///     .get()
///     .await?;
/// ```
pub struct QueryBuilder<'c, C: Connection + ?Sized> {
    conn: &'c mut C,
    query: Query,
}

impl<'c, C: Connection + ?Sized> QueryBuilder<'c, C> {
    pub fn new(conn: &'c mut C) -> Self {
        Self {
            conn,
            query: Query::default(),
        }
    }

    /// Start a new logical query on `table`, discarding all previous state.
    pub fn table(&mut self, table: impl Into<String>) -> &mut Self {
        self.query = Query::new(table);
        self
    }

    /// Clear all state but keep the current table.
    pub fn reset(&mut self) -> &mut Self {
        self.query.reset();
        self
    }

    /// Replace the selected column expressions.
    pub fn select<I, S>(&mut self, columns: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.query.kind = StatementKind::Select;
        self.query.columns = columns.into_iter().map(Into::into).collect();
        self
    }

    pub fn distinct(&mut self) -> &mut Self {
        self.query.distinct = true;
        self
    }

    // ==================== WHERE ====================

    /// `AND column <op> ?`
    pub fn where_(
        &mut self,
        column: impl Into<String>,
        op: &str,
        value: impl Into<Value>,
    ) -> OrmResult<&mut Self> {
        let op: Op = op.parse()?;
        Ok(self.where_op(Connector::And, column, op, value))
    }

    /// `OR column <op> ?`
    pub fn or_where(
        &mut self,
        column: impl Into<String>,
        op: &str,
        value: impl Into<Value>,
    ) -> OrmResult<&mut Self> {
        let op: Op = op.parse()?;
        Ok(self.where_op(Connector::Or, column, op, value))
    }

    /// `AND column = ?`
    pub fn where_eq(&mut self, column: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        self.where_op(Connector::And, column, Op::Eq, value)
    }

    /// Add a comparison with an already-validated operator.
    pub fn where_op(
        &mut self,
        connector: Connector,
        column: impl Into<String>,
        op: Op,
        value: impl Into<Value>,
    ) -> &mut Self {
        self.query.push_where(
            connector,
            Predicate::Compare {
                column: column.into(),
                op,
                value: value.into(),
            },
        );
        self
    }

    pub fn where_in<I, V>(&mut self, column: impl Into<String>, values: I) -> &mut Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.push_in(Connector::And, column.into(), values, false)
    }

    pub fn or_where_in<I, V>(&mut self, column: impl Into<String>, values: I) -> &mut Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.push_in(Connector::Or, column.into(), values, false)
    }

    pub fn where_not_in<I, V>(&mut self, column: impl Into<String>, values: I) -> &mut Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.push_in(Connector::And, column.into(), values, true)
    }

    pub fn or_where_not_in<I, V>(&mut self, column: impl Into<String>, values: I) -> &mut Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.push_in(Connector::Or, column.into(), values, true)
    }

    fn push_in<I, V>(&mut self, connector: Connector, column: String, values: I, negated: bool) -> &mut Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.query.push_where(
            connector,
            Predicate::In {
                column,
                values: values.into_iter().map(Into::into).collect(),
                negated,
            },
        );
        self
    }

    pub fn where_null(&mut self, column: impl Into<String>) -> &mut Self {
        self.push_null(Connector::And, column.into(), false)
    }

    pub fn or_where_null(&mut self, column: impl Into<String>) -> &mut Self {
        self.push_null(Connector::Or, column.into(), false)
    }

    pub fn where_not_null(&mut self, column: impl Into<String>) -> &mut Self {
        self.push_null(Connector::And, column.into(), true)
    }

    pub fn or_where_not_null(&mut self, column: impl Into<String>) -> &mut Self {
        self.push_null(Connector::Or, column.into(), true)
    }

    fn push_null(&mut self, connector: Connector, column: String, negated: bool) -> &mut Self {
        self.query
            .push_where(connector, Predicate::Null { column, negated });
        self
    }

    // ==================== JOIN ====================

    pub fn join(
        &mut self,
        table: impl Into<String>,
        left: impl Into<String>,
        op: impl Into<String>,
        right: impl Into<String>,
    ) -> &mut Self {
        self.query
            .joins
            .push(Join::new(JoinKind::Inner, table, left, op, right));
        self
    }

    pub fn left_join(
        &mut self,
        table: impl Into<String>,
        left: impl Into<String>,
        op: impl Into<String>,
        right: impl Into<String>,
    ) -> &mut Self {
        self.query
            .joins
            .push(Join::new(JoinKind::Left, table, left, op, right));
        self
    }

    pub fn right_join(
        &mut self,
        table: impl Into<String>,
        left: impl Into<String>,
        op: impl Into<String>,
        right: impl Into<String>,
    ) -> &mut Self {
        self.query
            .joins
            .push(Join::new(JoinKind::Right, table, left, op, right));
        self
    }

    // ==================== GROUP / HAVING / ORDER / WINDOW ====================

    pub fn group_by<I, S>(&mut self, columns: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.query.groups.extend(columns.into_iter().map(Into::into));
        self
    }

    pub fn having(
        &mut self,
        column: impl Into<String>,
        op: &str,
        value: impl Into<Value>,
    ) -> OrmResult<&mut Self> {
        self.push_having(Connector::And, column, op, value)
    }

    pub fn or_having(
        &mut self,
        column: impl Into<String>,
        op: &str,
        value: impl Into<Value>,
    ) -> OrmResult<&mut Self> {
        self.push_having(Connector::Or, column, op, value)
    }

    fn push_having(
        &mut self,
        connector: Connector,
        column: impl Into<String>,
        op: &str,
        value: impl Into<Value>,
    ) -> OrmResult<&mut Self> {
        let op: Op = op.parse()?;
        self.query
            .havings
            .push(super::clause::Having::new(connector, column, op, value.into()));
        Ok(self)
    }

    /// `ORDER BY column <dir>`; `dir` is `asc` or `desc` in any case.
    pub fn order_by(&mut self, column: impl Into<String>, dir: &str) -> OrmResult<&mut Self> {
        let dir: OrderDirection = dir.parse()?;
        self.query.orders.push((column.into(), dir));
        Ok(self)
    }

    pub fn order_by_desc(&mut self, column: impl Into<String>) -> &mut Self {
        self.query.orders.push((column.into(), OrderDirection::Desc));
        self
    }

    pub fn limit(&mut self, limit: u64) -> &mut Self {
        self.query.limit = Some(limit);
        self
    }

    /// Only rendered when a limit is also set.
    pub fn offset(&mut self, offset: u64) -> &mut Self {
        self.query.offset = Some(offset);
        self
    }

    /// Queue one column value for the next `insert` or `update`.
    pub fn set(&mut self, column: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        self.query.set_data(column.into(), value.into());
        self
    }

    // ==================== Rendering ====================

    pub fn query(&self) -> &Query {
        &self.query
    }

    pub fn to_sql(&self) -> OrmResult<String> {
        self.query.to_sql()
    }

    pub fn bindings(&self) -> OrmResult<Vec<Value>> {
        self.query.bindings()
    }

    // ==================== Execution ====================

    /// Run the SELECT and return every row.
    pub async fn get(&mut self) -> OrmResult<Vec<Row>> {
        self.query.kind = StatementKind::Select;
        fetch(&mut *self.conn, &self.query).await
    }

    /// Run the SELECT with `LIMIT 1` and return the first row, if any.
    ///
    /// The builder's own limit is left untouched.
    pub async fn first(&mut self) -> OrmResult<Option<Row>> {
        let mut query = self.query.clone();
        query.kind = StatementKind::Select;
        query.limit = Some(1);
        let rows = fetch(&mut *self.conn, &query).await?;
        Ok(rows.into_iter().next())
    }

    /// Like [`first`](Self::first) but fails with [`OrmError::NotFound`] when empty.
    pub async fn first_or_fail(&mut self) -> OrmResult<Row> {
        let table = self.query.table().unwrap_or_default().to_string();
        self.first()
            .await?
            .ok_or_else(|| OrmError::not_found(format!("no row in {table}")))
    }

    pub async fn get_as<T: FromRow>(&mut self) -> OrmResult<Vec<T>> {
        self.get().await?.iter().map(T::from_row).collect()
    }

    pub async fn first_as<T: FromRow>(&mut self) -> OrmResult<Option<T>> {
        self.first().await?.as_ref().map(T::from_row).transpose()
    }

    /// Number of rows matching the current filters.
    ///
    /// With GROUP BY this is the number of groups.
    pub async fn count(&mut self) -> OrmResult<u64> {
        let query = self.query.count_query();
        let rows = fetch(&mut *self.conn, &query).await?;
        if !query.groups.is_empty() {
            return Ok(rows.len() as u64);
        }
        match rows.first().and_then(|row| row.get("count")) {
            None => Ok(0),
            Some(value) => value
                .as_i64()
                .and_then(|n| u64::try_from(n).ok())
                .ok_or_else(|| OrmError::decode("count", format!("not a count: {value}"))),
        }
    }

    /// Insert `data` (merged over anything queued with [`set`](Self::set)).
    ///
    /// Returns whether a row was written.
    pub async fn insert<I, K, V>(&mut self, data: I) -> OrmResult<bool>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        for (column, value) in data {
            self.query.set_data(column.into(), value.into());
        }
        self.query.kind = StatementKind::Insert;
        let affected = execute(&mut *self.conn, &self.query).await?;
        Ok(affected > 0)
    }

    /// Update matching rows with `data`; returns the affected-row count.
    pub async fn update<I, K, V>(&mut self, data: I) -> OrmResult<u64>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        for (column, value) in data {
            self.query.set_data(column.into(), value.into());
        }
        self.query.kind = StatementKind::Update;
        execute(&mut *self.conn, &self.query).await
    }

    /// Delete matching rows; returns the affected-row count.
    pub async fn delete(&mut self) -> OrmResult<u64> {
        self.query.kind = StatementKind::Delete;
        execute(&mut *self.conn, &self.query).await
    }

    /// Fetch page `page` (1-based, clamped into range) of `per_page` rows.
    pub async fn paginate(&mut self, per_page: u64, page: u64) -> OrmResult<Page> {
        if per_page == 0 {
            return Err(OrmError::invalid_argument("per_page must be at least 1"));
        }

        let total = self.count().await?;
        let (total_pages, current_page, offset, from, to) = page::window(total, per_page, page);

        let data = if total == 0 {
            Vec::new()
        } else {
            let mut query = self.query.clone();
            query.kind = StatementKind::Select;
            query.limit = Some(per_page);
            query.offset = Some(offset);
            fetch(&mut *self.conn, &query).await?
        };

        Ok(Page {
            total,
            per_page,
            current_page,
            total_pages,
            from,
            to,
            data,
        })
    }

    /// Identifier generated by the last INSERT on the underlying connection.
    pub fn last_insert_id(&self) -> Option<u64> {
        self.conn.last_insert_id()
    }
}

async fn fetch<C: Connection + ?Sized>(conn: &mut C, query: &Query) -> OrmResult<Vec<Row>> {
    let (sql, params) = query.build()?;
    trace_sql(&sql, &params);
    conn.query(&sql, &params).await
}

async fn execute<C: Connection + ?Sized>(conn: &mut C, query: &Query) -> OrmResult<u64> {
    let (sql, params) = query.build()?;
    trace_sql(&sql, &params);
    conn.execute(&sql, &params).await
}
