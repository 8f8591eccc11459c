//! Statement descriptor and its renderer.

use super::clause::{
    Clause, Connector, Having, Join, JoinKind, Op, OrderDirection, Predicate, StatementKind,
};
use crate::error::{OrmError, OrmResult};
use crate::value::Value;

/// Everything needed to render one SQL statement.
///
/// A `Query` is plain data: cloning it, rendering it, or rendering it twice has no
/// side effects. [`QueryBuilder`](super::QueryBuilder) owns one and replaces it
/// wholesale when a new table is selected.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    pub(crate) kind: StatementKind,
    pub(crate) table: Option<String>,
    pub(crate) columns: Vec<String>,
    pub(crate) distinct: bool,
    pub(crate) wheres: Vec<Clause>,
    pub(crate) joins: Vec<Join>,
    pub(crate) groups: Vec<String>,
    pub(crate) havings: Vec<Having>,
    pub(crate) orders: Vec<(String, OrderDirection)>,
    pub(crate) limit: Option<u64>,
    pub(crate) offset: Option<u64>,
    pub(crate) data: Vec<(String, Value)>,
}

impl Query {
    /// A fresh SELECT descriptor on `table`.
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: Some(table.into()),
            ..Self::default()
        }
    }

    pub fn kind(&self) -> StatementKind {
        self.kind
    }

    pub fn table(&self) -> Option<&str> {
        self.table.as_deref()
    }

    pub fn limit(&self) -> Option<u64> {
        self.limit
    }

    pub fn offset(&self) -> Option<u64> {
        self.offset
    }

    /// Column/value pairs queued for INSERT or UPDATE, in column order.
    pub fn data(&self) -> &[(String, Value)] {
        &self.data
    }

    /// Clear every field except the table.
    pub fn reset(&mut self) {
        let table = self.table.take();
        *self = Self {
            table,
            ..Self::default()
        };
    }

    pub(crate) fn push_where(&mut self, connector: Connector, predicate: Predicate) {
        self.wheres.push(Clause {
            connector,
            predicate,
        });
    }

    /// Upsert a data column, keeping first-insertion order.
    pub(crate) fn set_data(&mut self, column: String, value: Value) {
        match self.data.iter_mut().find(|(c, _)| *c == column) {
            Some(slot) => slot.1 = value,
            None => self.data.push((column, value)),
        }
    }

    /// The count-only variant used by pagination: same table, joins, filters and
    /// grouping, with the column list replaced by `COUNT(*)` and no ordering or window.
    ///
    /// A `DISTINCT` selection of explicit columns counts distinct combinations
    /// instead, matching the rows the select itself would return.
    pub fn count_query(&self) -> Self {
        let count = if self.distinct && !self.columns.is_empty() && self.groups.is_empty() {
            let exprs: Vec<&str> = self.columns.iter().map(|c| strip_alias(c)).collect();
            format!("COUNT(DISTINCT {}) AS count", exprs.join(", "))
        } else {
            "COUNT(*) AS count".to_string()
        };
        Self {
            kind: StatementKind::Select,
            columns: vec![count],
            distinct: false,
            orders: Vec::new(),
            limit: None,
            offset: None,
            data: Vec::new(),
            ..self.clone()
        }
    }

    /// Render SQL and its bound parameters in one pass.
    ///
    /// Placeholders and values are produced together, so the parameter list is
    /// always aligned with the `?` markers in the SQL.
    pub fn build(&self) -> OrmResult<(String, Vec<Value>)> {
        let table = self
            .table
            .as_deref()
            .filter(|t| !t.is_empty())
            .ok_or_else(|| OrmError::invalid_argument("no table selected"))?;

        let mut sql = String::new();
        let mut params = Vec::new();

        match self.kind {
            StatementKind::Select => self.render_select(table, &mut sql, &mut params),
            StatementKind::Insert => self.render_insert(table, &mut sql, &mut params),
            StatementKind::Update => {
                if self.data.is_empty() {
                    return Err(OrmError::invalid_argument("UPDATE requires at least one column"));
                }
                self.render_update(table, &mut sql, &mut params);
            }
            StatementKind::Delete => {
                sql.push_str("DELETE FROM ");
                sql.push_str(table);
                self.render_where(&mut sql, &mut params);
            }
        }

        Ok((sql, params))
    }

    /// Rendered SQL text.
    pub fn to_sql(&self) -> OrmResult<String> {
        self.build().map(|(sql, _)| sql)
    }

    /// Bound parameters in placeholder order.
    pub fn bindings(&self) -> OrmResult<Vec<Value>> {
        self.build().map(|(_, params)| params)
    }

    fn render_select(&self, table: &str, sql: &mut String, params: &mut Vec<Value>) {
        sql.push_str("SELECT ");
        if self.distinct {
            sql.push_str("DISTINCT ");
        }
        if self.columns.is_empty() {
            sql.push('*');
        } else {
            sql.push_str(&self.columns.join(", "));
        }
        sql.push_str(" FROM ");
        sql.push_str(table);

        for join in &self.joins {
            sql.push(' ');
            sql.push_str(join.kind.as_str());
            sql.push_str(" JOIN ");
            sql.push_str(&join.table);
            sql.push_str(" ON ");
            sql.push_str(&join.left);
            sql.push(' ');
            sql.push_str(&join.op);
            sql.push(' ');
            sql.push_str(&join.right);
        }

        self.render_where(sql, params);

        if !self.groups.is_empty() {
            sql.push_str(" GROUP BY ");
            sql.push_str(&self.groups.join(", "));
        }

        if !self.havings.is_empty() {
            sql.push_str(" HAVING ");
            for (i, having) in self.havings.iter().enumerate() {
                if i > 0 {
                    sql.push(' ');
                    sql.push_str(having.connector.as_str());
                    sql.push(' ');
                }
                sql.push_str(&having.column);
                sql.push(' ');
                sql.push_str(having.op.as_str());
                sql.push_str(" ?");
                params.push(having.value.clone());
            }
        }

        if !self.orders.is_empty() {
            sql.push_str(" ORDER BY ");
            let parts: Vec<String> = self
                .orders
                .iter()
                .map(|(column, dir)| format!("{column} {}", dir.as_str()))
                .collect();
            sql.push_str(&parts.join(", "));
        }

        if let Some(limit) = self.limit {
            sql.push_str(&format!(" LIMIT {limit}"));
            if let Some(offset) = self.offset {
                sql.push_str(&format!(" OFFSET {offset}"));
            }
        }
    }

    fn render_insert(&self, table: &str, sql: &mut String, params: &mut Vec<Value>) {
        let columns: Vec<&str> = self.data.iter().map(|(c, _)| c.as_str()).collect();
        let placeholders = vec!["?"; self.data.len()].join(", ");
        sql.push_str(&format!(
            "INSERT INTO {table} ({}) VALUES ({placeholders})",
            columns.join(", ")
        ));
        params.extend(self.data.iter().map(|(_, v)| v.clone()));
    }

    fn render_update(&self, table: &str, sql: &mut String, params: &mut Vec<Value>) {
        let assignments: Vec<String> = self.data.iter().map(|(c, _)| format!("{c} = ?")).collect();
        sql.push_str(&format!("UPDATE {table} SET {}", assignments.join(", ")));
        params.extend(self.data.iter().map(|(_, v)| v.clone()));
        self.render_where(sql, params);
    }

    fn render_where(&self, sql: &mut String, params: &mut Vec<Value>) {
        if self.wheres.is_empty() {
            return;
        }
        sql.push_str(" WHERE ");
        for (i, clause) in self.wheres.iter().enumerate() {
            if i > 0 {
                sql.push(' ');
                sql.push_str(clause.connector.as_str());
                sql.push(' ');
            }
            clause.predicate.render(sql, params);
        }
    }
}

impl Join {
    pub(crate) fn new(
        kind: JoinKind,
        table: impl Into<String>,
        left: impl Into<String>,
        op: impl Into<String>,
        right: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            table: table.into(),
            left: left.into(),
            op: op.into(),
            right: right.into(),
        }
    }
}

impl Having {
    pub(crate) fn new(connector: Connector, column: impl Into<String>, op: Op, value: Value) -> Self {
        Self {
            connector,
            column: column.into(),
            op,
            value,
        }
    }
}

/// `expr AS alias` -> `expr`; aliases are not allowed inside `COUNT(...)`.
fn strip_alias(column: &str) -> &str {
    match column.to_ascii_lowercase().rfind(" as ") {
        Some(idx) => column[..idx].trim(),
        None => column.trim(),
    }
}
