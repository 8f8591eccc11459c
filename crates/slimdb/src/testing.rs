//! In-memory [`Connection`] for tests.
//!
//! [`MockConnection`] records every statement it receives and answers from a
//! script: failure patterns first, then an optional handler closure, then queued
//! row sets, then per-pattern canned rows. Anything unscripted returns no rows
//! (for queries) or the configured affected count (for statements).

use crate::client::Connection;
use crate::error::{OrmError, OrmResult};
use crate::row::Row;
use crate::value::Value;
use std::collections::VecDeque;

/// A scripted reply produced by a [`MockConnection`] handler.
#[derive(Debug, Clone, PartialEq)]
pub enum MockReply {
    Rows(Vec<Row>),
    Affected(u64),
    Error(String),
}

type Handler = Box<dyn FnMut(&str, &[Value]) -> Option<MockReply> + Send>;

/// Transaction events observed by the mock, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxEvent {
    Begin,
    Commit,
    Rollback,
}

pub struct MockConnection {
    database: String,
    statements: Vec<(String, Vec<Value>)>,
    tx_events: Vec<TxEvent>,
    in_transaction: bool,
    implicit_ddl_commit: bool,
    affected: u64,
    last_insert_id: Option<u64>,
    next_insert_id: u64,
    failures: Vec<(String, String)>,
    canned: Vec<(String, Vec<Row>)>,
    queued: VecDeque<Vec<Row>>,
    handler: Option<Handler>,
}

impl Default for MockConnection {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MockConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockConnection")
            .field("database", &self.database)
            .field("statements", &self.statements.len())
            .field("in_transaction", &self.in_transaction)
            .finish_non_exhaustive()
    }
}

impl MockConnection {
    pub fn new() -> Self {
        Self {
            database: "test".to_string(),
            statements: Vec::new(),
            tx_events: Vec::new(),
            in_transaction: false,
            implicit_ddl_commit: false,
            affected: 1,
            last_insert_id: None,
            next_insert_id: 1,
            failures: Vec::new(),
            canned: Vec::new(),
            queued: VecDeque::new(),
            handler: None,
        }
    }

    pub fn with_database(mut self, name: impl Into<String>) -> Self {
        self.database = name.into();
        self
    }

    /// Affected-row count reported by unscripted statements (default 1).
    pub fn with_affected(mut self, affected: u64) -> Self {
        self.affected = affected;
        self
    }

    /// Behave like MySQL: any DDL statement silently commits the open transaction.
    pub fn with_implicit_ddl_commit(mut self) -> Self {
        self.implicit_ddl_commit = true;
        self
    }

    /// Route every statement through `handler` first; `None` falls through to the
    /// rest of the script.
    pub fn with_handler<F>(mut self, handler: F) -> Self
    where
        F: FnMut(&str, &[Value]) -> Option<MockReply> + Send + 'static,
    {
        self.handler = Some(Box::new(handler));
        self
    }

    /// Fail any statement whose SQL contains `pattern`.
    pub fn fail_on(&mut self, pattern: impl Into<String>, message: impl Into<String>) -> &mut Self {
        self.failures.push((pattern.into(), message.into()));
        self
    }

    /// Answer every query whose SQL contains `pattern` with `rows`.
    pub fn on_query(&mut self, pattern: impl Into<String>, rows: Vec<Row>) -> &mut Self {
        self.canned.push((pattern.into(), rows));
        self
    }

    /// Answer the next unmatched query with `rows`.
    pub fn push_rows(&mut self, rows: Vec<Row>) -> &mut Self {
        self.queued.push_back(rows);
        self
    }

    /// Every statement received, with its parameters.
    pub fn statements(&self) -> &[(String, Vec<Value>)] {
        &self.statements
    }

    /// SQL text of every statement received.
    pub fn sql_log(&self) -> Vec<&str> {
        self.statements.iter().map(|(sql, _)| sql.as_str()).collect()
    }

    /// The last statement received.
    pub fn last_statement(&self) -> Option<&(String, Vec<Value>)> {
        self.statements.last()
    }

    /// Number of statements whose SQL contains `pattern`.
    pub fn count_matching(&self, pattern: &str) -> usize {
        self.statements
            .iter()
            .filter(|(sql, _)| sql.contains(pattern))
            .count()
    }

    pub fn tx_events(&self) -> &[TxEvent] {
        &self.tx_events
    }

    pub fn clear(&mut self) {
        self.statements.clear();
        self.tx_events.clear();
    }

    fn record(&mut self, sql: &str, params: &[Value]) -> OrmResult<Option<MockReply>> {
        self.statements.push((sql.to_string(), params.to_vec()));

        if let Some((_, message)) = self.failures.iter().find(|(p, _)| sql.contains(p.as_str())) {
            return Err(OrmError::execution(sql, message));
        }

        if self.implicit_ddl_commit && self.in_transaction && is_ddl(sql) {
            self.in_transaction = false;
        }

        let reply = match self.handler.as_mut() {
            Some(handler) => handler(sql, params),
            None => None,
        };
        match reply {
            Some(MockReply::Error(message)) => Err(OrmError::execution(sql, message)),
            other => Ok(other),
        }
    }
}

fn is_ddl(sql: &str) -> bool {
    let head = sql.trim_start().to_ascii_uppercase();
    ["CREATE ", "ALTER ", "DROP ", "RENAME ", "TRUNCATE "]
        .iter()
        .any(|kw| head.starts_with(kw))
}

#[async_trait::async_trait]
impl Connection for MockConnection {
    async fn query(&mut self, sql: &str, params: &[Value]) -> OrmResult<Vec<Row>> {
        match self.record(sql, params)? {
            Some(MockReply::Rows(rows)) => return Ok(rows),
            Some(MockReply::Affected(_)) => return Ok(Vec::new()),
            _ => {}
        }
        if let Some(rows) = self.queued.pop_front() {
            return Ok(rows);
        }
        Ok(self
            .canned
            .iter()
            .find(|(p, _)| sql.contains(p.as_str()))
            .map(|(_, rows)| rows.clone())
            .unwrap_or_default())
    }

    async fn execute(&mut self, sql: &str, params: &[Value]) -> OrmResult<u64> {
        let affected = match self.record(sql, params)? {
            Some(MockReply::Affected(n)) => n,
            Some(MockReply::Rows(rows)) => rows.len() as u64,
            _ => self.affected,
        };
        if sql.trim_start().to_ascii_uppercase().starts_with("INSERT") && affected > 0 {
            self.last_insert_id = Some(self.next_insert_id);
            self.next_insert_id += 1;
        }
        Ok(affected)
    }

    async fn begin_transaction(&mut self) -> OrmResult<()> {
        if self.in_transaction {
            return Err(OrmError::Connection("transaction already open".into()));
        }
        self.in_transaction = true;
        self.tx_events.push(TxEvent::Begin);
        Ok(())
    }

    async fn commit(&mut self) -> OrmResult<()> {
        self.in_transaction = false;
        self.tx_events.push(TxEvent::Commit);
        Ok(())
    }

    async fn rollback(&mut self) -> OrmResult<()> {
        if self.in_transaction {
            self.in_transaction = false;
            self.tx_events.push(TxEvent::Rollback);
        }
        Ok(())
    }

    fn in_transaction(&self) -> bool {
        self.in_transaction
    }

    fn last_insert_id(&self) -> Option<u64> {
        self.last_insert_id
    }

    fn database_name(&self) -> &str {
        &self.database
    }
}
