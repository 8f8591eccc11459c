//! Clause types held by a statement descriptor.

use crate::error::{OrmError, OrmResult};
use crate::value::Value;
use std::fmt;
use std::str::FromStr;

/// Comparison operator allowed in WHERE / HAVING comparisons.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Eq,
    /// `<>`
    Ne,
    /// `!=`
    NotEq,
    Gt,
    Gte,
    Lt,
    Lte,
    Like,
    NotLike,
    Is,
    IsNot,
}

impl Op {
    pub fn as_str(self) -> &'static str {
        match self {
            Op::Eq => "=",
            Op::Ne => "<>",
            Op::NotEq => "!=",
            Op::Gt => ">",
            Op::Gte => ">=",
            Op::Lt => "<",
            Op::Lte => "<=",
            Op::Like => "LIKE",
            Op::NotLike => "NOT LIKE",
            Op::Is => "IS",
            Op::IsNot => "IS NOT",
        }
    }
}

impl FromStr for Op {
    type Err = OrmError;

    /// Parse an operator from the allow-list. Keyword operators are matched
    /// case-insensitively; anything else is an invalid argument.
    fn from_str(s: &str) -> OrmResult<Self> {
        let op = match s.trim().to_ascii_uppercase().as_str() {
            "=" => Op::Eq,
            "<>" => Op::Ne,
            "!=" => Op::NotEq,
            ">" => Op::Gt,
            ">=" => Op::Gte,
            "<" => Op::Lt,
            "<=" => Op::Lte,
            "LIKE" => Op::Like,
            "NOT LIKE" => Op::NotLike,
            "IS" => Op::Is,
            "IS NOT" => Op::IsNot,
            _ => return Err(OrmError::invalid_argument(format!("invalid operator: {s}"))),
        };
        Ok(op)
    }
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a clause joins onto the clause before it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Connector {
    #[default]
    And,
    Or,
}

impl Connector {
    pub fn as_str(self) -> &'static str {
        match self {
            Connector::And => "AND",
            Connector::Or => "OR",
        }
    }
}

/// A single WHERE predicate.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// `column <op> ?`
    Compare { column: String, op: Op, value: Value },
    /// `column [NOT] IN (?, ?, ...)`, one placeholder per member in list order
    In {
        column: String,
        values: Vec<Value>,
        negated: bool,
    },
    /// `column IS [NOT] NULL`
    Null { column: String, negated: bool },
}

impl Predicate {
    /// Render this predicate, pushing its bound values in placeholder order.
    pub(crate) fn render(&self, sql: &mut String, params: &mut Vec<Value>) {
        match self {
            Predicate::Compare { column, op, value } => {
                sql.push_str(column);
                sql.push(' ');
                sql.push_str(op.as_str());
                sql.push_str(" ?");
                params.push(value.clone());
            }
            Predicate::In {
                values, negated, ..
            } if values.is_empty() => {
                // `IN ()` is a syntax error; an empty set matches nothing.
                sql.push_str(if *negated { "1=1" } else { "1=0" });
            }
            Predicate::In {
                column,
                values,
                negated,
            } => {
                sql.push_str(column);
                sql.push_str(if *negated { " NOT IN (" } else { " IN (" });
                for (i, value) in values.iter().enumerate() {
                    if i > 0 {
                        sql.push_str(", ");
                    }
                    sql.push('?');
                    params.push(value.clone());
                }
                sql.push(')');
            }
            Predicate::Null { column, negated } => {
                sql.push_str(column);
                sql.push_str(if *negated { " IS NOT NULL" } else { " IS NULL" });
            }
        }
    }
}

/// A predicate plus the connector joining it to the previous clause.
#[derive(Debug, Clone, PartialEq)]
pub struct Clause {
    pub connector: Connector,
    pub predicate: Predicate,
}

/// A HAVING comparison. Always rendered into the HAVING list.
#[derive(Debug, Clone, PartialEq)]
pub struct Having {
    pub connector: Connector,
    pub column: String,
    pub op: Op,
    pub value: Value,
}

/// Join kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    Inner,
    Left,
    Right,
}

impl JoinKind {
    pub fn as_str(self) -> &'static str {
        match self {
            JoinKind::Inner => "INNER",
            JoinKind::Left => "LEFT",
            JoinKind::Right => "RIGHT",
        }
    }
}

/// `<KIND> JOIN <table> ON <left> <op> <right>`
///
/// Nothing here is validated; table and column expressions are trusted input.
#[derive(Debug, Clone, PartialEq)]
pub struct Join {
    pub kind: JoinKind,
    pub table: String,
    pub left: String,
    pub op: String,
    pub right: String,
}

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OrderDirection {
    #[default]
    Asc,
    Desc,
}

impl OrderDirection {
    pub fn as_str(self) -> &'static str {
        match self {
            OrderDirection::Asc => "ASC",
            OrderDirection::Desc => "DESC",
        }
    }
}

impl FromStr for OrderDirection {
    type Err = OrmError;

    fn from_str(s: &str) -> OrmResult<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "ASC" => Ok(OrderDirection::Asc),
            "DESC" => Ok(OrderDirection::Desc),
            _ => Err(OrmError::invalid_argument(format!(
                "invalid sort direction: {s}"
            ))),
        }
    }
}

/// The statement a descriptor renders to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StatementKind {
    #[default]
    Select,
    Insert,
    Update,
    Delete,
}

impl fmt::Display for StatementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            StatementKind::Select => "SELECT",
            StatementKind::Insert => "INSERT",
            StatementKind::Update => "UPDATE",
            StatementKind::Delete => "DELETE",
        })
    }
}
