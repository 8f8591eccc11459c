//! DDL blueprints for MySQL tables.
//!
//! [`TableBlueprint`] collects column, index, foreign-key and alteration intents
//! and renders them as `CREATE TABLE` or `ALTER TABLE`. Nothing is validated here;
//! existence checks live on [`migrate::Schema`](crate::migrate::Schema).

mod blueprint;
mod column;

pub use blueprint::{Alteration, ForeignKey, IndexDefinition, IndexKind, TableBlueprint};
pub use column::{ColumnDefinition, DefaultValue, is_function_default};

#[cfg(test)]
mod tests;
