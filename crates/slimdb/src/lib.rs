//! # slimdb
//!
//! A small MySQL toolkit: a fluent query builder, a table blueprint DSL and an
//! ordered migration runner with a ledger table.
//!
//! ## Features
//!
//! - **Parameterized by construction**: every value goes through a `?` placeholder
//! - **One query at a time**: selecting a table starts a fresh statement
//! - **Idempotent DDL**: creating an existing table or dropping a missing one is skipped
//! - **Transactional batches**: a migration batch commits or rolls back as a unit
//!   (as far as MySQL's implicit DDL commits allow)
//!
//! ## Query Builder (qb)
//!
//! ```ignore
//! use slimdb::qb;
//!
//! let rows = qb::table(&mut conn, "products")
//!     .select(["name", "price"])
//!     .where_("price", "<", 5000)?
//!     .order_by("price", "desc")?
//!     .limit(10)
//!     .get()
//!     .await?;
//! ```
//!
//! ## Migrations
//!
//! ```ignore
//! use slimdb::migrate::{MigrationRegistry, MigrationRunner};
//!
//! let registry = MigrationRegistry::collect()?;
//! let report = MigrationRunner::new(&mut conn, registry).migrate().await?;
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod migrate;
pub mod model;
pub mod prelude;
pub mod qb;
pub mod row;
pub mod schema;
pub mod seed;
pub mod testing;
pub mod value;

#[cfg(feature = "mysql")]
pub mod mysql;

pub use client::Connection;
pub use config::{ConnectConfig, ConnectSettings};
pub use error::{OrmError, OrmResult};
pub use model::{Model, Record};
pub use qb::{Page, Query, QueryBuilder};
pub use row::{FromRow, FromValue, Row};
pub use schema::{ColumnDefinition, TableBlueprint};
pub use value::Value;

#[cfg(feature = "mysql")]
pub use mysql::MySqlConnection;

// Re-exported for `register_migration!` and generated migration files
pub use async_trait::async_trait;
pub use inventory;
