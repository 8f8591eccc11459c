//! Ordered, ledger-tracked schema migrations.
//!
//! A migration is a type implementing [`Migration`], registered under an identifier
//! of the form `YYYY_MM_DD_HHMMSS_snake_case_name`. Identifiers sort
//! chronologically, and the [`MigrationRunner`] applies pending ones in that
//! order, recording each in a ledger table (`migrations` by default).
//!
//! ```ignore
//! use slimdb::migrate::{Migration, MigrationRegistry, MigrationRunner, Schema};
//! use slimdb::OrmResult;
//!
//! #[derive(Default)]
//! pub struct CreateUsersTable;
//!
//! #[slimdb::async_trait]
//! impl Migration for CreateUsersTable {
//!     async fn up(&self, schema: &mut Schema<'_>) -> OrmResult<()> {
//!         schema
//!             .create("users", |t| {
//!                 t.id();
//!                 t.string("email", 191).unique();
//!                 t.timestamps();
//!             })
//!             .await?;
//!         Ok(())
//!     }
//!
//!     async fn down(&self, schema: &mut Schema<'_>) -> OrmResult<()> {
//!         schema.drop("users").await?;
//!         Ok(())
//!     }
//! }
//!
//! slimdb::register_migration!("2024_06_01_120000_create_users_table", CreateUsersTable);
//!
//! let registry = MigrationRegistry::collect()?;
//! let report = MigrationRunner::new(&mut conn, registry).migrate().await?;
//! ```

mod registry;
mod runner;
mod scaffold;
mod schema;

pub use registry::{
    DirectorySource, MigrationFactory, MigrationRegistration, MigrationRegistry, MigrationSource,
    is_valid_identifier, unit_name,
};
pub use runner::{
    AppliedMigration, MigrateReport, MigrationRunner, MigrationState, RollbackReport,
};
pub use scaffold::{identifier_for, scaffold};
pub use schema::{Schema, SchemaOutcome};

use crate::error::OrmResult;
use serde::Deserialize;
use std::path::PathBuf;

/// One reversible schema change.
#[async_trait::async_trait]
pub trait Migration: Send + Sync {
    /// Apply the change.
    async fn up(&self, schema: &mut Schema<'_>) -> OrmResult<()>;

    /// Revert what [`up`](Self::up) did.
    async fn down(&self, schema: &mut Schema<'_>) -> OrmResult<()>;
}

/// Where migrations live and where their history is recorded.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct MigrationConfig {
    /// Ledger table name.
    pub table: String,
    /// Directory holding migration files.
    pub directory: PathBuf,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            table: "migrations".to_string(),
            directory: PathBuf::from("./migrations"),
        }
    }
}

impl MigrationConfig {
    pub fn table(mut self, table: impl Into<String>) -> Self {
        self.table = table.into();
        self
    }

    pub fn directory(mut self, directory: impl Into<PathBuf>) -> Self {
        self.directory = directory.into();
        self
    }
}
