//! Applies and reverts migrations against the ledger table.

use super::registry::MigrationSource;
use super::schema::Schema;
use super::MigrationConfig;
use crate::client::{Connection, trace_sql};
use crate::error::{OrmError, OrmResult};
use crate::qb;
use chrono::NaiveDateTime;
use serde::Serialize;
use std::collections::{HashMap, HashSet};

/// One ledger row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AppliedMigration {
    pub identifier: String,
    pub run_at: Option<NaiveDateTime>,
}

/// Applied/pending state of one discovered migration.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MigrationState {
    pub identifier: String,
    pub applied_at: Option<NaiveDateTime>,
    pub applied: bool,
}

/// Outcome of [`MigrationRunner::migrate`].
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MigrateReport {
    /// Identifiers applied in this batch, in order.
    pub applied: Vec<String>,
}

impl MigrateReport {
    pub fn is_empty(&self) -> bool {
        self.applied.is_empty()
    }
}

/// Outcome of [`MigrationRunner::rollback`].
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RollbackReport {
    /// Identifiers reverted in this batch, in the order they were reverted.
    pub rolled_back: Vec<String>,
}

impl RollbackReport {
    pub fn is_empty(&self) -> bool {
        self.rolled_back.is_empty()
    }
}

/// Runs migrations from a [`MigrationSource`] against one connection.
///
/// Each `migrate` or `rollback` batch runs in a single transaction. MySQL commits
/// implicitly on DDL, so a failed batch can leave earlier DDL in place; the runner
/// logs a warning when it finds the transaction already closed.
pub struct MigrationRunner<'c, S> {
    conn: &'c mut dyn Connection,
    source: S,
    config: MigrationConfig,
}

impl<'c, S: MigrationSource> MigrationRunner<'c, S> {
    pub fn new(conn: &'c mut dyn Connection, source: S) -> Self {
        Self::with_config(conn, source, MigrationConfig::default())
    }

    pub fn with_config(conn: &'c mut dyn Connection, source: S, config: MigrationConfig) -> Self {
        Self {
            conn,
            source,
            config,
        }
    }

    pub fn config(&self) -> &MigrationConfig {
        &self.config
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// Create the ledger table when it does not exist yet.
    pub async fn ensure_ledger(&mut self) -> OrmResult<()> {
        let mut schema = Schema::new(&mut *self.conn);
        schema
            .create(&self.config.table, |t| {
                t.id();
                t.string("migration", 255);
                t.timestamp("run_at").default("CURRENT_TIMESTAMP");
            })
            .await?;
        Ok(())
    }

    /// Ledger rows in application order.
    pub async fn applied(&mut self) -> OrmResult<Vec<AppliedMigration>> {
        self.ensure_ledger().await?;
        let rows = qb::table(&mut *self.conn, self.config.table.as_str())
            .select(["migration", "run_at"])
            .order_by("id", "asc")?
            .get()
            .await?;

        rows.iter()
            .map(|row| {
                Ok(AppliedMigration {
                    identifier: row.try_get("migration")?,
                    run_at: row.try_get::<Option<NaiveDateTime>>("run_at")?,
                })
            })
            .collect()
    }

    /// Discovered identifiers not yet in the ledger, sorted.
    pub async fn pending(&mut self) -> OrmResult<Vec<String>> {
        let applied: HashSet<String> = self
            .applied()
            .await?
            .into_iter()
            .map(|m| m.identifier)
            .collect();
        let mut pending: Vec<String> = self
            .source
            .identifiers()?
            .into_iter()
            .filter(|id| !applied.contains(id))
            .collect();
        pending.sort();
        pending.dedup();
        Ok(pending)
    }

    /// Apply every pending migration in identifier order, in one transaction.
    pub async fn migrate(&mut self) -> OrmResult<MigrateReport> {
        let pending = self.pending().await?;
        if pending.is_empty() {
            tracing::info!("nothing pending");
            return Ok(MigrateReport::default());
        }

        self.conn.begin_transaction().await?;

        {
            let mut schema = Schema::new(&mut *self.conn);
            for identifier in &pending {
                tracing::info!(migration = %identifier, "running migration");
                if let Err(err) = apply(&self.source, &mut schema, &self.config.table, identifier).await {
                    abort(schema.connection(), identifier).await;
                    return Err(OrmError::migration(identifier.as_str(), err));
                }
            }
        }

        self.conn.commit().await?;
        tracing::info!(count = pending.len(), "migrations applied");
        Ok(MigrateReport { applied: pending })
    }

    /// Revert the last `steps` applied migrations, newest first, in one transaction.
    pub async fn rollback(&mut self, steps: usize) -> OrmResult<RollbackReport> {
        let applied = self.applied().await?;
        let targets: Vec<String> = applied
            .into_iter()
            .rev()
            .take(steps)
            .map(|m| m.identifier)
            .collect();

        if targets.is_empty() {
            tracing::info!("nothing to rollback");
            return Ok(RollbackReport::default());
        }

        self.conn.begin_transaction().await?;

        {
            let mut schema = Schema::new(&mut *self.conn);
            for identifier in &targets {
                tracing::info!(migration = %identifier, "rolling back migration");
                if let Err(err) = revert(&self.source, &mut schema, &self.config.table, identifier).await {
                    abort(schema.connection(), identifier).await;
                    return Err(OrmError::rollback(identifier.as_str(), err));
                }
            }
        }

        self.conn.commit().await?;
        tracing::info!(count = targets.len(), "migrations rolled back");
        Ok(RollbackReport {
            rolled_back: targets,
        })
    }

    /// Applied/pending state for every discovered migration, in identifier order.
    pub async fn status(&mut self) -> OrmResult<Vec<MigrationState>> {
        let applied: HashMap<String, Option<NaiveDateTime>> = self
            .applied()
            .await?
            .into_iter()
            .map(|m| (m.identifier, m.run_at))
            .collect();

        let mut identifiers = self.source.identifiers()?;
        identifiers.sort();
        identifiers.dedup();

        Ok(identifiers
            .into_iter()
            .map(|identifier| {
                let entry = applied.get(&identifier);
                MigrationState {
                    applied_at: entry.copied().flatten(),
                    applied: entry.is_some(),
                    identifier,
                }
            })
            .collect())
    }

    /// Empty the ledger without touching any migrated table.
    pub async fn reset_ledger(&mut self) -> OrmResult<()> {
        self.ensure_ledger().await?;
        let sql = format!("TRUNCATE TABLE `{}`", self.config.table);
        trace_sql(&sql, &[]);
        self.conn.execute(&sql, &[]).await?;
        tracing::info!(table = %self.config.table, "migration ledger cleared");
        Ok(())
    }
}

async fn apply<S: MigrationSource>(
    source: &S,
    schema: &mut Schema<'_>,
    ledger: &str,
    identifier: &str,
) -> OrmResult<()> {
    let unit = source.resolve(identifier)?;
    unit.up(schema).await?;
    schema
        .query(ledger)
        .insert([("migration", identifier)])
        .await?;
    Ok(())
}

async fn revert<S: MigrationSource>(
    source: &S,
    schema: &mut Schema<'_>,
    ledger: &str,
    identifier: &str,
) -> OrmResult<()> {
    let unit = source.resolve(identifier)?;
    unit.down(schema).await?;
    schema
        .query(ledger)
        .where_eq("migration", identifier)
        .delete()
        .await?;
    Ok(())
}

/// Roll back after a failed batch. Errors here are logged; the original failure
/// is what the caller reports.
async fn abort(conn: &mut dyn Connection, identifier: &str) {
    if conn.in_transaction() {
        if let Err(err) = conn.rollback().await {
            tracing::error!(migration = %identifier, error = %err, "rollback after failure failed");
        }
    } else {
        tracing::warn!(
            migration = %identifier,
            "transaction already closed by an implicit DDL commit; earlier schema changes in this batch were not rolled back"
        );
    }
}
