//! Seeding helpers for filling tables with fixture data.
//!
//! ```ignore
//! struct ProductsSeeder;
//!
//! #[slimdb::async_trait]
//! impl Seeder for ProductsSeeder {
//!     async fn run(&self, conn: &mut dyn Connection) -> OrmResult<()> {
//!         seed_table(conn, "products", [
//!             Row::from_pairs([("name", Value::from("Laptop")), ("stock", Value::from(10))]),
//!             Row::from_pairs([("name", Value::from("Phone")), ("stock", Value::from(25))]),
//!         ])
//!         .await?;
//!         Ok(())
//!     }
//! }
//! ```

use crate::client::Connection;
use crate::error::OrmResult;
use crate::qb;
use crate::row::Row;

/// A unit of fixture data.
#[async_trait::async_trait]
pub trait Seeder: Send + Sync {
    /// Name used in log output.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    async fn run(&self, conn: &mut dyn Connection) -> OrmResult<()>;
}

/// Delete every row in `table`, then insert `rows` one by one.
///
/// Returns the number of rows inserted.
pub async fn seed_table<I>(conn: &mut dyn Connection, table: &str, rows: I) -> OrmResult<u64>
where
    I: IntoIterator<Item = Row>,
{
    let removed = qb::table(&mut *conn, table).delete().await?;
    tracing::debug!(table, removed, "cleared table for seeding");

    let mut inserted = 0;
    for row in rows {
        let data = row.iter().map(|(column, value)| (column, value.clone()));
        if qb::table(&mut *conn, table).insert(data).await? {
            inserted += 1;
        }
    }
    tracing::info!(table, inserted, "seeded table");
    Ok(inserted)
}

/// Run seeders in order, stopping at the first failure.
pub async fn run_seeders(conn: &mut dyn Connection, seeders: &[&dyn Seeder]) -> OrmResult<()> {
    for seeder in seeders {
        tracing::info!(seeder = seeder.name(), "running seeder");
        seeder.run(&mut *conn).await?;
    }
    Ok(())
}
