//! Query builder for MySQL-style `?` placeholder SQL.
//!
//! The builder is split in two:
//!
//! - [`Query`]: a plain statement descriptor with a pure renderer. Placeholders and
//!   bound values are produced in the same pass, so they can never drift apart.
//! - [`QueryBuilder`]: a fluent accumulator bound to a `&mut` [`Connection`] that
//!   validates input eagerly and runs the rendered statement.
//!
//! Selecting a table replaces the descriptor wholesale, so nothing from a previous
//! logical query can leak into the next one.
//!
//! # Usage
//!
//! ```ignore
//! use slimdb::qb;
//!
//! let mut products = qb::table(&mut conn, "products");
//!
//! let cheap = products
//!     .select(["name", "price"])
//!     .where_("price", "<", 5000)?
//!     .order_by("price", "asc")?
//!     .get()
//!     .await?;
//!
//! products
//!     .table("products")
//!     .insert([("name", Value::from("Lamp")), ("price", Value::from(3200))])
//!     .await?;
//!
//! let page = products.table("products").paginate(10, 2).await?;
//! ```

mod builder;
mod clause;
mod page;
mod query;

pub use builder::QueryBuilder;
pub use clause::{
    Clause, Connector, Having, Join, JoinKind, Op, OrderDirection, Predicate, StatementKind,
};
pub use page::Page;
pub use query::Query;

use crate::client::Connection;

/// Start a builder on `table`.
pub fn table<'c, C: Connection + ?Sized>(
    conn: &'c mut C,
    table: impl Into<String>,
) -> QueryBuilder<'c, C> {
    let mut qb = QueryBuilder::new(conn);
    qb.table(table);
    qb
}
