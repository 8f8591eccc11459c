//! Convenient imports for writing migrations, seeders and queries.
//!
//! ```ignore
//! use slimdb::prelude::*;
//! ```

pub use crate::migrate::{Migration, Schema};
pub use crate::model::{Model, Record};
pub use crate::qb;
pub use crate::schema::TableBlueprint;
pub use crate::seed::Seeder;
pub use crate::{Connection, FromRow, OrmError, OrmResult, Row, Value, async_trait};
