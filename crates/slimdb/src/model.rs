//! Active-record style access to a single table.
//!
//! A [`Model`] only describes its table. Rows are held in a [`Record`], which
//! remembers the values it was loaded with so that [`Record::save`] writes
//! back just the columns that changed.
//!
//! ```ignore
//! struct Product;
//!
//! impl Model for Product {
//!     const TABLE: &'static str = "products";
//!     const FILLABLE: &'static [&'static str] = &["name", "price", "stock"];
//! }
//!
//! let mut lamp = Record::<Product>::create(&mut conn, [("name", "Lamp"), ("price", "19.90")]).await?;
//! lamp.set("stock", 12);
//! lamp.save(&mut conn).await?; // UPDATE products SET stock = ?, updated_at = ? WHERE id = ?
//! ```

use crate::client::Connection;
use crate::error::{OrmError, OrmResult};
use crate::qb::{self, QueryBuilder};
use crate::row::{FromValue, Row};
use crate::value::Value;
use chrono::SubsecRound;
use serde::{Serialize, Serializer};
use std::fmt;
use std::marker::PhantomData;

/// Table metadata for a [`Record`].
pub trait Model {
    const TABLE: &'static str;

    const PRIMARY_KEY: &'static str = "id";

    /// Maintain `created_at` / `updated_at` on save.
    const TIMESTAMPS: bool = true;

    /// Columns accepted by [`Record::fill`]. Empty accepts every column.
    const FILLABLE: &'static [&'static str] = &[];

    /// Columns left out of [`Record::to_row`] and serialization.
    const HIDDEN: &'static [&'static str] = &[];
}

/// One row of `M::TABLE` with change tracking.
pub struct Record<M: Model> {
    attributes: Vec<(String, Value)>,
    original: Vec<(String, Value)>,
    _model: PhantomData<fn() -> M>,
}

impl<M: Model> Record<M> {
    /// A record filled through [`fill`](Self::fill). Nothing is dirty yet.
    pub fn new<I, K, V>(attributes: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        let mut record = Self {
            attributes: Vec::new(),
            original: Vec::new(),
            _model: PhantomData,
        };
        record.fill(attributes);
        record.sync_original();
        record
    }

    /// A record loaded from the database. Every column is kept, fillable or not.
    pub fn from_row(row: Row) -> Self {
        let attributes: Vec<(String, Value)> = row
            .iter()
            .map(|(column, value)| (column.to_string(), value.clone()))
            .collect();
        Self {
            original: attributes.clone(),
            attributes,
            _model: PhantomData,
        }
    }

    /// Mass-assign attributes, skipping columns outside `M::FILLABLE`.
    pub fn fill<I, K, V>(&mut self, attributes: I) -> &mut Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        for (column, value) in attributes {
            let column = column.into();
            if M::FILLABLE.is_empty() || M::FILLABLE.contains(&column.as_str()) {
                self.set(column, value);
            }
        }
        self
    }

    pub fn set(&mut self, column: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        let column = column.into();
        let value = value.into();
        match self.attributes.iter_mut().find(|(c, _)| *c == column) {
            Some(slot) => slot.1 = value,
            None => self.attributes.push((column, value)),
        }
        self
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.attributes
            .iter()
            .find(|(c, _)| c == column)
            .map(|(_, v)| v)
    }

    pub fn try_get<T: FromValue>(&self, column: &str) -> OrmResult<T> {
        let value = self
            .get(column)
            .ok_or_else(|| OrmError::decode(column, "attribute not set"))?;
        T::from_value(value).map_err(|message| OrmError::decode(column, message))
    }

    /// The primary key, unless missing or NULL.
    pub fn key(&self) -> Option<&Value> {
        self.get(M::PRIMARY_KEY).filter(|v| !v.is_null())
    }

    /// Attributes whose value differs from what was last loaded or saved.
    pub fn dirty(&self) -> Vec<(String, Value)> {
        self.attributes
            .iter()
            .filter(|(column, value)| {
                self.original
                    .iter()
                    .find(|(c, _)| c == column)
                    .is_none_or(|(_, old)| old != value)
            })
            .cloned()
            .collect()
    }

    pub fn is_dirty(&self) -> bool {
        !self.dirty().is_empty()
    }

    /// Accept the current attributes as the saved state.
    pub fn sync_original(&mut self) {
        self.original = self.attributes.clone();
    }

    /// Visible attributes, without `M::HIDDEN` columns.
    pub fn to_row(&self) -> Row {
        Row::from_pairs(
            self.attributes
                .iter()
                .filter(|(column, _)| !M::HIDDEN.contains(&column.as_str()))
                .map(|(column, value)| (column.as_str(), value.clone())),
        )
    }

    /// A query builder on `M::TABLE`.
    pub fn query<C: Connection + ?Sized>(conn: &mut C) -> QueryBuilder<'_, C> {
        qb::table(conn, M::TABLE)
    }

    pub async fn all<C: Connection + ?Sized>(conn: &mut C) -> OrmResult<Vec<Self>> {
        let rows = Self::query(conn).get().await?;
        Ok(rows.into_iter().map(Self::from_row).collect())
    }

    pub async fn find<C: Connection + ?Sized>(
        conn: &mut C,
        id: impl Into<Value>,
    ) -> OrmResult<Option<Self>> {
        let row = Self::query(conn)
            .where_eq(M::PRIMARY_KEY, id)
            .first()
            .await?;
        Ok(row.map(Self::from_row))
    }

    /// Build a record from `attributes` and insert it.
    pub async fn create<C, I, K, V>(conn: &mut C, attributes: I) -> OrmResult<Self>
    where
        C: Connection + ?Sized,
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        let mut record = Self::new(attributes);
        record.save(conn).await?;
        Ok(record)
    }

    /// Insert the record when it has no key, otherwise update its dirty columns.
    ///
    /// A keyed record with nothing to write is reported as saved without a query.
    pub async fn save<C: Connection + ?Sized>(&mut self, conn: &mut C) -> OrmResult<bool> {
        if M::TIMESTAMPS {
            let now = Value::DateTime(chrono::Local::now().naive_local().trunc_subsecs(0));
            if self.key().is_none() {
                self.set("created_at", now.clone());
            }
            self.set("updated_at", now);
        }

        match self.key().cloned() {
            Some(id) => self.update_model(conn, id).await,
            None => self.insert_model(conn).await,
        }
    }

    async fn insert_model<C: Connection + ?Sized>(&mut self, conn: &mut C) -> OrmResult<bool> {
        let data: Vec<(String, Value)> = self
            .attributes
            .iter()
            .filter(|(column, _)| column != M::PRIMARY_KEY)
            .cloned()
            .collect();

        let mut query = Self::query(conn);
        let inserted = query.insert(data).await?;
        let id = query.last_insert_id();
        if inserted {
            if let Some(id) = id {
                self.set(M::PRIMARY_KEY, id);
            }
            self.sync_original();
        }
        Ok(inserted)
    }

    async fn update_model<C: Connection + ?Sized>(
        &mut self,
        conn: &mut C,
        id: Value,
    ) -> OrmResult<bool> {
        let dirty = self.dirty();
        if dirty.is_empty() {
            return Ok(true);
        }

        let updated = Self::query(conn)
            .where_eq(M::PRIMARY_KEY, id)
            .update(dirty)
            .await?;
        if updated > 0 {
            self.sync_original();
        }
        Ok(updated > 0)
    }

    /// Delete the row by primary key. A record without a key deletes nothing.
    pub async fn delete<C: Connection + ?Sized>(&self, conn: &mut C) -> OrmResult<bool> {
        let Some(id) = self.key().cloned() else {
            return Ok(false);
        };
        let deleted = Self::query(conn)
            .where_eq(M::PRIMARY_KEY, id)
            .delete()
            .await?;
        Ok(deleted > 0)
    }
}

impl<M: Model> Clone for Record<M> {
    fn clone(&self) -> Self {
        Self {
            attributes: self.attributes.clone(),
            original: self.original.clone(),
            _model: PhantomData,
        }
    }
}

impl<M: Model> fmt::Debug for Record<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Record")
            .field("table", &M::TABLE)
            .field("attributes", &self.to_row())
            .finish()
    }
}

impl<M: Model> Serialize for Record<M> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_row().serialize(serializer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockConnection;

    struct Product;

    impl Model for Product {
        const TABLE: &'static str = "products";
        const FILLABLE: &'static [&'static str] = &["name", "price", "stock"];
        const HIDDEN: &'static [&'static str] = &["cost"];
    }

    struct Tag;

    impl Model for Tag {
        const TABLE: &'static str = "tags";
        const PRIMARY_KEY: &'static str = "tag_id";
        const TIMESTAMPS: bool = false;
    }

    fn lamp_row() -> Row {
        Row::from_pairs([
            ("id", Value::from(7)),
            ("name", Value::from("Lamp")),
            ("stock", Value::from(3)),
            ("cost", Value::from("4.10")),
        ])
    }

    #[test]
    fn fill_respects_fillable() {
        let record = Record::<Product>::new([("name", "Lamp"), ("id", "99"), ("cost", "1")]);
        assert_eq!(record.get("name"), Some(&Value::from("Lamp")));
        assert!(record.get("id").is_none());
        assert!(record.get("cost").is_none());
        assert!(!record.is_dirty());
    }

    #[test]
    fn dirty_tracks_changes_since_load() {
        let mut record = Record::<Product>::from_row(lamp_row());
        assert!(record.dirty().is_empty());

        record.set("stock", 3).set("name", "Desk lamp").set("color", "red");
        assert_eq!(
            record.dirty(),
            [
                ("name".to_string(), Value::from("Desk lamp")),
                ("color".to_string(), Value::from("red")),
            ]
        );

        record.sync_original();
        assert!(!record.is_dirty());
    }

    #[test]
    fn hidden_columns_are_not_exposed() {
        let record = Record::<Product>::from_row(lamp_row());
        assert_eq!(record.to_row().columns(), ["id", "name", "stock"]);
        assert_eq!(record.try_get::<String>("cost").unwrap(), "4.10");

        let json = serde_json::to_value(&record).unwrap();
        assert!(json.get("cost").is_none());
        assert_eq!(json["name"], "Lamp");
    }

    #[tokio::test]
    async fn find_by_primary_key() {
        let mut conn = MockConnection::new();
        conn.push_rows(vec![lamp_row()]);

        let record = Record::<Product>::find(&mut conn, 7).await.unwrap().unwrap();
        assert_eq!(record.key(), Some(&Value::from(7)));
        assert_eq!(
            conn.last_statement().unwrap(),
            &(
                "SELECT * FROM products WHERE id = ? LIMIT 1".to_string(),
                vec![Value::from(7)]
            )
        );

        let missing = Record::<Product>::find(&mut conn, 8).await.unwrap();
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn all_loads_every_row() {
        let mut conn = MockConnection::new();
        conn.push_rows(vec![lamp_row(), lamp_row()]);
        let records = Record::<Product>::all(&mut conn).await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(conn.sql_log(), ["SELECT * FROM products"]);
    }

    #[tokio::test]
    async fn create_inserts_and_takes_the_new_key() {
        let mut conn = MockConnection::new();
        let record = Record::<Product>::create(&mut conn, [("name", "Lamp"), ("stock", "2")])
            .await
            .unwrap();

        assert_eq!(record.key(), Some(&Value::from(1u64)));
        assert!(record.get("created_at").is_some());
        assert!(!record.is_dirty());
        assert_eq!(
            conn.sql_log(),
            ["INSERT INTO products (name, stock, created_at, updated_at) VALUES (?, ?, ?, ?)"]
        );
    }

    #[tokio::test]
    async fn save_updates_only_changed_columns() {
        let mut conn = MockConnection::new();
        let mut record = Record::<Tag>::from_row(Row::from_pairs([
            ("tag_id", Value::from(4)),
            ("label", Value::from("sale")),
        ]));

        assert!(record.save(&mut conn).await.unwrap());
        assert!(conn.statements().is_empty());

        record.set("label", "clearance");
        assert!(record.save(&mut conn).await.unwrap());
        assert_eq!(
            conn.last_statement().unwrap(),
            &(
                "UPDATE tags SET label = ? WHERE tag_id = ?".to_string(),
                vec![Value::from("clearance"), Value::from(4)]
            )
        );
        assert!(!record.is_dirty());
    }

    #[tokio::test]
    async fn save_with_timestamps_touches_updated_at() {
        let mut conn = MockConnection::new();
        let mut record = Record::<Product>::from_row(lamp_row());
        record.set("stock", 5);
        record.save(&mut conn).await.unwrap();

        let (sql, _) = conn.last_statement().unwrap();
        assert_eq!(sql, "UPDATE products SET stock = ?, updated_at = ? WHERE id = ?");
        assert!(record.get("created_at").is_none());
    }

    #[tokio::test]
    async fn delete_requires_a_key() {
        let mut conn = MockConnection::new();
        let unsaved = Record::<Tag>::new([("label", "new")]);
        assert!(!unsaved.delete(&mut conn).await.unwrap());
        assert!(conn.statements().is_empty());

        let saved = Record::<Tag>::from_row(Row::from_pairs([("tag_id", 4)]));
        assert!(saved.delete(&mut conn).await.unwrap());
        assert_eq!(conn.sql_log(), ["DELETE FROM tags WHERE tag_id = ?"]);
    }
}
