//! Table blueprints: column, index and foreign-key intents rendered as DDL.

use super::column::ColumnDefinition;
use std::collections::BTreeMap;
use std::fmt::Display;

/// Index flavour.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexKind {
    Index,
    Unique,
}

impl IndexKind {
    fn prefix(self) -> &'static str {
        match self {
            IndexKind::Index => "index",
            IndexKind::Unique => "unique",
        }
    }
}

/// An index over one or more columns.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexDefinition {
    kind: IndexKind,
    columns: Vec<String>,
    name: Option<String>,
}

impl IndexDefinition {
    /// Use an explicit index name instead of the generated one.
    pub fn name(&mut self, name: impl Into<String>) -> &mut Self {
        self.name = Some(name.into());
        self
    }

    pub fn kind(&self) -> IndexKind {
        self.kind
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    fn resolved_name(&self, table: &str) -> String {
        match &self.name {
            Some(name) => name.clone(),
            None => format!(
                "{}_{}_{}_idx",
                self.kind.prefix(),
                table,
                self.columns.join("_")
            ),
        }
    }

    fn column_list(&self) -> String {
        format!("`{}`", self.columns.join("`, `"))
    }
}

/// A foreign-key constraint.
///
/// References `id` with `ON DELETE RESTRICT ON UPDATE CASCADE` unless told otherwise.
#[derive(Debug, Clone, PartialEq)]
pub struct ForeignKey {
    column: String,
    on_table: String,
    references: String,
    on_delete: String,
    on_update: String,
    name: Option<String>,
}

impl ForeignKey {
    pub fn references(&mut self, column: impl Into<String>) -> &mut Self {
        self.references = column.into();
        self
    }

    /// Referential action for deletes (`CASCADE`, `SET NULL`, `RESTRICT`, ...).
    pub fn on_delete(&mut self, action: impl Into<String>) -> &mut Self {
        self.on_delete = action.into();
        self
    }

    pub fn on_update(&mut self, action: impl Into<String>) -> &mut Self {
        self.on_update = action.into();
        self
    }

    /// Use an explicit constraint name instead of `fk_<table>_<column>`.
    pub fn name(&mut self, name: impl Into<String>) -> &mut Self {
        self.name = Some(name.into());
        self
    }

    fn resolved_name(&self, table: &str) -> String {
        match &self.name {
            Some(name) => name.clone(),
            None => format!("fk_{}_{}", table, self.column),
        }
    }

    fn to_sql(&self, table: &str) -> String {
        format!(
            "CONSTRAINT `{}` FOREIGN KEY (`{}`) REFERENCES `{}` (`{}`) ON DELETE {} ON UPDATE {}",
            self.resolved_name(table),
            self.column,
            self.on_table,
            self.references,
            self.on_delete,
            self.on_update
        )
    }
}

/// A free-form ALTER TABLE change, rendered in issue order after additions.
#[derive(Debug, Clone, PartialEq)]
pub enum Alteration {
    /// `MODIFY COLUMN <definition>`
    Modify(ColumnDefinition),
    DropColumn(String),
    DropIndex(String),
    DropForeign(String),
}

impl Alteration {
    pub fn to_sql(&self) -> String {
        match self {
            Alteration::Modify(column) => format!("MODIFY COLUMN {}", column.to_sql()),
            Alteration::DropColumn(name) => format!("DROP COLUMN `{name}`"),
            Alteration::DropIndex(name) => format!("DROP INDEX `{name}`"),
            Alteration::DropForeign(name) => format!("DROP FOREIGN KEY `{name}`"),
        }
    }
}

/// Column, index, foreign-key and alteration intents for one table.
///
/// A blueprint is filled in by a callback and rendered once, either as
/// `CREATE TABLE` or `ALTER TABLE`:
///
/// ```ignore
/// let mut t = TableBlueprint::new("posts");
/// t.id();
/// t.big_integer("user_id").unsigned();
/// t.string("title", 200);
/// t.text("body").nullable();
/// t.timestamps();
/// t.index(["user_id", "created_at"]);
/// t.foreign("user_id", "users").on_delete("CASCADE");
/// t.engine("InnoDB");
/// let ddl = t.build_create_table();
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct TableBlueprint {
    table: String,
    columns: Vec<ColumnDefinition>,
    indexes: Vec<IndexDefinition>,
    foreign_keys: Vec<ForeignKey>,
    alterations: Vec<Alteration>,
    options: BTreeMap<String, String>,
}

impl TableBlueprint {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            columns: Vec::new(),
            indexes: Vec::new(),
            foreign_keys: Vec::new(),
            alterations: Vec::new(),
            options: BTreeMap::new(),
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn columns(&self) -> &[ColumnDefinition] {
        &self.columns
    }

    pub fn alterations(&self) -> &[Alteration] {
        &self.alterations
    }

    /// True when nothing has been declared yet.
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
            && self.indexes.is_empty()
            && self.foreign_keys.is_empty()
            && self.alterations.is_empty()
            && self.options.is_empty()
    }

    // ==================== Columns ====================

    /// Add a column of any SQL type. Re-adding a name replaces the earlier definition
    /// in place.
    pub fn column(&mut self, name: impl Into<String>, sql_type: impl Into<String>) -> &mut ColumnDefinition {
        let column = ColumnDefinition::new(name, sql_type);
        let idx = match self.columns.iter().position(|c| c.name() == column.name()) {
            Some(idx) => {
                self.columns[idx] = column;
                idx
            }
            None => {
                self.columns.push(column);
                self.columns.len() - 1
            }
        };
        &mut self.columns[idx]
    }

    /// `id`: unsigned auto-increment `bigint` primary key.
    pub fn id(&mut self) -> &mut ColumnDefinition {
        self.id_named("id")
    }

    pub fn id_named(&mut self, name: impl Into<String>) -> &mut ColumnDefinition {
        self.column(name, "bigint")
            .unsigned()
            .auto_increment()
            .primary()
    }

    /// `varchar(length)`
    pub fn string(&mut self, name: impl Into<String>, length: u32) -> &mut ColumnDefinition {
        self.column(name, format!("varchar({length})"))
    }

    pub fn text(&mut self, name: impl Into<String>) -> &mut ColumnDefinition {
        self.column(name, "text")
    }

    pub fn integer(&mut self, name: impl Into<String>) -> &mut ColumnDefinition {
        self.column(name, "int")
    }

    pub fn big_integer(&mut self, name: impl Into<String>) -> &mut ColumnDefinition {
        self.column(name, "bigint")
    }

    pub fn decimal(&mut self, name: impl Into<String>, precision: u8, scale: u8) -> &mut ColumnDefinition {
        self.column(name, format!("decimal({precision},{scale})"))
    }

    pub fn float(&mut self, name: impl Into<String>, precision: u8, scale: u8) -> &mut ColumnDefinition {
        self.column(name, format!("float({precision},{scale})"))
    }

    pub fn double(&mut self, name: impl Into<String>) -> &mut ColumnDefinition {
        self.column(name, "double")
    }

    pub fn timestamp(&mut self, name: impl Into<String>) -> &mut ColumnDefinition {
        self.column(name, "timestamp")
    }

    /// `tinyint(1)`
    pub fn boolean(&mut self, name: impl Into<String>) -> &mut ColumnDefinition {
        self.column(name, "tinyint(1)")
    }

    /// `created_at` defaulting to `CURRENT_TIMESTAMP`, and `updated_at` that also
    /// refreshes on every update.
    pub fn timestamps(&mut self) {
        self.timestamp("created_at").default("CURRENT_TIMESTAMP");
        self.timestamp("updated_at")
            .default_raw("CURRENT_TIMESTAMP ON UPDATE CURRENT_TIMESTAMP");
    }

    // ==================== Indexes & keys ====================

    pub fn index<I, S>(&mut self, columns: I) -> &mut IndexDefinition
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.push_index(IndexKind::Index, columns)
    }

    pub fn unique<I, S>(&mut self, columns: I) -> &mut IndexDefinition
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.push_index(IndexKind::Unique, columns)
    }

    fn push_index<I, S>(&mut self, kind: IndexKind, columns: I) -> &mut IndexDefinition
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.indexes.push(IndexDefinition {
            kind,
            columns: columns.into_iter().map(Into::into).collect(),
            name: None,
        });
        let idx = self.indexes.len() - 1;
        &mut self.indexes[idx]
    }

    /// Foreign key from `column` to `on_table`.`id`.
    pub fn foreign(&mut self, column: impl Into<String>, on_table: impl Into<String>) -> &mut ForeignKey {
        self.foreign_keys.push(ForeignKey {
            column: column.into(),
            on_table: on_table.into(),
            references: "id".to_string(),
            on_delete: "RESTRICT".to_string(),
            on_update: "CASCADE".to_string(),
            name: None,
        });
        let idx = self.foreign_keys.len() - 1;
        &mut self.foreign_keys[idx]
    }

    // ==================== Alterations ====================

    /// `MODIFY COLUMN`: redefine an existing column. Modifiers chained on the
    /// returned handle are part of the rendered change.
    pub fn change(&mut self, name: impl Into<String>, sql_type: impl Into<String>) -> &mut ColumnDefinition {
        let idx = self.alterations.len();
        self.alterations
            .push(Alteration::Modify(ColumnDefinition::new(name, sql_type)));
        match &mut self.alterations[idx] {
            Alteration::Modify(column) => column,
            _ => unreachable!("modify alteration was just pushed"),
        }
    }

    pub fn drop_column(&mut self, name: impl Into<String>) {
        self.alterations.push(Alteration::DropColumn(name.into()));
    }

    pub fn drop_index(&mut self, name: impl Into<String>) {
        self.alterations.push(Alteration::DropIndex(name.into()));
    }

    pub fn drop_foreign(&mut self, name: impl Into<String>) {
        self.alterations.push(Alteration::DropForeign(name.into()));
    }

    // ==================== Table options ====================

    /// Table option rendered after the column list as `KEY=value`.
    pub fn option(&mut self, key: impl AsRef<str>, value: impl Display) {
        self.options
            .insert(key.as_ref().to_ascii_uppercase(), value.to_string());
    }

    pub fn engine(&mut self, engine: impl Display) {
        self.option("ENGINE", engine);
    }

    pub fn charset(&mut self, charset: impl Display) {
        self.option("CHARSET", charset);
    }

    pub fn collation(&mut self, collation: impl Display) {
        self.option("COLLATE", collation);
    }

    // ==================== Rendering ====================

    /// Render `CREATE TABLE`: columns, one composite primary key, indexes,
    /// foreign keys, then table options.
    pub fn build_create_table(&self) -> String {
        let mut parts: Vec<String> = self
            .columns
            .iter()
            .map(|c| format!("  {}", c.to_sql()))
            .collect();

        let primary: Vec<&str> = self
            .columns
            .iter()
            .filter(|c| c.is_primary())
            .map(ColumnDefinition::name)
            .collect();
        if !primary.is_empty() {
            parts.push(format!("  PRIMARY KEY (`{}`)", primary.join("`, `")));
        }

        for index in &self.indexes {
            let keyword = match index.kind {
                IndexKind::Index => "KEY",
                IndexKind::Unique => "UNIQUE KEY",
            };
            parts.push(format!(
                "  {keyword} `{}` ({})",
                index.resolved_name(&self.table),
                index.column_list()
            ));
        }

        for fk in &self.foreign_keys {
            parts.push(format!("  {}", fk.to_sql(&self.table)));
        }

        let mut sql = format!("CREATE TABLE `{}` (\n{}\n)", self.table, parts.join(",\n"));

        if !self.options.is_empty() {
            let options: Vec<String> = self
                .options
                .iter()
                .map(|(key, value)| format!("{key}={value}"))
                .collect();
            sql.push(' ');
            sql.push_str(&options.join(" "));
        }

        sql.push(';');
        sql
    }

    /// Render `ALTER TABLE`: added columns, added indexes, added foreign keys,
    /// then alterations in issue order.
    pub fn build_alter_table(&self) -> String {
        let mut changes: Vec<String> = self
            .columns
            .iter()
            .map(|c| format!("ADD COLUMN {}", c.to_sql()))
            .collect();

        for index in &self.indexes {
            let keyword = match index.kind {
                IndexKind::Index => "ADD INDEX",
                IndexKind::Unique => "ADD UNIQUE INDEX",
            };
            changes.push(format!(
                "{keyword} `{}` ({})",
                index.resolved_name(&self.table),
                index.column_list()
            ));
        }

        for fk in &self.foreign_keys {
            changes.push(format!("ADD {}", fk.to_sql(&self.table)));
        }

        changes.extend(self.alterations.iter().map(Alteration::to_sql));

        format!("ALTER TABLE `{}`\n{};", self.table, changes.join(",\n"))
    }
}
