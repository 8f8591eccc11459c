//! Migration discovery: identifier validation, unit naming and sources.

use super::Migration;
use crate::error::{OrmError, OrmResult};
use heck::ToUpperCamelCase;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

/// Builds a fresh migration unit.
pub type MigrationFactory = Arc<dyn Fn() -> Box<dyn Migration> + Send + Sync>;

/// Whether `identifier` follows `YYYY_MM_DD_HHMMSS_snake_case_name`.
pub fn is_valid_identifier(identifier: &str) -> bool {
    static IDENTIFIER_RE: OnceLock<regex::Regex> = OnceLock::new();
    IDENTIFIER_RE
        .get_or_init(|| {
            regex::Regex::new(r"^\d{4}_\d{2}_\d{2}_\d{6}_[a-z0-9]+(?:_[a-z0-9]+)*$")
                .expect("invalid built-in migration identifier regex")
        })
        .is_match(identifier)
}

/// Unit name for an identifier: the timestamp prefix stripped and the rest
/// UpperCamelCased.
///
/// `2024_06_01_120000_create_users_table` becomes `CreateUsersTable`.
pub fn unit_name(identifier: &str) -> String {
    let name = identifier.splitn(5, '_').nth(4).unwrap_or(identifier);
    name.to_upper_camel_case()
}

/// Compile-time registration collected through `inventory`.
///
/// Submitted by [`register_migration!`](crate::register_migration).
pub struct MigrationRegistration {
    pub identifier: &'static str,
    pub factory: fn() -> Box<dyn Migration>,
}

inventory::collect!(MigrationRegistration);

/// Register a migration type under its identifier.
///
/// The type must implement [`Migration`] and `Default`.
///
/// ```ignore
/// #[derive(Default)]
/// pub struct CreateUsersTable;
///
/// slimdb::register_migration!("2024_06_01_120000_create_users_table", CreateUsersTable);
/// ```
#[macro_export]
macro_rules! register_migration {
    ($identifier:literal, $unit:ty) => {
        $crate::inventory::submit! {
            $crate::migrate::MigrationRegistration {
                identifier: $identifier,
                factory: || -> ::std::boxed::Box<dyn $crate::migrate::Migration> {
                    ::std::boxed::Box::new(<$unit as ::std::default::Default>::default())
                },
            }
        }
    };
}

/// Something that enumerates migration identifiers and builds units for them.
pub trait MigrationSource: Send + Sync {
    /// Every known identifier. Order does not matter; the runner sorts.
    fn identifiers(&self) -> OrmResult<Vec<String>>;

    /// Build the unit for `identifier`.
    fn resolve(&self, identifier: &str) -> OrmResult<Box<dyn Migration>>;
}

/// Explicit identifier → factory table.
#[derive(Clone, Default)]
pub struct MigrationRegistry {
    factories: BTreeMap<String, MigrationFactory>,
    units: HashMap<String, String>,
}

impl std::fmt::Debug for MigrationRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MigrationRegistry")
            .field("identifiers", &self.factories.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl MigrationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding every unit submitted with [`register_migration!`](crate::register_migration).
    pub fn collect() -> OrmResult<Self> {
        let mut registry = Self::new();
        for reg in inventory::iter::<MigrationRegistration> {
            let factory = reg.factory;
            registry.register(reg.identifier, move || factory())?;
        }
        Ok(registry)
    }

    /// Register a factory under `identifier`.
    ///
    /// Rejects malformed identifiers, duplicates, and identifiers whose unit name
    /// collides with one already registered.
    pub fn register<F>(&mut self, identifier: impl Into<String>, factory: F) -> OrmResult<&mut Self>
    where
        F: Fn() -> Box<dyn Migration> + Send + Sync + 'static,
    {
        let identifier = identifier.into();
        if !is_valid_identifier(&identifier) {
            return Err(OrmError::invalid_argument(format!(
                "invalid migration identifier `{identifier}`: expected YYYY_MM_DD_HHMMSS_snake_case_name"
            )));
        }
        if self.factories.contains_key(&identifier) {
            return Err(OrmError::invalid_argument(format!(
                "migration `{identifier}` is registered twice"
            )));
        }
        let unit = unit_name(&identifier);
        if let Some(existing) = self.units.get(&unit) {
            return Err(OrmError::invalid_argument(format!(
                "migrations `{existing}` and `{identifier}` both resolve to unit `{unit}`"
            )));
        }

        self.units.insert(unit, identifier.clone());
        self.factories.insert(identifier, Arc::new(factory));
        Ok(self)
    }

    /// Register a `Default`-constructible unit type.
    pub fn register_type<M>(&mut self, identifier: impl Into<String>) -> OrmResult<&mut Self>
    where
        M: Migration + Default + 'static,
    {
        self.register(identifier, || Box::new(M::default()))
    }

    pub fn contains(&self, identifier: &str) -> bool {
        self.factories.contains_key(identifier)
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }
}

impl MigrationSource for MigrationRegistry {
    fn identifiers(&self) -> OrmResult<Vec<String>> {
        Ok(self.factories.keys().cloned().collect())
    }

    fn resolve(&self, identifier: &str) -> OrmResult<Box<dyn Migration>> {
        self.factories
            .get(identifier)
            .map(|factory| factory())
            .ok_or_else(|| OrmError::not_found(format!("migration `{identifier}` is not registered")))
    }
}

/// Migrations discovered as `<identifier>.rs` files in a directory and resolved
/// through a registry.
///
/// Files that don't follow the naming convention are ignored. A file whose unit
/// was never registered is only an error when it has to run.
#[derive(Debug, Clone)]
pub struct DirectorySource {
    dir: PathBuf,
    registry: MigrationRegistry,
}

impl DirectorySource {
    pub fn new(dir: impl Into<PathBuf>, registry: MigrationRegistry) -> Self {
        Self {
            dir: dir.into(),
            registry,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl MigrationSource for DirectorySource {
    fn identifiers(&self) -> OrmResult<Vec<String>> {
        if !self.dir.is_dir() {
            return Err(OrmError::config(format!(
                "migrations directory not found: {}",
                self.dir.display()
            )));
        }

        // the directory itself may contain glob metacharacters such as `[`
        let pattern = format!(
            "{}/*.rs",
            glob::Pattern::escape(&self.dir.to_string_lossy())
        );
        let paths = glob::glob(&pattern)
            .map_err(|e| OrmError::config(format!("invalid migrations directory pattern: {e}")))?;

        let mut identifiers = Vec::new();
        for entry in paths {
            let path = entry.map_err(|e| OrmError::Io(e.into()))?;
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            if is_valid_identifier(stem) {
                identifiers.push(stem.to_string());
            }
        }
        identifiers.sort();
        Ok(identifiers)
    }

    fn resolve(&self, identifier: &str) -> OrmResult<Box<dyn Migration>> {
        if !self.registry.contains(identifier) {
            return Err(OrmError::schema(format!(
                "migration file `{identifier}.rs` has no registered unit `{}`",
                unit_name(identifier)
            )));
        }
        self.registry.resolve(identifier)
    }
}
