//! Error types for slimdb

use thiserror::Error;

/// Result type alias for slimdb operations
pub type OrmResult<T> = Result<T, OrmError>;

/// Error types for query building, schema changes and migrations
#[derive(Debug, Error)]
pub enum OrmError {
    /// Missing or malformed connection settings
    #[error("Configuration error: {0}")]
    Config(String),

    /// Connection could not be established or was lost
    #[error("Connection error: {0}")]
    Connection(String),

    /// Invalid argument passed to a builder (operator, direction, statement shape)
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Schema precondition failed (missing table, rename target exists, ...)
    #[error("Schema error: {0}")]
    Schema(String),

    /// The database rejected a statement
    #[error("Query error: {message} (SQL: {sql})")]
    Execution { sql: String, message: String },

    /// Row decode/mapping error
    #[error("Decode error on column '{column}': {message}")]
    Decode { column: String, message: String },

    /// Row not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// A forward migration batch failed and was rolled back
    #[error("Migration failed at {migration}: {source}")]
    Migration {
        migration: String,
        #[source]
        source: Box<OrmError>,
    },

    /// A rollback batch failed and was rolled back
    #[error("Rollback failed at {migration}: {source}")]
    Rollback {
        migration: String,
        #[source]
        source: Box<OrmError>,
    },

    /// Filesystem error (migration directories, scaffolding)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl OrmError {
    /// Create an invalid argument error
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }

    /// Create a schema precondition error
    pub fn schema(message: impl Into<String>) -> Self {
        Self::Schema(message.into())
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create an execution error carrying the offending SQL
    pub fn execution(sql: impl Into<String>, message: impl ToString) -> Self {
        Self::Execution {
            sql: sql.into(),
            message: message.to_string(),
        }
    }

    /// Create a decode error for a specific column
    pub fn decode(column: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Decode {
            column: column.into(),
            message: message.into(),
        }
    }

    /// Create a not found error
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    /// Wrap a failure that aborted a forward migration batch
    pub fn migration(migration: impl Into<String>, source: OrmError) -> Self {
        Self::Migration {
            migration: migration.into(),
            source: Box::new(source),
        }
    }

    /// Wrap a failure that aborted a rollback batch
    pub fn rollback(migration: impl Into<String>, source: OrmError) -> Self {
        Self::Rollback {
            migration: migration.into(),
            source: Box::new(source),
        }
    }

    /// Check if this is an invalid argument error
    pub fn is_invalid_argument(&self) -> bool {
        matches!(self, Self::InvalidArgument(_))
    }

    /// Check if this is a schema precondition error
    pub fn is_schema(&self) -> bool {
        matches!(self, Self::Schema(_))
    }

    /// Check if this is a configuration error
    pub fn is_config(&self) -> bool {
        matches!(self, Self::Config(_))
    }

    /// Check if this is a not found error
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// The SQL that caused this error, if the database rejected a statement.
    ///
    /// Looks through migration/rollback wrappers.
    pub fn sql(&self) -> Option<&str> {
        match self {
            Self::Execution { sql, .. } => Some(sql),
            Self::Migration { source, .. } | Self::Rollback { source, .. } => source.sql(),
            _ => None,
        }
    }
}

#[cfg(feature = "mysql")]
impl From<mysql_async::Error> for OrmError {
    fn from(err: mysql_async::Error) -> Self {
        match err {
            mysql_async::Error::Driver(e) => Self::Connection(e.to_string()),
            mysql_async::Error::Io(e) => Self::Connection(e.to_string()),
            mysql_async::Error::Url(e) => Self::Config(e.to_string()),
            other => Self::Connection(other.to_string()),
        }
    }
}
