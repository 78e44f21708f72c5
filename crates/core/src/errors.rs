//! Error types for the pathmap core library.
//!
//! Each subsystem has its own error type derived with `thiserror`, and a
//! top-level [`CoreError`] enum unifies them all for callers that want a
//! single error type.

use thiserror::Error;

// ---------------------------------------------------------------------------
// Top-level error
// ---------------------------------------------------------------------------

/// Unified error type for the entire core library.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Mapper(#[from] MapperError),

    #[error(transparent)]
    Lookup(#[from] LookupError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Database(#[from] DatabaseError),

    #[error(transparent)]
    Model(#[from] ModelError),
}

// ---------------------------------------------------------------------------
// Mapper errors
// ---------------------------------------------------------------------------

/// Errors raised while translating between path segments and object ids.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MapperError {
    /// The path segment is not a valid encoding of the target id type.
    ///
    /// Traversal treats this exactly like a missing object and falls through
    /// to view-name resolution.
    #[error("malformed {kind} identifier '{value}': {detail}")]
    MalformedIdentifier {
        kind: &'static str,
        value: String,
        detail: String,
    },

    /// The object does not carry the configured mapping attribute.
    #[error("object has no mapping attribute '{attribute}'")]
    MissingAttribute { attribute: String },

    /// The attribute value is of a different kind than the transform expects.
    #[error("expected {expected} identifier, found {found}")]
    UnexpectedKind {
        expected: &'static str,
        found: &'static str,
    },
}

impl MapperError {
    /// Whether traversal should fall through to view resolution.
    pub fn is_malformed(&self) -> bool {
        matches!(self, Self::MalformedIdentifier { .. })
    }
}

// ---------------------------------------------------------------------------
// Lookup errors
// ---------------------------------------------------------------------------

/// Errors from an object store while resolving a traversal segment.
#[derive(Debug, Error)]
pub enum LookupError {
    /// The storage backend failed.
    #[error("lookup storage error: {0}")]
    Storage(#[from] DatabaseError),

    /// A non-malformed mapper failure surfaced during resolution.
    #[error("lookup mapper error: {0}")]
    Mapper(#[from] MapperError),

    /// No mapper registered for the requested resource.
    #[error("no mapper registered for resource '{0}'")]
    UnknownResource(String),
}

// ---------------------------------------------------------------------------
// Configuration errors
// ---------------------------------------------------------------------------

/// Errors from configuration loading and validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config file not found.
    #[error("configuration file not found: {0}")]
    FileNotFound(String),

    /// TOML parse error.
    #[error("configuration parse error: {0}")]
    ParseError(String),

    /// A config value is invalid.
    #[error("invalid configuration value for '{field}': {detail}")]
    InvalidValue { field: String, detail: String },

    /// Generic I/O error reading the config file.
    #[error("configuration I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// Database errors
// ---------------------------------------------------------------------------

/// Errors from the SQLite object store.
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Underlying rusqlite error.
    #[error("database error: {0}")]
    SqliteError(#[from] rusqlite::Error),

    /// A migration failed.
    #[error("database migration failed (version {version}): {detail}")]
    MigrationFailed { version: u32, detail: String },

    /// A record was not found.
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// The lookup attribute is not a queryable column of the table.
    #[error("'{attribute}' is not a lookup column of {table}")]
    UnknownColumn { table: String, attribute: String },

    /// A stored value could not be decoded.
    #[error("corrupt {column} value '{value}'")]
    CorruptValue { column: String, value: String },

    /// Generic I/O error (e.g. file permissions).
    #[error("database I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// Model errors
// ---------------------------------------------------------------------------

/// Errors from domain model operations.
#[derive(Debug, Error)]
pub enum ModelError {
    /// The object has not been stored yet and has no id.
    #[error("{entity} has not been stored yet")]
    NotPersisted { entity: String },
}
