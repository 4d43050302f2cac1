//! Error types for schema discovery and validation.

use thiserror::Error;

/// Result type for schema operations.
pub type SchemaResult<T> = Result<T, SchemaError>;

/// Errors raised while validating catalog data into a schema model.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchemaError {
    /// The table has no primary key, or a key column did not survive validation.
    #[error("missing primary key in table {table}: {reason}")]
    MissingPrimaryKey {
        /// Table name.
        table: String,
        /// What was missing.
        reason: String,
    },

    /// The table has no columns, or only primary key columns.
    #[error("table {table} is empty: {reason}")]
    EmptyTable {
        /// Table name.
        table: String,
        /// Why the table was rejected.
        reason: String,
    },

    /// The native type has no canonical mapping for this provider.
    #[error("column {column} of type {type_name} from provider {provider} is not supported")]
    UnsupportedType {
        /// Column name.
        column: String,
        /// Native type name as reported by the catalog.
        type_name: String,
        /// Provider name.
        provider: String,
    },

    /// The column name collides with a reserved tracking column.
    #[error("column name {column} from provider {provider} is reserved")]
    ReservedName {
        /// Column name.
        column: String,
        /// Provider name.
        provider: String,
    },

    /// A relation references a column that does not exist.
    #[error("relation {relation} on table {table} is unsupported: {reason}")]
    UnsupportedRelation {
        /// Constraint name.
        relation: String,
        /// Child table name.
        table: String,
        /// Which column could not be resolved.
        reason: String,
    },

    /// The catalog adapter failed.
    #[error("catalog error: {0}")]
    Catalog(String),

    /// The model itself is malformed (duplicate or empty table list).
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),
}

impl SchemaError {
    /// Creates a missing primary key error.
    pub fn missing_primary_key(table: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MissingPrimaryKey {
            table: table.into(),
            reason: reason.into(),
        }
    }

    /// Creates an empty table error.
    pub fn empty_table(table: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::EmptyTable {
            table: table.into(),
            reason: reason.into(),
        }
    }

    /// Creates a catalog error.
    pub fn catalog(message: impl Into<String>) -> Self {
        Self::Catalog(message.into())
    }

    /// Returns the categorical name carried across process boundaries.
    pub fn type_name(&self) -> &'static str {
        match self {
            SchemaError::MissingPrimaryKey { .. } => "MissingPrimaryKeyError",
            SchemaError::EmptyTable { .. } => "EmptyTableError",
            SchemaError::UnsupportedType { .. } => "UnsupportedTypeError",
            SchemaError::ReservedName { .. } => "ReservedNameError",
            SchemaError::UnsupportedRelation { .. } => "UnsupportedRelationError",
            SchemaError::Catalog(_) => "CatalogError",
            SchemaError::InvalidConfiguration(_) => "InvalidConfigurationError",
        }
    }
}
