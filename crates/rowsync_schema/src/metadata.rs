//! Metadata validation: native column descriptors to canonical columns.
//!
//! Every provider exposes its type vocabulary through the [`Metadata`]
//! trait. [`validate_column`] is the single entry point the schema builder
//! uses; it never holds state between calls.

use crate::error::{SchemaError, SchemaResult};
use crate::model::Column;
use crate::types::{DataType, DbKind};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Column names synthesized by change tracking. User columns must not use them.
pub const RESERVED_COLUMN_NAMES: &[&str] = &[
    "sync_scope_name",
    "scope_timestamp",
    "scope_is_local",
    "scope_last_sync",
    "create_scope_id",
    "update_scope_id",
    "create_timestamp",
    "update_timestamp",
    "timestamp",
    "sync_row_is_tombstone",
    "last_change_datetime",
];

/// Returns true if `name` matches a reserved tracking column, ignoring case.
pub fn is_reserved_column_name(name: &str) -> bool {
    RESERVED_COLUMN_NAMES
        .iter()
        .any(|reserved| reserved.eq_ignore_ascii_case(name))
}

/// A column as reported by a provider's catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NativeColumn {
    /// Column name.
    pub name: String,
    /// Native type name (for example `nvarchar(50)` or `INTEGER`).
    pub type_name: String,
    /// Catalog ordinal position.
    pub ordinal: usize,
    /// Whether the column accepts nulls.
    pub allow_null: bool,
    /// Whether the native type is unsigned.
    pub is_unsigned: bool,
    /// Whether the native text type is unicode.
    pub is_unicode: bool,
    /// Declared maximum length, if any.
    pub max_length: Option<u32>,
    /// Declared precision, if any.
    pub precision: Option<u8>,
    /// Declared scale, if any.
    pub scale: Option<u8>,
    /// Computed column.
    pub is_computed: bool,
    /// Identity or auto-increment column.
    pub is_identity: bool,
    /// Generated (stored or virtual) column.
    pub is_generated: bool,
}

impl NativeColumn {
    /// Creates a non-nullable column descriptor at ordinal 0.
    pub fn new(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
            ordinal: 0,
            allow_null: false,
            is_unsigned: false,
            is_unicode: false,
            max_length: None,
            precision: None,
            scale: None,
            is_computed: false,
            is_identity: false,
            is_generated: false,
        }
    }

    /// Sets the catalog ordinal.
    #[must_use]
    pub fn at(mut self, ordinal: usize) -> Self {
        self.ordinal = ordinal;
        self
    }

    /// Marks the column nullable.
    #[must_use]
    pub fn nullable(mut self) -> Self {
        self.allow_null = true;
        self
    }

    /// Marks the column unsigned.
    #[must_use]
    pub fn unsigned(mut self) -> Self {
        self.is_unsigned = true;
        self
    }

    /// Marks the column as unicode text.
    #[must_use]
    pub fn unicode(mut self) -> Self {
        self.is_unicode = true;
        self
    }

    /// Sets the declared maximum length.
    #[must_use]
    pub fn with_max_length(mut self, max_length: u32) -> Self {
        self.max_length = Some(max_length);
        self
    }

    /// Sets the declared precision and scale.
    #[must_use]
    pub fn with_precision(mut self, precision: u8, scale: u8) -> Self {
        self.precision = Some(precision);
        self.scale = Some(scale);
        self
    }

    /// Marks the column as an identity column.
    #[must_use]
    pub fn identity(mut self) -> Self {
        self.is_identity = true;
        self
    }

    /// Marks the column as computed.
    #[must_use]
    pub fn computed(mut self) -> Self {
        self.is_computed = true;
        self
    }

    /// Normalized lookup key: lowercase, without any `(..)` size suffix.
    fn type_key(&self) -> String {
        let base = self
            .type_name
            .split('(')
            .next()
            .unwrap_or_default()
            .trim();
        base.to_ascii_lowercase()
    }
}

/// How a numeric native type carries precision and scale.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumericCapability {
    /// Not numeric.
    None,
    /// Precision only.
    Precision {
        /// Precision used when the catalog reports none.
        default: u8,
    },
    /// Independent precision and scale.
    PrecisionScale {
        /// Precision used when the catalog reports none.
        default_precision: u8,
        /// Scale used when the catalog reports none.
        default_scale: u8,
    },
}

/// Canonical mapping of one native type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeMapping {
    /// Canonical DB-kind.
    pub db_kind: DbKind,
    /// Canonical value type.
    pub data_type: DataType,
    /// The provider's own type token (for example `NVarChar`).
    pub owner_type: String,
    /// Numeric capability.
    pub numeric: NumericCapability,
    /// Upper bound on declared length, for sized text and binary types.
    pub max_length: Option<u32>,
}

impl TypeMapping {
    /// Creates a non-numeric, unsized mapping.
    pub fn new(db_kind: DbKind, data_type: DataType, owner_type: &str) -> Self {
        Self {
            db_kind,
            data_type,
            owner_type: owner_type.to_string(),
            numeric: NumericCapability::None,
            max_length: None,
        }
    }

    /// Marks the type numeric with precision only.
    #[must_use]
    pub fn precision(mut self, default: u8) -> Self {
        self.numeric = NumericCapability::Precision { default };
        self
    }

    /// Marks the type numeric with independent precision and scale.
    #[must_use]
    pub fn precision_scale(mut self, default_precision: u8, default_scale: u8) -> Self {
        self.numeric = NumericCapability::PrecisionScale {
            default_precision,
            default_scale,
        };
        self
    }

    /// Bounds the declared length.
    #[must_use]
    pub fn sized(mut self, max_length: u32) -> Self {
        self.max_length = Some(max_length);
        self
    }
}

/// A provider's type vocabulary.
pub trait Metadata: Send + Sync {
    /// Provider name used in error messages and staged errors.
    fn provider_name(&self) -> &str;

    /// Looks up the canonical mapping for a native column, if supported.
    fn type_mapping(&self, column: &NativeColumn) -> Option<TypeMapping>;

    /// Returns true if the column must never be written by sync.
    fn is_read_only(&self, column: &NativeColumn) -> bool {
        column.is_computed || column.is_identity || column.is_generated
    }
}

/// Validates one native column into a canonical column at `ordinal`.
///
/// The type is checked before the name, so an unsupported column with a
/// reserved name reports `UnsupportedType`.
pub fn validate_column(
    metadata: &dyn Metadata,
    table: &str,
    native: &NativeColumn,
    ordinal: usize,
) -> SchemaResult<Column> {
    let mapping = metadata
        .type_mapping(native)
        .ok_or_else(|| SchemaError::UnsupportedType {
            column: native.name.clone(),
            type_name: native.type_name.clone(),
            provider: metadata.provider_name().to_string(),
        })?;

    if is_reserved_column_name(&native.name) {
        return Err(SchemaError::ReservedName {
            column: native.name.clone(),
            provider: metadata.provider_name().to_string(),
        });
    }

    let (db_kind, data_type) = if native.is_unsigned {
        let kind = mapping.db_kind.to_unsigned();
        let data_type = if kind == mapping.db_kind {
            mapping.data_type
        } else {
            DataType::Unsigned
        };
        (kind, data_type)
    } else {
        (mapping.db_kind, mapping.data_type)
    };

    let (precision, scale) = match mapping.numeric {
        NumericCapability::None => (None, None),
        NumericCapability::Precision { default } => {
            (Some(native.precision.unwrap_or(default)), None)
        }
        NumericCapability::PrecisionScale {
            default_precision,
            default_scale,
        } => {
            let precision = native.precision.unwrap_or(default_precision);
            let scale = native.scale.unwrap_or(default_scale).min(precision);
            (Some(precision), Some(scale))
        }
    };

    let max_length = if mapping.numeric == NumericCapability::None {
        match (native.max_length, mapping.max_length) {
            (Some(declared), Some(limit)) => Some(declared.min(limit)),
            (declared, _) => declared,
        }
    } else {
        None
    };

    Ok(Column {
        name: native.name.clone(),
        original_type_name: native.type_name.clone(),
        original_db_type: mapping.owner_type,
        data_type,
        db_kind,
        allow_null: native.allow_null,
        is_unsigned: native.is_unsigned,
        is_unicode: native.is_unicode || db_kind.is_unicode_text(),
        max_length,
        precision,
        scale,
        ordinal,
        read_only: metadata.is_read_only(native),
        table_name: table.to_string(),
    })
}

/// A data-driven type vocabulary.
#[derive(Debug, Clone)]
pub struct TypeTable {
    provider: String,
    mappings: HashMap<String, TypeMapping>,
    identity_is_read_only: bool,
}

impl TypeTable {
    /// Creates an empty vocabulary for `provider`.
    pub fn new(provider: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            mappings: HashMap::new(),
            identity_is_read_only: true,
        }
    }

    /// Registers a mapping for one or more native type names.
    #[must_use]
    pub fn with_mapping(mut self, names: &[&str], mapping: TypeMapping) -> Self {
        for name in names {
            self.mappings
                .insert(name.to_ascii_lowercase(), mapping.clone());
        }
        self
    }

    /// Sets whether identity columns are read-only for this provider.
    #[must_use]
    pub fn with_identity_read_only(mut self, read_only: bool) -> Self {
        self.identity_is_read_only = read_only;
        self
    }

    /// SQLite's affinity-based vocabulary.
    ///
    /// Integer primary keys alias the rowid and stay writable.
    pub fn sqlite() -> Self {
        use DataType as T;
        use DbKind as K;
        Self::new("sqlite")
            .with_identity_read_only(false)
            .with_mapping(
                &["integer", "int", "bigint", "smallint", "mediumint", "tinyint"],
                TypeMapping::new(K::Int64, T::Integer, "Integer").precision(19),
            )
            .with_mapping(
                &["real", "double", "float"],
                TypeMapping::new(K::Double, T::Double, "Real").precision(15),
            )
            .with_mapping(
                &["numeric", "decimal"],
                TypeMapping::new(K::Decimal, T::Decimal, "Real").precision_scale(18, 6),
            )
            .with_mapping(
                &["bit", "boolean", "bool"],
                TypeMapping::new(K::Boolean, T::Boolean, "Integer"),
            )
            .with_mapping(
                &["text", "varchar", "nvarchar", "char", "nchar", "clob"],
                TypeMapping::new(K::String, T::String, "Text"),
            )
            .with_mapping(&["blob"], TypeMapping::new(K::Binary, T::Bytes, "Blob"))
            .with_mapping(
                &["date", "datetime"],
                TypeMapping::new(K::DateTime, T::DateTime, "Text"),
            )
            .with_mapping(&["time"], TypeMapping::new(K::Time, T::Time, "Text"))
            .with_mapping(
                &["uniqueidentifier", "guid"],
                TypeMapping::new(K::Guid, T::Guid, "Blob"),
            )
    }

    /// SQL Server's vocabulary.
    pub fn sql_server() -> Self {
        use DataType as T;
        use DbKind as K;
        Self::new("sqlserver")
            .with_mapping(
                &["bigint"],
                TypeMapping::new(K::Int64, T::Integer, "BigInt").precision(19),
            )
            .with_mapping(&["int"], TypeMapping::new(K::Int32, T::Integer, "Int").precision(10))
            .with_mapping(
                &["smallint"],
                TypeMapping::new(K::Int16, T::Integer, "SmallInt").precision(5),
            )
            .with_mapping(
                &["tinyint"],
                TypeMapping::new(K::Byte, T::Unsigned, "TinyInt").precision(3),
            )
            .with_mapping(&["bit"], TypeMapping::new(K::Boolean, T::Boolean, "Bit"))
            .with_mapping(
                &["decimal", "numeric"],
                TypeMapping::new(K::Decimal, T::Decimal, "Decimal").precision_scale(18, 0),
            )
            .with_mapping(
                &["money"],
                TypeMapping::new(K::Currency, T::Decimal, "Money").precision_scale(19, 4),
            )
            .with_mapping(
                &["smallmoney"],
                TypeMapping::new(K::Currency, T::Decimal, "SmallMoney").precision_scale(10, 4),
            )
            .with_mapping(
                &["float"],
                TypeMapping::new(K::Double, T::Double, "Float").precision(53),
            )
            .with_mapping(&["real"], TypeMapping::new(K::Single, T::Double, "Real").precision(24))
            .with_mapping(
                &["nvarchar"],
                TypeMapping::new(K::String, T::String, "NVarChar").sized(4000),
            )
            .with_mapping(
                &["varchar"],
                TypeMapping::new(K::AnsiString, T::String, "VarChar").sized(8000),
            )
            .with_mapping(
                &["nchar"],
                TypeMapping::new(K::StringFixed, T::String, "NChar").sized(4000),
            )
            .with_mapping(
                &["char"],
                TypeMapping::new(K::AnsiStringFixed, T::String, "Char").sized(8000),
            )
            .with_mapping(&["ntext"], TypeMapping::new(K::String, T::String, "NText"))
            .with_mapping(&["text"], TypeMapping::new(K::AnsiString, T::String, "Text"))
            .with_mapping(
                &["varbinary", "binary"],
                TypeMapping::new(K::Binary, T::Bytes, "VarBinary").sized(8000),
            )
            .with_mapping(&["image"], TypeMapping::new(K::Binary, T::Bytes, "Image"))
            .with_mapping(
                &["uniqueidentifier"],
                TypeMapping::new(K::Guid, T::Guid, "UniqueIdentifier"),
            )
            .with_mapping(&["date"], TypeMapping::new(K::Date, T::DateTime, "Date"))
            .with_mapping(
                &["datetime", "datetime2", "smalldatetime"],
                TypeMapping::new(K::DateTime, T::DateTime, "DateTime"),
            )
            .with_mapping(
                &["datetimeoffset"],
                TypeMapping::new(K::DateTimeOffset, T::DateTime, "DateTimeOffset"),
            )
            .with_mapping(&["time"], TypeMapping::new(K::Time, T::Time, "Time"))
    }
}

impl Metadata for TypeTable {
    fn provider_name(&self) -> &str {
        &self.provider
    }

    fn type_mapping(&self, column: &NativeColumn) -> Option<TypeMapping> {
        self.mappings.get(&column.type_key()).cloned()
    }

    fn is_read_only(&self, column: &NativeColumn) -> bool {
        column.is_computed || column.is_generated || (self.identity_is_read_only && column.is_identity)
    }
}
