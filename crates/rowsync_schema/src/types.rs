//! Canonical type vocabulary shared by every provider.

use serde::{Deserialize, Serialize};

/// The canonical value type a column holds once it leaves its provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataType {
    /// True/false.
    Boolean,
    /// Signed integer up to 64 bits.
    Integer,
    /// Unsigned integer up to 64 bits.
    Unsigned,
    /// Floating point.
    Double,
    /// Fixed point decimal, carried as text on the wire.
    Decimal,
    /// Text.
    String,
    /// Raw bytes.
    Bytes,
    /// 128-bit identifier.
    Guid,
    /// Date or date and time, carried as ISO-8601 text.
    DateTime,
    /// Time of day, carried as ISO-8601 text.
    Time,
}

/// The canonical database kind of a column, independent of engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[allow(missing_docs)]
pub enum DbKind {
    Boolean,
    Byte,
    Int16,
    Int32,
    Int64,
    UInt16,
    UInt32,
    UInt64,
    Single,
    Double,
    Decimal,
    Currency,
    String,
    AnsiString,
    StringFixed,
    AnsiStringFixed,
    Binary,
    Guid,
    Date,
    DateTime,
    DateTimeOffset,
    Time,
}

impl DbKind {
    /// Returns true for kinds whose text is stored as unicode.
    pub fn is_unicode_text(&self) -> bool {
        matches!(self, DbKind::String | DbKind::StringFixed)
    }

    /// Returns true for numeric kinds.
    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            DbKind::Byte
                | DbKind::Int16
                | DbKind::Int32
                | DbKind::Int64
                | DbKind::UInt16
                | DbKind::UInt32
                | DbKind::UInt64
                | DbKind::Single
                | DbKind::Double
                | DbKind::Decimal
                | DbKind::Currency
        )
    }

    /// Maps a signed integer kind to its unsigned counterpart.
    ///
    /// Non-integer kinds are returned unchanged.
    pub fn to_unsigned(self) -> Self {
        match self {
            DbKind::Int16 => DbKind::UInt16,
            DbKind::Int32 => DbKind::UInt32,
            DbKind::Int64 => DbKind::UInt64,
            other => other,
        }
    }
}
