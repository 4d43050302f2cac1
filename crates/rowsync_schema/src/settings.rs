//! Session-wide settings carried by the schema model.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Wire encoding negotiated for a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SerializationFormat {
    /// Plain-text structured form (JSON).
    #[default]
    Json,
    /// Compact binary form (CBOR).
    Binary,
}

impl SerializationFormat {
    /// Returns the MIME content type used on the wire.
    pub fn content_type(&self) -> &'static str {
        match self {
            SerializationFormat::Json => "application/json",
            SerializationFormat::Binary => "application/cbor",
        }
    }

    /// Resolves a format from a content type, ignoring parameters and case.
    pub fn from_content_type(content_type: &str) -> Option<Self> {
        let essence = content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        match essence.as_str() {
            "application/json" => Some(SerializationFormat::Json),
            "application/cbor" => Some(SerializationFormat::Binary),
            _ => None,
        }
    }
}

impl fmt::Display for SerializationFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SerializationFormat::Json => write!(f, "json"),
            SerializationFormat::Binary => write!(f, "binary"),
        }
    }
}

/// Policy applied when both peers modified the same row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictPolicy {
    /// The server's row value is kept.
    #[default]
    ServerWins,
    /// The client's row value overwrites the server's.
    ClientWins,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_type_negotiation() {
        assert_eq!(
            SerializationFormat::from_content_type("application/json; charset=utf-8"),
            Some(SerializationFormat::Json)
        );
        assert_eq!(
            SerializationFormat::from_content_type("Application/CBOR"),
            Some(SerializationFormat::Binary)
        );
        assert_eq!(SerializationFormat::from_content_type("text/plain"), None);
    }

    #[test]
    fn defaults() {
        assert_eq!(ConflictPolicy::default(), ConflictPolicy::ServerWins);
        assert_eq!(SerializationFormat::default(), SerializationFormat::Json);
    }
}
