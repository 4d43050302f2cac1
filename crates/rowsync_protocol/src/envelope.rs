//! Transport-safe error payload.

use serde::{Deserialize, Serialize};
use std::fmt;

/// An error reduced to what may cross a process boundary: its categorical
/// type name and its message. Never a stack trace, never internal state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    /// Categorical error name, for example `MissingPrimaryKeyError`.
    pub type_name: String,
    /// Human-readable message.
    pub message: String,
}

impl ErrorEnvelope {
    /// Creates an envelope.
    pub fn new(type_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ErrorEnvelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.type_name, self.message)
    }
}

impl std::error::Error for ErrorEnvelope {}
