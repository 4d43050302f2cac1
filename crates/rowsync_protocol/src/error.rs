//! Codec errors.

use rowsync_schema::SerializationFormat;
use thiserror::Error;

/// Result type for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;

/// Errors raised while encoding or decoding protocol messages.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// Encoding failed.
    #[error("{format} encoding failed: {message}")]
    EncodingFailed {
        /// Format in use.
        format: SerializationFormat,
        /// Underlying error.
        message: String,
    },

    /// Decoding failed.
    #[error("{format} decoding failed: {message}")]
    DecodingFailed {
        /// Format in use.
        format: SerializationFormat,
        /// Underlying error.
        message: String,
    },
}

impl CodecError {
    /// Creates an encoding error.
    pub fn encoding_failed(format: SerializationFormat, message: impl ToString) -> Self {
        Self::EncodingFailed {
            format,
            message: message.to_string(),
        }
    }

    /// Creates a decoding error.
    pub fn decoding_failed(format: SerializationFormat, message: impl ToString) -> Self {
        Self::DecodingFailed {
            format,
            message: message.to_string(),
        }
    }
}
