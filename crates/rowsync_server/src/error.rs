//! Error types for the sync server.

use rowsync_engine::SyncError;
use rowsync_protocol::{CodecError, ErrorEnvelope, SerializationFormat};
use thiserror::Error;
use uuid::Uuid;

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

/// Errors that can occur in the sync server.
#[derive(Error, Debug)]
pub enum ServerError {
    /// Invalid request.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The request names a session the server does not know.
    #[error("unknown session {0}")]
    UnknownSession(Uuid),

    /// A session switched wire formats.
    #[error("session speaks {expected}, request was {actual}")]
    FormatMismatch {
        /// Format the session started with.
        expected: SerializationFormat,
        /// Format of the offending request.
        actual: SerializationFormat,
    },

    /// The content type maps to no serialization format.
    #[error("unsupported content type: {0}")]
    UnsupportedContentType(String),

    /// The session table is full.
    #[error("too many concurrent sessions (limit {0})")]
    TooManySessions(usize),

    /// Engine error raised while serving a stage.
    #[error(transparent)]
    Sync(#[from] SyncError),

    /// Request or response could not be (de)serialized.
    #[error(transparent)]
    Codec(#[from] CodecError),
}

impl ServerError {
    /// Returns true if the client caused the error.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            ServerError::InvalidRequest(_)
                | ServerError::UnknownSession(_)
                | ServerError::FormatMismatch { .. }
                | ServerError::UnsupportedContentType(_)
                | ServerError::Codec(_)
        )
    }

    /// Returns the categorical name carried across process boundaries.
    pub fn type_name(&self) -> &'static str {
        match self {
            ServerError::Sync(e) => e.root().type_name(),
            ServerError::Codec(_) => "CodecError",
            ServerError::TooManySessions(_) => "ServerBusyError",
            ServerError::InvalidRequest(_)
            | ServerError::UnknownSession(_)
            | ServerError::FormatMismatch { .. }
            | ServerError::UnsupportedContentType(_) => "ProtocolError",
        }
    }

    /// Reduces the error to its transport-safe form.
    pub fn to_envelope(&self) -> ErrorEnvelope {
        match self {
            ServerError::Sync(e) => e.to_envelope(),
            other => ErrorEnvelope::new(other.type_name(), other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rowsync_protocol::SyncStage;

    #[test]
    fn error_classification() {
        assert!(ServerError::InvalidRequest("bad".into()).is_client_error());
        assert!(ServerError::UnknownSession(Uuid::nil()).is_client_error());
        assert!(!ServerError::TooManySessions(4).is_client_error());
    }

    #[test]
    fn envelopes_use_the_root_error() {
        let err = ServerError::from(
            SyncError::MissingConfiguration("no tables".into())
                .staged(SyncStage::ConfigurationApplying, "sqlite"),
        );
        let envelope = err.to_envelope();
        assert_eq!(envelope.type_name, "MissingConfigurationError");
        assert!(envelope.message.contains("no tables"));

        let envelope = ServerError::FormatMismatch {
            expected: SerializationFormat::Json,
            actual: SerializationFormat::Binary,
        }
        .to_envelope();
        assert_eq!(envelope.type_name, "ProtocolError");
        assert!(envelope.message.contains("json"));
    }
}
