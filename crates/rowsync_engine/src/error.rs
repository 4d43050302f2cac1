//! Error types for the sync engine.

use crate::store::StoreError;
use rowsync_protocol::{CodecError, ErrorEnvelope, SyncStage};
use rowsync_schema::SchemaError;
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur during sync operations.
#[derive(Error, Debug)]
pub enum SyncError {
    /// Schema validation failed.
    #[error(transparent)]
    Schema(#[from] SchemaError),

    /// The datastore failed.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// A message could not be encoded or decoded.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// Neither a cached nor a provided configuration exists.
    #[error("missing configuration: {0}")]
    MissingConfiguration(String),

    /// Sync options are invalid.
    #[error("invalid options: {0}")]
    InvalidOptions(String),

    /// Network or transport failure on this side of the boundary.
    #[error("transport error: {message}")]
    Transport {
        /// Error message.
        message: String,
        /// Whether the operation can be retried.
        retryable: bool,
    },

    /// The remote peer reported an error.
    #[error("transport error: {0}")]
    Remote(ErrorEnvelope),

    /// Not connected.
    #[error("not connected to server")]
    NotConnected,

    /// A peer broke the session protocol.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Sync was cancelled.
    #[error("sync cancelled")]
    Cancelled,

    /// Invalid state transition.
    #[error("invalid state transition from {from} to {to}")]
    InvalidStateTransition {
        /// Current state.
        from: SyncStage,
        /// Attempted target state.
        to: SyncStage,
    },

    /// I/O error, typically while spooling batches.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// An error that escaped a session stage.
    #[error("sync failed during {stage} on {provider}: {source}")]
    Staged {
        /// Stage at which the session failed.
        stage: SyncStage,
        /// Provider that raised the error.
        provider: String,
        /// Underlying cause.
        source: Box<SyncError>,
    },
}

impl SyncError {
    /// Creates a retryable transport error.
    pub fn transport_retryable(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: true,
        }
    }

    /// Creates a non-retryable transport error.
    pub fn transport_fatal(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: false,
        }
    }

    /// Creates a protocol error.
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol(message.into())
    }

    /// Wraps the error with stage context.
    ///
    /// An error that is already staged keeps its original stage.
    pub fn staged(self, stage: SyncStage, provider: impl Into<String>) -> Self {
        match self {
            staged @ SyncError::Staged { .. } => staged,
            other => SyncError::Staged {
                stage,
                provider: provider.into(),
                source: Box::new(other),
            },
        }
    }

    /// The stage this error was raised in, if staged.
    pub fn stage(&self) -> Option<SyncStage> {
        match self {
            SyncError::Staged { stage, .. } => Some(*stage),
            _ => None,
        }
    }

    /// The innermost error, below any stage wrapping.
    pub fn root(&self) -> &SyncError {
        match self {
            SyncError::Staged { source, .. } => source.root(),
            other => other,
        }
    }

    /// Returns the categorical name carried across process boundaries.
    pub fn type_name(&self) -> &'static str {
        match self {
            SyncError::Schema(e) => e.type_name(),
            SyncError::Store(_) => "StoreError",
            SyncError::Codec(_) => "CodecError",
            SyncError::MissingConfiguration(_) => "MissingConfigurationError",
            SyncError::InvalidOptions(_) => "ConfigurationError",
            SyncError::Transport { .. } | SyncError::Remote(_) | SyncError::NotConnected => {
                "TransportError"
            }
            SyncError::Protocol(_) => "ProtocolError",
            SyncError::Cancelled => "CancelledError",
            SyncError::InvalidStateTransition { .. } => "InvalidStateError",
            SyncError::Io(_) => "IoError",
            SyncError::Staged { .. } => "SyncError",
        }
    }

    /// The categorical name the remote peer reported, for remote errors.
    pub fn remote_type_name(&self) -> Option<&str> {
        match self.root() {
            SyncError::Remote(envelope) => Some(&envelope.type_name),
            _ => None,
        }
    }

    /// Reduces the error to its transport-safe form.
    pub fn to_envelope(&self) -> ErrorEnvelope {
        let root = self.root();
        ErrorEnvelope::new(root.type_name(), root.to_string())
    }

    /// Returns true if this error can be retried.
    pub fn is_retryable(&self) -> bool {
        match self.root() {
            SyncError::Transport { retryable, .. } => *retryable,
            SyncError::NotConnected => true,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_errors() {
        assert!(SyncError::transport_retryable("connection lost").is_retryable());
        assert!(!SyncError::transport_fatal("invalid certificate").is_retryable());
        assert!(SyncError::NotConnected.is_retryable());
        assert!(!SyncError::Cancelled.is_retryable());
        assert!(SyncError::transport_retryable("reset")
            .staged(SyncStage::ChangesApplying, "sqlite")
            .is_retryable());
    }

    #[test]
    fn staging_keeps_the_first_stage() {
        let err = SyncError::MissingConfiguration("none".into())
            .staged(SyncStage::ConfigurationApplying, "sqlite")
            .staged(SyncStage::ChangesApplying, "sqlite");
        assert_eq!(err.stage(), Some(SyncStage::ConfigurationApplying));
        assert_eq!(err.type_name(), "SyncError");
        assert_eq!(err.root().type_name(), "MissingConfigurationError");
        assert!(err.to_string().contains("configuration-applying"));
    }

    #[test]
    fn envelope_carries_the_root_category() {
        let err = SyncError::from(SchemaError::empty_table("Tag", "no columns"))
            .staged(SyncStage::ConfigurationApplying, "sqlserver");
        let envelope = err.to_envelope();
        assert_eq!(envelope.type_name, "EmptyTableError");
        assert!(envelope.message.contains("Tag"));
        assert!(!envelope.message.contains("sqlserver"));
    }

    #[test]
    fn remote_errors_keep_the_original_name() {
        let err = SyncError::Remote(ErrorEnvelope::new("ReservedNameError", "column x"));
        assert_eq!(err.type_name(), "TransportError");
        assert_eq!(err.remote_type_name(), Some("ReservedNameError"));
    }
}
