//! Session request and response envelopes.

use crate::change::Batch;
use crate::envelope::ErrorEnvelope;
use crate::scope::{ScopeInfo, Watermark};
use crate::stage::SyncStage;
use rowsync_schema::SyncSchema;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Session state carried by every request and response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncContext {
    /// Session identifier, fresh for every session.
    pub session_id: Uuid,
    /// The client's scope identifier.
    pub scope_id: Uuid,
    /// Scope name.
    pub scope_name: String,
    /// Stage tag of the message.
    pub stage: SyncStage,
    /// Changes uploaded so far.
    pub total_changes_uploaded: u64,
    /// Changes downloaded so far.
    pub total_changes_downloaded: u64,
    /// Conflicts detected so far.
    pub total_sync_conflicts: u64,
}

impl SyncContext {
    /// Creates the context of a new session.
    pub fn new(scope_id: Uuid, scope_name: impl Into<String>) -> Self {
        Self {
            session_id: Uuid::new_v4(),
            scope_id,
            scope_name: scope_name.into(),
            stage: SyncStage::None,
            total_changes_uploaded: 0,
            total_changes_downloaded: 0,
            total_sync_conflicts: 0,
        }
    }
}

/// What a client asks the server for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RequestPayload {
    /// Load or create the scope records on the server.
    EnsureScopes,
    /// Fetch the server's configuration.
    GetConfiguration,
    /// Apply one uploaded batch.
    ApplyChanges {
        /// The batch.
        batch: Batch,
    },
    /// Fetch one download batch; index 0 makes the server select.
    GetChanges {
        /// Batch index.
        index: usize,
    },
    /// Commit the server-side watermark for this client.
    WriteScopes,
}

impl RequestPayload {
    /// The stage tag this payload travels under.
    pub fn stage(&self) -> SyncStage {
        match self {
            RequestPayload::EnsureScopes => SyncStage::ScopeLoading,
            RequestPayload::GetConfiguration => SyncStage::ConfigurationApplying,
            RequestPayload::ApplyChanges { .. } => SyncStage::ChangesApplying,
            RequestPayload::GetChanges { .. } => SyncStage::ChangesSelecting,
            RequestPayload::WriteScopes => SyncStage::ScopeWriting,
        }
    }
}

/// A stage-tagged request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncRequest {
    /// Session context; `stage` matches the payload.
    pub context: SyncContext,
    /// Request body.
    pub payload: RequestPayload,
}

impl SyncRequest {
    /// Creates a request, tagging the context with the payload's stage.
    pub fn new(mut context: SyncContext, payload: RequestPayload) -> Self {
        context.stage = payload.stage();
        Self { context, payload }
    }
}

/// What the server answers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResponsePayload {
    /// The server's own scope.
    Scopes {
        /// Server scope.
        server_scope: ScopeInfo,
    },
    /// The server's validated configuration.
    Configuration(SyncSchema),
    /// One uploaded batch was applied.
    ChangesApplied {
        /// Records written.
        applied: u64,
        /// Conflicts detected in this batch.
        conflicts: u64,
    },
    /// One download batch.
    Changes {
        /// The batch, absent when there is nothing to download.
        batch: Option<Batch>,
        /// Number of batches in the download set.
        batch_count: usize,
        /// Server watermark the selection ran up to.
        server_watermark: Watermark,
    },
    /// Server scopes were written.
    ScopesWritten {
        /// Watermark recorded for this client.
        server_watermark: Watermark,
    },
    /// The request failed.
    Error(ErrorEnvelope),
}

/// A stage-tagged response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncResponse {
    /// Updated session context, counters included.
    pub context: SyncContext,
    /// Response body.
    pub payload: ResponsePayload,
}

impl SyncResponse {
    /// Creates a response.
    pub fn new(context: SyncContext, payload: ResponsePayload) -> Self {
        Self { context, payload }
    }

    /// Creates an error response.
    pub fn error(context: SyncContext, envelope: ErrorEnvelope) -> Self {
        Self {
            context,
            payload: ResponsePayload::Error(envelope),
        }
    }

    /// Returns the envelope if this is an error response.
    pub fn as_error(&self) -> Option<&ErrorEnvelope> {
        match &self.payload {
            ResponsePayload::Error(envelope) => Some(envelope),
            _ => None,
        }
    }
}
