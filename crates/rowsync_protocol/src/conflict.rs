//! Conflict detection results and resolution decisions.

use crate::change::ChangeRecord;
use crate::value::Value;
use serde::{Deserialize, Serialize};

/// Which side of the session this peer plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SyncRole {
    /// The arbitrating peer.
    Server,
    /// The peer that drives the session.
    Client,
}

/// Cause of a conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConflictType {
    /// Both sides created the same row identity.
    InsertInsert,
    /// Both sides updated the row.
    UpdateUpdate,
    /// One side updated the row, the other deleted it.
    UpdateDelete,
    /// Both sides deleted the row.
    DeleteDelete,
}

impl ConflictType {
    /// Classifies a conflict from the two competing records.
    pub fn classify(local: &ChangeRecord, remote: &ChangeRecord) -> Self {
        use crate::change::RowKind::{Delete, Insert};
        match (local.kind, remote.kind) {
            (Delete, Delete) => ConflictType::DeleteDelete,
            (Delete, _) | (_, Delete) => ConflictType::UpdateDelete,
            (Insert, Insert) => ConflictType::InsertInsert,
            _ => ConflictType::UpdateUpdate,
        }
    }
}

/// Two competing changes to the same row identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conflict {
    /// Table name.
    pub table: String,
    /// Cause.
    pub conflict_type: ConflictType,
    /// Role of the peer that detected the conflict.
    pub detected_by: SyncRole,
    /// The row as this peer holds it.
    pub local: ChangeRecord,
    /// The incoming change.
    pub remote: ChangeRecord,
}

impl Conflict {
    /// Creates a conflict, classifying its cause.
    pub fn new(
        table: impl Into<String>,
        detected_by: SyncRole,
        local: ChangeRecord,
        remote: ChangeRecord,
    ) -> Self {
        Self {
            table: table.into(),
            conflict_type: ConflictType::classify(&local, &remote),
            detected_by,
            local,
            remote,
        }
    }

    /// The server's side of the conflict.
    pub fn server_change(&self) -> &ChangeRecord {
        match self.detected_by {
            SyncRole::Server => &self.local,
            SyncRole::Client => &self.remote,
        }
    }

    /// The client's side of the conflict.
    pub fn client_change(&self) -> &ChangeRecord {
        match self.detected_by {
            SyncRole::Server => &self.remote,
            SyncRole::Client => &self.local,
        }
    }
}

/// A conflict handler's answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResolutionDecision {
    /// Keep the server's row.
    ServerWins,
    /// Keep the client's row.
    ClientWins,
    /// Write this row instead of either side; values in ordinal order.
    Merge(Vec<Value>),
}

/// What the resolver did with a conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConflictOutcome {
    /// The local row stands; the remote change was discarded.
    KeptLocal,
    /// The remote change was applied.
    KeptRemote,
    /// A merged row was written.
    Merged,
    /// Both sides deleted the row; nothing was written.
    AlreadyDeleted,
}
