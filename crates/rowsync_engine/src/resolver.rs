//! Conflict detection and resolution.

use crate::store::RowWrite;
use rowsync_protocol::{
    ChangeRecord, Conflict, ConflictOutcome, ConflictPolicy, ConflictType, ResolutionDecision,
    SyncRole, Watermark,
};
use std::fmt;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

/// Caller-supplied conflict decision.
///
/// Invoked once per detected conflict before anything is written. Returning
/// `None` falls back to [`ResolutionDecision::ServerWins`].
pub type ConflictHandler = Arc<dyn Fn(&Conflict) -> Option<ResolutionDecision> + Send + Sync>;

/// What the applying peer knows about the remote side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Observation {
    /// Local changes at or below this watermark were already seen by the
    /// remote side.
    pub last_observed: Watermark,
    /// The scope the incoming changes come from.
    pub remote_scope: Uuid,
    /// Role of the applying peer.
    pub role: SyncRole,
}

/// The outcome of resolving one incoming change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    /// Write to perform, if any.
    pub write: Option<RowWrite>,
    /// The detected conflict and how it ended.
    pub conflict: Option<(Conflict, ConflictOutcome)>,
}

impl Resolution {
    /// Returns true if a conflict was detected.
    pub fn is_conflict(&self) -> bool {
        self.conflict.is_some()
    }
}

/// Decides what happens to each incoming change.
#[derive(Clone, Default)]
pub struct ConflictResolver {
    policy: ConflictPolicy,
    handler: Option<ConflictHandler>,
}

impl fmt::Debug for ConflictResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConflictResolver")
            .field("policy", &self.policy)
            .field("handler", &self.handler.is_some())
            .finish()
    }
}

impl ConflictResolver {
    /// Creates a resolver applying `policy`.
    pub fn new(policy: ConflictPolicy) -> Self {
        Self {
            policy,
            handler: None,
        }
    }

    /// Routes every conflict through `handler`.
    ///
    /// With a handler installed the policy is no longer consulted.
    #[must_use]
    pub fn with_handler(mut self, handler: Option<ConflictHandler>) -> Self {
        self.handler = handler;
        self
    }

    /// Returns true if `local` changed after the remote side last observed it.
    pub fn detects(local: Option<&ChangeRecord>, observation: &Observation) -> bool {
        local.map_or(false, |local| {
            local.watermark > observation.last_observed
                && local.origin != Some(observation.remote_scope)
        })
    }

    /// Resolves one incoming change against the local row.
    pub fn resolve(
        &self,
        table: &str,
        local: Option<&ChangeRecord>,
        remote: &ChangeRecord,
        observation: &Observation,
    ) -> Resolution {
        let apply_remote = Some(remote_write(remote, observation.remote_scope));
        let Some(local) = local.filter(|_| Self::detects(local, observation)) else {
            return Resolution {
                write: apply_remote,
                conflict: None,
            };
        };

        let conflict = Conflict::new(table, observation.role, local.clone(), remote.clone());
        if conflict.conflict_type == ConflictType::DeleteDelete {
            debug!(table = %table, key = ?remote.key, "row already deleted on both sides");
            return Resolution {
                write: None,
                conflict: Some((conflict, ConflictOutcome::AlreadyDeleted)),
            };
        }

        let decision = match &self.handler {
            Some(handler) => handler(&conflict).unwrap_or(ResolutionDecision::ServerWins),
            None => match self.policy {
                ConflictPolicy::ServerWins => ResolutionDecision::ServerWins,
                ConflictPolicy::ClientWins => ResolutionDecision::ClientWins,
            },
        };

        let (write, outcome) = match (decision, observation.role) {
            (ResolutionDecision::Merge(values), _) => (
                Some(RowWrite::Upsert {
                    values,
                    origin: None,
                }),
                ConflictOutcome::Merged,
            ),
            (ResolutionDecision::ServerWins, SyncRole::Server)
            | (ResolutionDecision::ClientWins, SyncRole::Client) => {
                (None, ConflictOutcome::KeptLocal)
            }
            (ResolutionDecision::ServerWins, SyncRole::Client)
            | (ResolutionDecision::ClientWins, SyncRole::Server) => {
                (apply_remote, ConflictOutcome::KeptRemote)
            }
        };

        debug!(
            table = %table,
            key = ?remote.key,
            conflict = ?conflict.conflict_type,
            outcome = ?outcome,
            "conflict resolved"
        );
        Resolution {
            write,
            conflict: Some((conflict, outcome)),
        }
    }
}

fn remote_write(remote: &ChangeRecord, origin: Uuid) -> RowWrite {
    if remote.is_tombstone() {
        RowWrite::Delete {
            key: remote.key.clone(),
            origin: Some(origin),
        }
    } else {
        RowWrite::Upsert {
            values: remote.values.clone(),
            origin: Some(origin),
        }
    }
}
