//! Scopes and watermarks.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// A logical timestamp from a store's change counter.
///
/// Every tracked write takes the next value, so watermarks are strictly
/// increasing within one store. They are never compared across stores.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Watermark(pub u64);

impl Watermark {
    /// The watermark before any write.
    pub const ZERO: Watermark = Watermark(0);

    /// Returns the next watermark.
    #[must_use]
    pub fn next(self) -> Self {
        Watermark(self.0 + 1)
    }
}

impl fmt::Display for Watermark {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{}", self.0)
    }
}

/// A synchronization relationship as one peer records it.
///
/// A client keeps one local scope per scope name. A server keeps its own
/// local scope plus one remote record per client, keyed by the client's id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScopeInfo {
    /// Scope identifier. For remote records, the client's scope id.
    pub id: Uuid,
    /// Scope name.
    pub name: String,
    /// True if this peer owns the scope.
    pub is_local: bool,
    /// This store's watermark at the end of the last successful session.
    pub last_sync: Option<Watermark>,
    /// The other peer's watermark at the end of the last successful session.
    pub last_remote_sync: Option<Watermark>,
}

impl ScopeInfo {
    /// Creates a fresh local scope with a new identifier.
    pub fn new_local(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            is_local: true,
            last_sync: None,
            last_remote_sync: None,
        }
    }

    /// Creates a fresh remote record for a peer.
    pub fn new_remote(id: Uuid, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            is_local: false,
            last_sync: None,
            last_remote_sync: None,
        }
    }

    /// Returns true if no session has completed for this scope yet.
    pub fn is_new(&self) -> bool {
        self.last_sync.is_none()
    }

    /// The watermark changes are selected from.
    pub fn since(&self) -> Watermark {
        self.last_sync.unwrap_or(Watermark::ZERO)
    }
}
