//! Session stages.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A stage of a synchronization session.
///
/// Stages run strictly in declaration order, from `ScopeLoading` to
/// `Completed`; any stage may end in `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SyncStage {
    /// No session is running.
    None,
    /// Loading or creating scopes on both peers.
    ScopeLoading,
    /// Fetching, validating and caching the configuration.
    ConfigurationApplying,
    /// Local tables verified against the configuration.
    SchemaEnsured,
    /// Selecting changes since the last watermark.
    ChangesSelecting,
    /// Transporting and applying changes.
    ChangesApplying,
    /// Persisting the new watermarks.
    ScopeWriting,
    /// The session succeeded.
    Completed,
    /// The session failed.
    Failed,
}

impl SyncStage {
    /// The stage that must follow this one on success.
    pub fn next(&self) -> Option<SyncStage> {
        match self {
            SyncStage::None => Some(SyncStage::ScopeLoading),
            SyncStage::ScopeLoading => Some(SyncStage::ConfigurationApplying),
            SyncStage::ConfigurationApplying => Some(SyncStage::SchemaEnsured),
            SyncStage::SchemaEnsured => Some(SyncStage::ChangesSelecting),
            SyncStage::ChangesSelecting => Some(SyncStage::ChangesApplying),
            SyncStage::ChangesApplying => Some(SyncStage::ScopeWriting),
            SyncStage::ScopeWriting => Some(SyncStage::Completed),
            SyncStage::Completed | SyncStage::Failed => None,
        }
    }

    /// Returns true while a session is in flight.
    pub fn is_active(&self) -> bool {
        !matches!(
            self,
            SyncStage::None | SyncStage::Completed | SyncStage::Failed
        )
    }

    /// Returns true if a new session may start.
    pub fn can_start_sync(&self) -> bool {
        !self.is_active()
    }
}

impl fmt::Display for SyncStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SyncStage::None => "none",
            SyncStage::ScopeLoading => "scope-loading",
            SyncStage::ConfigurationApplying => "configuration-applying",
            SyncStage::SchemaEnsured => "schema-ensured",
            SyncStage::ChangesSelecting => "changes-selecting",
            SyncStage::ChangesApplying => "changes-applying",
            SyncStage::ScopeWriting => "scope-writing",
            SyncStage::Completed => "completed",
            SyncStage::Failed => "failed",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stages_run_in_order() {
        let mut stage = SyncStage::None;
        let mut seen = vec![stage];
        while let Some(next) = stage.next() {
            seen.push(next);
            stage = next;
        }
        assert_eq!(seen.len(), 8);
        assert_eq!(stage, SyncStage::Completed);
        assert_eq!(SyncStage::Failed.next(), None);
    }

    #[test]
    fn activity() {
        assert!(SyncStage::None.can_start_sync());
        assert!(SyncStage::Failed.can_start_sync());
        assert!(SyncStage::ChangesApplying.is_active());
        assert!(!SyncStage::ScopeWriting.can_start_sync());
        assert_eq!(
            SyncStage::ConfigurationApplying.to_string(),
            "configuration-applying"
        );
    }
}
