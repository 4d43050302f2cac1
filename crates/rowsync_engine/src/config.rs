//! Sync options.

use crate::error::{SyncError, SyncResult};
use rowsync_schema::{
    ConflictPolicy, SerializationFormat, SyncSchema, DEFAULT_BATCH_SIZE,
    DEFAULT_IN_MEMORY_BATCHES,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The named option set a peer synchronizes with.
///
/// Options are loaded once per session and never change during it; the
/// agent works on its own copy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncOptions {
    /// Scope name.
    pub scope_name: String,
    /// Tables to synchronize, in declaration order.
    pub tables: Vec<String>,
    /// Wire encoding.
    pub serialization_format: SerializationFormat,
    /// Conflict resolution policy.
    pub conflict_policy: ConflictPolicy,
    /// Directory for spooled batches. `None` keeps batches in memory.
    pub batch_directory: Option<PathBuf>,
    /// Maximum change records per batch.
    pub batch_size: usize,
    /// Batches kept in memory before spooling.
    pub in_memory_batches: usize,
}

impl SyncOptions {
    /// Creates options for the given tables.
    pub fn new<I, S>(tables: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            tables: tables.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// Parses options from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> SyncResult<Self> {
        let options: SyncOptions =
            serde_json::from_str(json).map_err(|e| SyncError::InvalidOptions(e.to_string()))?;
        options.validate()?;
        Ok(options)
    }

    /// Sets the scope name.
    pub fn with_scope_name(mut self, name: impl Into<String>) -> Self {
        self.scope_name = name.into();
        self
    }

    /// Sets the serialization format.
    pub fn with_serialization_format(mut self, format: SerializationFormat) -> Self {
        self.serialization_format = format;
        self
    }

    /// Sets the conflict policy.
    pub fn with_conflict_policy(mut self, policy: ConflictPolicy) -> Self {
        self.conflict_policy = policy;
        self
    }

    /// Sets the batch directory.
    pub fn with_batch_directory(mut self, directory: impl AsRef<Path>) -> Self {
        self.batch_directory = Some(directory.as_ref().to_path_buf());
        self
    }

    /// Sets the batch size.
    pub fn with_batch_size(mut self, size: usize) -> Self {
        self.batch_size = size;
        self
    }

    /// Sets how many batches stay in memory before spooling.
    pub fn with_in_memory_batches(mut self, count: usize) -> Self {
        self.in_memory_batches = count;
        self
    }

    /// Checks the options for values no session can run with.
    pub fn validate(&self) -> SyncResult<()> {
        if self.scope_name.trim().is_empty() {
            return Err(SyncError::InvalidOptions("scope name is empty".into()));
        }
        if self.batch_size == 0 {
            return Err(SyncError::InvalidOptions("batch size must be positive".into()));
        }
        Ok(())
    }

    /// Builds a schema skeleton naming the tables, carrying these settings.
    pub fn to_schema(&self) -> SyncResult<SyncSchema> {
        self.validate()?;
        let mut schema = SyncSchema::with_tables(self.tables.iter().cloned())?;
        schema.conflict_policy = self.conflict_policy;
        self.apply_local_settings(&mut schema);
        Ok(schema)
    }

    /// Overrides the settings that only concern this peer.
    ///
    /// The conflict policy belongs to the server and is left alone.
    pub fn apply_local_settings(&self, schema: &mut SyncSchema) {
        schema.serialization_format = self.serialization_format;
        schema.batch_directory = self.batch_directory.clone();
        schema.batch_size = self.batch_size;
        schema.in_memory_batches = self.in_memory_batches;
    }
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            scope_name: "DefaultScope".into(),
            tables: Vec::new(),
            serialization_format: SerializationFormat::default(),
            conflict_policy: ConflictPolicy::default(),
            batch_directory: None,
            batch_size: DEFAULT_BATCH_SIZE,
            in_memory_batches: DEFAULT_IN_MEMORY_BATCHES,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sync_options_builder() {
        let options = SyncOptions::new(["Customer", "SalesOrder"])
            .with_scope_name("Sales")
            .with_batch_size(50)
            .with_conflict_policy(ConflictPolicy::ClientWins)
            .with_batch_directory("/tmp/rowsync");

        assert_eq!(options.tables, vec!["Customer", "SalesOrder"]);
        assert_eq!(options.scope_name, "Sales");
        assert_eq!(options.batch_size, 50);
        assert_eq!(options.conflict_policy, ConflictPolicy::ClientWins);
        assert_eq!(options.batch_directory, Some(PathBuf::from("/tmp/rowsync")));
    }

    #[test]
    fn options_from_json() {
        let options = SyncOptions::from_json(
            r#"{
                "tables": ["ServiceTickets"],
                "serialization_format": "binary",
                "conflict_policy": "client_wins",
                "batch_size": 10
            }"#,
        )
        .unwrap();
        assert_eq!(options.serialization_format, SerializationFormat::Binary);
        assert_eq!(options.conflict_policy, ConflictPolicy::ClientWins);
        assert_eq!(options.scope_name, "DefaultScope");
        assert_eq!(options.in_memory_batches, DEFAULT_IN_MEMORY_BATCHES);
    }

    #[test]
    fn invalid_options_are_rejected() {
        let err = SyncOptions::from_json(r#"{"batch_size": 0}"#).unwrap_err();
        assert_eq!(err.type_name(), "ConfigurationError");
        assert!(SyncOptions::from_json("[1, 2]").is_err());
    }

    #[test]
    fn skeleton_carries_settings() {
        let schema = SyncOptions::new(["ServiceTickets"])
            .with_conflict_policy(ConflictPolicy::ClientWins)
            .with_batch_size(3)
            .to_schema()
            .unwrap();
        assert_eq!(schema.tables.len(), 1);
        assert!(!schema.has_columns());
        assert_eq!(schema.conflict_policy, ConflictPolicy::ClientWins);
        assert_eq!(schema.batch_size, 3);
    }

    #[test]
    fn local_settings_leave_the_policy() {
        let mut schema = SyncSchema {
            conflict_policy: ConflictPolicy::ClientWins,
            ..SyncSchema::default()
        };
        SyncOptions::default()
            .with_batch_size(9)
            .apply_local_settings(&mut schema);
        assert_eq!(schema.batch_size, 9);
        assert_eq!(schema.conflict_policy, ConflictPolicy::ClientWins);
    }
}
