//! The datastore contract sync runs against.

use async_trait::async_trait;
use rowsync_protocol::{ChangeRecord, RowKind, ScopeInfo, Value, Watermark};
use rowsync_schema::{CatalogAdapter, SyncSchema, Table};
use thiserror::Error;
use uuid::Uuid;

/// Result type for datastore operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors raised by a datastore.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The table does not exist in the store.
    #[error("unknown table: {0}")]
    UnknownTable(String),

    /// The store's table does not match the configuration.
    #[error("table {table} does not match the configuration: {reason}")]
    SchemaMismatch {
        /// Table name.
        table: String,
        /// What differs.
        reason: String,
    },

    /// A row carries the wrong number of values.
    #[error("row for {table} has {actual} values, expected {expected}")]
    RowShape {
        /// Table name.
        table: String,
        /// Column count.
        expected: usize,
        /// Value count received.
        actual: usize,
    },

    /// A constraint rejected the write.
    #[error("constraint violated on {table}: {reason}")]
    Constraint {
        /// Table name.
        table: String,
        /// Violated constraint.
        reason: String,
    },

    /// No live row exists for the key.
    #[error("row {key} not found in {table}")]
    RowNotFound {
        /// Table name.
        table: String,
        /// Rendered key.
        key: String,
    },

    /// A live row already exists for the key.
    #[error("row {key} already exists in {table}")]
    DuplicateKey {
        /// Table name.
        table: String,
        /// Rendered key.
        key: String,
    },

    /// Backend-specific failure.
    #[error("backend error: {0}")]
    Backend(String),
}

impl StoreError {
    /// Renders a key for error messages.
    pub fn render_key(key: &[Value]) -> String {
        let parts: Vec<String> = key.iter().map(ToString::to_string).collect();
        format!("({})", parts.join(", "))
    }
}

/// Which rows a change query returns.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Selection {
    /// Live rows and tombstones.
    #[default]
    All,
    /// Live rows only.
    LiveOnly,
    /// Tombstones only.
    TombstonesOnly,
}

impl Selection {
    fn admits(self, tombstone: bool) -> bool {
        match self {
            Selection::All => true,
            Selection::LiveOnly => !tombstone,
            Selection::TombstonesOnly => tombstone,
        }
    }
}

/// A page request over a table's tracked rows.
///
/// Rows are returned in primary key order. `after` is exclusive, so the
/// last key of one page resumes the next.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeQuery {
    /// Rows changed strictly after this watermark.
    pub since: Watermark,
    /// Rows changed at or before this watermark.
    pub until: Option<Watermark>,
    /// Skip rows whose last change came from this scope.
    pub exclude_origin: Option<Uuid>,
    /// Live rows, tombstones, or both.
    pub selection: Selection,
    /// Resume after this key.
    pub after: Option<Vec<Value>>,
    /// Maximum rows returned.
    pub limit: usize,
}

impl ChangeQuery {
    /// Every row changed since `since`.
    pub fn since(since: Watermark) -> Self {
        Self {
            since,
            until: None,
            exclude_origin: None,
            selection: Selection::All,
            after: None,
            limit: usize::MAX,
        }
    }

    /// Returns true if a row with this tracking data is in the window.
    ///
    /// Key position and limit are left to the caller.
    pub fn matches(&self, row: &TrackedRow) -> bool {
        row.updated > self.since
            && self.until.map_or(true, |until| row.updated <= until)
            && self.selection.admits(row.tombstone)
            && (self.exclude_origin.is_none() || row.origin != self.exclude_origin)
    }
}

/// A row with its tracking metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackedRow {
    /// Primary key values, in key order.
    pub key: Vec<Value>,
    /// Column values in schema ordinal order. Empty for tombstones.
    pub values: Vec<Value>,
    /// Watermark of the insert.
    pub created: Watermark,
    /// Watermark of the last change.
    pub updated: Watermark,
    /// Deleted.
    pub tombstone: bool,
    /// Scope that made the last change; `None` for local writes.
    pub origin: Option<Uuid>,
}

impl TrackedRow {
    /// The change this row represents to a peer that last synced at `since`.
    pub fn to_change(&self, since: Watermark) -> ChangeRecord {
        let kind = if self.tombstone {
            RowKind::Delete
        } else if self.created > since {
            RowKind::Insert
        } else {
            RowKind::Update
        };
        ChangeRecord {
            key: self.key.clone(),
            values: self.values.clone(),
            kind,
            watermark: self.updated,
            origin: self.origin,
        }
    }
}

/// A write produced by applying remote changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowWrite {
    /// Insert or overwrite a row, reviving a tombstone.
    Upsert {
        /// Column values in schema ordinal order.
        values: Vec<Value>,
        /// Scope the change came from.
        origin: Option<Uuid>,
    },
    /// Delete a row, leaving a tombstone.
    Delete {
        /// Primary key values.
        key: Vec<Value>,
        /// Scope the change came from.
        origin: Option<Uuid>,
    },
}

/// A datastore taking part in sync.
///
/// Implementations track a watermark per row that strictly increases with
/// every write, keep tombstones for deleted rows, and apply each call to
/// [`apply_writes`](Self::apply_writes) atomically.
#[async_trait]
pub trait SyncStore: Send + Sync {
    /// Provider name, used in error context.
    fn provider_name(&self) -> &str {
        self.catalog().provider_name()
    }

    /// The store's catalog.
    fn catalog(&self) -> &dyn CatalogAdapter;

    /// Verifies that every table of the schema exists with matching columns.
    async fn ensure_tables(&self, schema: &SyncSchema) -> StoreResult<()>;

    /// The watermark of the most recent write.
    async fn current_watermark(&self) -> StoreResult<Watermark>;

    /// Returns one page of tracked rows in primary key order.
    async fn select_changes(&self, table: &Table, query: &ChangeQuery)
        -> StoreResult<Vec<TrackedRow>>;

    /// Returns the tracked row for a key, including tombstones.
    async fn get_row(&self, table: &Table, key: &[Value]) -> StoreResult<Option<TrackedRow>>;

    /// Applies writes to one table; all of them or none.
    async fn apply_writes(&self, table: &Table, writes: Vec<RowWrite>) -> StoreResult<usize>;

    /// Loads every scope record.
    async fn load_scopes(&self) -> StoreResult<Vec<ScopeInfo>>;

    /// Inserts or replaces a scope record by id.
    async fn save_scope(&self, scope: &ScopeInfo) -> StoreResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(created: u64, updated: u64, tombstone: bool) -> TrackedRow {
        TrackedRow {
            key: vec![Value::Integer(1)],
            values: vec![Value::Integer(1)],
            created: Watermark(created),
            updated: Watermark(updated),
            tombstone,
            origin: None,
        }
    }

    #[test]
    fn change_kinds() {
        assert_eq!(row(5, 5, false).to_change(Watermark(3)).kind, RowKind::Insert);
        assert_eq!(row(2, 5, false).to_change(Watermark(3)).kind, RowKind::Update);
        assert_eq!(row(5, 6, true).to_change(Watermark(3)).kind, RowKind::Delete);
        assert_eq!(row(2, 5, false).to_change(Watermark(3)).watermark, Watermark(5));
    }

    #[test]
    fn query_window() {
        let mut query = ChangeQuery::since(Watermark(3));
        assert!(!query.matches(&row(1, 3, false)));
        assert!(query.matches(&row(1, 4, false)));

        query.until = Some(Watermark(4));
        assert!(!query.matches(&row(1, 5, false)));

        query.selection = Selection::TombstonesOnly;
        assert!(!query.matches(&row(1, 4, false)));
        assert!(query.matches(&row(1, 4, true)));
    }

    #[test]
    fn query_excludes_origin() {
        let peer = Uuid::new_v4();
        let mut query = ChangeQuery::since(Watermark::ZERO);
        query.exclude_origin = Some(peer);

        let mut echoed = row(1, 1, false);
        echoed.origin = Some(peer);
        assert!(!query.matches(&echoed));
        assert!(query.matches(&row(1, 1, false)));
    }

    #[test]
    fn keys_render_for_errors() {
        let key = vec![Value::Integer(3), Value::Text("a".into())];
        assert_eq!(StoreError::render_key(&key), "(3, 'a')");
    }
}
