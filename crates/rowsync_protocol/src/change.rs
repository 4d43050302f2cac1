//! Change records and batches.

use crate::scope::Watermark;
use crate::value::Value;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// What happened to a row since the selecting peer's last sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RowKind {
    /// Created since the last sync.
    Insert,
    /// Existed before the last sync and was modified.
    Update,
    /// Deleted (tombstone).
    Delete,
}

/// One changed row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeRecord {
    /// Primary key values, in key order.
    pub key: Vec<Value>,
    /// Full column values, in ordinal order. Tombstones carry the last known row.
    pub values: Vec<Value>,
    /// Row state relative to the last sync.
    pub kind: RowKind,
    /// Watermark of the last write, in the selecting store.
    pub watermark: Watermark,
    /// Scope that made the last write; `None` for a local write.
    pub origin: Option<Uuid>,
}

impl ChangeRecord {
    /// Returns true if the row is deleted.
    pub fn is_tombstone(&self) -> bool {
        self.kind == RowKind::Delete
    }
}

/// A bounded, ordered set of change records for one table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Batch {
    /// Position of the batch within its session.
    pub index: usize,
    /// Table every record belongs to.
    pub table: String,
    /// Records in primary key order.
    pub changes: Vec<ChangeRecord>,
}

impl Batch {
    /// Creates an empty batch.
    pub fn new(index: usize, table: impl Into<String>) -> Self {
        Self {
            index,
            table: table.into(),
            changes: Vec::new(),
        }
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.changes.len()
    }

    /// Returns true if the batch holds no records.
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    /// Number of tombstones.
    pub fn tombstones(&self) -> usize {
        self.changes.iter().filter(|c| c.is_tombstone()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: i64, kind: RowKind) -> ChangeRecord {
        ChangeRecord {
            key: vec![Value::Integer(id)],
            values: vec![Value::Integer(id), Value::Text("row".into())],
            kind,
            watermark: Watermark(id as u64),
            origin: None,
        }
    }

    #[test]
    fn batch_counts() {
        let mut batch = Batch::new(0, "ServiceTickets");
        assert!(batch.is_empty());
        batch.changes.push(record(1, RowKind::Insert));
        batch.changes.push(record(2, RowKind::Delete));
        assert_eq!(batch.len(), 2);
        assert_eq!(batch.tombstones(), 1);
        assert!(batch.changes[1].is_tombstone());
    }
}
