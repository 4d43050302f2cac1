//! Canonical schema model.

use crate::error::{SchemaError, SchemaResult};
use crate::settings::{ConflictPolicy, SerializationFormat};
use crate::types::{DataType, DbKind};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::path::PathBuf;

/// Default number of change records per batch.
pub const DEFAULT_BATCH_SIZE: usize = 500;

/// Default number of batches kept in memory before spooling.
pub const DEFAULT_IN_MEMORY_BATCHES: usize = 4;

/// A validated column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    /// Column name, as reported by the catalog.
    pub name: String,
    /// Native type name.
    pub original_type_name: String,
    /// Provider's own type token.
    pub original_db_type: String,
    /// Canonical value type.
    pub data_type: DataType,
    /// Canonical DB-kind.
    pub db_kind: DbKind,
    /// Nullable.
    pub allow_null: bool,
    /// Unsigned.
    pub is_unsigned: bool,
    /// Unicode text.
    pub is_unicode: bool,
    /// Maximum length, for text and binary columns.
    pub max_length: Option<u32>,
    /// Precision, for numeric columns.
    pub precision: Option<u8>,
    /// Scale, for numeric columns supporting it.
    pub scale: Option<u8>,
    /// Dense, zero-based position within the table.
    pub ordinal: usize,
    /// Never written by sync.
    pub read_only: bool,
    /// Owning table.
    pub table_name: String,
}

/// A foreign key between two tables of the sync set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relation {
    /// Constraint name.
    pub name: String,
    /// Referencing table.
    pub child_table: String,
    /// Referencing column.
    pub child_column: String,
    /// Referenced table.
    pub parent_table: String,
    /// Referenced column.
    pub parent_column: String,
}

/// A table of the sync set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Table {
    /// Table name.
    pub name: String,
    /// Columns in ordinal order.
    pub columns: Vec<Column>,
    /// Primary key column names, in key order.
    pub primary_key: Vec<String>,
    /// Outgoing relations (this table is the child).
    pub relations: Vec<Relation>,
}

impl Table {
    /// Creates a table entry with no columns yet.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: Vec::new(),
            primary_key: Vec::new(),
            relations: Vec::new(),
        }
    }

    /// Finds a column by case-insensitive name.
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(name))
    }

    /// Returns the ordinal of a column by case-insensitive name.
    pub fn column_ordinal(&self, name: &str) -> Option<usize> {
        self.column(name).map(|c| c.ordinal)
    }

    /// Returns the ordinals of the primary key columns, in key order.
    pub fn key_ordinals(&self) -> Vec<usize> {
        self.primary_key
            .iter()
            .filter_map(|k| self.column_ordinal(k))
            .collect()
    }

    /// Returns true if the name matches this table, ignoring case.
    pub fn is_named(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name)
    }

    /// Names of the tables this table references.
    pub fn parent_tables(&self) -> impl Iterator<Item = &str> {
        self.relations.iter().map(|r| r.parent_table.as_str())
    }
}

/// The canonical configuration: tables plus session-wide settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncSchema {
    /// Tables, unique by case-insensitive name, in declaration order.
    pub tables: Vec<Table>,
    /// Wire encoding.
    pub serialization_format: SerializationFormat,
    /// Conflict resolution policy.
    pub conflict_policy: ConflictPolicy,
    /// Directory for spooled batches. `None` keeps every batch in memory.
    pub batch_directory: Option<PathBuf>,
    /// Maximum change records per batch.
    pub batch_size: usize,
    /// Batches kept in memory before spooling to `batch_directory`.
    pub in_memory_batches: usize,
    /// Name of the provider that validated the tables.
    pub provider: Option<String>,
}

impl Default for SyncSchema {
    fn default() -> Self {
        Self {
            tables: Vec::new(),
            serialization_format: SerializationFormat::default(),
            conflict_policy: ConflictPolicy::default(),
            batch_directory: None,
            batch_size: DEFAULT_BATCH_SIZE,
            in_memory_batches: DEFAULT_IN_MEMORY_BATCHES,
            provider: None,
        }
    }
}

impl SyncSchema {
    /// Creates a skeleton naming the tables to sync.
    pub fn with_tables<I, S>(names: I) -> SchemaResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut schema = Self::default();
        for name in names {
            schema.add_table(Table::named(name))?;
        }
        Ok(schema)
    }

    /// Adds a table, rejecting duplicate names.
    pub fn add_table(&mut self, table: Table) -> SchemaResult<()> {
        if self.table(&table.name).is_some() {
            return Err(SchemaError::InvalidConfiguration(format!(
                "table {} is declared twice",
                table.name
            )));
        }
        self.tables.push(table);
        Ok(())
    }

    /// Finds a table by case-insensitive name.
    pub fn table(&self, name: &str) -> Option<&Table> {
        self.tables.iter().find(|t| t.is_named(name))
    }

    /// Returns true if at least one table is declared.
    pub fn has_tables(&self) -> bool {
        !self.tables.is_empty()
    }

    /// Returns true if any table already carries columns.
    pub fn has_columns(&self) -> bool {
        self.tables.iter().any(|t| !t.columns.is_empty())
    }

    /// Tables with every parent before its children.
    ///
    /// Independent tables keep declaration order. Self references are
    /// ignored; tables caught in a cycle are appended in declaration order.
    pub fn ordered_tables(&self) -> Vec<&Table> {
        let count = self.tables.len();
        let index_of = |name: &str| self.tables.iter().position(|t| t.is_named(name));

        let mut pending_parents = vec![0usize; count];
        let mut children: Vec<Vec<usize>> = vec![Vec::new(); count];
        for (child, table) in self.tables.iter().enumerate() {
            let mut seen = Vec::new();
            for parent in table.parent_tables().filter_map(index_of) {
                if parent != child && !seen.contains(&parent) {
                    seen.push(parent);
                    pending_parents[child] += 1;
                    children[parent].push(child);
                }
            }
        }

        let mut ready: VecDeque<usize> = (0..count).filter(|&i| pending_parents[i] == 0).collect();
        let mut placed = vec![false; count];
        let mut ordered = Vec::with_capacity(count);
        while let Some(next) = ready.pop_front() {
            placed[next] = true;
            ordered.push(&self.tables[next]);
            let mut released: Vec<usize> = Vec::new();
            for &child in &children[next] {
                pending_parents[child] -= 1;
                if pending_parents[child] == 0 {
                    released.push(child);
                }
            }
            released.sort_unstable();
            ready.extend(released);
        }

        ordered.extend((0..count).filter(|&i| !placed[i]).map(|i| &self.tables[i]));
        ordered
    }
}
