//! Catalog adapter contract and the in-memory reference adapter.

use crate::error::SchemaResult;
use crate::metadata::{Metadata, NativeColumn};
use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// A foreign key as reported by a provider's catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NativeRelation {
    /// Constraint name.
    pub name: String,
    /// Referencing column in the owning table.
    pub column: String,
    /// Referenced table.
    pub parent_table: String,
    /// Referenced column.
    pub parent_column: String,
}

impl NativeRelation {
    /// Creates a relation descriptor.
    pub fn new(
        name: impl Into<String>,
        column: impl Into<String>,
        parent_table: impl Into<String>,
        parent_column: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            column: column.into(),
            parent_table: parent_table.into(),
            parent_column: parent_column.into(),
        }
    }
}

/// Read access to one provider's catalog.
///
/// One implementation exists per database engine. All reads of a schema
/// build go through a single [`CatalogTransaction`].
#[async_trait]
pub trait CatalogAdapter: Send + Sync {
    /// The provider's type vocabulary.
    fn metadata(&self) -> &dyn Metadata;

    /// Provider name.
    fn provider_name(&self) -> &str {
        self.metadata().provider_name()
    }

    /// Opens a transactional scope over the catalog.
    async fn begin(&self) -> SchemaResult<Box<dyn CatalogTransaction>>;
}

/// Catalog reads inside a transaction the caller controls.
///
/// Dropping the transaction without calling [`commit`](Self::commit)
/// abandons it.
#[async_trait]
pub trait CatalogTransaction: Send + Sync {
    /// Lists the columns of a table. Unknown tables have none.
    async fn list_columns(&self, table: &str) -> SchemaResult<Vec<NativeColumn>>;

    /// Lists the primary key column names of a table, in key order.
    async fn list_primary_keys(&self, table: &str) -> SchemaResult<Vec<String>>;

    /// Lists the foreign keys declared on a table.
    async fn list_relations(&self, table: &str) -> SchemaResult<Vec<NativeRelation>>;

    /// Ends the transaction.
    async fn commit(self: Box<Self>) -> SchemaResult<()>;
}

/// A declared table, as a catalog would describe it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableDefinition {
    /// Table name.
    pub name: String,
    /// Columns; ordinals are assigned in declaration order.
    pub columns: Vec<NativeColumn>,
    /// Primary key column names.
    pub primary_keys: Vec<String>,
    /// Foreign keys.
    pub relations: Vec<NativeRelation>,
}

impl TableDefinition {
    /// Creates an empty definition.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: Vec::new(),
            primary_keys: Vec::new(),
            relations: Vec::new(),
        }
    }

    /// Appends a column at the next ordinal.
    #[must_use]
    pub fn column(mut self, column: NativeColumn) -> Self {
        let ordinal = self.columns.len();
        self.columns.push(column.at(ordinal));
        self
    }

    /// Appends a primary key column name.
    #[must_use]
    pub fn primary_key(mut self, name: impl Into<String>) -> Self {
        self.primary_keys.push(name.into());
        self
    }

    /// Appends a foreign key.
    #[must_use]
    pub fn relation(mut self, relation: NativeRelation) -> Self {
        self.relations.push(relation);
        self
    }

    /// Position of a column by case-insensitive name.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns
            .iter()
            .position(|c| c.name.eq_ignore_ascii_case(name))
    }

    /// Returns true if the name matches this table, ignoring case.
    pub fn is_named(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name)
    }
}

/// A catalog over declared table definitions.
///
/// Each transaction reads a snapshot taken by [`begin`](CatalogAdapter::begin),
/// so concurrent [`alter`](Self::alter) calls never reach a build in flight.
pub struct StaticCatalog {
    metadata: Arc<dyn Metadata>,
    tables: RwLock<Vec<TableDefinition>>,
}

impl StaticCatalog {
    /// Creates a catalog over `tables`.
    pub fn new(metadata: Arc<dyn Metadata>, tables: Vec<TableDefinition>) -> Self {
        Self {
            metadata,
            tables: RwLock::new(tables),
        }
    }

    /// Adds or replaces a table definition.
    pub fn alter(&self, definition: TableDefinition) {
        let mut tables = self.tables.write();
        match tables.iter_mut().find(|t| t.is_named(&definition.name)) {
            Some(existing) => *existing = definition,
            None => tables.push(definition),
        }
    }

    /// Drops a table definition. Returns true if it existed.
    pub fn drop_table(&self, name: &str) -> bool {
        let mut tables = self.tables.write();
        let before = tables.len();
        tables.retain(|t| !t.is_named(name));
        tables.len() != before
    }

    /// Returns a copy of a table definition.
    pub fn definition(&self, name: &str) -> Option<TableDefinition> {
        self.tables.read().iter().find(|t| t.is_named(name)).cloned()
    }

    /// Returns copies of every table definition.
    pub fn definitions(&self) -> Vec<TableDefinition> {
        self.tables.read().clone()
    }
}

#[async_trait]
impl CatalogAdapter for StaticCatalog {
    fn metadata(&self) -> &dyn Metadata {
        self.metadata.as_ref()
    }

    async fn begin(&self) -> SchemaResult<Box<dyn CatalogTransaction>> {
        Ok(Box::new(SnapshotTransaction {
            tables: self.tables.read().clone(),
        }))
    }
}

struct SnapshotTransaction {
    tables: Vec<TableDefinition>,
}

impl SnapshotTransaction {
    fn find(&self, table: &str) -> Option<&TableDefinition> {
        self.tables.iter().find(|t| t.is_named(table))
    }
}

#[async_trait]
impl CatalogTransaction for SnapshotTransaction {
    async fn list_columns(&self, table: &str) -> SchemaResult<Vec<NativeColumn>> {
        Ok(self.find(table).map(|t| t.columns.clone()).unwrap_or_default())
    }

    async fn list_primary_keys(&self, table: &str) -> SchemaResult<Vec<String>> {
        Ok(self
            .find(table)
            .map(|t| t.primary_keys.clone())
            .unwrap_or_default())
    }

    async fn list_relations(&self, table: &str) -> SchemaResult<Vec<NativeRelation>> {
        Ok(self
            .find(table)
            .map(|t| t.relations.clone())
            .unwrap_or_default())
    }

    async fn commit(self: Box<Self>) -> SchemaResult<()> {
        Ok(())
    }
}
