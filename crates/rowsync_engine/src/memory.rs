//! In-memory datastore with change tracking.

use crate::store::{ChangeQuery, RowWrite, StoreError, StoreResult, SyncStore, TrackedRow};
use async_trait::async_trait;
use parking_lot::RwLock;
use rowsync_protocol::{ScopeInfo, Value, Watermark};
use rowsync_schema::{
    CatalogAdapter, Metadata, StaticCatalog, SyncSchema, Table, TableDefinition, TypeTable,
};
use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

/// A tracked datastore held in memory.
///
/// Every write advances a store-wide clock and stamps the row with it.
/// Deleted rows stay behind as tombstones. Foreign keys declared by the
/// table definitions are enforced on every write.
///
/// Local writes go through [`insert`](Self::insert), [`update`](Self::update)
/// and [`delete`](Self::delete) and take values in definition column order.
pub struct MemoryStore {
    catalog: StaticCatalog,
    state: RwLock<MemoryState>,
}

struct MemoryState {
    clock: Watermark,
    tables: Vec<MemoryTable>,
    scopes: Vec<ScopeInfo>,
}

struct MemoryTable {
    definition: TableDefinition,
    key_indices: Vec<usize>,
    rows: BTreeMap<Vec<Value>, StoredRow>,
}

#[derive(Debug, Clone)]
struct StoredRow {
    values: Vec<Value>,
    created: Watermark,
    updated: Watermark,
    tombstone: bool,
    origin: Option<Uuid>,
}

impl MemoryTable {
    fn new(definition: TableDefinition) -> Self {
        let key_indices = definition
            .primary_keys
            .iter()
            .filter_map(|k| definition.column_index(k))
            .collect();
        Self {
            definition,
            key_indices,
            rows: BTreeMap::new(),
        }
    }

    fn name(&self) -> &str {
        &self.definition.name
    }

    fn key_of(&self, values: &[Value]) -> Vec<Value> {
        rowsync_protocol::key_of(values, &self.key_indices)
    }

    /// Definition index of every schema column, in schema order.
    fn projection(&self, table: &Table) -> StoreResult<Vec<usize>> {
        table
            .columns
            .iter()
            .map(|c| {
                self.definition
                    .column_index(&c.name)
                    .ok_or_else(|| StoreError::SchemaMismatch {
                        table: self.name().to_string(),
                        reason: format!("column {} does not exist", c.name),
                    })
            })
            .collect()
    }

    fn check_values(&self, values: &[Value]) -> StoreResult<()> {
        if values.len() != self.definition.columns.len() {
            return Err(StoreError::RowShape {
                table: self.name().to_string(),
                expected: self.definition.columns.len(),
                actual: values.len(),
            });
        }
        for (i, (column, value)) in self.definition.columns.iter().zip(values).enumerate() {
            let is_key = self.key_indices.contains(&i);
            if value.is_null() && (!column.allow_null || is_key) {
                return Err(StoreError::Constraint {
                    table: self.name().to_string(),
                    reason: format!("column {} does not allow null", column.name),
                });
            }
        }
        Ok(())
    }

    fn live(&self) -> impl Iterator<Item = &StoredRow> {
        self.rows.values().filter(|r| !r.tombstone)
    }

    fn tracked(&self, key: &[Value], row: &StoredRow, projection: &[usize]) -> TrackedRow {
        let values = if row.tombstone {
            Vec::new()
        } else {
            projection.iter().map(|&i| row.values[i].clone()).collect()
        };
        TrackedRow {
            key: key.to_vec(),
            values,
            created: row.created,
            updated: row.updated,
            tombstone: row.tombstone,
            origin: row.origin,
        }
    }
}

impl MemoryState {
    fn table_index(&self, name: &str) -> StoreResult<usize> {
        self.tables
            .iter()
            .position(|t| t.definition.is_named(name))
            .ok_or_else(|| StoreError::UnknownTable(name.to_string()))
    }

    fn find(&self, name: &str) -> StoreResult<&MemoryTable> {
        let index = self.table_index(name)?;
        Ok(&self.tables[index])
    }

    fn tick(&mut self) -> Watermark {
        self.clock = self.clock.next();
        self.clock
    }

    /// Every referenced parent row must be live.
    fn check_parents(&self, index: usize, values: &[Value]) -> StoreResult<()> {
        let table = &self.tables[index];
        for relation in &table.definition.relations {
            let Some(column) = table.definition.column_index(&relation.column) else {
                continue;
            };
            let value = &values[column];
            if value.is_null() {
                continue;
            }
            let Ok(parent) = self.find(&relation.parent_table) else {
                continue;
            };
            let Some(parent_column) = parent.definition.column_index(&relation.parent_column)
            else {
                continue;
            };
            if !parent.live().any(|r| &r.values[parent_column] == value) {
                return Err(StoreError::Constraint {
                    table: table.name().to_string(),
                    reason: format!(
                        "{}: no {} row with {} = {}",
                        relation.name, relation.parent_table, relation.parent_column, value
                    ),
                });
            }
        }
        Ok(())
    }

    /// No live row may still reference the row being deleted.
    fn check_children(&self, index: usize, values: &[Value]) -> StoreResult<()> {
        let parent = &self.tables[index];
        for child in &self.tables {
            for relation in &child.definition.relations {
                if !parent.definition.is_named(&relation.parent_table) {
                    continue;
                }
                let (Some(parent_column), Some(child_column)) = (
                    parent.definition.column_index(&relation.parent_column),
                    child.definition.column_index(&relation.column),
                ) else {
                    continue;
                };
                let value = &values[parent_column];
                if child.live().any(|r| &r.values[child_column] == value) {
                    return Err(StoreError::Constraint {
                        table: parent.name().to_string(),
                        reason: format!(
                            "{}: {} rows still reference {}",
                            relation.name,
                            child.name(),
                            value
                        ),
                    });
                }
            }
        }
        Ok(())
    }

    fn put(&mut self, index: usize, values: Vec<Value>, origin: Option<Uuid>) -> StoreResult<()> {
        self.tables[index].check_values(&values)?;
        self.check_parents(index, &values)?;

        let clock = self.tick();
        let table = &mut self.tables[index];
        let key = table.key_of(&values);
        let row = table.rows.entry(key).or_insert_with(|| StoredRow {
            values: Vec::new(),
            created: clock,
            updated: clock,
            tombstone: true,
            origin,
        });
        if row.tombstone {
            row.created = clock;
            row.tombstone = false;
        }
        row.values = values;
        row.updated = clock;
        row.origin = origin;
        Ok(())
    }

    fn remove(&mut self, index: usize, key: &[Value], origin: Option<Uuid>) -> StoreResult<bool> {
        let values = match self.tables[index].rows.get(key) {
            Some(row) if !row.tombstone => row.values.clone(),
            _ => return Ok(false),
        };
        self.check_children(index, &values)?;

        let clock = self.tick();
        if let Some(row) = self.tables[index].rows.get_mut(key) {
            row.values.clear();
            row.tombstone = true;
            row.updated = clock;
            row.origin = origin;
        }
        Ok(true)
    }

    fn is_live(&self, index: usize, key: &[Value]) -> bool {
        self.tables[index]
            .rows
            .get(key)
            .map_or(false, |r| !r.tombstone)
    }
}

impl MemoryStore {
    /// Creates an empty store over `definitions`.
    pub fn new(metadata: Arc<dyn Metadata>, definitions: Vec<TableDefinition>) -> Self {
        let tables = definitions.iter().cloned().map(MemoryTable::new).collect();
        Self {
            catalog: StaticCatalog::new(metadata, definitions),
            state: RwLock::new(MemoryState {
                clock: Watermark::ZERO,
                tables,
                scopes: Vec::new(),
            }),
        }
    }

    /// Creates an empty store speaking the SQLite type vocabulary.
    pub fn sqlite(definitions: Vec<TableDefinition>) -> Self {
        Self::new(Arc::new(TypeTable::sqlite()), definitions)
    }

    /// Inserts a row. Fails if a live row with the same key exists.
    pub fn insert(&self, table: &str, values: Vec<Value>) -> StoreResult<Watermark> {
        let mut state = self.state.write();
        let index = state.table_index(table)?;
        let key = state.tables[index].key_of(&values);
        if state.is_live(index, &key) {
            return Err(StoreError::DuplicateKey {
                table: table.to_string(),
                key: StoreError::render_key(&key),
            });
        }
        state.put(index, values, None)?;
        Ok(state.clock)
    }

    /// Replaces a live row.
    pub fn update(&self, table: &str, values: Vec<Value>) -> StoreResult<Watermark> {
        let mut state = self.state.write();
        let index = state.table_index(table)?;
        let key = state.tables[index].key_of(&values);
        if !state.is_live(index, &key) {
            return Err(StoreError::RowNotFound {
                table: table.to_string(),
                key: StoreError::render_key(&key),
            });
        }
        state.put(index, values, None)?;
        Ok(state.clock)
    }

    /// Deletes a live row, leaving a tombstone.
    pub fn delete(&self, table: &str, key: &[Value]) -> StoreResult<Watermark> {
        let mut state = self.state.write();
        let index = state.table_index(table)?;
        if !state.remove(index, key, None)? {
            return Err(StoreError::RowNotFound {
                table: table.to_string(),
                key: StoreError::render_key(key),
            });
        }
        Ok(state.clock)
    }

    /// Returns a live row's values.
    pub fn get(&self, table: &str, key: &[Value]) -> Option<Vec<Value>> {
        let state = self.state.read();
        let table = state.find(table).ok()?;
        table
            .rows
            .get(key)
            .filter(|r| !r.tombstone)
            .map(|r| r.values.clone())
    }

    /// Live rows in key order.
    pub fn rows(&self, table: &str) -> Vec<Vec<Value>> {
        let state = self.state.read();
        state
            .find(table)
            .map(|t| t.live().map(|r| r.values.clone()).collect())
            .unwrap_or_default()
    }

    /// Number of live rows.
    pub fn row_count(&self, table: &str) -> usize {
        let state = self.state.read();
        state.find(table).map(|t| t.live().count()).unwrap_or(0)
    }

    /// Number of tombstones.
    pub fn tombstone_count(&self, table: &str) -> usize {
        let state = self.state.read();
        state
            .find(table)
            .map(|t| t.rows.values().filter(|r| r.tombstone).count())
            .unwrap_or(0)
    }
}

#[async_trait]
impl SyncStore for MemoryStore {
    fn catalog(&self) -> &dyn CatalogAdapter {
        &self.catalog
    }

    async fn ensure_tables(&self, schema: &SyncSchema) -> StoreResult<()> {
        let state = self.state.read();
        for table in &schema.tables {
            let stored = state.find(&table.name)?;
            let definition = &stored.definition;
            let mismatch = |reason: String| StoreError::SchemaMismatch {
                table: table.name.clone(),
                reason,
            };

            if definition.columns.len() != table.columns.len() {
                return Err(mismatch(format!(
                    "{} columns configured, {} present",
                    table.columns.len(),
                    definition.columns.len()
                )));
            }
            stored.projection(table)?;

            let same_keys = definition.primary_keys.len() == table.primary_key.len()
                && definition
                    .primary_keys
                    .iter()
                    .zip(&table.primary_key)
                    .all(|(a, b)| a.eq_ignore_ascii_case(b));
            if !same_keys {
                return Err(mismatch("primary key differs".into()));
            }
        }
        Ok(())
    }

    async fn current_watermark(&self) -> StoreResult<Watermark> {
        Ok(self.state.read().clock)
    }

    async fn select_changes(
        &self,
        table: &Table,
        query: &ChangeQuery,
    ) -> StoreResult<Vec<TrackedRow>> {
        let state = self.state.read();
        let stored = state.find(&table.name)?;
        let projection = stored.projection(table)?;

        let lower = match &query.after {
            Some(after) => Bound::Excluded(after.clone()),
            None => Bound::Unbounded,
        };
        Ok(stored
            .rows
            .range((lower, Bound::Unbounded))
            .map(|(key, row)| stored.tracked(key, row, &projection))
            .filter(|row| query.matches(row))
            .take(query.limit)
            .collect())
    }

    async fn get_row(&self, table: &Table, key: &[Value]) -> StoreResult<Option<TrackedRow>> {
        let state = self.state.read();
        let stored = state.find(&table.name)?;
        let projection = stored.projection(table)?;
        Ok(stored
            .rows
            .get(key)
            .map(|row| stored.tracked(key, row, &projection)))
    }

    async fn apply_writes(&self, table: &Table, writes: Vec<RowWrite>) -> StoreResult<usize> {
        let mut state = self.state.write();
        let index = state.table_index(&table.name)?;
        let projection = state.tables[index].projection(table)?;
        let width = state.tables[index].definition.columns.len();

        let saved_clock = state.clock;
        let saved_rows = state.tables[index].rows.clone();

        let mut applied = 0;
        let mut outcome = Ok(());
        for write in writes {
            let result = match write {
                RowWrite::Upsert { values, origin } => {
                    if values.len() != projection.len() {
                        Err(StoreError::RowShape {
                            table: table.name.clone(),
                            expected: projection.len(),
                            actual: values.len(),
                        })
                    } else {
                        let mut stored = vec![Value::Null; width];
                        for (value, &i) in values.into_iter().zip(&projection) {
                            stored[i] = value;
                        }
                        state.put(index, stored, origin).map(|()| true)
                    }
                }
                RowWrite::Delete { key, origin } => state.remove(index, &key, origin),
            };
            match result {
                Ok(true) => applied += 1,
                Ok(false) => {}
                Err(e) => {
                    outcome = Err(e);
                    break;
                }
            }
        }

        if let Err(e) = outcome {
            state.clock = saved_clock;
            state.tables[index].rows = saved_rows;
            debug!(table = %table.name, error = %e, "batch rolled back");
            return Err(e);
        }
        Ok(applied)
    }

    async fn load_scopes(&self) -> StoreResult<Vec<ScopeInfo>> {
        Ok(self.state.read().scopes.clone())
    }

    async fn save_scope(&self, scope: &ScopeInfo) -> StoreResult<()> {
        let mut state = self.state.write();
        match state.scopes.iter_mut().find(|s| s.id == scope.id) {
            Some(existing) => *existing = scope.clone(),
            None => state.scopes.push(scope.clone()),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Selection;
    use rowsync_protocol::RowKind;
    use rowsync_schema::{NativeColumn, NativeRelation, SchemaBuilder};

    fn customer() -> TableDefinition {
        TableDefinition::new("Customer")
            .column(NativeColumn::new("CustomerID", "integer"))
            .column(NativeColumn::new("Name", "text").nullable())
            .primary_key("CustomerID")
    }

    fn sales_order() -> TableDefinition {
        TableDefinition::new("SalesOrder")
            .column(NativeColumn::new("OrderID", "integer"))
            .column(NativeColumn::new("CustomerID", "integer"))
            .primary_key("OrderID")
            .relation(NativeRelation::new(
                "FK_SalesOrder_Customer",
                "CustomerID",
                "Customer",
                "CustomerID",
            ))
    }

    fn store() -> MemoryStore {
        MemoryStore::sqlite(vec![customer(), sales_order()])
    }

    async fn schema(store: &MemoryStore) -> SyncSchema {
        let skeleton = SyncSchema::with_tables(["Customer", "SalesOrder"]).unwrap();
        SchemaBuilder::new(store.catalog()).build(skeleton).await.unwrap()
    }

    fn customer_row(id: i64, name: &str) -> Vec<Value> {
        vec![Value::from(id), Value::from(name)]
    }

    #[test]
    fn local_writes_advance_the_clock() {
        let store = store();
        assert_eq!(store.insert("Customer", customer_row(1, "a")).unwrap(), Watermark(1));
        assert_eq!(store.update("Customer", customer_row(1, "b")).unwrap(), Watermark(2));
        assert_eq!(store.delete("Customer", &[Value::from(1)]).unwrap(), Watermark(3));
        assert_eq!(store.row_count("Customer"), 0);
        assert_eq!(store.tombstone_count("Customer"), 1);
    }

    #[test]
    fn duplicate_and_missing_rows() {
        let store = store();
        store.insert("Customer", customer_row(1, "a")).unwrap();
        assert!(matches!(
            store.insert("Customer", customer_row(1, "a")),
            Err(StoreError::DuplicateKey { .. })
        ));
        assert!(matches!(
            store.update("Customer", customer_row(2, "a")),
            Err(StoreError::RowNotFound { .. })
        ));
        assert!(matches!(
            store.insert("Nowhere", customer_row(1, "a")),
            Err(StoreError::UnknownTable(_))
        ));
    }

    #[test]
    fn null_constraints() {
        let store = store();
        store
            .insert("Customer", vec![Value::from(1), Value::Null])
            .unwrap();
        assert!(matches!(
            store.insert("Customer", vec![Value::Null, Value::from("x")]),
            Err(StoreError::Constraint { .. })
        ));
        assert!(matches!(
            store.insert("Customer", vec![Value::from(2)]),
            Err(StoreError::RowShape { .. })
        ));
    }

    #[test]
    fn foreign_keys_are_enforced() {
        let store = store();
        let order = vec![Value::from(10), Value::from(1)];
        assert!(matches!(
            store.insert("SalesOrder", order.clone()),
            Err(StoreError::Constraint { .. })
        ));

        store.insert("Customer", customer_row(1, "a")).unwrap();
        store.insert("SalesOrder", order).unwrap();
        assert!(matches!(
            store.delete("Customer", &[Value::from(1)]),
            Err(StoreError::Constraint { .. })
        ));

        store.delete("SalesOrder", &[Value::from(10)]).unwrap();
        store.delete("Customer", &[Value::from(1)]).unwrap();
    }

    #[tokio::test]
    async fn reinserted_tombstone_is_an_insert() {
        let store = store();
        let schema = schema(&store).await;
        let table = schema.table("Customer").unwrap();

        store.insert("Customer", customer_row(1, "a")).unwrap();
        store.delete("Customer", &[Value::from(1)]).unwrap();
        let since = store.current_watermark().await.unwrap();
        store.insert("Customer", customer_row(1, "again")).unwrap();

        let rows = store
            .select_changes(table, &ChangeQuery::since(since))
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].to_change(since).kind, RowKind::Insert);
    }

    #[tokio::test]
    async fn selection_pages_in_key_order() {
        let store = store();
        let schema = schema(&store).await;
        let table = schema.table("Customer").unwrap();
        for id in [5, 3, 1, 4, 2] {
            store.insert("Customer", customer_row(id, "c")).unwrap();
        }
        store.delete("Customer", &[Value::from(4)]).unwrap();

        let mut query = ChangeQuery::since(Watermark::ZERO);
        query.selection = Selection::LiveOnly;
        query.limit = 2;
        let first = store.select_changes(table, &query).await.unwrap();
        assert_eq!(first.len(), 2);
        assert_eq!(first[1].key, vec![Value::from(2)]);

        query.after = Some(first[1].key.clone());
        let second = store.select_changes(table, &query).await.unwrap();
        let keys: Vec<_> = second.iter().map(|r| r.key[0].clone()).collect();
        assert_eq!(keys, vec![Value::from(3), Value::from(5)]);

        query.selection = Selection::TombstonesOnly;
        query.after = None;
        let tombstones = store.select_changes(table, &query).await.unwrap();
        assert_eq!(tombstones.len(), 1);
        assert!(tombstones[0].values.is_empty());
    }

    #[tokio::test]
    async fn failed_batch_leaves_no_trace() {
        let store = store();
        let schema = schema(&store).await;
        let table = schema.table("Customer").unwrap();
        store.insert("Customer", customer_row(1, "a")).unwrap();
        let before = store.current_watermark().await.unwrap();

        let writes = vec![
            RowWrite::Upsert {
                values: customer_row(2, "b"),
                origin: None,
            },
            RowWrite::Upsert {
                values: vec![Value::from(3)],
                origin: None,
            },
        ];
        let err = store.apply_writes(table, writes).await.unwrap_err();
        assert!(matches!(err, StoreError::RowShape { .. }));
        assert_eq!(store.row_count("Customer"), 1);
        assert_eq!(store.current_watermark().await.unwrap(), before);
    }

    #[tokio::test]
    async fn remote_writes_record_their_origin() {
        let store = store();
        let schema = schema(&store).await;
        let table = schema.table("Customer").unwrap();
        let peer = Uuid::new_v4();

        let applied = store
            .apply_writes(
                table,
                vec![
                    RowWrite::Upsert {
                        values: customer_row(1, "remote"),
                        origin: Some(peer),
                    },
                    RowWrite::Delete {
                        key: vec![Value::from(9)],
                        origin: Some(peer),
                    },
                ],
            )
            .await
            .unwrap();
        assert_eq!(applied, 1);

        let row = store.get_row(table, &[Value::from(1)]).await.unwrap().unwrap();
        assert_eq!(row.origin, Some(peer));
        assert!(store.get_row(table, &[Value::from(9)]).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn ensure_tables_detects_drift() {
        let store = store();
        let mut schema = schema(&store).await;
        store.ensure_tables(&schema).await.unwrap();

        schema.tables[0].primary_key = vec!["Name".into()];
        assert!(matches!(
            store.ensure_tables(&schema).await,
            Err(StoreError::SchemaMismatch { .. })
        ));

        let other = MemoryStore::sqlite(vec![customer()]);
        let schema = SyncSchema::with_tables(["SalesOrder"]).unwrap();
        assert!(matches!(
            other.ensure_tables(&schema).await,
            Err(StoreError::UnknownTable(_))
        ));
    }

    #[tokio::test]
    async fn scopes_are_replaced_by_id() {
        let store = store();
        let mut scope = ScopeInfo::new_local("DefaultScope");
        store.save_scope(&scope).await.unwrap();
        scope.last_sync = Some(Watermark(4));
        store.save_scope(&scope).await.unwrap();

        let scopes = store.load_scopes().await.unwrap();
        assert_eq!(scopes.len(), 1);
        assert_eq!(scopes[0].last_sync, Some(Watermark(4)));
    }
}
