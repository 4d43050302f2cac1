//! Schema builder: catalog data to a validated schema model.

use crate::catalog::{CatalogAdapter, CatalogTransaction, NativeRelation};
use crate::error::{SchemaError, SchemaResult};
use crate::metadata::validate_column;
use crate::model::{Relation, SyncSchema, Table};
use tracing::{debug, info};

/// Builds a [`SyncSchema`] from a skeleton naming the tables to sync.
///
/// The build runs inside one catalog transaction and is atomic: either every
/// table validates and a complete model is returned, or the first failure is.
pub struct SchemaBuilder<'a> {
    catalog: &'a dyn CatalogAdapter,
}

impl<'a> SchemaBuilder<'a> {
    /// Creates a builder over a catalog.
    pub fn new(catalog: &'a dyn CatalogAdapter) -> Self {
        Self { catalog }
    }

    /// Validates every table of `skeleton`, keeping its session settings.
    pub async fn build(&self, skeleton: SyncSchema) -> SchemaResult<SyncSchema> {
        if !skeleton.has_tables() {
            return Err(SchemaError::InvalidConfiguration(
                "no tables to synchronize".into(),
            ));
        }

        let provider = self.catalog.provider_name().to_string();
        info!(provider = %provider, tables = skeleton.tables.len(), "building schema");

        let tx = self.catalog.begin().await?;
        let mut tables = Vec::with_capacity(skeleton.tables.len());
        let mut declared = Vec::with_capacity(skeleton.tables.len());
        for entry in &skeleton.tables {
            let table = self.validate_table(tx.as_ref(), &entry.name).await?;
            declared.push(tx.list_relations(&table.name).await?);
            tables.push(table);
        }

        // Relations resolve once every table is known, so declaration order
        // between parents and children does not matter.
        let resolved: Vec<Vec<Relation>> = tables
            .iter()
            .zip(&declared)
            .map(|(table, relations)| resolve_relations(table, relations, &tables))
            .collect::<SchemaResult<_>>()?;
        for (table, relations) in tables.iter_mut().zip(resolved) {
            table.relations = relations;
        }

        tx.commit().await?;

        Ok(SyncSchema {
            tables,
            provider: Some(provider),
            ..skeleton
        })
    }

    async fn validate_table(
        &self,
        tx: &dyn CatalogTransaction,
        name: &str,
    ) -> SchemaResult<Table> {
        let keys = tx.list_primary_keys(name).await?;
        if keys.is_empty() {
            return Err(SchemaError::missing_primary_key(
                name,
                "a table without a primary key cannot be synchronized",
            ));
        }

        let mut natives = tx.list_columns(name).await?;
        if natives.is_empty() {
            return Err(SchemaError::empty_table(name, "no columns"));
        }
        let is_key = |column: &str| keys.iter().any(|k| k.eq_ignore_ascii_case(column));
        if natives.iter().all(|c| is_key(&c.name)) {
            return Err(SchemaError::empty_table(
                name,
                "every column is part of the primary key",
            ));
        }

        natives.sort_by_key(|c| c.ordinal);
        let metadata = self.catalog.metadata();
        let columns = natives
            .iter()
            .enumerate()
            .map(|(ordinal, native)| validate_column(metadata, name, native, ordinal))
            .collect::<SchemaResult<Vec<_>>>()?;

        let mut table = Table::named(name);
        table.columns = columns;
        table.primary_key = keys
            .iter()
            .map(|key| {
                table
                    .column(key)
                    .map(|c| c.name.clone())
                    .ok_or_else(|| {
                        SchemaError::missing_primary_key(
                            name,
                            format!("key column {key} is not present in the columns list"),
                        )
                    })
            })
            .collect::<SchemaResult<_>>()?;

        debug!(
            table = %name,
            columns = table.columns.len(),
            keys = table.primary_key.len(),
            "table validated"
        );
        Ok(table)
    }
}

fn resolve_relations(
    table: &Table,
    declared: &[NativeRelation],
    tables: &[Table],
) -> SchemaResult<Vec<Relation>> {
    let mut relations = Vec::new();
    for relation in declared {
        let Some(parent) = tables.iter().find(|t| t.is_named(&relation.parent_table)) else {
            debug!(
                table = %table.name,
                relation = %relation.name,
                parent = %relation.parent_table,
                "parent table is not synchronized, relation skipped"
            );
            continue;
        };

        let unsupported = |reason: String| SchemaError::UnsupportedRelation {
            relation: relation.name.clone(),
            table: table.name.clone(),
            reason,
        };
        let child_column = table.column(&relation.column).ok_or_else(|| {
            unsupported(format!("column {} not found in {}", relation.column, table.name))
        })?;
        let parent_column = parent.column(&relation.parent_column).ok_or_else(|| {
            unsupported(format!(
                "column {} not found in {}",
                relation.parent_column, parent.name
            ))
        })?;

        relations.push(Relation {
            name: relation.name.clone(),
            child_table: table.name.clone(),
            child_column: child_column.name.clone(),
            parent_table: parent.name.clone(),
            parent_column: parent_column.name.clone(),
        });
    }
    Ok(relations)
}
