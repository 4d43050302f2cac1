//! Per-peer facade over a datastore and its configuration cache.

use crate::batch::{BatchBuilder, BatchSet};
use crate::config_store::{ConfigurationStore, MemoryConfigurationStore};
use crate::error::{SyncError, SyncResult};
use crate::resolver::{ConflictHandler, ConflictResolver, Observation};
use crate::store::{Selection, StoreError, SyncStore};
use crate::tracker::{ChangeTracker, ChangeWindow};
use rowsync_protocol::{Batch, ScopeInfo, SyncContext, SyncStage, Watermark};
use rowsync_schema::{SchemaBuilder, SyncSchema, Table};
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

/// Called before a configuration is applied. Returning `true` discards the
/// cached configuration and rebuilds it from the catalog.
pub type ConfigurationApplyingHook = Arc<dyn Fn(&SyncContext) -> bool + Send + Sync>;

/// Counts from applying one batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ApplyReport {
    /// Rows written.
    pub applied: u64,
    /// Conflicts detected.
    pub conflicts: u64,
}

/// Everything one peer needs to take part in a session.
///
/// Both the client agent and the server handler drive their datastore
/// through a provider.
pub struct SyncProvider<S: SyncStore> {
    store: Arc<S>,
    config_store: Arc<dyn ConfigurationStore>,
    conflict_handler: Option<ConflictHandler>,
    configuration_applying: Option<ConfigurationApplyingHook>,
}

impl<S: SyncStore> SyncProvider<S> {
    /// Creates a provider with an in-memory configuration cache.
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            config_store: Arc::new(MemoryConfigurationStore::new()),
            conflict_handler: None,
            configuration_applying: None,
        }
    }

    /// Uses `config_store` to cache the configuration.
    #[must_use]
    pub fn with_configuration_store(mut self, config_store: Arc<dyn ConfigurationStore>) -> Self {
        self.config_store = config_store;
        self
    }

    /// Routes detected conflicts through `handler`.
    #[must_use]
    pub fn with_conflict_handler(mut self, handler: ConflictHandler) -> Self {
        self.conflict_handler = Some(handler);
        self
    }

    /// Installs the configuration-applying hook.
    #[must_use]
    pub fn on_configuration_applying(mut self, hook: ConfigurationApplyingHook) -> Self {
        self.configuration_applying = Some(hook);
        self
    }

    /// The datastore.
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Provider name.
    pub fn provider_name(&self) -> &str {
        self.store.provider_name()
    }

    /// Loads the local scope named `name`, creating it on first use.
    pub async fn ensure_local_scope(&self, name: &str) -> SyncResult<ScopeInfo> {
        let scopes = self.store.load_scopes().await?;
        if let Some(scope) = scopes.into_iter().find(|s| s.is_local && s.name == name) {
            return Ok(scope);
        }
        let scope = ScopeInfo::new_local(name);
        self.store.save_scope(&scope).await?;
        info!(scope = %name, id = %scope.id, "local scope created");
        Ok(scope)
    }

    /// Loads the record this peer keeps about a remote scope.
    ///
    /// An unknown scope gets a fresh record; it is saved by
    /// [`write_scope`](Self::write_scope) once a session completes.
    pub async fn load_remote_scope(&self, id: Uuid, name: &str) -> SyncResult<ScopeInfo> {
        let scopes = self.store.load_scopes().await?;
        Ok(scopes
            .into_iter()
            .find(|s| !s.is_local && s.id == id)
            .unwrap_or_else(|| ScopeInfo::new_remote(id, name)))
    }

    /// Persists a scope record.
    pub async fn write_scope(&self, scope: &ScopeInfo) -> SyncResult<()> {
        self.store.save_scope(scope).await?;
        Ok(())
    }

    /// Injects a configuration, replacing the cached one.
    pub async fn set_configuration(&self, schema: SyncSchema) -> SyncResult<()> {
        if !schema.has_tables() {
            return Err(SyncError::MissingConfiguration(
                "configuration has no tables".into(),
            ));
        }
        self.config_store.set(&schema).await
    }

    /// The cached configuration, if any.
    pub async fn configuration(&self) -> SyncResult<Option<SyncSchema>> {
        self.config_store.get().await
    }

    /// Builds a full configuration from the local catalog.
    pub async fn read_configuration(&self, skeleton: SyncSchema) -> SyncResult<SyncSchema> {
        Ok(SchemaBuilder::new(self.store.catalog()).build(skeleton).await?)
    }

    /// Returns the configuration to run the session with, caching it.
    ///
    /// A cached configuration wins over `provided` unless the
    /// configuration-applying hook requests an overwrite.
    pub async fn ensure_configuration(
        &self,
        context: &SyncContext,
        provided: Option<SyncSchema>,
    ) -> SyncResult<SyncSchema> {
        self.apply_configuration(context, provided)
            .await
            .map_err(|e| e.staged(SyncStage::ConfigurationApplying, self.provider_name()))
    }

    async fn apply_configuration(
        &self,
        context: &SyncContext,
        provided: Option<SyncSchema>,
    ) -> SyncResult<SyncSchema> {
        let cached = self.config_store.get().await?;
        let overwrite = self
            .configuration_applying
            .as_ref()
            .map_or(false, |hook| hook(context));

        if let Some(cached) = &cached {
            if !overwrite {
                self.config_store.set(cached).await?;
                debug!(scope = %context.scope_name, "cached configuration reused");
                return Ok(cached.clone());
            }
        }

        let mut target = provided.or(cached).ok_or_else(|| {
            SyncError::MissingConfiguration(format!(
                "no configuration for scope {}",
                context.scope_name
            ))
        })?;
        if overwrite {
            for table in &mut target.tables {
                *table = Table::named(table.name.clone());
            }
        }

        if let Some(dir) = &target.batch_directory {
            tokio::fs::create_dir_all(dir).await?;
        }

        let schema = if target.has_tables() && !target.has_columns() {
            self.read_configuration(target).await?
        } else {
            target
        };
        if !schema.has_tables() {
            return Err(SyncError::MissingConfiguration(
                "configuration has no tables".into(),
            ));
        }

        self.config_store.set(&schema).await?;
        info!(
            scope = %context.scope_name,
            tables = schema.tables.len(),
            overwrite,
            "configuration applied"
        );
        Ok(schema)
    }

    /// Verifies the local tables against the configuration.
    pub async fn ensure_schema(&self, schema: &SyncSchema) -> SyncResult<()> {
        self.store.ensure_tables(schema).await?;
        Ok(())
    }

    /// The local watermark.
    pub async fn current_watermark(&self) -> SyncResult<Watermark> {
        Ok(self.store.current_watermark().await?)
    }

    /// Selects every change in the window into batches.
    ///
    /// Live rows come parents first, tombstones children first.
    pub async fn select_changes(
        &self,
        session_id: Uuid,
        schema: &SyncSchema,
        window: ChangeWindow,
    ) -> SyncResult<BatchSet> {
        let store: &dyn SyncStore = self.store.as_ref();
        let tracker = ChangeTracker::new(store, schema.batch_size);
        let mut builder = BatchBuilder::for_session(schema, session_id);

        let ordered = schema.ordered_tables();
        let mut selected = 0;
        for &table in &ordered {
            selected += builder
                .append(tracker.cursor(table, window, Selection::LiveOnly))
                .await?;
        }
        builder.seal().await?;
        for &table in ordered.iter().rev() {
            selected += builder
                .append(tracker.cursor(table, window, Selection::TombstonesOnly))
                .await?;
        }

        let batches = builder.finish().await?;
        debug!(
            since = %window.since,
            changes = selected,
            batches = batches.len(),
            "changes selected"
        );
        Ok(batches)
    }

    /// Applies one batch of remote changes atomically.
    pub async fn apply_changes(
        &self,
        schema: &SyncSchema,
        batch: &Batch,
        observation: &Observation,
    ) -> SyncResult<ApplyReport> {
        let table = schema.table(&batch.table).ok_or_else(|| {
            SyncError::protocol(format!("batch for unknown table {}", batch.table))
        })?;
        let resolver = ConflictResolver::new(schema.conflict_policy)
            .with_handler(self.conflict_handler.clone());

        let mut report = ApplyReport::default();
        let mut writes = Vec::with_capacity(batch.len());
        for change in &batch.changes {
            if change.key.len() != table.primary_key.len()
                || (!change.is_tombstone() && change.values.len() != table.columns.len())
            {
                return Err(StoreError::RowShape {
                    table: table.name.clone(),
                    expected: table.columns.len(),
                    actual: change.values.len(),
                }
                .into());
            }

            let local = self
                .store
                .get_row(table, &change.key)
                .await?
                .map(|row| row.to_change(observation.last_observed));
            let resolution = resolver.resolve(&table.name, local.as_ref(), change, observation);
            if resolution.is_conflict() {
                report.conflicts += 1;
            }
            writes.extend(resolution.write);
        }

        report.applied = self.store.apply_writes(table, writes).await? as u64;
        debug!(
            table = %table.name,
            index = batch.index,
            received = batch.len(),
            applied = report.applied,
            conflicts = report.conflicts,
            "batch applied"
        );
        Ok(report)
    }
}
