//! Sync session state machine.
//!
//! This module implements the client side of a session. The agent walks
//! the stages in order:
//!
//! ```text
//! None → ScopeLoading → ConfigurationApplying → SchemaEnsured
//!      → ChangesSelecting → ChangesApplying → ScopeWriting → Completed
//! ```
//!
//! Any stage may end in `Failed`; the error that escapes is tagged with
//! the stage it was raised in.

use crate::batch::BatchSet;
use crate::config::SyncOptions;
use crate::error::{SyncError, SyncResult};
use crate::provider::SyncProvider;
use crate::resolver::Observation;
use crate::store::SyncStore;
use crate::tracker::ChangeWindow;
use crate::transport::SyncTransport;
use parking_lot::RwLock;
use rowsync_protocol::{
    RequestPayload, ResponsePayload, ScopeInfo, SyncContext, SyncRequest, SyncRole, SyncStage,
    Watermark,
};
use rowsync_schema::SyncSchema;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Statistics about sync operations.
#[derive(Debug, Clone, Default)]
pub struct SyncStats {
    /// Sessions completed successfully.
    pub sessions_completed: u64,
    /// Total changes uploaded.
    pub changes_uploaded: u64,
    /// Total changes downloaded.
    pub changes_downloaded: u64,
    /// Total conflicts encountered.
    pub conflicts_encountered: u64,
    /// Last successful sync time.
    pub last_sync_time: Option<Instant>,
    /// Last error message.
    pub last_error: Option<String>,
}

/// Result of one completed session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncSessionResult {
    /// Session identifier.
    pub session_id: Uuid,
    /// Changes sent to the server.
    pub total_changes_uploaded: u64,
    /// Changes received from the server.
    pub total_changes_downloaded: u64,
    /// Conflicts detected on either peer.
    pub total_sync_conflicts: u64,
    /// The local scope's new watermark.
    pub watermark: Watermark,
    /// Wall time of the session.
    pub duration: Duration,
}

/// A shareable cancellation flag.
///
/// Cancelling aborts the running session before its next batch is sent or
/// applied. Batches already applied stay applied.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle(Arc<AtomicBool>);

impl CancelHandle {
    /// Creates a handle that is not cancelled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Returns true if cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// The client-side session driver.
///
/// One agent synchronizes one local store with one server, one session at
/// a time.
pub struct SyncAgent<S: SyncStore, T: SyncTransport> {
    options: SyncOptions,
    provider: SyncProvider<S>,
    transport: T,
    state: RwLock<SyncStage>,
    stats: RwLock<SyncStats>,
    cancel: CancelHandle,
}

/// Per-session working state.
struct Session {
    context: SyncContext,
    local_scope: ScopeInfo,
    server_scope: Option<ScopeInfo>,
    schema: Option<SyncSchema>,
    snapshot: Watermark,
    uploads: Option<BatchSet>,
    uploaded: u64,
    downloaded: u64,
    local_conflicts: u64,
}

impl<S: SyncStore, T: SyncTransport> SyncAgent<S, T> {
    /// Creates a new agent.
    pub fn new(options: SyncOptions, provider: SyncProvider<S>, transport: T) -> Self {
        Self {
            options,
            provider,
            transport,
            state: RwLock::new(SyncStage::None),
            stats: RwLock::new(SyncStats::default()),
            cancel: CancelHandle::new(),
        }
    }

    /// Shares `handle` as this agent's cancellation flag.
    #[must_use]
    pub fn with_cancel_handle(mut self, handle: CancelHandle) -> Self {
        self.cancel = handle;
        self
    }

    /// Returns the current stage.
    pub fn state(&self) -> SyncStage {
        *self.state.read()
    }

    /// Returns sync statistics.
    pub fn stats(&self) -> SyncStats {
        self.stats.read().clone()
    }

    /// Returns a copy of the options.
    pub fn options(&self) -> SyncOptions {
        self.options.clone()
    }

    /// The local provider.
    pub fn provider(&self) -> &SyncProvider<S> {
        &self.provider
    }

    /// The transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Returns a handle that cancels this agent's sessions.
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// Requests cancellation of the running session.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    fn check_cancelled(&self) -> SyncResult<()> {
        if self.cancel.is_cancelled() {
            Err(SyncError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Moves to `to`, which must directly follow the current stage.
    fn advance(&self, to: SyncStage) -> SyncResult<()> {
        let mut state = self.state.write();
        let from = *state;
        if from.next() != Some(to) {
            return Err(SyncError::InvalidStateTransition { from, to });
        }
        debug!(from = %from, to = %to, "stage advanced");
        *state = to;
        Ok(())
    }

    /// Runs one synchronization session.
    pub async fn synchronize(&self) -> SyncResult<SyncSessionResult> {
        let current = self.state();
        if !current.can_start_sync() {
            return Err(SyncError::InvalidStateTransition {
                from: current,
                to: SyncStage::ScopeLoading,
            });
        }
        *self.state.write() = SyncStage::None;
        self.cancel.reset();

        let started = Instant::now();
        let options = self.options();
        let mut session = None;
        let outcome = self.run(&options, &mut session).await;

        // spooled upload batches never outlive the session
        if let Some(uploads) = session.as_mut().and_then(|s| s.uploads.take()) {
            if let Err(e) = uploads.cleanup().await {
                warn!(error = %e, "failed to remove spooled batches");
            }
        }

        match outcome {
            Ok(()) => {
                let session = session.ok_or_else(|| SyncError::protocol("session never started"))?;
                let result = SyncSessionResult {
                    session_id: session.context.session_id,
                    total_changes_uploaded: session.uploaded,
                    total_changes_downloaded: session.downloaded,
                    total_sync_conflicts: session.context.total_sync_conflicts
                        + session.local_conflicts,
                    watermark: session.snapshot,
                    duration: started.elapsed(),
                };
                self.record_success(&result);
                info!(
                    session = %result.session_id,
                    uploaded = result.total_changes_uploaded,
                    downloaded = result.total_changes_downloaded,
                    conflicts = result.total_sync_conflicts,
                    "session completed"
                );
                Ok(result)
            }
            Err(e) => Err(self.handle_error(e)),
        }
    }

    async fn run(&self, options: &SyncOptions, slot: &mut Option<Session>) -> SyncResult<()> {
        options.validate()?;
        if self.transport.format() != options.serialization_format {
            return Err(SyncError::InvalidOptions(format!(
                "transport speaks {}, options ask for {}",
                self.transport.format(),
                options.serialization_format
            )));
        }

        // ScopeLoading
        self.advance(SyncStage::ScopeLoading)?;
        let local_scope = self.provider.ensure_local_scope(&options.scope_name).await?;
        let session = slot.insert(Session {
            context: SyncContext::new(local_scope.id, &options.scope_name),
            local_scope,
            server_scope: None,
            schema: None,
            snapshot: Watermark::ZERO,
            uploads: None,
            uploaded: 0,
            downloaded: 0,
            local_conflicts: 0,
        });
        match self.round_trip(session, RequestPayload::EnsureScopes).await? {
            ResponsePayload::Scopes { server_scope } => session.server_scope = Some(server_scope),
            other => return Err(unexpected(SyncStage::ScopeLoading, &other)),
        }

        // ConfigurationApplying
        self.advance(SyncStage::ConfigurationApplying)?;
        let server_schema = match self.round_trip(session, RequestPayload::GetConfiguration).await? {
            ResponsePayload::Configuration(schema) => schema,
            other => return Err(unexpected(SyncStage::ConfigurationApplying, &other)),
        };
        let mut schema = self
            .provider
            .ensure_configuration(&session.context, Some(server_schema))
            .await?;
        options.apply_local_settings(&mut schema);

        // SchemaEnsured
        self.advance(SyncStage::SchemaEnsured)?;
        self.provider.ensure_schema(&schema).await?;
        let schema = session.schema.insert(schema);

        // ChangesSelecting
        self.advance(SyncStage::ChangesSelecting)?;
        let server_id = session
            .server_scope
            .as_ref()
            .map(|s| s.id)
            .ok_or_else(|| SyncError::protocol("server scope unknown"))?;
        session.snapshot = self.provider.current_watermark().await?;
        let window = ChangeWindow::for_scope(&session.local_scope)
            .until(session.snapshot)
            .excluding(server_id);
        let uploads = self
            .provider
            .select_changes(session.context.session_id, schema, window)
            .await?;
        let uploads = session.uploads.insert(uploads);

        // ChangesApplying: upload
        self.advance(SyncStage::ChangesApplying)?;
        let mut uploaded = 0u64;
        for index in 0..uploads.len() {
            self.check_cancelled()?;
            let batch = uploads.get(index).await?;
            let sent = batch.len() as u64;
            match self
                .round_trip_with(&mut session.context, RequestPayload::ApplyChanges { batch })
                .await?
            {
                ResponsePayload::ChangesApplied { .. } => uploaded += sent,
                other => return Err(unexpected(SyncStage::ChangesApplying, &other)),
            }
        }
        session.uploaded = uploaded;

        // ChangesApplying: download
        let observation = Observation {
            last_observed: session.snapshot,
            remote_scope: server_id,
            role: SyncRole::Client,
        };
        let mut index = 0;
        loop {
            self.check_cancelled()?;
            let (batch, batch_count) = match self
                .round_trip(session, RequestPayload::GetChanges { index })
                .await?
            {
                ResponsePayload::Changes {
                    batch, batch_count, ..
                } => (batch, batch_count),
                other => return Err(unexpected(SyncStage::ChangesApplying, &other)),
            };
            if let Some(batch) = batch {
                self.check_cancelled()?;
                let schema = session
                    .schema
                    .as_ref()
                    .ok_or_else(|| SyncError::protocol("configuration missing"))?;
                let report = self.provider.apply_changes(schema, &batch, &observation).await?;
                session.downloaded += batch.len() as u64;
                session.local_conflicts += report.conflicts;
            }
            index += 1;
            if index >= batch_count {
                break;
            }
        }

        // ScopeWriting
        self.advance(SyncStage::ScopeWriting)?;
        let server_watermark = match self.round_trip(session, RequestPayload::WriteScopes).await? {
            ResponsePayload::ScopesWritten { server_watermark } => server_watermark,
            other => return Err(unexpected(SyncStage::ScopeWriting, &other)),
        };
        session.local_scope.last_sync = Some(session.snapshot);
        session.local_scope.last_remote_sync = Some(server_watermark);
        self.provider.write_scope(&session.local_scope).await?;

        self.advance(SyncStage::Completed)?;
        Ok(())
    }

    async fn round_trip(
        &self,
        session: &mut Session,
        payload: RequestPayload,
    ) -> SyncResult<ResponsePayload> {
        self.round_trip_with(&mut session.context, payload).await
    }

    /// Sends one request and unwraps the response.
    ///
    /// The server's running counters are copied into `context`.
    async fn round_trip_with(
        &self,
        context: &mut SyncContext,
        payload: RequestPayload,
    ) -> SyncResult<ResponsePayload> {
        let request = SyncRequest::new(context.clone(), payload);
        let response = self.transport.send(request).await?;
        if let Some(envelope) = response.as_error() {
            return Err(SyncError::Remote(envelope.clone()));
        }
        context.total_changes_uploaded = response.context.total_changes_uploaded;
        context.total_changes_downloaded = response.context.total_changes_downloaded;
        context.total_sync_conflicts = response.context.total_sync_conflicts;
        Ok(response.payload)
    }

    fn record_success(&self, result: &SyncSessionResult) {
        let mut stats = self.stats.write();
        stats.sessions_completed += 1;
        stats.changes_uploaded += result.total_changes_uploaded;
        stats.changes_downloaded += result.total_changes_downloaded;
        stats.conflicts_encountered += result.total_sync_conflicts;
        stats.last_sync_time = Some(Instant::now());
        stats.last_error = None;
    }

    /// Handles an error by updating state and stats.
    fn handle_error(&self, error: SyncError) -> SyncError {
        let stage = {
            let mut state = self.state.write();
            let stage = *state;
            *state = SyncStage::Failed;
            stage
        };
        let error = error.staged(stage, self.provider.provider_name());
        warn!(stage = %stage, error = %error, "session failed");
        self.stats.write().last_error = Some(error.to_string());
        error
    }
}

fn unexpected(stage: SyncStage, payload: &ResponsePayload) -> SyncError {
    SyncError::protocol(format!("unexpected response during {stage}: {payload:?}"))
}
