//! Request handlers for each session stage.

use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use parking_lot::RwLock;
use rowsync_engine::{BatchSet, ChangeWindow, Observation, SyncError, SyncProvider, SyncStore};
use rowsync_protocol::{
    RequestPayload, ResponsePayload, ScopeInfo, SerializationFormat, SyncContext, SyncRequest,
    SyncResponse, SyncRole, Watermark,
};
use rowsync_schema::SyncSchema;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Server-side state of one client session.
struct ServerSession {
    format: SerializationFormat,
    client_scope: ScopeInfo,
    schema: Option<SyncSchema>,
    downloads: Option<BatchSet>,
    snapshot: Option<Watermark>,
    uploaded: u64,
    downloaded: u64,
    conflicts: u64,
}

impl ServerSession {
    fn schema(&self) -> ServerResult<&SyncSchema> {
        self.schema.as_ref().ok_or_else(|| {
            ServerError::InvalidRequest("configuration was not fetched in this session".into())
        })
    }

    /// Echoes the request context with the session's running counters.
    fn context(&self, mut context: SyncContext) -> SyncContext {
        context.total_changes_uploaded = self.uploaded;
        context.total_changes_downloaded = self.downloaded;
        context.total_sync_conflicts = self.conflicts;
        context
    }
}

/// Handler for session requests.
///
/// Requests of one session are served one at a time; different sessions
/// proceed concurrently.
pub struct RequestHandler<S: SyncStore> {
    config: ServerConfig,
    provider: SyncProvider<S>,
    sessions: RwLock<HashMap<Uuid, Arc<Mutex<ServerSession>>>>,
}

impl<S: SyncStore> RequestHandler<S> {
    /// Creates a new request handler.
    pub fn new(config: ServerConfig, provider: SyncProvider<S>) -> Self {
        Self {
            config,
            provider,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// The server's provider.
    pub fn provider(&self) -> &SyncProvider<S> {
        &self.provider
    }

    /// The server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Number of sessions in flight.
    pub fn active_sessions(&self) -> usize {
        self.sessions.read().len()
    }

    /// Drops a session and its spooled batches.
    pub async fn abort(&self, session_id: Uuid) {
        let removed = self.sessions.write().remove(&session_id);
        if let Some(session) = removed {
            if let Some(downloads) = session.lock().await.downloads.take() {
                if let Err(e) = downloads.cleanup().await {
                    warn!(session = %session_id, error = %e, "spool cleanup failed");
                }
            }
            debug!(session = %session_id, "session dropped");
        }
    }

    /// Serves one request received in `format`.
    pub async fn handle(
        &self,
        format: SerializationFormat,
        request: SyncRequest,
    ) -> ServerResult<SyncResponse> {
        let SyncRequest { context, payload } = request;
        if context.stage != payload.stage() {
            return Err(ServerError::InvalidRequest(format!(
                "request tagged {} carries a {} payload",
                context.stage,
                payload.stage()
            )));
        }

        if let RequestPayload::EnsureScopes = payload {
            return self.ensure_scopes(format, context).await;
        }

        let session = self
            .sessions
            .read()
            .get(&context.session_id)
            .cloned()
            .ok_or(ServerError::UnknownSession(context.session_id))?;
        let mut session = session.lock().await;
        if session.format != format {
            return Err(ServerError::FormatMismatch {
                expected: session.format,
                actual: format,
            });
        }

        let payload = match payload {
            RequestPayload::EnsureScopes => {
                return Err(ServerError::InvalidRequest(format!(
                    "session {} already started",
                    context.session_id
                )))
            }
            RequestPayload::GetConfiguration => {
                self.get_configuration(&mut session, &context).await?
            }
            RequestPayload::ApplyChanges { batch } => {
                if batch.len() > self.config.max_upload_batch {
                    return Err(ServerError::InvalidRequest(format!(
                        "batch of {} changes exceeds the limit of {}",
                        batch.len(),
                        self.config.max_upload_batch
                    )));
                }
                let observation = Observation {
                    last_observed: session.client_scope.since(),
                    remote_scope: context.scope_id,
                    role: SyncRole::Server,
                };
                let report = self
                    .provider
                    .apply_changes(session.schema()?, &batch, &observation)
                    .await?;
                session.uploaded += batch.len() as u64;
                session.conflicts += report.conflicts;
                ResponsePayload::ChangesApplied {
                    applied: report.applied,
                    conflicts: report.conflicts,
                }
            }
            RequestPayload::GetChanges { index } => {
                self.get_changes(&mut session, &context, index).await?
            }
            RequestPayload::WriteScopes => {
                let server_watermark = match session.snapshot {
                    Some(snapshot) => snapshot,
                    None => self.provider.current_watermark().await?,
                };
                session.client_scope.last_sync = Some(server_watermark);
                self.provider.write_scope(&session.client_scope).await?;
                if let Some(downloads) = session.downloads.take() {
                    downloads.cleanup().await?;
                }
                info!(
                    session = %context.session_id,
                    client = %context.scope_id,
                    uploaded = session.uploaded,
                    downloaded = session.downloaded,
                    conflicts = session.conflicts,
                    "session completed"
                );
                self.sessions.write().remove(&context.session_id);
                ResponsePayload::ScopesWritten { server_watermark }
            }
        };

        Ok(SyncResponse::new(session.context(context), payload))
    }

    async fn ensure_scopes(
        &self,
        format: SerializationFormat,
        context: SyncContext,
    ) -> ServerResult<SyncResponse> {
        if context.scope_name != self.config.scope_name() {
            return Err(ServerError::InvalidRequest(format!(
                "unknown scope {}",
                context.scope_name
            )));
        }

        let server_scope = self.provider.ensure_local_scope(self.config.scope_name()).await?;
        let client_scope = self
            .provider
            .load_remote_scope(context.scope_id, &context.scope_name)
            .await?;
        let session = ServerSession {
            format,
            client_scope,
            schema: None,
            downloads: None,
            snapshot: None,
            uploaded: 0,
            downloaded: 0,
            conflicts: 0,
        };

        {
            let mut sessions = self.sessions.write();
            if sessions.contains_key(&context.session_id) {
                return Err(ServerError::InvalidRequest(format!(
                    "session {} already started",
                    context.session_id
                )));
            }
            if sessions.len() >= self.config.session_capacity {
                return Err(ServerError::TooManySessions(self.config.session_capacity));
            }
            sessions.insert(context.session_id, Arc::new(Mutex::new(session)));
        }
        debug!(
            session = %context.session_id,
            client = %context.scope_id,
            format = %format,
            "session started"
        );
        Ok(SyncResponse::new(
            context,
            ResponsePayload::Scopes { server_scope },
        ))
    }

    async fn get_configuration(
        &self,
        session: &mut ServerSession,
        context: &SyncContext,
    ) -> ServerResult<ResponsePayload> {
        let skeleton = self.config.options.to_schema()?;
        let mut schema = self
            .provider
            .ensure_configuration(context, Some(skeleton))
            .await?;
        self.config.options.apply_local_settings(&mut schema);
        self.provider.ensure_schema(&schema).await?;
        session.schema = Some(schema.clone());
        Ok(ResponsePayload::Configuration(schema))
    }

    async fn get_changes(
        &self,
        session: &mut ServerSession,
        context: &SyncContext,
        index: usize,
    ) -> ServerResult<ResponsePayload> {
        if session.downloads.is_none() {
            if index != 0 {
                return Err(ServerError::InvalidRequest(format!(
                    "batch {index} requested before selection"
                )));
            }
            let snapshot = self.provider.current_watermark().await?;
            let window = ChangeWindow::for_scope(&session.client_scope)
                .until(snapshot)
                .excluding(context.scope_id);
            let downloads = self
                .provider
                .select_changes(context.session_id, session.schema()?, window)
                .await?;
            session.snapshot = Some(snapshot);
            session.downloads = Some(downloads);
        }

        let (Some(downloads), Some(server_watermark)) = (&session.downloads, session.snapshot)
        else {
            return Err(SyncError::protocol("download set missing").into());
        };
        let batch_count = downloads.len();
        let batch = if batch_count == 0 && index == 0 {
            None
        } else {
            Some(downloads.get(index).await?)
        };
        session.downloaded += batch.as_ref().map_or(0, |b| b.len() as u64);
        Ok(ResponsePayload::Changes {
            batch,
            batch_count,
            server_watermark,
        })
    }
}
