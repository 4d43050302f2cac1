//! Main sync server.

use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use crate::handler::RequestHandler;
use async_trait::async_trait;
use rowsync_engine::{LoopbackServer, SyncProvider, SyncStore};
use rowsync_protocol::{
    decode, encode, SerializationFormat, SyncContext, SyncRequest, SyncResponse,
};
use tracing::warn;
use uuid::Uuid;

/// The sync server.
///
/// This server answers session requests from clients. Every failure is
/// turned into an error envelope on the response, and the failing session
/// is dropped.
///
/// # Example
///
/// ```rust,ignore
/// use rowsync_engine::{SyncOptions, SyncProvider};
/// use rowsync_server::{ServerConfig, SyncServer};
///
/// let config = ServerConfig::new(SyncOptions::new(["Customer", "SalesOrder"]));
/// let server = SyncServer::new(config, SyncProvider::new(store))?;
///
/// // In a real application, you would expose an HTTP endpoint
/// // that calls server.handle_post()
/// ```
pub struct SyncServer<S: SyncStore> {
    handler: RequestHandler<S>,
}

impl<S: SyncStore> SyncServer<S> {
    /// Creates a new sync server.
    pub fn new(config: ServerConfig, provider: SyncProvider<S>) -> ServerResult<Self> {
        config.options.validate()?;
        Ok(Self {
            handler: RequestHandler::new(config, provider),
        })
    }

    /// The server's provider.
    pub fn provider(&self) -> &SyncProvider<S> {
        self.handler.provider()
    }

    /// Number of sessions in flight.
    pub fn active_sessions(&self) -> usize {
        self.handler.active_sessions()
    }

    /// Handles one decoded request.
    pub async fn handle(&self, format: SerializationFormat, request: SyncRequest) -> SyncResponse {
        let context = request.context.clone();
        match self.handler.handle(format, request).await {
            Ok(response) => response,
            Err(e) => {
                warn!(
                    session = %context.session_id,
                    stage = %context.stage,
                    error = %e,
                    "request failed"
                );
                self.handler.abort(context.session_id).await;
                SyncResponse::error(context, e.to_envelope())
            }
        }
    }

    /// Handles a raw POST body.
    ///
    /// The content type selects the serialization format; an empty one means
    /// the configured default. Bodies that cannot be decoded are answered
    /// with an error envelope under an empty context.
    pub async fn handle_post(&self, content_type: &str, body: &[u8]) -> ServerResult<Vec<u8>> {
        let format = if content_type.trim().is_empty() {
            self.handler.config().default_format
        } else {
            SerializationFormat::from_content_type(content_type)
                .ok_or_else(|| ServerError::UnsupportedContentType(content_type.to_string()))?
        };

        let response = match decode::<SyncRequest>(format, body) {
            Ok(request) => self.handle(format, request).await,
            Err(e) => {
                warn!(error = %e, "undecodable request");
                let mut context = SyncContext::new(Uuid::nil(), "");
                context.session_id = Uuid::nil();
                SyncResponse::error(context, ServerError::from(e).to_envelope())
            }
        };
        Ok(encode(format, &response)?)
    }
}

#[async_trait]
impl<S: SyncStore> LoopbackServer for SyncServer<S> {
    async fn handle_post(&self, content_type: &str, body: &[u8]) -> Result<Vec<u8>, String> {
        SyncServer::handle_post(self, content_type, body)
            .await
            .map_err(|e| e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rowsync_engine::{MemoryStore, SyncOptions};
    use rowsync_protocol::{RequestPayload, ResponsePayload, Value};
    use rowsync_schema::{NativeColumn, TableDefinition};
    use std::sync::Arc;

    fn server_with(options: SyncOptions) -> SyncServer<MemoryStore> {
        let store = MemoryStore::sqlite(vec![TableDefinition::new("Customer")
            .column(NativeColumn::new("CustomerID", "integer"))
            .column(NativeColumn::new("Name", "text"))
            .primary_key("CustomerID")]);
        SyncServer::new(
            ServerConfig::new(options).with_session_capacity(1),
            SyncProvider::new(Arc::new(store)),
        )
        .unwrap()
    }

    fn server() -> SyncServer<MemoryStore> {
        server_with(SyncOptions::new(["Customer"]))
    }

    fn request(context: &SyncContext, payload: RequestPayload) -> SyncRequest {
        SyncRequest::new(context.clone(), payload)
    }

    #[tokio::test]
    async fn session_lifecycle() {
        let server = server();
        let context = SyncContext::new(Uuid::new_v4(), "DefaultScope");
        let json = SerializationFormat::Json;

        let response = server
            .handle(json, request(&context, RequestPayload::EnsureScopes))
            .await;
        assert!(matches!(response.payload, ResponsePayload::Scopes { .. }));
        assert_eq!(server.active_sessions(), 1);

        let response = server
            .handle(json, request(&context, RequestPayload::GetConfiguration))
            .await;
        let ResponsePayload::Configuration(schema) = response.payload else {
            panic!("expected a configuration");
        };
        assert!(schema.has_columns());

        let response = server
            .handle(json, request(&context, RequestPayload::GetChanges { index: 0 }))
            .await;
        assert!(matches!(
            response.payload,
            ResponsePayload::Changes { batch: None, batch_count: 0, .. }
        ));

        let response = server
            .handle(json, request(&context, RequestPayload::WriteScopes))
            .await;
        assert!(matches!(response.payload, ResponsePayload::ScopesWritten { .. }));
        assert_eq!(server.active_sessions(), 0);
    }

    #[tokio::test]
    async fn unknown_sessions_are_rejected() {
        let server = server();
        let context = SyncContext::new(Uuid::new_v4(), "DefaultScope");
        let response = server
            .handle(
                SerializationFormat::Json,
                request(&context, RequestPayload::GetConfiguration),
            )
            .await;
        assert_eq!(response.as_error().unwrap().type_name, "ProtocolError");
    }

    #[tokio::test]
    async fn failures_drop_the_session() {
        let server = server();
        let context = SyncContext::new(Uuid::new_v4(), "DefaultScope");
        server
            .handle(SerializationFormat::Json, request(&context, RequestPayload::EnsureScopes))
            .await;

        let response = server
            .handle(
                SerializationFormat::Binary,
                request(&context, RequestPayload::GetConfiguration),
            )
            .await;
        assert!(response.as_error().unwrap().message.contains("session speaks json"));
        assert_eq!(server.active_sessions(), 0);
    }

    #[tokio::test]
    async fn capacity_is_enforced() {
        let server = server();
        for expected in [None, Some("ServerBusyError")] {
            let context = SyncContext::new(Uuid::new_v4(), "DefaultScope");
            let response = server
                .handle(SerializationFormat::Json, request(&context, RequestPayload::EnsureScopes))
                .await;
            assert_eq!(response.as_error().map(|e| e.type_name.as_str()), expected);
        }
    }

    #[tokio::test]
    async fn garbage_bodies_get_an_envelope() {
        let server = server();
        let body = server.handle_post("application/json", b"{not json").await.unwrap();
        let response: SyncResponse = decode(SerializationFormat::Json, &body).unwrap();
        assert_eq!(response.context.session_id, Uuid::nil());
        assert_eq!(response.as_error().unwrap().type_name, "CodecError");

        let err = server.handle_post("text/plain", b"").await.unwrap_err();
        assert!(err.is_client_error());
    }

    #[tokio::test]
    async fn missing_content_type_uses_the_default_format() {
        let server = server();
        let context = SyncContext::new(Uuid::new_v4(), "DefaultScope");
        let body = encode(
            SerializationFormat::Json,
            &request(&context, RequestPayload::EnsureScopes),
        )
        .unwrap();
        let body = server.handle_post("", &body).await.unwrap();
        let response: SyncResponse = decode(SerializationFormat::Json, &body).unwrap();
        assert!(response.as_error().is_none());
        assert_eq!(server.active_sessions(), 1);
    }

    #[tokio::test]
    async fn failed_spool_cleanup_still_drops_the_session() {
        let dir = rowsync_testkit::temp_dir();
        let server = server_with(
            SyncOptions::new(["Customer"])
                .with_batch_directory(dir.path())
                .with_batch_size(1)
                .with_in_memory_batches(1),
        );
        for id in 1..=3 {
            server
                .provider()
                .store()
                .insert("Customer", vec![Value::from(id), Value::from("Ada")])
                .unwrap();
        }

        let context = SyncContext::new(Uuid::new_v4(), "DefaultScope");
        let json = SerializationFormat::Json;
        for payload in [
            RequestPayload::EnsureScopes,
            RequestPayload::GetConfiguration,
            RequestPayload::GetChanges { index: 0 },
        ] {
            let response = server.handle(json, request(&context, payload)).await;
            assert!(response.as_error().is_none());
        }

        // a file where the session's spool directory was makes cleanup fail
        let spool = dir.path().join(context.session_id.to_string());
        std::fs::remove_dir_all(&spool).unwrap();
        std::fs::write(&spool, b"in the way").unwrap();

        let response = server
            .handle(
                SerializationFormat::Binary,
                request(&context, RequestPayload::GetChanges { index: 1 }),
            )
            .await;
        assert!(response.as_error().is_some());
        assert_eq!(server.active_sessions(), 0);
        assert!(spool.is_file());
    }
}
