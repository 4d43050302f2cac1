//! Session requests over HTTP POST.
//!
//! Every request is posted to [`SYNC_ENDPOINT`] with a body in the session's
//! serialization format. The HTTP stack itself sits behind [`HttpClient`].

use crate::error::{SyncError, SyncResult};
use crate::transport::SyncTransport;
use async_trait::async_trait;
use parking_lot::RwLock;
use rowsync_protocol::{decode, encode, SerializationFormat, SyncRequest, SyncResponse};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::warn;

/// Path every session request is posted to.
pub const SYNC_ENDPOINT: &str = "/sync";

/// The POST primitive a transport needs from an HTTP stack.
#[async_trait]
pub trait HttpClient: Send + Sync {
    /// Posts `body` to `url` and returns the response body.
    async fn post(&self, url: &str, content_type: &str, body: Vec<u8>) -> Result<Vec<u8>, String>;

    /// Returns false once the client can no longer reach the server.
    fn is_healthy(&self) -> bool;
}

/// Sends session requests as POST bodies.
///
/// Bodies are encoded in the transport's serialization format, announced
/// through the content type. A failed POST marks the transport
/// disconnected.
pub struct HttpTransport<C: HttpClient> {
    base_url: String,
    client: C,
    format: SerializationFormat,
    connected: AtomicBool,
    last_error: RwLock<Option<String>>,
}

impl<C: HttpClient> HttpTransport<C> {
    /// Creates a transport posting to `base_url` in `format`.
    pub fn new(base_url: impl Into<String>, client: C, format: SerializationFormat) -> Self {
        Self {
            base_url: base_url.into(),
            client,
            format,
            connected: AtomicBool::new(true),
            last_error: RwLock::new(None),
        }
    }

    /// Returns the base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// The failure of the last POST, cleared by the next success.
    pub fn last_error(&self) -> Option<String> {
        self.last_error.read().clone()
    }

    fn url(&self) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), SYNC_ENDPOINT)
    }
}

#[async_trait]
impl<C: HttpClient> SyncTransport for HttpTransport<C> {
    fn format(&self) -> SerializationFormat {
        self.format
    }

    async fn send(&self, request: SyncRequest) -> SyncResult<SyncResponse> {
        if !self.is_connected() {
            return Err(SyncError::NotConnected);
        }

        let body = encode(self.format, &request)?;
        let response_body = match self
            .client
            .post(&self.url(), self.format.content_type(), body)
            .await
        {
            Ok(body) => body,
            Err(e) => {
                warn!(url = %self.url(), error = %e, "sync request failed");
                *self.last_error.write() = Some(e.clone());
                self.connected.store(false, Ordering::SeqCst);
                return Err(SyncError::transport_retryable(e));
            }
        };
        *self.last_error.write() = None;

        decode(self.format, &response_body)
            .map_err(|e| SyncError::protocol(format!("failed to decode response: {e}")))
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst) && self.client.is_healthy()
    }

    fn close(&self) -> SyncResult<()> {
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }
}

/// A server that accepts raw POST bodies in-process.
#[async_trait]
pub trait LoopbackServer: Send + Sync {
    /// Handles a POST body of the given content type and returns the
    /// response body.
    async fn handle_post(&self, content_type: &str, body: &[u8]) -> Result<Vec<u8>, String>;
}

#[async_trait]
impl<T: LoopbackServer + ?Sized> LoopbackServer for Arc<T> {
    async fn handle_post(&self, content_type: &str, body: &[u8]) -> Result<Vec<u8>, String> {
        (**self).handle_post(content_type, body).await
    }
}

/// An [`HttpClient`] that hands bodies straight to an in-process server.
pub struct LoopbackClient<S: LoopbackServer> {
    server: S,
}

impl<S: LoopbackServer> LoopbackClient<S> {
    /// Routes every POST to `server`.
    pub fn new(server: S) -> Self {
        Self { server }
    }
}

#[async_trait]
impl<S: LoopbackServer> HttpClient for LoopbackClient<S> {
    async fn post(&self, url: &str, content_type: &str, body: Vec<u8>) -> Result<Vec<u8>, String> {
        if !url.ends_with(SYNC_ENDPOINT) {
            return Err(format!("no route for {url}"));
        }
        self.server.handle_post(content_type, &body).await
    }

    fn is_healthy(&self) -> bool {
        true
    }
}
