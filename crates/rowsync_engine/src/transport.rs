//! The client's view of the wire.

use crate::error::{SyncError, SyncResult};
use async_trait::async_trait;
use parking_lot::Mutex;
use rowsync_protocol::{SerializationFormat, SyncRequest, SyncResponse};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};

/// Carries session requests to the server, one at a time.
///
/// An error the server reports arrives as an ordinary response carrying an
/// error envelope; `Err` is reserved for failures of the transport itself.
#[async_trait]
pub trait SyncTransport: Send + Sync {
    /// Serialization format used on the wire.
    fn format(&self) -> SerializationFormat;

    /// Sends one request and waits for its response.
    async fn send(&self, request: SyncRequest) -> SyncResult<SyncResponse>;

    /// Returns true while requests can be sent.
    fn is_connected(&self) -> bool;

    /// Stops accepting requests.
    fn close(&self) -> SyncResult<()>;
}

/// A scripted transport: responses are queued up front and handed out in
/// order, and every request is recorded.
#[derive(Debug)]
pub struct MockTransport {
    connected: AtomicBool,
    responses: Mutex<VecDeque<SyncResponse>>,
    requests: Mutex<Vec<SyncRequest>>,
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl MockTransport {
    /// Creates a connected transport with nothing queued.
    pub fn new() -> Self {
        Self {
            connected: AtomicBool::new(true),
            responses: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Queues a response.
    pub fn push_response(&self, response: SyncResponse) {
        self.responses.lock().push_back(response);
    }

    /// Requests received so far.
    pub fn requests(&self) -> Vec<SyncRequest> {
        self.requests.lock().clone()
    }

    /// Simulates losing or regaining the connection.
    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }
}

#[async_trait]
impl SyncTransport for MockTransport {
    fn format(&self) -> SerializationFormat {
        SerializationFormat::Json
    }

    async fn send(&self, request: SyncRequest) -> SyncResult<SyncResponse> {
        if !self.is_connected() {
            return Err(SyncError::NotConnected);
        }
        self.requests.lock().push(request);
        self.responses
            .lock()
            .pop_front()
            .ok_or_else(|| SyncError::protocol("no mock response queued"))
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn close(&self) -> SyncResult<()> {
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rowsync_protocol::{RequestPayload, ResponsePayload, SyncContext, Watermark};
    use uuid::Uuid;

    fn request() -> SyncRequest {
        SyncRequest::new(
            SyncContext::new(Uuid::new_v4(), "DefaultScope"),
            RequestPayload::WriteScopes,
        )
    }

    #[test]
    fn connection_state_follows_close() {
        let transport = MockTransport::new();
        assert!(transport.is_connected());

        transport.set_connected(false);
        assert!(!transport.is_connected());

        transport.set_connected(true);
        transport.close().unwrap();
        assert!(!transport.is_connected());
    }

    #[tokio::test]
    async fn disconnected_sends_are_not_recorded() {
        let transport = MockTransport::new();
        transport.set_connected(false);

        let result = transport.send(request()).await;
        assert!(matches!(result, Err(SyncError::NotConnected)));
        assert!(transport.requests().is_empty());
    }

    #[tokio::test]
    async fn queued_responses_are_replayed_in_order() {
        let transport = MockTransport::new();
        let request = request();
        transport.push_response(SyncResponse::new(
            request.context.clone(),
            ResponsePayload::ScopesWritten {
                server_watermark: Watermark(3),
            },
        ));

        let response = transport.send(request.clone()).await.unwrap();
        assert!(response.as_error().is_none());
        assert_eq!(transport.requests(), vec![request.clone()]);

        let err = transport.send(request).await.unwrap_err();
        assert_eq!(err.type_name(), "ProtocolError");
    }
}
