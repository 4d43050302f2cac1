//! End-to-end sessions between a client agent and the server, over the
//! loopback HTTP transport, in both wire formats.

use async_trait::async_trait;
use rowsync_engine::{
    CancelHandle, ConflictHandler, HttpTransport, LoopbackClient, MemoryStore, SyncAgent,
    SyncError, SyncOptions, SyncProvider, SyncResult, SyncSessionResult, SyncTransport,
};
use rowsync_protocol::{
    Conflict, ConflictPolicy, RequestPayload, ResolutionDecision, SerializationFormat, SyncRequest,
    SyncResponse, SyncStage, Value,
};
use rowsync_server::{ServerConfig, SyncServer};
use rowsync_testkit::prelude::*;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

const FORMATS: [SerializationFormat; 2] = [SerializationFormat::Json, SerializationFormat::Binary];

type Server = Arc<SyncServer<MemoryStore>>;
type Loopback = HttpTransport<LoopbackClient<Server>>;

fn server_with(provider: SyncProvider<MemoryStore>, policy: ConflictPolicy) -> Server {
    let options = sync_options(SerializationFormat::Json).with_conflict_policy(policy);
    Arc::new(SyncServer::new(ServerConfig::new(options), provider).unwrap())
}

fn server(policy: ConflictPolicy) -> Server {
    server_with(SyncProvider::new(sql_server_store()), policy)
}

fn loopback(server: &Server, format: SerializationFormat) -> Loopback {
    HttpTransport::new(
        "http://loopback",
        LoopbackClient::new(Arc::clone(server)),
        format,
    )
}

fn client<T: SyncTransport>(transport: T) -> SyncAgent<MemoryStore, T> {
    let format = transport.format();
    SyncAgent::new(
        sync_options(format),
        SyncProvider::new(sqlite_store()),
        transport,
    )
}

fn server_store(server: &Server) -> &MemoryStore {
    server.provider().store()
}

fn client_store<T: SyncTransport>(agent: &SyncAgent<MemoryStore, T>) -> &MemoryStore {
    agent.provider().store()
}

fn counts(result: &SyncSessionResult) -> (u64, u64, u64) {
    (
        result.total_changes_downloaded,
        result.total_changes_uploaded,
        result.total_sync_conflicts,
    )
}

fn title(store: &MemoryStore, id: i64) -> Option<Value> {
    store.get(TICKETS, &key(id)).map(|row| row[1].clone())
}

#[tokio::test]
async fn initialize_downloads_every_row() {
    init_tracing();
    for format in FORMATS {
        let server = server(ConflictPolicy::ServerWins);
        seed_tickets(server_store(&server), 1..=50);
        let agent = client(loopback(&server, format));

        let result = agent.synchronize().await.unwrap();
        assert_eq!(counts(&result), (50, 0, 0));
        assert_eq!(client_store(&agent).row_count(TICKETS), 50);
        assert_eq!(agent.state(), SyncStage::Completed);

        let again = agent.synchronize().await.unwrap();
        assert_eq!(counts(&again), (0, 0, 0));
        assert_eq!(server.active_sessions(), 0);
    }
}

#[tokio::test]
async fn empty_stores_sync_nothing() {
    for format in FORMATS {
        let server = server(ConflictPolicy::ServerWins);
        let agent = client(loopback(&server, format));
        let result = agent.synchronize().await.unwrap();
        assert_eq!(counts(&result), (0, 0, 0));
        assert!(!result.session_id.is_nil());
    }
}

#[tokio::test]
async fn inserts_flow_both_ways_without_echo() {
    for format in FORMATS {
        let server = server(ConflictPolicy::ServerWins);
        let agent = client(loopback(&server, format));
        agent.synchronize().await.unwrap();

        server_store(&server)
            .insert(TICKETS, ticket(100, "from server"))
            .unwrap();
        let result = agent.synchronize().await.unwrap();
        assert_eq!(counts(&result), (1, 0, 0));
        assert_eq!(title(client_store(&agent), 100), Some(Value::from("from server")));

        client_store(&agent)
            .insert(TICKETS, ticket(101, "from client"))
            .unwrap();
        let result = agent.synchronize().await.unwrap();
        assert_eq!(counts(&result), (0, 1, 0));
        assert_eq!(title(server_store(&server), 101), Some(Value::from("from client")));

        let result = agent.synchronize().await.unwrap();
        assert_eq!(counts(&result), (0, 0, 0));
    }
}

#[tokio::test]
async fn updates_and_deletes_flow_both_ways() {
    for format in FORMATS {
        let server = server(ConflictPolicy::ServerWins);
        seed_tickets(server_store(&server), 1..=10);
        let agent = client(loopback(&server, format));
        agent.synchronize().await.unwrap();

        client_store(&agent).update(TICKETS, ticket(2, "edited")).unwrap();
        client_store(&agent).delete(TICKETS, &key(3)).unwrap();
        let result = agent.synchronize().await.unwrap();
        assert_eq!(counts(&result), (0, 2, 0));
        assert_eq!(title(server_store(&server), 2), Some(Value::from("edited")));
        assert_eq!(server_store(&server).row_count(TICKETS), 9);
        assert_eq!(server_store(&server).tombstone_count(TICKETS), 1);

        server_store(&server).update(TICKETS, ticket(4, "server edit")).unwrap();
        server_store(&server).delete(TICKETS, &key(5)).unwrap();
        let result = agent.synchronize().await.unwrap();
        assert_eq!(counts(&result), (2, 0, 0));
        assert_eq!(title(client_store(&agent), 4), Some(Value::from("server edit")));
        assert_eq!(client_store(&agent).get(TICKETS, &key(5)), None);
        assert_eq!(client_store(&agent).rows(TICKETS), server_store(&server).rows(TICKETS));
    }
}

#[tokio::test]
async fn insert_insert_conflict_keeps_the_server_row() {
    for format in FORMATS {
        let server = server(ConflictPolicy::ServerWins);
        let agent = client(loopback(&server, format));
        server_store(&server).insert(TICKETS, ticket(1, "server")).unwrap();
        client_store(&agent).insert(TICKETS, ticket(1, "client")).unwrap();

        let result = agent.synchronize().await.unwrap();
        assert_eq!(counts(&result), (1, 1, 1));
        assert_eq!(title(client_store(&agent), 1), Some(Value::from("server")));
        assert_eq!(title(server_store(&server), 1), Some(Value::from("server")));
        assert_eq!(agent.stats().conflicts_encountered, 1);
    }
}

#[tokio::test]
async fn update_update_conflict_server_wins() {
    for format in FORMATS {
        let server = server(ConflictPolicy::ServerWins);
        seed_tickets(server_store(&server), 1..=1);
        let agent = client(loopback(&server, format));
        agent.synchronize().await.unwrap();

        server_store(&server).update(TICKETS, ticket(1, "server")).unwrap();
        client_store(&agent).update(TICKETS, ticket(1, "client")).unwrap();

        let result = agent.synchronize().await.unwrap();
        assert_eq!(counts(&result), (1, 1, 1));
        assert_eq!(title(client_store(&agent), 1), Some(Value::from("server")));

        let result = agent.synchronize().await.unwrap();
        assert_eq!(counts(&result), (0, 0, 0));
    }
}

#[tokio::test]
async fn handler_can_let_the_client_win() {
    for format in FORMATS {
        let handler: ConflictHandler = Arc::new(|_: &Conflict| Some(ResolutionDecision::ClientWins));
        let provider = SyncProvider::new(sql_server_store()).with_conflict_handler(handler);
        let server = server_with(provider, ConflictPolicy::ServerWins);
        seed_tickets(server_store(&server), 1..=1);
        let agent = client(loopback(&server, format));
        agent.synchronize().await.unwrap();

        server_store(&server).update(TICKETS, ticket(1, "server")).unwrap();
        client_store(&agent).update(TICKETS, ticket(1, "client")).unwrap();

        let result = agent.synchronize().await.unwrap();
        assert_eq!(counts(&result), (0, 1, 1));
        assert_eq!(title(server_store(&server), 1), Some(Value::from("client")));
        assert_eq!(title(client_store(&agent), 1), Some(Value::from("client")));
    }
}

#[tokio::test]
async fn client_wins_policy_overwrites_the_server() {
    for format in FORMATS {
        let server = server(ConflictPolicy::ClientWins);
        let agent = client(loopback(&server, format));
        server_store(&server).insert(TICKETS, ticket(7, "server")).unwrap();
        client_store(&agent).insert(TICKETS, ticket(7, "client")).unwrap();

        let result = agent.synchronize().await.unwrap();
        assert_eq!(counts(&result), (0, 1, 1));
        assert_eq!(title(server_store(&server), 7), Some(Value::from("client")));
    }
}

#[tokio::test]
async fn bulk_delete_reaches_the_client() {
    for format in FORMATS {
        let server = server(ConflictPolicy::ServerWins);
        seed_tickets(server_store(&server), 1..=50);
        let agent = client(loopback(&server, format));
        agent.synchronize().await.unwrap();

        for id in 1..=50 {
            server_store(&server).delete(TICKETS, &key(id)).unwrap();
        }
        let result = agent.synchronize().await.unwrap();
        assert_eq!(counts(&result), (50, 0, 0));
        assert_eq!(client_store(&agent).row_count(TICKETS), 0);
    }
}

#[tokio::test]
async fn bulk_delete_reaches_the_server() {
    for format in FORMATS {
        let server = server(ConflictPolicy::ServerWins);
        seed_tickets(server_store(&server), 1..=50);
        let agent = client(loopback(&server, format));
        agent.synchronize().await.unwrap();
        assert_eq!(client_store(&agent).row_count(TICKETS), 50);

        for id in 1..=30 {
            client_store(&agent).delete(TICKETS, &key(id)).unwrap();
        }
        let result = agent.synchronize().await.unwrap();
        assert_eq!(counts(&result), (0, 30, 0));
        assert_eq!(server_store(&server).row_count(TICKETS), 20);
        assert_eq!(client_store(&agent).row_count(TICKETS), 20);
    }
}

#[tokio::test]
async fn parents_arrive_before_children_and_leave_after_them() {
    for format in FORMATS {
        let server = server(ConflictPolicy::ServerWins);
        let agent = client(loopback(&server, format));
        let local = client_store(&agent);
        local.insert(CUSTOMER, customer_row(1, "Ada", "Lovelace")).unwrap();
        local.insert(SALES_ORDER, order_row(10, 1, 99.5)).unwrap();

        let result = agent.synchronize().await.unwrap();
        assert_eq!(counts(&result), (0, 2, 0));
        assert_eq!(server_store(&server).row_count(SALES_ORDER), 1);

        local.delete(SALES_ORDER, &key(10)).unwrap();
        local.delete(CUSTOMER, &key(1)).unwrap();
        let result = agent.synchronize().await.unwrap();
        assert_eq!(counts(&result), (0, 2, 0));
        assert_eq!(server_store(&server).row_count(CUSTOMER), 0);
        assert_eq!(server_store(&server).row_count(SALES_ORDER), 0);
    }
}

#[tokio::test]
async fn large_uploads_spool_and_clean_up() {
    let dir = temp_dir();
    let server = server(ConflictPolicy::ServerWins);
    let agent = SyncAgent::new(
        sync_options(SerializationFormat::Binary)
            .with_batch_directory(dir.path())
            .with_batch_size(5)
            .with_in_memory_batches(1),
        SyncProvider::new(sqlite_store()),
        loopback(&server, SerializationFormat::Binary),
    );
    seed_tickets(client_store(&agent), 1..=20);

    let result = agent.synchronize().await.unwrap();
    assert_eq!(counts(&result), (0, 20, 0));
    assert_eq!(server_store(&server).row_count(TICKETS), 20);
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn server_failures_arrive_as_envelopes() {
    for format in FORMATS {
        let options = SyncOptions::new(["Invoice"]);
        let server: Server = Arc::new(
            SyncServer::new(
                ServerConfig::new(options),
                SyncProvider::new(sql_server_store()),
            )
            .unwrap(),
        );
        let agent = client(loopback(&server, format));

        let err = agent.synchronize().await.unwrap_err();
        assert_eq!(err.stage(), Some(SyncStage::ConfigurationApplying));
        assert_eq!(err.remote_type_name(), Some("MissingPrimaryKeyError"));
        assert_eq!(agent.state(), SyncStage::Failed);
        assert_eq!(server.active_sessions(), 0);
    }
}

/// Cancels the agent right after the first uploaded batch is acknowledged.
struct CancelAfterUpload<T> {
    inner: T,
    handle: CancelHandle,
    armed: AtomicBool,
}

#[async_trait]
impl<T: SyncTransport> SyncTransport for CancelAfterUpload<T> {
    fn format(&self) -> SerializationFormat {
        self.inner.format()
    }

    async fn send(&self, request: SyncRequest) -> SyncResult<SyncResponse> {
        let upload = matches!(request.payload, RequestPayload::ApplyChanges { .. });
        let response = self.inner.send(request).await?;
        if upload && self.armed.swap(false, Ordering::SeqCst) {
            self.handle.cancel();
        }
        Ok(response)
    }

    fn is_connected(&self) -> bool {
        self.inner.is_connected()
    }

    fn close(&self) -> SyncResult<()> {
        self.inner.close()
    }
}

#[tokio::test]
async fn cancellation_stops_between_batches() {
    let server = server(ConflictPolicy::ServerWins);
    let handle = CancelHandle::new();
    let transport = CancelAfterUpload {
        inner: loopback(&server, SerializationFormat::Json),
        handle: handle.clone(),
        armed: AtomicBool::new(true),
    };
    let agent = SyncAgent::new(
        sync_options(SerializationFormat::Json).with_batch_size(1),
        SyncProvider::new(sqlite_store()),
        transport,
    )
    .with_cancel_handle(handle);
    seed_tickets(client_store(&agent), 1..=3);

    let err = agent.synchronize().await.unwrap_err();
    assert!(matches!(err.root(), SyncError::Cancelled));
    assert_eq!(err.stage(), Some(SyncStage::ChangesApplying));
    assert_eq!(server_store(&server).row_count(TICKETS), 1);

    // the applied batch stays applied; the next session re-sends the rest
    let result = agent.synchronize().await.unwrap();
    assert_eq!(counts(&result), (0, 3, 0));
    assert_eq!(server_store(&server).row_count(TICKETS), 3);
}
