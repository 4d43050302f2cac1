//! Random local writes on both peers converge after one session.

use proptest::prelude::*;
use rowsync_engine::{HttpTransport, LoopbackClient, SyncAgent, SyncProvider};
use rowsync_protocol::{ConflictPolicy, SerializationFormat, Value};
use rowsync_server::{ServerConfig, SyncServer};
use rowsync_testkit::prelude::*;
use std::sync::Arc;

type Rows = Vec<Vec<Value>>;

/// Runs a first session after both sides wrote, then a second one that must
/// find nothing left to exchange. Returns client rows, server rows and the
/// second session's change count.
fn sync_twice(
    policy: ConflictPolicy,
    client_ops: &[TicketOperation],
    server_ops: &[TicketOperation],
) -> (Rows, Rows, u64) {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap();
    runtime.block_on(async {
        let server_store = sql_server_store();
        let server = Arc::new(
            SyncServer::new(
                ServerConfig::new(
                    sync_options(SerializationFormat::Json).with_conflict_policy(policy),
                ),
                SyncProvider::new(Arc::clone(&server_store)),
            )
            .unwrap(),
        );
        let client_store = sqlite_store();
        let agent = SyncAgent::new(
            sync_options(SerializationFormat::Binary),
            SyncProvider::new(Arc::clone(&client_store)),
            HttpTransport::new(
                "http://loopback",
                LoopbackClient::new(Arc::clone(&server)),
                SerializationFormat::Binary,
            ),
        );

        apply_ticket_operations(&client_store, client_ops);
        apply_ticket_operations(&server_store, server_ops);
        agent.synchronize().await.unwrap();
        let second = agent.synchronize().await.unwrap();

        (
            client_store.rows(TICKETS),
            server_store.rows(TICKETS),
            second.total_changes_uploaded + second.total_changes_downloaded,
        )
    })
}

proptest! {
    #![proptest_config(PropTestConfig::quick().to_proptest_config())]

    #[test]
    fn peers_converge_server_wins(
        client_ops in ticket_operations_strategy(0, 30),
        server_ops in ticket_operations_strategy(0, 30),
    ) {
        let (client, server, leftover) =
            sync_twice(ConflictPolicy::ServerWins, &client_ops, &server_ops);
        prop_assert_eq!(client, server);
        prop_assert_eq!(leftover, 0);
    }

    #[test]
    fn peers_converge_client_wins(
        client_ops in ticket_operations_strategy(0, 30),
        server_ops in ticket_operations_strategy(0, 30),
    ) {
        let (client, server, leftover) =
            sync_twice(ConflictPolicy::ClientWins, &client_ops, &server_ops);
        prop_assert_eq!(client, server);
        prop_assert_eq!(leftover, 0);
    }
}
