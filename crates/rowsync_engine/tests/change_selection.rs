//! Change selection against randomly written stores.

use proptest::prelude::*;
use rowsync_engine::{ChangeTracker, ChangeWindow, SyncStore};
use rowsync_protocol::{ChangeRecord, RowKind, Watermark};
use rowsync_schema::{SchemaBuilder, SyncSchema};
use rowsync_testkit::prelude::*;

/// Selects ticket changes in `window`, reading pages of `page_size`.
fn select(ops: &[TicketOperation], window: ChangeWindow, page_size: usize) -> Vec<ChangeRecord> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .build()
        .unwrap();
    runtime.block_on(async {
        let store = sqlite_store();
        apply_ticket_operations(&store, ops);
        let schema = SchemaBuilder::new(store.catalog())
            .build(SyncSchema::with_tables([TICKETS]).unwrap())
            .await
            .unwrap();
        let table = schema.table(TICKETS).unwrap();
        let store: &dyn SyncStore = store.as_ref();
        ChangeTracker::new(store, page_size)
            .select_changes(table, window)
            .await
            .unwrap()
    })
}

proptest! {
    #![proptest_config(PropTestConfig::quick().to_proptest_config())]

    #[test]
    fn page_size_never_changes_the_selection(
        ops in ticket_operations_strategy(1, 40),
        page_size in 1usize..8,
    ) {
        let window = ChangeWindow::since(Watermark::ZERO);
        prop_assert_eq!(select(&ops, window, page_size), select(&ops, window, usize::MAX));
    }

    #[test]
    fn selection_respects_the_window(
        ops in ticket_operations_strategy(1, 40),
        since in 0u64..20,
        span in 0u64..20,
    ) {
        let until = Watermark(since + span);
        let window = ChangeWindow::since(Watermark(since)).until(until);
        let changes = select(&ops, window, 3);
        for change in &changes {
            prop_assert!(change.watermark > Watermark(since));
            prop_assert!(change.watermark <= until);
            prop_assert_eq!(change.kind == RowKind::Delete, change.values.is_empty());
        }
        let mut keys: Vec<_> = changes.iter().map(|c| c.key.clone()).collect();
        keys.dedup();
        prop_assert_eq!(keys.len(), changes.len());
    }
}
