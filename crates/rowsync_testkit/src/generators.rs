//! Property-based test generators using proptest.
//!
//! Provides strategies for generating random test data
//! that maintains required invariants.

use crate::fixtures::{key, ticket, TICKETS};
use proptest::prelude::*;
use rowsync_engine::MemoryStore;
use rowsync_protocol::Value;
use rowsync_schema::{is_reserved_column_name, NativeColumn};

/// Native type names both fixture vocabularies understand.
pub const PORTABLE_TYPES: &[&str] = &["int", "bigint", "nvarchar", "float", "bit", "date"];

/// Strategy for generating valid table names.
pub fn table_name_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[A-Z][a-zA-Z0-9_]{0,31}").expect("Invalid regex")
}

/// Strategy for generating column names that are not reserved.
pub fn column_name_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-zA-Z][a-zA-Z0-9_]{0,31}")
        .expect("Invalid regex")
        .prop_filter("Column name must not be reserved", |s| {
            !is_reserved_column_name(s)
        })
}

/// Strategy for generating catalog columns of a portable type.
pub fn native_column_strategy() -> impl Strategy<Value = NativeColumn> {
    (
        column_name_strategy(),
        prop::sample::select(PORTABLE_TYPES),
        any::<bool>(),
        prop::option::of(1u32..10_000),
    )
        .prop_map(|(name, type_name, nullable, max_length)| {
            let mut column = NativeColumn::new(name, type_name);
            if nullable {
                column = column.nullable();
            }
            if let Some(max_length) = max_length {
                column = column.with_max_length(max_length);
            }
            column
        })
}

/// Strategy for generating column values.
pub fn value_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Boolean),
        any::<i64>().prop_map(Value::Integer),
        (-1.0e9f64..1.0e9).prop_map(Value::Double),
        "[ -~]{0,24}".prop_map(Value::Text),
        prop::collection::vec(any::<u8>(), 0..32).prop_map(Value::Bytes),
    ]
}

/// A local write to the tickets table.
#[derive(Debug, Clone, PartialEq)]
pub enum TicketOperation {
    /// Insert, or update if the ticket is live.
    Upsert {
        /// Ticket id.
        id: i64,
        /// New title.
        title: String,
    },
    /// Delete the ticket if it is live.
    Delete {
        /// Ticket id.
        id: i64,
    },
}

/// Strategy for generating ticket writes over a small id range, so that
/// the same rows get touched repeatedly.
pub fn ticket_operation_strategy() -> impl Strategy<Value = TicketOperation> {
    prop_oneof![
        3 => (1i64..16, "[a-z]{1,12}")
            .prop_map(|(id, title)| TicketOperation::Upsert { id, title }),
        1 => (1i64..16).prop_map(|id| TicketOperation::Delete { id }),
    ]
}

/// Strategy for generating a sequence of ticket writes.
pub fn ticket_operations_strategy(
    min_ops: usize,
    max_ops: usize,
) -> impl Strategy<Value = Vec<TicketOperation>> {
    prop::collection::vec(ticket_operation_strategy(), min_ops..max_ops)
}

/// Applies ticket writes to a store as local changes.
///
/// # Panics
///
/// Panics if the store rejects a write.
pub fn apply_ticket_operations(store: &MemoryStore, operations: &[TicketOperation]) {
    for operation in operations {
        match operation {
            TicketOperation::Upsert { id, title } => {
                let row = ticket(*id, title);
                if store.get(TICKETS, &key(*id)).is_some() {
                    store.update(TICKETS, row).expect("update failed");
                } else {
                    store.insert(TICKETS, row).expect("insert failed");
                }
            }
            TicketOperation::Delete { id } => {
                if store.get(TICKETS, &key(*id)).is_some() {
                    store.delete(TICKETS, &key(*id)).expect("delete failed");
                }
            }
        }
    }
}

/// Configuration for property tests.
#[derive(Debug, Clone)]
pub struct PropTestConfig {
    /// Number of test cases to run.
    pub cases: u32,
    /// Maximum shrink iterations.
    pub max_shrink_iters: u32,
}

impl Default for PropTestConfig {
    fn default() -> Self {
        Self {
            cases: 256,
            max_shrink_iters: 1000,
        }
    }
}

impl PropTestConfig {
    /// Creates a configuration for quick tests.
    #[must_use]
    pub fn quick() -> Self {
        Self {
            cases: 32,
            max_shrink_iters: 100,
        }
    }

    /// Converts to proptest config.
    #[must_use]
    pub fn to_proptest_config(&self) -> ProptestConfig {
        ProptestConfig {
            cases: self.cases,
            max_shrink_iters: self.max_shrink_iters,
            ..ProptestConfig::default()
        }
    }
}
