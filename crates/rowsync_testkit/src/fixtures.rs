//! Test fixtures and store helpers.
//!
//! Provides a small sales schema (tickets, customers and their orders)
//! and convenience functions for building and seeding stores.

use rowsync_engine::{MemoryStore, SyncOptions};
use rowsync_protocol::{SerializationFormat, Value};
use rowsync_schema::{NativeColumn, NativeRelation, TableDefinition, TypeTable};
use std::ops::RangeInclusive;
use std::sync::Arc;
use tempfile::TempDir;

/// Standalone table without relations.
pub const TICKETS: &str = "ServiceTickets";
/// Parent table.
pub const CUSTOMER: &str = "Customer";
/// Child table referencing [`CUSTOMER`].
pub const SALES_ORDER: &str = "SalesOrder";

/// `ServiceTickets(ServiceTicketID, Title, Description, StatusValue, EscalationLevel)`.
pub fn service_tickets() -> TableDefinition {
    TableDefinition::new(TICKETS)
        .column(NativeColumn::new("ServiceTicketID", "int"))
        .column(NativeColumn::new("Title", "nvarchar").with_max_length(256))
        .column(NativeColumn::new("Description", "nvarchar").nullable())
        .column(NativeColumn::new("StatusValue", "int"))
        .column(NativeColumn::new("EscalationLevel", "int"))
        .primary_key("ServiceTicketID")
}

/// `Customer(CustomerID, FirstName, LastName)`.
pub fn customer() -> TableDefinition {
    TableDefinition::new(CUSTOMER)
        .column(NativeColumn::new("CustomerID", "int"))
        .column(NativeColumn::new("FirstName", "nvarchar").with_max_length(50))
        .column(NativeColumn::new("LastName", "nvarchar").with_max_length(50))
        .primary_key("CustomerID")
}

/// `SalesOrder(SalesOrderID, CustomerID, Total)` with a foreign key to
/// [`customer`].
pub fn sales_order() -> TableDefinition {
    TableDefinition::new(SALES_ORDER)
        .column(NativeColumn::new("SalesOrderID", "int"))
        .column(NativeColumn::new("CustomerID", "int"))
        .column(NativeColumn::new("Total", "float"))
        .primary_key("SalesOrderID")
        .relation(NativeRelation::new(
            "FK_SalesOrder_Customer",
            "CustomerID",
            CUSTOMER,
            "CustomerID",
        ))
}

/// Every fixture table, children listed before parents.
pub fn all_tables() -> Vec<TableDefinition> {
    vec![sales_order(), service_tickets(), customer()]
}

/// Names of every fixture table, in the order of [`all_tables`].
pub fn table_names() -> Vec<&'static str> {
    vec![SALES_ORDER, TICKETS, CUSTOMER]
}

/// A ticket row.
pub fn ticket(id: i64, title: &str) -> Vec<Value> {
    vec![
        Value::from(id),
        Value::from(title),
        Value::Null,
        Value::from(1),
        Value::from(0),
    ]
}

/// A customer row.
pub fn customer_row(id: i64, first_name: &str, last_name: &str) -> Vec<Value> {
    vec![Value::from(id), Value::from(first_name), Value::from(last_name)]
}

/// A sales order row.
pub fn order_row(id: i64, customer_id: i64, total: f64) -> Vec<Value> {
    vec![Value::from(id), Value::from(customer_id), Value::from(total)]
}

/// A primary key of one integer column.
pub fn key(id: i64) -> Vec<Value> {
    vec![Value::from(id)]
}

/// A store speaking SQLite's vocabulary, holding every fixture table.
pub fn sqlite_store() -> Arc<MemoryStore> {
    Arc::new(MemoryStore::sqlite(all_tables()))
}

/// A store speaking SQL Server's vocabulary, holding every fixture table.
pub fn sql_server_store() -> Arc<MemoryStore> {
    Arc::new(MemoryStore::new(
        Arc::new(TypeTable::sql_server()),
        all_tables(),
    ))
}

/// Inserts one ticket per id, titled `Ticket <id>`.
///
/// # Panics
///
/// Panics if a ticket with one of the ids already exists.
pub fn seed_tickets(store: &MemoryStore, ids: RangeInclusive<i64>) {
    for id in ids {
        store
            .insert(TICKETS, ticket(id, &format!("Ticket {id}")))
            .expect("failed to seed ticket");
    }
}

/// Options synchronizing every fixture table.
pub fn sync_options(format: SerializationFormat) -> SyncOptions {
    SyncOptions::new(table_names()).with_serialization_format(format)
}

/// Creates a temporary directory removed on drop.
///
/// # Panics
///
/// Panics if the directory cannot be created.
pub fn temp_dir() -> TempDir {
    TempDir::new().expect("failed to create temp directory")
}
