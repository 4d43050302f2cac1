//! # rowsync Engine
//!
//! Change tracking and the sync session agent for rowsync.
//!
//! This crate provides:
//! - Sync options and the configuration store
//! - The `SyncStore` datastore contract and an in-memory reference store
//! - Change tracking with restartable, paged cursors
//! - Batch building with optional spooling to disk
//! - Conflict detection and resolution
//! - `SyncProvider`, the per-peer facade used by clients and servers
//! - `SyncAgent`, the client-side session state machine
//! - Transport abstractions (HTTP-style client, loopback, mock)
//!
//! ## Architecture
//!
//! A session is driven by the client and arbitrated by the server:
//! 1. Load scopes on both peers
//! 2. Fetch the server configuration and cache it locally
//! 3. Verify local tables against it
//! 4. Select local changes since the last sync and upload them batch by batch
//! 5. Download the server's changes and apply them
//! 6. Write the new watermarks on both peers
//!
//! ## Key Invariants
//!
//! - Session stages never skip and never repeat
//! - Each batch is applied atomically; there is no cross-batch rollback
//! - Parent tables are upserted before children, deleted after them
//! - Every detected conflict is counted exactly once
//! - Errors leave a peer only as an `ErrorEnvelope`

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod batch;
mod config;
mod config_store;
mod error;
mod http;
mod memory;
mod provider;
mod resolver;
mod state;
mod store;
mod tracker;
mod transport;

pub use batch::{BatchBuilder, BatchSet};
pub use config::SyncOptions;
pub use config_store::{ConfigurationStore, FileConfigurationStore, MemoryConfigurationStore};
pub use error::{SyncError, SyncResult};
pub use http::{HttpClient, HttpTransport, LoopbackClient, LoopbackServer, SYNC_ENDPOINT};
pub use memory::MemoryStore;
pub use provider::{ApplyReport, ConfigurationApplyingHook, SyncProvider};
pub use resolver::{ConflictHandler, ConflictResolver, Observation, Resolution};
pub use state::{CancelHandle, SyncAgent, SyncSessionResult, SyncStats};
pub use store::{
    ChangeQuery, RowWrite, Selection, StoreError, StoreResult, SyncStore, TrackedRow,
};
pub use tracker::{ChangeCursor, ChangeTracker, ChangeWindow};
pub use transport::{MockTransport, SyncTransport};
