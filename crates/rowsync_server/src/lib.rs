//! # rowsync Sync Server
//!
//! Reference sync server for rowsync.
//!
//! This crate provides:
//! - Request dispatch for every session stage
//! - Per-session state (scopes, configuration, download batches)
//! - Conflict arbitration through the engine's resolver
//! - Error envelopes for every failure
//!
//! # Architecture
//!
//! The server is a peer like any client: it owns a datastore behind a
//! `SyncProvider` and a configuration cache. It maintains:
//! - One session per client session id, from `EnsureScopes` to `WriteScopes`
//! - The record it keeps about every client scope
//!
//! # Protocol
//!
//! The client drives the session:
//! 1. `EnsureScopes` loads both scope records
//! 2. `GetConfiguration` returns the server's configuration
//! 3. `ApplyChanges` applies one uploaded batch; conflicts are settled here
//! 4. `GetChanges` hands out download batches; index 0 triggers selection
//! 5. `WriteScopes` records the client's new watermark and ends the session
//!
//! Any failure is answered with an error envelope and ends the session.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod config;
mod error;
mod handler;
mod server;

pub use config::ServerConfig;
pub use error::{ServerError, ServerResult};
pub use handler::RequestHandler;
pub use server::SyncServer;
