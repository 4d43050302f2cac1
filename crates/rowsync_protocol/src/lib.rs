//! # rowsync Protocol
//!
//! Wire-level types shared by sync clients and servers.
//!
//! This crate provides:
//! - `Value`, `ChangeRecord` and `Batch` for row-level replication
//! - `Conflict` and resolution decisions
//! - Scopes, watermarks and session stages
//! - Session request/response envelopes and the `ErrorEnvelope`
//! - JSON and CBOR encoding selected per session
//!
//! This is a pure protocol crate with no I/O operations.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod change;
mod codec;
mod conflict;
mod envelope;
mod error;
mod messages;
mod scope;
mod stage;
mod value;

pub use change::{Batch, ChangeRecord, RowKind};
pub use codec::{decode, encode};
pub use conflict::{Conflict, ConflictOutcome, ConflictType, ResolutionDecision, SyncRole};
pub use envelope::ErrorEnvelope;
pub use error::{CodecError, CodecResult};
pub use messages::{RequestPayload, ResponsePayload, SyncContext, SyncRequest, SyncResponse};
pub use scope::{ScopeInfo, Watermark};
pub use stage::SyncStage;
pub use value::{key_of, Value};

pub use rowsync_schema::{ConflictPolicy, SerializationFormat};
