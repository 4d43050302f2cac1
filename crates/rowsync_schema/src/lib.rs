//! # rowsync Schema
//!
//! Canonical, engine-agnostic table model for rowsync.
//!
//! This crate provides:
//! - The schema model (`SyncSchema`, `Table`, `Column`, `Relation`)
//! - Per-provider type vocabularies and the metadata validator
//! - The catalog adapter contract consumed by the schema builder
//! - `SchemaBuilder`, which turns catalog data into a validated model
//!
//! ## Key Invariants
//!
//! - Every table has exactly one non-empty primary key
//! - Every table has at least one non-key column
//! - Column ordinals are dense and zero-based, in catalog order
//! - No user column collides with a reserved tracking column name
//! - A build either returns a fully validated model or an error
//!
//! This is a pure model crate with no I/O operations; catalog access goes
//! through the [`CatalogAdapter`] trait.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod builder;
mod catalog;
mod error;
mod metadata;
mod model;
mod settings;
mod types;

pub use builder::SchemaBuilder;
pub use catalog::{
    CatalogAdapter, CatalogTransaction, NativeRelation, StaticCatalog, TableDefinition,
};
pub use error::{SchemaError, SchemaResult};
pub use metadata::{
    is_reserved_column_name, validate_column, Metadata, NativeColumn, NumericCapability,
    TypeMapping, TypeTable, RESERVED_COLUMN_NAMES,
};
pub use model::{
    Column, Relation, SyncSchema, Table, DEFAULT_BATCH_SIZE, DEFAULT_IN_MEMORY_BATCHES,
};
pub use settings::{ConflictPolicy, SerializationFormat};
pub use types::{DataType, DbKind};
