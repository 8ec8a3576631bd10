//! # sync-types
//!
//! Shared domain types for the search-sync pipeline.
//!
//! This crate defines the data structures passed between the queue, the
//! document transformer and the coordinator:
//! - Schemas: versioned, typed field definitions
//! - Entities: content objects read from the content store
//! - Batches/Entries: queued index mutations
//! - Events: inbound mutation notifications
//! - Settings: layered configuration

pub mod batch;
pub mod config;
pub mod entity;
pub mod error;
pub mod event;
pub mod schema;

pub use batch::{Batch, Entry, EntryAction};
pub use config::{EngineKind, EngineSettings, Settings, SyncSettings};
pub use entity::{node_index_name, BinaryInfo, Entity, EntityType, FieldValue, Micronode, NamedRef};
pub use error::TypesError;
pub use event::{EntityRef, EventKind, MutationEvent};
pub use schema::{FieldSchema, FieldType, ListElementType, Schema, SchemaVersionRef};
