//! # sync-transform
//!
//! Schema-directed index document and mapping generation.
//!
//! The same field definitions drive both the document shape and the mapping
//! shape, so the two cannot drift apart:
//! - [`codec`]: one value encoder and one mapping fragment per field type
//! - [`transformer`]: entity to document
//! - [`mapping`]: schema to mapping, cached per schema version

pub mod codec;
pub mod error;
pub mod mapping;
pub mod transformer;

pub use codec::{encode_fields, encode_mapping, encode_value};
pub use error::TransformError;
pub use mapping::{build_basic_mapping, build_mapping, MappingCache, MappingDescriptor};
pub use transformer::{build_basic_document, build_document, DocumentTransformer};
