//! Column family definitions for RocksDB.
//!
//! - batches: live queue, keyed by creation sequence (FIFO order)
//! - batch_ids: batch id -> sequence, for conflict checks and take-by-id
//! - parked: batches that exceeded the retry bound, keyed by batch id

use rocksdb::{ColumnFamilyDescriptor, Options};

/// Column family name for the live batch queue
pub const CF_BATCHES: &str = "batches";

/// Column family name for the batch id index
pub const CF_BATCH_IDS: &str = "batch_ids";

/// Column family name for parked batches
pub const CF_PARKED: &str = "parked";

/// All column family names
pub const ALL_CF_NAMES: &[&str] = &[CF_BATCHES, CF_BATCH_IDS, CF_PARKED];

/// Options for the batch queue: small values, written once, deleted once.
fn batches_options() -> Options {
    let mut opts = Options::default();
    opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
    opts
}

/// Build all column family descriptors
pub fn build_cf_descriptors() -> Vec<ColumnFamilyDescriptor> {
    vec![
        ColumnFamilyDescriptor::new(CF_BATCHES, batches_options()),
        ColumnFamilyDescriptor::new(CF_BATCH_IDS, Options::default()),
        ColumnFamilyDescriptor::new(CF_PARKED, Options::default()),
    ]
}
