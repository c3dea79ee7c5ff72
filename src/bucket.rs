//! Persistent sharded path-metadata index.
//!
//! Per-path facts that must survive across refreshes (sync stamps, history,
//! markers) are kept in an on-disk index partitioned into buckets, so that
//! attaching metadata to a path never requires loading the whole tree:
//! - `Bucket` - one persisted, in-memory-cached key/value shard
//! - `BucketTree` - routes a path to its owning shard and drives
//!   depth-bounded visits across shard boundaries
//! - `PropertyCodec`/`PropertyStore` - string-property payloads
//!
//! The index is always reconstructible from the workspace tree, so every
//! recoverable persistence problem (missing file, corrupt data, stale format
//! version) degrades to an empty shard instead of an error.

mod props;
mod shard;
mod tree;

use std::path::Path;

use crate::error::{LocalStoreError, Result};
use crate::types::Control;

pub use props::{PropertyCodec, PropertyStore};
pub use shard::Bucket;
pub use tree::BucketTree;

/// Value encoding owned by a concrete bucket type.
///
/// The generic shard engine only ever sees opaque byte payloads; a codec
/// decides the value shape, its wire encoding and the format version. Bumping
/// `VERSION` makes previously persisted shards load as empty (index rebuild,
/// not a failure).
pub trait BucketCodec {
    type Value;

    /// Format version persisted alongside each shard.
    const VERSION: u8;
    /// File name of the shard data file.
    const INDEX_FILE_NAME: &'static str;
    /// File name of the shard version file.
    const VERSION_FILE_NAME: &'static str;

    fn encode(value: &Self::Value, out: &mut Vec<u8>) -> Result<()>;
    fn decode(bytes: &[u8]) -> Result<Self::Value>;

    /// Occurrence count for fast cardinality queries.
    fn occurrences(_value: &Self::Value) -> usize {
        1
    }
}

/// One entry presented to a bucket visitor.
#[derive(Debug)]
pub struct BucketEntry<'a, V> {
    path: &'a Path,
    value: &'a V,
    occurrences: usize,
}

impl<'a, V> BucketEntry<'a, V> {
    /// The workspace path this entry is attached to.
    pub fn path(&self) -> &'a Path {
        self.path
    }

    pub fn value(&self) -> &'a V {
        self.value
    }

    pub fn occurrences(&self) -> usize {
        self.occurrences
    }

    pub(crate) fn new(path: &'a Path, value: &'a V, occurrences: usize) -> Self {
        Self {
            path,
            value,
            occurrences,
        }
    }
}

/// Callback driving bulk iteration over bucket entries.
pub trait BucketVisitor<V> {
    fn visit(&mut self, entry: BucketEntry<'_, V>) -> Control;
}

impl<V, F> BucketVisitor<V> for F
where
    F: FnMut(BucketEntry<'_, V>) -> Control,
{
    fn visit(&mut self, entry: BucketEntry<'_, V>) -> Control {
        self(entry)
    }
}

pub(crate) fn codec_error(error: postcard::Error) -> LocalStoreError {
    LocalStoreError::Serialization(error.to_string())
}
