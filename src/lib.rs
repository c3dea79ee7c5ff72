//! Local resource synchronization and persistent metadata indexing.
//!
//! This crate provides the core of a workspace refresh subsystem:
//! - Merge traversal reconciling an abstract resource tree with the real
//!   filesystem, with symlink-cycle protection
//! - Sharded persistent index attaching per-path metadata without loading
//!   the whole tree into memory
//! - Crash-safe atomic file replacement used by the index shards
//! - A file store abstraction with a local-disk implementation

pub mod bucket;
pub mod cancel;
pub mod error;
pub mod path;
pub mod store;
pub mod sync;
pub mod tree;
pub mod types;

// Re-export main types
pub use bucket::{
    Bucket, BucketCodec, BucketEntry, BucketTree, BucketVisitor, PropertyCodec, PropertyStore,
};
pub use cancel::CancellationToken;
pub use error::{LocalStoreError, Result};
pub use store::{
    FileInfo, FileStore, LocalStore, SafeFileReader, SafeFileWriter, StoreFlags,
};
pub use sync::{RefreshReport, SyncStamp, Synchronizer};
pub use tree::{MemoryResourceTree, ResourceTree, UnifiedTree, UnifiedTreeNode, UnifiedTreeVisitor};
pub use types::{Control, Depth, TraversalOutcome};
