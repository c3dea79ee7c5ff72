//! Refresh reconciliation: unified walk + persistent sync stamps.
//!
//! A refresh drives a [`UnifiedTree`] walk over a subtree and compares what
//! it finds against the last-seen stamps persisted in a [`BucketTree`]. The
//! result is a report of discrepancies (workspace-only, filesystem-only and
//! changed paths) plus an updated stamp index for the next refresh. Stamps
//! are per-entry facts; a cancelled or failed walk leaves the index
//! self-consistent, merely stale for the part not reached.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::bucket::{BucketCodec, BucketTree};
use crate::cancel::CancellationToken;
use crate::error::Result;
use crate::store::FileStore;
use crate::tree::{ResourceTree, UnifiedTree, UnifiedTreeNode};
use crate::types::{Depth, TraversalOutcome};

/// Last-seen filesystem state for one path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncStamp {
    /// Modification time, seconds since the unix epoch.
    pub modified: u64,
    /// Content length in bytes.
    pub length: u64,
}

/// Bucket payload persisting [`SyncStamp`]s.
pub struct SyncStampCodec;

impl BucketCodec for SyncStampCodec {
    type Value = SyncStamp;

    const VERSION: u8 = 1;
    const INDEX_FILE_NAME: &'static str = "syncinfo.index";
    const VERSION_FILE_NAME: &'static str = "syncinfo.version";

    fn encode(value: &Self::Value, out: &mut Vec<u8>) -> Result<()> {
        let bytes = postcard::to_stdvec(value).map_err(crate::bucket::codec_error)?;
        out.extend_from_slice(&bytes);
        Ok(())
    }

    fn decode(bytes: &[u8]) -> Result<Self::Value> {
        postcard::from_bytes(bytes).map_err(crate::bucket::codec_error)
    }
}

/// What one refresh found.
#[derive(Debug)]
pub struct RefreshReport {
    /// Nodes reported by the walk.
    pub visited: usize,
    /// Paths present in the workspace tree but missing on disk.
    pub workspace_only: Vec<PathBuf>,
    /// Paths present on disk but unknown to the workspace tree.
    pub filesystem_only: Vec<PathBuf>,
    /// Paths whose stamp differs from the previous refresh.
    pub changed: Vec<PathBuf>,
    /// Whether the walk ran to completion.
    pub outcome: TraversalOutcome,
}

/// Reconciles a subtree against its last-seen stamps.
pub struct Synchronizer {
    index: BucketTree<SyncStampCodec>,
}

impl Synchronizer {
    /// Creates a synchronizer persisting its stamp index under `base`.
    pub fn new(index_base: impl Into<PathBuf>) -> Self {
        Self {
            index: BucketTree::new(index_base),
        }
    }

    /// The underlying stamp index.
    pub fn index(&mut self) -> &mut BucketTree<SyncStampCodec> {
        &mut self.index
    }

    /// Walks the subtree at `root_path`/`root_store`, comparing and updating
    /// stamps. The stamp index is flushed before returning, also on a
    /// cancelled walk.
    pub fn refresh(
        &mut self,
        tree: &dyn ResourceTree,
        root_path: &Path,
        root_store: Box<dyn FileStore>,
        depth: Depth,
        token: &CancellationToken,
    ) -> Result<RefreshReport> {
        let index = &mut self.index;
        let mut report = RefreshReport {
            visited: 0,
            workspace_only: Vec::new(),
            filesystem_only: Vec::new(),
            changed: Vec::new(),
            outcome: TraversalOutcome::Complete,
        };

        let mut unified = UnifiedTree::new(tree, root_path, root_store);
        let outcome = {
            let report = &mut report;
            let mut visitor = |node: &mut UnifiedTreeNode<'_>| -> Result<bool> {
                report.visited += 1;
                let path = node.path().to_path_buf();
                if node.exists_in_filesystem() {
                    if !node.exists_in_workspace() {
                        report.filesystem_only.push(path.clone());
                    }
                    let info = node.info();
                    let stamp = SyncStamp {
                        modified: info.last_modified,
                        length: info.length,
                    };
                    index.load_bucket_for(&path)?;
                    let previous = index.current().entry_value(&path).copied();
                    if previous.is_some_and(|previous| previous != stamp) {
                        report.changed.push(path.clone());
                    }
                    index.current_mut().set_entry_value(&path, Some(stamp));
                } else {
                    report.workspace_only.push(path.clone());
                    index.set_value(&path, None)?;
                }
                Ok(true)
            };
            unified.accept_cancelable(&mut visitor, depth, token)?
        };
        report.outcome = outcome;
        self.index.save_all()?;
        Ok(report)
    }
}
