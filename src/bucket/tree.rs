//! Shard routing and depth-bounded visiting across shard boundaries.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::path::mirror_dir;
use crate::types::{Control, Depth};

use super::{Bucket, BucketCodec, BucketVisitor};

/// Routes workspace paths to their owning shard and keeps the single
/// currently-resident [`Bucket`].
///
/// The shard for a path is the mirror directory of its parent under the
/// index base: a shard holds the entries for the immediate children of one
/// workspace directory (the root's own entry lives in the base shard).
/// Crossing a shard boundary saves the previous shard if dirty, so callers
/// never juggle more than one resident shard per tree.
pub struct BucketTree<C: BucketCodec> {
    base: PathBuf,
    current: Bucket<C>,
}

impl<C: BucketCodec> BucketTree<C> {
    /// Creates a bucket tree persisting its shards under `base`.
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self {
            base: base.into(),
            current: Bucket::new(),
        }
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    /// The currently resident bucket.
    pub fn current(&self) -> &Bucket<C> {
        &self.current
    }

    pub fn current_mut(&mut self) -> &mut Bucket<C> {
        &mut self.current
    }

    /// Directory of the shard governing `path`.
    fn shard_dir_for(&self, path: &Path) -> PathBuf {
        match path.parent() {
            Some(parent) => mirror_dir(&self.base, parent),
            None => self.base.clone(),
        }
    }

    /// Makes the shard governing `path` resident.
    ///
    /// Must be called before reading or writing entries for `path`; an
    /// un-loaded shard behaves as empty.
    pub fn load_bucket_for(&mut self, path: &Path) -> Result<()> {
        let dir = self.shard_dir_for(path);
        self.current.load(dir)
    }

    /// Reads the value attached to `path`, loading its shard if needed.
    pub fn value_at(&mut self, path: &Path) -> Result<Option<&C::Value>> {
        self.load_bucket_for(path)?;
        Ok(self.current.entry_value(path))
    }

    /// Attaches `value` to `path`, loading its shard if needed. `None`
    /// removes the entry.
    pub fn set_value(&mut self, path: &Path, value: Option<C::Value>) -> Result<()> {
        self.load_bucket_for(path)?;
        self.current.set_entry_value(path, value);
        Ok(())
    }

    /// Flushes the resident shard.
    pub fn save_all(&mut self) -> Result<()> {
        self.current.save()
    }

    /// Visits every entry within `depth` of `root`, loading and discarding
    /// shards as the walk crosses shard boundaries. Ancestors are always
    /// presented before their descendants.
    pub fn accept(
        &mut self,
        visitor: &mut dyn BucketVisitor<C::Value>,
        root: &Path,
        depth: Depth,
    ) -> Result<()> {
        self.load_bucket_for(root)?;
        if self.current.accept(visitor, root, Depth::Zero)? == Control::Stop {
            return Ok(());
        }
        if depth == Depth::Zero {
            return Ok(());
        }
        let children_dir = mirror_dir(&self.base, root);
        self.visit_level(visitor, &children_dir, root, depth == Depth::Infinite)?;
        Ok(())
    }

    /// Visits the shard in `dir` (children of one workspace directory) and,
    /// when `recurse` is set, every shard below it.
    fn visit_level(
        &mut self,
        visitor: &mut dyn BucketVisitor<C::Value>,
        dir: &Path,
        root: &Path,
        recurse: bool,
    ) -> Result<Control> {
        self.current.load(dir.to_path_buf())?;
        let control = self
            .current
            .accept_filtered(visitor, root, Depth::Infinite, true)?;
        if control == Control::Stop || !recurse {
            return Ok(control);
        }
        let Ok(listing) = fs::read_dir(dir) else {
            // No physical shard directory means no deeper entries.
            return Ok(Control::Continue);
        };
        let mut subdirs: Vec<PathBuf> = listing
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().map(|t| t.is_dir()).unwrap_or(false))
            .map(|entry| entry.path())
            .collect();
        subdirs.sort_unstable();
        for subdir in subdirs {
            if self.visit_level(visitor, &subdir, root, true)? == Control::Stop {
                return Ok(Control::Stop);
            }
        }
        Ok(Control::Continue)
    }
}
