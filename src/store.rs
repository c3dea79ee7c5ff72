//! File store abstraction over a concrete filesystem location.
//!
//! This module provides the seam between the synchronization core and the
//! real filesystem:
//! - `FileStore` - stat/list/read/write/move operations on one location
//! - `LocalStore` - the local-disk implementation over `std::fs`
//! - `SafeFileWriter`/`SafeFileReader` - crash-safe replace-in-place streams

mod info;
mod local;
mod safe;

use std::io::{Read, Write};
use std::path::Path;

use bitflags::bitflags;

use crate::error::{LocalStoreError, Result};

pub use info::{FileAttributes, FileInfo};
pub use local::LocalStore;
pub use safe::{SafeFileReader, SafeFileWriter};

bitflags! {
    /// Option flags for store operations.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct StoreFlags: u32 {
        /// Open an output stream for appending instead of truncating.
        const APPEND = 1 << 0;
        /// Create only the immediate target, not missing ancestors; copy
        /// only the directory itself, not its children.
        const SHALLOW = 1 << 1;
        /// Allow copy/move to replace an existing destination.
        const OVERWRITE = 1 << 2;
        /// Hint that remote contents may be cached in a local file.
        const CACHE = 1 << 3;
    }
}

/// An abstraction over one filesystem location.
///
/// A store handle names a location; the location itself may or may not exist.
/// Handles are cheap and stat is performed on demand via `fetch_info`.
pub trait FileStore {
    /// Stats this location without following a final symbolic link.
    ///
    /// Never fails: a missing location yields `FileInfo` with `exists=false`.
    fn fetch_info(&self) -> FileInfo;

    /// Names of child entries, ascending. Fails if this is not a directory.
    fn child_names(&self) -> Result<Vec<String>>;

    /// Infos of child entries, sorted ascending by name.
    ///
    /// An entry that vanishes between the directory listing and its stat is
    /// omitted rather than failing the listing.
    fn child_infos(&self) -> Result<Vec<FileInfo>>;

    /// Handle for the named child of this location.
    fn child(&self, name: &str) -> Box<dyn FileStore>;

    /// A new handle naming this same location.
    fn duplicate(&self) -> Box<dyn FileStore>;

    /// Handle for the parent location, if any.
    fn parent(&self) -> Option<Box<dyn FileStore>>;

    /// Creates a directory here. `SHALLOW` requires the parent to exist.
    fn mkdir(&self, flags: StoreFlags) -> Result<()>;

    /// Deletes this location (recursively for directories).
    fn delete(&self) -> Result<()>;

    /// Copies this location onto `destination`.
    fn copy(&self, destination: &dyn FileStore, flags: StoreFlags) -> Result<()>;

    /// Moves this location onto `destination`.
    ///
    /// A move that cannot be performed as a rename because source and
    /// destination live on different volumes fails with
    /// [`LocalStoreError::CrossDevice`]; see [`move_or_copy`].
    fn move_to(&self, destination: &dyn FileStore, flags: StoreFlags) -> Result<()>;

    /// Opens this location for reading.
    fn open_input(&self) -> Result<Box<dyn Read>>;

    /// Opens this location for writing (truncate unless `APPEND`).
    fn open_output(&self, flags: StoreFlags) -> Result<Box<dyn Write>>;

    /// The fully resolved, symlink-free real path of this location.
    fn canonical_path(&self) -> Result<std::path::PathBuf>;

    /// Whether child names at this location compare case-sensitively.
    fn case_sensitive(&self) -> bool {
        true
    }

    /// The native OS path of this location, when it has one.
    ///
    /// Lets same-filesystem implementations use rename for moves.
    fn native_path(&self) -> Option<&Path> {
        None
    }
}

/// Moves `source` onto `destination`, falling back to copy-then-delete when
/// the move fails because it would cross volumes.
pub fn move_or_copy(
    source: &dyn FileStore,
    destination: &dyn FileStore,
    flags: StoreFlags,
) -> Result<()> {
    match source.move_to(destination, flags) {
        Err(LocalStoreError::CrossDevice { .. }) => {
            source.copy(destination, flags)?;
            source.delete()
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use tempfile::TempDir;

    #[test]
    fn move_or_copy_plain_rename() {
        let temp = TempDir::new().unwrap();
        let src = LocalStore::new(temp.path().join("a.txt"));
        let dst = LocalStore::new(temp.path().join("b.txt"));
        {
            let mut out = src.open_output(StoreFlags::empty()).unwrap();
            out.write_all(b"payload").unwrap();
        }

        move_or_copy(&src, &dst, StoreFlags::empty()).unwrap();

        assert!(!src.fetch_info().exists);
        let mut contents = String::new();
        dst.open_input()
            .unwrap()
            .read_to_string(&mut contents)
            .unwrap();
        assert_eq!(contents, "payload");
    }
}
