//! Stat results for a single store location.

use std::path::PathBuf;

use bitflags::bitflags;

bitflags! {
    /// Platform-independent file attribute bits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct FileAttributes: u32 {
        const READ_ONLY = 1 << 0;
        const EXECUTABLE = 1 << 1;
        const HIDDEN = 1 << 2;
    }
}

/// The result of stat-ing one location.
///
/// A symbolic link is reported as existing even when its target is missing;
/// `directory`, `length` and `last_modified` describe the link target when it
/// resolves, and are zeroed for a dangling link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileInfo {
    /// The entry name (last path segment).
    pub name: String,
    /// Whether the location exists at all (a dangling link exists).
    pub exists: bool,
    /// Whether the location is (or links to) a directory.
    pub directory: bool,
    /// Whether the location itself is a symbolic link.
    pub symlink: bool,
    /// The raw link target, when `symlink` is set and readable.
    pub link_target: Option<PathBuf>,
    /// Content length in bytes (0 for directories and dangling links).
    pub length: u64,
    /// Last modification time, seconds since the unix epoch.
    pub last_modified: u64,
    /// Attribute bits.
    pub attributes: FileAttributes,
}

impl FileInfo {
    /// Info for a location that does not exist.
    pub fn missing(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            exists: false,
            directory: false,
            symlink: false,
            link_target: None,
            length: 0,
            last_modified: 0,
            attributes: FileAttributes::empty(),
        }
    }

    /// True when the location can be expanded as a directory.
    pub fn expandable(&self) -> bool {
        self.exists && self.directory
    }
}
