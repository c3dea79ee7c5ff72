//! Workspace path keys.
//!
//! Resource paths are rooted, slash-separated logical paths (`/proj/dir/file`)
//! that name positions in the workspace tree, independent of where those
//! positions map on disk. The persistent index keys entries by the normalized
//! string form of a path so that shard files stay portable and entries sort
//! in pre-order.

use std::path::{Component, Path, PathBuf};

/// The workspace root path.
pub fn root() -> &'static Path {
    Path::new("/")
}

/// Returns the normalized string key for a workspace path.
///
/// The key is always rooted and slash-separated regardless of platform:
/// `/` for the root, `/a/b` otherwise.
pub fn path_key(path: &Path) -> String {
    let mut key = String::from("/");
    for component in path.components() {
        if let Component::Normal(name) = component {
            if key.len() > 1 {
                key.push('/');
            }
            key.push_str(&name.to_string_lossy());
        }
    }
    key
}

/// Number of name segments in a workspace path (the root has zero).
pub fn segment_count(path: &Path) -> usize {
    path.components()
        .filter(|c| matches!(c, Component::Normal(_)))
        .count()
}

/// Maps a workspace path onto a directory under `base`, mirroring its
/// segments. The root maps to `base` itself.
pub fn mirror_dir(base: &Path, path: &Path) -> PathBuf {
    let mut dir = base.to_path_buf();
    for component in path.components() {
        if let Component::Normal(name) = component {
            dir.push(name);
        }
    }
    dir
}
