//! One merged position in a unified traversal.

use std::cmp::Ordering;

use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::store::{FileInfo, FileStore};

use super::ResourceTree;

/// A node representing one logical resource in the merged walk.
///
/// A node may exist in the workspace tree, in the filesystem, or in both;
/// its merged child list is computed at most once and cached, and may be
/// forced from a visitor (via [`children`](Self::children)) even when the
/// visitor elects not to descend.
pub struct UnifiedTreeNode<'t> {
    tree: &'t dyn ResourceTree,
    path: PathBuf,
    store: Box<dyn FileStore>,
    info: FileInfo,
    exists_in_workspace: bool,
    via_link: bool,
    level: usize,
    children: Option<Vec<UnifiedTreeNode<'t>>>,
}

impl<'t> UnifiedTreeNode<'t> {
    pub(super) fn new(
        tree: &'t dyn ResourceTree,
        path: PathBuf,
        store: Box<dyn FileStore>,
        info: FileInfo,
        exists_in_workspace: bool,
        via_link: bool,
        level: usize,
    ) -> Self {
        Self {
            tree,
            path,
            store,
            info,
            exists_in_workspace,
            via_link,
            level,
            children: None,
        }
    }

    /// The workspace path of this node.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The file store handle backing this node's location.
    pub fn store(&self) -> &dyn FileStore {
        self.store.as_ref()
    }

    /// The stat result for this node's location.
    pub fn info(&self) -> &FileInfo {
        &self.info
    }

    /// The on-disk entry name of this node.
    pub fn local_name(&self) -> &str {
        &self.info.name
    }

    pub fn exists_in_filesystem(&self) -> bool {
        self.info.exists
    }

    pub fn exists_in_workspace(&self) -> bool {
        self.exists_in_workspace
    }

    pub fn is_symlink(&self) -> bool {
        self.info.symlink
    }

    /// Whether this node or any ancestor on the walk is a symbolic link.
    pub fn reached_via_link(&self) -> bool {
        self.via_link
    }

    /// Levels below the traversal root (the root is 0).
    pub fn level(&self) -> usize {
        self.level
    }

    /// Whether this node has children on either side of the merge.
    pub fn expandable(&self) -> bool {
        self.info.expandable()
            || (self.exists_in_workspace && self.tree.is_container(&self.path))
    }

    /// The merged child list, computed on first use.
    ///
    /// Visitors may call this to learn child presence even when they return
    /// `false` to skip the subtree; computing children never enqueues them.
    pub fn children(&mut self) -> Result<&[UnifiedTreeNode<'t>]> {
        if self.children.is_none() {
            self.children = Some(self.compute_children()?);
        }
        Ok(self.children.as_deref().unwrap_or_default())
    }

    /// Consumes the node, yielding its merged children (cached or computed).
    pub(super) fn into_children(mut self) -> Result<Vec<UnifiedTreeNode<'t>>> {
        match self.children.take() {
            Some(children) => Ok(children),
            None => self.compute_children(),
        }
    }

    /// Merge-joins workspace child names with filesystem child infos by
    /// case-sensitivity-aware name order, one node per distinct name.
    fn compute_children(&self) -> Result<Vec<UnifiedTreeNode<'t>>> {
        let mut workspace_names = if self.exists_in_workspace && self.tree.is_container(&self.path)
        {
            self.tree.child_names(&self.path)
        } else {
            Vec::new()
        };
        let mut filesystem_infos = if self.info.expandable() {
            match self.store.child_infos() {
                Ok(infos) => infos,
                Err(error) => {
                    // The directory vanished between stat and listing; treat
                    // it as no longer present instead of failing the walk.
                    log::debug!("listing failed for {}: {}", self.path.display(), error);
                    Vec::new()
                }
            }
        } else {
            Vec::new()
        };

        let case_sensitive = self.store.case_sensitive();
        workspace_names.sort_by(|a, b| compare_names(a, b, case_sensitive));
        filesystem_infos.sort_by(|a, b| compare_names(&a.name, &b.name, case_sensitive));

        let mut children =
            Vec::with_capacity(workspace_names.len().max(filesystem_infos.len()));
        let mut workspace_names = workspace_names.into_iter().peekable();
        let mut filesystem_infos = filesystem_infos.into_iter().peekable();
        loop {
            let ordering = match (workspace_names.peek(), filesystem_infos.peek()) {
                (Some(name), Some(info)) => compare_names(name, &info.name, case_sensitive),
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (None, None) => break,
            };
            let workspace_name = match ordering {
                Ordering::Less | Ordering::Equal => workspace_names.next(),
                Ordering::Greater => None,
            };
            let filesystem_info = match ordering {
                Ordering::Greater | Ordering::Equal => filesystem_infos.next(),
                Ordering::Less => None,
            };
            let (name, info) = match (workspace_name, filesystem_info) {
                // Keep the workspace spelling as the logical identity.
                (Some(name), Some(info)) => (name, info),
                (Some(name), None) => {
                    let info = FileInfo::missing(name.clone());
                    (name, info)
                }
                (None, Some(info)) => (info.name.clone(), info),
                (None, None) => break,
            };
            let exists_in_workspace = !matches!(ordering, Ordering::Greater);
            let via_link = self.via_link || info.symlink;
            children.push(UnifiedTreeNode::new(
                self.tree,
                self.path.join(&name),
                self.store.child(&info.name),
                info,
                exists_in_workspace,
                via_link,
                self.level + 1,
            ));
        }
        Ok(children)
    }
}

/// Ascending name comparison, case-folded on case-insensitive stores.
fn compare_names(a: &str, b: &str, case_sensitive: bool) -> Ordering {
    if case_sensitive {
        a.cmp(b)
    } else {
        a.chars()
            .flat_map(|c| c.to_lowercase())
            .cmp(b.chars().flat_map(|c| c.to_lowercase()))
    }
}
