//! Unified merge traversal over the workspace tree and the filesystem.
//!
//! A refresh needs to see every node present in *either* the abstract
//! workspace tree or the real filesystem, exactly once, in a stable order.
//! `UnifiedTree` produces that walk: per directory it merge-joins workspace
//! child names with file-store child listings into one combined child list
//! and reports each merged node to a visitor, which decides whether to
//! descend.
//!
//! The walk is iterative (an explicit work stack, no call-stack recursion)
//! so arbitrarily deep trees cannot overflow, and it carries an explicit
//! ancestor set of canonical locations for the active descent chain to cut
//! symbolic-link cycles: a link resolving to a directory already on the
//! chain is reported but never expanded.

mod node;
mod resource;

use std::path::{Path, PathBuf};

use fnv::FnvHashSet;

use crate::cancel::CancellationToken;
use crate::error::Result;
use crate::store::FileStore;
use crate::types::{Depth, TraversalOutcome};

pub use node::UnifiedTreeNode;
pub use resource::{MemoryResourceTree, ResourceTree};

/// Visitor driving a unified traversal.
///
/// Returning `true` descends into the node's merged children; `false` skips
/// the subtree. Either way the visitor may force the child list to be
/// computed via [`UnifiedTreeNode::children`].
pub trait UnifiedTreeVisitor {
    fn visit(&mut self, node: &mut UnifiedTreeNode<'_>) -> Result<bool>;
}

impl<F> UnifiedTreeVisitor for F
where
    F: FnMut(&mut UnifiedTreeNode<'_>) -> Result<bool>,
{
    fn visit(&mut self, node: &mut UnifiedTreeNode<'_>) -> Result<bool> {
        self(node)
    }
}

enum Frame<'t> {
    Visit(UnifiedTreeNode<'t>),
    /// Marks the end of an expanded node's subtree; pops its canonical
    /// location off the active descent chain.
    Ascend,
}

/// The merge-traversal engine.
///
/// One instance walks the subtree rooted at a workspace path whose on-disk
/// location is named by a file store handle. Walks are synchronous and run
/// on the calling thread; the caller holds whatever workspace lock covers
/// the subtree.
pub struct UnifiedTree<'t> {
    tree: &'t dyn ResourceTree,
    root_path: PathBuf,
    root_store: Box<dyn FileStore>,
}

impl<'t> UnifiedTree<'t> {
    pub fn new(
        tree: &'t dyn ResourceTree,
        root_path: impl Into<PathBuf>,
        root_store: Box<dyn FileStore>,
    ) -> Self {
        Self {
            tree,
            root_path: root_path.into(),
            root_store,
        }
    }

    pub fn root_path(&self) -> &Path {
        &self.root_path
    }

    /// Walks the subtree, visiting every merged node within `depth`.
    pub fn accept(
        &mut self,
        visitor: &mut dyn UnifiedTreeVisitor,
        depth: Depth,
    ) -> Result<TraversalOutcome> {
        self.accept_cancelable(visitor, depth, &CancellationToken::noop())
    }

    /// Like [`accept`](Self::accept), but checks `token` between node
    /// visits. A cancelled walk stops early and reports
    /// [`TraversalOutcome::Cancelled`]; nodes already visited stay visited,
    /// nothing is rolled back.
    pub fn accept_cancelable(
        &mut self,
        visitor: &mut dyn UnifiedTreeVisitor,
        depth: Depth,
        token: &CancellationToken,
    ) -> Result<TraversalOutcome> {
        let store = self.root_store.duplicate();
        let info = store.fetch_info();
        let exists_in_workspace = self.tree.exists(&self.root_path);
        let via_link = info.symlink;
        let root = UnifiedTreeNode::new(
            self.tree,
            self.root_path.clone(),
            store,
            info,
            exists_in_workspace,
            via_link,
            0,
        );

        let mut stack = vec![Frame::Visit(root)];
        // Canonical locations of every directory on the active descent
        // chain, kept as a set for membership tests and a parallel stack for
        // unwinding.
        let mut chain: Vec<PathBuf> = Vec::new();
        let mut on_chain: FnvHashSet<PathBuf> = FnvHashSet::default();

        while let Some(frame) = stack.pop() {
            let mut node = match frame {
                Frame::Ascend => {
                    if let Some(canonical) = chain.pop() {
                        on_chain.remove(&canonical);
                    }
                    continue;
                }
                Frame::Visit(node) => node,
            };
            if token.is_cancelled() {
                return Ok(TraversalOutcome::Cancelled);
            }
            let descend = visitor.visit(&mut node)?;
            if !descend || !depth.admits(node.level() + 1) || !node.expandable() {
                continue;
            }
            let Some(canonical) = canonical_for(&node, chain.last()) else {
                // Link target cannot be resolved; the node stays terminal.
                continue;
            };
            if node.reached_via_link() && on_chain.contains(&canonical) {
                // The link resolves to a directory already on the active
                // descent chain; expanding it would never terminate. The
                // node itself has been reported, its subtree is cut here.
                continue;
            }
            let children = node.into_children()?;
            stack.push(Frame::Ascend);
            on_chain.insert(canonical.clone());
            chain.push(canonical);
            for child in children.into_iter().rev() {
                stack.push(Frame::Visit(child));
            }
        }
        Ok(TraversalOutcome::Complete)
    }
}

/// The canonical real location to put on the descent chain for an expanded
/// node.
///
/// Cycle detection keys on resolved real paths, not on link text: distinct
/// links to one real directory must collide here. Non-link nodes extend the
/// parent's canonical location without touching the filesystem; symlinks are
/// fully resolved. Workspace-only nodes have no real location, so a
/// synthetic chain entry keeps push/pop balanced.
fn canonical_for(node: &UnifiedTreeNode<'_>, parent: Option<&PathBuf>) -> Option<PathBuf> {
    if node.is_symlink() {
        return node.store().canonical_path().ok();
    }
    match parent {
        Some(parent) => Some(parent.join(node.local_name())),
        None => node
            .store()
            .canonical_path()
            .ok()
            .or_else(|| Some(node.path().to_path_buf())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::LocalStore;
    use std::collections::BTreeSet;
    use std::fs::{self, File};
    use tempfile::TempDir;

    struct Fixture {
        _temp: TempDir,
        tree: MemoryResourceTree,
        root_store: LocalStore,
    }

    /// Workspace root `/root` mapped onto a temp directory with:
    /// - workspace-only: wbFile0, wbFolder0/wbFile1
    /// - filesystem-only: fsFile0, fsFolder0/fsFile1
    /// - both: shared/, shared/common.txt
    fn fixture() -> Fixture {
        let temp = TempDir::new().unwrap();
        let disk = temp.path();
        File::create(disk.join("fsFile0")).unwrap();
        fs::create_dir(disk.join("fsFolder0")).unwrap();
        File::create(disk.join("fsFolder0").join("fsFile1")).unwrap();
        fs::create_dir(disk.join("shared")).unwrap();
        File::create(disk.join("shared").join("common.txt")).unwrap();

        let mut tree = MemoryResourceTree::new();
        tree.insert_leaf(Path::new("/root/wbFile0"));
        tree.insert_leaf(Path::new("/root/wbFolder0/wbFile1"));
        tree.insert_leaf(Path::new("/root/shared/common.txt"));

        Fixture {
            root_store: LocalStore::new(disk),
            _temp: temp,
            tree,
        }
    }

    fn collect_walk(fixture: &Fixture, depth: Depth) -> Vec<(PathBuf, bool, bool)> {
        let mut unified = UnifiedTree::new(
            &fixture.tree,
            "/root",
            Box::new(fixture.root_store.clone()),
        );
        let mut visited = Vec::new();
        let outcome = unified
            .accept(
                &mut |node: &mut UnifiedTreeNode<'_>| {
                    visited.push((
                        node.path().to_path_buf(),
                        node.exists_in_workspace(),
                        node.exists_in_filesystem(),
                    ));
                    Ok(true)
                },
                depth,
            )
            .unwrap();
        assert!(outcome.is_complete());
        visited
    }

    #[test]
    fn merge_visits_union_exactly_once() {
        let fixture = fixture();
        let visited = collect_walk(&fixture, Depth::Infinite);

        let paths: Vec<&Path> = visited.iter().map(|(p, _, _)| p.as_path()).collect();
        let distinct: BTreeSet<&Path> = paths.iter().copied().collect();
        assert_eq!(paths.len(), distinct.len(), "duplicate visits");

        let expected: BTreeSet<PathBuf> = [
            "/root",
            "/root/fsFile0",
            "/root/fsFolder0",
            "/root/fsFolder0/fsFile1",
            "/root/shared",
            "/root/shared/common.txt",
            "/root/wbFile0",
            "/root/wbFolder0",
            "/root/wbFolder0/wbFile1",
        ]
        .iter()
        .map(PathBuf::from)
        .collect();
        assert_eq!(distinct.into_iter().map(Path::to_path_buf).collect::<BTreeSet<_>>(), expected);

        for &(ref path, in_workspace, in_filesystem) in &visited {
            let name = path.file_name().unwrap().to_string_lossy();
            if name.starts_with("fs") {
                assert!(!in_workspace && in_filesystem, "{path:?}");
            } else if name.starts_with("wb") {
                assert!(in_workspace && !in_filesystem, "{path:?}");
            }
        }
        let shared = visited
            .iter()
            .find(|(p, _, _)| p == Path::new("/root/shared"))
            .unwrap();
        assert!(shared.1 && shared.2);
    }

    #[test]
    fn parents_before_children_and_names_ascending() {
        let fixture = fixture();
        let visited = collect_walk(&fixture, Depth::Infinite);
        let order: Vec<&Path> = visited.iter().map(|(p, _, _)| p.as_path()).collect();

        for (index, path) in order.iter().enumerate() {
            if let Some(parent) = path.parent() {
                if let Some(at) = order.iter().position(|p| *p == parent) {
                    assert!(at < index, "{parent:?} visited after {path:?}");
                }
            }
        }
        // Siblings appear in ascending name order.
        let top: Vec<&str> = order
            .iter()
            .filter(|p| p.parent() == Some(Path::new("/root")))
            .map(|p| p.file_name().unwrap().to_str().unwrap())
            .collect();
        assert_eq!(
            top,
            vec!["fsFile0", "fsFolder0", "shared", "wbFile0", "wbFolder0"]
        );
    }

    #[test]
    fn depth_bounds_the_walk() {
        let fixture = fixture();
        assert_eq!(collect_walk(&fixture, Depth::Zero).len(), 1);

        let one: BTreeSet<PathBuf> = collect_walk(&fixture, Depth::One)
            .into_iter()
            .map(|(p, _, _)| p)
            .collect();
        assert!(one.contains(Path::new("/root/fsFolder0")));
        assert!(!one.contains(Path::new("/root/fsFolder0/fsFile1")));
    }

    #[test]
    fn skipping_a_subtree_still_computes_its_children() {
        let fixture = fixture();
        let mut unified = UnifiedTree::new(
            &fixture.tree,
            "/root",
            Box::new(fixture.root_store.clone()),
        );
        let mut visited = Vec::new();
        unified
            .accept(
                &mut |node: &mut UnifiedTreeNode<'_>| {
                    visited.push(node.path().to_path_buf());
                    let name = node.local_name().to_string();
                    // Child presence is available even for skipped subtrees.
                    let child_count = node.children()?.len();
                    if name == "fsFolder0" {
                        assert_eq!(child_count, 1);
                        return Ok(false);
                    }
                    Ok(true)
                },
                Depth::Infinite,
            )
            .unwrap();
        assert!(visited.contains(&PathBuf::from("/root/fsFolder0")));
        assert!(!visited.contains(&PathBuf::from("/root/fsFolder0/fsFile1")));
        assert!(visited.contains(&PathBuf::from("/root/wbFolder0/wbFile1")));
    }

    #[test]
    fn idempotent_re_traversal() {
        let fixture = fixture();
        let first = collect_walk(&fixture, Depth::Infinite);
        let second = collect_walk(&fixture, Depth::Infinite);
        assert_eq!(first, second);
    }

    #[test]
    fn cancellation_reports_partial_completion() {
        let fixture = fixture();
        let mut unified = UnifiedTree::new(
            &fixture.tree,
            "/root",
            Box::new(fixture.root_store.clone()),
        );
        let token = CancellationToken::new();
        let mut visits = 0;
        let outcome = unified
            .accept_cancelable(
                &mut |_node: &mut UnifiedTreeNode<'_>| {
                    visits += 1;
                    if visits == 2 {
                        token.cancel();
                    }
                    Ok(true)
                },
                Depth::Infinite,
                &token.clone(),
            )
            .unwrap();
        assert_eq!(outcome, TraversalOutcome::Cancelled);
        assert_eq!(visits, 2);
    }

    #[cfg(unix)]
    #[test]
    fn mutual_symlink_cycles_terminate() {
        use std::os::unix::fs::symlink;

        let temp = TempDir::new().unwrap();
        let disk = temp.path();
        for dir in ["a", "b", "c"] {
            fs::create_dir(disk.join(dir)).unwrap();
        }
        File::create(disk.join("b").join("marker.txt")).unwrap();
        File::create(disk.join("c").join("inner.txt")).unwrap();
        symlink(disk.join("b"), disk.join("a").join("link")).unwrap();
        symlink(disk.join("a"), disk.join("b").join("link1")).unwrap();
        symlink(disk.join("c"), disk.join("b").join("link2")).unwrap();
        symlink(disk.join("b"), disk.join("c").join("link")).unwrap();

        let tree = MemoryResourceTree::new();
        let mut unified =
            UnifiedTree::new(&tree, "/a", Box::new(LocalStore::new(disk.join("a"))));
        let mut visited = Vec::new();
        let outcome = unified
            .accept(
                &mut |node: &mut UnifiedTreeNode<'_>| {
                    visited.push(node.path().to_path_buf());
                    assert!(visited.len() < 64, "unbounded descent");
                    Ok(true)
                },
                Depth::Infinite,
            )
            .unwrap();
        assert!(outcome.is_complete());

        // Every real directory is reached at least once through some chain
        // of links, and the walk stays finite.
        assert!(visited.contains(&PathBuf::from("/a/link/marker.txt")));
        assert!(visited.contains(&PathBuf::from("/a/link/link2/inner.txt")));
        // b reached again under c stops at the cycle: link1/link2 below it
        // are reported but never expanded.
        let distinct: BTreeSet<&PathBuf> = visited.iter().collect();
        assert_eq!(distinct.len(), visited.len());
    }

    #[cfg(unix)]
    #[test]
    fn self_referential_link_is_terminal() {
        use std::os::unix::fs::symlink;

        let temp = TempDir::new().unwrap();
        let disk = temp.path();
        let root = disk.join("root");
        fs::create_dir(&root).unwrap();
        File::create(root.join("file.txt")).unwrap();
        symlink(&root, root.join("loop")).unwrap();

        let tree = MemoryResourceTree::new();
        let mut unified = UnifiedTree::new(&tree, "/root", Box::new(LocalStore::new(&root)));
        let mut visited = Vec::new();
        unified
            .accept(
                &mut |node: &mut UnifiedTreeNode<'_>| {
                    visited.push(node.path().to_path_buf());
                    Ok(true)
                },
                Depth::Infinite,
            )
            .unwrap();

        assert_eq!(
            visited,
            vec![
                PathBuf::from("/root"),
                PathBuf::from("/root/file.txt"),
                PathBuf::from("/root/loop"),
            ]
        );
    }

    #[cfg(unix)]
    #[test]
    fn two_links_to_one_ancestor_both_stop() {
        use std::os::unix::fs::symlink;

        // Distinct link names resolving to the same real ancestor must both
        // be cut; detection keys on the resolved path, not the link text.
        let temp = TempDir::new().unwrap();
        let root = temp.path().join("root");
        fs::create_dir(&root).unwrap();
        symlink(&root, root.join("first")).unwrap();
        symlink(temp.path().join("root"), root.join("second")).unwrap();

        let tree = MemoryResourceTree::new();
        let mut unified = UnifiedTree::new(&tree, "/root", Box::new(LocalStore::new(&root)));
        let mut visited = Vec::new();
        unified
            .accept(
                &mut |node: &mut UnifiedTreeNode<'_>| {
                    visited.push(node.path().to_path_buf());
                    Ok(true)
                },
                Depth::Infinite,
            )
            .unwrap();

        assert_eq!(
            visited,
            vec![
                PathBuf::from("/root"),
                PathBuf::from("/root/first"),
                PathBuf::from("/root/second"),
            ]
        );
    }

    #[cfg(unix)]
    #[test]
    fn dangling_link_is_reported_but_not_expanded() {
        use std::os::unix::fs::symlink;

        let temp = TempDir::new().unwrap();
        let root = temp.path().join("root");
        fs::create_dir(&root).unwrap();
        symlink(root.join("missing"), root.join("dangling")).unwrap();

        let tree = MemoryResourceTree::new();
        let mut unified = UnifiedTree::new(&tree, "/root", Box::new(LocalStore::new(&root)));
        let mut visited = Vec::new();
        unified
            .accept(
                &mut |node: &mut UnifiedTreeNode<'_>| {
                    if node.path() == Path::new("/root/dangling") {
                        assert!(node.exists_in_filesystem());
                        assert!(node.is_symlink());
                        assert!(!node.expandable());
                    }
                    visited.push(node.path().to_path_buf());
                    Ok(true)
                },
                Depth::Infinite,
            )
            .unwrap();
        assert!(visited.contains(&PathBuf::from("/root/dangling")));
    }
}
