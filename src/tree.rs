//! Component B — directory tree model.
//!
//! An arena-backed n-ary tree: nodes reference their parent and children by
//! index rather than through `Rc`/`RefCell`, so there's no ownership cycle
//! to reason about (see spec.md §9, "Cyclic references").

use std::path::Path;

pub(crate) const ROOT: NodeId = NodeId(0);

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub(crate) struct NodeId(pub(crate) usize);

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum Kind {
    Directory,
    File,
}

/// What a file node's on-disk entry represents, replacing the teacher
/// source's overload of a single `file_size` field (spec.md §9).
#[derive(Clone, Copy, Debug, Eq, PartialEq, Default)]
pub(crate) enum EntryOp {
    #[default]
    Unset,
    /// A binary diff; `offset` points into the blob pool at the embedded
    /// file patch.
    Diff { offset: u64 },
    /// A whole-file addition compressed with the named selector.
    Add { offset: u64, selector: u8 },
    Delete,
}

pub(crate) struct Node {
    pub(crate) name: String,
    pub(crate) kind: Kind,
    pub(crate) parent: Option<NodeId>,
    pub(crate) children: Vec<NodeId>,
    /// For files: the original length, known while walking the filesystem.
    /// Unused once `op` has been assigned a payload offset.
    pub(crate) file_size: u64,
    pub(crate) op: EntryOp,
}

impl Node {
    fn new_dir(name: String, parent: Option<NodeId>) -> Self {
        Self {
            name,
            kind: Kind::Directory,
            parent,
            children: Vec::new(),
            file_size: 0,
            op: EntryOp::Unset,
        }
    }
}

/// An n-ary tree of named nodes. Node 0 is always the root and its own name
/// is never part of any path.
pub(crate) struct Tree {
    nodes: Vec<Node>,
}

impl Tree {
    #[must_use]
    pub(crate) fn new() -> Self {
        Self {
            nodes: vec![Node::new_dir(String::new(), None)],
        }
    }

    #[must_use]
    pub(crate) fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.0]
    }

    /// Splits `path` on `/` and descends matching children by name. When
    /// `create` is true, missing components (including the leaf) are
    /// materialized as directory nodes and the terminal node is returned.
    /// When `create` is false, a missing component yields `None` without
    /// mutating the tree.
    pub(crate) fn find(&mut self, path: &str, create: bool) -> Option<NodeId> {
        let mut current = ROOT;
        if path.is_empty() {
            return Some(current);
        }
        for component in path.split('/') {
            if component.is_empty() {
                continue;
            }
            let existing = self
                .nodes[current.0]
                .children
                .iter()
                .find(|&&child| self.nodes[child.0].name == component)
                .copied();
            current = match existing {
                Some(id) => id,
                None => {
                    if !create {
                        return None;
                    }
                    let id = NodeId(self.nodes.len());
                    self.nodes
                        .push(Node::new_dir(component.to_owned(), Some(current)));
                    self.nodes[current.0].children.push(id);
                    id
                }
            };
        }
        Some(current)
    }

    /// Appends a fresh child node of the given kind under `parent`. Unlike
    /// [`find`](Self::find), the caller supplies the kind directly — used
    /// when parsing a directory header, where each entry's kind is already
    /// known from its name tag rather than inferred by walking a path.
    pub(crate) fn new_child(&mut self, parent: NodeId, name: String, kind: Kind) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            name,
            kind,
            parent: Some(parent),
            children: Vec::new(),
            file_size: 0,
            op: EntryOp::Unset,
        });
        self.nodes[parent.0].children.push(id);
        id
    }

    /// Reconstructs the `/`-joined path of `id` from the root, excluding
    /// the root's own (empty) name.
    #[must_use]
    pub(crate) fn path_of(&self, id: NodeId) -> String {
        let mut parts = Vec::new();
        let mut current = id;
        while current != ROOT {
            let node = &self.nodes[current.0];
            parts.push(node.name.as_str());
            current = node.parent.expect("non-root node always has a parent");
        }
        parts.reverse();
        parts.join("/")
    }

    /// Depth-first pre-order listing of leaf-file paths, directories
    /// excluded, in child-insertion order within each directory.
    #[must_use]
    pub(crate) fn walk_files(&self) -> Vec<String> {
        self.pre_order()
            .into_iter()
            .filter(|&id| self.nodes[id.0].kind == Kind::File)
            .map(|id| self.path_of(id))
            .collect()
    }

    /// Depth-first pre-order traversal of every non-root node.
    #[must_use]
    pub(crate) fn pre_order(&self) -> Vec<NodeId> {
        let mut out = Vec::new();
        self.visit(ROOT, &mut out);
        out
    }

    fn visit(&self, id: NodeId, out: &mut Vec<NodeId>) {
        for &child in &self.nodes[id.0].children {
            out.push(child);
            if self.nodes[child.0].kind == Kind::Directory {
                self.visit(child, out);
            }
        }
    }

    /// Builds a tree from a real directory, normalizing path separators to
    /// `/` regardless of host platform (spec.md §4.B).
    pub(crate) fn from_filesystem(root: &Path) -> std::io::Result<Self> {
        let mut tree = Self::new();
        for entry in walkdir::WalkDir::new(root).min_depth(1) {
            let entry = entry.map_err(std::io::Error::from)?;
            let relative = entry
                .path()
                .strip_prefix(root)
                .expect("walkdir yields paths under its root");
            let normalized = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            let id = tree
                .find(&normalized, true)
                .expect("create=true always resolves");
            if entry.file_type().is_file() {
                let metadata = entry.metadata().map_err(std::io::Error::from)?;
                let node = tree.node_mut(id);
                node.kind = Kind::File;
                node.children.clear();
                node.file_size = metadata.len();
            }
        }
        Ok(tree)
    }
}

impl Default for Tree {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn find_creates_intermediate_directories() {
        let mut tree = Tree::new();
        let id = tree.find("a/b/c.bin", true).unwrap();
        assert_eq!(tree.path_of(id), "a/b/c.bin");
        assert_eq!(tree.node(id).kind, Kind::Directory);

        let a = tree.find("a", false).unwrap();
        assert_eq!(tree.node(a).children.len(), 1);
    }

    #[test]
    fn find_without_create_never_mutates() {
        let mut tree = Tree::new();
        assert!(tree.find("missing/path", false).is_none());
        assert_eq!(tree.pre_order().len(), 0);
    }

    #[test]
    fn walk_files_excludes_directories_and_preserves_order() {
        let mut tree = Tree::new();
        let b = tree.find("b.bin", true).unwrap();
        tree.node_mut(b).kind = Kind::File;
        let sub = tree.find("dir/a.bin", true).unwrap();
        tree.node_mut(sub).kind = Kind::File;

        assert_eq!(tree.walk_files(), vec!["b.bin", "dir/a.bin"]);
    }

    #[test]
    fn unique_names_within_a_directory() {
        let mut tree = Tree::new();
        let first = tree.find("x", true).unwrap();
        let second = tree.find("x", true).unwrap();
        assert_eq!(first, second);
        assert_eq!(tree.node(ROOT).children.len(), 1);
    }
}
