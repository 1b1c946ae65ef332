//! The in-memory filesystem tree shared by the catalog parser, the
//! allocator, and both pipelines.
//!
//! Nodes live in an arena and reference each other by index, so `..`
//! records can point at parents without shared ownership. `children`
//! keeps catalog insertion order, which determines physical write order;
//! name-sorted and breadth-first views are derived on demand for
//! directory extents and path tables.

use std::collections::VecDeque;
use std::path::PathBuf;

/// Arena index of a node.
pub type NodeId = usize;

/// What a node is. Exhaustive matching over this enum replaces the
/// downcasting the format's ancestors relied on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Directory,
    /// Plain Mode 2 Form 1 file.
    File,
    /// Mode 2 Form 2 file (streamed audio/video), stored with 2336-byte
    /// blocks on the host.
    XaFile,
    /// Zero-byte placeholder pointing into an audio track.
    CddaRef,
}

/// One filesystem node with every attribute the catalog preserves.
#[derive(Debug, Clone)]
pub struct Node {
    pub kind: NodeKind,
    /// ISO identifier; files carry the `;1` version suffix, the root is
    /// the empty string.
    pub name: String,
    /// Location of the backing bytes on the host filesystem.
    pub host_path: PathBuf,
    pub parent: Option<NodeId>,
    /// Children in catalog insertion order.
    pub children: Vec<NodeId>,

    /// Absolute sector requested in the catalog; 0 means don't care.
    pub requested_lbn: u32,
    /// Assigned LBN after allocation.
    pub first_sector: u32,
    /// Extent size in sectors after allocation (0 for audio references).
    pub sector_count: u32,
    /// Host payload size in bytes (files only).
    pub size_bytes: u64,
    /// The `SIZE` attribute from the catalog: the directory-record size
    /// of the original entry. Audio references emit this verbatim.
    pub node_size: u32,

    // Preserved XA metadata. Directories keep a second set for their
    // `..` record.
    pub gid: u16,
    pub uid: u16,
    pub attributes: u16,
    pub parent_attributes: u16,

    /// 14-digit `YYYYMMDDhhmmss` recording time (empty means zero time).
    pub date: String,
    pub parent_date: String,
    /// GMT offset in quarter hours.
    pub timezone: i8,
    pub parent_timezone: i8,

    pub hidden: bool,
    /// Y2K damage marker: 1 = own date broken, 10 = parent date broken,
    /// 11 = both.
    pub y2k: u8,
    /// Form 2 sectors had their EDC field zeroed on the original image.
    pub zero_edc: bool,

    /// 1-based path table record number, assigned with the path tables.
    pub record_number: u16,
}

impl Node {
    pub fn new(kind: NodeKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
            host_path: PathBuf::new(),
            parent: None,
            children: Vec::new(),
            requested_lbn: 0,
            first_sector: 0,
            sector_count: 0,
            size_bytes: 0,
            node_size: 0,
            gid: 0,
            uid: 0,
            attributes: 0,
            parent_attributes: 0,
            date: String::new(),
            parent_date: String::new(),
            timezone: 0,
            parent_timezone: 0,
            hidden: false,
            y2k: 0,
            zero_edc: false,
            record_number: 0,
        }
    }

    pub fn is_directory(&self) -> bool {
        self.kind == NodeKind::Directory
    }
}

/// The rooted tree. The root directory always occupies index 0.
#[derive(Debug)]
pub struct FsTree {
    nodes: Vec<Node>,
}

impl FsTree {
    pub fn new(root: Node) -> Self {
        Self { nodes: vec![root] }
    }

    pub fn root(&self) -> NodeId {
        0
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id]
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id]
    }

    /// Append a child under `parent`, preserving insertion order.
    pub fn add_child(&mut self, parent: NodeId, mut node: Node) -> NodeId {
        let id = self.nodes.len();
        node.parent = Some(parent);
        self.nodes.push(node);
        self.nodes[parent].children.push(id);
        id
    }

    /// Children of `id` sorted by name, the order directory extents and
    /// path tables use.
    pub fn sorted_children(&self, id: NodeId) -> Vec<NodeId> {
        let mut children = self.nodes[id].children.clone();
        children.sort_by(|&a, &b| self.nodes[a].name.cmp(&self.nodes[b].name));
        children
    }

    /// Pre-order traversal in insertion order: the physical write order
    /// of extents.
    pub fn preorder(&self) -> Vec<NodeId> {
        let mut out = Vec::with_capacity(self.nodes.len());
        self.preorder_into(self.root(), false, &mut out);
        out
    }

    /// Pre-order traversal with name-sorted children.
    pub fn preorder_sorted(&self) -> Vec<NodeId> {
        let mut out = Vec::with_capacity(self.nodes.len());
        self.preorder_into(self.root(), true, &mut out);
        out
    }

    fn preorder_into(&self, id: NodeId, sorted: bool, out: &mut Vec<NodeId>) {
        out.push(id);
        let children = if sorted {
            self.sorted_children(id)
        } else {
            self.nodes[id].children.clone()
        };
        for child in children {
            self.preorder_into(child, sorted, out);
        }
    }

    /// Breadth-first, name-sorted traversal over directories only: the
    /// path table record order.
    pub fn breadth_first_sorted_dirs(&self) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut queue = VecDeque::from([self.root()]);
        while let Some(id) = queue.pop_front() {
            if !self.nodes[id].is_directory() {
                continue;
            }
            out.push(id);
            for child in self.sorted_children(id) {
                if self.nodes[child].is_directory() {
                    queue.push_back(child);
                }
            }
        }
        out
    }

    /// Host-relative path of a node: the names from the root down,
    /// version suffixes stripped.
    pub fn relative_path(&self, id: NodeId) -> PathBuf {
        let mut parts = Vec::new();
        let mut cursor = Some(id);
        while let Some(current) = cursor {
            let node = &self.nodes[current];
            if !node.name.is_empty() {
                let name = node.name.split(';').next().unwrap_or(&node.name);
                parts.push(name.to_string());
            }
            cursor = node.parent;
        }
        parts.iter().rev().collect()
    }
}

#[cfg(test)]
#[path = "tests/tree_tests.rs"]
mod tests;
