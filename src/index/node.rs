//! In-memory image of one node page and the node mutator
//!
//! A [`Node`] is decoded from a page, mutated, and encoded back; it is never
//! kept between calls. Every mutator keeps `entry_count` and `free_offset` in
//! step with the entry array.

use crate::file::{PAGE_SIZE, PageNum};
use crate::record::RecordId;

use super::key::IndexKey;
use super::serialization::{HEADER_SIZE, NodeLayout};

/// Fixed-size header at offset 0 of every page
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeHeader {
    pub is_leaf: bool,
    pub entry_count: u16,
    /// Offset where the next entry would be written
    pub free_offset: u16,
    /// Leaf chain only
    pub left_sibling: Option<PageNum>,
    /// Leaf chain only
    pub right_sibling: Option<PageNum>,
    /// `None` on the root
    pub parent: Option<PageNum>,
}

impl NodeHeader {
    pub fn new(is_leaf: bool) -> Self {
        Self {
            is_leaf,
            entry_count: 0,
            free_offset: HEADER_SIZE as u16,
            left_sibling: None,
            right_sibling: None,
            parent: None,
        }
    }
}

/// One entry of a node
///
/// Leaf entries use `rid`; internal entries use `left_child`/`right_child`,
/// and adjacent internal entries share the child between them.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeEntry {
    pub key: IndexKey,
    pub rid: RecordId,
    pub left_child: Option<PageNum>,
    pub right_child: Option<PageNum>,
}

impl NodeEntry {
    pub fn leaf(key: IndexKey, rid: RecordId) -> Self {
        Self {
            key,
            rid,
            left_child: None,
            right_child: None,
        }
    }

    pub fn separator(key: IndexKey, left: PageNum, right: PageNum) -> Self {
        Self {
            key,
            rid: RecordId::default(),
            left_child: Some(left),
            right_child: Some(right),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    header: NodeHeader,
    entries: Vec<NodeEntry>,
    entry_size: usize,
}

impl Node {
    /// An empty leaf with no siblings and no parent
    pub fn new_leaf(layout: &NodeLayout) -> Self {
        Self::from_parts(NodeHeader::new(true), Vec::new(), layout)
    }

    /// An empty internal node with no parent
    pub fn new_internal(layout: &NodeLayout) -> Self {
        Self::from_parts(NodeHeader::new(false), Vec::new(), layout)
    }

    pub(crate) fn from_parts(
        header: NodeHeader,
        entries: Vec<NodeEntry>,
        layout: &NodeLayout,
    ) -> Self {
        let mut node = Self {
            header,
            entries,
            entry_size: layout.entry_size,
        };
        node.sync_header();
        node
    }

    fn sync_header(&mut self) {
        self.header.entry_count = self.entries.len() as u16;
        self.header.free_offset = (HEADER_SIZE + self.entries.len() * self.entry_size) as u16;
    }

    pub fn header(&self) -> &NodeHeader {
        &self.header
    }

    pub fn header_mut(&mut self) -> &mut NodeHeader {
        &mut self.header
    }

    pub fn is_leaf(&self) -> bool {
        self.header.is_leaf
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[NodeEntry] {
        &self.entries
    }

    pub fn entry(&self, slot: usize) -> Option<&NodeEntry> {
        self.entries.get(slot)
    }

    /// Whether one more entry fits without a split
    pub fn has_room(&self, layout: &NodeLayout) -> bool {
        self.entries.len() < layout.capacity
            && self.header.free_offset as usize + self.entry_size <= PAGE_SIZE
    }

    /// Index of the first entry whose key is >= `key`
    ///
    /// Returns the last index when every key is smaller, and 0 on an empty node.
    pub fn find_slot(&self, key: &IndexKey) -> usize {
        self.entries
            .iter()
            .position(|e| e.key.compare(key).is_ge())
            .unwrap_or_else(|| self.entries.len().saturating_sub(1))
    }

    /// Insert in key order, after any entries with an equal key
    ///
    /// Returns the slot the entry landed in.
    pub fn insert_sorted(&mut self, entry: NodeEntry) -> usize {
        let slot = self
            .entries
            .iter()
            .position(|e| e.key.compare(&entry.key).is_gt())
            .unwrap_or(self.entries.len());
        self.entries.insert(slot, entry);
        self.sync_header();
        slot
    }

    /// Insert a separator produced by splitting the child `entry.left_child`
    ///
    /// The slot is chosen by the child pointer rather than by key, so equal
    /// separator keys still land next to the child they bound. The entry after
    /// the new one is re-pointed at `entry.right_child`. Returns `None` if this
    /// node does not reference the split child.
    pub fn insert_separator(&mut self, entry: NodeEntry) -> Option<usize> {
        let slot = if self.entries.is_empty() {
            0
        } else {
            self.child_slot(entry.left_child?)?
        };

        let right = entry.right_child;
        self.entries.insert(slot, entry);
        if let Some(next) = self.entries.get_mut(slot + 1) {
            next.left_child = right;
        }
        self.sync_header();
        Some(slot)
    }

    /// Slot at which a separator to the right of `child` belongs
    fn child_slot(&self, child: PageNum) -> Option<usize> {
        if let Some(slot) = self.entries.iter().position(|e| e.left_child == Some(child)) {
            return Some(slot);
        }
        match self.entries.last() {
            Some(last) if last.right_child == Some(child) => Some(self.entries.len()),
            _ => None,
        }
    }

    /// Whether `child` is one of this internal node's children
    pub fn references_child(&self, child: PageNum) -> bool {
        self.child_slot(child).is_some()
    }

    /// Child page numbers in key order
    pub fn children(&self) -> Vec<PageNum> {
        let mut children = Vec::with_capacity(self.entries.len() + 1);
        if let Some(first) = self.entries.first().and_then(|e| e.left_child) {
            children.push(first);
        }
        children.extend(self.entries.iter().filter_map(|e| e.right_child));
        children
    }

    /// Remove the entry at `slot`, or `None` if the slot is out of range
    pub fn remove_at(&mut self, slot: usize) -> Option<NodeEntry> {
        if slot >= self.entries.len() {
            return None;
        }
        let removed = self.entries.remove(slot);
        self.sync_header();
        Some(removed)
    }

    /// Split at `len / 2`, keeping the lower half in `self`
    ///
    /// Returns the separator entry and the new right half. A leaf copies the
    /// separator key into the right half; an internal node moves the middle
    /// entry out entirely, and its children become the boundary between the
    /// halves. The right half inherits the node kind and parent; sibling links
    /// are left to the caller.
    pub fn split(&mut self) -> (NodeEntry, Node) {
        let mid = self.entries.len() / 2;
        let mut upper: Vec<NodeEntry> = self.entries.drain(mid..).collect();

        let separator = if self.header.is_leaf {
            upper[0].clone()
        } else {
            upper.remove(0)
        };

        let mut header = NodeHeader::new(self.header.is_leaf);
        header.parent = self.header.parent;

        let mut right = Node {
            header,
            entries: upper,
            entry_size: self.entry_size,
        };
        right.sync_header();
        self.sync_header();

        (separator, right)
    }
}
