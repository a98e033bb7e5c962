//! B+ tree operations performed directly on disk pages
//!
//! Nothing is cached between calls: every operation reads the pages it needs
//! through the [`IndexFileHandle`], mutates their decoded image and writes
//! them back before returning.

use std::cmp::Ordering;

use tracing::{debug, trace};

use crate::file::PageNum;
use crate::record::RecordId;

use super::error::{IndexError, IndexResult};
use super::index_file::{IndexFileHandle, ensure_linkable};
use super::key::IndexKey;
use super::node::{Node, NodeEntry};
use super::serialization::NodeLayout;

/// Location of one leaf entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Position {
    pub page: PageNum,
    pub slot: usize,
}

/// What an overflowing page leaves for the level above
enum Propagation {
    /// The split reached the root and a new root was written
    Done,
    /// `separator` still has to go into `parent`
    Insert { parent: PageNum, separator: NodeEntry },
}

/// A B+ tree view over one open index file
pub(crate) struct PersistentBPlusTree<'a> {
    handle: &'a mut IndexFileHandle,
    layout: NodeLayout,
}

impl<'a> PersistentBPlusTree<'a> {
    pub fn new(handle: &'a mut IndexFileHandle, layout: NodeLayout) -> Self {
        Self { handle, layout }
    }

    pub fn root_page(&self) -> PageNum {
        self.handle.root_page()
    }

    pub fn read_node(&mut self, page: PageNum) -> IndexResult<Node> {
        self.handle.read_node(page, &self.layout)
    }

    fn write_node(&mut self, page: PageNum, node: &Node) -> IndexResult<()> {
        self.handle.write_node(page, node, &self.layout)
    }

    /// Upper bound on tree depth, used to stop on a corrupted cycle
    pub fn depth_limit(&self) -> IndexResult<u32> {
        Ok(self.handle.page_count()?.max(1))
    }

    /// Walk from the root to the leaf that should hold `key`
    pub fn traverse(&mut self, key: &IndexKey) -> IndexResult<PageNum> {
        let root = self.handle.root_page();
        let mut page = root;

        for _ in 0..self.depth_limit()? {
            let node = self.read_node(page)?;
            if node.is_leaf() {
                return Ok(page);
            }

            let slot = node.find_slot(key);
            let entry = node
                .entry(slot)
                .ok_or_else(|| IndexError::corrupted(page, "internal node has no entries"))?;
            let next = if entry.key.compare(key) == Ordering::Greater {
                entry.left_child
            } else {
                entry.right_child
            };
            trace!(page, slot, next = ?next, "index.traverse");
            page = next.ok_or_else(|| IndexError::corrupted(page, "entry without child"))?;
        }

        Err(IndexError::corrupted(root, "no leaf reached from root"))
    }

    /// Walk from the root along the first (or last) child to a leaf
    fn edge_leaf(&mut self, rightmost: bool) -> IndexResult<PageNum> {
        let root = self.handle.root_page();
        let mut page = root;

        for _ in 0..self.depth_limit()? {
            let node = self.read_node(page)?;
            if node.is_leaf() {
                return Ok(page);
            }
            let next = if rightmost {
                node.entries().last().and_then(|e| e.right_child)
            } else {
                node.entries().first().and_then(|e| e.left_child)
            };
            page = next.ok_or_else(|| IndexError::corrupted(page, "internal node has no child"))?;
        }

        Err(IndexError::corrupted(root, "no leaf reached from root"))
    }

    /// Number of levels, 1 for a lone leaf root
    pub fn height(&mut self) -> IndexResult<usize> {
        let mut levels = 1;
        let mut page = self.handle.root_page();
        loop {
            let node = self.read_node(page)?;
            if node.is_leaf() {
                return Ok(levels);
            }
            page = node
                .entries()
                .first()
                .and_then(|e| e.left_child)
                .ok_or_else(|| IndexError::corrupted(page, "internal node has no child"))?;
            levels += 1;
            if levels > self.depth_limit()? as usize + 1 {
                return Err(IndexError::corrupted(page, "tree deeper than page count"));
            }
        }
    }

    /// Nearest non-empty leaf strictly left (or right) of `page`
    fn neighbour_leaf(
        &mut self,
        page: PageNum,
        rightward: bool,
    ) -> IndexResult<Option<(PageNum, Node)>> {
        let mut current = page;
        for _ in 0..self.depth_limit()? {
            let node = self.read_node(current)?;
            let next = if rightward {
                node.header().right_sibling
            } else {
                node.header().left_sibling
            };
            let Some(next) = next else {
                return Ok(None);
            };
            let neighbour = self.read_node(next)?;
            if !neighbour.is_empty() {
                return Ok(Some((next, neighbour)));
            }
            current = next;
        }
        Err(IndexError::corrupted(page, "leaf chain does not terminate"))
    }

    /// First leaf entry accepted by `qualifies`, where accepted keys form a
    /// suffix of the key order; starts from the leaf `key` routes to
    pub fn first_position(
        &mut self,
        key: Option<&IndexKey>,
        qualifies: impl Fn(&IndexKey) -> bool,
    ) -> IndexResult<Option<(Position, IndexKey)>> {
        let mut page = match key {
            Some(key) => self.traverse(key)?,
            None => self.edge_leaf(false)?,
        };

        // Equal keys may straddle a split boundary; back up while the
        // previous leaf still ends with an accepted key.
        while let Some((prev, node)) = self.neighbour_leaf(page, false)? {
            if !node.entries().last().is_some_and(|e| qualifies(&e.key)) {
                break;
            }
            page = prev;
        }

        let mut current = Some(page);
        while let Some(page) = current {
            let node = self.read_node(page)?;
            if let Some(slot) = node.entries().iter().position(|e| qualifies(&e.key)) {
                let key = node.entries()[slot].key.clone();
                return Ok(Some((Position { page, slot }, key)));
            }
            current = node.header().right_sibling;
        }
        Ok(None)
    }

    /// Last leaf entry accepted by `qualifies`, where accepted keys form a
    /// prefix of the key order
    pub fn last_position(
        &mut self,
        key: Option<&IndexKey>,
        qualifies: impl Fn(&IndexKey) -> bool,
    ) -> IndexResult<Option<(Position, IndexKey)>> {
        let mut page = match key {
            Some(key) => self.traverse(key)?,
            None => self.edge_leaf(true)?,
        };

        while let Some((next, node)) = self.neighbour_leaf(page, true)? {
            if !node.entries().first().is_some_and(|e| qualifies(&e.key)) {
                break;
            }
            page = next;
        }

        let mut current = Some(page);
        while let Some(page) = current {
            let node = self.read_node(page)?;
            if let Some(slot) = node.entries().iter().rposition(|e| qualifies(&e.key)) {
                let key = node.entries()[slot].key.clone();
                return Ok(Some((Position { page, slot }, key)));
            }
            current = node.header().left_sibling;
        }
        Ok(None)
    }

    /// Position after `pos` in the leaf chain, skipping empty leaves
    pub fn next_position(&mut self, pos: Position) -> IndexResult<Option<Position>> {
        let node = self.read_node(pos.page)?;
        if pos.slot + 1 < node.len() {
            return Ok(Some(Position {
                page: pos.page,
                slot: pos.slot + 1,
            }));
        }
        Ok(self
            .neighbour_leaf(pos.page, true)?
            .map(|(page, _)| Position { page, slot: 0 }))
    }

    /// Insert `(key, rid)`, splitting pages up the tree as needed
    pub fn insert(&mut self, key: IndexKey, rid: RecordId) -> IndexResult<()> {
        let mut page = self.traverse(&key)?;
        let mut pending = NodeEntry::leaf(key, rid);

        loop {
            let mut node = self.read_node(page)?;
            if node.has_room(&self.layout) {
                place(page, &mut node, pending)?;
                return self.write_node(page, &node);
            }

            match self.split(page, node, pending)? {
                Propagation::Done => return Ok(()),
                Propagation::Insert { parent, separator } => {
                    page = parent;
                    pending = separator;
                }
            }
        }
    }

    /// Split the full page `page`, place `pending` in the proper half, and
    /// persist both halves
    fn split(
        &mut self,
        page: PageNum,
        mut node: Node,
        pending: NodeEntry,
    ) -> IndexResult<Propagation> {
        let new_page = self.handle.next_page_num()?;
        let (separator, mut right) = node.split();
        let is_leaf = node.is_leaf();

        debug!(
            page,
            new_page,
            is_leaf,
            separator = %separator.key,
            "index.split"
        );

        if is_leaf {
            right.header_mut().right_sibling = node.header().right_sibling;
            right.header_mut().left_sibling = Some(page);
            node.header_mut().right_sibling = Some(new_page);
        }

        let goes_left = if is_leaf {
            pending.key.compare(&separator.key) == Ordering::Less
        } else {
            pending
                .left_child
                .is_some_and(|child| node.references_child(child))
        };
        if goes_left {
            place(page, &mut node, pending)?;
        } else {
            place(new_page, &mut right, pending)?;
        }

        let promoted = NodeEntry::separator(separator.key, page, new_page);

        match node.header().parent {
            None => {
                let root_page = ensure_linkable(new_page + 1)?;
                node.header_mut().parent = Some(root_page);
                right.header_mut().parent = Some(root_page);

                self.persist_halves(page, &node, new_page, &right)?;

                let mut root = Node::new_internal(&self.layout);
                place(root_page, &mut root, promoted)?;
                self.handle.append_node(root_page, &root, &self.layout)?;
                self.handle.set_root(root_page);

                debug!(root_page, left = page, right = new_page, "index.new_root");
                Ok(Propagation::Done)
            }
            Some(parent) => {
                self.persist_halves(page, &node, new_page, &right)?;
                Ok(Propagation::Insert {
                    parent,
                    separator: promoted,
                })
            }
        }
    }

    /// Write the left half, append the right half, then fix the links that
    /// point at the right half from outside it
    fn persist_halves(
        &mut self,
        page: PageNum,
        left: &Node,
        new_page: PageNum,
        right: &Node,
    ) -> IndexResult<()> {
        self.write_node(page, left)?;
        self.handle.append_node(new_page, right, &self.layout)?;

        if right.is_leaf() {
            if let Some(neighbour_page) = right.header().right_sibling {
                let mut neighbour = self.read_node(neighbour_page)?;
                neighbour.header_mut().left_sibling = Some(new_page);
                self.write_node(neighbour_page, &neighbour)?;
            }
        } else {
            for child_page in right.children() {
                let mut child = self.read_node(child_page)?;
                child.header_mut().parent = Some(new_page);
                self.write_node(child_page, &child)?;
            }
        }
        Ok(())
    }

    /// Remove the entry matching both `key` and `rid`
    pub fn delete(&mut self, key: &IndexKey, rid: RecordId) -> IndexResult<()> {
        let start = self.first_position(Some(key), |k| k.compare(key) != Ordering::Less)?;

        let mut current = start.map(|(pos, _)| pos);
        while let Some(pos) = current {
            let mut node = self.read_node(pos.page)?;
            let entry = node
                .entry(pos.slot)
                .ok_or_else(|| IndexError::corrupted(pos.page, "slot beyond entry count"))?;

            if entry.key.compare(key) != Ordering::Equal {
                break;
            }
            if entry.rid == rid {
                node.remove_at(pos.slot);
                debug!(page = pos.page, slot = pos.slot, "index.delete");
                return self.write_node(pos.page, &node);
            }
            current = self.next_position(pos)?;
        }

        Err(IndexError::EntryNotFound(key.to_string()))
    }
}

/// Put `entry` into `node` at its sorted position
fn place(page: PageNum, node: &mut Node, entry: NodeEntry) -> IndexResult<()> {
    if node.is_leaf() {
        node.insert_sorted(entry);
        return Ok(());
    }
    node.insert_separator(entry)
        .map(|_| ())
        .ok_or_else(|| IndexError::corrupted(page, "split child is not referenced by its parent"))
}
