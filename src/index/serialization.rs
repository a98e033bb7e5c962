//! Page codec: bounds-checked page buffers and the on-page node layout
//!
//! ```text
//! Header (20 bytes)
//! Offset  Size  Field
//! ------  ----  -----
//! 0       1     is_leaf (0 = internal, 1 = leaf)
//! 1       1     reserved
//! 2       2     entry_count (u16, little-endian)
//! 4       2     free_offset (u16, little-endian)
//! 6       2     reserved
//! 8       4     left_sibling (i32, -1 = none)
//! 12      4     right_sibling (i32, -1 = none)
//! 16      4     parent (i32, -1 = none)
//!
//! Entry (key_width + 16 bytes), packed from offset 20 in key order
//! 0           key_width  key slot
//! key_width   4          rid.page_num (u32)
//! +4          4          rid.slot_num (u32)
//! +8          4          left_child (i32, -1 = none)
//! +12         4          right_child (i32, -1 = none)
//! ```
//!
//! Int and Real key slots are 4 bytes. A VarChar key slot is a 4-byte length
//! followed by `attribute.length` bytes, zero padded.

use std::fmt;
use std::ops::Range;

use crate::file::{PAGE_SIZE, PageNum};
use crate::record::{AttrType, Attribute, RecordId};

use super::error::{IndexError, IndexResult};
use super::key::IndexKey;
use super::node::{Node, NodeEntry, NodeHeader};

/// Size of the node header at offset 0 of every page
pub const HEADER_SIZE: usize = 20;

/// Smallest node capacity that lets an internal split leave both halves non-empty
pub const MIN_CAPACITY: usize = 3;

const OFFSET_IS_LEAF: usize = 0;
const OFFSET_ENTRY_COUNT: usize = 2;
const OFFSET_FREE_OFFSET: usize = 4;
const OFFSET_LEFT_SIBLING: usize = 8;
const OFFSET_RIGHT_SIBLING: usize = 12;
const OFFSET_PARENT: usize = 16;

/// Bytes per entry besides the key slot
const ENTRY_TAIL_SIZE: usize = 16;

/// On-page encoding of "no page"
const NO_PAGE: i32 = -1;

/// One page worth of bytes with bounds-checked typed access
#[derive(Clone, PartialEq, Eq)]
pub struct PageBuffer {
    data: Box<[u8]>,
}

impl PageBuffer {
    /// A zeroed page
    pub fn new() -> Self {
        Self {
            data: vec![0u8; PAGE_SIZE].into_boxed_slice(),
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    fn range(&self, offset: usize, len: usize) -> IndexResult<Range<usize>> {
        match offset.checked_add(len) {
            Some(end) if end <= self.data.len() => Ok(offset..end),
            _ => Err(IndexError::PageOutOfBounds { offset, len }),
        }
    }

    pub fn read_bytes(&self, offset: usize, len: usize) -> IndexResult<&[u8]> {
        let range = self.range(offset, len)?;
        Ok(&self.data[range])
    }

    pub fn write_bytes(&mut self, offset: usize, bytes: &[u8]) -> IndexResult<()> {
        let range = self.range(offset, bytes.len())?;
        self.data[range].copy_from_slice(bytes);
        Ok(())
    }

    fn read_array<const N: usize>(&self, offset: usize) -> IndexResult<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.read_bytes(offset, N)?);
        Ok(out)
    }

    pub fn read_u8(&self, offset: usize) -> IndexResult<u8> {
        Ok(self.read_array::<1>(offset)?[0])
    }

    pub fn read_u16(&self, offset: usize) -> IndexResult<u16> {
        Ok(u16::from_le_bytes(self.read_array(offset)?))
    }

    pub fn read_u32(&self, offset: usize) -> IndexResult<u32> {
        Ok(u32::from_le_bytes(self.read_array(offset)?))
    }

    pub fn read_i32(&self, offset: usize) -> IndexResult<i32> {
        Ok(i32::from_le_bytes(self.read_array(offset)?))
    }

    pub fn read_f32(&self, offset: usize) -> IndexResult<f32> {
        Ok(f32::from_le_bytes(self.read_array(offset)?))
    }

    pub fn write_u8(&mut self, offset: usize, value: u8) -> IndexResult<()> {
        self.write_bytes(offset, &[value])
    }

    pub fn write_u16(&mut self, offset: usize, value: u16) -> IndexResult<()> {
        self.write_bytes(offset, &value.to_le_bytes())
    }

    pub fn write_u32(&mut self, offset: usize, value: u32) -> IndexResult<()> {
        self.write_bytes(offset, &value.to_le_bytes())
    }

    pub fn write_i32(&mut self, offset: usize, value: i32) -> IndexResult<()> {
        self.write_bytes(offset, &value.to_le_bytes())
    }

    pub fn write_f32(&mut self, offset: usize, value: f32) -> IndexResult<()> {
        self.write_bytes(offset, &value.to_le_bytes())
    }
}

impl Default for PageBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for PageBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PageBuffer")
            .field("len", &self.data.len())
            .finish_non_exhaustive()
    }
}

/// Entry geometry of one index, derived from its attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeLayout {
    pub attr_type: AttrType,
    /// Bytes reserved for the key slot
    pub key_width: usize,
    /// Bytes per entry, key slot included
    pub entry_size: usize,
    /// Maximum number of entries per node
    pub capacity: usize,
}

impl NodeLayout {
    /// Derive the layout for `attr`, optionally capping the entries per node
    pub fn new(attr: &Attribute, max_entries: Option<usize>) -> IndexResult<Self> {
        let key_width = match attr.attr_type {
            AttrType::Int | AttrType::Real => 4,
            AttrType::VarChar => 4 + attr.length as usize,
        };
        let entry_size = key_width + ENTRY_TAIL_SIZE;
        let physical = (PAGE_SIZE - HEADER_SIZE) / entry_size;
        let capacity = max_entries.map_or(physical, |cap| cap.min(physical));

        if capacity < MIN_CAPACITY {
            return Err(IndexError::InvalidCapacity(capacity));
        }

        Ok(Self {
            attr_type: attr.attr_type,
            key_width,
            entry_size,
            capacity,
        })
    }

    /// Byte offset of entry `slot`
    pub fn entry_offset(&self, slot: usize) -> usize {
        HEADER_SIZE + slot * self.entry_size
    }
}

pub(crate) fn encode_link(link: Option<PageNum>) -> i32 {
    link.map_or(NO_PAGE, |page| page as i32)
}

pub(crate) fn decode_link(raw: i32) -> IndexResult<Option<PageNum>> {
    match raw {
        NO_PAGE => Ok(None),
        page if page >= 0 => Ok(Some(page as PageNum)),
        other => Err(IndexError::DeserializationError(format!(
            "invalid page link {}",
            other
        ))),
    }
}

fn write_header(page: &mut PageBuffer, header: &NodeHeader) -> IndexResult<()> {
    page.write_u8(OFFSET_IS_LEAF, u8::from(header.is_leaf))?;
    page.write_u16(OFFSET_ENTRY_COUNT, header.entry_count)?;
    page.write_u16(OFFSET_FREE_OFFSET, header.free_offset)?;
    page.write_i32(OFFSET_LEFT_SIBLING, encode_link(header.left_sibling))?;
    page.write_i32(OFFSET_RIGHT_SIBLING, encode_link(header.right_sibling))?;
    page.write_i32(OFFSET_PARENT, encode_link(header.parent))
}

/// Decode the header at offset 0
pub fn deserialize_header(page: &PageBuffer) -> IndexResult<NodeHeader> {
    let is_leaf = match page.read_u8(OFFSET_IS_LEAF)? {
        0 => false,
        1 => true,
        other => {
            return Err(IndexError::DeserializationError(format!(
                "invalid node kind byte {}",
                other
            )));
        }
    };

    Ok(NodeHeader {
        is_leaf,
        entry_count: page.read_u16(OFFSET_ENTRY_COUNT)?,
        free_offset: page.read_u16(OFFSET_FREE_OFFSET)?,
        left_sibling: decode_link(page.read_i32(OFFSET_LEFT_SIBLING)?)?,
        right_sibling: decode_link(page.read_i32(OFFSET_RIGHT_SIBLING)?)?,
        parent: decode_link(page.read_i32(OFFSET_PARENT)?)?,
    })
}

fn write_key(
    page: &mut PageBuffer,
    offset: usize,
    key: &IndexKey,
    layout: &NodeLayout,
) -> IndexResult<()> {
    match key {
        IndexKey::Int(v) => page.write_i32(offset, *v),
        IndexKey::Real(v) => page.write_f32(offset, *v),
        IndexKey::VarChar(bytes) => {
            let max = layout.key_width - 4;
            if bytes.len() > max {
                return Err(IndexError::KeyTooLong {
                    len: bytes.len(),
                    max,
                });
            }
            page.write_u32(offset, bytes.len() as u32)?;
            page.write_bytes(offset + 4, bytes)
        }
    }
}

fn read_key(page: &PageBuffer, offset: usize, layout: &NodeLayout) -> IndexResult<IndexKey> {
    match layout.attr_type {
        AttrType::Int => Ok(IndexKey::Int(page.read_i32(offset)?)),
        AttrType::Real => Ok(IndexKey::Real(page.read_f32(offset)?)),
        AttrType::VarChar => {
            let len = page.read_u32(offset)? as usize;
            if len > layout.key_width - 4 {
                return Err(IndexError::DeserializationError(format!(
                    "varchar key length {} exceeds slot width {}",
                    len,
                    layout.key_width - 4
                )));
            }
            Ok(IndexKey::VarChar(page.read_bytes(offset + 4, len)?.to_vec()))
        }
    }
}

fn write_entry(
    page: &mut PageBuffer,
    offset: usize,
    entry: &NodeEntry,
    layout: &NodeLayout,
) -> IndexResult<()> {
    if entry.key.attr_type() != layout.attr_type {
        return Err(IndexError::KeyTypeMismatch {
            expected: layout.attr_type,
            actual: entry.key.attr_type(),
        });
    }
    write_key(page, offset, &entry.key, layout)?;

    let tail = offset + layout.key_width;
    page.write_u32(tail, entry.rid.page_num)?;
    page.write_u32(tail + 4, entry.rid.slot_num)?;
    page.write_i32(tail + 8, encode_link(entry.left_child))?;
    page.write_i32(tail + 12, encode_link(entry.right_child))
}

fn read_entry(page: &PageBuffer, offset: usize, layout: &NodeLayout) -> IndexResult<NodeEntry> {
    let key = read_key(page, offset, layout)?;

    let tail = offset + layout.key_width;
    Ok(NodeEntry {
        key,
        rid: RecordId::new(page.read_u32(tail)?, page.read_u32(tail + 4)?),
        left_child: decode_link(page.read_i32(tail + 8)?)?,
        right_child: decode_link(page.read_i32(tail + 12)?)?,
    })
}

/// Encode a node into a fresh page
pub fn serialize_node(node: &Node, layout: &NodeLayout) -> IndexResult<PageBuffer> {
    let mut page = PageBuffer::new();
    write_header(&mut page, node.header())?;

    for (slot, entry) in node.entries().iter().enumerate() {
        write_entry(&mut page, layout.entry_offset(slot), entry, layout)?;
    }

    Ok(page)
}

/// Decode the node stored in `page`
pub fn deserialize_node(page: &PageBuffer, layout: &NodeLayout) -> IndexResult<Node> {
    let header = deserialize_header(page)?;

    let count = header.entry_count as usize;
    let expected_free = layout.entry_offset(count);
    if header.free_offset as usize != expected_free || expected_free > PAGE_SIZE {
        return Err(IndexError::DeserializationError(format!(
            "free offset {} does not match {} entries of {} bytes",
            header.free_offset, count, layout.entry_size
        )));
    }

    let entries = (0..count)
        .map(|slot| read_entry(page, layout.entry_offset(slot), layout))
        .collect::<IndexResult<Vec<_>>>()?;

    Ok(Node::from_parts(header, entries, layout))
}

/// The page written at page 0 of a new index file: an empty leaf root
pub fn empty_leaf_page() -> IndexResult<PageBuffer> {
    let mut page = PageBuffer::new();
    write_header(&mut page, &NodeHeader::new(true))?;
    Ok(page)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn int_layout() -> NodeLayout {
        NodeLayout::new(&Attribute::int("id"), None).unwrap()
    }

    #[test]
    fn test_page_buffer_bounds() {
        let mut page = PageBuffer::new();
        page.write_u16(PAGE_SIZE - 2, 0xBEEF).unwrap();
        assert_eq!(page.read_u16(PAGE_SIZE - 2).unwrap(), 0xBEEF);

        assert!(matches!(
            page.read_u32(PAGE_SIZE - 2),
            Err(IndexError::PageOutOfBounds { .. })
        ));
        assert!(matches!(
            page.write_bytes(usize::MAX, &[1]),
            Err(IndexError::PageOutOfBounds { .. })
        ));
    }

    #[test]
    fn test_layout_sizes() {
        let layout = int_layout();
        assert_eq!(layout.entry_size, 20);
        assert_eq!(layout.capacity, (PAGE_SIZE - HEADER_SIZE) / 20);

        let varchar = NodeLayout::new(&Attribute::varchar("name", 30), None).unwrap();
        assert_eq!(varchar.key_width, 34);
        assert_eq!(varchar.entry_size, 50);

        let capped = NodeLayout::new(&Attribute::int("id"), Some(4)).unwrap();
        assert_eq!(capped.capacity, 4);
    }

    #[test]
    fn test_layout_rejects_tiny_capacity() {
        assert!(matches!(
            NodeLayout::new(&Attribute::int("id"), Some(2)),
            Err(IndexError::InvalidCapacity(2))
        ));
        assert!(matches!(
            NodeLayout::new(&Attribute::varchar("blob", 2000), None),
            Err(IndexError::InvalidCapacity(_))
        ));
    }

    #[test]
    fn test_empty_leaf_page() {
        let page = empty_leaf_page().unwrap();
        let node = deserialize_node(&page, &int_layout()).unwrap();
        assert!(node.is_leaf());
        assert!(node.is_empty());
        assert_eq!(node.header().free_offset as usize, HEADER_SIZE);
        assert_eq!(node.header().parent, None);
        assert_eq!(node.header().left_sibling, None);
        assert_eq!(node.header().right_sibling, None);
        assert_eq!(page.read_i32(OFFSET_PARENT).unwrap(), -1);
    }

    #[test]
    fn test_leaf_node_serialization() {
        let layout = NodeLayout::new(&Attribute::varchar("name", 8), None).unwrap();
        let mut node = Node::new_leaf(&layout);
        node.insert_sorted(NodeEntry::leaf(IndexKey::from("pear"), RecordId::new(1, 0)));
        node.insert_sorted(NodeEntry::leaf(IndexKey::from("apple"), RecordId::new(1, 1)));
        node.insert_sorted(NodeEntry::leaf(IndexKey::from(""), RecordId::new(2, 0)));
        node.header_mut().right_sibling = Some(7);
        node.header_mut().parent = Some(3);

        let page = serialize_node(&node, &layout).unwrap();
        let decoded = deserialize_node(&page, &layout).unwrap();

        assert_eq!(decoded, node);
        assert_eq!(decoded.entry(1).unwrap().key, IndexKey::from("apple"));
    }

    #[test]
    fn test_internal_node_serialization() {
        let layout = NodeLayout::new(&Attribute::real("x"), None).unwrap();
        let mut node = Node::new_internal(&layout);
        node.insert_separator(NodeEntry::separator(IndexKey::Real(2.5), 0, 1))
            .unwrap();
        node.insert_separator(NodeEntry::separator(IndexKey::Real(4.0), 1, 2))
            .unwrap();

        let page = serialize_node(&node, &layout).unwrap();
        let decoded = deserialize_node(&page, &layout).unwrap();

        assert_eq!(decoded, node);
        assert_eq!(decoded.children(), vec![0, 1, 2]);
    }

    #[test]
    fn test_deserialize_rejects_inconsistent_free_offset() {
        let layout = int_layout();
        let mut page = empty_leaf_page().unwrap();
        page.write_u16(OFFSET_ENTRY_COUNT, 2).unwrap();

        let result = deserialize_node(&page, &layout);
        assert!(matches!(result, Err(IndexError::DeserializationError(_))));
    }

    #[test]
    fn test_deserialize_rejects_bad_kind() {
        let mut page = empty_leaf_page().unwrap();
        page.write_u8(OFFSET_IS_LEAF, 9).unwrap();
        assert!(deserialize_header(&page).is_err());
    }

    #[test]
    fn test_link_encoding() {
        assert_eq!(encode_link(None), -1);
        assert_eq!(encode_link(Some(12)), 12);
        assert_eq!(decode_link(-1).unwrap(), None);
        assert_eq!(decode_link(12).unwrap(), Some(12));
        assert!(decode_link(-7).is_err());
    }
}
