//! Index file handle: an open paged file plus the current root page

use std::path::Path;

use tracing::{debug, trace};

use crate::file::{FileHandle, IoCounters, PageNum};

use super::error::{IndexError, IndexResult};
use super::node::Node;
use super::serialization::{
    NodeLayout, PageBuffer, deserialize_header, deserialize_node, serialize_node,
};

/// Highest page number an on-page link can hold
const MAX_LINKABLE_PAGE: PageNum = i32::MAX as PageNum;

/// Check that `page` can be stored in an on-page link
pub(crate) fn ensure_linkable(page: PageNum) -> IndexResult<PageNum> {
    if page > MAX_LINKABLE_PAGE {
        return Err(IndexError::AllocationFailed(format!(
            "page {} cannot be linked from a node",
            page
        )));
    }
    Ok(page)
}

/// An open index file
///
/// The root page number lives here and nowhere on disk; every page read,
/// write and append goes through this handle and is counted by it.
#[derive(Debug)]
pub struct IndexFileHandle {
    file: FileHandle,
    root: PageNum,
}

impl IndexFileHandle {
    /// Wrap an open file; the root starts at page 0
    pub(crate) fn new(file: FileHandle) -> Self {
        Self { file, root: 0 }
    }

    /// Page number of the current root
    pub fn root_page(&self) -> PageNum {
        self.root
    }

    pub(crate) fn set_root(&mut self, root: PageNum) {
        debug!(old_root = self.root, new_root = root, "index.root_changed");
        self.root = root;
    }

    /// Page reads, writes and appends made through this handle
    pub fn io_counters(&self) -> IoCounters {
        self.file.io_counters()
    }

    /// Number of pages in the index file
    pub fn page_count(&self) -> IndexResult<PageNum> {
        Ok(self.file.page_count()?)
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }

    pub(crate) fn into_file(self) -> FileHandle {
        self.file
    }

    pub(crate) fn read_page(&mut self, page: PageNum) -> IndexResult<PageBuffer> {
        let mut buffer = PageBuffer::new();
        self.file
            .read_page(page, buffer.as_bytes_mut())
            .map_err(|source| IndexError::PageReadFailed { page, source })?;
        Ok(buffer)
    }

    pub(crate) fn write_page(&mut self, page: PageNum, buffer: &PageBuffer) -> IndexResult<()> {
        self.file
            .write_page(page, buffer.as_bytes())
            .map_err(|source| IndexError::PageWriteFailed { page, source })
    }

    pub(crate) fn append_page(&mut self, buffer: &PageBuffer) -> IndexResult<PageNum> {
        self.file
            .append_page(buffer.as_bytes())
            .map_err(|source| IndexError::PageAppendFailed { source })
    }

    /// Page number the next append will receive
    pub(crate) fn next_page_num(&self) -> IndexResult<PageNum> {
        ensure_linkable(self.page_count()?)
    }

    pub(crate) fn read_node(&mut self, page: PageNum, layout: &NodeLayout) -> IndexResult<Node> {
        trace!(page, "index.read_node");
        let buffer = self.read_page(page)?;
        deserialize_node(&buffer, layout).map_err(|e| match e {
            IndexError::DeserializationError(reason) => IndexError::corrupted(page, reason),
            other => other,
        })
    }

    pub(crate) fn write_node(
        &mut self,
        page: PageNum,
        node: &Node,
        layout: &NodeLayout,
    ) -> IndexResult<()> {
        let buffer = serialize_node(node, layout)?;
        self.write_page(page, &buffer)
    }

    /// Append `node`, checking it lands on `expected`
    pub(crate) fn append_node(
        &mut self,
        expected: PageNum,
        node: &Node,
        layout: &NodeLayout,
    ) -> IndexResult<()> {
        let buffer = serialize_node(node, layout)?;
        let page = self.append_page(&buffer)?;
        if page != expected {
            return Err(IndexError::AllocationFailed(format!(
                "expected new page {}, file appended page {}",
                expected, page
            )));
        }
        Ok(())
    }

    /// Move the root from page 0 to the top of page 0's parent chain
    ///
    /// Page 0 is the first leaf ever created and every split keeps parent
    /// links current, so its ancestors end at the live root.
    pub(crate) fn resolve_root(&mut self) -> IndexResult<()> {
        let page_count = self.page_count()?;
        if page_count <= 1 {
            self.root = 0;
            return Ok(());
        }

        let mut current = 0;
        for _ in 0..page_count {
            let buffer = self.read_page(current)?;
            let header = deserialize_header(&buffer)
                .map_err(|e| IndexError::corrupted(current, e.to_string()))?;
            match header.parent {
                None => {
                    self.root = current;
                    return Ok(());
                }
                Some(parent) if parent < page_count => current = parent,
                Some(parent) => {
                    return Err(IndexError::corrupted(
                        current,
                        format!("parent {} beyond last page {}", parent, page_count - 1),
                    ));
                }
            }
        }

        Err(IndexError::corrupted(0, "parent chain does not reach a root"))
    }
}
