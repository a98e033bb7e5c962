//! Disk-resident B+ tree index
//!
//! [`IndexManager`] is the service object callers construct once. It creates,
//! opens and destroys index files through a [`PagedFileManager`] and runs
//! inserts, deletes and scans against an open [`IndexFileHandle`].

mod error;
mod index_file;
mod key;
mod node;
mod persistent_btree;
mod print;
mod scan;
mod serialization;

pub use error::{IndexError, IndexResult};
pub use index_file::IndexFileHandle;
pub use key::{IndexKey, compare_keys};
pub use node::{Node, NodeEntry, NodeHeader};
pub use scan::{IxScanIterator, ScanBound};
pub use serialization::{
    HEADER_SIZE, MIN_CAPACITY, NodeLayout, PageBuffer, deserialize_node, serialize_node,
};

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::file::PagedFileManager;
use crate::record::{Attribute, RecordId};

use persistent_btree::PersistentBPlusTree;
use serialization::empty_leaf_page;

/// Tunables for the index layer
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexOptions {
    /// Cap on entries per node, below what a page physically holds
    pub max_entries_per_page: Option<usize>,
}

impl IndexOptions {
    /// Reject a cap that could never produce a valid split
    pub fn validate(&self) -> IndexResult<()> {
        match self.max_entries_per_page {
            Some(cap) if cap < MIN_CAPACITY => Err(IndexError::InvalidCapacity(cap)),
            _ => Ok(()),
        }
    }
}

/// High-level index manager
pub struct IndexManager {
    file_manager: PagedFileManager,
    options: IndexOptions,
}

impl IndexManager {
    /// Create a manager with default options
    pub fn new(file_manager: PagedFileManager) -> Self {
        Self {
            file_manager,
            options: IndexOptions::default(),
        }
    }

    /// Create a manager with explicit options
    pub fn with_options(
        file_manager: PagedFileManager,
        options: IndexOptions,
    ) -> IndexResult<Self> {
        options.validate()?;
        Ok(Self {
            file_manager,
            options,
        })
    }

    pub fn options(&self) -> &IndexOptions {
        &self.options
    }

    pub fn file_manager(&self) -> &PagedFileManager {
        &self.file_manager
    }

    fn layout(&self, attr: &Attribute) -> IndexResult<NodeLayout> {
        NodeLayout::new(attr, self.options.max_entries_per_page)
    }

    /// Create an index file whose page 0 is an empty leaf root
    pub fn create_file<P: AsRef<Path>>(&mut self, path: P) -> IndexResult<()> {
        let path = path.as_ref();
        let create_failed = |source| IndexError::FileCreateFailed {
            path: path.display().to_string(),
            source,
        };

        self.file_manager.create_file(path).map_err(create_failed)?;
        let mut file = self.file_manager.open_file(path).map_err(create_failed)?;

        let page = empty_leaf_page()?;
        let appended = file
            .append_page(page.as_bytes())
            .map_err(|source| IndexError::PageAppendFailed { source });
        let closed = self.file_manager.close_file(file).map_err(create_failed);
        appended?;
        closed?;

        info!(path = %path.display(), "index.create");
        Ok(())
    }

    /// Remove an index file; fails while it is open
    pub fn destroy_file<P: AsRef<Path>>(&mut self, path: P) -> IndexResult<()> {
        let path = path.as_ref();
        self.file_manager.destroy_file(path)?;
        info!(path = %path.display(), "index.destroy");
        Ok(())
    }

    /// Open an index file and locate its current root
    pub fn open_file<P: AsRef<Path>>(&mut self, path: P) -> IndexResult<IndexFileHandle> {
        let path = path.as_ref();
        let file = self
            .file_manager
            .open_file(path)
            .map_err(|source| IndexError::FileOpenFailed {
                path: path.display().to_string(),
                source,
            })?;

        let mut handle = IndexFileHandle::new(file);
        if let Err(e) = handle.resolve_root() {
            // Release the slot in the manager before reporting
            if let Err(close_err) = self.file_manager.close_file(handle.into_file()) {
                warn!(path = %path.display(), error = %close_err, "index.open.close_failed");
            }
            return Err(e);
        }

        info!(path = %path.display(), root = handle.root_page(), "index.open");
        Ok(handle)
    }

    /// Flush and close an index file
    pub fn close_file(&mut self, handle: IndexFileHandle) -> IndexResult<()> {
        let counters = handle.io_counters();
        info!(
            path = %handle.path().display(),
            reads = counters.reads,
            writes = counters.writes,
            appends = counters.appends,
            "index.close"
        );
        self.file_manager.close_file(handle.into_file())?;
        Ok(())
    }

    /// Insert `(key, rid)`; duplicate keys are kept
    pub fn insert_entry(
        &self,
        handle: &mut IndexFileHandle,
        attr: &Attribute,
        key: &IndexKey,
        rid: RecordId,
    ) -> IndexResult<()> {
        key.validate(attr)?;
        let layout = self.layout(attr)?;
        debug!(key = %key, rid = %rid, "index.insert");
        PersistentBPlusTree::new(handle, layout).insert(key.clone(), rid)
    }

    /// Delete the entry holding exactly `(key, rid)`
    pub fn delete_entry(
        &self,
        handle: &mut IndexFileHandle,
        attr: &Attribute,
        key: &IndexKey,
        rid: RecordId,
    ) -> IndexResult<()> {
        key.validate(attr)?;
        let layout = self.layout(attr)?;
        PersistentBPlusTree::new(handle, layout).delete(key, rid)
    }

    /// Open a scan over the keys between `low` and `high`; a missing bound
    /// leaves that end of the range open
    pub fn scan<'a>(
        &self,
        handle: &'a mut IndexFileHandle,
        attr: &Attribute,
        low: Option<&ScanBound>,
        high: Option<&ScanBound>,
    ) -> IndexResult<IxScanIterator<'a>> {
        for bound in low.iter().chain(high.iter()) {
            bound.key.validate(attr)?;
        }
        let layout = self.layout(attr)?;
        IxScanIterator::open(PersistentBPlusTree::new(handle, layout), low, high)
    }

    /// Pretty-printed JSON dump of the whole tree
    pub fn print_btree(
        &self,
        handle: &mut IndexFileHandle,
        attr: &Attribute,
    ) -> IndexResult<String> {
        let layout = self.layout(attr)?;
        print::dump_tree(&mut PersistentBPlusTree::new(handle, layout))
    }

    /// Number of levels in the tree, 1 for a lone leaf root
    pub fn tree_height(
        &self,
        handle: &mut IndexFileHandle,
        attr: &Attribute,
    ) -> IndexResult<usize> {
        let layout = self.layout(attr)?;
        PersistentBPlusTree::new(handle, layout).height()
    }
}

impl Default for IndexManager {
    fn default() -> Self {
        Self::new(PagedFileManager::new())
    }
}
