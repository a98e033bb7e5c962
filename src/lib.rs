pub mod file;
pub mod index;
pub mod record;

pub use file::{FileError, FileHandle, FileResult, IoCounters, PAGE_SIZE, PageNum, PagedFileManager};
pub use index::{
    IndexError, IndexFileHandle, IndexKey, IndexManager, IndexOptions, IndexResult,
    IxScanIterator, ScanBound,
};
pub use record::{AttrType, Attribute, RecordId, SlotNum};
