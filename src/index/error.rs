use thiserror::Error;

use crate::file::{FileError, PageNum};
use crate::record::AttrType;

/// Result type for index operations
pub type IndexResult<T> = Result<T, IndexError>;

/// Errors that can occur during index operations
#[derive(Debug, Error)]
pub enum IndexError {
    #[error("Failed to create index file {path}: {source}")]
    FileCreateFailed {
        path: String,
        #[source]
        source: FileError,
    },

    #[error("Failed to open index file {path}: {source}")]
    FileOpenFailed {
        path: String,
        #[source]
        source: FileError,
    },

    #[error("File error: {0}")]
    File(#[from] FileError),

    #[error("Page allocation failed: {0}")]
    AllocationFailed(String),

    #[error("Failed to read page {page}: {source}")]
    PageReadFailed {
        page: PageNum,
        #[source]
        source: FileError,
    },

    #[error("Failed to write page {page}: {source}")]
    PageWriteFailed {
        page: PageNum,
        #[source]
        source: FileError,
    },

    #[error("Failed to append page: {source}")]
    PageAppendFailed {
        #[source]
        source: FileError,
    },

    #[error("Entry not found: key={0}")]
    EntryNotFound(String),

    #[error("End of scan")]
    EndOfScan,

    #[error("Key type mismatch: expected {expected}, got {actual}")]
    KeyTypeMismatch { expected: AttrType, actual: AttrType },

    #[error("Key of {len} bytes exceeds attribute length {max}")]
    KeyTooLong { len: usize, max: usize },

    #[error("Invalid key encoding: {0}")]
    InvalidKeyEncoding(String),

    #[error("Invalid node capacity: {0} (must be >= 3)")]
    InvalidCapacity(usize),

    #[error("Page access out of bounds: offset={offset}, len={len}")]
    PageOutOfBounds { offset: usize, len: usize },

    #[error("Corrupted node at page {page}: {reason}")]
    CorruptedNode { page: PageNum, reason: String },

    #[error("Deserialization error: {0}")]
    DeserializationError(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl IndexError {
    pub(crate) fn corrupted(page: PageNum, reason: impl Into<String>) -> Self {
        IndexError::CorruptedNode {
            page,
            reason: reason.into(),
        }
    }
}
