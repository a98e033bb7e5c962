mod error;
mod file_manager;

pub use error::{FileError, FileResult};
pub use file_manager::{FileHandle, IoCounters, PagedFileManager};

/// Page size in bytes (4KB)
pub const PAGE_SIZE: usize = 4096;

/// Default limit on concurrently open file handles
pub const DEFAULT_MAX_OPEN_FILES: usize = 128;

/// Page number type (0-based)
pub type PageNum = u32;
