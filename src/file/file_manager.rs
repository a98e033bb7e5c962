use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use serde::Serialize;

use super::error::{FileError, FileResult};
use super::{DEFAULT_MAX_OPEN_FILES, PAGE_SIZE, PageNum};

/// Page I/O performed through one handle since it was opened
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct IoCounters {
    pub reads: u64,
    pub writes: u64,
    pub appends: u64,
}

/// Handle to an open paged file
///
/// Handles are obtained from [`PagedFileManager::open_file`] and must be
/// returned through [`PagedFileManager::close_file`].
#[derive(Debug)]
pub struct FileHandle {
    file: File,
    path: PathBuf,
    counters: IoCounters,
}

impl FileHandle {
    /// Canonical path of the underlying file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of pages currently in the file
    pub fn page_count(&self) -> FileResult<PageNum> {
        let file_size = self.file.metadata()?.len();
        let pages = file_size.div_ceil(PAGE_SIZE as u64);
        PageNum::try_from(pages).map_err(|_| FileError::PageLimitReached(PageNum::MAX))
    }

    /// Read an existing page into `buffer`
    pub fn read_page(&mut self, page_num: PageNum, buffer: &mut [u8]) -> FileResult<()> {
        check_buffer(buffer.len())?;
        self.check_in_range(page_num)?;

        self.file.seek(SeekFrom::Start(page_offset(page_num)))?;
        self.file.read_exact(buffer)?;
        self.counters.reads += 1;
        Ok(())
    }

    /// Overwrite an existing page
    pub fn write_page(&mut self, page_num: PageNum, buffer: &[u8]) -> FileResult<()> {
        check_buffer(buffer.len())?;
        self.check_in_range(page_num)?;

        self.file.seek(SeekFrom::Start(page_offset(page_num)))?;
        self.file.write_all(buffer)?;
        self.counters.writes += 1;
        Ok(())
    }

    /// Append a page at the end of the file and return its page number
    pub fn append_page(&mut self, buffer: &[u8]) -> FileResult<PageNum> {
        check_buffer(buffer.len())?;

        let page_num = self.page_count()?;
        if page_num == PageNum::MAX {
            return Err(FileError::PageLimitReached(page_num));
        }

        self.file.seek(SeekFrom::Start(page_offset(page_num)))?;
        self.file.write_all(buffer)?;
        self.counters.appends += 1;
        Ok(page_num)
    }

    /// Snapshot of the I/O counters
    pub fn io_counters(&self) -> IoCounters {
        self.counters
    }

    /// Flush OS buffers for this file
    pub fn sync(&mut self) -> FileResult<()> {
        self.file.sync_data()?;
        Ok(())
    }

    fn check_in_range(&self, page_num: PageNum) -> FileResult<()> {
        let page_count = self.page_count()?;
        if page_num >= page_count {
            return Err(FileError::PageNotFound {
                page_num,
                page_count,
            });
        }
        Ok(())
    }
}

fn check_buffer(len: usize) -> FileResult<()> {
    if len != PAGE_SIZE {
        return Err(FileError::InvalidPageSize {
            expected: PAGE_SIZE,
            actual: len,
        });
    }
    Ok(())
}

fn page_offset(page_num: PageNum) -> u64 {
    u64::from(page_num) * PAGE_SIZE as u64
}

/// Creates, opens and removes paged files
///
/// One manager is constructed by the caller and passed to whatever needs file
/// access; it tracks how many handles are open per file.
#[derive(Debug)]
pub struct PagedFileManager {
    /// Open handle count per canonical path
    open_files: HashMap<PathBuf, usize>,
    /// Maximum number of open handles
    max_open_files: usize,
}

impl PagedFileManager {
    /// Create a new paged file manager
    pub fn new() -> Self {
        Self::with_max_files(DEFAULT_MAX_OPEN_FILES)
    }

    /// Create a new paged file manager with specified max open files
    pub fn with_max_files(max_open_files: usize) -> Self {
        Self {
            open_files: HashMap::new(),
            max_open_files,
        }
    }

    /// Create a new, empty file
    pub fn create_file<P: AsRef<Path>>(&mut self, path: P) -> FileResult<()> {
        let path = path.as_ref();

        if path.exists() {
            return Err(FileError::FileAlreadyExists(path.display().to_string()));
        }

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        OpenOptions::new().write(true).create_new(true).open(path)?;
        Ok(())
    }

    /// Remove a file; fails while any handle to it is still open
    pub fn destroy_file<P: AsRef<Path>>(&mut self, path: P) -> FileResult<()> {
        let path = path.as_ref();
        let canonical = path
            .canonicalize()
            .map_err(|_| FileError::FileNotFound(path.display().to_string()))?;

        if self.open_files.contains_key(&canonical) {
            return Err(FileError::FileInUse(path.display().to_string()));
        }

        std::fs::remove_file(&canonical)?;
        Ok(())
    }

    /// Open an existing file
    pub fn open_file<P: AsRef<Path>>(&mut self, path: P) -> FileResult<FileHandle> {
        let path_ref = path.as_ref();
        let path = path_ref
            .canonicalize()
            .map_err(|_| FileError::FileNotFound(path_ref.display().to_string()))?;

        if self.open_file_count() >= self.max_open_files {
            return Err(FileError::TooManyOpenFiles);
        }

        let file = OpenOptions::new().read(true).write(true).open(&path)?;
        *self.open_files.entry(path.clone()).or_insert(0) += 1;

        Ok(FileHandle {
            file,
            path,
            counters: IoCounters::default(),
        })
    }

    /// Close a handle, flushing it to disk
    pub fn close_file(&mut self, mut handle: FileHandle) -> FileResult<()> {
        let synced = handle.sync();

        if let Some(count) = self.open_files.get_mut(&handle.path) {
            *count -= 1;
            if *count == 0 {
                self.open_files.remove(&handle.path);
            }
        }

        synced
    }

    /// Check if any handle to the file is open
    pub fn is_file_open<P: AsRef<Path>>(&self, path: P) -> bool {
        path.as_ref()
            .canonicalize()
            .map(|p| self.open_files.contains_key(&p))
            .unwrap_or(false)
    }

    /// Get the number of currently open handles
    pub fn open_file_count(&self) -> usize {
        self.open_files.values().sum()
    }
}

impl Default for PagedFileManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn setup_test_dir() -> TempDir {
        tempfile::tempdir().unwrap()
    }

    fn page_filled_with(byte: u8) -> Vec<u8> {
        vec![byte; PAGE_SIZE]
    }

    #[test]
    fn test_create_file() {
        let temp_dir = setup_test_dir();
        let test_file = temp_dir.path().join("test.idx");
        let mut manager = PagedFileManager::new();

        assert!(manager.create_file(&test_file).is_ok());
        assert!(test_file.exists());
    }

    #[test]
    fn test_create_file_already_exists() {
        let temp_dir = setup_test_dir();
        let test_file = temp_dir.path().join("test.idx");
        let mut manager = PagedFileManager::new();

        manager.create_file(&test_file).unwrap();
        let result = manager.create_file(&test_file);
        assert!(matches!(result, Err(FileError::FileAlreadyExists(_))));
    }

    #[test]
    fn test_open_close_file() {
        let temp_dir = setup_test_dir();
        let test_file = temp_dir.path().join("test.idx");
        let mut manager = PagedFileManager::new();

        manager.create_file(&test_file).unwrap();
        let handle = manager.open_file(&test_file).unwrap();
        assert!(manager.is_file_open(&test_file));

        manager.close_file(handle).unwrap();
        assert!(!manager.is_file_open(&test_file));
    }

    #[test]
    fn test_open_nonexistent_file() {
        let temp_dir = setup_test_dir();
        let test_file = temp_dir.path().join("nonexistent.idx");
        let mut manager = PagedFileManager::new();

        let result = manager.open_file(&test_file);
        assert!(matches!(result, Err(FileError::FileNotFound(_))));
    }

    #[test]
    fn test_open_same_file_twice() {
        let temp_dir = setup_test_dir();
        let test_file = temp_dir.path().join("test.idx");
        let mut manager = PagedFileManager::new();

        manager.create_file(&test_file).unwrap();
        let first = manager.open_file(&test_file).unwrap();
        let second = manager.open_file(&test_file).unwrap();
        assert_eq!(manager.open_file_count(), 2);

        manager.close_file(first).unwrap();
        assert!(manager.is_file_open(&test_file));
        manager.close_file(second).unwrap();
        assert_eq!(manager.open_file_count(), 0);
    }

    #[test]
    fn test_append_then_read_write() {
        let temp_dir = setup_test_dir();
        let test_file = temp_dir.path().join("test.idx");
        let mut manager = PagedFileManager::new();

        manager.create_file(&test_file).unwrap();
        let mut handle = manager.open_file(&test_file).unwrap();

        assert_eq!(handle.append_page(&page_filled_with(1)).unwrap(), 0);
        assert_eq!(handle.append_page(&page_filled_with(2)).unwrap(), 1);
        assert_eq!(handle.page_count().unwrap(), 2);

        let mut buffer = vec![0u8; PAGE_SIZE];
        handle.read_page(1, &mut buffer).unwrap();
        assert!(buffer.iter().all(|&b| b == 2));

        handle.write_page(0, &page_filled_with(9)).unwrap();
        handle.read_page(0, &mut buffer).unwrap();
        assert!(buffer.iter().all(|&b| b == 9));
    }

    #[test]
    fn test_out_of_range_pages_fail() {
        let temp_dir = setup_test_dir();
        let test_file = temp_dir.path().join("test.idx");
        let mut manager = PagedFileManager::new();

        manager.create_file(&test_file).unwrap();
        let mut handle = manager.open_file(&test_file).unwrap();
        handle.append_page(&page_filled_with(0)).unwrap();

        let mut buffer = vec![0u8; PAGE_SIZE];
        let result = handle.read_page(1, &mut buffer);
        assert!(matches!(
            result,
            Err(FileError::PageNotFound {
                page_num: 1,
                page_count: 1
            })
        ));

        let result = handle.write_page(5, &buffer);
        assert!(matches!(result, Err(FileError::PageNotFound { .. })));
    }

    #[test]
    fn test_io_counters() {
        let temp_dir = setup_test_dir();
        let test_file = temp_dir.path().join("test.idx");
        let mut manager = PagedFileManager::new();

        manager.create_file(&test_file).unwrap();
        let mut handle = manager.open_file(&test_file).unwrap();
        assert_eq!(handle.io_counters(), IoCounters::default());

        let mut buffer = page_filled_with(0);
        handle.append_page(&buffer).unwrap();
        handle.append_page(&buffer).unwrap();
        handle.write_page(1, &buffer).unwrap();
        handle.read_page(0, &mut buffer).unwrap();
        handle.read_page(1, &mut buffer).unwrap();
        handle.read_page(1, &mut buffer).unwrap();

        // Failed reads are not counted
        assert!(handle.read_page(7, &mut buffer).is_err());

        assert_eq!(
            handle.io_counters(),
            IoCounters {
                reads: 3,
                writes: 1,
                appends: 2
            }
        );
        assert_eq!(
            serde_json::to_value(handle.io_counters()).unwrap(),
            serde_json::json!({ "reads": 3, "writes": 1, "appends": 2 })
        );
    }

    #[test]
    fn test_counters_are_per_handle() {
        let temp_dir = setup_test_dir();
        let test_file = temp_dir.path().join("test.idx");
        let mut manager = PagedFileManager::new();

        manager.create_file(&test_file).unwrap();
        let mut first = manager.open_file(&test_file).unwrap();
        first.append_page(&page_filled_with(0)).unwrap();

        let second = manager.open_file(&test_file).unwrap();
        assert_eq!(second.io_counters().appends, 0);
        assert_eq!(second.page_count().unwrap(), 1);
    }

    #[test]
    fn test_destroy_file() {
        let temp_dir = setup_test_dir();
        let test_file = temp_dir.path().join("test.idx");
        let mut manager = PagedFileManager::new();

        manager.create_file(&test_file).unwrap();
        manager.destroy_file(&test_file).unwrap();
        assert!(!test_file.exists());

        let result = manager.destroy_file(&test_file);
        assert!(matches!(result, Err(FileError::FileNotFound(_))));
    }

    #[test]
    fn test_destroy_open_file_fails() {
        let temp_dir = setup_test_dir();
        let test_file = temp_dir.path().join("test.idx");
        let mut manager = PagedFileManager::new();

        manager.create_file(&test_file).unwrap();
        let handle = manager.open_file(&test_file).unwrap();

        let result = manager.destroy_file(&test_file);
        assert!(matches!(result, Err(FileError::FileInUse(_))));
        assert!(test_file.exists());

        manager.close_file(handle).unwrap();
        manager.destroy_file(&test_file).unwrap();
    }

    #[test]
    fn test_invalid_buffer_size() {
        let temp_dir = setup_test_dir();
        let test_file = temp_dir.path().join("test.idx");
        let mut manager = PagedFileManager::new();

        manager.create_file(&test_file).unwrap();
        let mut handle = manager.open_file(&test_file).unwrap();

        let small_buffer = vec![0u8; PAGE_SIZE - 1];
        let result = handle.append_page(&small_buffer);
        assert!(matches!(result, Err(FileError::InvalidPageSize { .. })));

        let mut large_buffer = vec![0u8; PAGE_SIZE + 1];
        let result = handle.read_page(0, &mut large_buffer);
        assert!(matches!(result, Err(FileError::InvalidPageSize { .. })));
    }

    #[test]
    fn test_max_open_files() {
        let temp_dir = setup_test_dir();
        let mut manager = PagedFileManager::with_max_files(2);

        let file1 = temp_dir.path().join("test1.idx");
        let file2 = temp_dir.path().join("test2.idx");
        let file3 = temp_dir.path().join("test3.idx");

        manager.create_file(&file1).unwrap();
        manager.create_file(&file2).unwrap();
        manager.create_file(&file3).unwrap();

        let _h1 = manager.open_file(&file1).unwrap();
        let _h2 = manager.open_file(&file2).unwrap();

        let result = manager.open_file(&file3);
        assert!(matches!(result, Err(FileError::TooManyOpenFiles)));
    }
}
