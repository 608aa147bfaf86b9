//! File-backed page store implementation.

use std::collections::BTreeSet;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use super::DiskManager;
use crate::storage::error::StorageError;
use crate::storage::page::{PAGE_SIZE, PageId};

/// File-backed page store.
///
/// Stores pages as contiguous `PAGE_SIZE` blocks in a single file.
///
/// # File Layout
///
/// ```text
/// +------------------+------------------+------------------+
/// | Page 0 (4KB)     | Page 1 (4KB)     | Page 2 (4KB)     | ...
/// +------------------+------------------+------------------+
/// ^ offset 0         ^ offset 4096      ^ offset 8192
/// ```
///
/// # Concurrency
///
/// Uses a `Mutex` around the file handle to serialize I/O operations.
///
/// NOTE: For production systems with better concurrency:
/// - Use pread/pwrite for concurrent access to different offsets
/// - Implement Direct I/O to bypass the OS cache
///
/// # Durability
///
/// The `sync_all()` method calls `File::sync_all()` to ensure data reaches
/// disk. The free set of deallocated page ids is kept in memory only and is
/// lost on restart; a reopened file exposes every page below its high-water
/// mark as allocated.
pub struct FileDiskManager {
    /// Path to the backing file
    path: PathBuf,
    /// File handle wrapped in a mutex for serialized access
    file: Mutex<File>,
    /// High-water mark: number of pages ever allocated in the file
    page_count: AtomicU64,
    /// Deallocated page ids available for reuse (process-lifetime only)
    free: Mutex<BTreeSet<u64>>,
}

impl FileDiskManager {
    /// Opens or creates a backing file at the given path.
    ///
    /// If the file exists, its page count is calculated from the file size.
    /// If the file doesn't exist, it is created empty.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Corrupted` if the file size is not a multiple
    /// of PAGE_SIZE.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let path = path.into();

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)?;

        let file_size = file.metadata()?.len();

        if file_size % PAGE_SIZE as u64 != 0 {
            return Err(StorageError::Corrupted(format!(
                "file size {} is not a multiple of page size {}",
                file_size, PAGE_SIZE
            )));
        }

        let page_count = file_size / PAGE_SIZE as u64;

        Ok(Self {
            path,
            file: Mutex::new(file),
            page_count: AtomicU64::new(page_count),
            free: Mutex::new(BTreeSet::new()),
        })
    }

    /// Returns the path to the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn check_buf(buf: &[u8]) -> Result<(), StorageError> {
        if buf.len() != PAGE_SIZE {
            return Err(StorageError::InvalidBufferSize {
                expected: PAGE_SIZE,
                actual: buf.len(),
            });
        }
        Ok(())
    }
}

impl DiskManager for FileDiskManager {
    fn read_page(&self, page_id: PageId, buf: &mut [u8]) -> Result<(), StorageError> {
        Self::check_buf(buf)?;

        if page_id.page_num() >= self.page_count.load(Ordering::Acquire) {
            return Err(StorageError::PageNotFound(page_id));
        }

        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(page_id.byte_offset()))?;
        file.read_exact(buf)?;

        Ok(())
    }

    fn write_page(&self, page_id: PageId, buf: &[u8]) -> Result<(), StorageError> {
        Self::check_buf(buf)?;

        if page_id.page_num() >= self.page_count.load(Ordering::Acquire) {
            return Err(StorageError::PageNotFound(page_id));
        }

        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(page_id.byte_offset()))?;
        file.write_all(buf)?;

        Ok(())
    }

    fn allocate_page(&self) -> Result<PageId, StorageError> {
        let zeroes = [0u8; PAGE_SIZE];

        // Reuse a deallocated id if one is available, zeroing its block.
        {
            let mut free = self.free.lock();
            let recycled = free.iter().next().copied();
            if let Some(page_num) = recycled {
                free.remove(&page_num);
                let mut file = self.file.lock();
                file.seek(SeekFrom::Start(page_num * PAGE_SIZE as u64))?;
                file.write_all(&zeroes)?;
                return Ok(PageId::new(page_num));
            }
        }

        // Extend the file by one zeroed page. The id is claimed atomically;
        // writing past EOF fills any gap with zeroes.
        let page_num = self.page_count.fetch_add(1, Ordering::AcqRel);
        {
            let mut file = self.file.lock();
            file.seek(SeekFrom::Start(page_num * PAGE_SIZE as u64))?;
            file.write_all(&zeroes)?;
        }

        Ok(PageId::new(page_num))
    }

    fn deallocate_page(&self, page_id: PageId) -> Result<(), StorageError> {
        if page_id.page_num() < self.page_count.load(Ordering::Acquire) {
            self.free.lock().insert(page_id.page_num());
        }
        Ok(())
    }

    fn page_count(&self) -> u64 {
        self.page_count.load(Ordering::Acquire)
    }

    fn sync_all(&self) -> Result<(), StorageError> {
        self.file.lock().sync_all()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_open_creates_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.db");
        let disk = FileDiskManager::open(&path).unwrap();
        assert_eq!(disk.page_count(), 0);
        assert!(path.exists());
    }

    #[test]
    fn test_write_read_roundtrip() {
        let dir = tempdir().unwrap();
        let disk = FileDiskManager::open(dir.path().join("test.db")).unwrap();

        let page_id = disk.allocate_page().unwrap();
        let mut buf = vec![0u8; PAGE_SIZE];
        buf[0] = 0xAB;
        buf[PAGE_SIZE - 1] = 0xCD;
        disk.write_page(page_id, &buf).unwrap();

        let mut read_buf = vec![0u8; PAGE_SIZE];
        disk.read_page(page_id, &mut read_buf).unwrap();
        assert_eq!(read_buf[0], 0xAB);
        assert_eq!(read_buf[PAGE_SIZE - 1], 0xCD);
    }

    #[test]
    fn test_reopen_preserves_pages() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.db");

        let page_id;
        {
            let disk = FileDiskManager::open(&path).unwrap();
            page_id = disk.allocate_page().unwrap();
            let mut buf = vec![0u8; PAGE_SIZE];
            buf[7] = 77;
            disk.write_page(page_id, &buf).unwrap();
            disk.sync_all().unwrap();
        }

        let disk = FileDiskManager::open(&path).unwrap();
        assert_eq!(disk.page_count(), 1);
        let mut buf = vec![0u8; PAGE_SIZE];
        disk.read_page(page_id, &mut buf).unwrap();
        assert_eq!(buf[7], 77);
    }

    #[test]
    fn test_read_unallocated_fails() {
        let dir = tempdir().unwrap();
        let disk = FileDiskManager::open(dir.path().join("test.db")).unwrap();
        let mut buf = vec![0u8; PAGE_SIZE];
        let result = disk.read_page(PageId::new(3), &mut buf);
        assert!(matches!(result, Err(StorageError::PageNotFound(_))));
    }

    #[test]
    fn test_deallocated_id_is_recycled_zeroed() {
        let dir = tempdir().unwrap();
        let disk = FileDiskManager::open(dir.path().join("test.db")).unwrap();

        let a = disk.allocate_page().unwrap();
        let mut buf = vec![9u8; PAGE_SIZE];
        disk.write_page(a, &buf).unwrap();

        disk.deallocate_page(a).unwrap();
        let b = disk.allocate_page().unwrap();
        assert_eq!(b, a);

        disk.read_page(b, &mut buf).unwrap();
        assert!(buf.iter().all(|&x| x == 0));
    }
}
