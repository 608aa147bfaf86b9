//! In-memory page store implementation.

use std::collections::BTreeSet;

use parking_lot::Mutex;

use super::DiskManager;
use crate::storage::error::StorageError;
use crate::storage::page::{PAGE_SIZE, PageData, PageId};

/// In-memory page store for testing and development.
///
/// Stores pages in a Vec backed by aligned memory allocations. PageIds are
/// assigned sequentially as Vec indices; deallocated ids go into a free set
/// and are handed out again before the Vec grows. The free set lives only
/// for the process lifetime.
pub struct MemoryDiskManager {
    inner: Mutex<MemoryInner>,
}

struct MemoryInner {
    pages: Vec<PageData>,
    free: BTreeSet<u64>,
}

impl MemoryDiskManager {
    /// Creates a new empty in-memory store.
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(MemoryInner {
                pages: Vec::new(),
                free: BTreeSet::new(),
            }),
        }
    }
}

impl DiskManager for MemoryDiskManager {
    fn read_page(&self, page_id: PageId, buf: &mut [u8]) -> Result<(), StorageError> {
        if buf.len() != PAGE_SIZE {
            return Err(StorageError::InvalidBufferSize {
                expected: PAGE_SIZE,
                actual: buf.len(),
            });
        }

        let inner = self.inner.lock();
        if inner.free.contains(&page_id.page_num()) {
            return Err(StorageError::PageNotFound(page_id));
        }
        let page = inner
            .pages
            .get(page_id.page_num() as usize)
            .ok_or(StorageError::PageNotFound(page_id))?;

        buf.copy_from_slice(page.as_slice());
        Ok(())
    }

    fn write_page(&self, page_id: PageId, buf: &[u8]) -> Result<(), StorageError> {
        if buf.len() != PAGE_SIZE {
            return Err(StorageError::InvalidBufferSize {
                expected: PAGE_SIZE,
                actual: buf.len(),
            });
        }

        let mut inner = self.inner.lock();
        if inner.free.contains(&page_id.page_num()) {
            return Err(StorageError::PageNotFound(page_id));
        }
        let page = inner
            .pages
            .get_mut(page_id.page_num() as usize)
            .ok_or(StorageError::PageNotFound(page_id))?;

        page.as_mut_slice().copy_from_slice(buf);
        Ok(())
    }

    fn allocate_page(&self) -> Result<PageId, StorageError> {
        let mut inner = self.inner.lock();
        let recycled = inner.free.iter().next().copied();
        if let Some(page_num) = recycled {
            inner.free.remove(&page_num);
            inner.pages[page_num as usize].reset();
            return Ok(PageId::new(page_num));
        }
        let page_id = PageId::new(inner.pages.len() as u64);
        inner.pages.push(PageData::new());
        Ok(page_id)
    }

    fn deallocate_page(&self, page_id: PageId) -> Result<(), StorageError> {
        let mut inner = self.inner.lock();
        if (page_id.page_num() as usize) < inner.pages.len() {
            inner.free.insert(page_id.page_num());
        }
        Ok(())
    }

    fn page_count(&self) -> u64 {
        self.inner.lock().pages.len() as u64
    }

    fn sync_all(&self) -> Result<(), StorageError> {
        // No-op for in-memory storage
        Ok(())
    }
}

impl Default for MemoryDiskManager {
    fn default() -> Self {
        Self::new()
    }
}
