//! RAII guards for buffer pool page access.
//!
//! A guard couples two lifetimes that must never diverge: the pin on the
//! frame (which keeps the replacer away) and the per-frame page latch
//! (which serializes access to the page bytes). Dropping the guard releases
//! the latch and unpins the page in one motion, so a pin can never leak and
//! an unpin can never happen twice.

use parking_lot::{RwLockReadGuard, RwLockWriteGuard};
use std::ops::{Deref, DerefMut};

use super::frame::FrameId;
use super::pool::BufferPool;
use super::replacer::Replacer;
use crate::storage::{DiskManager, PageData, PageId};

/// RAII guard for read-only page access.
///
/// Holds a shared page latch and a pin on the frame. When dropped, the page
/// is unpinned without touching its dirty flag.
///
/// # Example
///
/// ```no_run
/// # use stratum::storage::{BufferPool, BufferPoolConfig, MemoryDiskManager};
/// # use stratum::storage::buffer::ClockReplacer;
/// # let pool = BufferPool::new(MemoryDiskManager::new(), ClockReplacer::new(8), BufferPoolConfig { pool_size: 8 });
/// # let page_id = { let g = pool.new_page().unwrap(); g.page_id() };
/// let guard = pool.fetch_page_read(page_id).unwrap();
/// let first_byte = guard[0];
/// // guard automatically unpins when dropped
/// ```
pub struct PageReadGuard<'a, D: DiskManager, R: Replacer> {
    pool: &'a BufferPool<D, R>,
    frame_id: FrameId,
    page_id: PageId,
    _latch: RwLockReadGuard<'a, PageData>,
}

impl<'a, D: DiskManager, R: Replacer> PageReadGuard<'a, D, R> {
    pub(super) fn new(
        pool: &'a BufferPool<D, R>,
        frame_id: FrameId,
        page_id: PageId,
        latch: RwLockReadGuard<'a, PageData>,
    ) -> Self {
        Self {
            pool,
            frame_id,
            page_id,
            _latch: latch,
        }
    }

    /// Returns the PageId of this page.
    pub fn page_id(&self) -> PageId {
        self.page_id
    }
}

impl<D: DiskManager, R: Replacer> Deref for PageReadGuard<'_, D, R> {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        self._latch.as_slice()
    }
}

impl<D: DiskManager, R: Replacer> Drop for PageReadGuard<'_, D, R> {
    fn drop(&mut self) {
        self.pool.unpin(self.frame_id, false);
    }
}

/// RAII guard for mutable page access.
///
/// Holds an exclusive page latch and a pin on the frame. When dropped, the
/// page is marked dirty and unpinned; mutable access is assumed to have
/// modified the page.
pub struct PageWriteGuard<'a, D: DiskManager, R: Replacer> {
    pool: &'a BufferPool<D, R>,
    frame_id: FrameId,
    page_id: PageId,
    _latch: RwLockWriteGuard<'a, PageData>,
}

impl<'a, D: DiskManager, R: Replacer> PageWriteGuard<'a, D, R> {
    pub(super) fn new(
        pool: &'a BufferPool<D, R>,
        frame_id: FrameId,
        page_id: PageId,
        latch: RwLockWriteGuard<'a, PageData>,
    ) -> Self {
        Self {
            pool,
            frame_id,
            page_id,
            _latch: latch,
        }
    }

    /// Returns the PageId of this page.
    pub fn page_id(&self) -> PageId {
        self.page_id
    }
}

impl<D: DiskManager, R: Replacer> Deref for PageWriteGuard<'_, D, R> {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        self._latch.as_slice()
    }
}

impl<D: DiskManager, R: Replacer> DerefMut for PageWriteGuard<'_, D, R> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self._latch.as_mut_slice()
    }
}

impl<D: DiskManager, R: Replacer> Drop for PageWriteGuard<'_, D, R> {
    fn drop(&mut self) {
        self.pool.unpin(self.frame_id, true);
    }
}
