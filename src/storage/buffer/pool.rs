//! Buffer pool manager for caching pages in memory.
//!
//! The buffer pool sits between the disk manager and higher-level access
//! methods, pinning frequently accessed pages in memory to reduce I/O.

use std::collections::{HashMap, VecDeque};

use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::storage::{DiskManager, PageId};

use super::error::BufferPoolError;
use super::frame::{Frame, FrameId, FrameMetadata};
use super::guard::{PageReadGuard, PageWriteGuard};
use super::replacer::Replacer;

/// Configuration for the buffer pool.
#[derive(Debug, Clone)]
pub struct BufferPoolConfig {
    /// Number of frames in the buffer pool.
    ///
    /// This determines the maximum number of pages that can be cached in
    /// memory simultaneously. Common values:
    /// - 16 frames = 64KB (for testing)
    /// - 1024 frames = 4MB (small database)
    /// - 262144 frames = 1GB (production)
    pub pool_size: usize,
}

impl Default for BufferPoolConfig {
    fn default() -> Self {
        Self { pool_size: 1024 }
    }
}

/// Buffer pool manager for caching pages in memory.
///
/// The pool maintains a fixed number of frames (in-memory page slots) and
/// maps pages from disk to these frames on demand. When all frames are in
/// use, the replacement policy selects a victim frame for eviction.
///
/// # Architecture
///
/// ```text
/// +-------------------+
/// |  Access methods   |
/// +-------------------+
///          |
///          v
/// +-------------------+
/// |    BufferPool     |  <- You are here
/// +-------------------+
///          |
///          v
/// +-------------------+
/// | DiskManager trait |
/// +-------------------+
/// ```
///
/// # Thread Safety
///
/// The pool is designed for concurrent access:
/// - Multiple readers can access different pages simultaneously
/// - Multiple readers can access the same page simultaneously (shared latch)
/// - Writers get exclusive access to their page (exclusive latch)
/// - The state (page table, metadata, free list) is protected by one mutex
///
/// # Lock Hierarchy
///
/// To prevent deadlocks, locks are acquired in strict order:
/// 1. State mutex (page_table, frame_metadata, free_list)
/// 2. Per-frame page latch
/// 3. Replacer's internal mutex
///
/// The state mutex is never held while *waiting* on a contended page latch:
/// the only places the pool itself takes a page latch are frames with no
/// outstanding pins (fresh loads, victims, deletions) and the flush paths,
/// which release the state mutex first.
pub struct BufferPool<D: DiskManager, R: Replacer> {
    /// The underlying disk manager.
    disk: D,

    /// Replacement policy for selecting eviction victims.
    ///
    /// Internally synchronized; calls are made with or without the state
    /// mutex held, always as the innermost lock.
    replacer: R,

    /// Frame array - each frame's bytes are behind its own latch.
    frames: Vec<Frame>,

    /// Protected mutable state (page table, metadata, free list).
    state: Mutex<BufferPoolState>,

    /// Number of frames in the pool.
    pool_size: usize,
}

/// Mutable state protected by the state mutex.
struct BufferPoolState {
    /// Maps PageId -> FrameId for quick lookup.
    ///
    /// An entry exists iff that page currently occupies a frame.
    page_table: HashMap<PageId, FrameId>,

    /// Bookkeeping for each frame (indexed by FrameId).
    frame_metadata: Vec<FrameMetadata>,

    /// Frames not currently holding any page. Front-popped, back-pushed.
    free_list: VecDeque<FrameId>,
}

impl<D: DiskManager, R: Replacer> BufferPool<D, R> {
    /// Creates a new buffer pool.
    ///
    /// # Panics
    ///
    /// Panics if `config.pool_size` is 0.
    pub fn new(disk: D, replacer: R, config: BufferPoolConfig) -> Self {
        let pool_size = config.pool_size;
        assert!(pool_size > 0, "pool_size must be > 0");

        let frames: Vec<_> = (0..pool_size).map(|_| Frame::new()).collect();
        let frame_metadata: Vec<_> = (0..pool_size).map(|_| FrameMetadata::new()).collect();

        // All frames start in the free list; the replacer starts empty.
        let free_list: VecDeque<_> = (0..pool_size).map(FrameId::new).collect();

        Self {
            disk,
            replacer,
            frames,
            state: Mutex::new(BufferPoolState {
                page_table: HashMap::with_capacity(pool_size),
                frame_metadata,
                free_list,
            }),
            pool_size,
        }
    }

    /// Fetches a page for reading.
    ///
    /// If the page is already resident, returns it directly. Otherwise reads
    /// it from disk into a free or evicted frame. The returned guard holds a
    /// pin and a shared page latch until dropped.
    ///
    /// # Errors
    ///
    /// - `BufferPoolError::NoFreeFrames` if every frame is pinned
    /// - `BufferPoolError::PageNotFound` if the page was never allocated
    /// - `BufferPoolError::Storage` on disk I/O failure
    pub fn fetch_page_read(
        &self,
        page_id: PageId,
    ) -> Result<PageReadGuard<'_, D, R>, BufferPoolError> {
        let frame_id = self.get_or_load_frame(page_id)?;
        let latch = self.frames[frame_id.as_usize()].data.read();
        Ok(PageReadGuard::new(self, frame_id, page_id, latch))
    }

    /// Fetches a page for writing.
    ///
    /// Like `fetch_page_read`, but the guard holds the page latch exclusively
    /// and marks the page dirty when dropped.
    pub fn fetch_page_write(
        &self,
        page_id: PageId,
    ) -> Result<PageWriteGuard<'_, D, R>, BufferPoolError> {
        let frame_id = self.get_or_load_frame(page_id)?;
        let latch = self.frames[frame_id.as_usize()].data.write();
        Ok(PageWriteGuard::new(self, frame_id, page_id, latch))
    }

    /// Allocates a new page on disk and pins it into the buffer pool.
    ///
    /// A frame is obtained first (free list, then replacer); only when one
    /// is available does the disk manager hand out a page id. An exhausted
    /// pool therefore never touches the disk. The new page is initialized
    /// to zeros.
    ///
    /// # Errors
    ///
    /// - `BufferPoolError::NoFreeFrames` if every frame is pinned (no disk
    ///   allocation has happened)
    /// - `BufferPoolError::Storage` if disk allocation fails
    pub fn new_page(&self) -> Result<PageWriteGuard<'_, D, R>, BufferPoolError> {
        let frame_id = self.allocate_frame()?;

        let page_id = match self.disk.allocate_page() {
            Ok(page_id) => page_id,
            Err(e) => {
                let mut state = self.state.lock();
                state.free_list.push_back(frame_id);
                return Err(e.into());
            }
        };

        // Fresh pages are all zeroes on disk; zero the frame in place
        // instead of reading it back. The frame is in limbo (neither in the
        // page table nor the free list), so the latch is uncontended and no
        // other thread can observe the page id yet.
        let mut latch = self.frames[frame_id.as_usize()].data.write();
        latch.reset();

        {
            let mut state = self.state.lock();
            state.page_table.insert(page_id, frame_id);
            state.frame_metadata[frame_id.as_usize()].reset(page_id);
        }

        Ok(PageWriteGuard::new(self, frame_id, page_id, latch))
    }

    /// Flushes a page to disk if it is dirty.
    ///
    /// Returns `Ok(false)` if the page is not resident. Otherwise writes the
    /// page back when dirty, clears the dirty flag, and returns `Ok(true)`.
    /// Flushing does not affect pin counts or residency.
    pub fn flush_page(&self, page_id: PageId) -> Result<bool, BufferPoolError> {
        let frame_id = {
            let state = self.state.lock();
            match state.page_table.get(&page_id) {
                Some(&fid) => fid,
                None => return Ok(false),
            }
        };

        self.flush_frame(frame_id, page_id)?;
        Ok(true)
    }

    /// Flushes all resident dirty pages to disk, then syncs the backing store.
    pub fn flush_all_pages(&self) -> Result<(), BufferPoolError> {
        // Collect dirty pages first to release the state mutex quickly.
        let dirty_pages: Vec<(FrameId, PageId)> = {
            let state = self.state.lock();
            state
                .frame_metadata
                .iter()
                .enumerate()
                .filter_map(|(i, meta)| {
                    if meta.is_dirty {
                        meta.page_id.map(|page_id| (FrameId::new(i), page_id))
                    } else {
                        None
                    }
                })
                .collect()
        };

        for (frame_id, page_id) in dirty_pages {
            self.flush_frame(frame_id, page_id)?;
        }

        self.disk.sync_all()?;
        Ok(())
    }

    /// Deletes a page from the pool and deallocates it on disk.
    ///
    /// - Not resident: the id is deallocated anyway and `Ok(true)` is
    ///   returned (deleting what isn't cached is still a successful
    ///   deallocation).
    /// - Resident but pinned: `Ok(false)`.
    /// - Resident and unpinned: the frame is zeroed, returned to the free
    ///   list, and the id is deallocated on disk.
    pub fn delete_page(&self, page_id: PageId) -> Result<bool, BufferPoolError> {
        let frame_id = {
            let mut state = self.state.lock();

            let frame_id = match state.page_table.get(&page_id) {
                Some(&fid) => fid,
                None => {
                    drop(state);
                    self.disk.deallocate_page(page_id)?;
                    return Ok(true);
                }
            };

            if state.frame_metadata[frame_id.as_usize()].pin_count > 0 {
                return Ok(false);
            }

            state.page_table.remove(&page_id);
            state.frame_metadata[frame_id.as_usize()].clear();

            // pin_count == 0 and resident means the frame is a replacer
            // candidate; pull it out so the free list stays the sole owner.
            self.replacer.pin(frame_id);

            frame_id
            // State mutex released before touching the frame latch: a flush
            // may hold it in shared mode while waiting for the mutex.
        };

        // The frame is in limbo (neither in the page table nor the free
        // list), so no other thread can claim it while we zero it.
        self.frames[frame_id.as_usize()].data.write().reset();

        self.state.lock().free_list.push_back(frame_id);

        self.disk.deallocate_page(page_id)?;
        Ok(true)
    }

    /// Returns the number of frames in the buffer pool.
    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    /// Returns the number of pages currently resident in the buffer pool.
    pub fn resident_count(&self) -> usize {
        self.state.lock().page_table.len()
    }

    /// Returns a reference to the underlying disk manager.
    pub fn disk(&self) -> &D {
        &self.disk
    }

    /// Writes one frame's page back if it is still resident and dirty.
    fn flush_frame(&self, frame_id: FrameId, page_id: PageId) -> Result<(), BufferPoolError> {
        // Latch before re-checking so the frame cannot be reloaded with a
        // different page between the check and the write.
        let latch = self.frames[frame_id.as_usize()].data.read();

        {
            let state = self.state.lock();
            let meta = &state.frame_metadata[frame_id.as_usize()];
            if meta.page_id != Some(page_id) || !meta.is_dirty {
                return Ok(());
            }
        }

        self.disk.write_page(page_id, latch.as_slice())?;

        let mut state = self.state.lock();
        let meta = &mut state.frame_metadata[frame_id.as_usize()];
        if meta.page_id == Some(page_id) {
            meta.is_dirty = false;
        }
        Ok(())
    }

    /// Gets the frame holding `page_id`, loading the page if necessary.
    ///
    /// On a hit the pin count is incremented. On a miss a frame is obtained
    /// from the free list or the replacer, the page is read from disk, and
    /// the frame is registered in the page table with `pin_count = 1`.
    ///
    /// # Concurrency Note
    ///
    /// If multiple threads concurrently request the same non-resident page,
    /// both may allocate frames and perform I/O. After I/O completes the page
    /// table is re-checked and the redundant frame is discarded if another
    /// thread won the race. This is inefficient but correct.
    fn get_or_load_frame(&self, page_id: PageId) -> Result<FrameId, BufferPoolError> {
        // Fast path: page is already resident.
        {
            let mut state = self.state.lock();
            if let Some(&frame_id) = state.page_table.get(&page_id) {
                state.frame_metadata[frame_id.as_usize()].pin_count += 1;
                self.replacer.pin(frame_id);
                return Ok(frame_id);
            }
        }

        debug!(page_id = page_id.page_num(), "buffer pool miss, loading from disk");

        let frame_id = self.allocate_frame()?;

        // Read the page into the frame. No pins exist on this frame, so the
        // latch is uncontended.
        let read_result = {
            let mut latch = self.frames[frame_id.as_usize()].data.write();
            self.disk.read_page(page_id, latch.as_mut_slice())
        };

        if let Err(e) = read_result {
            let mut state = self.state.lock();
            state.free_list.push_back(frame_id);
            return Err(e.into());
        }

        let mut state = self.state.lock();

        // Another thread may have loaded this page while we were doing I/O.
        if let Some(&existing) = state.page_table.get(&page_id) {
            state.free_list.push_back(frame_id);
            state.frame_metadata[existing.as_usize()].pin_count += 1;
            self.replacer.pin(existing);
            return Ok(existing);
        }

        state.page_table.insert(page_id, frame_id);
        state.frame_metadata[frame_id.as_usize()].reset(page_id);

        Ok(frame_id)
    }

    /// Obtains an empty frame: free list first, then the replacer.
    fn allocate_frame(&self) -> Result<FrameId, BufferPoolError> {
        loop {
            {
                let mut state = self.state.lock();
                if let Some(frame_id) = state.free_list.pop_front() {
                    return Ok(frame_id);
                }
            }

            let Some(frame_id) = self.replacer.victim() else {
                return Err(BufferPoolError::NoFreeFrames);
            };

            let (old_page_id, is_dirty) = {
                let state = self.state.lock();
                let meta = &state.frame_metadata[frame_id.as_usize()];
                (meta.page_id, meta.is_dirty)
            };

            // Write back the victim's page if dirty.
            if let Some(old_page_id) = old_page_id {
                if is_dirty {
                    let latch = self.frames[frame_id.as_usize()].data.read();
                    if let Err(e) = self.disk.write_page(old_page_id, latch.as_slice()) {
                        // Leave the victim resident and dirty, but put it
                        // back in the replacer so it stays evictable.
                        self.replacer.unpin(frame_id);
                        return Err(e.into());
                    }
                }
                trace!(
                    page_id = old_page_id.page_num(),
                    frame_id = frame_id.as_usize(),
                    "evicted page from frame"
                );
            }

            {
                let mut state = self.state.lock();

                // The victim may have been re-pinned through the page table
                // while we were writing back; pick another one.
                if state.frame_metadata[frame_id.as_usize()].pin_count > 0 {
                    continue;
                }

                if let Some(old_page_id) = old_page_id {
                    state.page_table.remove(&old_page_id);
                }
                state.frame_metadata[frame_id.as_usize()].clear();

                return Ok(frame_id);
            }
        }
    }

    /// Unpins a frame (called from guard drops).
    ///
    /// When the pin count reaches zero the frame becomes a replacer
    /// candidate.
    pub(super) fn unpin(&self, frame_id: FrameId, is_dirty: bool) {
        let mut state = self.state.lock();
        let meta = &mut state.frame_metadata[frame_id.as_usize()];

        if meta.pin_count > 0 {
            meta.pin_count -= 1;
            if is_dirty {
                meta.is_dirty = true;
            }
            if meta.pin_count == 0 {
                self.replacer.unpin(frame_id);
            }
        }
    }
}
