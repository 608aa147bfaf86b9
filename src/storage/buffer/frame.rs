//! Frame management for the buffer pool.
//!
//! A frame is a slot in the buffer pool that holds one page at a time.
//! The page bytes live behind a per-frame readers-writer latch; the
//! bookkeeping (resident page id, pin count, dirty flag) lives in
//! `FrameMetadata`, which the pool mutates only under its state mutex.

use parking_lot::RwLock;

use crate::storage::{PageData, PageId};

/// Identifier for a frame in the buffer pool.
///
/// `FrameId` is distinct from `PageId`: `PageId` identifies a logical page on
/// disk, while `FrameId` identifies a physical memory slot in the buffer pool.
///
/// `FrameId`s are valid only within the context of a single `BufferPool`
/// instance and range from 0 to pool_size-1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FrameId(usize);

impl FrameId {
    /// Creates a new `FrameId`.
    pub const fn new(id: usize) -> Self {
        Self(id)
    }

    /// Returns the frame ID as a `usize`.
    pub const fn as_usize(&self) -> usize {
        self.0
    }
}

/// A frame's page buffer behind its own readers-writer latch.
///
/// The latch serializes access to the page bytes across all holders of
/// fetched references; it is distinct from the pool's state mutex and is
/// held for as long as a page guard is alive.
pub struct Frame {
    /// The page data buffer (always allocated).
    pub(super) data: RwLock<PageData>,
}

impl Frame {
    /// Creates a new empty frame.
    pub fn new() -> Self {
        Self {
            data: RwLock::new(PageData::new()),
        }
    }
}

impl Default for Frame {
    fn default() -> Self {
        Self::new()
    }
}

/// Bookkeeping for one frame, protected by the pool's state mutex.
#[derive(Debug)]
pub(super) struct FrameMetadata {
    /// The `PageId` currently loaded in this frame, if any.
    pub(super) page_id: Option<PageId>,

    /// Number of operations currently using this frame.
    ///
    /// A frame cannot be evicted while `pin_count > 0`. Each successful
    /// fetch increments this counter; each guard drop decrements it.
    pub(super) pin_count: u32,

    /// Whether the page has been modified since loading from disk.
    ///
    /// Dirty pages must be written back before eviction.
    pub(super) is_dirty: bool,
}

impl FrameMetadata {
    pub(super) fn new() -> Self {
        Self {
            page_id: None,
            pin_count: 0,
            is_dirty: false,
        }
    }

    /// Sets the page ID and resets bookkeeping for a fresh page load.
    pub(super) fn reset(&mut self, page_id: PageId) {
        self.page_id = Some(page_id);
        self.pin_count = 1; // Initially pinned by the caller
        self.is_dirty = false;
    }

    /// Clears the frame's bookkeeping, returning it to the empty state.
    pub(super) fn clear(&mut self) {
        self.page_id = None;
        self.pin_count = 0;
        self.is_dirty = false;
    }
}
