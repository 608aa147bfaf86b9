//! Page replacement policies for the buffer pool.
//!
//! The replacer tracks which frames are evictable (unpinned) and selects
//! victims for eviction when the buffer pool needs free frames. It knows
//! nothing about pages or disk; it sees frame slots only.

use parking_lot::Mutex;

use super::frame::FrameId;

/// Trait for page replacement policies.
///
/// The replacer tracks which frames are evictable (unpinned) and selects
/// victims for eviction when the buffer pool needs free frames.
///
/// # Thread Safety
///
/// Implementations synchronize internally; every method takes `&self`. The
/// replacer's lock is the innermost in the crate's lock hierarchy: no other
/// lock is acquired while it is held.
///
/// # Usage
///
/// ```text
/// // When a page's pin_count drops to 0
/// replacer.unpin(frame_id);
///
/// // When a page's pin_count increases from 0
/// replacer.pin(frame_id);
///
/// // When the buffer pool needs a victim
/// if let Some(victim) = replacer.victim() {
///     // Evict the victim frame
/// }
/// ```
pub trait Replacer: Send + Sync {
    /// Selects a victim frame for eviction.
    ///
    /// Returns `Some(frame_id)` if there's an evictable frame, `None` if all
    /// frames are pinned.
    ///
    /// The returned frame is removed from the evictable set.
    fn victim(&self) -> Option<FrameId>;

    /// Marks a frame as non-evictable (pinned).
    ///
    /// Called when a frame's pin_count increases from 0 to 1.
    /// Idempotent: pinning an already pinned frame is a no-op.
    fn pin(&self, frame_id: FrameId);

    /// Marks a frame as evictable (unpinned).
    ///
    /// Called when a frame's pin_count decreases to 0.
    /// Idempotent: unpinning an already unpinned frame is a no-op.
    fn unpin(&self, frame_id: FrameId);

    /// Returns the number of evictable frames.
    fn size(&self) -> usize;
}

/// Per-slot state tracked by the clock replacer.
#[derive(Debug, Clone, Copy)]
struct ClockSlot {
    /// A pinned slot is never a victim candidate.
    pinned: bool,
    /// Set on unpin; grants the slot one second chance per sweep.
    referenced: bool,
}

/// State behind the replacer's internal mutex.
struct ClockState {
    slots: Vec<ClockSlot>,
    /// Cursor over `slots`, always taken modulo the slot count.
    hand: usize,
    /// Number of slots with `pinned == false`.
    candidates: usize,
}

/// Clock (second-chance) page replacement policy.
///
/// The replacer holds one slot per buffer pool frame, each carrying a pinned
/// bit and a reference bit. A sweep of the clock hand skips pinned slots,
/// demotes referenced candidates by clearing their reference bit, and selects
/// the first unreferenced candidate it reaches.
///
/// Every slot starts pinned with the reference bit clear: the buffer pool
/// begins with all frames in its free list, so nothing is evictable until a
/// frame is explicitly released via `unpin`.
///
/// # Example
///
/// ```
/// use stratum::storage::buffer::{ClockReplacer, FrameId, Replacer};
///
/// let replacer = ClockReplacer::new(3);
/// replacer.unpin(FrameId::new(0));
/// replacer.unpin(FrameId::new(1));
/// assert_eq!(replacer.size(), 2);
///
/// // Both candidates carry a reference bit, so the sweep clears frame 0's
/// // bit first and selects it on the second pass.
/// assert_eq!(replacer.victim(), Some(FrameId::new(0)));
/// assert_eq!(replacer.size(), 1);
/// ```
pub struct ClockReplacer {
    state: Mutex<ClockState>,
}

impl ClockReplacer {
    /// Creates a clock replacer with `num_frames` slots, none evictable.
    pub fn new(num_frames: usize) -> Self {
        Self {
            state: Mutex::new(ClockState {
                slots: vec![
                    ClockSlot {
                        pinned: true,
                        referenced: false,
                    };
                    num_frames
                ],
                hand: 0,
                candidates: 0,
            }),
        }
    }
}

impl Replacer for ClockReplacer {
    fn victim(&self) -> Option<FrameId> {
        let mut state = self.state.lock();
        if state.candidates == 0 {
            return None;
        }

        // Terminates: each candidate grants at most one second chance per
        // sweep, and at least one candidate exists.
        loop {
            state.hand %= state.slots.len();
            let hand = state.hand;
            if state.slots[hand].pinned {
                state.hand += 1;
            } else if state.slots[hand].referenced {
                state.slots[hand].referenced = false;
                state.hand += 1;
            } else {
                state.slots[hand].pinned = true;
                state.candidates -= 1;
                state.hand += 1;
                return Some(FrameId::new(hand));
            }
        }
    }

    fn pin(&self, frame_id: FrameId) {
        let mut state = self.state.lock();
        let slot = &mut state.slots[frame_id.as_usize()];
        if !slot.pinned {
            slot.pinned = true;
            state.candidates -= 1;
        }
    }

    fn unpin(&self, frame_id: FrameId) {
        let mut state = self.state.lock();
        let slot = &mut state.slots[frame_id.as_usize()];
        if slot.pinned {
            slot.pinned = false;
            slot.referenced = true;
            state.candidates += 1;
        }
    }

    fn size(&self) -> usize {
        self.state.lock().candidates
    }
}
