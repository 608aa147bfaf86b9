//! Buffer pool for page caching.
//!
//! The buffer pool pins disk pages in memory on behalf of higher-level
//! access methods, with a clock replacement policy and RAII-based access
//! guards.
//!
//! # Example
//!
//! ```
//! use stratum::storage::buffer::ClockReplacer;
//! use stratum::storage::{BufferPool, BufferPoolConfig, MemoryDiskManager};
//!
//! let disk = MemoryDiskManager::new();
//! let pool = BufferPool::new(disk, ClockReplacer::new(16), BufferPoolConfig { pool_size: 16 });
//!
//! // Allocate and write a new page
//! let page_id = {
//!     let mut guard = pool.new_page().unwrap();
//!     guard[0..5].copy_from_slice(b"hello");
//!     guard.page_id()
//! }; // guard unpins and marks dirty on drop
//!
//! // Read the page back
//! let guard = pool.fetch_page_read(page_id).unwrap();
//! assert_eq!(&guard[0..5], b"hello");
//! ```

mod error;
mod frame;
mod guard;
mod pool;
mod replacer;

pub use error::BufferPoolError;
pub use guard::{PageReadGuard, PageWriteGuard};
pub use pool::{BufferPool, BufferPoolConfig};
pub use replacer::{ClockReplacer, Replacer};

// Re-export FrameId for testing/debugging (but not Frame internals)
pub use frame::FrameId;
