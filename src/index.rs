//! Disk-backed index structures.
//!
//! The only access method in this crate is a linear-probing hash table
//! whose header and block pages are ordinary buffer-pool pages. The index
//! never touches the disk manager directly; every read and mutation flows
//! through page guards handed out by the buffer pool.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use stratum::index::{IdentityHasher, LinearProbeHashTable, OrdComparator};
//! use stratum::storage::buffer::ClockReplacer;
//! use stratum::storage::{BufferPool, BufferPoolConfig, MemoryDiskManager};
//! use stratum::tx::Transaction;
//!
//! let pool = Arc::new(BufferPool::new(
//!     MemoryDiskManager::new(),
//!     ClockReplacer::new(16),
//!     BufferPoolConfig { pool_size: 16 },
//! ));
//! let table: LinearProbeHashTable<u64, u64, _, _, _, _> =
//!     LinearProbeHashTable::new(pool, OrdComparator, IdentityHasher, 2).unwrap();
//!
//! let txn = Transaction::new(0);
//! assert!(table.insert(&txn, &1, &10).unwrap());
//! assert_eq!(table.get_value(&txn, &1).unwrap(), vec![10]);
//! assert!(table.remove(&txn, &1, &10).unwrap());
//! assert!(table.get_value(&txn, &1).unwrap().is_empty());
//! ```

pub mod block_page;
pub mod error;
pub mod hash_table;
pub mod header_page;
pub mod key;

pub use block_page::{HashTableBlockPage, block_capacity};
pub use error::IndexError;
pub use hash_table::LinearProbeHashTable;
pub use header_page::{HashTableHeaderPage, max_block_ids};
pub use key::{DefaultKeyHasher, FixedCodec, IdentityHasher, KeyComparator, KeyHasher, OrdComparator};
