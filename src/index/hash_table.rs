//! Persistent linear-probing hash table.
//!
//! The table is a multi-map-like index allowing duplicate keys but
//! forbidding duplicate (key, value) pairs. All state lives on buffer-pool
//! pages: a header page lists the block pages, and each block page holds a
//! fixed array of slots with occupied/readable bitmaps.
//!
//! # Concurrency
//!
//! The table owns a readers-writer latch wrapped around the header page id.
//! Lookups and ordinary mutations take it shared; resize takes it exclusive
//! (and is the only operation that changes the id). Within an operation the
//! header page guard is acquired before any block page guard, and block
//! guards are held one at a time: the previous block's guard is released
//! before the next block is fetched, so two probes travelling in opposite
//! directions cannot deadlock.

use std::cmp::Ordering;
use std::marker::PhantomData;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

use crate::storage::buffer::Replacer;
use crate::storage::{BufferPool, DiskManager, PageId};
use crate::tx::Transaction;

use super::block_page::{HashTableBlockPage, block_capacity};
use super::error::IndexError;
use super::header_page::{HashTableHeaderPage, max_block_ids};
use super::key::{FixedCodec, KeyComparator, KeyHasher};

/// Outcome of probing the table for an insertion slot.
enum InsertOutcome {
    /// The pair was written into a free or tombstoned slot.
    Inserted,
    /// An identical (key, value) pair is already live in the table.
    Duplicate,
    /// The probe revisited its start bucket without finding a slot. Carries
    /// the capacity observed, which becomes the resize argument.
    Full(usize),
}

/// A disk-backed linear-probing hash index.
///
/// Keys hash to a bucket in the flat space `0..num_blocks * CAPACITY`;
/// collisions probe forward one bucket at a time, wrapping at the end.
/// Removal tombstones a slot (occupied stays set, readable is cleared) so
/// later probes keep traversing the run.
///
/// When an insert cannot find a slot in a full revolution, the table doubles
/// its capacity, migrating every live entry into freshly allocated pages and
/// deallocating the old ones.
pub struct LinearProbeHashTable<K, V, C, H, D: DiskManager, R: Replacer> {
    /// Guards the header page id. Shared by lookups and ordinary mutations,
    /// exclusive during resize, which is the only writer of the id.
    header: RwLock<PageId>,
    pool: Arc<BufferPool<D, R>>,
    comparator: C,
    hasher: H,
    _marker: PhantomData<fn() -> (K, V)>,
}

impl<K, V, C, H, D, R> LinearProbeHashTable<K, V, C, H, D, R>
where
    K: FixedCodec,
    V: FixedCodec + PartialEq,
    C: KeyComparator<K>,
    H: KeyHasher<K>,
    D: DiskManager,
    R: Replacer,
{
    /// Number of slots per block page for this key/value pairing.
    pub const BLOCK_CAPACITY: usize = block_capacity(K::ENCODED_SIZE + V::ENCODED_SIZE);

    /// Creates a new hash table spanning `num_blocks` block pages.
    ///
    /// Allocates the header page and every block page through the buffer
    /// pool.
    ///
    /// # Panics
    ///
    /// Panics if `num_blocks` is 0.
    ///
    /// # Errors
    ///
    /// Returns `IndexError::TooManyBlocks` if `num_blocks` exceeds what one
    /// header page can list, or a buffer pool error if page allocation
    /// fails.
    pub fn new(
        pool: Arc<BufferPool<D, R>>,
        comparator: C,
        hasher: H,
        num_blocks: usize,
    ) -> Result<Self, IndexError> {
        assert!(num_blocks > 0, "hash table needs at least one block page");
        if num_blocks > max_block_ids() {
            return Err(IndexError::TooManyBlocks {
                requested: num_blocks,
                max: max_block_ids(),
            });
        }

        let header_page_id = Self::build_table(&pool, num_blocks)?;

        Ok(Self {
            header: RwLock::new(header_page_id),
            pool,
            comparator,
            hasher,
            _marker: PhantomData,
        })
    }

    /// Returns every value stored under `key`.
    pub fn get_value(&self, _txn: &Transaction, key: &K) -> Result<Vec<V>, IndexError> {
        let header_page_id = self.header.read();
        let header_guard = self.pool.fetch_page_read(*header_page_id)?;
        let header = HashTableHeaderPage::new(&header_guard[..]);

        let capacity = header.num_blocks() * Self::BLOCK_CAPACITY;
        let start = (self.hasher.hash_key(key) % capacity as u64) as usize;

        let mut result = Vec::new();
        let mut bucket = start;
        let mut block_index = start / Self::BLOCK_CAPACITY;
        let mut block_guard = self.pool.fetch_page_read(header.block_page_id(block_index))?;

        loop {
            if bucket / Self::BLOCK_CAPACITY != block_index {
                block_index = bucket / Self::BLOCK_CAPACITY;
                drop(block_guard);
                block_guard = self.pool.fetch_page_read(header.block_page_id(block_index))?;
            }

            let slot = bucket % Self::BLOCK_CAPACITY;
            let block = HashTableBlockPage::<_, K, V>::new(&block_guard[..]);
            if !block.is_occupied(slot) {
                break;
            }
            if block.is_readable(slot)
                && self.comparator.compare(&block.key_at(slot), key) == Ordering::Equal
            {
                result.push(block.value_at(slot));
            }

            bucket = (bucket + 1) % capacity;
            if bucket == start {
                break;
            }
        }

        Ok(result)
    }

    /// Inserts a (key, value) pair.
    ///
    /// Duplicate keys are allowed; an identical (key, value) pair is
    /// rejected with `Ok(false)`. A full table grows itself (doubling its
    /// capacity, possibly more than once) and the insert is retried.
    pub fn insert(&self, _txn: &Transaction, key: &K, value: &V) -> Result<bool, IndexError> {
        loop {
            let outcome = {
                let header_page_id = self.header.read();
                self.probe_insert(*header_page_id, key, value, true)?
                // shared latch released here so resize can take it exclusively
            };

            match outcome {
                InsertOutcome::Inserted => return Ok(true),
                InsertOutcome::Duplicate => return Ok(false),
                InsertOutcome::Full(capacity) => self.resize(capacity)?,
            }
        }
    }

    /// Removes a (key, value) pair, tombstoning its slot.
    ///
    /// Returns `Ok(false)` if the pair is not live in the table (never
    /// inserted, or already removed).
    pub fn remove(&self, _txn: &Transaction, key: &K, value: &V) -> Result<bool, IndexError> {
        let header_page_id = self.header.read();
        let header_guard = self.pool.fetch_page_read(*header_page_id)?;
        let header = HashTableHeaderPage::new(&header_guard[..]);

        let capacity = header.num_blocks() * Self::BLOCK_CAPACITY;
        let start = (self.hasher.hash_key(key) % capacity as u64) as usize;

        let mut bucket = start;
        let mut block_index = start / Self::BLOCK_CAPACITY;
        let mut block_guard = self.pool.fetch_page_write(header.block_page_id(block_index))?;

        loop {
            if bucket / Self::BLOCK_CAPACITY != block_index {
                block_index = bucket / Self::BLOCK_CAPACITY;
                drop(block_guard);
                block_guard = self.pool.fetch_page_write(header.block_page_id(block_index))?;
            }

            let slot = bucket % Self::BLOCK_CAPACITY;
            let mut block = HashTableBlockPage::<_, K, V>::new(&mut block_guard[..]);
            if !block.is_occupied(slot) {
                return Ok(false);
            }
            if self.comparator.compare(&block.key_at(slot), key) == Ordering::Equal
                && block.value_at(slot) == *value
            {
                if block.is_readable(slot) {
                    block.remove(slot);
                    return Ok(true);
                }
                // Already a tombstone.
                return Ok(false);
            }

            bucket = (bucket + 1) % capacity;
            if bucket == start {
                return Ok(false);
            }
        }
    }

    /// Grows the table to `2 × input_size` buckets.
    ///
    /// Allocates a fresh header and block pages, reinserts every live entry,
    /// swaps the header page id, and deallocates the old pages. Tombstones
    /// are not carried over.
    ///
    /// Must not be called with any index latch held by the calling thread.
    pub fn resize(&self, input_size: usize) -> Result<(), IndexError> {
        let mut header_page_id = self.header.write();

        let new_capacity = 2 * input_size;
        let new_num_blocks = std::cmp::max(1, new_capacity / Self::BLOCK_CAPACITY);
        if new_num_blocks > max_block_ids() {
            return Err(IndexError::TooManyBlocks {
                requested: new_num_blocks,
                max: max_block_ids(),
            });
        }

        debug!(
            old_header = header_page_id.page_num(),
            new_num_blocks, "resizing hash table"
        );

        let new_header_page_id = Self::build_table(&self.pool, new_num_blocks)?;

        // Migrate live entries block by block, deallocating as we go.
        let old_header_page_id = *header_page_id;
        {
            let old_header_guard = self.pool.fetch_page_read(old_header_page_id)?;
            let old_header = HashTableHeaderPage::new(&old_header_guard[..]);

            for block_index in 0..old_header.num_blocks() {
                let old_block_page_id = old_header.block_page_id(block_index);
                {
                    let old_block_guard = self.pool.fetch_page_read(old_block_page_id)?;
                    let old_block = HashTableBlockPage::<_, K, V>::new(&old_block_guard[..]);

                    for slot in 0..Self::BLOCK_CAPACITY {
                        if old_block.is_readable(slot) {
                            let key = old_block.key_at(slot);
                            let value = old_block.value_at(slot);
                            match self.probe_insert(new_header_page_id, &key, &value, false)? {
                                InsertOutcome::Inserted => {}
                                // A table of double capacity holding fewer
                                // entries than capacity always has a free
                                // slot in the probe's revolution.
                                _ => {
                                    return Err(IndexError::Internal(
                                        "migration found no free slot in grown table".into(),
                                    ));
                                }
                            }
                        }
                    }
                }
                self.pool.delete_page(old_block_page_id)?;
            }
        }
        self.pool.delete_page(old_header_page_id)?;

        *header_page_id = new_header_page_id;
        Ok(())
    }

    /// Returns the table's logical capacity in buckets.
    ///
    /// This counts slots, not live entries.
    pub fn get_size(&self) -> Result<usize, IndexError> {
        let header_page_id = self.header.read();
        let header_guard = self.pool.fetch_page_read(*header_page_id)?;
        let header = HashTableHeaderPage::new(&header_guard[..]);
        Ok(header.num_blocks() * Self::BLOCK_CAPACITY)
    }

    /// Returns the current header page id.
    pub fn header_page_id(&self) -> PageId {
        *self.header.read()
    }

    /// Allocates and initializes a header page plus `num_blocks` empty block
    /// pages, returning the header's page id.
    fn build_table(pool: &BufferPool<D, R>, num_blocks: usize) -> Result<PageId, IndexError> {
        let mut header_guard = pool.new_page()?;
        let header_page_id = header_guard.page_id();

        let mut header = HashTableHeaderPage::new(&mut header_guard[..]);
        header.set_page_id(header_page_id);
        header.set_num_blocks(num_blocks);

        for _ in 0..num_blocks {
            // A zeroed page is a valid empty block: both bitmaps clear.
            let block_guard = pool.new_page()?;
            header.add_block_page_id(block_guard.page_id());
        }

        Ok(header_page_id)
    }

    /// Probes for `key`'s run starting at its home bucket and inserts the
    /// pair into the first slot without a live entry.
    ///
    /// With `check_duplicate`, a live identical pair found along the probe
    /// short-circuits as `Duplicate`. Migration passes `false`: the entries
    /// being reinserted are already pairwise distinct.
    fn probe_insert(
        &self,
        header_page_id: PageId,
        key: &K,
        value: &V,
        check_duplicate: bool,
    ) -> Result<InsertOutcome, IndexError> {
        let header_guard = self.pool.fetch_page_read(header_page_id)?;
        let header = HashTableHeaderPage::new(&header_guard[..]);

        let capacity = header.num_blocks() * Self::BLOCK_CAPACITY;
        let start = (self.hasher.hash_key(key) % capacity as u64) as usize;

        let mut bucket = start;
        let mut block_index = start / Self::BLOCK_CAPACITY;
        let mut block_guard = self.pool.fetch_page_write(header.block_page_id(block_index))?;

        loop {
            if bucket / Self::BLOCK_CAPACITY != block_index {
                block_index = bucket / Self::BLOCK_CAPACITY;
                drop(block_guard);
                block_guard = self.pool.fetch_page_write(header.block_page_id(block_index))?;
            }

            let slot = bucket % Self::BLOCK_CAPACITY;
            let mut block = HashTableBlockPage::<_, K, V>::new(&mut block_guard[..]);
            if block.insert(slot, key, value) {
                return Ok(InsertOutcome::Inserted);
            }
            if check_duplicate
                && self.comparator.compare(&block.key_at(slot), key) == Ordering::Equal
                && block.value_at(slot) == *value
            {
                return Ok(InsertOutcome::Duplicate);
            }

            bucket = (bucket + 1) % capacity;
            if bucket == start {
                return Ok(InsertOutcome::Full(capacity));
            }
        }
    }
}
