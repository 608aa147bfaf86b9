//! Buffer pool stress test with concurrent random access.
//!
//! Workers apply random byte-wise additions to a page set larger than the
//! pool, forcing a mix of cache hits, evictions, and write-backs. Additions
//! commute, so the final disk image is deterministic regardless of thread
//! interleaving and can be verified exactly.

use std::sync::Arc;
use std::thread;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use stratum::storage::buffer::ClockReplacer;
use stratum::storage::{
    BufferPool, BufferPoolConfig, DiskManager, FileDiskManager, PAGE_SIZE, PageId,
};
use tempfile::TempDir;

/// Configuration for the stress test.
#[derive(Debug, Clone)]
struct StressConfig {
    /// Number of frames in the buffer pool.
    pool_size: usize,
    /// Total number of pages on disk.
    total_pages: usize,
    /// Number of concurrent worker threads.
    num_workers: usize,
    /// Number of operations each worker performs.
    ops_per_worker: usize,
}

impl Default for StressConfig {
    fn default() -> Self {
        Self {
            pool_size: 16,
            total_pages: 64,
            num_workers: 8,
            ops_per_worker: 500,
        }
    }
}

/// One byte-wise addition applied by a worker.
#[derive(Debug, Clone, Copy)]
struct WriteRecord {
    page: usize,
    offset: usize,
    delta: u8,
}

#[test]
fn test_concurrent_random_additive_writes() {
    let config = StressConfig::default();

    let temp_dir = TempDir::new().unwrap();
    let disk = FileDiskManager::open(temp_dir.path().join("stress.db")).unwrap();
    for _ in 0..config.total_pages {
        disk.allocate_page().unwrap();
    }

    let pool = Arc::new(BufferPool::new(
        disk,
        ClockReplacer::new(config.pool_size),
        BufferPoolConfig {
            pool_size: config.pool_size,
        },
    ));

    let mut handles = Vec::new();
    for worker in 0..config.num_workers {
        let pool = Arc::clone(&pool);
        let config = config.clone();
        handles.push(thread::spawn(move || {
            let mut rng = StdRng::seed_from_u64(0xACE5 + worker as u64);
            let mut log = Vec::with_capacity(config.ops_per_worker);

            for op in 0..config.ops_per_worker {
                let page = rng.gen_range(0..config.total_pages);

                // Every eighth op is a pure read to exercise shared latches.
                if op % 8 == 7 {
                    let guard = pool.fetch_page_read(PageId::new(page as u64)).unwrap();
                    let _ = guard[rng.gen_range(0..PAGE_SIZE)];
                    continue;
                }

                let offset = rng.gen_range(0..PAGE_SIZE);
                let delta = rng.gen_range(1..=255u8);

                let mut guard = pool.fetch_page_write(PageId::new(page as u64)).unwrap();
                guard[offset] = guard[offset].wrapping_add(delta);
                drop(guard);

                log.push(WriteRecord {
                    page,
                    offset,
                    delta,
                });
            }
            log
        }));
    }

    let mut all_writes = Vec::new();
    for handle in handles {
        all_writes.extend(handle.join().unwrap());
    }

    pool.flush_all_pages().unwrap();

    // Replay the log into an in-memory model and compare against disk.
    let mut expected = vec![vec![0u8; PAGE_SIZE]; config.total_pages];
    for record in &all_writes {
        expected[record.page][record.offset] =
            expected[record.page][record.offset].wrapping_add(record.delta);
    }

    let mut buf = vec![0u8; PAGE_SIZE];
    for page in 0..config.total_pages {
        pool.disk()
            .read_page(PageId::new(page as u64), &mut buf)
            .unwrap();
        assert_eq!(buf, expected[page], "page {} diverged", page);
    }
}

#[test]
fn test_concurrent_fetches_of_one_hot_page() {
    let temp_dir = TempDir::new().unwrap();
    let pool = Arc::new(BufferPool::new(
        FileDiskManager::open(temp_dir.path().join("hot.db")).unwrap(),
        ClockReplacer::new(4),
        BufferPoolConfig { pool_size: 4 },
    ));

    let hot = {
        let guard = pool.new_page().unwrap();
        guard.page_id()
    };

    let mut handles = Vec::new();
    for worker in 0..8u64 {
        let pool = Arc::clone(&pool);
        handles.push(thread::spawn(move || {
            for i in 0..200u64 {
                if (i + worker) % 4 == 0 {
                    let mut guard = pool.fetch_page_write(hot).unwrap();
                    guard[0] = guard[0].wrapping_add(1);
                } else {
                    let guard = pool.fetch_page_read(hot).unwrap();
                    let _ = guard[0];
                }
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }

    // 8 workers x 50 increments each.
    let guard = pool.fetch_page_read(hot).unwrap();
    assert_eq!(guard[0], ((8 * 50) % 256) as u8);
}
