//! Integration tests for the linear-probe hash table.
//!
//! The table runs against a real buffer pool with the clock replacer. The
//! identity hasher makes bucket placement deterministic: key k lands in
//! bucket k modulo the table capacity.

use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use stratum::index::{
    DefaultKeyHasher, IdentityHasher, LinearProbeHashTable, OrdComparator,
};
use stratum::storage::buffer::ClockReplacer;
use stratum::storage::{BufferPool, BufferPoolConfig, MemoryDiskManager};
use stratum::tx::Transaction;

type TestPool = BufferPool<MemoryDiskManager, ClockReplacer>;
type IdentityTable = LinearProbeHashTable<
    u64,
    u64,
    OrdComparator,
    IdentityHasher,
    MemoryDiskManager,
    ClockReplacer,
>;
type HashedTable = LinearProbeHashTable<
    u64,
    u64,
    OrdComparator,
    DefaultKeyHasher,
    MemoryDiskManager,
    ClockReplacer,
>;

const CAP: usize = IdentityTable::BLOCK_CAPACITY;

fn make_pool(frames: usize) -> Arc<TestPool> {
    Arc::new(BufferPool::new(
        MemoryDiskManager::new(),
        ClockReplacer::new(frames),
        BufferPoolConfig { pool_size: frames },
    ))
}

fn identity_table(num_blocks: usize) -> IdentityTable {
    LinearProbeHashTable::new(make_pool(64), OrdComparator, IdentityHasher, num_blocks).unwrap()
}

#[test]
fn test_insert_get_remove_across_blocks() {
    let table = identity_table(2);
    let txn = Transaction::new(0);

    // Two values under one key, plus a key landing in the second block.
    assert!(table.insert(&txn, &1, &10).unwrap());
    assert!(table.insert(&txn, &1, &20).unwrap());
    assert!(table.insert(&txn, &((1 + CAP) as u64), &30).unwrap());

    assert_eq!(table.get_value(&txn, &1).unwrap(), vec![10, 20]);

    // Removing one pair tombstones its slot; the other value survives and
    // the probe still traverses the tombstone.
    assert!(table.remove(&txn, &1, &10).unwrap());
    assert_eq!(table.get_value(&txn, &1).unwrap(), vec![20]);
    assert_eq!(table.get_value(&txn, &((1 + CAP) as u64)).unwrap(), vec![30]);
}

#[test]
fn test_duplicate_pair_rejected() {
    let table = identity_table(2);
    let txn = Transaction::new(0);

    assert!(table.insert(&txn, &5, &5).unwrap());
    assert!(!table.insert(&txn, &5, &5).unwrap());
    assert!(table.insert(&txn, &5, &6).unwrap());

    assert_eq!(table.get_value(&txn, &5).unwrap(), vec![5, 6]);
}

#[test]
fn test_remove_missing_pair() {
    let table = identity_table(1);
    let txn = Transaction::new(0);

    assert!(!table.remove(&txn, &3, &30).unwrap());

    table.insert(&txn, &3, &30).unwrap();
    assert!(!table.remove(&txn, &3, &31).unwrap());
    assert!(table.remove(&txn, &3, &30).unwrap());

    // A second removal of the same pair hits the tombstone.
    assert!(!table.remove(&txn, &3, &30).unwrap());
}

#[test]
fn test_reinsert_after_remove() {
    let table = identity_table(1);
    let txn = Transaction::new(0);

    assert!(table.insert(&txn, &7, &70).unwrap());
    assert!(table.remove(&txn, &7, &70).unwrap());
    assert!(table.insert(&txn, &7, &70).unwrap());
    assert_eq!(table.get_value(&txn, &7).unwrap(), vec![70]);
}

#[test]
fn test_probe_wraps_around_capacity() {
    let table = identity_table(1);
    let txn = Transaction::new(0);
    let last = (CAP - 1) as u64;

    // Both pairs hash to the last bucket; the second wraps to bucket 0.
    assert!(table.insert(&txn, &last, &1).unwrap());
    assert!(table.insert(&txn, &last, &2).unwrap());
    assert_eq!(table.get_value(&txn, &last).unwrap(), vec![1, 2]);

    // Tombstoning the home slot must not hide the wrapped value.
    assert!(table.remove(&txn, &last, &1).unwrap());
    assert_eq!(table.get_value(&txn, &last).unwrap(), vec![2]);
}

#[test]
fn test_get_size_reports_capacity() {
    let table = identity_table(2);
    assert_eq!(table.get_size().unwrap(), 2 * CAP);
}

#[test]
fn test_full_table_resizes_and_keeps_entries() {
    let table = identity_table(1);
    let txn = Transaction::new(0);

    // Fill every bucket with a distinct key.
    for k in 0..CAP as u64 {
        assert!(table.insert(&txn, &k, &(k + 1)).unwrap());
    }
    assert_eq!(table.get_size().unwrap(), CAP);

    // One more insert finds no slot in a full revolution and grows the
    // table before retrying.
    let extra = CAP as u64;
    assert!(table.insert(&txn, &extra, &(extra + 1)).unwrap());

    assert!(table.get_size().unwrap() >= 2 * CAP);
    for k in 0..=CAP as u64 {
        assert_eq!(table.get_value(&txn, &k).unwrap(), vec![k + 1]);
    }
}

#[test]
fn test_resize_drops_tombstones() {
    let table = identity_table(1);
    let txn = Transaction::new(0);

    for k in 0..CAP as u64 {
        table.insert(&txn, &k, &k).unwrap();
    }
    // Tombstone a few entries, then force a resize.
    for k in 0..10u64 {
        assert!(table.remove(&txn, &k, &k).unwrap());
    }
    table.insert(&txn, &(CAP as u64), &0).unwrap();

    // Removed pairs stay gone after migration; live ones survive.
    for k in 0..10u64 {
        assert!(table.get_value(&txn, &k).unwrap().is_empty());
    }
    for k in 10..CAP as u64 {
        assert_eq!(table.get_value(&txn, &k).unwrap(), vec![k]);
    }
}

#[test]
fn test_hashed_workload_with_growth() {
    let pool = make_pool(64);
    let table: HashedTable =
        LinearProbeHashTable::new(pool, OrdComparator, DefaultKeyHasher, 2).unwrap();
    let txn = Transaction::new(0);

    let mut rng = StdRng::seed_from_u64(0x5eed);
    let mut entries = Vec::new();
    for _ in 0..2500 {
        let key: u64 = rng.gen_range(0..1_000_000_000);
        let value: u64 = rng.gen_range(0..1_000_000_000);
        if table.insert(&txn, &key, &value).unwrap() {
            entries.push((key, value));
        }
    }

    assert_eq!(table.get_size().unwrap() % CAP, 0);
    for (key, value) in entries {
        assert!(table.get_value(&txn, &key).unwrap().contains(&value));
    }
}

#[test]
fn test_concurrent_inserts_with_growth() {
    let table = Arc::new(identity_table(1));

    let mut handles = Vec::new();
    for t in 0..4u64 {
        let table = Arc::clone(&table);
        handles.push(std::thread::spawn(move || {
            let txn = Transaction::new(t);
            for i in 0..300u64 {
                let key = t * 10_000 + i;
                assert!(table.insert(&txn, &key, &(key + 1)).unwrap());
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }

    let txn = Transaction::new(99);
    for t in 0..4u64 {
        for i in 0..300u64 {
            let key = t * 10_000 + i;
            assert_eq!(table.get_value(&txn, &key).unwrap(), vec![key + 1]);
        }
    }
}

#[test]
fn test_concurrent_readers_during_inserts() {
    let table = Arc::new(identity_table(2));
    let txn = Transaction::new(0);

    for k in 0..100u64 {
        table.insert(&txn, &k, &k).unwrap();
    }

    let mut handles = Vec::new();

    // Writers extend the key space while readers hammer the stable prefix.
    for t in 0..2u64 {
        let table = Arc::clone(&table);
        handles.push(std::thread::spawn(move || {
            let txn = Transaction::new(t + 1);
            for i in 0..200u64 {
                let key = 1000 + t * 1000 + i;
                table.insert(&txn, &key, &key).unwrap();
            }
        }));
    }
    for _ in 0..2 {
        let table = Arc::clone(&table);
        handles.push(std::thread::spawn(move || {
            let txn = Transaction::new(9);
            for _ in 0..50 {
                for k in 0..100u64 {
                    assert_eq!(table.get_value(&txn, &k).unwrap(), vec![k]);
                }
            }
        }));
    }

    for handle in handles {
        handle.join().unwrap();
    }
}
