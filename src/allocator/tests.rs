//! Tests for the partitioned allocator

use super::*;
use std::collections::HashSet;
use std::thread;

#[test]
fn test_size_classes() {
    assert_eq!(pool::size_class(1), Some(0));
    assert_eq!(pool::size_class(64), Some(0));
    assert_eq!(pool::size_class(65), Some(1));
    assert_eq!(pool::size_class(1 << 16), Some(pool::NUM_CLASSES - 1));
    assert_eq!(pool::size_class((1 << 16) + 1), None);
    assert_eq!(pool::class_size(0), 64);
    assert_eq!(pool::class_size(pool::NUM_CLASSES - 1), 1 << 16);
}

#[test]
fn test_allocate_alignment_and_reuse() {
    let a = allocate(100);
    assert_eq!(a.as_ptr() as usize % BLOCK_ALIGN, 0);
    let owner = heap();
    unsafe { deallocate(a, 100, owner) };

    // Same class comes back from the free list
    let b = allocate(120);
    assert_eq!(a, b);
    unsafe { deallocate(b, 120, owner) };
}

#[test]
fn test_distinct_live_blocks() {
    let owner = heap();
    let blocks: Vec<_> = (0..256).map(|_| allocate(64)).collect();
    let unique: HashSet<usize> = blocks.iter().map(|p| p.as_ptr() as usize).collect();
    assert_eq!(unique.len(), blocks.len());
    for block in blocks {
        unsafe { deallocate(block, 64, owner) };
    }
}

#[test]
fn test_large_blocks_bypass_pool() {
    let size = (1 << 16) + 1;
    let block = allocate(size);
    assert_eq!(block.as_ptr() as usize % BLOCK_ALIGN, 0);
    unsafe {
        block.as_ptr().write_bytes(0xAB, size);
        deallocate(block, size, heap());
    }
}

#[test]
fn test_partition_per_thread() {
    let main = heap();
    let other = thread::spawn(heap).join().unwrap();
    assert_ne!(main, SHARED_PARTITION);
    assert_ne!(other, SHARED_PARTITION);
    assert_ne!(main, other);
}

#[test]
fn test_remote_free_returns_to_owner() {
    use std::sync::mpsc;

    let (block_tx, block_rx) = mpsc::channel();
    let (freed_tx, freed_rx) = mpsc::channel::<()>();
    let owner_thread = thread::spawn(move || {
        let block = allocate(256);
        block_tx.send((block.as_ptr() as usize, heap())).unwrap();
        freed_rx.recv().unwrap();
        // The remote free landed on this partition's free list
        let reused = allocate(256);
        let same = reused.as_ptr() as usize == block.as_ptr() as usize;
        unsafe { deallocate(reused, 256, heap()) };
        same
    });

    let (addr, owner) = block_rx.recv().unwrap();
    assert_ne!(owner, heap());
    let block = NonNull::new(addr as *mut u8).unwrap();
    unsafe { deallocate(block, 256, owner) };
    freed_tx.send(()).unwrap();

    assert!(owner_thread.join().unwrap());
}

#[test]
fn test_stats_report_partitions() {
    init();
    let stats = stats();
    assert!(stats.partitions >= 2);
    assert!(stats.reserved_bytes > 0 || stats.live_blocks == 0);
}
