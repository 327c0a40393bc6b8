//! Memory allocator - size-classed pools partitioned per thread
//!
//! Design: Three-layer architecture:
//! 1. Free lists per size class (fast path, reuse)
//! 2. Carving from the partition's current region (fresh blocks)
//! 3. System allocator (new regions and large blocks)
//!
//! Each thread bootstraps its own partition through `heap()`. Every block
//! remembers its owning partition so a free from any thread returns the
//! memory to the right pool.

mod carve;
mod pool;

#[cfg(test)]
mod tests;

use crate::logging::{debug, log_allocation, log_deallocation};
use core::ptr::NonNull;
use dashmap::DashMap;
use once_cell::sync::Lazy;
use pool::Partition;
use std::alloc::{handle_alloc_error, Layout};
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;

/// Alignment of every block handed out
pub const BLOCK_ALIGN: usize = 64;

/// Partition id used when a thread has no heap (e.g. during thread teardown)
pub const SHARED_PARTITION: u32 = 0;

/// Fallback partition for threads without a heap
static SHARED: Lazy<Arc<Partition>> = Lazy::new(|| Arc::new(Partition::new(SHARED_PARTITION)));

/// All partitions by id
static PARTITIONS: Lazy<DashMap<u32, Arc<Partition>>> = Lazy::new(|| {
    let partitions = DashMap::new();
    partitions.insert(SHARED_PARTITION, Arc::clone(&SHARED));
    partitions
});

static NEXT_PARTITION: AtomicU32 = AtomicU32::new(SHARED_PARTITION + 1);
static LARGE_BLOCKS: AtomicUsize = AtomicUsize::new(0);

/// Thread-local claim on a partition
struct Heap {
    partition: Arc<Partition>,
}

impl Heap {
    fn bootstrap() -> Self {
        let adopted = PARTITIONS
            .iter()
            .filter(|entry| *entry.key() != SHARED_PARTITION)
            .find(|entry| entry.value().try_adopt())
            .map(|entry| Arc::clone(entry.value()));

        let partition = adopted.unwrap_or_else(|| {
            let id = NEXT_PARTITION.fetch_add(1, Ordering::Relaxed);
            let partition = Arc::new(Partition::new(id));
            PARTITIONS.insert(id, Arc::clone(&partition));
            partition
        });

        debug!(partition = partition.id(), "heap bootstrapped for thread");
        Self { partition }
    }
}

impl Drop for Heap {
    fn drop(&mut self) {
        self.partition.abandon();
    }
}

thread_local! {
    static HEAP: Heap = Heap::bootstrap();
}

/// Initialize allocator subsystem for the calling thread
pub fn init() {
    Lazy::force(&PARTITIONS);
    heap();
}

/// Partition id of the calling thread, bootstrapping it on first use
#[inline]
pub fn heap() -> u32 {
    HEAP.try_with(|heap| heap.partition.id())
        .unwrap_or(SHARED_PARTITION)
}

fn partition(id: u32) -> Arc<Partition> {
    match PARTITIONS.get(&id) {
        Some(entry) => Arc::clone(entry.value()),
        None => Arc::clone(&SHARED),
    }
}

#[inline]
fn large_layout(size: usize) -> Layout {
    match Layout::from_size_align(size, BLOCK_ALIGN) {
        Ok(layout) => layout,
        Err(_) => handle_alloc_error(Layout::new::<u8>()),
    }
}

/// Allocate a block of at least `size` bytes from the calling thread's partition.
///
/// Exhaustion is fatal.
pub fn allocate(size: usize) -> NonNull<u8> {
    let ptr = match pool::size_class(size) {
        Some(class) => {
            let ptr = HEAP
                .try_with(|heap| heap.partition.allocate(class))
                .unwrap_or_else(|_| SHARED.allocate(class));
            match ptr {
                Some(ptr) => ptr,
                None => handle_alloc_error(large_layout(pool::class_size(class))),
            }
        }
        None => {
            let layout = large_layout(size);
            let raw = unsafe { std::alloc::alloc(layout) };
            match NonNull::new(raw) {
                Some(ptr) => {
                    LARGE_BLOCKS.fetch_add(1, Ordering::Relaxed);
                    ptr
                }
                None => handle_alloc_error(layout),
            }
        }
    };
    log_allocation(size, ptr.as_ptr());
    ptr
}

/// Return a block to the partition that owns it.
///
/// # Safety
/// `ptr` must come from `allocate(size)` and not be freed twice.
pub unsafe fn deallocate(ptr: NonNull<u8>, size: usize, owner: u32) {
    log_deallocation(ptr.as_ptr(), owner);
    match pool::size_class(size) {
        Some(class) => partition(owner).deallocate(ptr, class),
        None => {
            LARGE_BLOCKS.fetch_sub(1, Ordering::Relaxed);
            std::alloc::dealloc(ptr.as_ptr(), large_layout(size));
        }
    }
}

/// Get allocator statistics
pub fn stats() -> AllocatorStats {
    let mut stats = AllocatorStats {
        partitions: 0,
        reserved_bytes: 0,
        live_blocks: LARGE_BLOCKS.load(Ordering::Relaxed),
    };
    for entry in PARTITIONS.iter() {
        stats.partitions += 1;
        stats.reserved_bytes += entry.value().reserved_bytes();
        stats.live_blocks += entry.value().live_blocks();
    }
    stats
}

/// Allocator statistics for monitoring and debugging
#[derive(Debug, Clone, Copy)]
pub struct AllocatorStats {
    pub partitions: usize,
    pub reserved_bytes: usize,
    pub live_blocks: usize,
}
