//! Size-classed partitions
//!
//! Design: One partition per worker thread. Each partition keeps a free list
//! per size class and carves fresh blocks from its own regions. Blocks freed
//! by another thread go back to the partition that carved them.

use super::carve::Carver;
use core::ptr::NonNull;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// Smallest class: 64 bytes
pub(crate) const MIN_CLASS_SHIFT: u32 = 6;
/// Largest class: 64 KiB; bigger blocks bypass the pool
pub(crate) const MAX_CLASS_SHIFT: u32 = 16;
pub(crate) const NUM_CLASSES: usize = (MAX_CLASS_SHIFT - MIN_CLASS_SHIFT + 1) as usize;

/// Size class for a request, or None for large blocks
#[inline]
pub(crate) fn size_class(size: usize) -> Option<usize> {
    if size > 1 << MAX_CLASS_SHIFT {
        return None;
    }
    let rounded = size.max(1 << MIN_CLASS_SHIFT).next_power_of_two();
    Some((rounded.trailing_zeros() - MIN_CLASS_SHIFT) as usize)
}

/// Block size of a class
#[inline]
pub(crate) const fn class_size(class: usize) -> usize {
    1 << (class as u32 + MIN_CLASS_SHIFT)
}

/// Per-thread heap partition
pub(crate) struct Partition {
    id: u32,
    free: [Mutex<Vec<usize>>; NUM_CLASSES],
    carver: Mutex<Carver>,
    in_use: AtomicBool,
    live: AtomicUsize,
}

impl Partition {
    pub(crate) fn new(id: u32) -> Self {
        Self {
            id,
            free: std::array::from_fn(|_| Mutex::new(Vec::new())),
            carver: Mutex::new(Carver::new()),
            in_use: AtomicBool::new(true),
            live: AtomicUsize::new(0),
        }
    }

    #[inline]
    pub(crate) fn id(&self) -> u32 {
        self.id
    }

    /// Claim an abandoned partition for the calling thread
    pub(crate) fn try_adopt(&self) -> bool {
        self.in_use
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Release on thread exit; remote frees keep arriving afterwards
    pub(crate) fn abandon(&self) {
        self.in_use.store(false, Ordering::Release);
    }

    /// Take a block of the given class: free list first, then fresh carving
    pub(crate) fn allocate(&self, class: usize) -> Option<NonNull<u8>> {
        if let Some(addr) = self.free[class].lock().pop() {
            self.live.fetch_add(1, Ordering::Relaxed);
            return NonNull::new(addr as *mut u8);
        }

        let ptr = self.carver.lock().carve(class_size(class))?;
        self.live.fetch_add(1, Ordering::Relaxed);
        Some(ptr)
    }

    /// Return a block to its class free list
    pub(crate) fn deallocate(&self, ptr: NonNull<u8>, class: usize) {
        self.free[class].lock().push(ptr.as_ptr() as usize);
        self.live.fetch_sub(1, Ordering::Relaxed);
    }

    pub(crate) fn reserved_bytes(&self) -> usize {
        self.carver.lock().reserved_bytes()
    }

    pub(crate) fn live_blocks(&self) -> usize {
        self.live.load(Ordering::Relaxed)
    }
}
