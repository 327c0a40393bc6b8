//! Fresh block carving - system regions consumed front to back
//!
//! Design: A partition requests regions from the system allocator and hands
//! out blocks by advancing a cursor through the newest one. Requests double
//! from 64KB up to 4MB so busy partitions touch the system allocator rarely.
//! Freed blocks never come back here; they go to the size-class free lists.

use super::BLOCK_ALIGN;
use crate::logging::debug;
use core::ptr::NonNull;
use std::alloc::{alloc, dealloc, Layout};

const FIRST_REQUEST: usize = 64 * 1024;
const MAX_REQUEST: usize = 4 * 1024 * 1024;

/// One system allocation, released with its partition
struct Region {
    base: NonNull<u8>,
    layout: Layout,
}

impl Region {
    fn acquire(bytes: usize) -> Option<Self> {
        let layout = Layout::from_size_align(bytes, BLOCK_ALIGN).ok()?;
        let base = NonNull::new(unsafe { alloc(layout) })?;
        Some(Self { base, layout })
    }

    #[inline]
    fn start(&self) -> usize {
        self.base.as_ptr() as usize
    }

    #[inline]
    fn end(&self) -> usize {
        self.start() + self.layout.size()
    }
}

impl Drop for Region {
    fn drop(&mut self) {
        unsafe { dealloc(self.base.as_ptr(), self.layout) };
    }
}

pub(crate) struct Carver {
    regions: Vec<Region>,
    cursor: usize,
    limit: usize,
    next_request: usize,
}

// Regions are only touched under the owning partition's lock
unsafe impl Send for Carver {}

impl Carver {
    pub(crate) const fn new() -> Self {
        Self {
            regions: Vec::new(),
            cursor: 0,
            limit: 0,
            next_request: FIRST_REQUEST,
        }
    }

    /// Carve a block of `size` bytes, acquiring a new region when the
    /// current one is exhausted. `None` only if the system refuses memory.
    pub(crate) fn carve(&mut self, size: usize) -> Option<NonNull<u8>> {
        if let Some(ptr) = self.take(size) {
            return Some(ptr);
        }
        self.refill(size)?;
        self.take(size)
    }

    #[inline]
    fn take(&mut self, size: usize) -> Option<NonNull<u8>> {
        let start = align_up(self.cursor, BLOCK_ALIGN);
        let end = start.checked_add(size)?;
        if self.cursor == 0 || end > self.limit {
            return None;
        }
        self.cursor = end;
        NonNull::new(start as *mut u8)
    }

    fn refill(&mut self, size: usize) -> Option<()> {
        let bytes = self.next_request.max((size + BLOCK_ALIGN).next_power_of_two());
        let region = Region::acquire(bytes)?;
        self.cursor = region.start();
        self.limit = region.end();
        self.regions.push(region);
        self.next_request = (self.next_request * 2).min(MAX_REQUEST);
        debug!(region_bytes = bytes, regions = self.regions.len(), "carver acquired a region");
        Some(())
    }

    /// Bytes obtained from the system so far
    pub(crate) fn reserved_bytes(&self) -> usize {
        self.regions.iter().map(|region| region.layout.size()).sum()
    }

    /// Bytes left in the current region
    #[inline]
    pub(crate) fn remaining(&self) -> usize {
        self.limit.saturating_sub(self.cursor)
    }
}

#[inline(always)]
const fn align_up(addr: usize, align: usize) -> usize {
    (addr + align - 1) & !(align - 1)
}
