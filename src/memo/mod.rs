//! Memo - thread-safe map from original objects to their clones
//!
//! Design: Open addressing over two parallel arrays of atomic words, keyed
//! by object address. Lookups and insertions run under a shared lock and
//! claim slots with compare-exchange; only a resize takes the table
//! exclusively.
//! - Hash: address shifted past block alignment, masked to the power-of-two
//!   capacity; linear probing
//! - Crowded at three quarters occupancy; resize doubles and drops keys that
//!   are no longer reachable
//! - Keys hold a memo-key count, values a memo-value count
//! - A frozen flag remembers that every value is frozen, so repeated
//!   freezes skip the walk until the next insertion

#[cfg(test)]
mod tests;

use crate::logging::{log_memo_resize, perf};
use crate::object::ObjectHeader;
use core::ptr::NonNull;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// Block alignment is 64 bytes, so the low six address bits carry nothing
const HASH_SHIFT: u32 = 6;

/// Smallest table allocated on first insertion
pub const MIN_CAPACITY: usize = 8;

struct Table {
    keys: Box<[AtomicUsize]>,
    values: Box<[AtomicUsize]>,
    /// Slots reserved by insertions, including ones still being written
    occupied: AtomicUsize,
}

impl Table {
    fn with_capacity(capacity: usize) -> Self {
        let capacity = if capacity == 0 { 0 } else { capacity.next_power_of_two() };
        Self {
            keys: (0..capacity).map(|_| AtomicUsize::new(0)).collect(),
            values: (0..capacity).map(|_| AtomicUsize::new(0)).collect(),
            occupied: AtomicUsize::new(0),
        }
    }

    #[inline]
    fn capacity(&self) -> usize {
        self.keys.len()
    }

    #[inline]
    fn hash(&self, key: usize) -> usize {
        (key >> HASH_SHIFT) & (self.capacity() - 1)
    }

    #[inline]
    fn crowded(&self, occupied: usize) -> bool {
        occupied * 4 > self.capacity() * 3
    }

    /// Wait for a concurrent insertion to publish its value
    #[inline]
    fn value_at(&self, slot: usize) -> usize {
        loop {
            let value = self.values[slot].load(Ordering::Acquire);
            if value != 0 {
                return value;
            }
            core::hint::spin_loop();
        }
    }

    fn get(&self, key: usize) -> Option<usize> {
        if self.capacity() == 0 {
            return None;
        }
        let mask = self.capacity() - 1;
        let mut slot = self.hash(key);
        loop {
            match self.keys[slot].load(Ordering::Acquire) {
                0 => return None,
                k if k == key => return Some(self.value_at(slot)),
                _ => slot = (slot + 1) & mask,
            }
        }
    }

    /// Insert unless present. `None` means the table is too crowded.
    fn try_put(&self, key: usize, value: usize) -> Option<usize> {
        if self.capacity() == 0 {
            return None;
        }
        let reserved = self.occupied.fetch_add(1, Ordering::AcqRel) + 1;
        if self.crowded(reserved) {
            self.occupied.fetch_sub(1, Ordering::AcqRel);
            return None;
        }

        let mask = self.capacity() - 1;
        let mut slot = self.hash(key);
        loop {
            match self.keys[slot].compare_exchange(0, key, Ordering::AcqRel, Ordering::Acquire) {
                Ok(_) => {
                    unsafe {
                        header(key).inc_memo_key();
                        header(value).inc_memo_value();
                    }
                    self.values[slot].store(value, Ordering::Release);
                    return Some(value);
                }
                Err(k) if k == key => {
                    self.occupied.fetch_sub(1, Ordering::AcqRel);
                    return Some(self.value_at(slot));
                }
                Err(_) => slot = (slot + 1) & mask,
            }
        }
    }

    /// Published entries
    fn entries(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        (0..self.capacity()).filter_map(move |slot| {
            let key = self.keys[slot].load(Ordering::Acquire);
            (key != 0).then(|| (key, self.value_at(slot)))
        })
    }
}

#[inline]
unsafe fn header<'a>(addr: usize) -> &'a ObjectHeader {
    &*(addr as *const ObjectHeader)
}

/// Entries are released only after the table lock is dropped, since
/// releases can cascade into destruction.
fn release_entries(entries: Vec<(usize, usize)>) {
    for (key, value) in entries {
        unsafe {
            header(value).dec_memo_value();
            header(key).dec_memo_key();
        }
    }
}

pub struct Memo {
    table: RwLock<Table>,
    /// Every value frozen since the last insertion
    frozen: AtomicBool,
}

impl Memo {
    /// Empty memo sized from the runtime configuration
    pub fn new() -> Self {
        Self::with_capacity(crate::config::get().memo.initial_capacity)
    }

    /// No storage is allocated until the first insertion when `capacity` is zero.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            table: RwLock::new(Table::with_capacity(capacity)),
            frozen: AtomicBool::new(false),
        }
    }

    /// Clone recorded for `key`, if any. The value carries no new count.
    pub fn get(&self, key: NonNull<ObjectHeader>) -> Option<NonNull<ObjectHeader>> {
        let table = self.table.read_recursive();
        table
            .get(key.as_ptr() as usize)
            .and_then(|value| NonNull::new(value as *mut ObjectHeader))
    }

    /// Record `key -> value` unless `key` is present. Returns the value now
    /// mapped, which is the earlier one when another insertion won.
    pub fn put(&self, key: NonNull<ObjectHeader>, value: NonNull<ObjectHeader>) -> NonNull<ObjectHeader> {
        let (key, value) = (key.as_ptr() as usize, value.as_ptr() as usize);
        loop {
            {
                let table = self.table.read_recursive();
                if let Some(winner) = table.try_put(key, value) {
                    if winner == value {
                        self.frozen.store(false, Ordering::Release);
                    }
                    return unsafe { NonNull::new_unchecked(winner as *mut ObjectHeader) };
                }
            }
            self.grow();
        }
    }

    /// Double the table, dropping entries whose key is no longer reachable.
    fn grow(&self) {
        let _timer = perf::track("memo_grow");
        let mut dropped = Vec::new();
        {
            let mut table = self.table.write();
            let occupied = table.occupied.load(Ordering::Acquire);
            if table.capacity() > 0 && !table.crowded(occupied + 1) {
                return;
            }

            let old_capacity = table.capacity();
            let capacity = (old_capacity * 2).max(MIN_CAPACITY);
            let next = Table::with_capacity(capacity);
            let mut kept = 0;
            for (key, value) in table.entries() {
                if unsafe { header(key).is_reachable() } {
                    next.insert_unique(key, value);
                    kept += 1;
                } else {
                    dropped.push((key, value));
                }
            }
            next.occupied.store(kept, Ordering::Release);
            *table = next;
            log_memo_resize(old_capacity, capacity, dropped.len());
        }
        release_entries(dropped);
    }

    /// Take over the reachable entries of `other`. Used when a label is
    /// forked so the child starts with every resolution of its parent.
    pub fn copy_from(&self, other: &Memo) {
        let entries: Vec<(usize, usize)> = {
            let table = other.table.read_recursive();
            table
                .entries()
                .filter(|&(key, _)| unsafe { header(key).is_reachable() })
                .collect()
        };
        for (key, value) in entries {
            unsafe {
                self.put(
                    NonNull::new_unchecked(key as *mut ObjectHeader),
                    NonNull::new_unchecked(value as *mut ObjectHeader),
                );
            }
        }
    }

    /// Freeze every value. Callers hold `object::freeze_lock()`.
    ///
    /// The flag is raised before the walk: an insertion racing the walk
    /// clears it again, so the next freeze revisits the table.
    pub fn freeze(&self) {
        if self.frozen.swap(true, Ordering::AcqRel) {
            return;
        }
        let table = self.table.read_recursive();
        for (_, value) in table.entries() {
            unsafe { header(value).freeze() };
        }
    }

    /// Whether every value is known to be frozen
    #[inline]
    pub fn is_frozen(&self) -> bool {
        self.frozen.load(Ordering::Acquire)
    }

    /// Forget that every value is frozen, after one was thawed for reuse
    #[inline]
    pub(crate) fn mark_thawed(&self) {
        self.frozen.store(false, Ordering::Release);
    }

    pub fn len(&self) -> usize {
        self.table.read_recursive().entries().count()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.table.read_recursive().capacity()
    }
}

impl Table {
    /// Insert into a private table; counts move with the entry.
    fn insert_unique(&self, key: usize, value: usize) {
        let mask = self.capacity() - 1;
        let mut slot = self.hash(key);
        while self.keys[slot].load(Ordering::Relaxed) != 0 {
            slot = (slot + 1) & mask;
        }
        self.keys[slot].store(key, Ordering::Relaxed);
        self.values[slot].store(value, Ordering::Relaxed);
    }
}

impl Default for Memo {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for Memo {
    fn clone(&self) -> Self {
        let capacity = self.capacity();
        let memo = Self::with_capacity(capacity);
        memo.copy_from(self);
        // The copied values are a subset of this memo's
        memo.frozen.store(self.is_frozen(), Ordering::Release);
        memo
    }
}

impl Drop for Memo {
    fn drop(&mut self) {
        let table = self.table.get_mut();
        let entries: Vec<_> = table.entries().collect();
        release_entries(entries);
    }
}

impl core::fmt::Debug for Memo {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Memo")
            .field("len", &self.len())
            .field("capacity", &self.capacity())
            .finish()
    }
}
