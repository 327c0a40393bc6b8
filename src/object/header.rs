//! Object header - counters, flags and lifecycle of every heap object
//!
//! Design: The header sits at offset zero of every block, composed in front of
//! the payload rather than inherited. Four counters form a chain of
//! self-references so that teardown runs strictly in the order
//! shared -> memo-value -> weak -> memo-key:
//! - shared: owning handles
//! - memo-value: 1 while shared-reachable, plus one per memo holding it as a value
//! - weak: 1 while memo-value-reachable, plus one per weak handle
//! - memo-key: 1 while weak-reachable, plus one per memo holding it as a key
//!
//! Reaching zero on memo-value finalizes and destroys the payload; reaching
//! zero on memo-key returns the block to its allocator partition.

use crate::allocator;
use crate::gc;
use crate::logging::trace;
use crate::visit::visitors::{Discarder, Restorer};
use crate::visit::Visitor;
use core::any::TypeId;
use core::ptr::NonNull;
use std::sync::atomic::{fence, AtomicPtr, AtomicU32, Ordering};

/// Flag bits stored in `ObjectHeader::flags`
pub(crate) mod flags {
    pub const FROZEN: u32 = 1 << 0;
    pub const SINGLE: u32 = 1 << 1;
    pub const FINISHED: u32 = 1 << 2;
    pub const DISCARDED: u32 = 1 << 3;
    pub const FINALIZED: u32 = 1 << 4;
    pub const DESTROYED: u32 = 1 << 5;
    pub const LOCKED: u32 = 1 << 6;
    pub const BUFFERED: u32 = 1 << 7;
    pub const COLOR_SHIFT: u32 = 8;
    pub const COLOR_MASK: u32 = 0b11 << COLOR_SHIFT;
}

/// Type metadata - immutable per-type dispatch table
///
/// One table exists per object type; every erased operation on an object
/// goes through it.
pub struct TypeInfo {
    /// Block size in bytes (header included)
    pub size: usize,
    /// Block alignment
    pub align: usize,
    /// Opt out of cycle candidate buffering
    pub acyclic: bool,
    pub name: unsafe fn(NonNull<ObjectHeader>) -> &'static str,
    /// Payload type, for checked casts from erased headers
    pub type_id: fn() -> TypeId,
    /// Shallow duplicate into a fresh block labelled with the given label
    pub copy: unsafe fn(NonNull<ObjectHeader>, *mut ObjectHeader) -> NonNull<ObjectHeader>,
    /// Visit every member of the payload
    pub accept: unsafe fn(NonNull<ObjectHeader>, &mut dyn Visitor),
    pub finalize: unsafe fn(NonNull<ObjectHeader>),
    pub drop: unsafe fn(NonNull<ObjectHeader>),
}

/// Object header - prefixed before every payload
#[repr(C, align(8))]
pub struct ObjectHeader {
    info: &'static TypeInfo,
    shared: AtomicU32,
    memo_value: AtomicU32,
    weak: AtomicU32,
    memo_key: AtomicU32,
    flags: AtomicU32,
    /// Allocator partition that owns the block
    owner: u32,
    /// Label the object belongs to (held while shared-reachable)
    label: AtomicPtr<ObjectHeader>,
}

/// Cycle collector colours
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Color {
    Black,
    Gray,
    White,
}

impl ObjectHeader {
    /// Create header for a new object
    #[inline]
    pub(crate) const fn new(info: &'static TypeInfo, owner: u32, label: *mut ObjectHeader) -> Self {
        Self {
            info,
            shared: AtomicU32::new(0),
            memo_value: AtomicU32::new(0),
            weak: AtomicU32::new(1),
            memo_key: AtomicU32::new(1),
            flags: AtomicU32::new(0),
            owner,
            label: AtomicPtr::new(label),
        }
    }

    #[inline]
    pub fn type_info(&self) -> &'static TypeInfo {
        self.info
    }

    #[inline]
    pub(crate) fn as_ptr(&self) -> NonNull<ObjectHeader> {
        NonNull::from(self)
    }

    /// Class name of the payload
    pub fn class_name(&self) -> &'static str {
        unsafe { (self.info.name)(self.as_ptr()) }
    }

    /// Whether the payload is a `T`
    #[inline]
    pub fn is<T: 'static>(&self) -> bool {
        (self.info.type_id)() == TypeId::of::<T>()
    }

    /// Allocator partition owning this block
    #[inline]
    pub fn owner(&self) -> u32 {
        self.owner
    }

    // ===== Counter queries =====

    #[inline]
    pub fn shared_count(&self) -> u32 {
        self.shared.load(Ordering::Acquire)
    }

    #[inline]
    pub fn memo_value_count(&self) -> u32 {
        self.memo_value.load(Ordering::Acquire)
    }

    #[inline]
    pub fn weak_count(&self) -> u32 {
        self.weak.load(Ordering::Acquire)
    }

    #[inline]
    pub fn memo_key_count(&self) -> u32 {
        self.memo_key.load(Ordering::Acquire)
    }

    /// Reachable means weak-reachable; a block known only as a memo key is not.
    #[inline]
    pub fn is_reachable(&self) -> bool {
        self.weak_count() > 0
    }

    /// Conservative single-owner test
    #[inline]
    pub fn is_unique(&self) -> bool {
        self.shared_count() <= 1 && self.memo_value_count() <= 1 && self.weak_count() <= 1
    }

    // ===== Shared =====

    #[inline]
    pub fn inc_shared(&self) {
        let old = self.shared.fetch_add(1, Ordering::Relaxed);
        debug_assert!(!self.is_destroyed(), "shared reference to destroyed object");
        if old == 0 {
            self.inc_memo_value();
            self.hold_label();
            self.restore();
        }
    }

    #[inline]
    pub fn dec_shared(&self) {
        let old = self.shared.fetch_sub(1, Ordering::Release);
        debug_assert!(old > 0, "shared count underflow");
        if old == 1 {
            fence(Ordering::Acquire);
            self.discard();
            self.release_label();
            self.dec_memo_value();
        } else if !self.info.acyclic {
            gc::register_candidate(self);
        }
    }

    /// Acquire a shared reference only while the payload is still alive.
    ///
    /// Pins memo-value first so the object cannot be destroyed between the
    /// check and the increment.
    pub fn try_inc_shared(&self) -> bool {
        let mut count = self.memo_value.load(Ordering::Acquire);
        loop {
            if count == 0 {
                return false;
            }
            match self.memo_value.compare_exchange_weak(
                count,
                count + 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => break,
                Err(actual) => count = actual,
            }
        }
        self.inc_shared();
        self.dec_memo_value();
        true
    }

    // ===== Memo value =====

    #[inline]
    pub fn inc_memo_value(&self) {
        self.memo_value.fetch_add(1, Ordering::Relaxed);
    }

    pub fn dec_memo_value(&self) {
        let old = self.memo_value.fetch_sub(1, Ordering::Release);
        debug_assert!(old > 0, "memo value count underflow");
        if old == 1 {
            fence(Ordering::Acquire);
            if self.flags.fetch_or(flags::FINALIZED, Ordering::AcqRel) & flags::FINALIZED == 0 {
                unsafe { (self.info.finalize)(self.as_ptr()) };
            }
            // Resurrected by the finalizer
            if self.memo_value.load(Ordering::Acquire) == 0 {
                unsafe { self.destroy() };
                self.dec_weak();
            }
        }
    }

    // ===== Weak =====

    #[inline]
    pub fn inc_weak(&self) {
        self.weak.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn dec_weak(&self) {
        let old = self.weak.fetch_sub(1, Ordering::Release);
        debug_assert!(old > 0, "weak count underflow");
        if old == 1 {
            fence(Ordering::Acquire);
            self.dec_memo_key();
        }
    }

    // ===== Memo key =====

    #[inline]
    pub fn inc_memo_key(&self) {
        self.memo_key.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn dec_memo_key(&self) {
        let old = self.memo_key.fetch_sub(1, Ordering::Release);
        debug_assert!(old > 0, "memo key count underflow");
        if old == 1 {
            fence(Ordering::Acquire);
            unsafe { self.deallocate() };
        }
    }

    // ===== Freeze protocol =====

    #[inline]
    pub fn is_frozen(&self) -> bool {
        self.flags.load(Ordering::Acquire) & flags::FROZEN != 0
    }

    /// Whether the object was uniquely referenced when it was frozen
    #[inline]
    pub fn is_single(&self) -> bool {
        self.flags.load(Ordering::Acquire) & flags::SINGLE != 0
    }

    #[inline]
    pub fn is_finished(&self) -> bool {
        self.flags.load(Ordering::Acquire) & flags::FINISHED != 0
    }

    #[inline]
    pub fn is_destroyed(&self) -> bool {
        self.flags.load(Ordering::Acquire) & flags::DESTROYED != 0
    }

    /// Set the frozen flag, recording `single` at the same instant.
    ///
    /// Returns whether the object was already frozen.
    pub(crate) fn mark_frozen(&self) -> bool {
        let mut current = self.flags.load(Ordering::Acquire);
        loop {
            if current & flags::FROZEN != 0 {
                return true;
            }
            let single = if self.is_unique() { flags::SINGLE } else { 0 };
            match self.flags.compare_exchange_weak(
                current,
                current | flags::FROZEN | single,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return false,
                Err(actual) => current = actual,
            }
        }
    }

    /// Freeze this object and, through the Freezer, everything reachable
    /// from it that is not frozen yet.
    ///
    /// Callers hold `object::freeze_lock()`. Returns whether the object was
    /// already frozen.
    pub fn freeze(&self) -> bool {
        let already = self.mark_frozen();
        if !already {
            crate::logging::log_freeze(self.class_name(), self.is_single());
            let mut freezer = crate::visit::visitors::Freezer;
            self.accept(&mut freezer);
        }
        already
    }

    /// Reset frozen/single/finished for reuse of a uniquely referenced block
    pub fn thaw(&self) {
        self.flags.fetch_and(
            !(flags::FROZEN | flags::SINGLE | flags::FINISHED),
            Ordering::AcqRel,
        );
    }

    /// Force every pending lazy clone reachable from this object.
    pub fn finish(&self) {
        if self.flags.fetch_or(flags::FINISHED, Ordering::AcqRel) & flags::FINISHED == 0 {
            let mut finisher = crate::visit::visitors::Finisher;
            self.accept(&mut finisher);
        }
    }

    /// Run a visitor over the members of the payload
    #[inline]
    pub fn accept(&self, visitor: &mut dyn Visitor) {
        unsafe { (self.info.accept)(self.as_ptr(), visitor) }
    }

    // ===== Label =====

    #[inline]
    pub(crate) fn label(&self) -> *mut ObjectHeader {
        self.label.load(Ordering::Acquire)
    }

    fn hold_label(&self) {
        if let Some(label) = NonNull::new(self.label()) {
            unsafe { label.as_ref().inc_shared() };
        }
    }

    fn release_label(&self) {
        if let Some(label) = NonNull::new(self.label()) {
            unsafe { label.as_ref().dec_shared() };
        }
    }

    /// Move the object into another label, transferring the hold.
    pub(crate) fn relabel(&self, label: *mut ObjectHeader) {
        let held = self.shared_count() > 0;
        if held {
            if let Some(new) = NonNull::new(label) {
                unsafe { new.as_ref().inc_shared() };
            }
        }
        let old = self.label.swap(label, Ordering::AcqRel);
        if held {
            if let Some(old) = NonNull::new(old) {
                unsafe { old.as_ref().dec_shared() };
            }
        }
    }

    // ===== Discard / restore =====

    fn lock(&self) {
        while self.flags.fetch_or(flags::LOCKED, Ordering::Acquire) & flags::LOCKED != 0 {
            core::hint::spin_loop();
        }
    }

    fn unlock(&self) {
        self.flags.fetch_and(!flags::LOCKED, Ordering::Release);
    }

    /// Trade the members' shared references for memo-value references once
    /// the object is held only by memos.
    fn discard(&self) {
        if self.memo_value_count() <= 1 {
            return;
        }
        self.lock();
        let current = self.flags.load(Ordering::Acquire);
        if self.shared_count() == 0
            && current & (flags::DISCARDED | flags::DESTROYED) == 0
        {
            self.accept(&mut Discarder);
            self.flags.fetch_or(flags::DISCARDED, Ordering::AcqRel);
        }
        self.unlock();
    }

    /// Undo a discard
    fn restore(&self) {
        if self.flags.load(Ordering::Acquire) & flags::DISCARDED == 0 {
            return;
        }
        self.lock();
        if self.flags.load(Ordering::Acquire) & flags::DISCARDED != 0 {
            self.accept(&mut Restorer);
            self.flags.fetch_and(!flags::DISCARDED, Ordering::AcqRel);
        }
        self.unlock();
    }

    // ===== Teardown =====

    /// Drop the payload. Members hold their shared references again first.
    unsafe fn destroy(&self) {
        debug_assert_eq!(self.shared_count(), 0, "destroying a shared object");
        self.restore();
        self.flags.fetch_or(flags::DESTROYED, Ordering::AcqRel);
        trace!(event = "object_destroy", class = self.class_name(), address = ?self as *const Self);
        (self.info.drop)(self.as_ptr());
    }

    /// Return the block to its owning partition
    unsafe fn deallocate(&self) {
        debug_assert!(self.is_destroyed(), "deallocating a live object");
        let size = self.info.size;
        let owner = self.owner;
        allocator::deallocate(self.as_ptr().cast(), size, owner);
    }

    // ===== Cycle collection state =====

    #[inline]
    pub(crate) fn color(&self) -> Color {
        match (self.flags.load(Ordering::Acquire) & flags::COLOR_MASK) >> flags::COLOR_SHIFT {
            1 => Color::Gray,
            2 => Color::White,
            _ => Color::Black,
        }
    }

    #[inline]
    pub(crate) fn set_color(&self, color: Color) {
        let bits = match color {
            Color::Black => 0,
            Color::Gray => 1,
            Color::White => 2,
        } << flags::COLOR_SHIFT;
        let mut current = self.flags.load(Ordering::Acquire);
        loop {
            let next = (current & !flags::COLOR_MASK) | bits;
            match self.flags.compare_exchange_weak(current, next, Ordering::AcqRel, Ordering::Acquire) {
                Ok(_) => return,
                Err(actual) => current = actual,
            }
        }
    }

    /// Set the buffered flag; returns false if it was already set
    #[inline]
    pub(crate) fn try_buffer(&self) -> bool {
        self.flags.fetch_or(flags::BUFFERED, Ordering::AcqRel) & flags::BUFFERED == 0
    }

    #[inline]
    pub(crate) fn clear_buffered(&self) {
        self.flags.fetch_and(!flags::BUFFERED, Ordering::AcqRel);
    }

    /// Trial deletion: adjust the shared count without any transition
    #[inline]
    pub(crate) fn trial_dec(&self) {
        let old = self.shared.fetch_sub(1, Ordering::AcqRel);
        debug_assert!(old > 0, "trial deletion underflow");
    }

    #[inline]
    pub(crate) fn trial_inc(&self) {
        self.shared.fetch_add(1, Ordering::AcqRel);
    }

    /// Finish off an object whose shared count was consumed by trial deletion
    pub(crate) fn collect_garbage(&self) {
        debug_assert_eq!(self.shared_count(), 0, "collecting a reachable object");
        self.set_color(Color::Black);
        self.release_label();
        self.dec_memo_value();
    }
}

// Safety: all mutable state is atomic
unsafe impl Send for ObjectHeader {}
unsafe impl Sync for ObjectHeader {}
