//! Label - the bookkeeping of one clone branch
//!
//! Design: A label owns the memo mapping originals to their clones in its
//! branch, guarded by a reader/writer lock:
//! - get (write lock): an unfrozen object is its own resolution; otherwise
//!   walk the memo chain; a still-frozen result is recycled when uniquely
//!   referenced, otherwise copied and memoized
//! - pull (read lock): the same walk, never copies
//! - fork: child label seeded with a copy of the (frozen) memo
//!
//! Labels are objects themselves. A forked label holds its parent, so the
//! label of any object found in a memo outlives the memo entry.
//!
//! Lock order: freeze lock, then label lock, then memo table lock. A thread
//! holding a label's write lock never takes another label lock.

pub mod context;


use crate::logging::{log_copy, log_fork, log_recycle};
use crate::memo::Memo;
use crate::object::{self, Object, ObjectHeader};
use crate::ptr::Shared;
use crate::visit::visitors::{Copier, Recycler};
use crate::visit::Traversable;
use core::ptr::NonNull;
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};

pub struct Label {
    memo: Memo,
    lock: RwLock<()>,
    parent: Option<Shared<Label>>,
}

impl Label {
    pub(crate) fn new(parent: Option<Shared<Label>>) -> Self {
        Self {
            memo: Memo::new(),
            lock: RwLock::new(()),
            parent,
        }
    }

    /// Allocate a label outside of any context
    pub(crate) fn create(label: Label) -> Shared<Label> {
        let header = object::allocate(label, core::ptr::null_mut());
        unsafe { Shared::from_header_acquire(header) }
    }

    #[inline]
    pub fn memo(&self) -> &Memo {
        &self.memo
    }

    #[inline]
    pub fn parent(&self) -> Option<&Shared<Label>> {
        self.parent.as_ref()
    }

    #[inline]
    fn header(&self) -> NonNull<ObjectHeader> {
        unsafe { object::header_of(self) }
    }

    /// Follow the memo chain from `object` while results are still frozen.
    ///
    /// A frozen result with no further mapping is the answer itself.
    fn walk(&self, object: NonNull<ObjectHeader>) -> NonNull<ObjectHeader> {
        let mut prev = object;
        let mut next = self.memo.get(object);
        while let Some(found) = next {
            prev = found;
            if !unsafe { found.as_ref() }.is_frozen() {
                break;
            }
            next = self.memo.get(found);
        }
        prev
    }

    /// Resolve `object` for write in this branch. The result carries one
    /// new shared reference; an unfrozen object is returned unchanged.
    pub fn get(&self, object: NonNull<ObjectHeader>) -> NonNull<ObjectHeader> {
        let _guard = self.lock.write();
        self.get_locked(object)
    }

    /// Resolve `object` for read. The result carries one new shared
    /// reference and may still be frozen.
    pub fn pull(&self, object: NonNull<ObjectHeader>) -> NonNull<ObjectHeader> {
        let _guard = self.lock.read();
        self.pull_locked(object)
    }

    /// Exclusive access for a write resolution spanning a cached pointer
    #[inline]
    pub(crate) fn write_guard(&self) -> RwLockWriteGuard<'_, ()> {
        self.lock.write()
    }

    #[inline]
    pub(crate) fn read_guard(&self) -> RwLockReadGuard<'_, ()> {
        self.lock.read()
    }

    /// `get` for callers holding `write_guard()`
    pub(crate) fn get_locked(&self, object: NonNull<ObjectHeader>) -> NonNull<ObjectHeader> {
        if !unsafe { object.as_ref() }.is_frozen() {
            unsafe { object.as_ref() }.inc_shared();
            return object;
        }
        let found = self.walk(object);
        let header = unsafe { found.as_ref() };
        if !header.is_frozen() {
            header.inc_shared();
            return found;
        }
        if header.is_unique() {
            self.recycle(header);
            header.inc_shared();
            found
        } else {
            self.copy(found)
        }
    }

    /// `pull` for callers holding `read_guard()` or `write_guard()`
    pub(crate) fn pull_locked(&self, object: NonNull<ObjectHeader>) -> NonNull<ObjectHeader> {
        let header = unsafe { object.as_ref() };
        let found = if header.is_frozen() { self.walk(object) } else { object };
        unsafe { found.as_ref() }.inc_shared();
        found
    }

    /// Reuse a uniquely referenced frozen object in place
    fn recycle(&self, header: &ObjectHeader) {
        let label = self.header();
        let _context = context::enter_raw(label);
        header.thaw();
        // A recycled memo value is only ever held by this label's memo
        self.memo.mark_thawed();
        header.relabel(label.as_ptr());
        header.accept(&mut Recycler::new(label));
        log_recycle(header.class_name(), header.as_ptr().as_ptr() as usize);
    }

    /// Copy a frozen object into this branch and memoize it
    fn copy(&self, found: NonNull<ObjectHeader>) -> NonNull<ObjectHeader> {
        let label = self.header();
        let _context = context::enter_raw(label);
        let source = unsafe { found.as_ref() };
        let info = source.type_info();

        let clone = unsafe { (info.copy)(found, label.as_ptr()) };
        let copied = unsafe { clone.as_ref() };
        copied.inc_shared();
        copied.accept(&mut Copier::new(label));
        log_copy(source.class_name(), found.as_ptr() as usize, clone.as_ptr() as usize);

        // Handles copied after the freeze may still reach `found`, even
        // when it was single then
        let winner = self.memo.put(found, clone);
        debug_assert_eq!(winner, clone, "memo entry written outside the write lock");
        clone
    }

    /// Freeze every clone recorded in this branch
    pub fn freeze(&self) {
        let _freeze = object::freeze_lock();
        let _guard = self.lock.read_recursive();
        self.memo.freeze();
    }

    /// Start a child branch that inherits every resolution made so far
    pub fn fork(&self) -> Shared<Label> {
        let _freeze = object::freeze_lock();
        self.freeze();
        let memo = {
            let _guard = self.lock.read_recursive();
            self.memo.clone()
        };
        let parent = unsafe { Shared::from_header_acquire(self.header()) };
        log_fork(self.header().as_ptr() as usize, memo.len());
        Self::create(Label {
            memo,
            lock: RwLock::new(()),
            parent: Some(parent),
        })
    }

    /// Number of ancestors
    pub fn depth(&self) -> usize {
        let mut depth = 0;
        let mut label = self.parent.as_ref();
        while let Some(parent) = label {
            depth += 1;
            label = parent.parent.as_ref();
        }
        depth
    }
}

impl Clone for Label {
    fn clone(&self) -> Self {
        let _guard = self.lock.read_recursive();
        Self {
            memo: self.memo.clone(),
            lock: RwLock::new(()),
            parent: self.parent.clone(),
        }
    }
}

impl Traversable for Label {}

impl Object for Label {
    const ACYCLIC: bool = true;

    fn class_name(&self) -> &'static str {
        "Label"
    }
}

impl core::fmt::Debug for Label {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Label")
            .field("memo", &self.memo)
            .field("depth", &self.depth())
            .finish()
    }
}
