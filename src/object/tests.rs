//! Tests for object lifecycle: counters, freeze, finalize and teardown order

use super::*;
use crate::memo::Memo;
use crate::ptr::{Lazy, Shared};
use crate::visit::Member;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Payload that reports finalize and drop
#[derive(Clone)]
struct Probe {
    id: usize,
    finalized: &'static AtomicUsize,
    dropped: &'static AtomicUsize,
}

impl Traversable for Probe {}

impl Object for Probe {
    fn finalize(&self, _this: &ObjectHeader) {
        self.finalized.fetch_add(1, Ordering::SeqCst);
    }
}

impl Drop for Probe {
    fn drop(&mut self) {
        self.dropped.fetch_add(1, Ordering::SeqCst);
    }
}

/// Payload with one strong edge
#[derive(Clone)]
struct Holder {
    child: Lazy<Shared<Probe>>,
}

impl Traversable for Holder {
    fn accept(&self, visitor: &mut dyn Visitor) {
        self.child.accept_member(visitor);
    }
}

impl Object for Holder {}

#[test]
fn test_initial_counts() {
    static FINALIZED: AtomicUsize = AtomicUsize::new(0);
    static DROPPED: AtomicUsize = AtomicUsize::new(0);

    let probe = Shared::new(Probe { id: 1, finalized: &FINALIZED, dropped: &DROPPED });
    let header = probe.header();
    assert_eq!(header.shared_count(), 1);
    assert_eq!(header.memo_value_count(), 1);
    assert_eq!(header.weak_count(), 1);
    assert_eq!(header.memo_key_count(), 1);
    assert!(header.is_reachable());
    assert!(header.is_unique());
    assert_eq!(probe.id, 1);

    drop(probe);
    assert_eq!(FINALIZED.load(Ordering::SeqCst), 1);
    assert_eq!(DROPPED.load(Ordering::SeqCst), 1);
}

#[test]
fn test_clone_handle_counts() {
    static FINALIZED: AtomicUsize = AtomicUsize::new(0);
    static DROPPED: AtomicUsize = AtomicUsize::new(0);

    let a = Shared::new(Probe { id: 2, finalized: &FINALIZED, dropped: &DROPPED });
    let b = a.clone();
    assert!(Shared::ptr_eq(&a, &b));
    assert_eq!(a.header().shared_count(), 2);
    assert_eq!(a.header().memo_value_count(), 1);
    assert!(!a.header().is_unique());

    drop(b);
    assert_eq!(a.header().shared_count(), 1);
    assert_eq!(DROPPED.load(Ordering::SeqCst), 0);
}

#[test]
fn test_freeze_idempotent() {
    static FINALIZED: AtomicUsize = AtomicUsize::new(0);
    static DROPPED: AtomicUsize = AtomicUsize::new(0);

    let probe = Shared::new(Probe { id: 3, finalized: &FINALIZED, dropped: &DROPPED });
    assert!(!probe.is_frozen());
    assert!(!probe.freeze());
    assert!(probe.is_frozen());
    assert!(probe.freeze());
    assert!(probe.is_frozen());
    assert!(probe.header().is_single());
}

#[test]
fn test_single_records_sharing_at_freeze() {
    static FINALIZED: AtomicUsize = AtomicUsize::new(0);
    static DROPPED: AtomicUsize = AtomicUsize::new(0);

    let probe = Shared::new(Probe { id: 4, finalized: &FINALIZED, dropped: &DROPPED });
    let other = probe.clone();
    probe.freeze();
    assert!(!probe.header().is_single());

    // Dropping the second handle later does not change the record
    drop(other);
    assert!(!probe.header().is_single());
}

#[test]
fn test_thaw_resets_flags() {
    static FINALIZED: AtomicUsize = AtomicUsize::new(0);
    static DROPPED: AtomicUsize = AtomicUsize::new(0);

    let probe = Shared::new(Probe { id: 5, finalized: &FINALIZED, dropped: &DROPPED });
    probe.freeze();
    probe.header().thaw();
    assert!(!probe.is_frozen());
    assert!(!probe.header().is_single());
    assert!(!probe.freeze());
}

#[test]
fn test_freeze_is_transitive() {
    static FINALIZED: AtomicUsize = AtomicUsize::new(0);
    static DROPPED: AtomicUsize = AtomicUsize::new(0);

    let holder = Shared::new(Holder {
        child: Lazy::new(Probe { id: 6, finalized: &FINALIZED, dropped: &DROPPED }),
    });
    holder.freeze();
    let child = holder.child.raw().unwrap();
    assert!(unsafe { child.as_ref() }.is_frozen());
}

#[test]
fn test_memo_value_defers_destruction() {
    static FINALIZED: AtomicUsize = AtomicUsize::new(0);
    static DROPPED: AtomicUsize = AtomicUsize::new(0);

    let key = Shared::new(Probe { id: 7, finalized: &FINALIZED, dropped: &DROPPED });
    let value = Shared::new(Probe { id: 8, finalized: &FINALIZED, dropped: &DROPPED });
    let memo = Memo::with_capacity(8);
    memo.put(key.as_ptr(), value.as_ptr());

    let raw = value.as_ptr();
    drop(value);
    let header = unsafe { raw.as_ref() };
    assert_eq!(header.shared_count(), 0);
    assert_eq!(header.memo_value_count(), 1);
    assert!(!header.is_destroyed());
    assert_eq!(FINALIZED.load(Ordering::SeqCst), 0);
    assert_eq!(DROPPED.load(Ordering::SeqCst), 0);

    drop(memo);
    assert_eq!(FINALIZED.load(Ordering::SeqCst), 1);
    assert_eq!(DROPPED.load(Ordering::SeqCst), 1);
    drop(key);
    assert_eq!(DROPPED.load(Ordering::SeqCst), 2);
}

#[test]
fn test_weak_keeps_block_not_payload() {
    static FINALIZED: AtomicUsize = AtomicUsize::new(0);
    static DROPPED: AtomicUsize = AtomicUsize::new(0);

    let probe = Shared::new(Probe { id: 9, finalized: &FINALIZED, dropped: &DROPPED });
    let weak = probe.downgrade();
    assert_eq!(probe.header().weak_count(), 2);
    assert!(weak.upgrade().is_some());

    drop(probe);
    assert_eq!(DROPPED.load(Ordering::SeqCst), 1);
    assert!(!weak.is_alive());
    assert!(weak.upgrade().is_none());
    // Block is still addressable through the weak handle; cycle candidate
    // buffering pins it too until released
    crate::gc::clear_candidates();
    assert_eq!(weak.header().weak_count(), 1);
    assert_eq!(weak.header().memo_key_count(), 1);
}

static PARKED: Mutex<Option<Memo>> = parking_lot::const_mutex(None);
static PARK_KEY: AtomicUsize = AtomicUsize::new(0);

/// Payload that resurrects itself into a memo from its finalizer
#[derive(Clone)]
struct Phoenix {
    dropped: &'static AtomicUsize,
}

impl Traversable for Phoenix {}

impl Object for Phoenix {
    fn finalize(&self, this: &ObjectHeader) {
        let key = PARK_KEY.load(Ordering::SeqCst) as *mut ObjectHeader;
        if let (Some(memo), Some(key)) = (PARKED.lock().as_ref(), NonNull::new(key)) {
            memo.put(key, this.as_ptr());
        }
    }
}

impl Drop for Phoenix {
    fn drop(&mut self) {
        self.dropped.fetch_add(1, Ordering::SeqCst);
    }
}

#[test]
fn test_finalize_resurrection() {
    static FINALIZED: AtomicUsize = AtomicUsize::new(0);
    static DROPPED: AtomicUsize = AtomicUsize::new(0);

    let key = Shared::new(Probe { id: 10, finalized: &FINALIZED, dropped: &DROPPED });
    PARK_KEY.store(key.as_ptr().as_ptr() as usize, Ordering::SeqCst);
    *PARKED.lock() = Some(Memo::with_capacity(8));

    let phoenix = Shared::new(Phoenix { dropped: &DROPPED });
    let raw = phoenix.as_ptr();
    drop(phoenix);

    // Finalizer raised memo-value again: destruction aborted
    let header = unsafe { raw.as_ref() };
    assert!(!header.is_destroyed());
    assert_eq!(header.memo_value_count(), 1);
    assert_eq!(DROPPED.load(Ordering::SeqCst), 0);

    // Finalize runs once; releasing the memo destroys for good
    let memo = PARKED.lock().take();
    drop(memo);
    assert_eq!(DROPPED.load(Ordering::SeqCst), 1);
    drop(key);
}

#[test]
fn test_discard_and_restore_members() {
    static FINALIZED: AtomicUsize = AtomicUsize::new(0);
    static DROPPED: AtomicUsize = AtomicUsize::new(0);

    let anchor = Shared::new(Probe { id: 11, finalized: &FINALIZED, dropped: &DROPPED });
    let holder = Shared::new(Holder {
        child: Lazy::new(Probe { id: 12, finalized: &FINALIZED, dropped: &DROPPED }),
    });
    let child = holder.child.raw().unwrap();
    let memo = Memo::with_capacity(8);
    memo.put(anchor.as_ptr(), holder.as_ptr());

    let weak = holder.downgrade();
    drop(holder);

    // Memo-only holder trades its member's shared reference
    let child_header = unsafe { child.as_ref() };
    assert_eq!(child_header.shared_count(), 0);
    assert_eq!(child_header.memo_value_count(), 1);
    assert!(!child_header.is_destroyed());

    let holder = weak.upgrade().unwrap();
    assert_eq!(child_header.shared_count(), 1);
    assert_eq!(child_header.memo_value_count(), 1);
    assert_eq!(holder.child.get().unwrap().id, 12);

    drop(holder);
    drop(memo);
    assert_eq!(DROPPED.load(Ordering::SeqCst), 1);
    drop(anchor);
    assert_eq!(DROPPED.load(Ordering::SeqCst), 2);
}

#[test]
fn test_object_lives_in_current_label() {
    static FINALIZED: AtomicUsize = AtomicUsize::new(0);
    static DROPPED: AtomicUsize = AtomicUsize::new(0);

    let root = context::root();
    let probe = Shared::new(Probe { id: 13, finalized: &FINALIZED, dropped: &DROPPED });
    assert_eq!(probe.header().label(), root.as_ptr().as_ptr());
}

#[test]
fn test_header_of_payload() {
    let label = context::current();
    let header = unsafe { header_of::<crate::label::Label>(&label) };
    assert_eq!(header, label.as_ptr());
}
