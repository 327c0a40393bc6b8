//! Tests for cycle collection

use super::*;
use crate::label::Label;
use crate::memo::Memo;
use crate::object::{Mutable, Object};
use crate::ptr::{Lazy, Shared};
use std::sync::atomic::{AtomicUsize, Ordering};

#[derive(Clone)]
struct Cyc {
    next: Mutable<Vec<Lazy<Shared<Cyc>>>>,
    dropped: &'static AtomicUsize,
}

crate::members!(Cyc { next });

impl Object for Cyc {}

impl Drop for Cyc {
    fn drop(&mut self) {
        self.dropped.fetch_add(1, Ordering::SeqCst);
    }
}

fn cyc(dropped: &'static AtomicUsize) -> Shared<Cyc> {
    Shared::new(Cyc {
        next: Mutable::new(Vec::new()),
        dropped,
    })
}

fn link(from: &Shared<Cyc>, to: &Shared<Cyc>) {
    from.next.write().push(Lazy::from_shared(to.clone()));
}

#[test]
fn test_two_node_cycle_collected() {
    static DROPPED: AtomicUsize = AtomicUsize::new(0);

    let a = cyc(&DROPPED);
    let b = cyc(&DROPPED);
    link(&a, &b);
    link(&b, &a);
    drop(a);
    drop(b);

    assert_eq!(DROPPED.load(Ordering::SeqCst), 0);
    assert_eq!(candidate_count(), 2);

    let collected = force_collect();
    assert_eq!(collected, 2);
    assert_eq!(DROPPED.load(Ordering::SeqCst), 2);
    assert_eq!(candidate_count(), 0);
}

#[test]
fn test_self_loop_collected() {
    static DROPPED: AtomicUsize = AtomicUsize::new(0);

    let a = cyc(&DROPPED);
    link(&a, &a);
    drop(a);
    assert_eq!(force_collect(), 1);
    assert_eq!(DROPPED.load(Ordering::SeqCst), 1);
}

#[test]
fn test_reachable_cycle_survives() {
    static DROPPED: AtomicUsize = AtomicUsize::new(0);

    let a = cyc(&DROPPED);
    let b = cyc(&DROPPED);
    link(&a, &b);
    link(&b, &a);
    drop(b);

    assert_eq!(force_collect(), 0);
    assert_eq!(DROPPED.load(Ordering::SeqCst), 0);
    // Trial counts were restored
    assert_eq!(a.header().shared_count(), 2);
    let b = a.next.read()[0].pull().unwrap();
    assert_eq!(b.header().shared_count(), 2);
    drop(b);

    drop(a);
    assert_eq!(force_collect(), 2);
    assert_eq!(DROPPED.load(Ordering::SeqCst), 2);
}

#[test]
fn test_cycle_releases_outside_target() {
    static DROPPED: AtomicUsize = AtomicUsize::new(0);

    // a <-> b -> c, with c also held from outside
    let a = cyc(&DROPPED);
    let b = cyc(&DROPPED);
    let c = cyc(&DROPPED);
    link(&a, &b);
    link(&b, &a);
    link(&b, &c);
    drop(a);
    drop(b);
    assert_eq!(c.header().shared_count(), 2);

    assert_eq!(force_collect(), 2);
    assert_eq!(DROPPED.load(Ordering::SeqCst), 2);
    assert_eq!(c.header().shared_count(), 1);
    clear_candidates();
}

#[test]
fn test_memo_held_cycle_survives() {
    static DROPPED: AtomicUsize = AtomicUsize::new(0);

    let a = cyc(&DROPPED);
    let b = cyc(&DROPPED);
    link(&a, &b);
    link(&b, &a);
    let memo = Memo::with_capacity(8);
    memo.put(a.as_ptr(), b.as_ptr());
    let weak = b.downgrade();
    drop(a);
    drop(b);

    assert_eq!(force_collect(), 0);
    assert_eq!(DROPPED.load(Ordering::SeqCst), 0);

    drop(memo);
    // Touch the cycle again so it is buffered once more
    drop(weak.upgrade().unwrap());
    assert_eq!(force_collect(), 2);
    assert_eq!(DROPPED.load(Ordering::SeqCst), 2);
}

#[test]
fn test_purge_drops_dead_candidates() {
    static DROPPED: AtomicUsize = AtomicUsize::new(0);

    let a = cyc(&DROPPED);
    let extra = a.clone();
    drop(extra);
    assert_eq!(candidate_count(), 1);

    purge();
    assert_eq!(candidate_count(), 1);

    drop(a);
    assert_eq!(DROPPED.load(Ordering::SeqCst), 1);
    let before = stats().candidates_purged;
    purge();
    assert_eq!(candidate_count(), 0);
    assert!(stats().candidates_purged > before);
}

#[test]
fn test_buffered_once() {
    static DROPPED: AtomicUsize = AtomicUsize::new(0);

    let a = cyc(&DROPPED);
    for _ in 0..4 {
        drop(a.clone());
    }
    assert_eq!(candidate_count(), 1);
    assert_eq!(a.header().memo_key_count(), 2);
    clear_candidates();
    assert_eq!(a.header().memo_key_count(), 1);
}

#[test]
fn test_acyclic_never_buffered() {
    let label = Label::create(Label::new(None));
    drop(label.clone());
    assert_eq!(candidate_count(), 0);
}

#[test]
fn test_stats_track_collections() {
    static DROPPED: AtomicUsize = AtomicUsize::new(0);

    let before = stats();
    let a = cyc(&DROPPED);
    link(&a, &a);
    drop(a);
    force_collect();

    let after = stats();
    assert!(after.collections_run > before.collections_run);
    assert!(after.objects_collected > before.objects_collected);
    assert!(after.candidates_scanned > before.candidates_scanned);
    assert_eq!(after.buffered_candidates, 0);
    assert!(after.threshold >= 1);
}

#[test]
fn test_weak_edges_not_traced() {
    static DROPPED: AtomicUsize = AtomicUsize::new(0);

    #[derive(Clone)]
    struct Back {
        prev: Mutable<Lazy<crate::ptr::Weak<Back>>>,
        dropped: &'static AtomicUsize,
    }
    crate::members!(Back { prev });
    impl Object for Back {}
    impl Drop for Back {
        fn drop(&mut self) {
            self.dropped.fetch_add(1, Ordering::SeqCst);
        }
    }

    let a = Shared::new(Back {
        prev: Mutable::new(Lazy::nil()),
        dropped: &DROPPED,
    });
    a.prev.set(Lazy::from_shared(a.clone()).downgrade());
    // The strong temporary above was released: a is buffered
    clear_candidates();
    drop(a);
    assert_eq!(DROPPED.load(Ordering::SeqCst), 1);
}
