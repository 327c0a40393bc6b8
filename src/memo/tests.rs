//! Tests for the memo table

use super::*;
use crate::object::Object;
use crate::ptr::Shared;
use crate::visit::Traversable;
use std::sync::{Arc, Barrier};
use std::thread;

#[derive(Clone, Debug)]
struct Leaf(usize);

impl Traversable for Leaf {}
impl Object for Leaf {}

fn leaves(n: usize) -> Vec<Shared<Leaf>> {
    (0..n).map(|i| Shared::new(Leaf(i))).collect()
}

#[test]
fn test_get_missing() {
    let memo = Memo::with_capacity(16);
    let key = Shared::new(Leaf(0));
    assert!(memo.get(key.as_ptr()).is_none());
    assert!(memo.is_empty());
}

#[test]
fn test_put_get_counts() {
    let memo = Memo::with_capacity(16);
    let key = Shared::new(Leaf(1));
    let value = Shared::new(Leaf(2));

    let mapped = memo.put(key.as_ptr(), value.as_ptr());
    assert_eq!(mapped, value.as_ptr());
    assert_eq!(memo.get(key.as_ptr()), Some(value.as_ptr()));
    assert_eq!(key.header().memo_key_count(), 2);
    assert_eq!(value.header().memo_value_count(), 2);
    assert_eq!(memo.len(), 1);

    drop(memo);
    assert_eq!(key.header().memo_key_count(), 1);
    assert_eq!(value.header().memo_value_count(), 1);
}

#[test]
fn test_put_existing_returns_first() {
    let memo = Memo::with_capacity(16);
    let key = Shared::new(Leaf(1));
    let first = Shared::new(Leaf(2));
    let second = Shared::new(Leaf(3));

    memo.put(key.as_ptr(), first.as_ptr());
    let mapped = memo.put(key.as_ptr(), second.as_ptr());
    assert_eq!(mapped, first.as_ptr());
    assert_eq!(second.header().memo_value_count(), 1);
    assert_eq!(key.header().memo_key_count(), 2);
}

#[test]
fn test_lazy_allocation() {
    let memo = Memo::with_capacity(0);
    assert_eq!(memo.capacity(), 0);
    let key = Shared::new(Leaf(1));
    assert!(memo.get(key.as_ptr()).is_none());
    memo.put(key.as_ptr(), key.as_ptr());
    assert_eq!(memo.capacity(), MIN_CAPACITY);
    assert_eq!(memo.get(key.as_ptr()), Some(key.as_ptr()));
}

#[test]
fn test_grows_when_crowded() {
    let memo = Memo::with_capacity(8);
    let keys = leaves(64);
    let values = leaves(64);
    for (key, value) in keys.iter().zip(&values) {
        memo.put(key.as_ptr(), value.as_ptr());
    }
    assert_eq!(memo.len(), 64);
    // Never above three quarters full
    assert!(memo.capacity() * 3 >= 64 * 4);
    for (key, value) in keys.iter().zip(&values) {
        assert_eq!(memo.get(key.as_ptr()), Some(value.as_ptr()));
    }
}

#[test]
fn test_resize_drops_unreachable_keys() {
    let memo = Memo::with_capacity(8);
    let dead_key = Shared::new(Leaf(100));
    let value = Shared::new(Leaf(101));
    let weak_value = value.downgrade();
    memo.put(dead_key.as_ptr(), value.as_ptr());
    drop(value);
    assert!(weak_value.is_alive());

    drop(dead_key);
    let keys = leaves(16);
    for key in &keys {
        memo.put(key.as_ptr(), key.as_ptr());
    }

    // The entry went with the resize; its value is released
    assert_eq!(memo.len(), 16);
    assert!(!weak_value.is_alive());
}

#[test]
fn test_copy_from_skips_unreachable() {
    let source = Memo::with_capacity(16);
    let live_key = Shared::new(Leaf(1));
    let dead_key = Shared::new(Leaf(2));
    let value = Shared::new(Leaf(3));
    source.put(live_key.as_ptr(), value.as_ptr());
    source.put(dead_key.as_ptr(), value.as_ptr());
    let dead = dead_key.as_ptr();
    drop(dead_key);

    let copy = Memo::with_capacity(16);
    copy.copy_from(&source);
    assert_eq!(copy.len(), 1);
    assert_eq!(copy.get(live_key.as_ptr()), Some(value.as_ptr()));
    assert!(copy.get(dead).is_none());
    assert_eq!(value.header().memo_value_count(), 4);
}

#[test]
fn test_clone_is_independent() {
    let memo = Memo::with_capacity(16);
    let key = Shared::new(Leaf(1));
    let other = Shared::new(Leaf(2));
    memo.put(key.as_ptr(), key.as_ptr());

    let copy = memo.clone();
    copy.put(other.as_ptr(), other.as_ptr());
    assert_eq!(copy.len(), 2);
    assert_eq!(memo.len(), 1);
}

#[test]
fn test_freeze_values() {
    let memo = Memo::with_capacity(16);
    let key = Shared::new(Leaf(1));
    let value = Shared::new(Leaf(2));
    memo.put(key.as_ptr(), value.as_ptr());

    let _guard = crate::object::freeze_lock();
    memo.freeze();
    assert!(value.is_frozen());
    assert!(!key.is_frozen());
}

#[test]
fn test_freeze_skips_until_insertion() {
    let memo = Memo::with_capacity(16);
    let items = leaves(4);
    memo.put(items[0].as_ptr(), items[1].as_ptr());
    assert!(!memo.is_frozen());

    let _guard = crate::object::freeze_lock();
    memo.freeze();
    assert!(memo.is_frozen());
    assert!(items[1].is_frozen());

    // An existing key is not an insertion
    memo.put(items[0].as_ptr(), items[3].as_ptr());
    assert!(memo.is_frozen());

    memo.put(items[2].as_ptr(), items[3].as_ptr());
    assert!(!memo.is_frozen());
    memo.freeze();
    assert!(memo.is_frozen());
    assert!(items[3].is_frozen());
}

#[test]
fn test_clone_keeps_frozen_flag() {
    let memo = Memo::with_capacity(16);
    let items = leaves(2);
    memo.put(items[0].as_ptr(), items[1].as_ptr());
    {
        let _guard = crate::object::freeze_lock();
        memo.freeze();
    }
    assert!(memo.clone().is_frozen());
}

#[test]
fn test_concurrent_put_single_winner() {
    const THREADS: usize = 8;
    let memo = Arc::new(Memo::with_capacity(4));
    let key = Shared::new(Leaf(0));
    let barrier = Arc::new(Barrier::new(THREADS));

    let handles: Vec<_> = (0..THREADS)
        .map(|i| {
            let memo = Arc::clone(&memo);
            let key = key.clone();
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                let value = Shared::new(Leaf(i + 1));
                barrier.wait();
                let winner = memo.put(key.as_ptr(), value.as_ptr());
                let seen = memo.get(key.as_ptr());
                (winner.as_ptr() as usize, seen.map(|p| p.as_ptr() as usize))
            })
        })
        .collect();

    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    let winner = results[0].0;
    for (mapped, seen) in results {
        assert_eq!(mapped, winner);
        assert_eq!(seen, Some(winner));
    }
    assert_eq!(memo.len(), 1);
    assert_eq!(memo.get(key.as_ptr()).map(|p| p.as_ptr() as usize), Some(winner));
}

#[test]
fn test_concurrent_puts_distinct_keys() {
    const THREADS: usize = 4;
    const PER_THREAD: usize = 64;
    let memo = Arc::new(Memo::with_capacity(2));

    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let memo = Arc::clone(&memo);
            thread::spawn(move || {
                let keys = leaves(PER_THREAD);
                for key in &keys {
                    memo.put(key.as_ptr(), key.as_ptr());
                }
                keys.iter().all(|key| memo.get(key.as_ptr()) == Some(key.as_ptr()))
            })
        })
        .collect();

    for handle in handles {
        assert!(handle.join().unwrap());
    }
}
