//! Ambient context - the label new objects and edges belong to
//!
//! Design: A per-thread stack of entered labels over a process-wide root.
//! `enter` pushes and the returned guard pops, so the active branch is
//! explicit at every call site yet never threaded through signatures.

use super::Label;
use crate::object::ObjectHeader;
use crate::ptr::Shared;
use core::cell::RefCell;
use core::marker::PhantomData;
use core::ptr::NonNull;
use once_cell::sync::OnceCell;

static ROOT: OnceCell<Shared<Label>> = OnceCell::new();

thread_local! {
    static STACK: RefCell<Vec<Shared<Label>>> = const { RefCell::new(Vec::new()) };
}

/// The root label every branch descends from
pub fn root() -> &'static Shared<Label> {
    ROOT.get_or_init(|| Label::create(Label::new(None)))
}

/// The active label of this thread
pub fn current() -> Shared<Label> {
    STACK
        .try_with(|stack| stack.borrow().last().cloned())
        .ok()
        .flatten()
        .unwrap_or_else(|| root().clone())
}

/// The active label without taking a reference
pub(crate) fn current_raw() -> NonNull<ObjectHeader> {
    STACK
        .try_with(|stack| stack.borrow().last().map(Shared::as_ptr))
        .ok()
        .flatten()
        .unwrap_or_else(|| root().as_ptr())
}

/// Make `label` the active label until the guard is dropped
pub fn enter(label: &Shared<Label>) -> ContextGuard {
    push(label.clone())
}

pub(crate) fn enter_raw(label: NonNull<ObjectHeader>) -> ContextGuard {
    push(unsafe { Shared::from_header_acquire(label) })
}

fn push(label: Shared<Label>) -> ContextGuard {
    // Pushing during thread teardown is a no-op; the guard pops nothing
    let pushed = STACK.try_with(|stack| stack.borrow_mut().push(label)).is_ok();
    ContextGuard {
        pushed,
        _not_send: PhantomData,
    }
}

/// Number of labels entered on this thread
pub fn depth() -> usize {
    STACK.try_with(|stack| stack.borrow().len()).unwrap_or(0)
}

/// Restores the previous context on drop
#[must_use = "the context is left as soon as the guard is dropped"]
pub struct ContextGuard {
    pushed: bool,
    _not_send: PhantomData<*const ()>,
}

impl Drop for ContextGuard {
    fn drop(&mut self) {
        if !self.pushed {
            return;
        }
        // Release outside the borrow: it may cascade into destruction
        let popped = STACK.try_with(|stack| stack.borrow_mut().pop()).ok().flatten();
        drop(popped);
    }
}
