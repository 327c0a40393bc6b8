//! The canonical visitors of the lazy clone protocol

use super::{Edge, Visitor};
use crate::object::ObjectHeader;
use core::ptr::NonNull;
use core::sync::atomic::{AtomicBool, Ordering};

/// Repairs a fresh shallow copy: every edge is re-targeted to the label the
/// copy was made for, so dereferences resolve through that branch.
pub struct Copier {
    label: NonNull<ObjectHeader>,
}

impl Copier {
    pub fn new(label: NonNull<ObjectHeader>) -> Self {
        Self { label }
    }
}

impl Visitor for Copier {
    #[inline]
    fn visit(&mut self, edge: &dyn Edge) {
        edge.context().set(self.label);
    }
}

/// Freezes every target that is not frozen yet, and seals the object's
/// `Mutable` fields against writes
pub struct Freezer;

impl Visitor for Freezer {
    #[inline]
    fn visit(&mut self, edge: &dyn Edge) {
        edge.freeze_target();
    }

    #[inline]
    fn visit_cell(&mut self, frozen: &AtomicBool) {
        frozen.store(true, Ordering::Release);
    }
}

/// Forces pending lazy clones
pub struct Finisher;

impl Visitor for Finisher {
    #[inline]
    fn visit(&mut self, edge: &dyn Edge) {
        edge.finish();
    }
}

/// Moves a recycled object's edges into the label that reuses it
pub struct Recycler {
    label: NonNull<ObjectHeader>,
}

impl Recycler {
    pub fn new(label: NonNull<ObjectHeader>) -> Self {
        Self { label }
    }
}

impl Visitor for Recycler {
    #[inline]
    fn visit(&mut self, edge: &dyn Edge) {
        edge.context().set(self.label);
    }

    #[inline]
    fn visit_cell(&mut self, frozen: &AtomicBool) {
        frozen.store(false, Ordering::Release);
    }
}

/// Converts strong edges of a memo-only object into memo-value references
pub struct Discarder;

impl Visitor for Discarder {
    fn visit(&mut self, edge: &dyn Edge) {
        if !edge.is_strong() {
            return;
        }
        if let Some(target) = edge.target() {
            let target = unsafe { target.as_ref() };
            target.inc_memo_value();
            target.dec_shared();
        }
    }
}

/// Inverse of the Discarder
pub struct Restorer;

impl Visitor for Restorer {
    fn visit(&mut self, edge: &dyn Edge) {
        if !edge.is_strong() {
            return;
        }
        if let Some(target) = edge.target() {
            let target = unsafe { target.as_ref() };
            target.inc_shared();
            target.dec_memo_value();
        }
    }
}
