//! Context pointer - the label a lazy pointer resolves against
//!
//! Design: Stored as a tagged word. An edge whose label is the ambient
//! context at the time it was set is an uncounted back-reference (the owning
//! object already holds its own label); any other label is counted and the
//! low bit records that the count must be released.

use crate::label::{context, Label};
use crate::object::{self, ObjectHeader};
use crate::ptr::Shared;
use core::ptr::NonNull;
use std::sync::atomic::{AtomicUsize, Ordering};

const CROSS: usize = 1;

pub struct ContextPtr {
    bits: AtomicUsize,
}

impl ContextPtr {
    /// The ambient context
    pub fn current() -> Self {
        Self::from_raw(context::current_raw())
    }

    /// An explicit label, counted unless it is the ambient context
    pub fn new(label: &Shared<Label>) -> Self {
        Self::from_raw(label.as_ptr())
    }

    pub(crate) fn from_raw(label: NonNull<ObjectHeader>) -> Self {
        Self {
            bits: AtomicUsize::new(encode(label)),
        }
    }

    #[inline]
    pub(crate) fn raw(&self) -> NonNull<ObjectHeader> {
        decode(self.bits.load(Ordering::Acquire))
    }

    /// Whether the label differed from the ambient context when set
    #[inline]
    pub fn is_cross(&self) -> bool {
        self.bits.load(Ordering::Acquire) & CROSS != 0
    }

    /// The label itself
    #[inline]
    pub fn label(&self) -> &Label {
        unsafe { object::value::<Label>(self.raw()) }
    }

    /// A counted handle to the label
    pub fn shared(&self) -> Shared<Label> {
        unsafe { Shared::from_header_acquire(self.raw()) }
    }

    /// Re-target to another label, releasing the previous one if counted
    pub fn set(&self, label: NonNull<ObjectHeader>) {
        let old = self.bits.swap(encode(label), Ordering::AcqRel);
        release(old);
    }
}

#[inline]
fn encode(label: NonNull<ObjectHeader>) -> usize {
    let addr = label.as_ptr() as usize;
    debug_assert_eq!(addr & CROSS, 0, "misaligned label");
    if label == context::current_raw() {
        addr
    } else {
        unsafe { label.as_ref().inc_shared() };
        addr | CROSS
    }
}

#[inline]
fn decode(bits: usize) -> NonNull<ObjectHeader> {
    // Never constructed from a null label
    unsafe { NonNull::new_unchecked((bits & !CROSS) as *mut ObjectHeader) }
}

#[inline]
fn release(bits: usize) {
    if bits & CROSS != 0 {
        unsafe { decode(bits).as_ref().dec_shared() };
    }
}

impl Clone for ContextPtr {
    fn clone(&self) -> Self {
        Self::from_raw(self.raw())
    }
}

impl Drop for ContextPtr {
    fn drop(&mut self) {
        release(*self.bits.get_mut());
    }
}

impl core::fmt::Debug for ContextPtr {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ContextPtr")
            .field("label", &self.raw())
            .field("cross", &self.is_cross())
            .finish()
    }
}
