//! Pointer family - typed handles over reference-counted objects
//!
//! - `Shared<T>`: owns one shared reference
//! - `Weak<T>`: owns one weak reference
//! - `Lazy<P>`: a `Shared` or `Weak` target plus the label it resolves
//!   against; dereferences follow, copy or recycle frozen targets
//! - `ContextPtr`: the label of a lazy pointer, counted only across contexts
//! - `InitPtr<T>`: uncounted back-reference, empty in copies

mod context;
mod init;
mod lazy;
mod shared;
mod weak;


pub use context::ContextPtr;
pub use init::InitPtr;
pub use lazy::Lazy;
pub use shared::Shared;
pub use weak::Weak;

use crate::object::{Object, ObjectHeader};

mod sealed {
    pub trait Sealed {}
}

/// The reference kind a `Lazy` pointer holds on its target
pub trait Handle: sealed::Sealed {
    type Target: Object;

    /// Whether the edge owns a shared reference
    const STRONG: bool;

    fn acquire(header: &ObjectHeader);

    fn release(header: &ObjectHeader);

    /// Keep the payload alive while resolving; false if it is already gone
    fn pin(header: &ObjectHeader) -> bool;

    fn unpin(header: &ObjectHeader);
}

impl<T: Object> sealed::Sealed for Shared<T> {}

impl<T: Object> Handle for Shared<T> {
    type Target = T;
    const STRONG: bool = true;

    #[inline]
    fn acquire(header: &ObjectHeader) {
        header.inc_shared();
    }

    #[inline]
    fn release(header: &ObjectHeader) {
        header.dec_shared();
    }

    /// The handle's own reference already keeps the payload alive.
    #[inline]
    fn pin(_header: &ObjectHeader) -> bool {
        true
    }

    #[inline]
    fn unpin(_header: &ObjectHeader) {}
}

impl<T: Object> sealed::Sealed for Weak<T> {}

impl<T: Object> Handle for Weak<T> {
    type Target = T;
    const STRONG: bool = false;

    #[inline]
    fn acquire(header: &ObjectHeader) {
        header.inc_weak();
    }

    #[inline]
    fn release(header: &ObjectHeader) {
        header.dec_weak();
    }

    #[inline]
    fn pin(header: &ObjectHeader) -> bool {
        header.try_inc_shared()
    }

    #[inline]
    fn unpin(header: &ObjectHeader) {
        header.dec_shared();
    }
}
