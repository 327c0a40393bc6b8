//! Shared pointer - one owning reference

use super::Weak;
use crate::object::{self, Object, ObjectHeader};
use core::fmt;
use core::marker::PhantomData;
use core::ops::Deref;
use core::ptr::NonNull;

/// Owning handle: copy increments, move transfers, drop decrements
pub struct Shared<T: Object> {
    ptr: NonNull<ObjectHeader>,
    _marker: PhantomData<T>,
}

impl<T: Object> Shared<T> {
    /// Allocate and construct in the current context
    #[inline]
    pub fn new(value: T) -> Self {
        object::create(value)
    }

    /// Adopt a block, taking a new shared reference
    ///
    /// # Safety
    /// `header` must be a live block of type `T`.
    #[inline]
    pub(crate) unsafe fn from_header_acquire(header: NonNull<ObjectHeader>) -> Self {
        header.as_ref().inc_shared();
        Self::from_raw(header)
    }

    /// Adopt a shared reference the caller already owns
    ///
    /// # Safety
    /// `ptr` must be a live block of type `T` carrying one shared reference
    /// that is transferred to the handle.
    #[inline]
    pub unsafe fn from_raw(ptr: NonNull<ObjectHeader>) -> Self {
        Self {
            ptr,
            _marker: PhantomData,
        }
    }

    /// Checked cast from an erased header: a new shared reference when the
    /// block holds a live `T`
    pub fn downcast(header: &ObjectHeader) -> Option<Self> {
        if header.is::<T>() && header.try_inc_shared() {
            Some(unsafe { Self::from_raw(header.as_ptr()) })
        } else {
            None
        }
    }

    /// Give up the handle without releasing its reference
    #[inline]
    pub fn into_raw(self) -> NonNull<ObjectHeader> {
        let ptr = self.ptr;
        core::mem::forget(self);
        ptr
    }

    #[inline]
    pub fn as_ptr(&self) -> NonNull<ObjectHeader> {
        self.ptr
    }

    #[inline]
    pub fn header(&self) -> &ObjectHeader {
        unsafe { self.ptr.as_ref() }
    }

    #[inline]
    pub fn ptr_eq(a: &Self, b: &Self) -> bool {
        a.ptr == b.ptr
    }

    #[inline]
    pub fn downgrade(&self) -> Weak<T> {
        Weak::new(self)
    }

    #[inline]
    pub fn is_frozen(&self) -> bool {
        self.header().is_frozen()
    }

    /// Freeze the object and everything reachable from it.
    ///
    /// Returns whether it was already frozen.
    pub fn freeze(&self) -> bool {
        let _guard = object::freeze_lock();
        self.header().freeze()
    }

    /// Force pending lazy clones reachable from the object
    pub fn finish(&self) {
        self.header().finish();
    }
}

impl<T: Object> Clone for Shared<T> {
    #[inline]
    fn clone(&self) -> Self {
        self.header().inc_shared();
        Self {
            ptr: self.ptr,
            _marker: PhantomData,
        }
    }
}

impl<T: Object> Drop for Shared<T> {
    #[inline]
    fn drop(&mut self) {
        self.header().dec_shared();
    }
}

impl<T: Object> Deref for Shared<T> {
    type Target = T;

    #[inline]
    fn deref(&self) -> &T {
        unsafe { object::value::<T>(self.ptr) }
    }
}

impl<T: Object + fmt::Debug> fmt::Debug for Shared<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Shared")
            .field("address", &self.ptr)
            .field("frozen", &self.is_frozen())
            .field("value", &**self)
            .finish()
    }
}

// Counts are atomic; the payload itself must be thread-safe
unsafe impl<T: Object> Send for Shared<T> {}
unsafe impl<T: Object> Sync for Shared<T> {}
