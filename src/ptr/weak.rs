//! Weak pointer - observes without keeping the payload alive

use super::Shared;
use crate::object::{Object, ObjectHeader};
use core::marker::PhantomData;
use core::ptr::NonNull;

/// Holds the block's memory, never its payload
pub struct Weak<T: Object> {
    ptr: NonNull<ObjectHeader>,
    _marker: PhantomData<T>,
}

impl<T: Object> Weak<T> {
    pub fn new(shared: &Shared<T>) -> Self {
        shared.header().inc_weak();
        Self {
            ptr: shared.as_ptr(),
            _marker: PhantomData,
        }
    }

    /// # Safety
    /// `ptr` must be a block of type `T` carrying one weak reference that is
    /// transferred to the handle.
    #[inline]
    pub(crate) unsafe fn from_raw(ptr: NonNull<ObjectHeader>) -> Self {
        Self {
            ptr,
            _marker: PhantomData,
        }
    }

    #[inline]
    pub fn as_ptr(&self) -> NonNull<ObjectHeader> {
        self.ptr
    }

    #[inline]
    pub fn header(&self) -> &ObjectHeader {
        unsafe { self.ptr.as_ref() }
    }

    /// Whether the payload has not been destroyed yet
    #[inline]
    pub fn is_alive(&self) -> bool {
        self.header().memo_value_count() > 0
    }

    /// Upgrade to an owning handle if the payload is still alive.
    ///
    /// An object held only by memos is resurrected by the upgrade.
    pub fn upgrade(&self) -> Option<Shared<T>> {
        if self.header().try_inc_shared() {
            Some(unsafe { Shared::from_raw(self.ptr) })
        } else {
            None
        }
    }
}

impl<T: Object> Clone for Weak<T> {
    #[inline]
    fn clone(&self) -> Self {
        self.header().inc_weak();
        Self {
            ptr: self.ptr,
            _marker: PhantomData,
        }
    }
}

impl<T: Object> Drop for Weak<T> {
    #[inline]
    fn drop(&mut self) {
        self.header().dec_weak();
    }
}

unsafe impl<T: Object> Send for Weak<T> {}
unsafe impl<T: Object> Sync for Weak<T> {}
