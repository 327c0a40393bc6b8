//! Back-reference pointer - uncounted and empty in copies

use super::Shared;
use crate::object::{self, Object, ObjectHeader};
use crate::visit::{Member, Visitor};
use core::marker::PhantomData;
use core::ptr::NonNull;

/// Points at an object that is guaranteed to outlive the holder, typically
/// the parent of a child node. Copies start out empty; the new owner sets
/// them again.
pub struct InitPtr<T: Object> {
    ptr: Option<NonNull<ObjectHeader>>,
    _marker: PhantomData<T>,
}

impl<T: Object> InitPtr<T> {
    pub const fn new() -> Self {
        Self {
            ptr: None,
            _marker: PhantomData,
        }
    }

    pub fn to(target: &Shared<T>) -> Self {
        Self {
            ptr: Some(target.as_ptr()),
            _marker: PhantomData,
        }
    }

    pub fn set(&mut self, target: &Shared<T>) {
        self.ptr = Some(target.as_ptr());
    }

    pub fn reset(&mut self) {
        self.ptr = None;
    }

    #[inline]
    pub fn is_set(&self) -> bool {
        self.ptr.is_some()
    }

    /// # Safety
    /// The target must still be alive.
    #[inline]
    pub unsafe fn get(&self) -> Option<&T> {
        self.ptr.map(|ptr| object::value::<T>(ptr))
    }
}

impl<T: Object> Default for InitPtr<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Object> Clone for InitPtr<T> {
    fn clone(&self) -> Self {
        Self::new()
    }
}

impl<T: Object> Member for InitPtr<T> {
    #[inline(always)]
    fn accept_member(&self, _visitor: &mut dyn Visitor) {}
}

unsafe impl<T: Object> Send for InitPtr<T> {}
unsafe impl<T: Object> Sync for InitPtr<T> {}
