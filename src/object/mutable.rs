//! Mutable fields - interior mutability for object payloads
//!
//! Payloads are only reachable through shared references, so fields that
//! change after construction live behind a lock. Writers go through a
//! handle obtained with `Lazy::get`, which guarantees the object is not
//! frozen. A field listed in its class's member list is sealed when the
//! object freezes; writing a sealed field is a contract violation.

use crate::visit::{Member, Visitor};
use core::fmt;
use core::sync::atomic::{AtomicBool, Ordering};
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};

pub struct Mutable<T> {
    value: RwLock<T>,
    frozen: AtomicBool,
}

impl<T> Mutable<T> {
    pub const fn new(value: T) -> Self {
        Self {
            value: RwLock::new(value),
            frozen: AtomicBool::new(false),
        }
    }

    /// Whether the owning object froze this field
    #[inline]
    pub fn is_frozen(&self) -> bool {
        self.frozen.load(Ordering::Acquire)
    }

    #[inline]
    pub fn read(&self) -> RwLockReadGuard<'_, T> {
        self.value.read()
    }

    #[inline]
    pub fn write(&self) -> RwLockWriteGuard<'_, T> {
        debug_assert!(!self.is_frozen(), "write to a field of a frozen object");
        self.value.write()
    }

    /// Replace the value, returning the previous one
    pub fn set(&self, value: T) -> T {
        core::mem::replace(&mut *self.write(), value)
    }

    pub fn into_inner(self) -> T {
        self.value.into_inner()
    }
}

impl<T: Clone> Mutable<T> {
    pub fn get(&self) -> T {
        self.value.read().clone()
    }
}

/// Copies start out writable
impl<T: Clone> Clone for Mutable<T> {
    fn clone(&self) -> Self {
        Self::new(self.get())
    }
}

impl<T: Default> Default for Mutable<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: fmt::Debug> fmt::Debug for Mutable<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&*self.value.read(), f)
    }
}

impl<T: Member> Member for Mutable<T> {
    fn accept_member(&self, visitor: &mut dyn Visitor) {
        visitor.visit_cell(&self.frozen);
        self.value.read_recursive().accept_member(visitor);
    }
}
