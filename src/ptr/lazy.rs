//! Lazy pointer - follows, copies or recycles its target on dereference
//!
//! Design: A lazy pointer caches a raw target and the label it resolves
//! against. An unfrozen target is returned as is. A frozen target is handed
//! to the label, which walks its memo chain and, for write access, copies or
//! recycles; the result replaces the cached target so the next dereference
//! is direct.

use super::{ContextPtr, Handle, Shared, Weak};
use crate::label::Label;
use crate::object::{self, Object, ObjectHeader};
use crate::visit::{Edge, Member, Visitor};
use core::fmt;
use core::marker::PhantomData;
use core::ptr::NonNull;
use std::sync::atomic::{AtomicPtr, Ordering};

pub struct Lazy<P: Handle> {
    object: AtomicPtr<ObjectHeader>,
    label: ContextPtr,
    _marker: PhantomData<P>,
}

impl<T: Object> Lazy<Shared<T>> {
    /// Allocate and construct in the current context
    pub fn new(value: T) -> Self {
        Self::from_shared(Shared::new(value))
    }

    /// Wrap an owning handle, resolving in the current context
    pub fn from_shared(shared: Shared<T>) -> Self {
        Self::from_parts(shared.into_raw().as_ptr(), ContextPtr::current())
    }

    /// A weak lazy pointer to the same target and label
    pub fn downgrade(&self) -> Lazy<Weak<T>> {
        let raw = self.object.load(Ordering::Acquire);
        if let Some(target) = NonNull::new(raw) {
            unsafe { target.as_ref().inc_weak() };
        }
        Lazy::from_parts(raw, self.label.clone())
    }
}

impl<T: Object> Lazy<Weak<T>> {
    pub fn from_weak(weak: Weak<T>) -> Self {
        let raw = weak.as_ptr();
        core::mem::forget(weak);
        Self::from_parts(raw.as_ptr(), ContextPtr::current())
    }
}

impl<P: Handle> Lazy<P> {
    /// The null pointer
    pub fn nil() -> Self {
        Self::from_parts(core::ptr::null_mut(), ContextPtr::current())
    }

    /// Takes over one reference of kind `P` on `raw`
    fn from_parts(raw: *mut ObjectHeader, label: ContextPtr) -> Self {
        Self {
            object: AtomicPtr::new(raw),
            label,
            _marker: PhantomData,
        }
    }

    /// Re-root the pointer in an explicit label
    pub fn with_context(self, label: &Shared<Label>) -> Self {
        self.label.set(label.as_ptr());
        self
    }

    #[inline]
    pub fn is_nil(&self) -> bool {
        self.object.load(Ordering::Acquire).is_null()
    }

    /// The label this pointer resolves against
    #[inline]
    pub fn label(&self) -> &Label {
        self.label.label()
    }

    /// Cached raw target, unresolved
    #[inline]
    pub fn raw(&self) -> Option<NonNull<ObjectHeader>> {
        NonNull::new(self.object.load(Ordering::Acquire))
    }

    /// Resolve for write: a frozen target is copied or recycled for this
    /// pointer's branch. Returns `None` for nil and for dead weak targets.
    pub fn get(&self) -> Option<Shared<P::Target>> {
        self.resolve(true)
    }

    /// Resolve for read: follows existing clones, never copies.
    pub fn pull(&self) -> Option<Shared<P::Target>> {
        self.resolve(false)
    }

    fn resolve(&self, write: bool) -> Option<Shared<P::Target>> {
        let target = self.raw()?;
        let header = unsafe { target.as_ref() };
        if !header.is_frozen() {
            if !P::pin(header) {
                return None;
            }
            let resolved = unsafe { Shared::from_header_acquire(target) };
            P::unpin(header);
            return Some(resolved);
        }
        let label = self.label.label();
        if write {
            self.forward(label.write_guard(), |target| label.get_locked(target))
        } else {
            self.forward(label.read_guard(), |target| label.pull_locked(target))
        }
    }

    /// Resolve the cached target while `guard` holds the label lock, so a
    /// resolution finished by another thread is seen here. References are
    /// released after unlocking since they may cascade into destruction.
    fn forward<G>(
        &self,
        guard: G,
        resolve: impl FnOnce(NonNull<ObjectHeader>) -> NonNull<ObjectHeader>,
    ) -> Option<Shared<P::Target>> {
        let target = self.raw()?;
        let header = unsafe { target.as_ref() };
        if !P::pin(header) {
            return None;
        }
        let resolved = resolve(target);
        let stale = (resolved != target).then(|| self.replace(target, resolved));
        drop(guard);

        P::unpin(header);
        if let Some(stale) = stale {
            P::release(unsafe { stale.as_ref() });
        }
        Some(unsafe { Shared::from_raw(resolved) })
    }

    /// Move the cached target from `expected` to `target`. Returns the
    /// reference the caller must release.
    fn replace(&self, expected: NonNull<ObjectHeader>, target: NonNull<ObjectHeader>) -> NonNull<ObjectHeader> {
        P::acquire(unsafe { target.as_ref() });
        match self.object.compare_exchange(
            expected.as_ptr(),
            target.as_ptr(),
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            Ok(_) => expected,
            // A concurrent read resolution already moved the pointer
            Err(_) => target,
        }
    }

    /// Freeze the target and the memo of this pointer's label
    pub fn freeze(&self) {
        let _guard = object::freeze_lock();
        self.freeze_target();
        self.label.label().freeze();
    }

    /// Lazy deep clone: the result sees the current state of the whole
    /// reachable graph, and copies are made only on write.
    pub fn deep_clone(&self) -> Self {
        let _guard = object::freeze_lock();
        // Cache the resolution; the temporary count would defeat `single`
        drop(self.pull());
        self.freeze_target();

        let child = self.label.label().fork();
        let raw = self.object.load(Ordering::Acquire);
        if let Some(target) = NonNull::new(raw) {
            P::acquire(unsafe { target.as_ref() });
        }
        Self::from_parts(raw, ContextPtr::new(&child))
    }

    /// Force pending clones reachable from the target
    pub fn finish(&self) {
        if let Some(target) = self.get() {
            target.finish();
        }
    }
}

impl<P: Handle> Clone for Lazy<P> {
    fn clone(&self) -> Self {
        let raw = self.object.load(Ordering::Acquire);
        if let Some(target) = NonNull::new(raw) {
            P::acquire(unsafe { target.as_ref() });
        }
        Self::from_parts(raw, self.label.clone())
    }
}

impl<P: Handle> Drop for Lazy<P> {
    fn drop(&mut self) {
        if let Some(target) = NonNull::new(*self.object.get_mut()) {
            P::release(unsafe { target.as_ref() });
        }
    }
}

impl<P: Handle> Default for Lazy<P> {
    fn default() -> Self {
        Self::nil()
    }
}

impl<P: Handle> fmt::Debug for Lazy<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lazy")
            .field("object", &self.object.load(Ordering::Relaxed))
            .field("strong", &P::STRONG)
            .field("label", &self.label)
            .finish()
    }
}

// ===== Visitor integration =====

impl<P: Handle> Edge for Lazy<P> {
    #[inline]
    fn target(&self) -> Option<NonNull<ObjectHeader>> {
        self.raw()
    }

    #[inline]
    fn is_strong(&self) -> bool {
        P::STRONG
    }

    #[inline]
    fn context(&self) -> &ContextPtr {
        &self.label
    }

    fn freeze_target(&self) {
        if let Some(target) = self.raw() {
            let header = unsafe { target.as_ref() };
            if P::pin(header) {
                header.freeze();
                P::unpin(header);
            }
        }
        if self.label.is_cross() {
            self.label.label().freeze();
        }
    }

    fn finish(&self) {
        Lazy::finish(self);
    }

    fn detach(&self) -> Option<NonNull<ObjectHeader>> {
        NonNull::new(self.object.swap(core::ptr::null_mut(), Ordering::AcqRel))
    }
}

impl<P: Handle> Member for Lazy<P> {
    #[inline]
    fn accept_member(&self, visitor: &mut dyn Visitor) {
        visitor.visit(self);
    }
}

unsafe impl<P: Handle> Send for Lazy<P> {}
unsafe impl<P: Handle> Sync for Lazy<P> {}
