//! Object system - reference-counted blocks with lazy deep clone support
//!
//! Design: Every object lives in a block `{ header, payload }` allocated from
//! the pooled allocator. The header is composed at offset zero so erased code
//! can reach counters in O(1) from any object pointer; a per-type `TypeInfo`
//! table supplies the operations that need the concrete payload type:
//! - copy: shallow duplicate (`Clone`), later repaired by the Copier
//! - accept: member traversal for every visitor
//! - finalize / drop: teardown
//!
//! Payloads are shared; fields written after construction use `Mutable`.

mod header;
mod mutable;

#[cfg(test)]
mod tests;

pub use header::{ObjectHeader, TypeInfo};
pub use mutable::Mutable;
pub(crate) use header::Color;

use crate::allocator;
use crate::label::context;
use crate::ptr::Shared;
use crate::visit::{Traversable, Visitor};
use core::marker::PhantomData;
use core::mem::{align_of, size_of};
use core::ptr::NonNull;
use parking_lot::{ReentrantMutex, ReentrantMutexGuard};

/// A class that participates in the lazy clone protocol.
///
/// Implementors list their members once through `Traversable`; `Clone` is
/// the copy constructor used when a frozen object is copied for a branch.
pub trait Object: Traversable + Clone + Send + Sync + 'static {
    /// Types whose member lists can never lead back to themselves skip
    /// cycle candidate buffering.
    const ACYCLIC: bool = false;

    fn class_name(&self) -> &'static str {
        core::any::type_name::<Self>()
    }

    /// Called once when the memo-value count first reaches zero. Raising
    /// the count again (e.g. by inserting `this` into a memo) aborts
    /// destruction.
    fn finalize(&self, _this: &ObjectHeader) {}
}

/// Block layout: header first, payload after
#[repr(C)]
pub(crate) struct Block<T> {
    header: ObjectHeader,
    value: T,
}

/// Per-type dispatch table instantiation
struct Meta<T>(PhantomData<T>);

impl<T: Object> Meta<T> {
    const INFO: TypeInfo = TypeInfo {
        size: size_of::<Block<T>>(),
        align: align_of::<Block<T>>(),
        acyclic: T::ACYCLIC,
        name: name_block::<T>,
        type_id: core::any::TypeId::of::<T>,
        copy: copy_block::<T>,
        accept: accept_block::<T>,
        finalize: finalize_block::<T>,
        drop: drop_block::<T>,
    };
}

#[inline]
pub(crate) fn type_info<T: Object>() -> &'static TypeInfo {
    &Meta::<T>::INFO
}

/// Payload of a block
///
/// # Safety
/// `header` must belong to a live block of type `T`.
#[inline]
pub(crate) unsafe fn value<'a, T: Object>(header: NonNull<ObjectHeader>) -> &'a T {
    &(*header.cast::<Block<T>>().as_ptr()).value
}

/// Header of the block a payload lives in
///
/// # Safety
/// `value` must be the payload of a block, not a free-standing value.
#[inline]
pub(crate) unsafe fn header_of<T: Object>(value: &T) -> NonNull<ObjectHeader> {
    let offset = core::mem::offset_of!(Block<T>, value);
    let addr = (value as *const T).cast::<u8>().sub(offset);
    NonNull::new_unchecked(addr as *mut ObjectHeader)
}

/// Allocate and construct a block in the given label, with zero shared count.
pub(crate) fn allocate<T: Object>(value: T, label: *mut ObjectHeader) -> NonNull<ObjectHeader> {
    let info = type_info::<T>();
    debug_assert!(info.align <= allocator::BLOCK_ALIGN, "over-aligned object type");

    let owner = allocator::heap();
    let raw = allocator::allocate(info.size).cast::<Block<T>>();
    unsafe {
        raw.as_ptr().write(Block {
            header: ObjectHeader::new(info, owner, label),
            value,
        });
    }
    raw.cast()
}

/// Create an object in the current context
pub fn create<T: Object>(value: T) -> Shared<T> {
    let header = allocate(value, context::current_raw().as_ptr());
    unsafe { Shared::from_header_acquire(header) }
}

static FREEZE_LOCK: ReentrantMutex<()> = parking_lot::const_reentrant_mutex(());

/// Serializes freezes so overlapping subgraphs are never frozen concurrently
pub fn freeze_lock() -> ReentrantMutexGuard<'static, ()> {
    FREEZE_LOCK.lock()
}

unsafe fn name_block<T: Object>(header: NonNull<ObjectHeader>) -> &'static str {
    value::<T>(header).class_name()
}

unsafe fn copy_block<T: Object>(
    header: NonNull<ObjectHeader>,
    label: *mut ObjectHeader,
) -> NonNull<ObjectHeader> {
    let cloned = value::<T>(header).clone();
    allocate(cloned, label)
}

unsafe fn accept_block<T: Object>(header: NonNull<ObjectHeader>, visitor: &mut dyn Visitor) {
    value::<T>(header).accept(visitor);
}

unsafe fn finalize_block<T: Object>(header: NonNull<ObjectHeader>) {
    value::<T>(header).finalize(header.as_ref());
}

unsafe fn drop_block<T: Object>(header: NonNull<ObjectHeader>) {
    let block = header.cast::<Block<T>>().as_ptr();
    core::ptr::drop_in_place(core::ptr::addr_of_mut!((*block).value));
}
