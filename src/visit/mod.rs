//! Member traversal - one capability, many structural operations
//!
//! Design: A class lists its members once by implementing `Traversable`.
//! Every structural operation (copy repair, freeze, finish, recycle,
//! discard, restore and the cycle collector phases) is a `Visitor` that
//! receives each pointer edge through the object-safe `Edge` interface.
//! Containers (`Option`, `Vec`, `Box`, arrays, tuples, `Array`) forward to
//! their elements; plain values have no edges.

pub mod visitors;

use crate::object::ObjectHeader;
use crate::ptr::ContextPtr;
use core::ptr::NonNull;
use core::sync::atomic::AtomicBool;

/// A pointer edge as seen by visitors
pub trait Edge {
    /// Current raw target, if any
    fn target(&self) -> Option<NonNull<ObjectHeader>>;

    /// Whether the edge owns a shared reference (as opposed to weak)
    fn is_strong(&self) -> bool;

    /// Label the edge resolves against
    fn context(&self) -> &ContextPtr;

    /// Freeze the current target without resolving it first.
    ///
    /// Callers hold `object::freeze_lock()`.
    fn freeze_target(&self);

    /// Resolve for write and finish the resolved target
    fn finish(&self);

    /// Take the target out without releasing its reference
    fn detach(&self) -> Option<NonNull<ObjectHeader>>;
}

/// A structural operation applied to every edge of an object
pub trait Visitor {
    fn visit(&mut self, edge: &dyn Edge);

    /// The frozen flag of a `Mutable` field. Only freezing and recycling
    /// act on it.
    #[inline]
    fn visit_cell(&mut self, _frozen: &AtomicBool) {}
}

/// Member-list traversal of a class
pub trait Traversable {
    /// Call `Member::accept_member` on every field that may hold pointers
    /// and on every `Mutable` field.
    fn accept(&self, _visitor: &mut dyn Visitor) {}
}

/// A field that can appear in a member list
pub trait Member {
    fn accept_member(&self, visitor: &mut dyn Visitor);
}

impl<M: Member> Member for Option<M> {
    #[inline]
    fn accept_member(&self, visitor: &mut dyn Visitor) {
        if let Some(member) = self {
            member.accept_member(visitor);
        }
    }
}

impl<M: Member> Member for Vec<M> {
    fn accept_member(&self, visitor: &mut dyn Visitor) {
        for member in self {
            member.accept_member(visitor);
        }
    }
}

impl<M: Member> Member for Box<M> {
    #[inline]
    fn accept_member(&self, visitor: &mut dyn Visitor) {
        (**self).accept_member(visitor);
    }
}

impl<M: Member, const N: usize> Member for [M; N] {
    fn accept_member(&self, visitor: &mut dyn Visitor) {
        for member in self {
            member.accept_member(visitor);
        }
    }
}

/// Implement `Traversable` for a struct by listing its pointer-bearing
/// and `Mutable` fields.
///
/// ```ignore
/// members!(Node { left, right, count });
/// ```
#[macro_export]
macro_rules! members {
    ($ty:ty { $($field:ident),* $(,)? }) => {
        impl $crate::visit::Traversable for $ty {
            fn accept(&self, _visitor: &mut dyn $crate::visit::Visitor) {
                $( $crate::visit::Member::accept_member(&self.$field, _visitor); )*
            }
        }
    };
}

macro_rules! tuple_members {
    ($($name:ident),+) => {
        impl<$($name: Member),+> Member for ($($name,)+) {
            #[allow(non_snake_case)]
            fn accept_member(&self, visitor: &mut dyn Visitor) {
                let ($($name,)+) = self;
                $($name.accept_member(visitor);)+
            }
        }
    };
}

tuple_members!(A);
tuple_members!(A, B);
tuple_members!(A, B, C);
tuple_members!(A, B, C, D);

macro_rules! value_members {
    ($($ty:ty),* $(,)?) => {
        $(
            impl Member for $ty {
                #[inline(always)]
                fn accept_member(&self, _visitor: &mut dyn Visitor) {}
            }
        )*
    };
}

value_members!(
    (), bool, char, u8, u16, u32, u64, u128, usize, i8, i16, i32, i64, i128, isize, f32, f64,
    String, &'static str,
);
