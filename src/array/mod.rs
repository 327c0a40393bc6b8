//! Arrays - shaped value containers usable as object members
//!
//! Design: A flat buffer plus a `Shape`. Arrays are values: cloning copies
//! the elements, and the member traversal visits every element so arrays of
//! lazy pointers take part in copy, freeze and finish like any other field.

mod shape;

pub use shape::{Dim, Shape};

use crate::visit::{Member, Visitor};

#[derive(Debug, Clone, PartialEq)]
pub struct Array<T> {
    buffer: Vec<T>,
    shape: Shape,
}

impl<T> Array<T> {
    /// One-dimensional array over `values`
    pub fn from_vec(values: Vec<T>) -> Self {
        let shape = Shape::dense(&[values.len()]);
        Self {
            buffer: values,
            shape,
        }
    }

    /// Empty one-dimensional array
    pub fn new() -> Self {
        Self::from_vec(Vec::new())
    }

    /// Number of elements
    #[inline]
    pub fn len(&self) -> usize {
        self.shape.size()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[inline]
    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    pub fn get(&self, index: &[usize]) -> Option<&T> {
        self.shape.serial(index).and_then(|i| self.buffer.get(i))
    }

    pub fn get_mut(&mut self, index: &[usize]) -> Option<&mut T> {
        self.shape.serial(index).and_then(|i| self.buffer.get_mut(i))
    }

    /// Replace the element at `index`, returning the previous one
    pub fn set(&mut self, index: &[usize], value: T) -> Option<T> {
        self.get_mut(index).map(|slot| core::mem::replace(slot, value))
    }

    /// Elements in row-major index order
    pub fn iter(&self) -> impl Iterator<Item = &T> + '_ {
        (0..self.len()).filter_map(move |n| self.buffer.get(self.shape.serial_of(n)))
    }

    /// Whether the buffer is exactly the elements, in order
    fn is_packed(&self) -> bool {
        self.shape.offset() == 0 && self.shape.is_dense() && self.buffer.len() == self.len()
    }
}

impl<T: Clone> Array<T> {
    /// Array of the given shape with every element set to `value`
    pub fn from_shape(shape: Shape, value: T) -> Self {
        Self {
            buffer: vec![value; shape.volume()],
            shape,
        }
    }

    /// Set every element to `value`
    pub fn fill(&mut self, value: T) {
        for n in 0..self.len() {
            let i = self.shape.serial_of(n);
            if let Some(slot) = self.buffer.get_mut(i) {
                *slot = value.clone();
            }
        }
    }

    /// Copy into a packed buffer with a dense shape
    pub fn compact(&self) -> Self {
        Self {
            buffer: self.iter().cloned().collect(),
            shape: self.shape.compact(),
        }
    }

    /// Append to a one-dimensional array. Returns false for other ranks.
    pub fn push(&mut self, value: T) -> bool {
        if self.shape.rank() != 1 {
            return false;
        }
        if !self.is_packed() {
            *self = self.compact();
        }
        self.buffer.push(value);
        self.shape = Shape::dense(&[self.buffer.len()]);
        true
    }

    /// Matrix transpose sharing no storage with `self`
    pub fn transpose(&self) -> Option<Self> {
        let shape = self.shape.transpose()?;
        Some(Self {
            buffer: self.buffer.clone(),
            shape,
        })
    }

    pub fn to_vec(&self) -> Vec<T> {
        self.iter().cloned().collect()
    }
}

impl<T> Default for Array<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> FromIterator<T> for Array<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self::from_vec(iter.into_iter().collect())
    }
}

impl<T: Member> Member for Array<T> {
    fn accept_member(&self, visitor: &mut dyn Visitor) {
        for element in self.iter() {
            element.accept_member(visitor);
        }
    }
}
