//! Array shapes - lengths and strides over a flat buffer

/// One dimension of a shape
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Dim {
    pub length: usize,
    pub stride: usize,
}

/// Maps a multi-dimensional index to a buffer position: `offset` plus the
/// sum of index times stride over all dimensions.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Shape {
    dims: Vec<Dim>,
    offset: usize,
}

impl Shape {
    /// Row-major shape with the given lengths
    pub fn dense(lengths: &[usize]) -> Self {
        let mut dims = Vec::with_capacity(lengths.len());
        let mut stride = 1;
        for &length in lengths.iter().rev() {
            dims.push(Dim { length, stride });
            stride *= length;
        }
        dims.reverse();
        Self { dims, offset: 0 }
    }

    /// Shape with explicit dimensions
    pub fn new(dims: Vec<Dim>, offset: usize) -> Self {
        Self { dims, offset }
    }

    /// Zero-dimensional shape holding one element
    pub fn scalar() -> Self {
        Self::default()
    }

    #[inline]
    pub fn rank(&self) -> usize {
        self.dims.len()
    }

    #[inline]
    pub fn dims(&self) -> &[Dim] {
        &self.dims
    }

    #[inline]
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Number of elements
    pub fn size(&self) -> usize {
        self.dims.iter().map(|d| d.length).product()
    }

    /// Buffer length needed to hold every element
    pub fn volume(&self) -> usize {
        if self.size() == 0 {
            return self.offset;
        }
        self.offset
            + self
                .dims
                .iter()
                .map(|d| (d.length - 1) * d.stride)
                .sum::<usize>()
            + 1
    }

    /// Buffer position of `index`, or `None` if it is out of bounds
    pub fn serial(&self, index: &[usize]) -> Option<usize> {
        if index.len() != self.dims.len() {
            return None;
        }
        let mut position = self.offset;
        for (&i, dim) in index.iter().zip(&self.dims) {
            if i >= dim.length {
                return None;
            }
            position += i * dim.stride;
        }
        Some(position)
    }

    /// Buffer position of the `n`th element in row-major order
    pub(crate) fn serial_of(&self, mut n: usize) -> usize {
        let mut position = self.offset;
        for dim in self.dims.iter().rev() {
            if dim.length == 0 {
                return position;
            }
            position += (n % dim.length) * dim.stride;
            n /= dim.length;
        }
        position
    }

    /// Whether elements are contiguous in row-major order from the offset
    pub fn is_dense(&self) -> bool {
        let mut stride = 1;
        for dim in self.dims.iter().rev() {
            if dim.length > 1 && dim.stride != stride {
                return false;
            }
            stride *= dim.length;
        }
        true
    }

    /// Dense shape with the same lengths
    pub fn compact(&self) -> Self {
        let lengths: Vec<usize> = self.dims.iter().map(|d| d.length).collect();
        Self::dense(&lengths)
    }

    /// Swap the two dimensions of a matrix; `None` for other ranks
    pub fn transpose(&self) -> Option<Self> {
        match self.dims.as_slice() {
            [rows, cols] => Some(Self {
                dims: vec![*cols, *rows],
                offset: self.offset,
            }),
            _ => None,
        }
    }

    /// Restrict dimension `dim` to `length` elements starting at `start`
    pub fn slice(&self, dim: usize, start: usize, length: usize) -> Option<Self> {
        let d = self.dims.get(dim)?;
        if start.checked_add(length)? > d.length {
            return None;
        }
        let mut dims = self.dims.clone();
        dims[dim].length = length;
        Some(Self {
            dims,
            offset: self.offset + start * d.stride,
        })
    }
}
