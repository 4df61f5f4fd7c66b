//! Extents descriptors.

use std::fmt;

use smallvec::SmallVec;

/// Anything that describes a multi-dimensional extent.
pub trait Extents {
    fn rank(&self) -> usize;

    /// Extent of dimension `i`. Panics if `i >= rank()`.
    fn extent(&self, i: usize) -> usize;

    /// Total element count: the product of all extents (1 for rank 0).
    fn element_count(&self) -> usize {
        (0..self.rank()).map(|i| self.extent(i)).product()
    }
}

/// Row-major shape of a buffer (stack-allocated for 0-4D).
#[derive(Clone, PartialEq, Eq, Hash, Default)]
pub struct Shape {
    dims: SmallVec<[usize; 4]>,
}

impl Shape {
    pub fn new(dims: impl IntoIterator<Item = usize>) -> Self {
        Self { dims: dims.into_iter().collect() }
    }

    /// Rank-0 shape holding a single element.
    pub fn scalar() -> Self {
        Self { dims: SmallVec::new() }
    }

    /// Rank-1 shape with no elements.
    pub fn empty() -> Self {
        Self::new([0])
    }

    pub fn dims(&self) -> &[usize] {
        &self.dims
    }

    /// Row-major strides in elements.
    pub fn strides(&self) -> SmallVec<[usize; 4]> {
        let mut strides: SmallVec<[usize; 4]> = SmallVec::from_elem(1, self.dims.len());
        for i in (0..self.dims.len().saturating_sub(1)).rev() {
            strides[i] = strides[i + 1] * self.dims[i + 1];
        }
        strides
    }

    /// Linear element offset of a multi-dimensional index, or `None` if it is out of range.
    pub fn offset_of(&self, index: &[usize]) -> Option<usize> {
        if index.len() != self.dims.len() || index.iter().zip(&self.dims).any(|(i, d)| i >= d) {
            return None;
        }
        Some(index.iter().zip(self.strides()).map(|(i, s)| i * s).sum())
    }
}

impl Extents for Shape {
    fn rank(&self) -> usize {
        self.dims.len()
    }

    fn extent(&self, i: usize) -> usize {
        self.dims[i]
    }
}

impl<const N: usize> Extents for [usize; N] {
    fn rank(&self) -> usize {
        N
    }

    fn extent(&self, i: usize) -> usize {
        self[i]
    }
}

impl Extents for [usize] {
    fn rank(&self) -> usize {
        self.len()
    }

    fn extent(&self, i: usize) -> usize {
        self[i]
    }
}

impl Extents for Vec<usize> {
    fn rank(&self) -> usize {
        self.len()
    }

    fn extent(&self, i: usize) -> usize {
        self[i]
    }
}

impl fmt::Debug for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Shape{:?}", self.dims.as_slice())
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.dims.as_slice())
    }
}

impl<const N: usize> From<[usize; N]> for Shape {
    fn from(dims: [usize; N]) -> Self {
        Self::new(dims)
    }
}

impl From<Vec<usize>> for Shape {
    fn from(dims: Vec<usize>) -> Self {
        Self { dims: SmallVec::from_vec(dims) }
    }
}

impl From<&[usize]> for Shape {
    fn from(dims: &[usize]) -> Self {
        Self { dims: SmallVec::from_slice(dims) }
    }
}
