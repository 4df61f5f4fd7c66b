//! Shape- and memory-kind-aware views handed to compute code.

use std::fmt;
use std::marker::PhantomData;

use mdbuf_dtype::{Element, Extents, MemoryKind, Shape};
use smallvec::SmallVec;
use snafu::ensure;

use crate::error::{NotHostAccessibleSnafu, Result};

/// Read-only view borrowed from a buffer.
///
/// The pointer may address device memory; only host-accessible views can be turned into slices.
#[derive(Clone, Copy)]
pub struct BufferView<'a, T: Element> {
    data: *const T,
    shape: &'a Shape,
    memory_kind: MemoryKind,
    _marker: PhantomData<&'a T>,
}

impl<'a, T: Element> BufferView<'a, T> {
    pub(crate) fn new(data: *const T, shape: &'a Shape, memory_kind: MemoryKind) -> Self {
        Self { data, shape, memory_kind, _marker: PhantomData }
    }

    pub fn as_ptr(&self) -> *const T {
        self.data
    }

    pub fn shape(&self) -> &'a Shape {
        self.shape
    }

    pub fn rank(&self) -> usize {
        self.shape.rank()
    }

    pub fn extent(&self, i: usize) -> usize {
        self.shape.extent(i)
    }

    /// Row-major strides in elements.
    pub fn strides(&self) -> SmallVec<[usize; 4]> {
        self.shape.strides()
    }

    pub fn len(&self) -> usize {
        self.shape.element_count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn memory_kind(&self) -> MemoryKind {
        self.memory_kind
    }

    /// The elements as a host slice. Fails for device-only memory.
    pub fn as_slice(&self) -> Result<&'a [T]> {
        ensure!(
            self.memory_kind.is_host_accessible(),
            NotHostAccessibleSnafu { operation: "as_slice", memory_kind: self.memory_kind }
        );
        let len = self.len();
        if len == 0 {
            return Ok(&[]);
        }
        Ok(unsafe { std::slice::from_raw_parts(self.data, len) })
    }

    /// Element at a multi-dimensional index, `None` if out of range. Fails for device-only memory.
    pub fn get(&self, index: &[usize]) -> Result<Option<&'a T>> {
        let slice = self.as_slice()?;
        Ok(self.shape.offset_of(index).map(|offset| &slice[offset]))
    }
}

impl<T: Element> fmt::Debug for BufferView<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BufferView")
            .field("data", &self.data)
            .field("shape", self.shape)
            .field("memory_kind", &self.memory_kind)
            .finish()
    }
}

/// Mutable view borrowed from a buffer.
pub struct BufferViewMut<'a, T: Element> {
    data: *mut T,
    shape: &'a Shape,
    memory_kind: MemoryKind,
    _marker: PhantomData<&'a mut T>,
}

impl<'a, T: Element> BufferViewMut<'a, T> {
    pub(crate) fn new(data: *mut T, shape: &'a Shape, memory_kind: MemoryKind) -> Self {
        Self { data, shape, memory_kind, _marker: PhantomData }
    }

    pub fn as_mut_ptr(&mut self) -> *mut T {
        self.data
    }

    pub fn shape(&self) -> &'a Shape {
        self.shape
    }

    pub fn len(&self) -> usize {
        self.shape.element_count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn memory_kind(&self) -> MemoryKind {
        self.memory_kind
    }

    /// Reborrow as a read-only view.
    pub fn as_view(&self) -> BufferView<'_, T> {
        BufferView::new(self.data, self.shape, self.memory_kind)
    }

    /// The elements as a mutable host slice. Fails for device-only memory.
    pub fn as_mut_slice(&mut self) -> Result<&mut [T]> {
        ensure!(
            self.memory_kind.is_host_accessible(),
            NotHostAccessibleSnafu { operation: "as_mut_slice", memory_kind: self.memory_kind }
        );
        let len = self.len();
        if len == 0 {
            return Ok(&mut []);
        }
        Ok(unsafe { std::slice::from_raw_parts_mut(self.data, len) })
    }

    pub fn get_mut(&mut self, index: &[usize]) -> Result<Option<&mut T>> {
        let offset = self.shape.offset_of(index);
        let slice = self.as_mut_slice()?;
        Ok(offset.map(|offset| &mut slice[offset]))
    }
}

impl<T: Element> fmt::Debug for BufferViewMut<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BufferViewMut")
            .field("data", &self.data)
            .field("shape", self.shape)
            .field("memory_kind", &self.memory_kind)
            .finish()
    }
}
