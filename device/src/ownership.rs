//! The two storage flavours behind a [`Buffer`](crate::Buffer): memory it owns and memory it merely points at.

use std::fmt;
use std::marker::PhantomData;
use std::ptr::NonNull;
use std::sync::Arc;

use mdbuf_dtype::tag::{DeviceTag, MemoryTag};
use mdbuf_dtype::{DeviceKind, Element, ExecutionDeviceId, Extents, MemoryKind, Shape};

use crate::allocator::MemoryResource;
use crate::error::{Result, SizeOverflowSnafu};
use crate::session::Session;
use crate::stream::ExecutionStream;
use crate::view::{BufferView, BufferViewMut};

/// View over caller-supplied memory of kind `M`. Never frees anything.
pub struct NonOwningBuffer<T: Element, M: MemoryTag> {
    data: *mut T,
    shape: Shape,
    _memory: PhantomData<M>,
}

impl<T: Element, M: MemoryTag> NonOwningBuffer<T, M> {
    /// # Safety
    ///
    /// `data` must be valid for `shape.element_count()` elements in memory of kind `M` and must outlive the
    /// returned value. A null pointer is only allowed for an empty shape.
    pub unsafe fn new(data: *mut T, shape: Shape) -> Self {
        Self { data, shape, _memory: PhantomData }
    }

    pub fn get(&self) -> *mut T {
        self.data
    }

    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    pub fn memory_kind(&self) -> MemoryKind {
        M::KIND
    }

    pub fn view(&self) -> BufferView<'_, T> {
        BufferView::new(self.data, &self.shape, M::KIND)
    }

    pub fn view_mut(&mut self) -> BufferViewMut<'_, T> {
        BufferViewMut::new(self.data, &self.shape, M::KIND)
    }
}

impl<T: Element, M: MemoryTag> fmt::Debug for NonOwningBuffer<T, M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NonOwningBuffer")
            .field("memory_kind", &M::KIND)
            .field("data", &self.data)
            .field("shape", &self.shape)
            .finish()
    }
}

/// Allocation on device kind `D`, released when dropped.
///
/// Allocates from the session's resource for `D` and frees back into that same resource, on the stream that
/// was current at construction, even if the session has since registered a different resource.
pub struct OwningBuffer<T: Element, D: DeviceTag> {
    data: NonNull<T>,
    bytes: usize,
    shape: Shape,
    device: ExecutionDeviceId<D>,
    resource: Arc<dyn MemoryResource>,
    stream: ExecutionStream,
}

impl<T: Element, D: DeviceTag> OwningBuffer<T, D> {
    pub fn new(session: &Session, shape: Shape) -> Result<Self> {
        let count = shape.element_count();
        let element_size = size_of::<T>();
        let Some(bytes) = count.checked_mul(element_size) else {
            return SizeOverflowSnafu { count, element_size }.fail();
        };

        let resource = session.memory_resource_for(D::KIND)?;
        let stream = session.stream().clone();
        let raw = resource.allocate(bytes, &stream)?;
        // Zero-byte blocks are dangling; keep them aligned for `T`.
        let data = if bytes == 0 { NonNull::dangling() } else { raw.cast() };

        let device = match D::KIND {
            DeviceKind::Cpu => ExecutionDeviceId::default(),
            DeviceKind::Accelerator => ExecutionDeviceId::new(session.device().id),
        };

        tracing::debug!(device = ?device, %shape, bytes, resource = resource.name(), "owning buffer allocated");
        Ok(Self { data, bytes, shape, device, resource, stream })
    }

    pub fn get(&self) -> *mut T {
        self.data.as_ptr()
    }

    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    pub fn device_id(&self) -> ExecutionDeviceId<D> {
        self.device
    }

    /// Size of the allocation in bytes.
    pub fn bytes(&self) -> usize {
        self.bytes
    }

    pub fn memory_kind(&self) -> MemoryKind {
        D::KIND.owned_memory_kind()
    }

    pub fn view(&self) -> BufferView<'_, T> {
        BufferView::new(self.data.as_ptr(), &self.shape, self.memory_kind())
    }

    pub fn view_mut(&mut self) -> BufferViewMut<'_, T> {
        let memory_kind = self.memory_kind();
        BufferViewMut::new(self.data.as_ptr(), &self.shape, memory_kind)
    }
}

impl<T: Element, D: DeviceTag> Drop for OwningBuffer<T, D> {
    fn drop(&mut self) {
        unsafe { self.resource.deallocate(self.data.cast(), self.bytes, &self.stream) };
    }
}

impl<T: Element, D: DeviceTag> fmt::Debug for OwningBuffer<T, D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OwningBuffer")
            .field("device", &self.device)
            .field("data", &self.data)
            .field("bytes", &self.bytes)
            .field("shape", &self.shape)
            .field("resource", &self.resource.name())
            .finish()
    }
}
