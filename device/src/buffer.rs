use std::fmt;

use mdbuf_dtype::tag;
use mdbuf_dtype::{DeviceKind, Element, Extents, MemoryKind, Shape};
use snafu::ensure;

use crate::copy::{buffer_copy, copy_all};
use crate::error::{Result, SizeMismatchSnafu};
use crate::ownership::{NonOwningBuffer, OwningBuffer};
use crate::session::Session;
use crate::view::{BufferView, BufferViewMut};

/// The five storage variants a buffer can be in.
enum Storage<T: Element> {
    Host(NonOwningBuffer<T, tag::Host>),
    Device(NonOwningBuffer<T, tag::Device>),
    Managed(NonOwningBuffer<T, tag::Managed>),
    OwnedCpu(OwningBuffer<T, tag::Cpu>),
    OwnedAccelerator(OwningBuffer<T, tag::Accelerator>),
}

impl<T: Element> Storage<T> {
    fn as_ptr(&self) -> *mut T {
        match self {
            Storage::Host(buffer) => buffer.get(),
            Storage::Device(buffer) => buffer.get(),
            Storage::Managed(buffer) => buffer.get(),
            Storage::OwnedCpu(buffer) => buffer.get(),
            Storage::OwnedAccelerator(buffer) => buffer.get(),
        }
    }

    fn is_owning(&self) -> bool {
        matches!(self, Storage::OwnedCpu(_) | Storage::OwnedAccelerator(_))
    }

    fn view(&self) -> BufferView<'_, T> {
        match self {
            Storage::Host(buffer) => buffer.view(),
            Storage::Device(buffer) => buffer.view(),
            Storage::Managed(buffer) => buffer.view(),
            Storage::OwnedCpu(buffer) => buffer.view(),
            Storage::OwnedAccelerator(buffer) => buffer.view(),
        }
    }

    fn view_mut(&mut self) -> BufferViewMut<'_, T> {
        match self {
            Storage::Host(buffer) => buffer.view_mut(),
            Storage::Device(buffer) => buffer.view_mut(),
            Storage::Managed(buffer) => buffer.view_mut(),
            Storage::OwnedCpu(buffer) => buffer.view_mut(),
            Storage::OwnedAccelerator(buffer) => buffer.view_mut(),
        }
    }
}

impl<T: Element> fmt::Debug for Storage<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Storage::Host(buffer) => fmt::Debug::fmt(buffer, f),
            Storage::Device(buffer) => fmt::Debug::fmt(buffer, f),
            Storage::Managed(buffer) => fmt::Debug::fmt(buffer, f),
            Storage::OwnedCpu(buffer) => fmt::Debug::fmt(buffer, f),
            Storage::OwnedAccelerator(buffer) => fmt::Debug::fmt(buffer, f),
        }
    }
}

/// A container that may or may not own its data, on the host or on an accelerator.
///
/// Element type is fixed statically; where the bytes live and who frees them is decided per instance at runtime.
/// Owning buffers allocate CPU memory from the session's host memory resource and accelerator memory from the
/// session's workspace resource.
///
/// This type is `!Send + !Sync`: it may hold raw pointers into memory it does not own.
///
/// # Example
///
/// ```ignore
/// let session = Session::new()?;
/// let x = Buffer::<f32>::new(&session, [1024], MemoryKind::Device)?;
/// let y = Buffer::copy_of(&session, &x, MemoryKind::Host)?;
/// assert_eq!(y.view().as_slice()?.len(), 1024);
/// ```
pub struct Buffer<T: Element> {
    device_kind: DeviceKind,
    shape: Shape,
    storage: Storage<T>,
    length: usize,
    memory_kind: MemoryKind,
    /// Pointer of the active storage variant, refreshed whenever `storage` is replaced.
    cached_ptr: *mut T,
}

impl<T: Element> Buffer<T> {
    fn from_storage(storage: Storage<T>, shape: Shape, memory_kind: MemoryKind) -> Self {
        let cached_ptr = storage.as_ptr();
        let length = shape.element_count();
        Self { device_kind: memory_kind.device_kind(), shape, storage, length, memory_kind, cached_ptr }
    }

    fn owning(session: &Session, shape: Shape, memory_kind: MemoryKind) -> Result<Self> {
        let device_kind = memory_kind.device_kind();
        let storage = match device_kind {
            DeviceKind::Cpu => Storage::OwnedCpu(OwningBuffer::new(session, shape.clone())?),
            DeviceKind::Accelerator => Storage::OwnedAccelerator(OwningBuffer::new(session, shape.clone())?),
        };
        if memory_kind == MemoryKind::Managed {
            tracing::debug!(%shape, "owning buffers are never managed, allocating device memory");
        }
        Ok(Self::from_storage(storage, shape, device_kind.owned_memory_kind()))
    }

    /// Allocate an uninitialized-by-contract owning buffer.
    ///
    /// Device-accessible kinds allocate on the accelerator. Owning storage is never managed: requesting
    /// [`MemoryKind::Managed`] yields a buffer reporting [`MemoryKind::Device`].
    pub fn new(session: &Session, shape: impl Into<Shape>, memory_kind: MemoryKind) -> Result<Self> {
        Self::owning(session, shape.into(), memory_kind)
    }

    /// Wrap caller-supplied memory without taking ownership.
    ///
    /// The location of `data` is not validated against `memory_kind`.
    ///
    /// # Safety
    ///
    /// `data` must point to `shape.element_count()` elements living in memory of kind `memory_kind`, and must
    /// stay valid, and not be accessed through other paths in conflicting ways, for the life of the buffer.
    pub unsafe fn from_raw_parts(data: *mut T, shape: impl Into<Shape>, memory_kind: MemoryKind) -> Self {
        let shape = shape.into();
        let storage = unsafe {
            match memory_kind {
                MemoryKind::Host => Storage::Host(NonOwningBuffer::new(data, shape.clone())),
                MemoryKind::Device => Storage::Device(NonOwningBuffer::new(data, shape.clone())),
                MemoryKind::Managed => Storage::Managed(NonOwningBuffer::new(data, shape.clone())),
            }
        };
        Self::from_storage(storage, shape, memory_kind)
    }

    /// Owning copy of `other` at `memory_kind`.
    ///
    /// Always allocates and copies, even when `memory_kind` matches `other`. The copy is issued on the session
    /// stream and is complete once that stream reaches it.
    pub fn copy_of(session: &Session, other: &Buffer<T>, memory_kind: MemoryKind) -> Result<Self> {
        let buffer = Self::owning(session, other.shape.clone(), memory_kind)?;
        tracing::debug!(from = %other.memory_kind, to = %buffer.memory_kind, len = other.length, "copying buffer");
        unsafe {
            buffer_copy(
                session,
                buffer.cached_ptr,
                other.data_handle(),
                other.length,
                buffer.device_kind,
                other.device_kind,
            )?;
        }
        Ok(buffer)
    }

    /// Take `other` to `memory_kind`, moving it if it is already there.
    ///
    /// A matching memory kind hands back `other` untouched, with no allocation and no copy. Otherwise this
    /// behaves like [`copy_of`](Self::copy_of) and `other` is released afterwards.
    pub fn relocate(session: &Session, other: Buffer<T>, memory_kind: MemoryKind) -> Result<Self> {
        if memory_kind == other.memory_kind {
            return Ok(other);
        }
        Self::copy_of(session, &other, memory_kind)
    }

    /// Owning copy of host data at `memory_kind`.
    pub fn from_host_slice(
        session: &Session,
        data: &[T],
        shape: impl Into<Shape>,
        memory_kind: MemoryKind,
    ) -> Result<Self> {
        let shape = shape.into();
        ensure!(
            shape.element_count() == data.len(),
            SizeMismatchSnafu { expected: shape.element_count(), actual: data.len() }
        );
        // Only read through this wrapper.
        let source = unsafe { Self::from_raw_parts(data.as_ptr().cast_mut(), shape, MemoryKind::Host) };
        Self::copy_of(session, &source, memory_kind)
    }

    /// Owning copy at the same memory kind.
    pub fn try_clone(&self, session: &Session) -> Result<Self> {
        Self::copy_of(session, self, self.memory_kind)
    }

    /// Copy-assign: replace `self` with an independent copy of `other`.
    ///
    /// On failure `self` is left unchanged.
    pub fn clone_from_buffer(&mut self, session: &Session, other: &Buffer<T>) -> Result<()> {
        let mut copy = Self::copy_of(session, other, other.memory_kind)?;
        std::mem::swap(self, &mut copy);
        Ok(())
    }

    /// Read the contents back to the host, waiting for the session stream.
    pub fn to_vec(&self, session: &Session) -> Result<Vec<T>> {
        let mut out = vec![T::default(); self.length];
        {
            let mut host = unsafe { Buffer::from_raw_parts(out.as_mut_ptr(), self.shape.clone(), MemoryKind::Host) };
            copy_all(session, &mut host, self)?;
        }
        session.synchronize()?;
        Ok(out)
    }

    /// Raw pointer to the first element. May be a device address.
    pub fn data_handle(&self) -> *mut T {
        debug_assert_eq!(self.cached_ptr, self.storage.as_ptr());
        self.cached_ptr
    }

    pub fn view(&self) -> BufferView<'_, T> {
        self.storage.view()
    }

    pub fn view_mut(&mut self) -> BufferViewMut<'_, T> {
        self.storage.view_mut()
    }

    /// Number of elements.
    pub fn size(&self) -> usize {
        self.length
    }

    pub fn len(&self) -> usize {
        self.length
    }

    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    pub fn memory_kind(&self) -> MemoryKind {
        self.memory_kind
    }

    pub fn device_kind(&self) -> DeviceKind {
        self.device_kind
    }

    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    pub fn is_owning(&self) -> bool {
        self.storage.is_owning()
    }
}

impl<T: Element> Default for Buffer<T> {
    /// Empty, non-owning host buffer with a null pointer.
    fn default() -> Self {
        let storage = Storage::Host(unsafe { NonOwningBuffer::new(std::ptr::null_mut(), Shape::empty()) });
        Self::from_storage(storage, Shape::empty(), MemoryKind::Host)
    }
}

impl<T: Element> fmt::Debug for Buffer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Buffer")
            .field("dtype", &T::DTYPE)
            .field("memory_kind", &self.memory_kind)
            .field("device_kind", &self.device_kind)
            .field("length", &self.length)
            .field("storage", &self.storage)
            .finish()
    }
}
