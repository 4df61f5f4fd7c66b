use std::alloc::Layout;
use std::fmt;
use std::ptr::NonNull;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

#[cfg(feature = "cuda")]
use cudarc::driver::{CudaContext, result, sys};
use mdbuf_dtype::{DeviceId, DeviceKind};
use parking_lot::Mutex;
#[cfg(feature = "cuda")]
use snafu::ResultExt;

use crate::device::MemoryInfo;
use crate::error::{MemoryInfoUnavailableSnafu, OutOfMemorySnafu, Result};
use crate::stream::ExecutionStream;

#[cfg(feature = "cuda")]
use crate::error::{CudaAllocationSnafu, CudaSnafu};

/// Alignment of every block handed out by the built-in resources.
pub const ALLOCATION_ALIGNMENT: usize = 256;

/// Round `bytes` up to a multiple of `alignment` (a power of two). `None` on overflow.
pub fn align_up(bytes: usize, alignment: usize) -> Option<usize> {
    debug_assert!(alignment.is_power_of_two());
    Some(bytes.checked_add(alignment - 1)? & !(alignment - 1))
}

/// A source of raw memory blocks for one device kind.
///
/// Resources compose: pools and limiters wrap an upstream `Arc<dyn MemoryResource>`.
pub trait MemoryResource: Send + Sync + fmt::Debug {
    /// Allocate `bytes` bytes, ordered on `stream`.
    ///
    /// Zero-byte requests succeed with a dangling, non-null pointer that must not be dereferenced.
    /// Host-visible memory returned here is always initialized.
    fn allocate(&self, bytes: usize, stream: &ExecutionStream) -> Result<NonNull<u8>>;

    /// Return a block to this resource.
    ///
    /// # Safety
    ///
    /// `ptr` must come from `allocate` on this same resource with the same `bytes`, and must not be used afterwards.
    unsafe fn deallocate(&self, ptr: NonNull<u8>, bytes: usize, stream: &ExecutionStream);

    fn device_kind(&self) -> DeviceKind;

    fn name(&self) -> &str;

    /// Free and total bytes of the memory this resource draws from.
    fn memory_info(&self) -> Result<MemoryInfo> {
        MemoryInfoUnavailableSnafu { resource: self.name().to_string() }.fail()
    }
}

fn host_allocate(bytes: usize, device: DeviceId) -> Result<NonNull<u8>> {
    if bytes == 0 {
        return Ok(NonNull::dangling());
    }

    let Ok(layout) = Layout::from_size_align(bytes, ALLOCATION_ALIGNMENT) else {
        return OutOfMemorySnafu { device, requested: bytes }.fail();
    };
    // Zeroed so that host views never observe uninitialized memory.
    let ptr = unsafe { std::alloc::alloc_zeroed(layout) };
    NonNull::new(ptr).ok_or_else(|| OutOfMemorySnafu { device, requested: bytes }.build())
}

/// # Safety
///
/// `ptr` must have been returned by `host_allocate(bytes, _)`.
unsafe fn host_deallocate(ptr: NonNull<u8>, bytes: usize) {
    if bytes == 0 {
        return;
    }
    // Layout was valid when the block was allocated.
    let layout = unsafe { Layout::from_size_align_unchecked(bytes, ALLOCATION_ALIGNMENT) };
    unsafe { std::alloc::dealloc(ptr.as_ptr(), layout) };
}

/// Host allocator using system memory.
#[derive(Debug, Clone, Default)]
pub struct HostMemoryResource;

impl MemoryResource for HostMemoryResource {
    fn allocate(&self, bytes: usize, _stream: &ExecutionStream) -> Result<NonNull<u8>> {
        host_allocate(bytes, DeviceId::cpu())
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>, bytes: usize, _stream: &ExecutionStream) {
        unsafe { host_deallocate(ptr, bytes) }
    }

    fn device_kind(&self) -> DeviceKind {
        DeviceKind::Cpu
    }

    fn name(&self) -> &str {
        "host"
    }
}

/// Accelerator memory emulated in host RAM with a fixed capacity.
///
/// Used when no GPU backend is compiled in. Blocks are plain host allocations, so every transfer pairing
/// reduces to a host memory copy, but capacity accounting and free-memory queries behave like a device.
#[derive(Debug)]
pub struct EmulatedDeviceResource {
    device: DeviceId,
    capacity: usize,
    used: AtomicUsize,
}

impl EmulatedDeviceResource {
    pub fn new(ordinal: i32, capacity: usize) -> Self {
        Self { device: DeviceId::accelerator(ordinal), capacity, used: AtomicUsize::new(0) }
    }

    pub fn device(&self) -> DeviceId {
        self.device
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn used(&self) -> usize {
        self.used.load(Ordering::Acquire)
    }
}

impl MemoryResource for EmulatedDeviceResource {
    fn allocate(&self, bytes: usize, _stream: &ExecutionStream) -> Result<NonNull<u8>> {
        let capacity = self.capacity;
        let reserved = self.used.fetch_update(Ordering::AcqRel, Ordering::Acquire, |used| {
            used.checked_add(bytes).filter(|total| *total <= capacity)
        });
        if reserved.is_err() {
            return OutOfMemorySnafu { device: self.device, requested: bytes }.fail();
        }

        host_allocate(bytes, self.device).inspect_err(|_| {
            self.used.fetch_sub(bytes, Ordering::AcqRel);
        })
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>, bytes: usize, _stream: &ExecutionStream) {
        unsafe { host_deallocate(ptr, bytes) };
        self.used.fetch_sub(bytes, Ordering::AcqRel);
    }

    fn device_kind(&self) -> DeviceKind {
        DeviceKind::Accelerator
    }

    fn name(&self) -> &str {
        "emulated"
    }

    fn memory_info(&self) -> Result<MemoryInfo> {
        let used = self.used();
        Ok(MemoryInfo { free: self.capacity.saturating_sub(used), total: self.capacity })
    }
}

/// CUDA allocator using stream-ordered device memory.
#[cfg(feature = "cuda")]
#[derive(Debug, Clone)]
pub struct CudaMemoryResource {
    context: Arc<CudaContext>,
    device: DeviceId,
}

#[cfg(feature = "cuda")]
impl CudaMemoryResource {
    pub fn new(ordinal: usize) -> Result<Self> {
        let context = CudaContext::new(ordinal).context(CudaSnafu)?;
        Ok(Self { context, device: DeviceId::accelerator(ordinal as i32) })
    }

    pub fn context(&self) -> &Arc<CudaContext> {
        &self.context
    }

    fn cu_stream(&self, stream: &ExecutionStream) -> sys::CUstream {
        match stream.as_cuda() {
            Some(stream) => stream.cu_stream(),
            None => self.context.default_stream().cu_stream(),
        }
    }
}

#[cfg(feature = "cuda")]
impl MemoryResource for CudaMemoryResource {
    fn allocate(&self, bytes: usize, stream: &ExecutionStream) -> Result<NonNull<u8>> {
        if bytes == 0 {
            return Ok(NonNull::dangling());
        }

        self.context.bind_to_thread().context(CudaSnafu)?;
        let cu_stream = self.cu_stream(stream);
        let dptr = unsafe { result::malloc_async(cu_stream, bytes) }.context(CudaAllocationSnafu { requested: bytes })?;
        unsafe { result::memset_d8_async(dptr, 0, bytes, cu_stream) }.context(CudaSnafu)?;

        NonNull::new(dptr as usize as *mut u8)
            .ok_or_else(|| OutOfMemorySnafu { device: self.device, requested: bytes }.build())
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>, bytes: usize, stream: &ExecutionStream) {
        if bytes == 0 {
            return;
        }

        let cu_stream = self.cu_stream(stream);
        if let Err(err) = unsafe { result::free_async(ptr.as_ptr() as usize as sys::CUdeviceptr, cu_stream) } {
            tracing::warn!(device = %self.device, bytes, error = %err, "CUDA free failed");
        }
    }

    fn device_kind(&self) -> DeviceKind {
        DeviceKind::Accelerator
    }

    fn name(&self) -> &str {
        "cuda"
    }

    fn memory_info(&self) -> Result<MemoryInfo> {
        let info = self.context.bind_to_thread().and_then(|_| result::mem_get_info());
        match info {
            Ok((free, total)) => Ok(MemoryInfo { free, total }),
            Err(err) => MemoryInfoUnavailableSnafu { resource: format!("cuda ({err})") }.fail(),
        }
    }
}

/// Counters kept by [`StatisticsResourceAdaptor`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AllocationStatistics {
    pub allocations: usize,
    pub deallocations: usize,
    pub current_bytes: usize,
    pub peak_bytes: usize,
    pub total_bytes: usize,
}

/// Decorator that records allocation counts and byte totals of its upstream.
#[derive(Debug)]
pub struct StatisticsResourceAdaptor {
    upstream: Arc<dyn MemoryResource>,
    stats: Mutex<AllocationStatistics>,
    name: String,
}

impl StatisticsResourceAdaptor {
    pub fn new(upstream: Arc<dyn MemoryResource>) -> Self {
        let name = format!("statistics<{}>", upstream.name());
        Self { upstream, stats: Mutex::new(AllocationStatistics::default()), name }
    }

    pub fn upstream(&self) -> &Arc<dyn MemoryResource> {
        &self.upstream
    }

    pub fn statistics(&self) -> AllocationStatistics {
        *self.stats.lock()
    }
}

impl MemoryResource for StatisticsResourceAdaptor {
    fn allocate(&self, bytes: usize, stream: &ExecutionStream) -> Result<NonNull<u8>> {
        let ptr = self.upstream.allocate(bytes, stream)?;

        let mut stats = self.stats.lock();
        stats.allocations += 1;
        stats.current_bytes += bytes;
        stats.total_bytes += bytes;
        stats.peak_bytes = stats.peak_bytes.max(stats.current_bytes);
        Ok(ptr)
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>, bytes: usize, stream: &ExecutionStream) {
        unsafe { self.upstream.deallocate(ptr, bytes, stream) };

        let mut stats = self.stats.lock();
        stats.deallocations += 1;
        stats.current_bytes = stats.current_bytes.saturating_sub(bytes);
    }

    fn device_kind(&self) -> DeviceKind {
        self.upstream.device_kind()
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn memory_info(&self) -> Result<MemoryInfo> {
        self.upstream.memory_info()
    }
}
