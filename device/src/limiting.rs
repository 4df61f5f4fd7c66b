use std::ptr::NonNull;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use mdbuf_dtype::DeviceKind;

use crate::allocator::{ALLOCATION_ALIGNMENT, MemoryResource, align_up};
use crate::device::MemoryInfo;
use crate::error::{AllocationLimitSnafu, InvalidAlignmentSnafu, Result, SizeOverflowSnafu};
use crate::stream::ExecutionStream;

/// Charge granularity for a requested alignment.
///
/// Defaults to [`ALLOCATION_ALIGNMENT`] and is raised to the next power of two. Fails with
/// [`Error::InvalidAlignment`](crate::Error::InvalidAlignment) when no such power of two fits in `usize`.
pub fn resolve_alignment(alignment: Option<usize>) -> Result<usize> {
    let requested = alignment.unwrap_or(ALLOCATION_ALIGNMENT);
    requested.max(1).checked_next_power_of_two().ok_or_else(|| InvalidAlignmentSnafu { alignment: requested }.build())
}

/// Decorator that caps the total bytes outstanding through it.
///
/// Each request is charged at its size rounded up to `alignment`. A request that would take the outstanding
/// total past `allocation_limit` fails without reaching upstream.
#[derive(Debug)]
pub struct LimitingResourceAdaptor {
    upstream: Arc<dyn MemoryResource>,
    allocation_limit: usize,
    alignment: usize,
    allocated: AtomicUsize,
    name: String,
}

impl LimitingResourceAdaptor {
    /// Wrap `upstream` with a ceiling of `allocation_limit` bytes.
    ///
    /// `alignment` is resolved with [`resolve_alignment`].
    pub fn new(upstream: Arc<dyn MemoryResource>, allocation_limit: usize, alignment: Option<usize>) -> Result<Self> {
        let alignment = resolve_alignment(alignment)?;
        let name = format!("limiting<{}>", upstream.name());
        Ok(Self { upstream, allocation_limit, alignment, allocated: AtomicUsize::new(0), name })
    }

    pub fn upstream(&self) -> &Arc<dyn MemoryResource> {
        &self.upstream
    }

    pub fn allocation_limit(&self) -> usize {
        self.allocation_limit
    }

    pub fn alignment(&self) -> usize {
        self.alignment
    }

    /// Bytes currently charged against the limit.
    pub fn allocated_bytes(&self) -> usize {
        self.allocated.load(Ordering::Acquire)
    }

    /// Bytes still available under the limit.
    pub fn free_bytes(&self) -> usize {
        self.allocation_limit.saturating_sub(self.allocated_bytes())
    }
}

impl MemoryResource for LimitingResourceAdaptor {
    fn allocate(&self, bytes: usize, stream: &ExecutionStream) -> Result<NonNull<u8>> {
        let Some(charged) = align_up(bytes, self.alignment) else {
            return SizeOverflowSnafu { count: bytes, element_size: 1usize }.fail();
        };

        let limit = self.allocation_limit;
        let reserved = self.allocated.fetch_update(Ordering::AcqRel, Ordering::Acquire, |allocated| {
            allocated.checked_add(charged).filter(|total| *total <= limit)
        });
        if let Err(allocated) = reserved {
            return AllocationLimitSnafu { requested: bytes, allocated, limit }.fail();
        }

        self.upstream.allocate(bytes, stream).inspect_err(|_| {
            self.allocated.fetch_sub(charged, Ordering::AcqRel);
        })
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>, bytes: usize, stream: &ExecutionStream) {
        unsafe { self.upstream.deallocate(ptr, bytes, stream) };
        if let Some(charged) = align_up(bytes, self.alignment) {
            self.allocated.fetch_sub(charged, Ordering::AcqRel);
        }
    }

    fn device_kind(&self) -> DeviceKind {
        self.upstream.device_kind()
    }

    fn name(&self) -> &str {
        &self.name
    }

    /// Free/total as seen through the limit.
    fn memory_info(&self) -> Result<MemoryInfo> {
        Ok(MemoryInfo { free: self.free_bytes(), total: self.allocation_limit })
    }
}
