use mdbuf_dtype::{DeviceId, MemoryKind};
use snafu::Snafu;

use crate::registry::ResourceKind;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    /// A bounds-checked copy addressed elements past the end of a buffer.
    #[snafu(display(
        "copy out of bounds: {count} elements from offset {src_offset} of {src_size} into offset {dst_offset} of {dst_size}"
    ))]
    OutOfBounds { count: usize, src_offset: usize, src_size: usize, dst_offset: usize, dst_size: usize },

    /// Source data length does not match the requested shape.
    #[snafu(display("size mismatch: shape holds {expected} elements, data has {actual}"))]
    SizeMismatch { expected: usize, actual: usize },

    /// Allocation would push a limiting resource past its ceiling.
    #[snafu(display("allocation of {requested} bytes exceeds limit: {allocated} of {limit} bytes in use"))]
    AllocationLimit { requested: usize, allocated: usize, limit: usize },

    /// The backing allocator cannot satisfy the request.
    #[snafu(display("out of memory on {device}: requested {requested} bytes"))]
    OutOfMemory { device: DeviceId, requested: usize },

    /// Element count times element size does not fit in `usize`.
    #[snafu(display("allocation size overflow: {count} elements of {element_size} bytes"))]
    SizeOverflow { count: usize, element_size: usize },

    /// Free/total memory could not be queried.
    #[snafu(display("memory info unavailable for {resource}"))]
    MemoryInfoUnavailable { resource: String },

    /// Alignment has no power of two at or above it that fits in `usize`.
    #[snafu(display("invalid alignment {alignment}: must round up to a power of two"))]
    InvalidAlignment { alignment: usize },

    /// Pool bounds cannot be satisfied.
    #[snafu(display("invalid pool configuration (min {min_size}, max {max_size}): {reason}"))]
    PoolConfig { min_size: usize, max_size: usize, reason: String },

    /// Operation is not valid for the active variant.
    #[snafu(display("invalid variant access: {operation} on {actual}"))]
    InvalidVariantAccess { operation: &'static str, actual: String },

    /// Host access was requested on memory that is not host-accessible.
    #[snafu(display("{operation} requires host-accessible memory, buffer is {memory_kind}"))]
    NotHostAccessible { operation: &'static str, memory_kind: MemoryKind },

    /// No factory registered for a resource kind.
    #[snafu(display("no resource factory registered for {kind}"))]
    MissingResource { kind: ResourceKind },

    /// Invalid device specification.
    #[snafu(display("invalid device: {device}"))]
    InvalidDevice { device: String },

    /// Backend is not compiled in.
    #[snafu(display("backend {backend} is not available in this build"))]
    BackendUnavailable { backend: String },

    #[cfg(feature = "cuda")]
    /// CUDA driver error.
    #[snafu(display("CUDA error: {source}"))]
    CudaError { source: cudarc::driver::DriverError },

    #[cfg(feature = "cuda")]
    /// CUDA driver refused an allocation.
    #[snafu(display("CUDA allocation of {requested} bytes failed: {source}"))]
    CudaAllocation { requested: usize, source: cudarc::driver::DriverError },
}

/// Coarse classification of [`Error`] values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
pub enum ErrorKind {
    OutOfBounds,
    AllocationFailure,
    InvalidVariantAccess,
    Configuration,
    Device,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::OutOfBounds { .. } | Error::SizeMismatch { .. } => ErrorKind::OutOfBounds,
            Error::AllocationLimit { .. }
            | Error::OutOfMemory { .. }
            | Error::SizeOverflow { .. }
            | Error::MemoryInfoUnavailable { .. }
            | Error::PoolConfig { .. } => ErrorKind::AllocationFailure,
            Error::InvalidVariantAccess { .. } | Error::NotHostAccessible { .. } => ErrorKind::InvalidVariantAccess,
            Error::MissingResource { .. }
            | Error::InvalidDevice { .. }
            | Error::BackendUnavailable { .. }
            | Error::InvalidAlignment { .. } => ErrorKind::Configuration,
            #[cfg(feature = "cuda")]
            Error::CudaError { .. } => ErrorKind::Device,
            #[cfg(feature = "cuda")]
            Error::CudaAllocation { .. } => ErrorKind::AllocationFailure,
        }
    }

    pub fn is_allocation_failure(&self) -> bool {
        self.kind() == ErrorKind::AllocationFailure
    }
}
