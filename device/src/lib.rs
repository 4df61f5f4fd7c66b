//! Multi-dimensional buffers that may own or borrow host, accelerator, or managed memory.
//!
//! A [`Buffer`] is tied to a [`Session`], which carries the resource registry, the execution stream and the
//! accelerator the buffer lives on. Owning buffers allocate through the session's memory resources: the host
//! resource for CPU memory and the bounded workspace resource for accelerator memory.
//!
//! # Backends
//!
//! The default backend emulates accelerator memory in host RAM with a fixed capacity. With the `cuda` feature,
//! [`Backend::Cuda`] allocates and copies through the CUDA driver.

pub mod allocator;
pub mod buffer;
pub mod config;
pub mod copy;
pub mod device;
pub mod error;
pub mod limiting;
pub mod ownership;
pub mod pool;
pub mod registry;
pub mod session;
pub mod stream;
pub mod sync;
pub mod transfer;
pub mod view;
pub mod workspace;


pub use allocator::{
    ALLOCATION_ALIGNMENT, AllocationStatistics, EmulatedDeviceResource, HostMemoryResource, MemoryResource,
    StatisticsResourceAdaptor,
};
#[cfg(feature = "cuda")]
pub use allocator::CudaMemoryResource;
pub use buffer::Buffer;
pub use config::{Backend, SessionConfig};
pub use copy::{copy, copy_all, copy_unchecked};
pub use device::{DeviceIdExt, MemoryInfo};
pub use error::{Error, ErrorKind, Result};
pub use limiting::LimitingResourceAdaptor;
pub use pool::PoolMemoryResource;
pub use registry::{Resource, ResourceFactory, ResourceKind, ResourceRegistry, SharedResourceFactory};
pub use session::Session;
pub use stream::{ExecutionStream, synchronize};
pub use transfer::{HostTransferEngine, TransferEngine};
#[cfg(feature = "cuda")]
pub use transfer::CudaTransferEngine;
pub use view::{BufferView, BufferViewMut};
pub use workspace::{
    WorkspaceResourceFactory, get_workspace_free_bytes, get_workspace_resource, get_workspace_total_bytes,
    set_workspace_resource,
};

pub use mdbuf_dtype::{DeviceId, DeviceKind, Element, ExecutionDeviceId, Extents, MemoryKind, ScalarDType, Shape};
