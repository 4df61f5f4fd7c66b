use std::sync::Arc;

use mdbuf_dtype::{DeviceId, DeviceKind};

use crate::allocator::{EmulatedDeviceResource, HostMemoryResource, MemoryResource};
use crate::config::{Backend, SessionConfig};
use crate::error::Result;
use crate::registry::{Resource, ResourceKind, ResourceRegistry, SharedResourceFactory};
use crate::stream::ExecutionStream;
use crate::transfer::{HostTransferEngine, TransferEngine};
use crate::workspace::get_workspace_resource;

/// Context threaded through every buffer operation.
///
/// Owns the resource registry and the execution stream work is ordered on. Sessions are independent:
/// resources registered in one are never visible from another.
#[derive(Debug)]
pub struct Session {
    config: SessionConfig,
    stream: ExecutionStream,
    registry: ResourceRegistry,
}

impl Session {
    /// Session with the default configuration (emulated accelerator).
    pub fn new() -> Result<Self> {
        Self::with_config(SessionConfig::default())
    }

    /// Session configured from `MDBUF_*` environment variables.
    pub fn from_env() -> Result<Self> {
        Self::with_config(SessionConfig::from_env())
    }

    pub fn with_config(config: SessionConfig) -> Result<Self> {
        let registry = ResourceRegistry::new();
        let stream = register_backend(&registry, &config)?;
        registry.add_resource_factory(Arc::new(SharedResourceFactory::new(
            ResourceKind::HostMemory,
            Resource::Memory(Arc::new(HostMemoryResource)),
        )));

        tracing::debug!(backend = %config.backend, device = %config.device, "session created");
        Ok(Self { config, stream, registry })
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Accelerator this session allocates on.
    pub fn device(&self) -> DeviceId {
        self.config.device
    }

    pub fn stream(&self) -> &ExecutionStream {
        &self.stream
    }

    pub fn registry(&self) -> &ResourceRegistry {
        &self.registry
    }

    pub fn host_memory_resource(&self) -> Result<Arc<dyn MemoryResource>> {
        self.registry.get_resource(ResourceKind::HostMemory)?.into_memory()
    }

    /// Raw accelerator allocator, before any pooling or limiting.
    pub fn device_memory_resource(&self) -> Result<Arc<dyn MemoryResource>> {
        self.registry.get_resource(ResourceKind::DeviceMemory)?.into_memory()
    }

    pub fn transfer_engine(&self) -> Result<Arc<dyn TransferEngine>> {
        self.registry.get_resource(ResourceKind::Transfer)?.into_transfer()
    }

    /// Allocator used by owning buffers on `kind`.
    ///
    /// CPU buffers use the host memory resource. Accelerator buffers go through the workspace resource, so its
    /// ceiling bounds them.
    pub fn memory_resource_for(&self, kind: DeviceKind) -> Result<Arc<dyn MemoryResource>> {
        match kind {
            DeviceKind::Cpu => self.host_memory_resource(),
            DeviceKind::Accelerator => Ok(get_workspace_resource(self)?),
        }
    }

    /// Block until all work issued on the session stream has completed.
    pub fn synchronize(&self) -> Result<()> {
        self.stream.synchronize()
    }
}

/// Register device memory and transfer resources for the configured backend and return its stream.
fn register_backend(registry: &ResourceRegistry, config: &SessionConfig) -> Result<ExecutionStream> {
    match config.backend {
        Backend::Emulated => {
            let device = EmulatedDeviceResource::new(config.device.id, config.emulated_capacity);
            registry.add_resource_factory(Arc::new(SharedResourceFactory::new(
                ResourceKind::DeviceMemory,
                Resource::Memory(Arc::new(device)),
            )));
            registry.add_resource_factory(Arc::new(SharedResourceFactory::new(
                ResourceKind::Transfer,
                Resource::Transfer(Arc::new(HostTransferEngine)),
            )));
            Ok(ExecutionStream::host())
        }
        #[cfg(feature = "cuda")]
        Backend::Cuda => {
            use crate::allocator::CudaMemoryResource;
            use crate::transfer::CudaTransferEngine;

            let device = CudaMemoryResource::new(config.device.id as usize)?;
            let context = device.context().clone();
            registry.add_resource_factory(Arc::new(SharedResourceFactory::new(
                ResourceKind::DeviceMemory,
                Resource::Memory(Arc::new(device)),
            )));
            registry.add_resource_factory(Arc::new(SharedResourceFactory::new(
                ResourceKind::Transfer,
                Resource::Transfer(Arc::new(CudaTransferEngine::new(context.clone()))),
            )));
            Ok(ExecutionStream::cuda(context.default_stream()))
        }
        #[cfg(not(feature = "cuda"))]
        Backend::Cuda => crate::error::BackendUnavailableSnafu { backend: config.backend.to_string() }.fail(),
    }
}
