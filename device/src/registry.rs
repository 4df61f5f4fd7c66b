//! Session-scoped registry of lazily constructed backend resources.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::allocator::MemoryResource;
use crate::error::{InvalidVariantAccessSnafu, MissingResourceSnafu, Result};
use crate::limiting::LimitingResourceAdaptor;
use crate::transfer::TransferEngine;

/// Slot a resource is registered under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::VariantArray)]
pub enum ResourceKind {
    /// Allocator for owning CPU buffers.
    HostMemory,
    /// Raw accelerator allocator the workspace pool draws from.
    DeviceMemory,
    /// Bounded allocator for owning accelerator buffers and scratch space.
    Workspace,
    /// Engine used by buffer copies.
    Transfer,
}

/// A constructed resource.
#[derive(Clone)]
pub enum Resource {
    Memory(Arc<dyn MemoryResource>),
    Workspace(Arc<LimitingResourceAdaptor>),
    Transfer(Arc<dyn TransferEngine>),
}

impl Resource {
    fn variant_name(&self) -> &'static str {
        match self {
            Resource::Memory(_) => "memory resource",
            Resource::Workspace(_) => "workspace resource",
            Resource::Transfer(_) => "transfer engine",
        }
    }

    /// The resource as an allocator. Workspace resources are allocators too.
    pub fn into_memory(self) -> Result<Arc<dyn MemoryResource>> {
        match self {
            Resource::Memory(memory) => Ok(memory),
            Resource::Workspace(workspace) => Ok(workspace),
            other => InvalidVariantAccessSnafu { operation: "into_memory", actual: other.variant_name() }.fail(),
        }
    }

    pub fn into_workspace(self) -> Result<Arc<LimitingResourceAdaptor>> {
        match self {
            Resource::Workspace(workspace) => Ok(workspace),
            other => InvalidVariantAccessSnafu { operation: "into_workspace", actual: other.variant_name() }.fail(),
        }
    }

    pub fn into_transfer(self) -> Result<Arc<dyn TransferEngine>> {
        match self {
            Resource::Transfer(engine) => Ok(engine),
            other => InvalidVariantAccessSnafu { operation: "into_transfer", actual: other.variant_name() }.fail(),
        }
    }
}

impl fmt::Debug for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Resource::Memory(memory) => f.debug_tuple("Memory").field(&memory.name()).finish(),
            Resource::Workspace(workspace) => f.debug_tuple("Workspace").field(&workspace.name()).finish(),
            Resource::Transfer(engine) => f.debug_tuple("Transfer").field(&engine.name()).finish(),
        }
    }
}

/// Builds the resource for one [`ResourceKind`].
pub trait ResourceFactory: Send + Sync + fmt::Debug {
    fn resource_kind(&self) -> ResourceKind;

    fn make_resource(&self) -> Result<Resource>;
}

/// Factory handing out an already constructed resource.
#[derive(Debug, Clone)]
pub struct SharedResourceFactory {
    kind: ResourceKind,
    resource: Resource,
}

impl SharedResourceFactory {
    pub fn new(kind: ResourceKind, resource: Resource) -> Self {
        Self { kind, resource }
    }
}

impl ResourceFactory for SharedResourceFactory {
    fn resource_kind(&self) -> ResourceKind {
        self.kind
    }

    fn make_resource(&self) -> Result<Resource> {
        Ok(self.resource.clone())
    }
}

/// Resource factories and the resources built from them.
///
/// # Thread Safety
///
/// Lookups take a read lock on the fast path. Construction takes the write lock and re-checks, so each
/// resource is built at most once per registration. Replacing a factory while another thread looks the
/// same kind up is ordered by the lock but not otherwise coordinated. When both maps are locked, `resources`
/// is always taken before `factories`.
#[derive(Default)]
pub struct ResourceRegistry {
    factories: RwLock<HashMap<ResourceKind, Arc<dyn ResourceFactory>>>,
    resources: RwLock<HashMap<ResourceKind, Resource>>,
}

impl ResourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_resource_factory(&self, kind: ResourceKind) -> bool {
        self.factories.read().contains_key(&kind)
    }

    /// Register `factory` for its kind, replacing any previous factory and dropping the cached resource.
    ///
    /// Holders of the previous resource keep it alive until they release it.
    pub fn add_resource_factory(&self, factory: Arc<dyn ResourceFactory>) {
        let kind = factory.resource_kind();
        tracing::debug!(%kind, ?factory, "registering resource factory");

        let mut resources = self.resources.write();
        self.factories.write().insert(kind, factory);
        resources.remove(&kind);
    }

    /// Register `factory` only if its kind has no factory yet. Returns whether it was registered.
    pub fn add_resource_factory_if_absent(&self, factory: Arc<dyn ResourceFactory>) -> bool {
        let kind = factory.resource_kind();
        let mut factories = self.factories.write();
        if factories.contains_key(&kind) {
            return false;
        }

        tracing::debug!(%kind, ?factory, "registering resource factory");
        factories.insert(kind, factory);
        true
    }

    /// Get the resource for `kind`, constructing it from the registered factory on first use.
    pub fn get_resource(&self, kind: ResourceKind) -> Result<Resource> {
        // Fast path: read lock
        {
            let resources = self.resources.read();
            if let Some(resource) = resources.get(&kind) {
                return Ok(resource.clone());
            }
        }

        // Slow path: write lock to create
        let mut resources = self.resources.write();

        // Double-check after acquiring write lock
        if let Some(resource) = resources.get(&kind) {
            return Ok(resource.clone());
        }

        let Some(factory) = self.factories.read().get(&kind).cloned() else {
            return MissingResourceSnafu { kind }.fail();
        };
        let resource = factory.make_resource()?;
        tracing::debug!(%kind, ?resource, "resource constructed");
        resources.insert(kind, resource.clone());
        Ok(resource)
    }

    /// Whether the resource for `kind` has already been constructed.
    pub fn is_constructed(&self, kind: ResourceKind) -> bool {
        self.resources.read().contains_key(&kind)
    }
}

impl fmt::Debug for ResourceRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let resources = self.resources.read();
        let factories = self.factories.read().keys().copied().collect::<Vec<_>>();
        f.debug_struct("ResourceRegistry").field("factories", &factories).field("resources", &*resources).finish()
    }
}
