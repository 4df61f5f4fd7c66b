//! Workspace allocator: a pooled, ceiling-bounded allocator for owning accelerator buffers and scratch space.
//!
//! The default workspace is a [`PoolMemoryResource`] over the session's device memory, wrapped in a
//! [`LimitingResourceAdaptor`] whose ceiling is half of the accelerator memory free at registration time.

use std::sync::Arc;

use crate::allocator::MemoryResource;
use crate::error::Result;
use crate::limiting::{LimitingResourceAdaptor, resolve_alignment};
use crate::pool::PoolMemoryResource;
use crate::registry::{Resource, ResourceFactory, ResourceKind};
use crate::session::Session;

const ONE_GIB: usize = 1 << 30;

/// Builds the limiting workspace resource for a session.
///
/// The ceiling, charge alignment and upstream pool are resolved when the factory is created, so configuration
/// and device query failures surface from registration rather than from the first allocation.
#[derive(Debug)]
pub struct WorkspaceResourceFactory {
    upstream: Arc<dyn MemoryResource>,
    allocation_limit: usize,
    alignment: usize,
}

impl WorkspaceResourceFactory {
    /// Resolve a workspace configuration.
    ///
    /// * `upstream` - allocator to limit; a pool over the session's device memory when `None`
    /// * `allocation_limit` - ceiling in bytes; half of free device memory when `None`
    /// * `alignment` - charge granularity; the limiting adaptor default when `None`
    pub fn new(
        session: &Session,
        upstream: Option<Arc<dyn MemoryResource>>,
        allocation_limit: Option<usize>,
        alignment: Option<usize>,
    ) -> Result<Self> {
        let alignment = resolve_alignment(alignment)?;
        let allocation_limit = match allocation_limit {
            Some(limit) => limit,
            None => default_allocation_limit(session)?,
        };
        let upstream = match upstream {
            Some(upstream) => upstream,
            None => default_memory_resource(session, allocation_limit)?,
        };

        tracing::debug!(upstream = upstream.name(), allocation_limit, alignment, "workspace factory configured");
        Ok(Self { upstream, allocation_limit, alignment })
    }

    pub fn allocation_limit(&self) -> usize {
        self.allocation_limit
    }
}

impl ResourceFactory for WorkspaceResourceFactory {
    fn resource_kind(&self) -> ResourceKind {
        ResourceKind::Workspace
    }

    fn make_resource(&self) -> Result<Resource> {
        let adaptor =
            LimitingResourceAdaptor::new(Arc::clone(&self.upstream), self.allocation_limit, Some(self.alignment))?;
        Ok(Resource::Workspace(Arc::new(adaptor)))
    }
}

/// Allow a fraction of available device memory by default.
fn default_allocation_limit(session: &Session) -> Result<usize> {
    let info = session.device_memory_resource()?.memory_info()?;
    Ok(info.free / 2)
}

/// Pool between `min(1 GiB, limit / 2)` and `1.5 * limit` over the session's device memory.
fn default_memory_resource(session: &Session, limit: usize) -> Result<Arc<dyn MemoryResource>> {
    let min_size = ONE_GIB.min(limit / 2);
    let max_size = limit.saturating_mul(3) / 2;
    let pool = PoolMemoryResource::new(session.device_memory_resource()?, min_size, max_size)?;
    Ok(Arc::new(pool))
}

/// Get the session's workspace resource, registering the default one on first use.
///
/// Repeated calls return the same instance until [`set_workspace_resource`] replaces it.
pub fn get_workspace_resource(session: &Session) -> Result<Arc<LimitingResourceAdaptor>> {
    let registry = session.registry();
    if !registry.has_resource_factory(ResourceKind::Workspace) {
        let config = session.config();
        let factory = WorkspaceResourceFactory::new(session, None, config.workspace_limit, config.workspace_alignment)?;
        registry.add_resource_factory_if_absent(Arc::new(factory));
    }
    registry.get_resource(ResourceKind::Workspace)?.into_workspace()
}

/// Install a workspace resource, replacing any previous one for this session.
///
/// Buffers allocated through the previous workspace keep it alive and release into it.
pub fn set_workspace_resource(
    session: &Session,
    upstream: Option<Arc<dyn MemoryResource>>,
    allocation_limit: Option<usize>,
    alignment: Option<usize>,
) -> Result<()> {
    let factory = WorkspaceResourceFactory::new(session, upstream, allocation_limit, alignment)?;
    session.registry().add_resource_factory(Arc::new(factory));
    Ok(())
}

/// Bytes still available under the workspace ceiling.
pub fn get_workspace_free_bytes(session: &Session) -> Result<usize> {
    Ok(get_workspace_resource(session)?.free_bytes())
}

/// The workspace ceiling in bytes.
pub fn get_workspace_total_bytes(session: &Session) -> Result<usize> {
    Ok(get_workspace_resource(session)?.allocation_limit())
}
