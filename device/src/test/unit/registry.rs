use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::registry::{Resource, ResourceFactory, ResourceKind, ResourceRegistry, SharedResourceFactory};
use crate::{EmulatedDeviceResource, ErrorKind, HostMemoryResource, HostTransferEngine, Result};

/// Factory that counts how often it builds.
#[derive(Debug, Default)]
struct CountingFactory {
    builds: AtomicUsize,
}

impl ResourceFactory for CountingFactory {
    fn resource_kind(&self) -> ResourceKind {
        ResourceKind::DeviceMemory
    }

    fn make_resource(&self) -> Result<Resource> {
        self.builds.fetch_add(1, Ordering::SeqCst);
        Ok(Resource::Memory(Arc::new(EmulatedDeviceResource::new(0, 1024))))
    }
}

fn memory(resource: Resource) -> Arc<dyn crate::MemoryResource> {
    resource.into_memory().unwrap()
}

#[test]
fn test_missing_resource() {
    let registry = ResourceRegistry::new();

    assert!(!registry.has_resource_factory(ResourceKind::Transfer));
    let err = registry.get_resource(ResourceKind::Transfer).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Configuration);
}

#[test]
fn test_lazy_construction_happens_once() {
    let registry = ResourceRegistry::new();
    let factory = Arc::new(CountingFactory::default());
    registry.add_resource_factory(factory.clone());

    assert!(registry.has_resource_factory(ResourceKind::DeviceMemory));
    assert!(!registry.is_constructed(ResourceKind::DeviceMemory));
    assert_eq!(factory.builds.load(Ordering::SeqCst), 0);

    let first = memory(registry.get_resource(ResourceKind::DeviceMemory).unwrap());
    let second = memory(registry.get_resource(ResourceKind::DeviceMemory).unwrap());

    assert!(registry.is_constructed(ResourceKind::DeviceMemory));
    assert_eq!(factory.builds.load(Ordering::SeqCst), 1);
    assert!(Arc::ptr_eq(&first, &second));
}

#[test]
fn test_concurrent_lookups_construct_once() {
    let registry = ResourceRegistry::new();
    let factory = Arc::new(CountingFactory::default());
    registry.add_resource_factory(factory.clone());

    std::thread::scope(|scope| {
        for _ in 0..8 {
            scope.spawn(|| {
                registry.get_resource(ResourceKind::DeviceMemory).unwrap();
            });
        }
    });

    assert_eq!(factory.builds.load(Ordering::SeqCst), 1);
}

#[test]
fn test_debug_format_while_registering() {
    let registry = ResourceRegistry::new();
    let host = Resource::Memory(Arc::new(HostMemoryResource));

    std::thread::scope(|scope| {
        for _ in 0..2 {
            scope.spawn(|| {
                for _ in 0..2_000 {
                    let factory = SharedResourceFactory::new(ResourceKind::HostMemory, host.clone());
                    registry.add_resource_factory(Arc::new(factory));
                    registry.get_resource(ResourceKind::HostMemory).unwrap();
                }
            });
        }
        scope.spawn(|| {
            for _ in 0..2_000 {
                assert!(format!("{registry:?}").starts_with("ResourceRegistry"));
            }
        });
    });

    assert!(registry.has_resource_factory(ResourceKind::HostMemory));
}

#[test]
fn test_replacing_factory_evicts_resource() {
    let registry = ResourceRegistry::new();
    let factory = Arc::new(CountingFactory::default());
    registry.add_resource_factory(factory.clone());
    let before = memory(registry.get_resource(ResourceKind::DeviceMemory).unwrap());

    registry.add_resource_factory(factory.clone());
    assert!(!registry.is_constructed(ResourceKind::DeviceMemory));

    let after = memory(registry.get_resource(ResourceKind::DeviceMemory).unwrap());
    assert_eq!(factory.builds.load(Ordering::SeqCst), 2);
    assert!(!Arc::ptr_eq(&before, &after));
}

#[test]
fn test_add_if_absent_keeps_existing() {
    let registry = ResourceRegistry::new();
    let host = SharedResourceFactory::new(ResourceKind::HostMemory, Resource::Memory(Arc::new(HostMemoryResource)));

    assert!(registry.add_resource_factory_if_absent(Arc::new(host.clone())));
    let first = memory(registry.get_resource(ResourceKind::HostMemory).unwrap());

    assert!(!registry.add_resource_factory_if_absent(Arc::new(host)));
    let second = memory(registry.get_resource(ResourceKind::HostMemory).unwrap());
    assert!(Arc::ptr_eq(&first, &second));
}

#[test]
fn test_variant_access() {
    let transfer = Resource::Transfer(Arc::new(HostTransferEngine));
    let err = transfer.clone().into_memory().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidVariantAccess);
    assert_eq!(transfer.into_transfer().unwrap().name(), "host");

    let host = Resource::Memory(Arc::new(HostMemoryResource));
    assert_eq!(host.clone().into_workspace().unwrap_err().kind(), ErrorKind::InvalidVariantAccess);
    assert_eq!(host.into_memory().unwrap().name(), "host");
}

#[test]
fn test_sessions_do_not_share_resources() {
    let a = crate::test::helpers::session();
    let b = crate::test::helpers::session();

    let a_memory = a.device_memory_resource().unwrap();
    let b_memory = b.device_memory_resource().unwrap();
    assert!(!Arc::ptr_eq(&a_memory, &b_memory));

    let a_workspace = crate::get_workspace_resource(&a).unwrap();
    assert!(!b.registry().is_constructed(ResourceKind::Workspace));
    assert!(!Arc::ptr_eq(&a_workspace, &crate::get_workspace_resource(&b).unwrap()));
}
