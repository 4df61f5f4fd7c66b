use std::sync::Arc;

use crate::allocator::align_up;
use crate::{
    ALLOCATION_ALIGNMENT, DeviceKind, EmulatedDeviceResource, ErrorKind, ExecutionStream, HostMemoryResource,
    LimitingResourceAdaptor, MemoryResource, PoolMemoryResource, StatisticsResourceAdaptor,
};

fn stream() -> ExecutionStream {
    ExecutionStream::host()
}

#[test]
fn test_align_up() {
    assert_eq!(align_up(0, 256), Some(0));
    assert_eq!(align_up(1, 256), Some(256));
    assert_eq!(align_up(256, 256), Some(256));
    assert_eq!(align_up(257, 256), Some(512));
    assert_eq!(align_up(usize::MAX, 256), None);
}

#[test]
fn test_host_allocation_is_zeroed_and_aligned() {
    let resource = HostMemoryResource;
    let stream = stream();
    let ptr = resource.allocate(1000, &stream).unwrap();

    assert_eq!(ptr.as_ptr() as usize % ALLOCATION_ALIGNMENT, 0);
    let bytes = unsafe { std::slice::from_raw_parts(ptr.as_ptr(), 1000) };
    assert!(bytes.iter().all(|&b| b == 0));

    unsafe { resource.deallocate(ptr, 1000, &stream) };
    assert_eq!(resource.device_kind(), DeviceKind::Cpu);
    assert_eq!(resource.memory_info().unwrap_err().kind(), ErrorKind::AllocationFailure);
}

#[test]
fn test_zero_byte_allocation() {
    let resource = HostMemoryResource;
    let stream = stream();
    let ptr = resource.allocate(0, &stream).unwrap();
    unsafe { resource.deallocate(ptr, 0, &stream) };
}

#[test]
fn test_emulated_capacity() {
    let device = EmulatedDeviceResource::new(1, 4096);
    let stream = stream();

    let a = device.allocate(3000, &stream).unwrap();
    assert_eq!(device.used(), 3000);
    assert_eq!(device.memory_info().unwrap().free, 1096);
    assert_eq!(device.memory_info().unwrap().used(), 3000);

    let err = device.allocate(2000, &stream).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::AllocationFailure);
    assert_eq!(device.used(), 3000);

    unsafe { device.deallocate(a, 3000, &stream) };
    assert_eq!(device.used(), 0);
    assert_eq!(device.device().to_string(), "GPU:1");
}

#[test]
fn test_limiting_rounds_alignment() {
    let limiting = LimitingResourceAdaptor::new(Arc::new(HostMemoryResource), 1024, Some(100)).unwrap();
    assert_eq!(limiting.alignment(), 128);

    let stream = stream();
    let ptr = limiting.allocate(129, &stream).unwrap();
    assert_eq!(limiting.allocated_bytes(), 256);
    assert_eq!(limiting.memory_info().unwrap().free, 768);

    unsafe { limiting.deallocate(ptr, 129, &stream) };
    assert_eq!(limiting.allocated_bytes(), 0);
}

#[test]
fn test_limiting_rejects_unrepresentable_alignment() {
    let err = LimitingResourceAdaptor::new(Arc::new(HostMemoryResource), 1024, Some(usize::MAX)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Configuration);

    let largest = 1usize << (usize::BITS - 1);
    let limiting = LimitingResourceAdaptor::new(Arc::new(HostMemoryResource), 1024, Some(largest - 1)).unwrap();
    assert_eq!(limiting.alignment(), largest);
}

#[test]
fn test_limiting_rolls_back_on_upstream_failure() {
    let upstream = Arc::new(EmulatedDeviceResource::new(0, 512));
    let limiting = LimitingResourceAdaptor::new(upstream, 4096, None).unwrap();

    let err = limiting.allocate(1024, &stream()).unwrap_err();
    assert!(err.is_allocation_failure());
    assert_eq!(limiting.allocated_bytes(), 0);
    assert_eq!(limiting.device_kind(), DeviceKind::Accelerator);
}

#[test]
fn test_pool_rejects_request_overflowing_its_size() {
    let pool = PoolMemoryResource::new(Arc::new(HostMemoryResource), 0, 1 << 20).unwrap();
    let stream = stream();
    let held = pool.allocate(512, &stream).unwrap();

    let err = pool.allocate(usize::MAX - 511, &stream).unwrap_err();
    assert!(err.is_allocation_failure());
    assert_eq!(pool.pool_size(), 512);

    unsafe { pool.deallocate(held, 512, &stream) };
}

#[test]
fn test_pool_reuses_blocks() {
    let counted = Arc::new(StatisticsResourceAdaptor::new(Arc::new(EmulatedDeviceResource::new(0, 1 << 16))));
    let pool = PoolMemoryResource::new(counted.clone(), 0, 1 << 16).unwrap();
    let stream = stream();

    let a = pool.allocate(1000, &stream).unwrap();
    unsafe { pool.deallocate(a, 1000, &stream) };
    assert_eq!(pool.cached_bytes(), 1024);

    let b = pool.allocate(900, &stream).unwrap();
    assert_eq!(a, b);
    assert_eq!(counted.statistics().allocations, 1);
    assert_eq!(pool.cached_bytes(), 0);
    assert_eq!(pool.pool_size(), 1024);

    unsafe { pool.deallocate(b, 900, &stream) };
    pool.release(&stream);
    assert_eq!(pool.pool_size(), 0);
    assert_eq!(counted.statistics().current_bytes, 0);
}

#[test]
fn test_pool_max_size() {
    let pool = PoolMemoryResource::new(Arc::new(HostMemoryResource), 0, 1024).unwrap();
    let stream = stream();

    let a = pool.allocate(1024, &stream).unwrap();
    let err = pool.allocate(1, &stream).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::AllocationFailure);
    unsafe { pool.deallocate(a, 1024, &stream) };

    // The cached block is released to make room for a different size.
    let b = pool.allocate(512, &stream).unwrap();
    assert_eq!(pool.pool_size(), 512);
    unsafe { pool.deallocate(b, 512, &stream) };
}

#[test]
fn test_pool_retries_after_releasing_cache() {
    let device = Arc::new(EmulatedDeviceResource::new(0, 1024));
    let pool = PoolMemoryResource::new(device.clone(), 0, 1 << 20).unwrap();
    let stream = stream();

    let a = pool.allocate(512, &stream).unwrap();
    unsafe { pool.deallocate(a, 512, &stream) };
    assert_eq!(device.used(), 512);

    let b = pool.allocate(1024, &stream).unwrap();
    assert_eq!(device.used(), 1024);
    assert_eq!(pool.cached_bytes(), 0);
    unsafe { pool.deallocate(b, 1024, &stream) };
}

#[test]
fn test_pool_configuration_errors() {
    let err = PoolMemoryResource::new(Arc::new(HostMemoryResource), 2048, 1024).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::AllocationFailure);

    let err = PoolMemoryResource::new(Arc::new(EmulatedDeviceResource::new(0, 1024)), 2048, 4096).unwrap_err();
    assert!(err.is_allocation_failure());
}

#[test]
fn test_pool_caps_cached_blocks() {
    let device = Arc::new(EmulatedDeviceResource::new(0, 1 << 16));
    let pool = PoolMemoryResource::new(device.clone(), 0, 1 << 16).unwrap().with_max_blocks_per_size(1);
    let stream = stream();

    let a = pool.allocate(256, &stream).unwrap();
    let b = pool.allocate(256, &stream).unwrap();
    unsafe {
        pool.deallocate(a, 256, &stream);
        pool.deallocate(b, 256, &stream);
    }

    assert_eq!(pool.cached_bytes(), 256);
    assert_eq!(device.used(), 256);
}

#[test]
fn test_pool_drop_returns_cache() {
    let device = Arc::new(EmulatedDeviceResource::new(0, 1 << 16));
    {
        let pool = PoolMemoryResource::new(device.clone(), 0, 1 << 16).unwrap();
        let stream = stream();
        let a = pool.allocate(4096, &stream).unwrap();
        unsafe { pool.deallocate(a, 4096, &stream) };
        assert_eq!(device.used(), 4096);
    }
    assert_eq!(device.used(), 0);
}

#[test]
fn test_statistics_peak() {
    let stats = StatisticsResourceAdaptor::new(Arc::new(HostMemoryResource));
    let stream = stream();

    let a = stats.allocate(100, &stream).unwrap();
    let b = stats.allocate(300, &stream).unwrap();
    unsafe { stats.deallocate(a, 100, &stream) };
    let c = stats.allocate(50, &stream).unwrap();

    let snapshot = stats.statistics();
    assert_eq!(snapshot.allocations, 3);
    assert_eq!(snapshot.deallocations, 1);
    assert_eq!(snapshot.current_bytes, 350);
    assert_eq!(snapshot.peak_bytes, 400);
    assert_eq!(snapshot.total_bytes, 450);
    assert_eq!(stats.name(), "statistics<host>");

    unsafe {
        stats.deallocate(b, 300, &stream);
        stats.deallocate(c, 50, &stream);
    }
    assert_eq!(stats.statistics().current_bytes, 0);
}
