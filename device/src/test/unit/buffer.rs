use crate::test::helpers::{
    iota, session, session_with_workspace_limit, track_device_allocations, track_host_allocations,
};
use crate::{Buffer, DeviceKind, ErrorKind, MemoryKind, Shape};

#[test]
fn test_new_host_buffer() {
    let session = session();
    let buffer = Buffer::<f32>::new(&session, [2, 3], MemoryKind::Host).unwrap();

    assert_eq!(buffer.size(), 6);
    assert_eq!(buffer.memory_kind(), MemoryKind::Host);
    assert_eq!(buffer.device_kind(), DeviceKind::Cpu);
    assert_eq!(buffer.shape(), &Shape::from([2, 3]));
    assert!(buffer.is_owning());
    assert_eq!(buffer.view().as_slice().unwrap(), &[0.0; 6]);
}

#[test]
fn test_new_device_buffer() {
    let session = session();
    let buffer = Buffer::<i32>::new(&session, [16], MemoryKind::Device).unwrap();

    assert_eq!(buffer.memory_kind(), MemoryKind::Device);
    assert_eq!(buffer.device_kind(), DeviceKind::Accelerator);
    assert!(buffer.is_owning());
    assert!(!buffer.data_handle().is_null());

    let err = buffer.view().as_slice().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidVariantAccess);
}

#[test]
fn test_owning_managed_request_allocates_device_memory() {
    let session = session();
    let buffer = Buffer::<f64>::new(&session, [4], MemoryKind::Managed).unwrap();

    assert_eq!(buffer.memory_kind(), MemoryKind::Device);
    assert_eq!(buffer.device_kind(), DeviceKind::Accelerator);
}

#[test]
fn test_non_owning_buffer() {
    let mut data = iota(8);
    let buffer = unsafe { Buffer::from_raw_parts(data.as_mut_ptr(), [2, 4], MemoryKind::Managed) };

    assert!(!buffer.is_owning());
    assert_eq!(buffer.memory_kind(), MemoryKind::Managed);
    assert_eq!(buffer.device_kind(), DeviceKind::Accelerator);
    assert_eq!(buffer.data_handle(), data.as_mut_ptr());
    // Managed memory is host-accessible.
    assert_eq!(buffer.view().get(&[1, 2]).unwrap(), Some(&6.0));
}

#[test]
fn test_default_buffer_is_empty() {
    let buffer = Buffer::<u8>::default();

    assert_eq!(buffer.size(), 0);
    assert!(buffer.is_empty());
    assert!(!buffer.is_owning());
    assert!(buffer.data_handle().is_null());
    assert_eq!(buffer.memory_kind(), MemoryKind::Host);
    assert!(buffer.view().as_slice().unwrap().is_empty());
}

#[test]
fn test_zero_extent_buffer() {
    let session = session();
    for kind in [MemoryKind::Host, MemoryKind::Device] {
        let buffer = Buffer::<f32>::new(&session, [3, 0, 2], kind).unwrap();
        assert_eq!(buffer.size(), 0);
        assert!(!buffer.data_handle().is_null());

        let copy = Buffer::copy_of(&session, &buffer, MemoryKind::Host).unwrap();
        assert!(copy.to_vec(&session).unwrap().is_empty());
    }
}

#[test]
fn test_scalar_buffer_holds_one_element() {
    let session = session();
    let buffer = Buffer::<u16>::new(&session, Shape::scalar(), MemoryKind::Device).unwrap();

    assert_eq!(buffer.size(), 1);
    assert_eq!(buffer.to_vec(&session).unwrap(), vec![0]);
}

#[test]
fn test_device_to_host_readback() {
    let session = session();
    let data = iota(1024);
    let x = Buffer::from_host_slice(&session, &data, [1024], MemoryKind::Device).unwrap();

    let y = Buffer::copy_of(&session, &x, MemoryKind::Host).unwrap();
    session.synchronize().unwrap();

    assert_eq!(y.memory_kind(), MemoryKind::Host);
    assert_eq!(y.size(), 1024);
    assert_eq!(y.view().as_slice().unwrap(), data.as_slice());
    assert_eq!(x.to_vec(&session).unwrap(), data);
}

#[test]
fn test_copy_of_same_kind_allocates() {
    let session = session();
    let stats = track_host_allocations(&session);
    let x = Buffer::from_host_slice(&session, &iota(32), [32], MemoryKind::Host).unwrap();
    let before = stats.statistics().allocations;

    let y = Buffer::copy_of(&session, &x, MemoryKind::Host).unwrap();

    assert_eq!(stats.statistics().allocations, before + 1);
    assert_ne!(x.data_handle(), y.data_handle());
    assert_eq!(y.to_vec(&session).unwrap(), iota(32));
}

#[test]
fn test_relocate_same_kind_moves() {
    let session = session();
    let host_stats = track_host_allocations(&session);
    let device_stats = track_device_allocations(&session);

    let x = Buffer::from_host_slice(&session, &iota(64), [8, 8], MemoryKind::Host).unwrap();
    let ptr = x.data_handle();
    let host_before = host_stats.statistics();
    let y = Buffer::relocate(&session, x, MemoryKind::Host).unwrap();
    assert_eq!(host_stats.statistics(), host_before);
    assert_eq!(y.data_handle(), ptr);

    let d = Buffer::relocate(&session, y, MemoryKind::Device).unwrap();
    let ptr = d.data_handle();
    let device_before = device_stats.statistics();
    let d = Buffer::relocate(&session, d, MemoryKind::Device).unwrap();
    assert_eq!(device_stats.statistics(), device_before);
    assert_eq!(d.data_handle(), ptr);
    assert_eq!(d.to_vec(&session).unwrap(), iota(64));
}

#[test]
fn test_relocate_owning_buffer_requested_as_managed() {
    let session = session();
    let device_stats = track_device_allocations(&session);

    let x = Buffer::from_host_slice(&session, &iota(16), [16], MemoryKind::Managed).unwrap();
    assert_eq!(x.memory_kind(), MemoryKind::Device);
    let before = device_stats.statistics();

    // Owning storage reports Device, so asking for Managed again is a cross-kind copy.
    let y = Buffer::relocate(&session, x, MemoryKind::Managed).unwrap();
    let after = device_stats.statistics();
    assert_eq!(after.allocations, before.allocations + 1);
    assert_eq!(after.deallocations, before.deallocations + 1);
    assert_eq!(y.memory_kind(), MemoryKind::Device);

    let ptr = y.data_handle();
    let z = Buffer::relocate(&session, y, MemoryKind::Device).unwrap();
    assert_eq!(device_stats.statistics(), after);
    assert_eq!(z.data_handle(), ptr);
    assert_eq!(z.to_vec(&session).unwrap(), iota(16));
}

#[test]
fn test_relocate_across_kinds_releases_source() {
    let session = session();
    let stats = track_host_allocations(&session);
    let x = Buffer::from_host_slice(&session, &iota(16), [16], MemoryKind::Host).unwrap();
    let live = stats.statistics().current_bytes;

    let y = Buffer::relocate(&session, x, MemoryKind::Device).unwrap();

    assert_eq!(y.memory_kind(), MemoryKind::Device);
    assert_eq!(stats.statistics().current_bytes, live - 16 * size_of::<f32>());
    assert_eq!(y.to_vec(&session).unwrap(), iota(16));
}

#[test]
fn test_copies_are_independent() {
    let session = session();
    let mut x = Buffer::from_host_slice(&session, &iota(8), [8], MemoryKind::Host).unwrap();
    let on_device = Buffer::copy_of(&session, &x, MemoryKind::Device).unwrap();
    let on_host = Buffer::copy_of(&session, &x, MemoryKind::Host).unwrap();

    x.view_mut().as_mut_slice().unwrap().fill(-1.0);

    assert_eq!(on_device.to_vec(&session).unwrap(), iota(8));
    assert_eq!(on_host.to_vec(&session).unwrap(), iota(8));
}

#[test]
fn test_try_clone_keeps_kind() {
    let session = session();
    let x = Buffer::from_host_slice(&session, &[1u8, 2, 3], [3], MemoryKind::Device).unwrap();
    let y = x.try_clone(&session).unwrap();

    assert_eq!(y.memory_kind(), MemoryKind::Device);
    assert_ne!(y.data_handle(), x.data_handle());
    assert_eq!(y.to_vec(&session).unwrap(), vec![1, 2, 3]);
}

#[test]
fn test_clone_from_buffer() {
    let session = session();
    let mut target = Buffer::<i64>::new(&session, [2], MemoryKind::Host).unwrap();
    let source = Buffer::from_host_slice(&session, &[7i64, 8, 9], [3], MemoryKind::Device).unwrap();

    target.clone_from_buffer(&session, &source).unwrap();

    assert_eq!(target.size(), 3);
    assert_eq!(target.memory_kind(), MemoryKind::Device);
    assert!(target.is_owning());
    assert_eq!(target.to_vec(&session).unwrap(), vec![7, 8, 9]);
}

#[test]
fn test_clone_from_buffer_failure_leaves_target() {
    let session = session_with_workspace_limit(1024);
    let source = Buffer::<u8>::new(&session, [1024], MemoryKind::Device).unwrap();
    let mut target = Buffer::from_host_slice(&session, &[1u8, 2, 3, 4], [4], MemoryKind::Host).unwrap();

    // The workspace is full, so a second device buffer cannot be made.
    let err = target.clone_from_buffer(&session, &source).unwrap_err();

    assert!(err.is_allocation_failure());
    assert_eq!(target.memory_kind(), MemoryKind::Host);
    assert_eq!(target.to_vec(&session).unwrap(), vec![1, 2, 3, 4]);
}

#[test]
fn test_from_host_slice_size_mismatch() {
    let session = session();
    let err = Buffer::from_host_slice(&session, &[1.0f32; 5], [2, 3], MemoryKind::Host).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::OutOfBounds);
}

#[test]
fn test_device_buffers_respect_workspace_ceiling() {
    let session = session_with_workspace_limit(4096);

    let full = Buffer::<u8>::new(&session, [4096], MemoryKind::Device).unwrap();
    let err = Buffer::<u8>::new(&session, [1], MemoryKind::Device).unwrap_err();
    assert!(err.is_allocation_failure());

    drop(full);
    let _below = Buffer::<f32>::new(&session, [1000], MemoryKind::Device).unwrap();
}

#[test]
fn test_host_buffers_ignore_workspace_ceiling() {
    let session = session_with_workspace_limit(256);
    let buffer = Buffer::<f64>::new(&session, [1024], MemoryKind::Host).unwrap();
    assert_eq!(buffer.size(), 1024);
}

#[test]
fn test_view_shape_and_strides() {
    let session = session();
    let mut buffer = Buffer::<i16>::new(&session, [2, 3, 4], MemoryKind::Host).unwrap();

    let view = buffer.view();
    assert_eq!(view.rank(), 3);
    assert_eq!(view.extent(1), 3);
    assert_eq!(view.strides().as_slice(), &[12, 4, 1]);
    assert_eq!(view.len(), 24);

    let mut view = buffer.view_mut();
    *view.get_mut(&[1, 2, 3]).unwrap().unwrap() = 42;
    assert_eq!(view.get_mut(&[2, 0, 0]).unwrap(), None);
    assert_eq!(buffer.view().as_slice().unwrap()[23], 42);
}
