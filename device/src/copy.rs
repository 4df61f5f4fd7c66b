//! Element copies between buffers of any memory kind.

use mdbuf_dtype::{DeviceKind, Element};

use crate::buffer::Buffer;
use crate::error::{OutOfBoundsSnafu, Result};
use crate::session::Session;

/// Copy `count` elements from `src[src_offset..]` into `dst[dst_offset..]`.
///
/// Fails with [`OutOfBounds`](crate::Error::OutOfBounds) if either range runs past its buffer, in which case
/// nothing is transferred. The copy is issued on the session stream.
pub fn copy<T: Element>(
    session: &Session,
    dst: &mut Buffer<T>,
    src: &Buffer<T>,
    dst_offset: usize,
    src_offset: usize,
    count: usize,
) -> Result<()> {
    let fits = |size: usize, offset: usize| size.checked_sub(offset).is_some_and(|available| count <= available);
    if !fits(src.size(), src_offset) || !fits(dst.size(), dst_offset) {
        return OutOfBoundsSnafu {
            count,
            src_offset,
            src_size: src.size(),
            dst_offset,
            dst_size: dst.size(),
        }
        .fail();
    }
    unsafe { copy_unchecked(session, dst, src, dst_offset, src_offset, count) }
}

/// [`copy`] without the range check.
///
/// # Safety
///
/// `src_offset + count` must not exceed `src.size()` and `dst_offset + count` must not exceed `dst.size()`.
pub unsafe fn copy_unchecked<T: Element>(
    session: &Session,
    dst: &mut Buffer<T>,
    src: &Buffer<T>,
    dst_offset: usize,
    src_offset: usize,
    count: usize,
) -> Result<()> {
    let dst_ptr = dst.data_handle().wrapping_add(dst_offset);
    let src_ptr = src.data_handle().wrapping_add(src_offset).cast_const();
    unsafe { buffer_copy(session, dst_ptr, src_ptr, count, dst.device_kind(), src.device_kind()) }
}

/// Copy all of `src` into the start of `dst`.
pub fn copy_all<T: Element>(session: &Session, dst: &mut Buffer<T>, src: &Buffer<T>) -> Result<()> {
    copy(session, dst, src, 0, 0, src.size())
}

/// Hand `count` elements to the session's transfer engine.
///
/// # Safety
///
/// `src` must be valid for `count` reads and `dst` for `count` writes in the memory spaces named by the kinds.
pub(crate) unsafe fn buffer_copy<T: Element>(
    session: &Session,
    dst: *mut T,
    src: *const T,
    count: usize,
    dst_kind: DeviceKind,
    src_kind: DeviceKind,
) -> Result<()> {
    if count == 0 {
        return Ok(());
    }
    let bytes = count * size_of::<T>();
    tracing::trace!(dtype = %T::DTYPE, count, bytes, %dst_kind, %src_kind, "buffer copy");

    let engine = session.transfer_engine()?;
    unsafe { engine.transfer(dst.cast(), src.cast(), bytes, dst_kind, src_kind, session.stream()) }
}
