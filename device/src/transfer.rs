//! Transfer engines: byte copies between any pairing of host and accelerator memory.

use std::fmt;
#[cfg(feature = "cuda")]
use std::sync::Arc;

#[cfg(feature = "cuda")]
use cudarc::driver::{CudaContext, result, sys};
use mdbuf_dtype::DeviceKind;
#[cfg(feature = "cuda")]
use snafu::ResultExt;

use crate::error::Result;
use crate::stream::ExecutionStream;

#[cfg(feature = "cuda")]
use crate::error::CudaSnafu;

/// Copies raw bytes between two locations, ordered on a stream.
///
/// Implementations must support all four pairings of `dst_kind` and `src_kind`.
pub trait TransferEngine: Send + Sync + fmt::Debug {
    /// Copy `bytes` bytes from `src` to `dst`.
    ///
    /// # Safety
    ///
    /// `src` must be valid for `bytes` reads and `dst` for `bytes` writes, each in the memory space named by its
    /// kind, for as long as the operation is pending on `stream`.
    unsafe fn transfer(
        &self,
        dst: *mut u8,
        src: *const u8,
        bytes: usize,
        dst_kind: DeviceKind,
        src_kind: DeviceKind,
        stream: &ExecutionStream,
    ) -> Result<()>;

    fn name(&self) -> &str;
}

/// Transfer engine for host memory and emulated accelerator memory.
///
/// Every pairing is a host `memmove` executed inline on the stream.
#[derive(Debug, Clone, Default)]
pub struct HostTransferEngine;

impl TransferEngine for HostTransferEngine {
    unsafe fn transfer(
        &self,
        dst: *mut u8,
        src: *const u8,
        bytes: usize,
        dst_kind: DeviceKind,
        src_kind: DeviceKind,
        stream: &ExecutionStream,
    ) -> Result<()> {
        tracing::trace!(bytes, %dst_kind, %src_kind, "host transfer");
        stream.enqueue(|| {
            // Non-owning views may alias, so this must tolerate overlap.
            unsafe { std::ptr::copy(src, dst, bytes) };
            Ok(())
        })
    }

    fn name(&self) -> &str {
        "host"
    }
}

/// Transfer engine backed by the CUDA driver's async memcpy family.
#[cfg(feature = "cuda")]
#[derive(Debug, Clone)]
pub struct CudaTransferEngine {
    context: Arc<CudaContext>,
}

#[cfg(feature = "cuda")]
impl CudaTransferEngine {
    pub fn new(context: Arc<CudaContext>) -> Self {
        Self { context }
    }
}

#[cfg(feature = "cuda")]
impl TransferEngine for CudaTransferEngine {
    unsafe fn transfer(
        &self,
        dst: *mut u8,
        src: *const u8,
        bytes: usize,
        dst_kind: DeviceKind,
        src_kind: DeviceKind,
        stream: &ExecutionStream,
    ) -> Result<()> {
        tracing::trace!(bytes, %dst_kind, %src_kind, "cuda transfer");
        self.context.bind_to_thread().context(CudaSnafu)?;
        let stream = match stream.as_cuda() {
            Some(stream) => Arc::clone(stream),
            None => self.context.default_stream(),
        };
        let cu_stream: sys::CUstream = stream.cu_stream();
        let dptr = |ptr: *const u8| ptr as usize as sys::CUdeviceptr;

        match (dst_kind, src_kind) {
            (DeviceKind::Cpu, DeviceKind::Cpu) => {
                // Earlier async copies on this stream may still be writing `src` or reading `dst`.
                stream.synchronize().context(CudaSnafu)?;
                unsafe { std::ptr::copy(src, dst, bytes) };
                Ok(())
            }
            (DeviceKind::Accelerator, DeviceKind::Cpu) => {
                let src = unsafe { std::slice::from_raw_parts(src, bytes) };
                unsafe { result::memcpy_htod_async(dptr(dst), src, cu_stream) }.context(CudaSnafu)
            }
            (DeviceKind::Cpu, DeviceKind::Accelerator) => {
                let dst = unsafe { std::slice::from_raw_parts_mut(dst, bytes) };
                unsafe { result::memcpy_dtoh_async(dst, dptr(src), cu_stream) }.context(CudaSnafu)
            }
            (DeviceKind::Accelerator, DeviceKind::Accelerator) => {
                unsafe { result::memcpy_dtod_async(dptr(dst), dptr(src), bytes, cu_stream) }.context(CudaSnafu)
            }
        }
    }

    fn name(&self) -> &str {
        "cuda"
    }
}
