//! Execution streams: ordering tokens for allocation and transfer work.
//!
//! A host stream runs every operation inline on the issuing thread and records its completion
//! on a [`CpuTimelineSignal`]. A CUDA stream (feature `cuda`) enqueues work on the device, and
//! [`synchronize`] is the only point where the caller blocks on it.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

#[cfg(feature = "cuda")]
use cudarc::driver::CudaStream;
use parking_lot::Mutex;
#[cfg(feature = "cuda")]
use snafu::ResultExt;

use crate::error::Result;
use crate::sync::{CpuTimelineSignal, TimelineSignal};

#[cfg(feature = "cuda")]
use crate::error::CudaSnafu;

#[derive(Debug, Default)]
struct Tickets {
    /// Highest ticket handed out.
    issued: u64,
    /// Tickets whose operation has not finished yet.
    in_flight: BTreeSet<u64>,
}

#[derive(Debug)]
struct HostStream {
    tickets: Mutex<Tickets>,
    /// Every ticket up to this value has completed.
    completed: CpuTimelineSignal,
}

impl HostStream {
    fn issue(&self) -> u64 {
        let mut tickets = self.tickets.lock();
        tickets.issued += 1;
        let ticket = tickets.issued;
        tickets.in_flight.insert(ticket);
        ticket
    }

    fn retire(&self, ticket: u64) {
        let watermark = {
            let mut tickets = self.tickets.lock();
            tickets.in_flight.remove(&ticket);
            match tickets.in_flight.first() {
                Some(oldest) => oldest - 1,
                None => tickets.issued,
            }
        };
        self.completed.set(watermark);
    }

    fn issued(&self) -> u64 {
        self.tickets.lock().issued
    }
}

#[derive(Clone)]
enum StreamHandle {
    Host(Arc<HostStream>),
    #[cfg(feature = "cuda")]
    Cuda(Arc<CudaStream>),
}

/// Opaque ordering/synchronization token. Cloning yields a handle to the same stream.
#[derive(Clone)]
pub struct ExecutionStream {
    handle: StreamHandle,
}

impl ExecutionStream {
    /// A stream that executes operations synchronously on the calling thread.
    pub fn host() -> Self {
        let stream = HostStream { tickets: Mutex::new(Tickets::default()), completed: CpuTimelineSignal::new() };
        Self { handle: StreamHandle::Host(Arc::new(stream)) }
    }

    #[cfg(feature = "cuda")]
    pub fn cuda(stream: Arc<CudaStream>) -> Self {
        Self { handle: StreamHandle::Cuda(stream) }
    }

    pub fn is_host(&self) -> bool {
        matches!(self.handle, StreamHandle::Host(_))
    }

    #[cfg(feature = "cuda")]
    pub fn as_cuda(&self) -> Option<&Arc<CudaStream>> {
        match &self.handle {
            StreamHandle::Cuda(stream) => Some(stream),
            StreamHandle::Host(_) => None,
        }
    }

    /// Number of operations issued on a host stream (always 0 for device streams).
    pub fn issued(&self) -> u64 {
        match &self.handle {
            StreamHandle::Host(stream) => stream.issued(),
            #[cfg(feature = "cuda")]
            StreamHandle::Cuda(_) => 0,
        }
    }

    /// Whether two handles refer to the same underlying stream.
    pub fn same_stream(&self, other: &ExecutionStream) -> bool {
        match (&self.handle, &other.handle) {
            (StreamHandle::Host(a), StreamHandle::Host(b)) => Arc::ptr_eq(a, b),
            #[cfg(feature = "cuda")]
            (StreamHandle::Cuda(a), StreamHandle::Cuda(b)) => Arc::ptr_eq(a, b),
            #[cfg(feature = "cuda")]
            _ => false,
        }
    }

    /// Run `op` in stream order.
    ///
    /// On a host stream the operation executes immediately on the calling thread and its ticket is retired once
    /// it returns; the completed watermark only moves past tickets whose predecessors are done. On a device stream
    /// `op` is expected to enqueue asynchronous work on that stream itself, so it is simply invoked.
    pub(crate) fn enqueue<F>(&self, op: F) -> Result<()>
    where
        F: FnOnce() -> Result<()>,
    {
        match &self.handle {
            StreamHandle::Host(stream) => {
                let ticket = stream.issue();
                let result = op();
                stream.retire(ticket);
                result
            }
            #[cfg(feature = "cuda")]
            StreamHandle::Cuda(_) => op(),
        }
    }

    /// Block until every operation issued on this stream has completed.
    pub fn synchronize(&self) -> Result<()> {
        match &self.handle {
            StreamHandle::Host(stream) => {
                stream.completed.wait(stream.issued());
                Ok(())
            }
            #[cfg(feature = "cuda")]
            StreamHandle::Cuda(stream) => stream.synchronize().context(CudaSnafu),
        }
    }
}

impl Default for ExecutionStream {
    fn default() -> Self {
        Self::host()
    }
}

impl fmt::Debug for ExecutionStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.handle {
            StreamHandle::Host(stream) => f
                .debug_struct("ExecutionStream::Host")
                .field("issued", &stream.issued())
                .field("completed", &stream.completed.value())
                .finish(),
            #[cfg(feature = "cuda")]
            StreamHandle::Cuda(_) => f.debug_struct("ExecutionStream::Cuda").finish_non_exhaustive(),
        }
    }
}

/// Block the calling thread until all work issued on `stream` has completed.
pub fn synchronize(stream: &ExecutionStream) -> Result<()> {
    stream.synchronize()
}
