//! Caching pool over an upstream memory resource.

use std::collections::HashMap;
use std::ptr::NonNull;
use std::sync::Arc;

use mdbuf_dtype::DeviceKind;
use parking_lot::Mutex;
use snafu::ensure;

use crate::allocator::{ALLOCATION_ALIGNMENT, MemoryResource, align_up};
use crate::device::MemoryInfo;
use crate::error::{AllocationLimitSnafu, PoolConfigSnafu, Result, SizeOverflowSnafu};
use crate::stream::ExecutionStream;

/// Default number of cached blocks kept per block size.
const DEFAULT_MAX_BLOCKS_PER_SIZE: usize = 32;

/// A cached block. Only ever handed back to the resource it came from.
#[derive(Debug)]
struct Block(NonNull<u8>);

// Blocks are inert addresses while cached; ownership moves with the pool's lock.
unsafe impl Send for Block {}

#[derive(Debug, Default)]
struct PoolState {
    /// Block size -> free blocks of that size.
    free: HashMap<usize, Vec<Block>>,
    /// Bytes currently held from upstream, handed out or cached.
    pool_size: usize,
}

/// Pooling resource that caches freed blocks for reuse.
///
/// Requests are rounded up to [`ALLOCATION_ALIGNMENT`] and served from cached blocks of exactly that size when
/// available. The total held from upstream never exceeds `max_size`. When upstream is exhausted the cache is
/// released and the request retried once.
#[derive(Debug)]
pub struct PoolMemoryResource {
    upstream: Arc<dyn MemoryResource>,
    state: Mutex<PoolState>,
    min_size: usize,
    max_size: usize,
    max_blocks_per_size: usize,
    name: String,
}

impl PoolMemoryResource {
    /// Create a pool bounded by `max_size` bytes.
    ///
    /// Fails when `min_size > max_size`, or when `upstream` reports less free memory than `min_size`.
    pub fn new(upstream: Arc<dyn MemoryResource>, min_size: usize, max_size: usize) -> Result<Self> {
        ensure!(
            min_size <= max_size,
            PoolConfigSnafu { min_size, max_size, reason: "minimum size exceeds maximum size".to_string() }
        );
        if let Ok(MemoryInfo { free, .. }) = upstream.memory_info() {
            ensure!(
                min_size <= free,
                PoolConfigSnafu { min_size, max_size, reason: format!("only {free} bytes free upstream") }
            );
        }

        let name = format!("pool<{}>", upstream.name());
        tracing::debug!(resource = %name, min_size, max_size, "pool memory resource created");
        Ok(Self {
            upstream,
            state: Mutex::new(PoolState::default()),
            min_size,
            max_size,
            max_blocks_per_size: DEFAULT_MAX_BLOCKS_PER_SIZE,
            name,
        })
    }

    pub fn with_max_blocks_per_size(mut self, max_blocks_per_size: usize) -> Self {
        self.max_blocks_per_size = max_blocks_per_size;
        self
    }

    pub fn min_size(&self) -> usize {
        self.min_size
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    /// Bytes currently held from upstream (handed out plus cached).
    pub fn pool_size(&self) -> usize {
        self.state.lock().pool_size
    }

    /// Bytes sitting in the free cache.
    pub fn cached_bytes(&self) -> usize {
        self.state.lock().free.iter().map(|(size, blocks)| size * blocks.len()).sum()
    }

    /// Return every cached block to upstream.
    pub fn release(&self, stream: &ExecutionStream) {
        let mut state = self.state.lock();
        self.release_locked(&mut state, stream);
    }

    fn release_locked(&self, state: &mut PoolState, stream: &ExecutionStream) {
        for (size, blocks) in state.free.drain() {
            for block in blocks {
                unsafe { self.upstream.deallocate(block.0, size, stream) };
                state.pool_size -= size;
            }
        }
    }

    fn grow(&self, size: usize, stream: &ExecutionStream) -> Result<NonNull<u8>> {
        let mut state = self.state.lock();
        let fits = |pool_size: usize| pool_size.checked_add(size).is_some_and(|total| total <= self.max_size);

        if !fits(state.pool_size) {
            self.release_locked(&mut state, stream);
            ensure!(
                fits(state.pool_size),
                AllocationLimitSnafu { requested: size, allocated: state.pool_size, limit: self.max_size }
            );
        }

        let ptr = match self.upstream.allocate(size, stream) {
            Ok(ptr) => ptr,
            Err(err) => {
                // Upstream exhausted: hand back the cache and retry once.
                self.release_locked(&mut state, stream);
                self.upstream.allocate(size, stream).map_err(|_| err)?
            }
        };
        state.pool_size += size;
        Ok(ptr)
    }
}

impl MemoryResource for PoolMemoryResource {
    fn allocate(&self, bytes: usize, stream: &ExecutionStream) -> Result<NonNull<u8>> {
        let Some(size) = align_up(bytes, ALLOCATION_ALIGNMENT) else {
            return SizeOverflowSnafu { count: bytes, element_size: 1usize }.fail();
        };
        if size == 0 {
            return Ok(NonNull::dangling());
        }

        {
            let mut state = self.state.lock();
            if let Some(blocks) = state.free.get_mut(&size)
                && let Some(block) = blocks.pop()
            {
                if blocks.is_empty() {
                    state.free.remove(&size);
                }
                return Ok(block.0);
            }
        }

        self.grow(size, stream)
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>, bytes: usize, stream: &ExecutionStream) {
        let Some(size) = align_up(bytes, ALLOCATION_ALIGNMENT) else { return };
        if size == 0 {
            return;
        }

        let mut state = self.state.lock();
        let blocks = state.free.entry(size).or_default();
        if blocks.len() < self.max_blocks_per_size {
            blocks.push(Block(ptr));
        } else {
            unsafe { self.upstream.deallocate(ptr, size, stream) };
            state.pool_size -= size;
        }
    }

    fn device_kind(&self) -> DeviceKind {
        self.upstream.device_kind()
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn memory_info(&self) -> Result<MemoryInfo> {
        self.upstream.memory_info()
    }
}

impl Drop for PoolMemoryResource {
    fn drop(&mut self) {
        let stream = ExecutionStream::host();
        self.release(&stream);
    }
}
