//! Timeline signals backing host execution streams.
//!
//! A timeline signal is a monotonically increasing counter. Producers advance it when an
//! operation completes; waiters block until it reaches the value they were issued.

use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::{Condvar, Mutex};

/// Monotonic timeline signal.
///
/// All implementations must be `Send + Sync` for cross-thread use.
pub trait TimelineSignal: Send + Sync + std::fmt::Debug {
    /// Get the current signal value.
    fn value(&self) -> u64;

    /// Advance the signal to `value`. Values lower than the current one are ignored.
    fn set(&self, value: u64);

    /// Block until the signal reaches or exceeds `value`.
    fn wait(&self, value: u64);

    /// Check if the signal has reached `value` without blocking.
    fn is_reached(&self, value: u64) -> bool {
        self.value() >= value
    }
}

/// CPU timeline signal using an atomic counter and a `parking_lot` condvar.
#[derive(Debug)]
pub struct CpuTimelineSignal {
    value: AtomicU64,
    /// Protects nothing, paired with the condvar.
    mutex: Mutex<()>,
    condvar: Condvar,
}

impl Default for CpuTimelineSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl CpuTimelineSignal {
    pub fn new() -> Self {
        Self::with_initial(0)
    }

    pub fn with_initial(initial: u64) -> Self {
        Self { value: AtomicU64::new(initial), mutex: Mutex::new(()), condvar: Condvar::new() }
    }
}

impl TimelineSignal for CpuTimelineSignal {
    fn value(&self) -> u64 {
        self.value.load(Ordering::Acquire)
    }

    fn set(&self, value: u64) {
        // Operations issued from several threads may finish out of order.
        self.value.fetch_max(value, Ordering::AcqRel);

        let _guard = self.mutex.lock();
        self.condvar.notify_all();
    }

    fn wait(&self, target: u64) {
        if self.value.load(Ordering::Acquire) >= target {
            return;
        }

        let mut guard = self.mutex.lock();
        while self.value.load(Ordering::Acquire) < target {
            self.condvar.wait(&mut guard);
        }
    }
}
