//! Vocabulary types shared by every mdbuf crate.
//!
//! - [`MemoryKind`] says *where* bytes live (host, device, or managed memory visible to both).
//! - [`DeviceKind`] says *which executor* owns an allocation (CPU or accelerator).
//! - [`ExecutionDeviceId`] pairs an integer ordinal with a compile-time device tag.
//! - [`Shape`] is the extents descriptor buffers are sized from.
//! - [`Element`] bounds the scalar types a buffer may hold.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;

pub mod element;
pub mod shape;


pub use element::{Element, ScalarDType};
pub use shape::{Extents, Shape};

/// Location of a piece of memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
#[derive(strum::Display, strum::EnumIter, strum::VariantArray)]
pub enum MemoryKind {
    /// Ordinary host memory.
    #[default]
    Host,
    /// Accelerator-resident memory, not dereferenceable from the host.
    Device,
    /// Memory accessible from both host and accelerator without explicit transfer.
    Managed,
}

impl MemoryKind {
    pub const fn is_device_accessible(self) -> bool {
        matches!(self, Self::Device | Self::Managed)
    }

    pub const fn is_host_accessible(self) -> bool {
        matches!(self, Self::Host | Self::Managed)
    }

    pub const fn is_host_device_accessible(self) -> bool {
        matches!(self, Self::Managed)
    }

    /// The device kind that must own an allocation of this memory kind.
    ///
    /// Device-accessible memory (including managed) maps to the accelerator.
    pub const fn device_kind(self) -> DeviceKind {
        if self.is_device_accessible() { DeviceKind::Accelerator } else { DeviceKind::Cpu }
    }
}

/// Executor that owns an allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[derive(strum::Display, strum::EnumIter, strum::VariantArray)]
pub enum DeviceKind {
    #[strum(to_string = "CPU")]
    Cpu,
    #[strum(to_string = "GPU")]
    Accelerator,
}

impl DeviceKind {
    /// Memory kind produced by an owning allocation on this device kind.
    ///
    /// Owning allocations are never managed.
    pub const fn owned_memory_kind(self) -> MemoryKind {
        match self {
            Self::Cpu => MemoryKind::Host,
            Self::Accelerator => MemoryKind::Device,
        }
    }
}

/// Compile-time device tags.
pub mod tag {
    use super::{DeviceKind, MemoryKind};

    mod sealed {
        pub trait Sealed {}
    }

    /// Marker for the device kind an owning buffer allocates on.
    pub trait DeviceTag: sealed::Sealed + Copy + Default + std::fmt::Debug + Send + Sync + 'static {
        const KIND: DeviceKind;
    }

    /// Marker for the memory kind a non-owning buffer points into.
    pub trait MemoryTag: sealed::Sealed + Copy + Default + std::fmt::Debug + Send + Sync + 'static {
        const KIND: MemoryKind;
    }

    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
    pub struct Cpu;

    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
    pub struct Accelerator;

    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
    pub struct Host;

    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
    pub struct Device;

    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
    pub struct Managed;

    impl sealed::Sealed for Cpu {}
    impl sealed::Sealed for Accelerator {}
    impl sealed::Sealed for Host {}
    impl sealed::Sealed for Device {}
    impl sealed::Sealed for Managed {}

    impl DeviceTag for Cpu {
        const KIND: DeviceKind = DeviceKind::Cpu;
    }

    impl DeviceTag for Accelerator {
        const KIND: DeviceKind = DeviceKind::Accelerator;
    }

    impl MemoryTag for Host {
        const KIND: MemoryKind = MemoryKind::Host;
    }

    impl MemoryTag for Device {
        const KIND: MemoryKind = MemoryKind::Device;
    }

    impl MemoryTag for Managed {
        const KIND: MemoryKind = MemoryKind::Managed;
    }
}

/// Ordinal of a device whose kind is fixed at compile time.
pub struct ExecutionDeviceId<D: tag::DeviceTag> {
    id: i32,
    _tag: PhantomData<D>,
}

impl<D: tag::DeviceTag> ExecutionDeviceId<D> {
    pub const fn new(id: i32) -> Self {
        Self { id, _tag: PhantomData }
    }

    pub const fn value(&self) -> i32 {
        self.id
    }

    pub const fn kind(&self) -> DeviceKind {
        D::KIND
    }
}

impl<D: tag::DeviceTag> Default for ExecutionDeviceId<D> {
    fn default() -> Self {
        Self::new(0)
    }
}

impl<D: tag::DeviceTag> Clone for ExecutionDeviceId<D> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<D: tag::DeviceTag> Copy for ExecutionDeviceId<D> {}

impl<D: tag::DeviceTag> PartialEq for ExecutionDeviceId<D> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl<D: tag::DeviceTag> Eq for ExecutionDeviceId<D> {}

impl<D: tag::DeviceTag> Hash for ExecutionDeviceId<D> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        D::KIND.hash(state);
        self.id.hash(state);
    }
}

impl<D: tag::DeviceTag> fmt::Debug for ExecutionDeviceId<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionDeviceId").field("kind", &D::KIND).field("id", &self.id).finish()
    }
}

/// Ordinal of a device whose kind is only known at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeviceId {
    pub kind: DeviceKind,
    pub id: i32,
}

impl DeviceId {
    pub const fn cpu() -> Self {
        Self { kind: DeviceKind::Cpu, id: 0 }
    }

    pub const fn accelerator(id: i32) -> Self {
        Self { kind: DeviceKind::Accelerator, id }
    }

    /// Canonical string form, e.g. `"CPU"` or `"GPU:1"`.
    ///
    /// The CPU ordinal is omitted when it is zero.
    pub fn canonicalize(&self) -> String {
        match (self.kind, self.id) {
            (DeviceKind::Cpu, 0) => "CPU".to_string(),
            (kind, id) => format!("{kind}:{id}"),
        }
    }
}

impl Default for DeviceId {
    fn default() -> Self {
        Self::cpu()
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonicalize())
    }
}

impl<D: tag::DeviceTag> From<ExecutionDeviceId<D>> for DeviceId {
    fn from(id: ExecutionDeviceId<D>) -> Self {
        Self { kind: D::KIND, id: id.value() }
    }
}
