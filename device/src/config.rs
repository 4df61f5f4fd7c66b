//! Session configuration.
//!
//! Provides typed configuration with a bon builder and environment variable fallbacks.

use bon::bon;
use mdbuf_dtype::DeviceId;

use crate::device::DeviceIdExt;

/// Default capacity of the emulated accelerator: 8 GiB.
pub const DEFAULT_EMULATED_CAPACITY: usize = 8 << 30;

/// Accelerator backend a session allocates and transfers with.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, strum::Display)]
pub enum Backend {
    /// Accelerator memory emulated in host RAM (default).
    #[default]
    #[strum(to_string = "emulated")]
    Emulated,

    /// CUDA driver via `cudarc` (requires the `cuda` feature).
    #[strum(to_string = "cuda")]
    Cuda,
}

impl Backend {
    /// Select backend from environment variable `MDBUF_BACKEND`.
    pub fn from_env() -> Self {
        match std::env::var("MDBUF_BACKEND").as_deref() {
            Ok("cuda") | Ok("CUDA") => Backend::Cuda,
            Ok("emulated") | Ok("EMULATED") => Backend::Emulated,
            _ => Backend::default(),
        }
    }
}

/// Configuration for a [`Session`](crate::Session).
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Accelerator backend.
    pub backend: Backend,
    /// Accelerator the session allocates on.
    pub device: DeviceId,
    /// Capacity reported by the emulated accelerator.
    pub emulated_capacity: usize,
    /// Explicit workspace ceiling; half of free accelerator memory when unset.
    pub workspace_limit: Option<usize>,
    /// Workspace allocation alignment.
    pub workspace_alignment: Option<usize>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            backend: Backend::default(),
            device: DeviceId::accelerator(0),
            emulated_capacity: DEFAULT_EMULATED_CAPACITY,
            workspace_limit: None,
            workspace_alignment: None,
        }
    }
}

#[bon]
impl SessionConfig {
    /// Create a session configuration with builder pattern.
    #[builder]
    pub fn new(
        #[builder(default)] backend: Backend,
        #[builder(default = 0)] device_ordinal: i32,
        #[builder(default = DEFAULT_EMULATED_CAPACITY)] emulated_capacity: usize,
        workspace_limit: Option<usize>,
        workspace_alignment: Option<usize>,
    ) -> Self {
        Self {
            backend,
            device: DeviceId::accelerator(device_ordinal),
            emulated_capacity,
            workspace_limit,
            workspace_alignment,
        }
    }

    /// Create configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// * `MDBUF_BACKEND` - `emulated` (default) or `cuda`
    /// * `MDBUF_DEVICE` - Accelerator to use, e.g. `GPU:1` (default: `GPU:0`)
    /// * `MDBUF_EMULATED_CAPACITY` - Emulated accelerator capacity in bytes (default: 8 GiB)
    /// * `MDBUF_WORKSPACE_LIMIT` - Workspace ceiling in bytes (default: half of free accelerator memory)
    /// * `MDBUF_WORKSPACE_ALIGNMENT` - Workspace alignment in bytes (default: 256)
    ///
    /// Unparsable values fall back to their defaults.
    pub fn from_env() -> Self {
        let backend = Backend::from_env();
        let device = std::env::var("MDBUF_DEVICE")
            .ok()
            .and_then(|s| <DeviceId as DeviceIdExt>::parse(&s).ok())
            .filter(|device| device.kind == mdbuf_dtype::DeviceKind::Accelerator)
            .unwrap_or(DeviceId::accelerator(0));
        let emulated_capacity = std::env::var("MDBUF_EMULATED_CAPACITY")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_EMULATED_CAPACITY);
        let workspace_limit = std::env::var("MDBUF_WORKSPACE_LIMIT").ok().and_then(|s| s.parse().ok());
        let workspace_alignment = std::env::var("MDBUF_WORKSPACE_ALIGNMENT").ok().and_then(|s| s.parse().ok());

        Self { backend, device, emulated_capacity, workspace_limit, workspace_alignment }
    }
}
