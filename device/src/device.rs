//! Device identity parsing and memory capacity reporting.

use mdbuf_dtype::{DeviceId, DeviceKind};

use crate::error::{InvalidDeviceSnafu, Result};

/// Extension trait for [`DeviceId`] to add parsing.
///
/// Lives in the device crate because parse failures are device errors.
pub trait DeviceIdExt: Sized {
    /// Parse a device string.
    ///
    /// Examples:
    /// - "CPU" -> DeviceId::cpu()
    /// - "GPU:1" / "CUDA:1" / "ACCELERATOR:1" -> DeviceId::accelerator(1)
    /// - "cuda" -> DeviceId::accelerator(0)
    fn parse(s: &str) -> Result<Self>;
}

impl DeviceIdExt for DeviceId {
    fn parse(s: &str) -> Result<Self> {
        let s = s.trim().to_uppercase();
        let (name, ordinal) = match s.split_once(':') {
            Some((name, ordinal)) => (name, Some(ordinal)),
            None => (s.as_str(), None),
        };

        let kind = match name {
            "CPU" | "HOST" => DeviceKind::Cpu,
            "GPU" | "CUDA" | "ACCELERATOR" => DeviceKind::Accelerator,
            _ => return InvalidDeviceSnafu { device: s.clone() }.fail(),
        };

        let id = match ordinal {
            Some(ordinal) => match ordinal.parse::<i32>() {
                Ok(id) if id >= 0 => id,
                _ => return InvalidDeviceSnafu { device: s.clone() }.fail(),
            },
            None => 0,
        };

        Ok(DeviceId { kind, id })
    }
}

/// Free and total bytes reported by a memory resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryInfo {
    pub free: usize,
    pub total: usize,
}

impl MemoryInfo {
    pub fn used(&self) -> usize {
        self.total.saturating_sub(self.free)
    }
}
