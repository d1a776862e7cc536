//! Device selection.
//!
//! Resolves the configured device kind to a concrete choice, preferring a
//! discrete GPU when one is detected and the caller asked for `auto`.

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use tracing::info;

use crate::error::Error;

/// Requested device kind
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DeviceKind {
    /// GPU when detected, CPU otherwise
    Auto,
    /// CPU backend
    Cpu,
    /// GPU backend
    Gpu,
}

impl std::fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeviceKind::Auto => write!(f, "auto"),
            DeviceKind::Cpu => write!(f, "cpu"),
            DeviceKind::Gpu => write!(f, "gpu"),
        }
    }
}

impl FromStr for DeviceKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "auto" => Ok(DeviceKind::Auto),
            "cpu" => Ok(DeviceKind::Cpu),
            "gpu" | "cuda" => Ok(DeviceKind::Gpu),
            other => Err(Error::Device(format!("unknown device kind '{other}'"))),
        }
    }
}

/// A resolved device choice
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Device {
    /// CPU
    Cpu,
    /// GPU with the given index
    Gpu(usize),
}

impl std::fmt::Display for Device {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Device::Cpu => write!(f, "CPU"),
            Device::Gpu(id) => write!(f, "GPU:{}", id),
        }
    }
}

/// Resolve a requested kind and index to a device
pub fn resolve_device(kind: DeviceKind, index: usize) -> Device {
    let device = match kind {
        DeviceKind::Cpu => Device::Cpu,
        DeviceKind::Gpu => Device::Gpu(index),
        DeviceKind::Auto => {
            if is_gpu_available() {
                Device::Gpu(index)
            } else {
                Device::Cpu
            }
        }
    };

    info!("Resolved device {} (requested {})", device, kind);
    device
}

/// Check if any discrete GPU is present
pub fn is_gpu_available() -> bool {
    has_nvidia_gpu() || has_amd_gpu()
}

fn has_nvidia_gpu() -> bool {
    #[cfg(target_os = "linux")]
    {
        std::path::Path::new("/proc/driver/nvidia/version").exists()
            || std::path::Path::new("/dev/nvidia0").exists()
    }

    #[cfg(target_os = "windows")]
    {
        std::process::Command::new("nvidia-smi.exe")
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false)
    }

    #[cfg(not(any(target_os = "linux", target_os = "windows")))]
    {
        false
    }
}

fn has_amd_gpu() -> bool {
    #[cfg(target_os = "linux")]
    {
        std::path::Path::new("/sys/module/amdgpu").exists()
    }

    #[cfg(not(target_os = "linux"))]
    {
        false
    }
}
