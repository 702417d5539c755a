//! Error types for debris.
//!
//! Capacity exhaustion is never an error: saturating queues and pools drop
//! work silently. What remains are construction-time configuration mismatches
//! and device setup failures.

use std::fmt;

/// Errors raised while validating a configuration or seeding buffers.
///
/// A system that fails with one of these never starts.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// Particle capacity was zero.
    ZeroCapacity,
    /// Fixed timestep was zero, negative or not finite.
    InvalidTimestep(f32),
    /// A dispatch over `count` elements needs more workgroups than a device allows.
    DispatchLimit { count: u32, groups: u32, max: u32 },
    /// The spatial hash grid covering the bounds has too many cells.
    GridTooLarge { cells: u64, max: u64 },
    /// Simulation bounds have zero or negative area.
    EmptyBounds,
    /// A provided buffer does not match the configured size.
    BufferSize {
        name: &'static str,
        expected: usize,
        actual: usize,
    },
    /// Any other rejected parameter.
    Invalid(&'static str),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::ZeroCapacity => write!(f, "Particle capacity must be greater than zero"),
            ConfigError::InvalidTimestep(dt) => {
                write!(f, "Fixed timestep must be positive and finite, got {}", dt)
            }
            ConfigError::DispatchLimit { count, groups, max } => write!(
                f,
                "Dispatch over {} elements needs {} workgroups, device limit is {}",
                count, groups, max
            ),
            ConfigError::GridTooLarge { cells, max } => write!(
                f,
                "Spatial hash grid has {} cells, at most {} are supported. Increase the particle spacing or shrink the bounds.",
                cells, max
            ),
            ConfigError::EmptyBounds => write!(f, "Simulation bounds must have a positive area"),
            ConfigError::BufferSize {
                name,
                expected,
                actual,
            } => write!(
                f,
                "Buffer '{}' holds {} elements, configuration expects {}",
                name, actual, expected
            ),
            ConfigError::Invalid(msg) => write!(f, "Invalid configuration: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Errors that can occur during GPU initialization and diagnostic readback.
#[derive(Debug)]
pub enum GpuError {
    /// No compatible GPU adapter found.
    NoAdapter,
    /// Failed to create GPU device.
    DeviceCreation(wgpu::RequestDeviceError),
    /// Failed to map buffer for reading.
    BufferMapping(String),
}

impl fmt::Display for GpuError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GpuError::NoAdapter => write!(f, "No compatible GPU adapter found. Ensure your system has a GPU with WebGPU/Vulkan/Metal/DX12 support."),
            GpuError::DeviceCreation(e) => write!(f, "Failed to create GPU device: {}", e),
            GpuError::BufferMapping(msg) => write!(f, "Failed to map GPU buffer: {}", msg),
        }
    }
}

impl std::error::Error for GpuError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            GpuError::DeviceCreation(e) => Some(e),
            _ => None,
        }
    }
}

impl From<wgpu::RequestDeviceError> for GpuError {
    fn from(e: wgpu::RequestDeviceError) -> Self {
        GpuError::DeviceCreation(e)
    }
}

/// Errors that can occur when constructing a device-backed debris system.
#[derive(Debug)]
pub enum DebrisError {
    /// Configuration rejected before any resource was created.
    Config(ConfigError),
    /// GPU initialization or readback failed.
    Gpu(GpuError),
}

impl fmt::Display for DebrisError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DebrisError::Config(e) => write!(f, "Configuration error: {}", e),
            DebrisError::Gpu(e) => write!(f, "GPU error: {}", e),
        }
    }
}

impl std::error::Error for DebrisError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DebrisError::Config(e) => Some(e),
            DebrisError::Gpu(e) => Some(e),
        }
    }
}

impl From<ConfigError> for DebrisError {
    fn from(e: ConfigError) -> Self {
        DebrisError::Config(e)
    }
}

impl From<GpuError> for DebrisError {
    fn from(e: GpuError) -> Self {
        DebrisError::Gpu(e)
    }
}
