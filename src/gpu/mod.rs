//! Compute device access and VRAM accounting.
//!
//! - [`device`]: device backends and telemetry
//! - [`allocator`]: caching allocator behind the simulated device

pub mod allocator;
pub mod device;

pub use allocator::{DeviceAllocation, DeviceError};
pub use device::{open_device, ComputeDevice, CpuDevice, DeviceSnapshot, SharedDevice, SimulatedDevice, MB};
