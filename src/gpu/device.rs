//! Compute device discovery and telemetry.
//!
//! The resource manager and the HTTP stats surface only ever talk to a
//! [`ComputeDevice`]. Three backends exist:
//! - [`CpuDevice`]: no accelerator, every memory query reads 0.
//! - [`SimulatedDevice`]: an in-process card backed by [`CachingAllocator`].
//! - `CudaDevice` (feature `cuda`): driver-API telemetry through `cudarc`.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::{DeviceKind, GpuConfig};
use crate::gpu::allocator::{CachingAllocator, DeviceAllocation, DeviceError};

/// Bytes per MB, the unit budgets are expressed in.
pub const MB: u64 = 1024 * 1024;

/// Device telemetry and memory control.
pub trait ComputeDevice: Send + Sync {
    fn is_available(&self) -> bool;

    fn device_name(&self) -> Option<String>;

    /// Total device memory in bytes.
    fn total_memory(&self) -> u64;

    /// Bytes currently held by live tensors.
    fn allocated_memory(&self) -> u64;

    /// Bytes held by the process, including cached free blocks.
    fn reserved_memory(&self) -> u64;

    /// Place `bytes` of model weights on the device.
    fn allocate(&self, bytes: u64) -> Result<DeviceAllocation, DeviceError>;

    /// Release cached free memory back to the device. Returns bytes released.
    fn empty_cache(&self) -> u64;

    /// Point-in-time view for the stats surface.
    fn snapshot(&self) -> DeviceSnapshot {
        DeviceSnapshot {
            available: self.is_available(),
            name: self.device_name(),
            total_bytes: self.total_memory(),
            allocated_bytes: self.allocated_memory(),
            reserved_bytes: self.reserved_memory(),
        }
    }
}

pub type SharedDevice = Arc<dyn ComputeDevice>;

/// Memory figures of a device at one instant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceSnapshot {
    pub available: bool,
    pub name: Option<String>,
    pub total_bytes: u64,
    pub allocated_bytes: u64,
    pub reserved_bytes: u64,
}

/// Fallback when no accelerator is present.
#[derive(Debug, Default)]
pub struct CpuDevice;

impl ComputeDevice for CpuDevice {
    fn is_available(&self) -> bool {
        false
    }

    fn device_name(&self) -> Option<String> {
        None
    }

    fn total_memory(&self) -> u64 {
        0
    }

    fn allocated_memory(&self) -> u64 {
        0
    }

    fn reserved_memory(&self) -> u64 {
        0
    }

    fn allocate(&self, bytes: u64) -> Result<DeviceAllocation, DeviceError> {
        Ok(DeviceAllocation::host(bytes))
    }

    fn empty_cache(&self) -> u64 {
        0
    }
}

/// In-process stand-in for a single card.
#[derive(Debug, Clone)]
pub struct SimulatedDevice {
    name: String,
    pool: CachingAllocator,
}

impl SimulatedDevice {
    pub fn new(name: impl Into<String>, total_bytes: u64) -> Self {
        Self {
            name: name.into(),
            pool: CachingAllocator::new(total_bytes),
        }
    }

    /// The 8 GB card the service was sized for.
    pub fn rtx_3050() -> Self {
        Self::new("NVIDIA GeForce RTX 3050", 8192 * MB)
    }
}

impl ComputeDevice for SimulatedDevice {
    fn is_available(&self) -> bool {
        true
    }

    fn device_name(&self) -> Option<String> {
        Some(self.name.clone())
    }

    fn total_memory(&self) -> u64 {
        self.pool.total()
    }

    fn allocated_memory(&self) -> u64 {
        self.pool.allocated()
    }

    fn reserved_memory(&self) -> u64 {
        self.pool.reserved()
    }

    fn allocate(&self, bytes: u64) -> Result<DeviceAllocation, DeviceError> {
        self.pool.allocate(bytes)
    }

    fn empty_cache(&self) -> u64 {
        self.pool.empty_cache()
    }
}

#[cfg(feature = "cuda")]
pub use cuda::CudaDevice;

#[cfg(feature = "cuda")]
mod cuda {
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Arc;

    use cudarc::driver::{CudaContext, CudaSlice};

    use super::ComputeDevice;
    use crate::gpu::allocator::{DeviceAllocation, DeviceError};

    /// A CUDA card queried through the driver API.
    ///
    /// The driver has no caching allocator, so `reserved` tracks what this
    /// process placed on the device and equals `allocated`.
    pub struct CudaDevice {
        ctx: Arc<CudaContext>,
        name: String,
        total: u64,
        allocated: Arc<AtomicU64>,
    }

    struct Weights {
        _slice: CudaSlice<u8>,
        bytes: u64,
        counter: Arc<AtomicU64>,
    }

    impl Drop for Weights {
        fn drop(&mut self) {
            self.counter.fetch_sub(self.bytes, Ordering::SeqCst);
        }
    }

    impl CudaDevice {
        pub fn open(ordinal: usize) -> Result<Self, DeviceError> {
            let ctx = CudaContext::new(ordinal).map_err(|e| DeviceError::Driver(e.to_string()))?;
            let name = ctx.name().map_err(|e| DeviceError::Driver(e.to_string()))?;
            let (_, total) = cudarc::driver::result::mem_get_info()
                .map_err(|e| DeviceError::Driver(e.to_string()))?;
            Ok(Self {
                ctx,
                name,
                total: total as u64,
                allocated: Arc::new(AtomicU64::new(0)),
            })
        }
    }

    impl ComputeDevice for CudaDevice {
        fn is_available(&self) -> bool {
            true
        }

        fn device_name(&self) -> Option<String> {
            Some(self.name.clone())
        }

        fn total_memory(&self) -> u64 {
            self.total
        }

        fn allocated_memory(&self) -> u64 {
            self.allocated.load(Ordering::SeqCst)
        }

        fn reserved_memory(&self) -> u64 {
            self.allocated.load(Ordering::SeqCst)
        }

        fn allocate(&self, bytes: u64) -> Result<DeviceAllocation, DeviceError> {
            let stream = self.ctx.default_stream();
            let slice = stream
                .alloc_zeros::<u8>(bytes as usize)
                .map_err(|e| {
                    tracing::warn!(error = %e, bytes, "Device allocation failed");
                    DeviceError::OutOfMemory {
                        requested: bytes,
                        allocated: self.allocated_memory(),
                        total: self.total,
                    }
                })?;
            self.allocated.fetch_add(bytes, Ordering::SeqCst);
            Ok(DeviceAllocation::owned(
                bytes,
                Weights {
                    _slice: slice,
                    bytes,
                    counter: self.allocated.clone(),
                },
            ))
        }

        fn empty_cache(&self) -> u64 {
            0
        }
    }
}

/// Open the device selected by configuration.
///
/// `auto` picks CUDA when compiled in and a card is present, otherwise falls
/// back to the CPU backend.
pub fn open_device(config: &GpuConfig) -> Result<SharedDevice, DeviceError> {
    let device: SharedDevice = match config.device {
        DeviceKind::Cpu => Arc::new(CpuDevice),
        DeviceKind::Simulated => Arc::new(SimulatedDevice::new(
            config.simulated_name.clone(),
            config.simulated_total_mb * MB,
        )),
        DeviceKind::Cuda => open_cuda(config.device_index)?,
        DeviceKind::Auto => match open_cuda(config.device_index) {
            Ok(device) => device,
            Err(e) => {
                warn!(error = %e, "CUDA not available, using CPU");
                Arc::new(CpuDevice)
            }
        },
    };

    match device.device_name() {
        Some(name) => info!(
            device = name,
            total_mb = device.total_memory() / MB,
            "Compute device initialized"
        ),
        None => info!("Running in CPU-only mode"),
    }

    Ok(device)
}

#[cfg(feature = "cuda")]
fn open_cuda(ordinal: usize) -> Result<SharedDevice, DeviceError> {
    Ok(Arc::new(CudaDevice::open(ordinal)?))
}

#[cfg(not(feature = "cuda"))]
fn open_cuda(ordinal: usize) -> Result<SharedDevice, DeviceError> {
    Err(DeviceError::Unavailable(ordinal))
}
