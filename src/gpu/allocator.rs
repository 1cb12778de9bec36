//! Caching VRAM allocator used by the simulated device.
//!
//! Mirrors the accounting of a framework caching allocator: freeing a block
//! lowers `allocated` but the memory stays `reserved` by the process until
//! [`CachingAllocator::empty_cache`] hands it back.

use std::any::Any;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum DeviceError {
    #[error("CUDA out of memory: tried to allocate {requested} bytes ({allocated} of {total} bytes in use)")]
    OutOfMemory {
        requested: u64,
        allocated: u64,
        total: u64,
    },

    #[error("Device {0} not available")]
    Unavailable(usize),

    #[error("Driver error: {0}")]
    Driver(String),
}

#[derive(Debug, Default)]
struct Accounting {
    allocated: u64,
    reserved: u64,
}

/// Shared allocator state. Cloning hands out another handle to the same pool.
#[derive(Debug, Clone)]
pub struct CachingAllocator {
    total: u64,
    state: Arc<Mutex<Accounting>>,
}

impl CachingAllocator {
    pub fn new(total: u64) -> Self {
        Self {
            total,
            state: Arc::new(Mutex::new(Accounting::default())),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Accounting> {
        // Accounting is plain integers; a poisoned lock still holds valid numbers.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Allocate `bytes`, failing when the device would exceed its capacity.
    pub fn allocate(&self, bytes: u64) -> Result<DeviceAllocation, DeviceError> {
        let mut acct = self.lock();
        if acct.allocated + bytes > self.total {
            return Err(DeviceError::OutOfMemory {
                requested: bytes,
                allocated: acct.allocated,
                total: self.total,
            });
        }
        acct.allocated += bytes;
        acct.reserved = acct.reserved.max(acct.allocated);
        debug!(bytes, allocated = acct.allocated, "Allocated device block");

        Ok(DeviceAllocation::owned(
            bytes,
            Block {
                pool: self.clone(),
                bytes,
            },
        ))
    }

    /// Return cached-but-unused memory to the device.
    pub fn empty_cache(&self) -> u64 {
        let mut acct = self.lock();
        let released = acct.reserved - acct.allocated;
        acct.reserved = acct.allocated;
        released
    }

    pub fn allocated(&self) -> u64 {
        self.lock().allocated
    }

    pub fn reserved(&self) -> u64 {
        self.lock().reserved
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    fn release(&self, bytes: u64) {
        let mut acct = self.lock();
        acct.allocated = acct.allocated.saturating_sub(bytes);
        debug!(bytes, allocated = acct.allocated, "Freed device block");
    }
}

struct Block {
    pool: CachingAllocator,
    bytes: u64,
}

impl Drop for Block {
    fn drop(&mut self) {
        self.pool.release(self.bytes);
    }
}

/// Device memory held by a loaded model. Dropping it frees the memory.
pub struct DeviceAllocation {
    bytes: u64,
    _owner: Option<Box<dyn Any + Send>>,
}

impl DeviceAllocation {
    /// An allocation that holds nothing (CPU backend).
    pub fn host(bytes: u64) -> Self {
        Self {
            bytes,
            _owner: None,
        }
    }

    /// Wrap whatever owns the device memory; the memory lives as long as `owner`.
    pub fn owned(bytes: u64, owner: impl Any + Send) -> Self {
        Self {
            bytes,
            _owner: Some(Box::new(owner)),
        }
    }

    pub fn bytes(&self) -> u64 {
        self.bytes
    }
}

impl fmt::Debug for DeviceAllocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceAllocation")
            .field("bytes", &self.bytes)
            .field("on_device", &self._owner.is_some())
            .finish()
    }
}
