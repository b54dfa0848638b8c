//! GPU memory allocation, built on `gpu_allocator::vulkan::Allocator`
//! (`AllocatorCreateDesc`, `AllocationCreateDesc`, `allocate`/`free`).
//! Kept as its own component, decoupled from device bring-up and from the
//! buffer type that wraps the resulting `vk::Buffer`.

use crate::error::{Error, Result};
use crate::vk::device::DeviceContext;
use gpu_allocator::vulkan as ga;
use gpu_allocator::MemoryLocation;
use parking_lot::Mutex;
use tracing::trace;

/// Wraps one `gpu_allocator::vulkan::Allocator` bound to a [`DeviceContext`].
///
/// Mutexed rather than `&mut`-borrowed: buffers for independent sequences are
/// allocated concurrently from different worker threads.
pub struct Allocator {
    inner: Mutex<ga::Allocator>,
}

impl Allocator {
    pub fn new(device: &DeviceContext) -> Result<Self> {
        let desc = ga::AllocatorCreateDesc {
            instance: device.instance().clone(),
            device: device.logical_device().clone(),
            physical_device: device.physical_device(),
            debug_settings: Default::default(),
            buffer_device_address: true,
            allocation_sizes: Default::default(),
        };
        let inner = ga::Allocator::new(&desc).map_err(|_| Error::OutOfMemory)?;
        Ok(Allocator {
            inner: Mutex::new(inner),
        })
    }

    /// Allocates device memory matching `requirements` at `location` and
    /// returns the raw allocation; the caller binds it to a `vk::Buffer` (see
    /// [`crate::vk::Buffer`]).
    pub fn allocate(
        &self,
        name: &str,
        requirements: ash::vk::MemoryRequirements,
        location: MemoryLocation,
    ) -> Result<ga::Allocation> {
        let desc = ga::AllocationCreateDesc {
            name,
            requirements,
            location,
            linear: true,
            allocation_scheme: ga::AllocationScheme::GpuAllocatorManaged,
        };
        let allocation = self
            .inner
            .lock()
            .allocate(&desc)
            .map_err(|_| Error::OutOfMemory)?;
        trace!(name, size = requirements.size, "allocated device memory");
        Ok(allocation)
    }

    pub fn free(&self, allocation: ga::Allocation) -> Result<()> {
        self.inner
            .lock()
            .free(allocation)
            .map_err(|_| Error::OutOfMemory)
    }
}
