//! Factory for buffers, algorithms and sequences, with weak-reference
//! tracking so teardown order is enforced even if a caller drops handles out
//! of order.
//!
//! `Engine` owns the device (via [`DeviceContext`]) and the allocator, hands
//! out `Arc`s to callers, and keeps `Weak` lists of everything it handed out
//! so `Drop` can walk and finalize anything still alive before the device
//! goes away.

use crate::error::Result;
use crate::vk::algorithm::Algorithm;
use crate::vk::allocator::Allocator;
use crate::vk::buffer::{Buffer, BufferCreateInfo, TypedBuffer};
use crate::vk::device::DeviceContext;
use crate::vk::sequence::Sequence;
use crate::vk::shader::ShaderSearchPath;
use ash::vk;
use bytemuck::Pod;
use parking_lot::Mutex;
use std::any::Any;
use std::sync::{Arc, Weak};
use tracing::debug;

/// Owns the device and allocator; hands out [`Buffer`]/[`TypedBuffer`]/
/// [`Algorithm`]/[`Sequence`] and keeps weak references to all of them.
pub struct Engine {
    // `allocator` must be declared (and so dropped) before `device`: struct
    // fields drop in declaration order, and `gpu_allocator::vulkan::Allocator`
    // frees its tracked `VkDeviceMemory` blocks through the logical device on
    // drop, which is unsound once that device has already been destroyed.
    allocator: Arc<Allocator>,
    device: Arc<DeviceContext>,
    shaders: ShaderSearchPath,
    buffers: Mutex<Vec<Weak<Buffer>>>,
    typed_buffers: Mutex<Vec<Weak<dyn Any + Send + Sync>>>,
    algorithms: Mutex<Vec<Weak<Algorithm>>>,
    sequences: Mutex<Vec<Weak<Sequence>>>,
}

impl Engine {
    pub fn new(shaders: ShaderSearchPath) -> Result<Self> {
        let device = Arc::new(DeviceContext::new()?);
        let allocator = Arc::new(Allocator::new(&device)?);
        Ok(Engine {
            allocator,
            device,
            shaders,
            buffers: Mutex::new(Vec::new()),
            typed_buffers: Mutex::new(Vec::new()),
            algorithms: Mutex::new(Vec::new()),
            sequences: Mutex::new(Vec::new()),
        })
    }

    pub fn device(&self) -> &Arc<DeviceContext> {
        &self.device
    }

    pub fn buffer(&self, size: vk::DeviceSize) -> Result<Arc<Buffer>> {
        let buf = Arc::new(Buffer::new(
            Arc::clone(&self.device),
            Arc::clone(&self.allocator),
            BufferCreateInfo {
                size,
                ..Default::default()
            },
        )?);
        self.buffers.lock().push(Arc::downgrade(&buf));
        Ok(buf)
    }

    pub fn typed_buffer<T: Pod + Send + Sync + 'static>(
        &self,
        count: usize,
    ) -> Result<Arc<TypedBuffer<T>>> {
        let buf = Arc::new(TypedBuffer::<T>::new(
            Arc::clone(&self.device),
            Arc::clone(&self.allocator),
            count,
            vk::BufferUsageFlags::STORAGE_BUFFER,
        )?);
        let erased: Weak<dyn Any + Send + Sync> = Arc::downgrade(&buf) as Weak<dyn Any + Send + Sync>;
        self.typed_buffers.lock().push(erased);
        Ok(buf)
    }

    pub fn algorithm(
        &self,
        spirv_filename: &str,
        buffers: &[&Buffer],
        push_constant_size: u32,
    ) -> Result<Arc<Algorithm>> {
        let algo = Arc::new(Algorithm::new(
            Arc::clone(&self.device),
            &self.shaders,
            spirv_filename,
            buffers,
            push_constant_size,
        )?);
        self.algorithms.lock().push(Arc::downgrade(&algo));
        Ok(algo)
    }

    pub fn sequence(&self) -> Result<Arc<Sequence>> {
        let seq = Arc::new(Sequence::new(Arc::clone(&self.device))?);
        self.sequences.lock().push(Arc::downgrade(&seq));
        Ok(seq)
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        // Finalize sequences (things in flight) first, then algorithms
        // (pipelines), then buffers (memory). The allocator and device
        // fields then drop in declaration order once this body returns.
        let live_sequences = drain_live(&self.sequences);
        let live_algorithms = drain_live(&self.algorithms);
        let live_buffers = drain_live(&self.buffers);
        let live_typed_buffers: Vec<Arc<dyn Any + Send + Sync>> = self
            .typed_buffers
            .lock()
            .drain(..)
            .filter_map(|w| w.upgrade())
            .collect();

        if !live_sequences.is_empty()
            || !live_algorithms.is_empty()
            || !live_buffers.is_empty()
            || !live_typed_buffers.is_empty()
        {
            debug!(
                sequences = live_sequences.len(),
                algorithms = live_algorithms.len(),
                buffers = live_buffers.len(),
                typed_buffers = live_typed_buffers.len(),
                "engine dropping resources user code never released"
            );
        }
        drop(live_sequences);
        drop(live_algorithms);
        drop(live_buffers);
        drop(live_typed_buffers);
    }
}

fn drain_live<T>(weak_list: &Mutex<Vec<Weak<T>>>) -> Vec<Arc<T>> {
    weak_list
        .lock()
        .drain(..)
        .filter_map(|w| w.upgrade())
        .collect()
}
