//! Host-visible, persistently-mapped storage buffers: one CPU/GPU-shared
//! `VkBuffer` with host-random-access, persistently-mapped allocation flags,
//! plus a typed view over it that exposes the mapping as a slice of `T`.
//! The untyped [`Buffer`] owns the Vulkan object and the `gpu_allocator`
//! allocation; [`TypedBuffer`] is a thin, `bytemuck`-checked veneer over it.

use crate::error::{Error, Result};
use crate::vk::allocator::Allocator;
use crate::vk::device::DeviceContext;
use ash::vk;
use bytemuck::Pod;
use gpu_allocator::vulkan as ga;
use gpu_allocator::MemoryLocation;
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::warn;

/// Parameters for [`Buffer::new`].
#[derive(Clone, Copy, Debug)]
pub struct BufferCreateInfo {
    pub size: vk::DeviceSize,
    pub usage: vk::BufferUsageFlags,
}

impl Default for BufferCreateInfo {
    fn default() -> Self {
        BufferCreateInfo {
            size: 0,
            usage: vk::BufferUsageFlags::STORAGE_BUFFER,
        }
    }
}

/// One Vulkan buffer plus the host-visible memory backing it, mapped for the
/// lifetime of the object.
pub struct Buffer {
    // `allocator` must be declared (and so dropped) before `device`: see the
    // matching comment on `Engine`'s field order. A `Buffer` can outlive the
    // `Engine` that created it (callers hold `Arc<Buffer>`), so this type
    // needs the same ordering guarantee independently.
    allocator: Arc<Allocator>,
    device: Arc<DeviceContext>,
    handle: vk::Buffer,
    allocation: Option<ga::Allocation>,
    size: vk::DeviceSize,
    mapped_ptr: *mut u8,
}

// The mapped pointer is only ever dereferenced through `&self`/`&mut self`
// accessors that borrow `Buffer`, so sharing the handle across threads is
// sound as long as callers synchronize their own reads/writes against any
// in-flight GPU work touching the same memory.
unsafe impl Send for Buffer {}
unsafe impl Sync for Buffer {}

impl Buffer {
    pub fn new(
        device: Arc<DeviceContext>,
        allocator: Arc<Allocator>,
        info: BufferCreateInfo,
    ) -> Result<Self> {
        let create_info = vk::BufferCreateInfo::default()
            .size(info.size)
            .usage(info.usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let handle = unsafe { device.logical_device().create_buffer(&create_info, None) }
            .map_err(|e| Error::VulkanError {
                code: e.as_raw(),
                op: "create_buffer",
            })?;

        let requirements =
            unsafe { device.logical_device().get_buffer_memory_requirements(handle) };

        let allocation = match allocator.allocate("buffer", requirements, MemoryLocation::CpuToGpu)
        {
            Ok(a) => a,
            Err(e) => {
                unsafe { device.logical_device().destroy_buffer(handle, None) };
                return Err(e);
            }
        };

        let bind_result = unsafe {
            device.logical_device().bind_buffer_memory(
                handle,
                allocation.memory(),
                allocation.offset(),
            )
        };
        if let Err(e) = bind_result {
            unsafe { device.logical_device().destroy_buffer(handle, None) };
            return Err(Error::VulkanError {
                code: e.as_raw(),
                op: "bind_buffer_memory",
            });
        }

        let mapped_ptr = allocation
            .mapped_ptr()
            .map(|p| p.as_ptr() as *mut u8)
            .unwrap_or(std::ptr::null_mut());

        Ok(Buffer {
            allocator,
            device,
            handle,
            allocation: Some(allocation),
            size: info.size,
            mapped_ptr,
        })
    }

    pub fn handle(&self) -> vk::Buffer {
        self.handle
    }

    pub fn size(&self) -> vk::DeviceSize {
        self.size
    }

    /// Binding info for a descriptor write.
    pub fn descriptor_info(&self) -> vk::DescriptorBufferInfo {
        vk::DescriptorBufferInfo::default()
            .buffer(self.handle)
            .offset(0)
            .range(self.size)
    }

    /// Raw mapped pointer, or null if the allocation could not be mapped
    /// (GPU-only memory). Callers needing typed access should prefer
    /// [`TypedBuffer`].
    pub fn mapped_ptr(&self) -> *mut u8 {
        self.mapped_ptr
    }

    /// The mapped memory as a mutable byte slice. `&self`, not `&mut self`:
    /// this buffer is shared host/device memory handed out as `Arc<Buffer>`
    /// by [`crate::vk::Engine`], so exclusive borrowing was never available
    /// to callers anyway — ordering writes against in-flight GPU work is the
    /// caller's responsibility (see the shared-resource policy).
    pub fn as_bytes_mut(&self) -> &mut [u8] {
        if self.mapped_ptr.is_null() || self.size == 0 {
            return &mut [];
        }
        unsafe { std::slice::from_raw_parts_mut(self.mapped_ptr, self.size as usize) }
    }

    /// Fills the buffer with `value` repeated across its whole byte range.
    /// Bytes past the last whole `T` are left untouched.
    pub fn fill<T: Pod>(&self, value: T) {
        let elem = std::mem::size_of::<T>();
        if elem == 0 {
            return;
        }
        let bytes = bytemuck::bytes_of(&value);
        for chunk in self.as_bytes_mut().chunks_exact_mut(elem) {
            chunk.copy_from_slice(bytes);
        }
    }

    /// Every byte set to zero.
    pub fn zeros(&self) {
        self.fill(0u8);
    }

    /// Every byte set to `0x01`, since the untyped `Buffer` has no natural
    /// element width of its own to fill a typed `1` into.
    pub fn ones(&self) {
        self.fill(1u8);
    }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        unsafe {
            self.device.logical_device().destroy_buffer(self.handle, None);
        }
        if let Some(allocation) = self.allocation.take() {
            if let Err(e) = self.allocator.free(allocation) {
                warn!(error = %e, "failed to free buffer allocation");
            }
        }
    }
}

/// A [`Buffer`] viewed as a slice of `count` elements of `T`.
///
/// `T: Pod` is the safety bound that lets the mapped memory be reinterpreted
/// as a slice of `T` at all: no padding, no invalid bit patterns, no
/// destructor, before it can be treated as shared CPU/GPU storage.
pub struct TypedBuffer<T: Pod> {
    buffer: Buffer,
    count: usize,
    _marker: PhantomData<T>,
}

impl<T: Pod> TypedBuffer<T> {
    pub fn new(
        device: Arc<DeviceContext>,
        allocator: Arc<Allocator>,
        count: usize,
        usage: vk::BufferUsageFlags,
    ) -> Result<Self> {
        let size = (count * std::mem::size_of::<T>()) as vk::DeviceSize;
        let buffer = Buffer::new(device, allocator, BufferCreateInfo { size, usage })?;
        Ok(TypedBuffer {
            buffer,
            count,
            _marker: PhantomData,
        })
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn size_bytes(&self) -> usize {
        self.count * std::mem::size_of::<T>()
    }

    pub fn buffer(&self) -> &Buffer {
        &self.buffer
    }

    pub fn handle(&self) -> vk::Buffer {
        self.buffer.handle()
    }

    pub fn descriptor_info(&self) -> vk::DescriptorBufferInfo {
        self.buffer.descriptor_info()
    }

    /// View of the mapped memory as `&[T]`.
    pub fn as_slice(&self) -> &[T] {
        if self.buffer.mapped_ptr().is_null() || self.count == 0 {
            return &[];
        }
        unsafe { std::slice::from_raw_parts(self.buffer.mapped_ptr() as *const T, self.count) }
    }

    /// View of the mapped memory as `&mut [T]`. `&self`, matching
    /// [`Buffer::as_bytes_mut`]: `TypedBuffer`s are handed out behind `Arc`
    /// by [`crate::vk::Engine`], so there is no exclusive-owner case for
    /// `&mut self` to serve.
    pub fn as_mut_slice(&self) -> &mut [T] {
        if self.buffer.mapped_ptr().is_null() || self.count == 0 {
            return &mut [];
        }
        unsafe { std::slice::from_raw_parts_mut(self.buffer.mapped_ptr() as *mut T, self.count) }
    }

    /// Fills every element with `value`.
    pub fn fill(&self, value: T) {
        self.as_mut_slice().iter_mut().for_each(|slot| *slot = value);
    }

    /// Iterator over the `n` elements, in index order.
    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.as_slice().iter()
    }
}

impl<T: Pod> std::ops::Index<usize> for TypedBuffer<T> {
    type Output = T;

    fn index(&self, index: usize) -> &T {
        &self.as_slice()[index]
    }
}

impl<T: Pod> std::ops::IndexMut<usize> for TypedBuffer<T> {
    fn index_mut(&mut self, index: usize) -> &mut T {
        &mut self.as_mut_slice()[index]
    }
}

impl<'a, T: Pod> IntoIterator for &'a TypedBuffer<T> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.as_slice().iter()
    }
}
