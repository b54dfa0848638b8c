//! A recordable command buffer plus its own fence, state-checked at the Rust
//! layer so an operation invoked from the wrong state never touches Vulkan.
//!
//! One reset-capable command pool on the compute queue family, one primary
//! command buffer, one fence; [`Sequence::record_with_blocks`] bundles the
//! begin/bind/push/dispatch/end sequence, and [`Sequence::launch_async`]/
//! [`Sequence::sync`] submit and then wait on the fence.

use crate::error::{Error, Result};
use crate::vk::algorithm::Algorithm;
use crate::vk::device::DeviceContext;
use ash::vk;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::debug;

/// Where a [`Sequence`]'s command buffer currently stands.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SequenceState {
    Fresh,
    Recording,
    Recorded,
    InFlight,
}

impl SequenceState {
    fn name(self) -> &'static str {
        match self {
            SequenceState::Fresh => "Fresh",
            SequenceState::Recording => "Recording",
            SequenceState::Recorded => "Recorded",
            SequenceState::InFlight => "InFlight",
        }
    }
}

/// Handed out as `Arc<Sequence>` by [`crate::vk::Engine`], so the state
/// machine lives behind a mutex rather than requiring `&mut self`.
pub struct Sequence {
    device: Arc<DeviceContext>,
    command_pool: vk::CommandPool,
    command_buffer: vk::CommandBuffer,
    fence: vk::Fence,
    queue: vk::Queue,
    state: Mutex<SequenceState>,
}

impl Sequence {
    pub fn new(device: Arc<DeviceContext>) -> Result<Self> {
        let queue = device.queue();
        let command_pool = create_command_pool(&device)?;
        let command_buffer = match allocate_command_buffer(&device, command_pool) {
            Ok(cb) => cb,
            Err(e) => {
                destroy_command_pool(&device, command_pool);
                return Err(e);
            }
        };
        let fence = match create_fence(&device) {
            Ok(f) => f,
            Err(e) => {
                destroy_command_pool(&device, command_pool);
                return Err(e);
            }
        };

        Ok(Sequence {
            device,
            command_pool,
            command_buffer,
            fence,
            queue,
            state: Mutex::new(SequenceState::Fresh),
        })
    }

    pub fn state(&self) -> SequenceState {
        *self.state.lock()
    }

    fn expect(&self, expected: SequenceState) -> Result<()> {
        let actual = *self.state.lock();
        if actual != expected {
            return Err(Error::InvalidSequenceState {
                expected: expected.name(),
                actual: actual.name(),
            });
        }
        Ok(())
    }

    /// `Fresh|Recorded -> Recording`. The command buffer is reset-capable,
    /// so re-recording after a previous pass is allowed from `Recorded`.
    pub fn cmd_begin(&self) -> Result<()> {
        let mut state = self.state.lock();
        if *state != SequenceState::Fresh && *state != SequenceState::Recorded {
            return Err(Error::InvalidSequenceState {
                expected: "Fresh or Recorded",
                actual: state.name(),
            });
        }
        let begin_info = vk::CommandBufferBeginInfo::default()
            .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
        unsafe {
            self.device
                .logical_device()
                .begin_command_buffer(self.command_buffer, &begin_info)
        }
        .map_err(|e| Error::VulkanError {
            code: e.as_raw(),
            op: "begin_command_buffer",
        })?;
        *state = SequenceState::Recording;
        Ok(())
    }

    /// `Recording -> Recorded`.
    pub fn cmd_end(&self) -> Result<()> {
        let mut state = self.state.lock();
        if *state != SequenceState::Recording {
            return Err(Error::InvalidSequenceState {
                expected: SequenceState::Recording.name(),
                actual: state.name(),
            });
        }
        unsafe {
            self.device
                .logical_device()
                .end_command_buffer(self.command_buffer)
        }
        .map_err(|e| Error::VulkanError {
            code: e.as_raw(),
            op: "end_command_buffer",
        })?;
        *state = SequenceState::Recorded;
        Ok(())
    }

    pub fn bind(&self, algo: &Algorithm) -> Result<()> {
        self.expect(SequenceState::Recording)?;
        algo.record_bind(self.command_buffer);
        Ok(())
    }

    pub fn push(&self, algo: &Algorithm) -> Result<()> {
        self.expect(SequenceState::Recording)?;
        algo.record_push(self.command_buffer);
        Ok(())
    }

    pub fn dispatch(&self, algo: &Algorithm, n_blocks: u32) -> Result<()> {
        self.expect(SequenceState::Recording)?;
        algo.record_dispatch(self.command_buffer, n_blocks);
        Ok(())
    }

    /// `cmd_begin -> bind -> push -> dispatch(n_blocks) -> cmd_end` in one call.
    pub fn record_with_blocks(&self, algo: &Algorithm, n_blocks: u32) -> Result<()> {
        self.cmd_begin()?;
        algo.record_bind(self.command_buffer);
        algo.record_push(self.command_buffer);
        algo.record_dispatch(self.command_buffer, n_blocks);
        self.cmd_end()
    }

    /// `Recorded -> InFlight`. Submits the command buffer and signals the
    /// fence on completion. On submission failure the sequence becomes
    /// unusable until the caller reconstructs it.
    pub fn launch_async(&self) -> Result<()> {
        let mut state = self.state.lock();
        if *state != SequenceState::Recorded {
            return Err(Error::InvalidSequenceState {
                expected: SequenceState::Recorded.name(),
                actual: state.name(),
            });
        }
        let command_buffers = [self.command_buffer];
        let submit_info = vk::SubmitInfo::default().command_buffers(&command_buffers);
        unsafe {
            self.device
                .logical_device()
                .queue_submit(self.queue, &[submit_info], self.fence)
        }
        .map_err(|e| Error::VulkanError {
            code: e.as_raw(),
            op: "queue_submit",
        })?;
        *state = SequenceState::InFlight;
        debug!("sequence launched");
        Ok(())
    }

    /// `InFlight -> Recorded`. Waits for the fence, then resets it.
    pub fn sync(&self) -> Result<()> {
        let mut state = self.state.lock();
        if *state != SequenceState::InFlight {
            return Err(Error::InvalidSequenceState {
                expected: SequenceState::InFlight.name(),
                actual: state.name(),
            });
        }
        let device = self.device.logical_device();
        unsafe { device.wait_for_fences(&[self.fence], true, u64::MAX) }.map_err(|e| {
            Error::VulkanError {
                code: e.as_raw(),
                op: "wait_for_fences",
            }
        })?;
        unsafe { device.reset_fences(&[self.fence]) }.map_err(|e| Error::VulkanError {
            code: e.as_raw(),
            op: "reset_fences",
        })?;
        *state = SequenceState::Recorded;
        Ok(())
    }
}

impl Drop for Sequence {
    fn drop(&mut self) {
        let device = self.device.logical_device();
        unsafe {
            device.free_command_buffers(self.command_pool, &[self.command_buffer]);
            device.destroy_command_pool(self.command_pool, None);
            device.destroy_fence(self.fence, None);
        }
        debug!("sequence destroyed");
    }
}

fn create_command_pool(device: &DeviceContext) -> Result<vk::CommandPool> {
    let create_info = vk::CommandPoolCreateInfo::default()
        .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER)
        .queue_family_index(device.queue_family_index());
    unsafe { device.logical_device().create_command_pool(&create_info, None) }.map_err(|e| {
        Error::VulkanError {
            code: e.as_raw(),
            op: "create_command_pool",
        }
    })
}

fn destroy_command_pool(device: &DeviceContext, pool: vk::CommandPool) {
    unsafe { device.logical_device().destroy_command_pool(pool, None) };
}

fn allocate_command_buffer(
    device: &DeviceContext,
    pool: vk::CommandPool,
) -> Result<vk::CommandBuffer> {
    let alloc_info = vk::CommandBufferAllocateInfo::default()
        .command_pool(pool)
        .level(vk::CommandBufferLevel::PRIMARY)
        .command_buffer_count(1);
    let buffers = unsafe { device.logical_device().allocate_command_buffers(&alloc_info) }
        .map_err(|e| Error::VulkanError {
            code: e.as_raw(),
            op: "allocate_command_buffers",
        })?;
    Ok(buffers[0])
}

fn create_fence(device: &DeviceContext) -> Result<vk::Fence> {
    let create_info = vk::FenceCreateInfo::default();
    unsafe { device.logical_device().create_fence(&create_info, None) }.map_err(|e| {
        Error::VulkanError {
            code: e.as_raw(),
            op: "create_fence",
        }
    })
}
