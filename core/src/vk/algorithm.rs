//! One compute pipeline bound to a fixed set of storage buffers: shader
//! module -> descriptor set layout -> descriptor pool -> descriptor set ->
//! pipeline layout -> pipeline cache -> pipeline, all torn down in reverse.

use crate::error::{Error, Result};
use crate::vk::buffer::Buffer;
use crate::vk::device::DeviceContext;
use crate::vk::shader::ShaderSearchPath;
use ash::vk;
use bytemuck::Pod;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::debug;

const ENTRY_POINT: &std::ffi::CStr = c"main";

/// Handed out as `Arc<Algorithm>` by [`crate::vk::Engine`]; the push-constant
/// blob is the only field that changes after construction, so it alone
/// lives behind a mutex rather than requiring exclusive access to the whole
/// algorithm.
pub struct Algorithm {
    device: Arc<DeviceContext>,
    shader_module: vk::ShaderModule,
    descriptor_set_layout: vk::DescriptorSetLayout,
    descriptor_pool: vk::DescriptorPool,
    descriptor_set: vk::DescriptorSet,
    pipeline_layout: vk::PipelineLayout,
    pipeline_cache: vk::PipelineCache,
    pipeline: vk::Pipeline,
    binding_count: usize,
    push_constant_size: u32,
    push_constants_data: Mutex<Vec<u8>>,
}

impl Algorithm {
    pub fn new(
        device: Arc<DeviceContext>,
        shaders: &ShaderSearchPath,
        spirv_filename: &str,
        buffers: &[&Buffer],
        push_constant_size: u32,
    ) -> Result<Self> {
        let spirv = shaders.load(spirv_filename)?;
        let shader_module = create_shader_module(&device, &spirv)?;

        let descriptor_set_layout = match create_descriptor_set_layout(&device, buffers.len()) {
            Ok(l) => l,
            Err(e) => {
                destroy_shader_module(&device, shader_module);
                return Err(e);
            }
        };

        let descriptor_pool = match create_descriptor_pool(&device, buffers.len()) {
            Ok(p) => p,
            Err(e) => {
                destroy_partial(&device, shader_module, descriptor_set_layout, None, None);
                return Err(e);
            }
        };

        let descriptor_set =
            match allocate_descriptor_set(&device, descriptor_pool, descriptor_set_layout) {
                Ok(s) => s,
                Err(e) => {
                    destroy_partial(
                        &device,
                        shader_module,
                        descriptor_set_layout,
                        Some(descriptor_pool),
                        None,
                    );
                    return Err(e);
                }
            };

        write_descriptor_set(&device, descriptor_set, buffers);

        let (pipeline_layout, pipeline_cache, pipeline) = match create_pipeline(
            &device,
            shader_module,
            descriptor_set_layout,
            push_constant_size,
        ) {
            Ok(p) => p,
            Err(e) => {
                destroy_partial(
                    &device,
                    shader_module,
                    descriptor_set_layout,
                    Some(descriptor_pool),
                    None,
                );
                return Err(e);
            }
        };

        debug!(spirv_filename, bindings = buffers.len(), "algorithm ready");
        Ok(Algorithm {
            device,
            shader_module,
            descriptor_set_layout,
            descriptor_pool,
            descriptor_set,
            pipeline_layout,
            pipeline_cache,
            pipeline,
            binding_count: buffers.len(),
            push_constant_size,
            push_constants_data: Mutex::new(vec![0u8; push_constant_size as usize]),
        })
    }

    /// Copies `bytemuck::bytes_of(value)` into the owned push-constant blob.
    pub fn set_push_constants<T: Pod>(&self, value: &T) -> Result<()> {
        let bytes = bytemuck::bytes_of(value);
        if bytes.len() != self.push_constant_size as usize {
            return Err(Error::PushConstantSizeMismatch {
                expected: self.push_constant_size,
                actual: bytes.len() as u32,
            });
        }
        self.push_constants_data.lock().copy_from_slice(bytes);
        Ok(())
    }

    /// Rewrites the descriptor set to point at `new_buffers`, same length as
    /// the set this algorithm was constructed with.
    pub fn rebind_buffers(&self, new_buffers: &[&Buffer]) -> Result<()> {
        if new_buffers.len() != self.binding_count {
            return Err(Error::RebindLengthMismatch {
                expected: self.binding_count,
                actual: new_buffers.len(),
            });
        }
        write_descriptor_set(&self.device, self.descriptor_set, new_buffers);
        Ok(())
    }

    pub fn record_bind(&self, cmd: vk::CommandBuffer) {
        let device = self.device.logical_device();
        unsafe {
            device.cmd_bind_pipeline(cmd, vk::PipelineBindPoint::COMPUTE, self.pipeline);
            device.cmd_bind_descriptor_sets(
                cmd,
                vk::PipelineBindPoint::COMPUTE,
                self.pipeline_layout,
                0,
                &[self.descriptor_set],
                &[],
            );
        }
    }

    pub fn record_push(&self, cmd: vk::CommandBuffer) {
        if self.push_constant_size == 0 {
            return;
        }
        let data = self.push_constants_data.lock();
        unsafe {
            self.device.logical_device().cmd_push_constants(
                cmd,
                self.pipeline_layout,
                vk::ShaderStageFlags::COMPUTE,
                0,
                &data,
            );
        }
    }

    pub fn record_dispatch(&self, cmd: vk::CommandBuffer, n_blocks: u32) {
        unsafe {
            self.device
                .logical_device()
                .cmd_dispatch(cmd, n_blocks, 1, 1);
        }
    }
}

impl Drop for Algorithm {
    fn drop(&mut self) {
        let device = self.device.logical_device();
        unsafe {
            device.destroy_pipeline(self.pipeline, None);
            device.destroy_pipeline_cache(self.pipeline_cache, None);
            device.destroy_pipeline_layout(self.pipeline_layout, None);
            device.destroy_descriptor_pool(self.descriptor_pool, None);
            device.destroy_descriptor_set_layout(self.descriptor_set_layout, None);
            device.destroy_shader_module(self.shader_module, None);
        }
    }
}

fn create_shader_module(device: &DeviceContext, spirv: &[u32]) -> Result<vk::ShaderModule> {
    let create_info = vk::ShaderModuleCreateInfo::default().code(spirv);
    unsafe { device.logical_device().create_shader_module(&create_info, None) }.map_err(|e| {
        Error::VulkanError {
            code: e.as_raw(),
            op: "create_shader_module",
        }
    })
}

fn destroy_shader_module(device: &DeviceContext, module: vk::ShaderModule) {
    unsafe { device.logical_device().destroy_shader_module(module, None) };
}

fn destroy_partial(
    device: &DeviceContext,
    shader_module: vk::ShaderModule,
    descriptor_set_layout: vk::DescriptorSetLayout,
    descriptor_pool: Option<vk::DescriptorPool>,
    pipeline_layout: Option<vk::PipelineLayout>,
) {
    let d = device.logical_device();
    unsafe {
        if let Some(layout) = pipeline_layout {
            d.destroy_pipeline_layout(layout, None);
        }
        if let Some(pool) = descriptor_pool {
            d.destroy_descriptor_pool(pool, None);
        }
        d.destroy_descriptor_set_layout(descriptor_set_layout, None);
        d.destroy_shader_module(shader_module, None);
    }
}

fn create_descriptor_set_layout(
    device: &DeviceContext,
    binding_count: usize,
) -> Result<vk::DescriptorSetLayout> {
    let bindings: Vec<vk::DescriptorSetLayoutBinding> = (0..binding_count)
        .map(|i| {
            vk::DescriptorSetLayoutBinding::default()
                .binding(i as u32)
                .descriptor_type(vk::DescriptorType::STORAGE_BUFFER)
                .descriptor_count(1)
                .stage_flags(vk::ShaderStageFlags::COMPUTE)
        })
        .collect();
    let create_info = vk::DescriptorSetLayoutCreateInfo::default().bindings(&bindings);
    unsafe {
        device
            .logical_device()
            .create_descriptor_set_layout(&create_info, None)
    }
    .map_err(|e| Error::VulkanError {
        code: e.as_raw(),
        op: "create_descriptor_set_layout",
    })
}

fn create_descriptor_pool(
    device: &DeviceContext,
    binding_count: usize,
) -> Result<vk::DescriptorPool> {
    let pool_sizes = [vk::DescriptorPoolSize::default()
        .ty(vk::DescriptorType::STORAGE_BUFFER)
        .descriptor_count(binding_count.max(1) as u32)];
    let create_info = vk::DescriptorPoolCreateInfo::default()
        .max_sets(1)
        .pool_sizes(&pool_sizes);
    unsafe { device.logical_device().create_descriptor_pool(&create_info, None) }.map_err(|e| {
        Error::VulkanError {
            code: e.as_raw(),
            op: "create_descriptor_pool",
        }
    })
}

fn allocate_descriptor_set(
    device: &DeviceContext,
    pool: vk::DescriptorPool,
    layout: vk::DescriptorSetLayout,
) -> Result<vk::DescriptorSet> {
    let layouts = [layout];
    let allocate_info = vk::DescriptorSetAllocateInfo::default()
        .descriptor_pool(pool)
        .set_layouts(&layouts);
    let sets = unsafe { device.logical_device().allocate_descriptor_sets(&allocate_info) }
        .map_err(|e| Error::VulkanError {
            code: e.as_raw(),
            op: "allocate_descriptor_sets",
        })?;
    Ok(sets[0])
}

fn write_descriptor_set(device: &DeviceContext, set: vk::DescriptorSet, buffers: &[&Buffer]) {
    let infos: Vec<vk::DescriptorBufferInfo> =
        buffers.iter().map(|b| b.descriptor_info()).collect();
    let writes: Vec<vk::WriteDescriptorSet> = infos
        .iter()
        .enumerate()
        .map(|(i, info)| {
            vk::WriteDescriptorSet::default()
                .dst_set(set)
                .dst_binding(i as u32)
                .dst_array_element(0)
                .descriptor_type(vk::DescriptorType::STORAGE_BUFFER)
                .buffer_info(std::slice::from_ref(info))
        })
        .collect();
    unsafe {
        device.logical_device().update_descriptor_sets(&writes, &[]);
    }
}

fn create_pipeline(
    device: &DeviceContext,
    shader_module: vk::ShaderModule,
    descriptor_set_layout: vk::DescriptorSetLayout,
    push_constant_size: u32,
) -> Result<(vk::PipelineLayout, vk::PipelineCache, vk::Pipeline)> {
    let set_layouts = [descriptor_set_layout];
    let push_constant_ranges = [vk::PushConstantRange::default()
        .stage_flags(vk::ShaderStageFlags::COMPUTE)
        .offset(0)
        .size(push_constant_size)];

    let mut layout_create_info =
        vk::PipelineLayoutCreateInfo::default().set_layouts(&set_layouts);
    if push_constant_size > 0 {
        layout_create_info = layout_create_info.push_constant_ranges(&push_constant_ranges);
    }

    let pipeline_layout = unsafe {
        device
            .logical_device()
            .create_pipeline_layout(&layout_create_info, None)
    }
    .map_err(|e| Error::VulkanError {
        code: e.as_raw(),
        op: "create_pipeline_layout",
    })?;

    let cache_create_info = vk::PipelineCacheCreateInfo::default();
    let pipeline_cache = match unsafe {
        device
            .logical_device()
            .create_pipeline_cache(&cache_create_info, None)
    } {
        Ok(c) => c,
        Err(e) => {
            unsafe {
                device
                    .logical_device()
                    .destroy_pipeline_layout(pipeline_layout, None)
            };
            return Err(Error::VulkanError {
                code: e.as_raw(),
                op: "create_pipeline_cache",
            });
        }
    };

    let stage = vk::PipelineShaderStageCreateInfo::default()
        .stage(vk::ShaderStageFlags::COMPUTE)
        .module(shader_module)
        .name(ENTRY_POINT);

    let create_info = vk::ComputePipelineCreateInfo::default()
        .stage(stage)
        .layout(pipeline_layout);

    let pipelines = unsafe {
        device
            .logical_device()
            .create_compute_pipelines(pipeline_cache, &[create_info], None)
    }
    .map_err(|(_, e)| {
        unsafe {
            device
                .logical_device()
                .destroy_pipeline_cache(pipeline_cache, None);
            device
                .logical_device()
                .destroy_pipeline_layout(pipeline_layout, None);
        }
        Error::VulkanError {
            code: e.as_raw(),
            op: "create_compute_pipelines",
        }
    })?;

    Ok((pipeline_layout, pipeline_cache, pipelines[0]))
}
