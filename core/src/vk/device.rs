//! Vulkan instance + physical/logical device + compute queue.
//!
//! `DeviceContext` owns the instance and device directly rather than behind
//! a process-global singleton: a single context is created once per process
//! and torn down explicitly when its owner drops.

use crate::error::{Error, Result};
use ash::vk;
use std::ffi::{c_char, CStr};
use tracing::{debug, info, warn};

const VALIDATION_LAYER_NAME: &CStr =
    unsafe { CStr::from_bytes_with_nul_unchecked(b"VK_LAYER_KHRONOS_validation\0") };

/// Owns one Vulkan instance, one selected physical device, one logical
/// device and one compute queue. Created once per process; destroyed after
/// every [`crate::vk::Allocator`]/[`crate::vk::Buffer`]/[`crate::vk::Algorithm`]/
/// [`crate::vk::Sequence`] derived from it.
pub struct DeviceContext {
    entry: ash::Entry,
    instance: ash::Instance,
    physical_device: vk::PhysicalDevice,
    device: ash::Device,
    queue: vk::Queue,
    queue_family_index: u32,
}

impl DeviceContext {
    /// Loads entry points, probes the validation layer, creates the 1.3
    /// instance, picks an integrated GPU, finds a compute queue family, and
    /// creates the logical device with the 8-bit storage / shader-int8 /
    /// buffer-device-address features enabled, in that order.
    pub fn new() -> Result<Self> {
        let entry = unsafe { ash::Entry::load() }.map_err(|_| Error::VulkanError {
            code: vk::Result::ERROR_INITIALIZATION_FAILED.as_raw(),
            op: "Entry::load",
        })?;

        let validation_layer = select_validation_layer(&entry);
        let instance = create_instance(&entry, validation_layer)?;
        let physical_device = select_physical_device(&instance)?;
        let queue_family_index = find_compute_queue_family(&instance, physical_device)?;
        let device = create_logical_device(&instance, physical_device, queue_family_index)?;
        let queue = unsafe { device.get_device_queue(queue_family_index, 0) };

        info!(queue_family_index, "vulkan device context ready");
        Ok(DeviceContext {
            entry,
            instance,
            physical_device,
            device,
            queue,
            queue_family_index,
        })
    }

    pub fn entry(&self) -> &ash::Entry {
        &self.entry
    }

    pub fn instance(&self) -> &ash::Instance {
        &self.instance
    }

    pub fn physical_device(&self) -> vk::PhysicalDevice {
        self.physical_device
    }

    pub fn logical_device(&self) -> &ash::Device {
        &self.device
    }

    pub fn queue(&self) -> vk::Queue {
        self.queue
    }

    pub fn queue_family_index(&self) -> u32 {
        self.queue_family_index
    }
}

impl Drop for DeviceContext {
    fn drop(&mut self) {
        unsafe {
            // Reverses construction order: device, then instance.
            self.device.destroy_device(None);
            self.instance.destroy_instance(None);
        }
        debug!("vulkan device context destroyed");
    }
}

fn select_validation_layer(entry: &ash::Entry) -> Option<&'static CStr> {
    let available = unsafe { entry.enumerate_instance_layer_properties() }.ok()?;
    let present = available.iter().any(|layer| {
        let name = unsafe { CStr::from_ptr(layer.layer_name.as_ptr()) };
        name == VALIDATION_LAYER_NAME
    });
    if present {
        Some(VALIDATION_LAYER_NAME)
    } else {
        warn!("VK_LAYER_KHRONOS_validation not available, continuing without it");
        None
    }
}

fn create_instance(entry: &ash::Entry, validation_layer: Option<&CStr>) -> Result<ash::Instance> {
    let app_name = c"substrate";
    let engine_name = c"substrate";

    let app_info = vk::ApplicationInfo::default()
        .application_name(app_name)
        .application_version(vk::make_api_version(0, 0, 1, 0))
        .engine_name(engine_name)
        .engine_version(vk::make_api_version(0, 0, 1, 0))
        .api_version(vk::API_VERSION_1_3);

    let layer_names: Vec<*const c_char> = validation_layer
        .into_iter()
        .map(|name| name.as_ptr())
        .collect();

    let create_info = vk::InstanceCreateInfo::default()
        .application_info(&app_info)
        .enabled_layer_names(&layer_names);

    unsafe { entry.create_instance(&create_info, None) }.map_err(|e| Error::VulkanError {
        code: e.as_raw(),
        op: "create_instance",
    })
}

fn select_physical_device(instance: &ash::Instance) -> Result<vk::PhysicalDevice> {
    let devices = unsafe { instance.enumerate_physical_devices() }.map_err(|e| {
        Error::VulkanError {
            code: e.as_raw(),
            op: "enumerate_physical_devices",
        }
    })?;

    if devices.is_empty() {
        return Err(Error::VulkanError {
            code: vk::Result::ERROR_DEVICE_LOST.as_raw(),
            op: "enumerate_physical_devices: no devices",
        });
    }

    let integrated = devices.iter().find(|&&phys| {
        let props = unsafe { instance.get_physical_device_properties(phys) };
        props.device_type == vk::PhysicalDeviceType::INTEGRATED_GPU
    });

    match integrated {
        Some(&phys) => Ok(phys),
        None => {
            warn!("no integrated GPU found, falling back to the first enumerated physical device");
            Ok(devices[0])
        }
    }
}

fn find_compute_queue_family(
    instance: &ash::Instance,
    physical_device: vk::PhysicalDevice,
) -> Result<u32> {
    let families =
        unsafe { instance.get_physical_device_queue_family_properties(physical_device) };
    families
        .iter()
        .position(|f| f.queue_flags.contains(vk::QueueFlags::COMPUTE))
        .map(|idx| idx as u32)
        .ok_or(Error::NoComputeQueue)
}

fn create_logical_device(
    instance: &ash::Instance,
    physical_device: vk::PhysicalDevice,
    queue_family_index: u32,
) -> Result<ash::Device> {
    let queue_priorities = [1.0f32];
    let queue_create_info = vk::DeviceQueueCreateInfo::default()
        .queue_family_index(queue_family_index)
        .queue_priorities(&queue_priorities);
    let queue_create_infos = [queue_create_info];

    let mut vulkan12_features = vk::PhysicalDeviceVulkan12Features::default()
        .storage_buffer8_bit_access(true)
        .shader_int8(true)
        .buffer_device_address(true);

    let create_info = vk::DeviceCreateInfo::default()
        .queue_create_infos(&queue_create_infos)
        .push_next(&mut vulkan12_features);

    unsafe { instance.create_device(physical_device, &create_info, None) }.map_err(|e| {
        Error::VulkanError {
            code: e.as_raw(),
            op: "create_device",
        }
    })
}
