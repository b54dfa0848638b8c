//! Core-affinity CPU thread pool plus a Vulkan 1.3 compute engine, together
//! forming the execution substrate a geometry pipeline's seven passes are
//! scheduled against: CPU block-range tasks pinned to big.LITTLE clusters,
//! and GPU kernels recorded into [`vk::Sequence`]s against buffers shared
//! with the host.

pub mod affinity;
pub mod device_specs;
pub mod error;
pub mod pool;
pub mod registry;
pub mod vk;

pub use affinity::CoreList;
pub use device_specs::{lookup as lookup_device_spec, DeviceSpec};
pub use error::{Error, Result};
pub use pool::{MultiFuture, TaskFuture, ThreadPool};
pub use registry::PipeRegistry;
