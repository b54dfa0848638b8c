//! Vulkan compute engine: device/allocator lifetimes plus the
//! buffer/algorithm/sequence trio that external geometry kernels are
//! recorded against.
//!
//! No portable backend abstraction lives here on purpose — this crate talks
//! to Vulkan 1.3 directly through `ash` rather than through an intermediate
//! graphics API layer.

mod algorithm;
mod allocator;
mod buffer;
mod device;
mod engine;
mod sequence;
mod shader;

pub use algorithm::Algorithm;
pub use allocator::Allocator;
pub use buffer::{Buffer, BufferCreateInfo, TypedBuffer};
pub use device::DeviceContext;
pub use engine::Engine;
pub use sequence::{Sequence, SequenceState};
pub use shader::ShaderSearchPath;
