use std::io;
use std::path::PathBuf;

/// Every fallible operation in this crate returns this error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to query or set CPU affinity")]
    OsError(#[from] io::Error),

    #[error("core {0} is not present in the process affinity mask")]
    InvalidCore(usize),

    #[error("submit on a ThreadPool that has already been shut down")]
    PoolShutDown,

    #[error("task failed: {0}")]
    TaskFailed(String),

    #[error("no queue family on this device exposes VK_QUEUE_COMPUTE_BIT")]
    NoComputeQueue,

    #[error("vulkan call `{op}` failed with code {code}")]
    VulkanError { code: i32, op: &'static str },

    #[error("`{0}` is not a valid SPIR-V module (bad magic number or misaligned size)")]
    InvalidSpirv(PathBuf),

    #[error("shader file not found under the search path: `{0}`")]
    ShaderNotFound(PathBuf),

    #[error("allocator is out of memory")]
    OutOfMemory,

    #[error("sequence operation invalid in state `{actual}` (expected `{expected}`)")]
    InvalidSequenceState {
        expected: &'static str,
        actual: &'static str,
    },

    #[error("push constant size mismatch: shader declares {expected} bytes, got {actual}")]
    PushConstantSizeMismatch { expected: u32, actual: u32 },

    #[error("rebind_buffers: expected {expected} buffers, got {actual}")]
    RebindLengthMismatch { expected: usize, actual: usize },

    #[error("unknown device id: `{0}`")]
    UnknownDevice(String),
}

pub type Result<T> = std::result::Result<T, Error>;
