//! Shared CPU/GPU state: a name-keyed table of typed buffers so a CPU
//! block-range task and a GPU kernel can agree on the same physical memory
//! without threading buffer handles through every call site by hand.
//!
//! Built on the same `Arc`-and-weak-reference idiom the rest of this crate
//! uses for resource tracking, since a seven-stage pipeline needs its stages
//! to find each other's inputs by a shared key rather than hand-wired
//! parameters.

use bytemuck::Pod;
use parking_lot::RwLock;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;

use crate::vk::TypedBuffer;

struct Entry {
    type_id: TypeId,
    handle: Arc<dyn Any + Send + Sync>,
}

/// Maps externally-defined keys (`"u_points"`, `"u_morton"`, ...) to the
/// [`TypedBuffer`] backing them.
#[derive(Default)]
pub struct PipeRegistry {
    entries: RwLock<HashMap<String, Entry>>,
}

impl PipeRegistry {
    pub fn new() -> Self {
        PipeRegistry::default()
    }

    pub fn register<T: Pod + Send + Sync + 'static>(
        &self,
        key: impl Into<String>,
        buffer: Arc<TypedBuffer<T>>,
    ) {
        self.entries.write().insert(
            key.into(),
            Entry {
                type_id: TypeId::of::<T>(),
                handle: buffer,
            },
        );
    }

    /// Returns `None` both when the key is absent and when it exists but
    /// was registered with a different `T`, rather than panicking on a type
    /// mismatch.
    pub fn get<T: Pod + Send + Sync + 'static>(&self, key: &str) -> Option<Arc<TypedBuffer<T>>> {
        let entries = self.entries.read();
        let entry = entries.get(key)?;
        if entry.type_id != TypeId::of::<T>() {
            return None;
        }
        Arc::clone(&entry.handle).downcast::<TypedBuffer<T>>().ok()
    }

    pub fn keys(&self) -> Vec<String> {
        self.entries.read().keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_registry_has_no_keys() {
        let registry = PipeRegistry::new();
        assert!(registry.keys().is_empty());
        assert!(registry.get::<f32>("u_points").is_none());
    }

    // Registering and fetching a real entry requires a Vulkan-backed
    // TypedBuffer; that round trip is covered by the GPU-requiring tests
    // under tests/engine.rs.
}
