//! CPU-side pool backend
//!
//! Buffers are plain byte vectors. Used for dry runs and tests, where the
//! recorded commands are inspected instead of submitted.

use super::{Backing, ShaderDataBackend, ShaderDataPool, ShaderDataSlice};

/// Default size cap, matching common desktop storage buffer limits (256MB)
pub const DEFAULT_MAX_BUFFER_SIZE: u64 = 256 * 1024 * 1024;

/// Default cap for texel and uniform pools, wgpu's default uniform binding limit
pub const DEFAULT_MAX_UNIFORM_SIZE: u64 = 64 * 1024;

#[derive(Debug, Clone)]
pub struct MemoryBackend {
    max_buffer_size: u64,
    max_uniform_size: u64,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self {
            max_buffer_size: DEFAULT_MAX_BUFFER_SIZE,
            max_uniform_size: DEFAULT_MAX_UNIFORM_SIZE,
        }
    }
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_buffer_size(max_buffer_size: u64) -> Self {
        Self {
            max_buffer_size,
            max_uniform_size: DEFAULT_MAX_UNIFORM_SIZE.min(max_buffer_size),
        }
    }

    pub fn with_max_uniform_size(mut self, max_uniform_size: u64) -> Self {
        self.max_uniform_size = max_uniform_size.min(self.max_buffer_size);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryBuffer {
    pub label: String,
    pub backing: Backing,
    pub data: Vec<u8>,
}

impl ShaderDataBackend for MemoryBackend {
    type Buffer = MemoryBuffer;

    fn create_buffer(&mut self, label: &str, backing: Backing, size: u64) -> MemoryBuffer {
        MemoryBuffer {
            label: label.to_string(),
            backing,
            data: vec![0; size as usize],
        }
    }

    fn write(&mut self, buffer: &mut MemoryBuffer, offset: u64, bytes: &[u8]) {
        let start = offset as usize;
        let end = start + bytes.len();
        if end > buffer.data.len() {
            tracing::warn!(
                "Write past the end of '{}': {} > {} bytes",
                buffer.label,
                end,
                buffer.data.len()
            );
            return;
        }
        buffer.data[start..end].copy_from_slice(bytes);
    }

    fn max_buffer_size(&self, backing: Backing) -> u64 {
        match backing {
            Backing::Texel | Backing::Uniform => self.max_uniform_size,
            Backing::Storage | Backing::Vertex | Backing::VertexStorage => self.max_buffer_size,
        }
    }
}

impl ShaderDataPool<MemoryBackend> {
    /// Current contents of a slice
    pub fn read(&self, slice: &ShaderDataSlice) -> Option<&[u8]> {
        let Some(id) = slice.buffer else {
            return Some(&[]);
        };
        let data = &self.buffer(id)?.data;
        data.get(slice.offset as usize..slice.end() as usize)
    }
}
