//! wgpu pool backend

use std::borrow::Cow;

use super::{Backing, ShaderDataBackend};

/// Usage flags for a pool backing
///
/// wgpu has no texel buffers; texel pools fall back to uniform arrays, so
/// both are capped at `max_uniform_buffer_binding_size` (64 KiB by default).
pub fn buffer_usages(backing: Backing) -> wgpu::BufferUsages {
    let usage = match backing {
        Backing::Storage => wgpu::BufferUsages::STORAGE,
        Backing::Texel | Backing::Uniform => wgpu::BufferUsages::UNIFORM,
        Backing::Vertex => wgpu::BufferUsages::VERTEX,
        Backing::VertexStorage => wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::STORAGE,
    };
    usage | wgpu::BufferUsages::COPY_DST
}

/// Pad `bytes` to wgpu's COPY_BUFFER_ALIGNMENT
pub(crate) fn pad_to_copy_alignment(bytes: &[u8]) -> Cow<'_, [u8]> {
    let alignment = wgpu::COPY_BUFFER_ALIGNMENT as usize;
    if bytes.len().is_multiple_of(alignment) {
        Cow::Borrowed(bytes)
    } else {
        let mut padded = bytes.to_vec();
        padded.resize(bytes.len().next_multiple_of(alignment), 0);
        Cow::Owned(padded)
    }
}

#[derive(Debug, Clone)]
pub struct WgpuBackend {
    device: wgpu::Device,
    queue: wgpu::Queue,
}

impl WgpuBackend {
    pub fn new(device: wgpu::Device, queue: wgpu::Queue) -> Self {
        Self { device, queue }
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }
}

impl ShaderDataBackend for WgpuBackend {
    type Buffer = wgpu::Buffer;

    fn create_buffer(&mut self, label: &str, backing: Backing, size: u64) -> wgpu::Buffer {
        self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size: size.next_multiple_of(wgpu::COPY_BUFFER_ALIGNMENT),
            usage: buffer_usages(backing),
            mapped_at_creation: false,
        })
    }

    fn write(&mut self, buffer: &mut wgpu::Buffer, offset: u64, bytes: &[u8]) {
        self.queue
            .write_buffer(buffer, offset, &pad_to_copy_alignment(bytes));
    }

    fn max_buffer_size(&self, backing: Backing) -> u64 {
        let limits = self.device.limits();
        match backing {
            Backing::Texel | Backing::Uniform => {
                u64::from(limits.max_uniform_buffer_binding_size).min(limits.max_buffer_size)
            }
            Backing::Storage | Backing::Vertex | Backing::VertexStorage => limits.max_buffer_size,
        }
    }

    fn min_alignment(&self) -> u64 {
        wgpu::COPY_BUFFER_ALIGNMENT
    }
}
