//! Device capabilities and render strategy selection
//!
//! Capabilities are queried once when the renderer is created and treated as
//! immutable afterwards.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Storage buffers a vertex shader needs for the SSBO variant of the vertex path
pub const MIN_VERTEX_STORAGE_BUFFERS: u32 = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceCapabilities {
    pub ssbo: bool,
    /// Storage buffers readable from the vertex stage
    pub max_vertex_storage_buffers: u32,
    pub compute_shader: bool,
    pub memory_barrier: bool,
    pub shader_packing: bool,
    pub ssbo_offset_alignment: u64,
    pub uniform_offset_alignment: u64,
    pub texel_buffer_offset_alignment: u64,
}

impl Default for DeviceCapabilities {
    /// A desktop GL 4.3-class device
    fn default() -> Self {
        Self {
            ssbo: true,
            max_vertex_storage_buffers: 16,
            compute_shader: true,
            memory_barrier: true,
            shader_packing: true,
            ssbo_offset_alignment: 256,
            uniform_offset_alignment: 256,
            texel_buffer_offset_alignment: 256,
        }
    }
}

impl DeviceCapabilities {
    /// Only the CPU path works: no storage buffers, no compute
    pub fn minimal() -> Self {
        Self {
            ssbo: false,
            max_vertex_storage_buffers: 0,
            compute_shader: false,
            memory_barrier: false,
            shader_packing: false,
            ..Self::default()
        }
    }

    pub fn from_adapter(adapter: &wgpu::Adapter) -> Self {
        let limits = adapter.limits();
        let downlevel = adapter.get_downlevel_capabilities().flags;
        let compute_shader = downlevel.contains(wgpu::DownlevelFlags::COMPUTE_SHADERS);
        let vertex_storage = downlevel.contains(wgpu::DownlevelFlags::VERTEX_STORAGE);
        let caps = Self {
            ssbo: limits.max_storage_buffers_per_shader_stage > 0,
            max_vertex_storage_buffers: if vertex_storage {
                limits.max_storage_buffers_per_shader_stage
            } else {
                0
            },
            compute_shader,
            // wgpu tracks buffer hazards between passes itself
            memory_barrier: compute_shader,
            shader_packing: true,
            ssbo_offset_alignment: limits.min_storage_buffer_offset_alignment as u64,
            uniform_offset_alignment: limits.min_uniform_buffer_offset_alignment as u64,
            texel_buffer_offset_alignment: limits.min_uniform_buffer_offset_alignment as u64,
        };
        tracing::info!("Device capabilities: {:?}", caps);
        caps
    }

    /// Whether the vertex path can read its data from storage buffers
    pub fn vertex_ssbo(&self) -> bool {
        self.ssbo && self.max_vertex_storage_buffers >= MIN_VERTEX_STORAGE_BUFFERS
    }
}

/// One of the three vertex transform strategies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum RendererKind {
    /// Skinning in the vertex shader, instanced when tasks share a scene
    #[default]
    #[serde(rename = "vertex_transform")]
    VertexShaderTransform,
    /// Skinning on the CPU, uploaded as plain entity vertices
    #[serde(rename = "cpu_transform")]
    CpuTransform,
    /// Skinning in a compute pass writing a vertex buffer
    #[serde(rename = "compute_shader")]
    ComputeShaderTransform,
}

impl RendererKind {
    pub const ALL: [RendererKind; 3] = [
        RendererKind::VertexShaderTransform,
        RendererKind::CpuTransform,
        RendererKind::ComputeShaderTransform,
    ];

    pub fn id(&self) -> &'static str {
        match self {
            RendererKind::VertexShaderTransform => "vertex_transform",
            RendererKind::CpuTransform => "cpu_transform",
            RendererKind::ComputeShaderTransform => "compute_shader",
        }
    }

    pub fn is_available(&self, caps: &DeviceCapabilities) -> bool {
        match self {
            RendererKind::VertexShaderTransform | RendererKind::CpuTransform => true,
            RendererKind::ComputeShaderTransform => {
                caps.ssbo && caps.compute_shader && caps.memory_barrier && caps.shader_packing
            }
        }
    }

    /// Whether tasks can be batched with `schedule` / `execute`
    pub fn supports_scheduling(&self) -> bool {
        !matches!(self, RendererKind::CpuTransform)
    }

    /// `preferred` when the device supports it, otherwise the CPU path
    pub fn select(caps: &DeviceCapabilities, preferred: RendererKind) -> RendererKind {
        if preferred.is_available(caps) {
            preferred
        } else {
            tracing::warn!(
                "Renderer '{}' is not supported by this device, falling back to '{}'",
                preferred.id(),
                RendererKind::CpuTransform.id()
            );
            RendererKind::CpuTransform
        }
    }
}

impl fmt::Display for RendererKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for RendererKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RendererKind::ALL
            .into_iter()
            .find(|kind| kind.id() == s)
            .ok_or_else(|| format!("Unknown renderer '{}'", s))
    }
}
