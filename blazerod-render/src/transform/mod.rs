//! Vertex transform strategies
//!
//! Three interchangeable ways to turn a [`RenderTask`] into draws:
//! - [`CpuTransformRenderer`]: morph and skin on the CPU (rayon), upload
//!   finished entity vertices
//! - [`VertexShaderRenderer`]: upload matrices, skin in the vertex shader;
//!   scheduled tasks of one scene are drawn instanced
//! - [`ComputeShaderRenderer`]: a compute pass writes entity vertices, a
//!   memory barrier, then a plain draw
//!
//! [`create_renderer`] picks the strategy the device supports.

mod commands;
mod compute;
mod cpu;
mod vertex_shader;

pub use commands::{
    BarrierFlags, Binding, BindingKind, Bindings, BufferRef, Command, Dispatch, Draw,
    FrameCommands, PipelineId, PoolRole,
};
pub use compute::{ComputeShaderRenderer, ENTITY_PADDED_STRIDE, IRIS_ENTITY_PADDED_STRIDE};
pub use cpu::{
    CpuTransformRenderer, ENTITY_VERTEX_STRIDE, EntityVertex, TransformInput, chunk_ranges,
    transform_vertices,
};
pub use vertex_shader::VertexShaderRenderer;

use std::sync::Arc;

use bytemuck::{Pod, Zeroable};

use crate::caps::{DeviceCapabilities, RendererKind};
use crate::config::RendererConfig;
use crate::error::{RenderError, Result};
use crate::pipeline::PipelineCompiler;
use crate::pool::ShaderDataBackend;
use crate::scene::{MorphTargets, RenderScene, RenderTask};

pub trait TransformRenderer {
    fn kind(&self) -> RendererKind;

    /// Record the draws of one task immediately
    fn render(
        &mut self,
        frame: &mut FrameCommands,
        scene: &Arc<RenderScene>,
        task: &RenderTask,
    ) -> Result<()>;

    /// Queue a task for [`execute`](Self::execute)
    fn schedule(
        &mut self,
        _frame: &mut FrameCommands,
        _scene: &Arc<RenderScene>,
        _task: RenderTask,
    ) -> Result<()> {
        Err(RenderError::SchedulingUnsupported(self.kind()))
    }

    /// Record everything queued by [`schedule`](Self::schedule)
    fn execute(&mut self, _frame: &mut FrameCommands) -> Result<()> {
        Ok(())
    }

    /// Advance the shader data pools to the next frame
    fn rotate(&mut self);

    /// Release every pooled buffer and cached pipeline
    fn close(&mut self);

    /// Compiled pipeline variants held by this renderer
    fn pipeline_count(&self) -> usize {
        0
    }
}

/// Create the renderer for `preferred`, or the CPU path if the device lacks support
pub fn create_renderer<B, C>(
    preferred: RendererKind,
    backend: B,
    compiler: C,
    caps: &DeviceCapabilities,
    config: &RendererConfig,
) -> Result<Box<dyn TransformRenderer>>
where
    B: ShaderDataBackend + Clone + 'static,
    C: PipelineCompiler + 'static,
{
    let kind = RendererKind::select(caps, preferred);
    tracing::info!("Using '{}' renderer", kind);
    let renderer: Box<dyn TransformRenderer> = match kind {
        RendererKind::CpuTransform => Box::new(CpuTransformRenderer::new(
            backend,
            config.ring_depth,
            config.cpu_parallel_threshold,
        )?),
        RendererKind::VertexShaderTransform => {
            Box::new(VertexShaderRenderer::new(backend, compiler, caps, config)?)
        }
        RendererKind::ComputeShaderTransform => {
            Box::new(ComputeShaderRenderer::new(backend, compiler, caps, config)?)
        }
    };
    Ok(renderer)
}

/// `MorphData` uniform block
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub(crate) struct MorphData {
    pub position_targets: u32,
    pub color_targets: u32,
    pub texcoord_targets: u32,
    pub vertex_count: u32,
}

impl MorphData {
    pub fn new(targets: &MorphTargets, vertex_count: usize) -> Self {
        Self {
            position_targets: targets.position.len() as u32,
            color_targets: 0,
            texcoord_targets: targets.texcoord.len() as u32,
            vertex_count: vertex_count as u32,
        }
    }
}

/// Indices and weights of the non-zero targets, padded to `max_enabled` with -1 / 0
///
/// Every task yields the same size, so instanced draws can pack them.
pub(crate) fn enabled_morph_targets(
    targets: &MorphTargets,
    weights: &[f32],
    max_enabled: usize,
) -> (Vec<i32>, Vec<f32>) {
    let mut indices = vec![-1; max_enabled];
    let mut enabled = vec![0.0; max_enabled];
    let active = weights
        .iter()
        .take(targets.target_count())
        .enumerate()
        .filter(|(_, weight)| **weight != 0.0)
        .take(max_enabled);
    for (slot, (index, weight)) in active.enumerate() {
        indices[slot] = index as i32;
        enabled[slot] = *weight;
    }
    (indices, enabled)
}

/// Target offsets as shader blocks: positions as vec4, texcoords as vec2
pub(crate) fn morph_target_blocks(targets: &MorphTargets) -> (Vec<[f32; 4]>, Vec<[f32; 2]>) {
    let positions = targets
        .position
        .iter()
        .flatten()
        .map(|offset| offset.extend(0.0).to_array())
        .collect();
    let texcoords = targets
        .texcoord
        .iter()
        .flatten()
        .map(|offset| offset.to_array())
        .collect();
    (positions, texcoords)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::SpecCompiler;
    use crate::pool::MemoryBackend;
    use glam::{Vec2, Vec3};

    #[test]
    fn test_enabled_morph_targets_skip_zero_weights() {
        let targets = MorphTargets {
            position: vec![vec![Vec3::X]; 3],
            texcoord: vec![vec![Vec2::X]],
        };
        let (indices, weights) = enabled_morph_targets(&targets, &[0.0, 0.5, 0.0, 1.0, 9.0], 3);
        assert_eq!(indices, vec![1, 3, -1]);
        assert_eq!(weights, vec![0.5, 1.0, 0.0]);

        let (indices, _) = enabled_morph_targets(&targets, &[1.0; 4], 2);
        assert_eq!(indices, vec![0, 1]);
    }

    #[test]
    fn test_create_renderer_falls_back_to_cpu() {
        let config = RendererConfig::default();
        let renderer = create_renderer(
            RendererKind::ComputeShaderTransform,
            MemoryBackend::new(),
            SpecCompiler::new(),
            &DeviceCapabilities::minimal(),
            &config,
        )
        .unwrap();
        assert_eq!(renderer.kind(), RendererKind::CpuTransform);

        for kind in RendererKind::ALL {
            let renderer = create_renderer(
                kind,
                MemoryBackend::new(),
                SpecCompiler::new(),
                &DeviceCapabilities::default(),
                &config,
            )
            .unwrap();
            assert_eq!(renderer.kind(), kind);
        }
    }
}
