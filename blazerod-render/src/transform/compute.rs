//! Compute-shader transform
//!
//! A compute pass reads the primitive's static vertices, applies morphs and
//! skinning and writes padded entity vertices into a pooled vertex buffer.
//! That buffer is then drawn with the host's entity pipeline. A
//! `STORAGE | VERTEX` memory barrier always separates the dispatch from the
//! draw reading its output:
//! - `render`: dispatch, barrier, draw per primitive
//! - `schedule` + `execute`: every dispatch first, one barrier, every draw

use std::sync::Arc;

use bytemuck::{Pod, Zeroable};
use glam::Mat4;

use super::commands::{
    BarrierFlags, Binding, Bindings, BufferRef, Command, Dispatch, Draw, FrameCommands,
    PipelineId, PoolRole,
};
use super::{MorphData, TransformRenderer, enabled_morph_targets, morph_target_blocks};
use crate::caps::{DeviceCapabilities, RendererKind};
use crate::config::RendererConfig;
use crate::error::Result;
use crate::material::MaterialDescriptor;
use crate::pipeline::{ComputeVariant, PipelineCompiler, PipelineVariantCache, ShaderOptions};
use crate::pool::{Backing, PoolDescriptor, ShaderDataBackend, ShaderDataPool, ShaderDataSlice};
use crate::scene::{RenderPrimitive, RenderScene, RenderTask, normal_matrix};

/// Entity vertex padded for std430 writes (48 bytes)
pub const ENTITY_PADDED_STRIDE: u64 = 48;

/// Entity vertex with the shader-pack extension attributes (64 bytes)
pub const IRIS_ENTITY_PADDED_STRIDE: u64 = 64;

/// `ComputeData` uniform block
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct ComputeData {
    normal_matrix: [f32; 16],
    total_vertices: u32,
    overlay: u32,
    light: u32,
    _padding: u32,
}

pub struct ComputeShaderRenderer<B: ShaderDataBackend, C: PipelineCompiler> {
    data_pool: ShaderDataPool<B>,
    uniform_pool: ShaderDataPool<B>,
    vertex_pool: ShaderDataPool<B>,
    pipelines: PipelineVariantCache<C::Pipeline>,
    compiler: C,
    options: ShaderOptions,
    iris_vertex_format: bool,
    /// Draws of scheduled dispatches, waiting for the barrier
    pending: Vec<Draw>,
}

impl<B: ShaderDataBackend + Clone, C: PipelineCompiler> ComputeShaderRenderer<B, C> {
    pub fn new(
        backend: B,
        compiler: C,
        caps: &DeviceCapabilities,
        config: &RendererConfig,
    ) -> Result<Self> {
        let depth = config.ring_depth;
        let data = PoolDescriptor::storage("compute_transform_data", caps.ssbo_offset_alignment)
            .with_ring_depth(depth);
        let uniforms =
            PoolDescriptor::uniform("compute_transform_uniforms", caps.uniform_offset_alignment)
                .with_ring_depth(depth);
        let vertices = PoolDescriptor::vertex("compute_transform_vertices", Backing::VertexStorage)
            .with_ring_depth(depth);
        Ok(Self {
            data_pool: ShaderDataPool::new(backend.clone(), data)?,
            uniform_pool: ShaderDataPool::new(backend.clone(), uniforms)?,
            vertex_pool: ShaderDataPool::new(backend, vertices)?,
            pipelines: PipelineVariantCache::new(),
            compiler,
            options: ShaderOptions {
                ssbo: true,
                ..ShaderOptions::new(caps, config)
            },
            iris_vertex_format: false,
            pending: Vec::new(),
        })
    }
}

impl<B: ShaderDataBackend, C: PipelineCompiler> ComputeShaderRenderer<B, C> {
    /// Write the 64-byte vertex layout shader packs expect
    pub fn with_iris_vertex_format(mut self, enabled: bool) -> Self {
        self.iris_vertex_format = enabled;
        self
    }

    pub fn vertex_stride(&self) -> u64 {
        if self.iris_vertex_format {
            IRIS_ENTITY_PADDED_STRIDE
        } else {
            ENTITY_PADDED_STRIDE
        }
    }

    pub fn pipelines(&self) -> &PipelineVariantCache<C::Pipeline> {
        &self.pipelines
    }

    pub fn vertex_pool(&self) -> &ShaderDataPool<B> {
        &self.vertex_pool
    }

    fn ensure_pipeline(&mut self, descriptor: MaterialDescriptor, variant: ComputeVariant) {
        let options = self.options;
        let compiler = &mut self.compiler;
        self.pipelines.get_or_create(descriptor, variant.bits(), || {
            compiler.compile(&variant.spec(descriptor, &options))
        });
    }

    fn upload_uniform(&mut self, name: &'static str, bytes: &[u8]) -> Result<Binding> {
        let slice = self.uniform_pool.upload(bytes)?;
        Ok(Binding::uniform(
            name,
            BufferRef::Pooled {
                role: PoolRole::Uniform,
                slice,
            },
        ))
    }

    fn upload_storage(&mut self, name: &'static str, bytes: &[u8]) -> Result<Binding> {
        let slice = self.data_pool.upload(bytes)?;
        Ok(Binding::storage(
            name,
            BufferRef::Pooled {
                role: PoolRole::Data,
                slice,
            },
        ))
    }

    fn upload_morph(
        &mut self,
        bindings: &mut Bindings,
        primitive: &RenderPrimitive,
        task: &RenderTask,
    ) -> Result<()> {
        let Some(targets) = primitive.morph_targets.as_deref() else {
            return Ok(());
        };
        let data = MorphData::new(targets, primitive.vertex_count());
        bindings.push(self.upload_uniform("MorphData", bytemuck::bytes_of(&data))?);
        let (positions, texcoords) = morph_target_blocks(targets);
        bindings.push(self.upload_storage("MorphPositionBlock", bytemuck::cast_slice(&positions))?);
        bindings.push(self.upload_storage("MorphTexCoordBlock", bytemuck::cast_slice(&texcoords))?);
        let (indices, weights) = enabled_morph_targets(
            targets,
            &task.morph_weights,
            self.options.max_enabled_morph_targets,
        );
        bindings.push(self.upload_storage("MorphTargetIndicesData", bytemuck::cast_slice(&indices))?);
        bindings.push(self.upload_storage("MorphWeightsData", bytemuck::cast_slice(&weights))?);
        Ok(())
    }

    /// Record the dispatch transforming one primitive; returns the draw of its output
    fn dispatch(
        &mut self,
        frame: &mut FrameCommands,
        scene: &RenderScene,
        scene_index: usize,
        task: &RenderTask,
        primitive: &RenderPrimitive,
        joints: Option<ShaderDataSlice>,
    ) -> Result<Draw> {
        task.check_skin(primitive)?;
        let model_matrix = task.primitive_matrix(primitive.index)?;
        let vertex_count = primitive.vertex_count() as u32;
        let stride = self.vertex_stride();
        let target = BufferRef::Pooled {
            role: PoolRole::Vertex,
            slice: self.vertex_pool.allocate(stride * vertex_count as u64)?,
        };

        let mut bindings = Bindings::new();
        bindings.push(Binding::storage(
            "SourceVertexData",
            BufferRef::Primitive {
                scene: scene_index,
                primitive: primitive.index,
            },
        ));
        bindings.push(Binding::storage("TargetVertexData", target));
        let compute_data = ComputeData {
            normal_matrix: Mat4::from_mat3(normal_matrix(model_matrix)).to_cols_array(),
            total_vertices: vertex_count,
            overlay: task.overlay,
            light: task.light,
            _padding: 0,
        };
        bindings.push(self.upload_uniform("ComputeData", bytemuck::bytes_of(&compute_data))?);

        let material = &primitive.material;
        if let (true, Some(slice)) = (primitive.skinned(), joints) {
            let indices = [task.joint_matrices.len() as u32, 0, 0, 0];
            bindings.push(self.upload_uniform("SkinModelIndices", bytemuck::cast_slice(&indices))?);
            bindings.push(Binding::storage(
                "JointsData",
                BufferRef::Pooled {
                    role: PoolRole::Data,
                    slice,
                },
            ));
        }
        if material.morphed {
            self.upload_morph(&mut bindings, primitive, task)?;
        }

        let variant = ComputeVariant::of(material, self.iris_vertex_format);
        self.ensure_pipeline(material.descriptor, variant);
        frame.push(Command::Dispatch(Dispatch {
            label: format!("{} #{} (compute)", scene.name, primitive.index),
            pipeline: PipelineId::Compute {
                material: material.descriptor,
                variant,
            },
            workgroups: [vertex_count.div_ceil(self.options.compute_local_size), 1, 1],
            bindings,
            target,
        }));

        Ok(Draw {
            label: format!("{} #{} (compute draw)", scene.name, primitive.index),
            pipeline: PipelineId::Entity,
            vertex_buffer: target,
            vertex_stride: stride,
            vertex_count,
            index_count: primitive.index_count().map(|count| count as u32),
            scene: scene_index,
            primitive: primitive.index,
            instance_count: 1,
            bindings: Bindings::new(),
            model_matrix,
            base_color: material.base_color,
            texture: material.texture.clone(),
        })
    }

    /// Dispatch every primitive of one task, returning their draws in order
    fn dispatch_task(
        &mut self,
        frame: &mut FrameCommands,
        scene: &Arc<RenderScene>,
        task: &RenderTask,
        mut on_dispatch: impl FnMut(&mut FrameCommands, Draw),
    ) -> Result<()> {
        let scene_index = frame.scene_index(scene);
        let joints = if scene.primitives.iter().any(RenderPrimitive::skinned) {
            Some(self.data_pool.upload(bytemuck::cast_slice(&task.joint_matrices))?)
        } else {
            None
        };
        for primitive in &scene.primitives {
            if primitive.vertex_count() == 0 {
                continue;
            }
            let draw = self.dispatch(frame, scene, scene_index, task, primitive, joints)?;
            on_dispatch(frame, draw);
        }
        Ok(())
    }
}

impl<B: ShaderDataBackend, C: PipelineCompiler> TransformRenderer for ComputeShaderRenderer<B, C> {
    fn kind(&self) -> RendererKind {
        RendererKind::ComputeShaderTransform
    }

    fn render(
        &mut self,
        frame: &mut FrameCommands,
        scene: &Arc<RenderScene>,
        task: &RenderTask,
    ) -> Result<()> {
        self.dispatch_task(frame, scene, task, |frame, draw| {
            frame.push(Command::MemoryBarrier(BarrierFlags::STORAGE | BarrierFlags::VERTEX));
            frame.push(Command::Draw(draw));
        })
    }

    fn schedule(
        &mut self,
        frame: &mut FrameCommands,
        scene: &Arc<RenderScene>,
        task: RenderTask,
    ) -> Result<()> {
        let mut draws = Vec::new();
        self.dispatch_task(frame, scene, &task, |_, draw| draws.push(draw))?;
        self.pending.extend(draws);
        Ok(())
    }

    fn execute(&mut self, frame: &mut FrameCommands) -> Result<()> {
        if self.pending.is_empty() {
            return Ok(());
        }
        frame.push(Command::MemoryBarrier(BarrierFlags::STORAGE | BarrierFlags::VERTEX));
        for draw in self.pending.drain(..) {
            frame.push(Command::Draw(draw));
        }
        Ok(())
    }

    fn rotate(&mut self) {
        if !self.pending.is_empty() {
            tracing::warn!(
                "Dropping {} scheduled compute draws that were never executed",
                self.pending.len()
            );
            self.pending.clear();
        }
        self.data_pool.rotate();
        self.uniform_pool.rotate();
        self.vertex_pool.rotate();
    }

    fn close(&mut self) {
        self.pending.clear();
        self.data_pool.close();
        self.uniform_pool.close();
        self.vertex_pool.close();
        self.pipelines.clear();
    }

    fn pipeline_count(&self) -> usize {
        self.pipelines.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compute_data_layout() {
        assert_eq!(std::mem::size_of::<ComputeData>(), 80);
    }
}
