//! Vertex-shader transform
//!
//! The primitive's static vertex buffer is drawn as is; local matrices,
//! joint matrices and morph weights are uploaded to the shader data pool and
//! applied in the vertex shader. Tasks scheduled for the same scene are
//! drawn instanced, `instance_size` tasks per draw.

use std::sync::Arc;

use blazerod_model::geometry::VERTEX_STRIDE;
use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3};

use super::commands::{
    Binding, Bindings, BufferRef, Command, Draw, FrameCommands, PipelineId, PoolRole,
};
use super::{MorphData, TransformRenderer, enabled_morph_targets, morph_target_blocks};
use crate::caps::{DeviceCapabilities, RendererKind};
use crate::config::RendererConfig;
use crate::error::{RenderError, Result};
use crate::material::MaterialDescriptor;
use crate::pipeline::{PipelineCompiler, PipelineVariantCache, ShaderOptions, VertexVariant};
use crate::pool::{PoolDescriptor, ShaderDataBackend, ShaderDataPool, ShaderDataSlice};
use crate::scene::{RenderPrimitive, RenderScene, RenderTask, normal_matrix, unpack_coords};

/// Fixed diffuse light directions of entity shading
const LIGHT0_DIRECTION: Vec3 = Vec3::new(0.2, 1.0, -0.7);
const LIGHT1_DIRECTION: Vec3 = Vec3::new(-0.2, 1.0, 0.7);

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct InstanceHeader {
    primitive_count: u32,
    primitive_index: u32,
    instance_count: u32,
    _padding: u32,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct InstanceEntry {
    model_matrix: [f32; 16],
    normal_matrix: [f32; 16],
    light: [u32; 2],
    overlay: [u32; 2],
}

impl InstanceEntry {
    fn new(task: &RenderTask, local: Mat4) -> Self {
        let normal = Mat4::from_mat3(normal_matrix(task.model_matrix * local));
        Self {
            model_matrix: task.model_matrix.to_cols_array(),
            normal_matrix: normal.to_cols_array(),
            light: unpack_coords(task.light).map(u32::from),
            overlay: unpack_coords(task.overlay).map(u32::from),
        }
    }
}

/// `InstanceData` block: header plus one entry per instance
fn instance_data(primitive: &RenderPrimitive, primitive_count: usize, tasks: &[&RenderTask]) -> Vec<u8> {
    let header = InstanceHeader {
        primitive_count: primitive_count as u32,
        primitive_index: primitive.index as u32,
        instance_count: tasks.len() as u32,
        _padding: 0,
    };
    let mut bytes = bytemuck::bytes_of(&header).to_vec();
    for task in tasks {
        let local = task
            .local_matrices
            .get(primitive.index)
            .copied()
            .unwrap_or(Mat4::IDENTITY);
        bytes.extend_from_slice(bytemuck::bytes_of(&InstanceEntry::new(task, local)));
    }
    bytes
}

fn lighting_block() -> [[f32; 4]; 2] {
    [
        LIGHT0_DIRECTION.normalize().extend(0.0).to_array(),
        LIGHT1_DIRECTION.normalize().extend(0.0).to_array(),
    ]
}

pub struct VertexShaderRenderer<B: ShaderDataBackend, C: PipelineCompiler> {
    data_pool: ShaderDataPool<B>,
    uniform_pool: ShaderDataPool<B>,
    pipelines: PipelineVariantCache<C::Pipeline>,
    compiler: C,
    options: ShaderOptions,
    scheduled: Vec<(Arc<RenderScene>, Vec<RenderTask>)>,
}

impl<B: ShaderDataBackend + Clone, C: PipelineCompiler> VertexShaderRenderer<B, C> {
    pub fn new(
        backend: B,
        compiler: C,
        caps: &DeviceCapabilities,
        config: &RendererConfig,
    ) -> Result<Self> {
        let options = ShaderOptions::new(caps, config);
        let data = if options.ssbo {
            PoolDescriptor::storage("vertex_transform_data", caps.ssbo_offset_alignment)
        } else {
            PoolDescriptor::texel("vertex_transform_data", caps.texel_buffer_offset_alignment)
        };
        let uniforms =
            PoolDescriptor::uniform("vertex_transform_uniforms", caps.uniform_offset_alignment);
        Ok(Self {
            data_pool: ShaderDataPool::new(backend.clone(), data.with_ring_depth(config.ring_depth))?,
            uniform_pool: ShaderDataPool::new(backend, uniforms.with_ring_depth(config.ring_depth))?,
            pipelines: PipelineVariantCache::new(),
            compiler,
            options,
            scheduled: Vec::new(),
        })
    }
}

impl<B: ShaderDataBackend, C: PipelineCompiler> VertexShaderRenderer<B, C> {
    pub fn options(&self) -> &ShaderOptions {
        &self.options
    }

    pub fn pipelines(&self) -> &PipelineVariantCache<C::Pipeline> {
        &self.pipelines
    }

    pub fn data_pool(&self) -> &ShaderDataPool<B> {
        &self.data_pool
    }

    pub fn uniform_pool(&self) -> &ShaderDataPool<B> {
        &self.uniform_pool
    }

    /// Tasks waiting for `execute`
    pub fn scheduled_count(&self) -> usize {
        self.scheduled.iter().map(|(_, tasks)| tasks.len()).sum()
    }

    fn ensure_pipeline(&mut self, descriptor: MaterialDescriptor, variant: VertexVariant) {
        let options = self.options;
        let compiler = &mut self.compiler;
        self.pipelines.get_or_create(descriptor, variant.bits(), || {
            compiler.compile(&variant.spec(descriptor, &options))
        });
    }

    /// Storage or texel binding, whichever the pipeline variant declares
    fn data_binding(&self, storage: &'static str, texel: &'static str, slice: ShaderDataSlice) -> Binding {
        let buffer = BufferRef::Pooled {
            role: PoolRole::Data,
            slice,
        };
        if self.options.ssbo {
            Binding::storage(storage, buffer)
        } else {
            Binding::texel(texel, buffer)
        }
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

    fn upload_morph(
        &mut self,
        bindings: &mut Bindings,
        primitive: &RenderPrimitive,
        tasks: &[&RenderTask],
    ) -> Result<()> {
        let Some(targets) = primitive.morph_targets.as_deref() else {
            return Ok(());
        };
        let max_enabled = self.options.max_enabled_morph_targets;
        let data = MorphData::new(targets, primitive.vertex_count());
        bindings.push(self.upload_uniform("MorphData", bytemuck::bytes_of(&data))?);

        let (positions, texcoords) = morph_target_blocks(targets);
        let slice = self.data_pool.upload(bytemuck::cast_slice(&positions))?;
        bindings.push(self.data_binding("MorphPositionBlock", "MorphPositionData", slice));
        let slice = self.data_pool.upload(bytemuck::cast_slice(&texcoords))?;
        bindings.push(self.data_binding("MorphTexCoordBlock", "MorphTexCoordData", slice));

        let (indices, weights): (Vec<Vec<i32>>, Vec<Vec<f32>>) = tasks
            .iter()
            .map(|task| enabled_morph_targets(targets, &task.morph_weights, max_enabled))
            .unzip();
        let index_bytes: Vec<&[u8]> = indices.iter().map(|i| bytemuck::cast_slice(i)).collect();
        let slice = self.data_pool.upload_many(&index_bytes)?;
        bindings.push(self.data_binding("MorphTargetIndicesData", "MorphTargetIndices", slice));
        let weight_bytes: Vec<&[u8]> = weights.iter().map(|w| bytemuck::cast_slice(w)).collect();
        let slice = self.data_pool.upload_many(&weight_bytes)?;
        bindings.push(self.data_binding("MorphWeightsData", "MorphWeights", slice));
        Ok(())
    }

    /// Draw every primitive of `scene` once per task in `tasks`
    fn render_group(
        &mut self,
        frame: &mut FrameCommands,
        scene: &Arc<RenderScene>,
        tasks: &[&RenderTask],
        instanced: bool,
    ) -> Result<()> {
        let Some(first) = tasks.first() else {
            return Ok(());
        };
        let expected = scene.primitives.len();
        if let Some(task) = tasks.iter().find(|task| task.local_matrices.len() != expected) {
            return Err(RenderError::LocalMatrixCount {
                expected,
                found: task.local_matrices.len(),
            });
        }
        let scene_index = frame.scene_index(scene);

        let local_bytes: Vec<&[u8]> = tasks
            .iter()
            .map(|task| bytemuck::cast_slice(&task.local_matrices))
            .collect();
        let local_matrices = self.data_pool.upload_many(&local_bytes)?;

        let joints = if scene.primitives.iter().any(RenderPrimitive::skinned) {
            let joint_bytes: Vec<&[u8]> = tasks
                .iter()
                .map(|task| bytemuck::cast_slice(&task.joint_matrices))
                .collect();
            Some((self.data_pool.upload_many(&joint_bytes)?, first.joint_matrices.len()))
        } else {
            None
        };

        for primitive in &scene.primitives {
            if primitive.vertex_count() == 0 {
                continue;
            }
            for task in tasks {
                task.check_skin(primitive)?;
            }
            let material = &primitive.material;
            let variant = VertexVariant::of(material, instanced);
            self.ensure_pipeline(material.descriptor, variant);

            let mut bindings = Bindings::new();
            let instances = instance_data(primitive, expected, tasks);
            bindings.push(self.upload_uniform("InstanceData", &instances)?);
            bindings.push(self.data_binding("LocalMatricesData", "LocalMatrices", local_matrices));
            if let (true, Some((slice, joint_count))) = (primitive.skinned(), joints) {
                let indices = [joint_count as u32, 0, 0, 0];
                bindings.push(self.upload_uniform("SkinModelIndices", bytemuck::cast_slice(&indices))?);
                bindings.push(self.data_binding("JointsData", "Joints", slice));
            }
            if material.morphed {
                self.upload_morph(&mut bindings, primitive, tasks)?;
            }
            bindings.push(self.upload_uniform(material.descriptor.uniform_block(), &material.uniform_bytes())?);
            if material.descriptor == MaterialDescriptor::Vanilla {
                bindings.push(self.upload_uniform("Lighting", bytemuck::cast_slice(&lighting_block()))?);
            }

            let label = if instanced {
                format!("{} #{} (vertex x{})", scene.name, primitive.index, tasks.len())
            } else {
                format!("{} #{} (vertex)", scene.name, primitive.index)
            };
            frame.push(Command::Draw(Draw {
                label,
                pipeline: PipelineId::Vertex {
                    material: material.descriptor,
                    variant,
                },
                vertex_buffer: BufferRef::Primitive {
                    scene: scene_index,
                    primitive: primitive.index,
                },
                vertex_stride: VERTEX_STRIDE as u64,
                vertex_count: primitive.vertex_count() as u32,
                index_count: primitive.index_count().map(|count| count as u32),
                scene: scene_index,
                primitive: primitive.index,
                instance_count: tasks.len() as u32,
                bindings,
                model_matrix: first.model_matrix,
                base_color: material.base_color,
                texture: material.texture.clone(),
            }));
        }
        Ok(())
    }
}

impl<B: ShaderDataBackend, C: PipelineCompiler> TransformRenderer for VertexShaderRenderer<B, C> {
    fn kind(&self) -> RendererKind {
        RendererKind::VertexShaderTransform
    }

    fn render(
        &mut self,
        frame: &mut FrameCommands,
        scene: &Arc<RenderScene>,
        task: &RenderTask,
    ) -> Result<()> {
        self.render_group(frame, scene, &[task], false)
    }

    fn schedule(
        &mut self,
        _frame: &mut FrameCommands,
        scene: &Arc<RenderScene>,
        task: RenderTask,
    ) -> Result<()> {
        match self
            .scheduled
            .iter_mut()
            .find(|(known, _)| Arc::ptr_eq(known, scene))
        {
            Some((_, tasks)) => tasks.push(task),
            None => self.scheduled.push((Arc::clone(scene), vec![task])),
        }
        Ok(())
    }

    fn execute(&mut self, frame: &mut FrameCommands) -> Result<()> {
        let instance_size = self.options.instance_size;
        for (scene, tasks) in std::mem::take(&mut self.scheduled) {
            if let [task] = tasks.as_slice() {
                self.render_group(frame, &scene, &[task], false)?;
                continue;
            }
            for chunk in tasks.chunks(instance_size) {
                let chunk: Vec<&RenderTask> = chunk.iter().collect();
                self.render_group(frame, &scene, &chunk, true)?;
            }
        }
        Ok(())
    }

    fn rotate(&mut self) {
        self.data_pool.rotate();
        self.uniform_pool.rotate();
    }

    fn close(&mut self) {
        self.scheduled.clear();
        self.data_pool.close();
        self.uniform_pool.close();
        self.pipelines.clear();
    }

    fn pipeline_count(&self) -> usize {
        self.pipelines.len()
    }
}
