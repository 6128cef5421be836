//! CPU vertex transform
//!
//! Morphs and skins every vertex on the CPU and uploads the result as plain
//! entity vertices, drawn with the host's entity pipeline. Large primitives
//! are split into contiguous chunks processed on the rayon pool.

use std::ops::Range;
use std::sync::Arc;

use blazerod_model::geometry::Vertex;
use bytemuck::{Pod, Zeroable};
use glam::{Mat3, Mat4, Vec3};
use rayon::prelude::*;

use super::TransformRenderer;
use super::commands::{BufferRef, Command, Draw, FrameCommands, PipelineId, PoolRole};
use crate::caps::RendererKind;
use crate::error::Result;
use crate::pool::{Backing, PoolDescriptor, ShaderDataBackend, ShaderDataPool};
use crate::scene::{MorphTargets, RenderScene, RenderTask, normal_matrix, unpack_coords};

/// Skin weights below this are ignored
const MIN_JOINT_WEIGHT: f32 = 1e-6;

/// Vertex layout of the host's entity pipeline (36 bytes)
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct EntityVertex {
    pub position: [f32; 3],
    pub color: [u8; 4],
    pub uv: [f32; 2],
    pub overlay: [u16; 2],
    pub light: [u16; 2],
    pub normal: [i8; 4],
}

pub const ENTITY_VERTEX_STRIDE: u64 = std::mem::size_of::<EntityVertex>() as u64;

/// Everything the per-vertex transform reads
#[derive(Clone, Copy)]
pub struct TransformInput<'a> {
    pub vertices: &'a [Vertex],
    /// Joint matrices when the primitive is skinned
    pub joints: Option<&'a [Mat4]>,
    pub morph: Option<(&'a MorphTargets, &'a [f32])>,
    pub normal_matrix: Mat3,
    pub color: [u8; 4],
    pub light: u32,
    pub overlay: u32,
}

/// Contiguous vertex ranges, one per task
///
/// Work is only split when there are more vertices than workers and more
/// than `threshold`; the last range absorbs the remainder.
pub fn chunk_ranges(vertex_count: usize, workers: usize, threshold: usize) -> Vec<Range<usize>> {
    let workers = workers.max(1);
    let task_count = if vertex_count > workers && vertex_count > threshold {
        workers
    } else {
        1
    };
    let task_size = vertex_count / task_count;
    (0..task_count)
        .map(|task| {
            let start = task * task_size;
            let end = if task == task_count - 1 {
                vertex_count
            } else {
                start + task_size
            };
            start..end
        })
        .collect()
}

fn to_snorm8(value: f32) -> i8 {
    (value.clamp(-1.0, 1.0) * 127.0).round() as i8
}

fn transform_vertex(input: &TransformInput<'_>, index: usize) -> EntityVertex {
    let source = &input.vertices[index];
    let mut position = source.position();
    let mut uv = source.uv();
    let mut normal = source.normal();

    if let Some((targets, weights)) = input.morph {
        targets.apply(weights, index, &mut position, &mut uv);
    }

    if let Some(joints) = input.joints {
        let mut skinned_position = Vec3::ZERO;
        let mut skinned_normal = Vec3::ZERO;
        for (joint, weight) in source.joint.iter().zip(source.weight) {
            if weight < MIN_JOINT_WEIGHT {
                continue;
            }
            let Some(matrix) = joints.get(*joint as usize) else {
                continue;
            };
            skinned_position += matrix.transform_point3(position) * weight;
            skinned_normal += matrix.transform_vector3(normal) * weight;
        }
        position = skinned_position;
        normal = skinned_normal;
    }

    let normal = (input.normal_matrix * normal).normalize_or(Vec3::Y);
    EntityVertex {
        position: position.to_array(),
        color: input.color,
        uv: uv.to_array(),
        overlay: unpack_coords(input.overlay),
        light: unpack_coords(input.light),
        normal: [to_snorm8(normal.x), to_snorm8(normal.y), to_snorm8(normal.z), 0],
    }
}

/// Transform every vertex of `input`, fanning out over rayon above `threshold`
pub fn transform_vertices(input: &TransformInput<'_>, threshold: usize) -> Vec<EntityVertex> {
    let count = input.vertices.len();
    let ranges = chunk_ranges(count, rayon::current_num_threads(), threshold);
    let mut output = vec![EntityVertex::zeroed(); count];

    if ranges.len() == 1 {
        for (index, vertex) in output.iter_mut().enumerate() {
            *vertex = transform_vertex(input, index);
        }
        return output;
    }

    let mut chunks = Vec::with_capacity(ranges.len());
    let mut rest = output.as_mut_slice();
    for range in &ranges {
        let (chunk, tail) = std::mem::take(&mut rest).split_at_mut(range.len());
        chunks.push((range.start, chunk));
        rest = tail;
    }
    chunks.into_par_iter().for_each(|(start, chunk)| {
        for (offset, vertex) in chunk.iter_mut().enumerate() {
            *vertex = transform_vertex(input, start + offset);
        }
    });
    output
}

fn color_bytes(color: glam::Vec4) -> [u8; 4] {
    (color.clamp(glam::Vec4::ZERO, glam::Vec4::ONE) * 255.0)
        .round()
        .to_array()
        .map(|channel| channel as u8)
}

pub struct CpuTransformRenderer<B: ShaderDataBackend> {
    vertex_pool: ShaderDataPool<B>,
    parallel_threshold: usize,
}

impl<B: ShaderDataBackend> CpuTransformRenderer<B> {
    pub fn new(backend: B, ring_depth: usize, parallel_threshold: usize) -> Result<Self> {
        let descriptor =
            PoolDescriptor::vertex("cpu_transform_vertices", Backing::Vertex).with_ring_depth(ring_depth);
        Ok(Self {
            vertex_pool: ShaderDataPool::new(backend, descriptor)?,
            parallel_threshold,
        })
    }

    pub fn vertex_pool(&self) -> &ShaderDataPool<B> {
        &self.vertex_pool
    }
}

impl<B: ShaderDataBackend> TransformRenderer for CpuTransformRenderer<B> {
    fn kind(&self) -> RendererKind {
        RendererKind::CpuTransform
    }

    fn render(
        &mut self,
        frame: &mut FrameCommands,
        scene: &Arc<RenderScene>,
        task: &RenderTask,
    ) -> Result<()> {
        let scene_index = frame.scene_index(scene);
        for primitive in &scene.primitives {
            if primitive.vertex_count() == 0 {
                continue;
            }
            task.check_skin(primitive)?;
            let model_matrix = task.primitive_matrix(primitive.index)?;
            let morph = primitive
                .morph_targets
                .as_deref()
                .filter(|_| !task.morph_weights.is_empty())
                .map(|targets| (targets, task.morph_weights.as_slice()));
            let input = TransformInput {
                vertices: &primitive.vertices,
                joints: primitive
                    .skinned()
                    .then_some(task.joint_matrices.as_slice()),
                morph,
                normal_matrix: normal_matrix(model_matrix),
                color: color_bytes(primitive.material.base_color),
                light: task.light,
                overlay: task.overlay,
            };
            let vertices = transform_vertices(&input, self.parallel_threshold);
            let slice = self.vertex_pool.upload(bytemuck::cast_slice(&vertices))?;

            frame.push(Command::Draw(Draw {
                label: format!("{} #{} (cpu)", scene.name, primitive.index),
                pipeline: PipelineId::Entity,
                vertex_buffer: BufferRef::Pooled {
                    role: PoolRole::Vertex,
                    slice,
                },
                vertex_stride: ENTITY_VERTEX_STRIDE,
                vertex_count: vertices.len() as u32,
                index_count: primitive.index_count().map(|count| count as u32),
                scene: scene_index,
                primitive: primitive.index,
                instance_count: 1,
                bindings: Default::default(),
                model_matrix,
                base_color: primitive.material.base_color,
                texture: primitive.material.texture.clone(),
            }));
        }
        Ok(())
    }

    fn rotate(&mut self) {
        self.vertex_pool.rotate();
    }

    fn close(&mut self) {
        self.vertex_pool.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::{Quat, Vec2};

    fn vertex(position: Vec3, joint: u16) -> Vertex {
        Vertex {
            position: position.to_array(),
            normal: [0.0, 1.0, 0.0],
            uv: [0.25, 0.5],
            joint: [joint, 0, 0, 0],
            weight: [1.0, 0.0, 0.0, 0.0],
        }
    }

    fn input(vertices: &[Vertex]) -> TransformInput<'_> {
        TransformInput {
            vertices,
            joints: None,
            morph: None,
            normal_matrix: Mat3::IDENTITY,
            color: [255; 4],
            light: crate::scene::FULL_BRIGHT,
            overlay: crate::scene::NO_OVERLAY,
        }
    }

    #[test]
    fn test_entity_vertex_is_36_bytes() {
        assert_eq!(ENTITY_VERTEX_STRIDE, 36);
    }

    #[test]
    fn test_chunk_ranges() {
        // Small primitives stay on one task
        assert_eq!(chunk_ranges(500, 8, 1000), vec![0..500]);
        assert_eq!(chunk_ranges(4, 8, 0), vec![0..4]);

        let ranges = chunk_ranges(1003, 4, 1000);
        assert_eq!(ranges, vec![0..250, 250..500, 500..750, 750..1003]);
        assert_eq!(chunk_ranges(0, 4, 0), vec![0..0]);
    }

    #[test]
    fn test_skinning_applies_joint_matrix() {
        let vertices = [vertex(Vec3::X, 1)];
        let joints = [Mat4::IDENTITY, Mat4::from_translation(Vec3::new(0.0, 2.0, 0.0))];
        let output = transform_vertices(
            &TransformInput {
                joints: Some(&joints),
                ..input(&vertices)
            },
            1000,
        );
        assert_eq!(output[0].position, [1.0, 2.0, 0.0]);
        assert_eq!(output[0].normal, [0, 127, 0, 0]);
        assert_eq!(output[0].light, [0xF0, 0xF0]);
        assert_eq!(output[0].overlay, [0, 10]);
    }

    #[test]
    fn test_out_of_range_joint_and_zero_weight_are_skipped() {
        let mut blended = vertex(Vec3::ONE, 0);
        blended.joint = [0, 9, 1, 0];
        blended.weight = [0.5, 0.5, 0.0, 0.0];
        let joints = [
            Mat4::from_rotation_translation(Quat::IDENTITY, Vec3::Z),
            Mat4::from_translation(Vec3::splat(100.0)),
        ];
        let vertices = [blended];
        let output = transform_vertices(
            &TransformInput {
                joints: Some(&joints),
                ..input(&vertices)
            },
            1000,
        );
        assert_eq!(output[0].position, [0.5, 0.5, 1.0]);
    }

    #[test]
    fn test_morph_then_normal_matrix() {
        let targets = MorphTargets {
            position: vec![vec![Vec3::Y]],
            texcoord: vec![vec![Vec2::new(0.25, 0.0)]],
        };
        let weights = [2.0, 1.0];
        let vertices = [vertex(Vec3::ZERO, 0)];
        let output = transform_vertices(
            &TransformInput {
                morph: Some((&targets, &weights)),
                normal_matrix: Mat3::from_rotation_z(std::f32::consts::FRAC_PI_2),
                ..input(&vertices)
            },
            1000,
        );
        assert_eq!(output[0].position, [0.0, 2.0, 0.0]);
        assert_eq!(output[0].uv, [0.5, 0.5]);
        assert_eq!(output[0].normal, [-127, 0, 0, 0]);
    }

    #[test]
    fn test_parallel_matches_serial() {
        let vertices: Vec<Vertex> = (0..5000)
            .map(|i| vertex(Vec3::new(i as f32, 0.0, 0.0), (i % 2) as u16))
            .collect();
        let joints = [Mat4::IDENTITY, Mat4::from_scale(Vec3::splat(2.0))];
        let input = TransformInput {
            joints: Some(&joints),
            ..input(&vertices)
        };
        let serial = transform_vertices(&input, usize::MAX);
        let parallel = transform_vertices(&input, 0);
        assert_eq!(serial, parallel);
        assert_eq!(parallel[4998].position, [4998.0, 0.0, 0.0]);
        assert_eq!(parallel[3].position, [6.0, 0.0, 0.0]);
    }
}
