//! Renderer inputs
//!
//! A [`RenderScene`] is the static, GPU-ready part of one model scene: its
//! primitives with their vertices, indices and materials. A [`RenderTask`] is
//! one instance of that scene to draw this frame: model matrix, lighting and
//! the animated matrices.

use std::sync::Arc;

use blazerod_model::geometry::Vertex;
use blazerod_model::scene::{Model, NodeId, NodeTransform, Scene};
use blazerod_model::{Pose, Skeleton};
use glam::{Mat3, Mat4, Vec2, Vec3};

use crate::error::{RenderError, Result};
use crate::material::RenderMaterial;

/// Packed light coordinates for full brightness (block 15, sky 15)
pub const FULL_BRIGHT: u32 = 0x00F0_00F0;

/// Packed overlay coordinates for "no hurt/white flash"
pub const NO_OVERLAY: u32 = 0x000A_0000;

/// Per-target vertex offsets blended by the morph weights
///
/// Weights are laid out position targets first, then texcoord targets.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MorphTargets {
    pub position: Vec<Vec<Vec3>>,
    pub texcoord: Vec<Vec<Vec2>>,
}

impl MorphTargets {
    pub fn target_count(&self) -> usize {
        self.position.len() + self.texcoord.len()
    }

    pub fn is_empty(&self) -> bool {
        self.target_count() == 0
    }

    /// Add the weighted offsets of every target to one vertex
    pub fn apply(&self, weights: &[f32], vertex: usize, position: &mut Vec3, uv: &mut Vec2) {
        let (position_weights, texcoord_weights) =
            weights.split_at(self.position.len().min(weights.len()));
        for (target, weight) in self.position.iter().zip(position_weights) {
            if let Some(offset) = target.get(vertex) {
                *position += *offset * *weight;
            }
        }
        for (target, weight) in self.texcoord.iter().zip(texcoord_weights) {
            if let Some(offset) = target.get(vertex) {
                *uv += *offset * *weight;
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct RenderPrimitive {
    /// Position in [`RenderScene::primitives`]
    pub index: usize,
    pub vertices: Arc<[Vertex]>,
    pub indices: Option<Arc<[u16]>>,
    pub material: RenderMaterial,
    pub morph_targets: Option<Arc<MorphTargets>>,
}

impl RenderPrimitive {
    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    pub fn index_count(&self) -> Option<usize> {
        self.indices.as_ref().map(|indices| indices.len())
    }

    pub fn skinned(&self) -> bool {
        self.material.skinned
    }
}

#[derive(Debug, Clone)]
pub struct RenderScene {
    pub name: String,
    pub primitives: Vec<RenderPrimitive>,
    pub skeleton: Option<Skeleton>,
    /// Scene root times node transforms, one per primitive
    pub local_matrices: Vec<Mat4>,
}

impl RenderScene {
    /// The model's default scene
    pub fn from_model(model: &Model) -> Result<Self> {
        let scene = model.default_scene().ok_or(RenderError::NoScene)?;
        Ok(Self::from_scene(model, scene))
    }

    pub fn from_scene(model: &Model, scene: &Scene) -> Self {
        let root = scene
            .transform
            .as_ref()
            .map_or(Mat4::IDENTITY, NodeTransform::matrix);
        let skeleton = Skeleton::from_scene(model, scene);

        let mut primitives = Vec::new();
        let mut local_matrices = Vec::new();
        let mut stack: Vec<(NodeId, Mat4)> = scene.nodes.iter().rev().map(|id| (*id, root)).collect();
        while let Some((id, parent)) = stack.pop() {
            let Some(node) = model.node(id) else {
                continue;
            };
            let world = parent
                * node
                    .transform
                    .as_ref()
                    .map_or(Mat4::IDENTITY, NodeTransform::matrix);
            stack.extend(node.children.iter().rev().map(|child| (*child, world)));

            let Some(mesh) = node.mesh() else {
                continue;
            };
            let skinned = node.skin().is_some() && skeleton.is_some();
            for primitive in &mesh.primitives {
                let Some(vertices) = primitive.read_vertices() else {
                    tracing::warn!(
                        "Skipping primitive of node '{}' in scene '{}': unsupported vertex layout",
                        node.name,
                        scene.name
                    );
                    continue;
                };
                let indices = primitive
                    .indices
                    .as_ref()
                    .and_then(|accessor| accessor.read_u16())
                    .map(Arc::from);
                primitives.push(RenderPrimitive {
                    index: primitives.len(),
                    vertices: Arc::from(vertices),
                    indices,
                    material: RenderMaterial::new(&primitive.material, skinned, false),
                    morph_targets: None,
                });
                local_matrices.push(world);
            }
        }

        tracing::debug!(
            "Prepared render scene '{}': {} primitives, {} joints",
            scene.name,
            primitives.len(),
            skeleton.as_ref().map_or(0, Skeleton::len)
        );

        Self {
            name: scene.name.clone(),
            primitives,
            skeleton,
            local_matrices,
        }
    }

    pub fn vertex_count(&self) -> usize {
        self.primitives.iter().map(RenderPrimitive::vertex_count).sum()
    }

    /// Task for one instance, posed by `pose` or the rest pose
    pub fn task(&self, model_matrix: Mat4, pose: Option<&Pose>) -> RenderTask {
        let joint_matrices = match (&self.skeleton, pose) {
            (Some(skeleton), Some(pose)) => skeleton.joint_matrices(pose),
            (Some(skeleton), None) => skeleton.joint_matrices(&skeleton.rest_pose()),
            (None, _) => Vec::new(),
        };
        RenderTask {
            model_matrix,
            light: FULL_BRIGHT,
            overlay: NO_OVERLAY,
            local_matrices: self.local_matrices.clone(),
            joint_matrices,
            morph_weights: Vec::new(),
        }
    }
}

/// One instance of a scene to draw
#[derive(Debug, Clone, PartialEq)]
pub struct RenderTask {
    pub model_matrix: Mat4,
    pub light: u32,
    pub overlay: u32,
    pub local_matrices: Vec<Mat4>,
    pub joint_matrices: Vec<Mat4>,
    pub morph_weights: Vec<f32>,
}

impl RenderTask {
    pub fn with_light(mut self, light: u32) -> Self {
        self.light = light;
        self
    }

    pub fn with_overlay(mut self, overlay: u32) -> Self {
        self.overlay = overlay;
        self
    }

    pub fn with_morph_weights(mut self, weights: Vec<f32>) -> Self {
        self.morph_weights = weights;
        self
    }

    /// Model matrix times the primitive's local matrix
    pub(crate) fn primitive_matrix(&self, primitive: usize) -> Result<Mat4> {
        self.local_matrices
            .get(primitive)
            .map(|local| self.model_matrix * *local)
            .ok_or(RenderError::LocalMatrixCount {
                expected: primitive + 1,
                found: self.local_matrices.len(),
            })
    }

    /// Fail if a skinned primitive is drawn without joint matrices
    pub(crate) fn check_skin(&self, primitive: &RenderPrimitive) -> Result<()> {
        if primitive.skinned() && self.joint_matrices.is_empty() {
            return Err(RenderError::MissingJoints {
                primitive: primitive.index,
            });
        }
        Ok(())
    }
}

/// Inverse transpose of the upper 3x3, for transforming normals
pub fn normal_matrix(matrix: Mat4) -> Mat3 {
    let linear = Mat3::from_mat4(matrix);
    if linear.determinant().abs() <= f32::EPSILON {
        return Mat3::IDENTITY;
    }
    linear.inverse().transpose()
}

/// Split a packed light or overlay value into its two 16-bit coordinates
pub fn unpack_coords(packed: u32) -> [u16; 2] {
    [(packed & 0xFFFF) as u16, (packed >> 16) as u16]
}
