//! Compiled geometry to scene graph
//!
//! Per geometry the assembler emits one [`Scene`]:
//! ```text
//! Scene (scale w, h, w)
//! ├── bone nodes (Bedrock transforms, rest pose)
//! └── "Meshes" node: Mesh + Skin
//! ```
//! Vertex bytes live in one buffer per geometry; the index buffer is shared.

use std::sync::Arc;

use glam::{Mat4, Vec3, Vec4};

use super::{
    Accessor, AccessorKind, Attributes, Buffer, BufferView, ComponentType, DecomposedTransform,
    Material, Mesh, MeshId, Model, Node, NodeComponent, NodeId, NodeTransform, Primitive,
    PrimitiveMode, Scene, Skin, Texture,
};
use crate::error::{ModelLoadError, Result};
use crate::geometry::{
    CompiledGeometries, CompiledGeometry, INDICES_PER_CUBE, VERTEX_STRIDE, VERTICES_PER_CUBE,
    Vertex,
};

pub const DEFAULT_WIDTH_SCALE: f32 = 0.7;

pub struct SceneAssembler {
    width_scale: f32,
    height_scale: f32,
    texture: Option<Arc<Texture>>,
}

impl Default for SceneAssembler {
    fn default() -> Self {
        Self::new(DEFAULT_WIDTH_SCALE, DEFAULT_WIDTH_SCALE)
    }
}

impl SceneAssembler {
    pub fn new(width_scale: f32, height_scale: f32) -> Self {
        Self {
            width_scale,
            height_scale,
            texture: None,
        }
    }

    pub fn with_texture(mut self, texture: impl Into<Arc<Texture>>) -> Self {
        self.texture = Some(texture.into());
        self
    }

    fn material(&self) -> Material {
        match &self.texture {
            Some(texture) => Material::Vanilla {
                name: texture.name.clone(),
                base_color: Vec4::ONE,
                base_color_texture: Arc::clone(texture),
            },
            None => Material::default(),
        }
    }

    pub fn assemble(&self, compiled: &CompiledGeometries) -> Result<Model> {
        let index_buffer = Arc::new(Buffer::new(
            "Index buffer",
            bytemuck::cast_slice::<u16, u8>(&compiled.indices).to_vec(),
        ));

        let mut model = Model::default();
        for geometry in &compiled.geometries {
            let scene = self.assemble_geometry(&mut model, geometry, &index_buffer)?;
            model.scenes.push(scene);
        }
        if !model.scenes.is_empty() {
            model.default_scene = Some(0);
        }

        tracing::debug!(
            "Assembled {} scenes, {} nodes, {} skins",
            model.scenes.len(),
            model.nodes.len(),
            model.skins.len()
        );
        Ok(model)
    }

    fn assemble_geometry(
        &self,
        model: &mut Model,
        geometry: &CompiledGeometry,
        index_buffer: &Arc<Buffer>,
    ) -> Result<Scene> {
        let base = model.nodes.len();
        let hierarchy = &geometry.hierarchy;

        for (index, bone) in hierarchy.nodes().iter().enumerate() {
            model.nodes.push(Node {
                id: NodeId(base + index),
                name: bone.name.clone(),
                transform: Some(NodeTransform::Bedrock(bone.transform)),
                children: bone.children.iter().map(|child| NodeId(base + child)).collect(),
                components: Vec::new(),
            });
        }
        let mut roots: Vec<NodeId> = hierarchy.roots().iter().map(|root| NodeId(base + root)).collect();

        // Geometry without cubes still gets the node and skin; only the primitive is skipped
        let mesh_id = MeshId(next_mesh_id(model));
        let primitives = if geometry.cube_count > 0 {
            vec![self.primitive(geometry, index_buffer)]
        } else {
            Vec::new()
        };
        let mut components = vec![NodeComponent::Mesh(Mesh {
            id: mesh_id,
            primitives,
        })];
        if !hierarchy.is_empty() {
            let skin = build_skin(geometry, base)?;
            model.skins.push(skin);
            components.push(NodeComponent::Skin {
                skin: model.skins.len() - 1,
                meshes: vec![mesh_id],
            });
        }
        let id = NodeId(model.nodes.len());
        model.nodes.push(Node {
            id,
            name: "Meshes".to_string(),
            transform: None,
            children: Vec::new(),
            components,
        });
        roots.push(id);

        Ok(Scene {
            name: geometry.identifier.clone(),
            nodes: roots,
            transform: Some(NodeTransform::Decomposed(DecomposedTransform {
                scale: Vec3::new(self.width_scale, self.height_scale, self.width_scale),
                ..DecomposedTransform::default()
            })),
        })
    }

    fn primitive(&self, geometry: &CompiledGeometry, index_buffer: &Arc<Buffer>) -> Primitive {
        let vertex_buffer = Arc::new(Buffer::new(
            format!("{} vertices", geometry.identifier),
            bytemuck::cast_slice::<Vertex, u8>(&geometry.vertices).to_vec(),
        ));
        let vertices = BufferView::whole(vertex_buffer, VERTEX_STRIDE);
        let vertex_count = geometry.cube_count * VERTICES_PER_CUBE;
        let attribute = |byte_offset, component_type, kind| Accessor {
            buffer_view: vertices.clone(),
            byte_offset,
            component_type,
            count: vertex_count,
            kind,
        };

        let index_count = geometry.cube_count * INDICES_PER_CUBE;
        let indices = Accessor {
            buffer_view: BufferView {
                buffer: Arc::clone(index_buffer),
                byte_offset: 0,
                byte_length: index_count * std::mem::size_of::<u16>(),
                byte_stride: 0,
            },
            byte_offset: 0,
            component_type: ComponentType::UnsignedShort,
            count: index_count,
            kind: AccessorKind::Scalar,
        };

        Primitive {
            mode: PrimitiveMode::Triangles,
            material: self.material(),
            attributes: Attributes {
                position: attribute(Vertex::POSITION_OFFSET, ComponentType::Float, AccessorKind::Vec3),
                normal: Some(attribute(Vertex::NORMAL_OFFSET, ComponentType::Float, AccessorKind::Vec3)),
                texcoords: vec![attribute(Vertex::UV_OFFSET, ComponentType::Float, AccessorKind::Vec2)],
                joints: vec![attribute(
                    Vertex::JOINT_OFFSET,
                    ComponentType::UnsignedShort,
                    AccessorKind::Vec4,
                )],
                weights: vec![attribute(Vertex::WEIGHT_OFFSET, ComponentType::Float, AccessorKind::Vec4)],
            },
            indices: Some(indices),
        }
    }
}

fn next_mesh_id(model: &Model) -> usize {
    model
        .nodes
        .iter()
        .filter(|node| node.mesh().is_some())
        .count()
}

/// Joints and inverse bind matrices ordered by bone index
fn build_skin(geometry: &CompiledGeometry, base: usize) -> Result<Skin> {
    let hierarchy = &geometry.hierarchy;
    let mut slots: Vec<Option<(NodeId, Mat4)>> = vec![None; hierarchy.len()];

    let mut stack: Vec<usize> = hierarchy.roots().to_vec();
    while let Some(index) = stack.pop() {
        let node = hierarchy.node(index);
        slots[index] = Some((NodeId(base + index), node.transitive_matrix.inverse()));
        stack.extend(node.children.iter().copied());
    }

    let mut joints = Vec::with_capacity(slots.len());
    let mut inverse_bind_matrices = Vec::with_capacity(slots.len());
    for (index, slot) in slots.into_iter().enumerate() {
        let (joint, inverse_bind) = slot.ok_or(ModelLoadError::JointIndexMissing(index))?;
        joints.push(joint);
        inverse_bind_matrices.push(inverse_bind);
    }

    Ok(Skin {
        name: geometry.identifier.clone(),
        joints,
        inverse_bind_matrices,
    })
}
