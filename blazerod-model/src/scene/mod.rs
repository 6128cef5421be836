//! In-memory scene graph produced by the loader
//!
//! Nodes live in one arena on [`Model`] and refer to each other by [`NodeId`].
//! Vertex and index data are shared through reference-counted [`Buffer`]s and
//! described by typed [`Accessor`]s, the way a glTF document would.

mod assemble;

#[cfg(test)]
mod tests;

use std::sync::Arc;

use glam::{Mat4, Quat, Vec3, Vec4};

use crate::geometry::{VERTEX_STRIDE, Vertex};

pub use assemble::{DEFAULT_WIDTH_SCALE, SceneAssembler};

/// Index of a node in [`Model::nodes`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub usize);

/// Model-unique mesh identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MeshId(pub usize);

/// Translation / rotation / scale transform
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DecomposedTransform {
    pub translation: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
}

impl Default for DecomposedTransform {
    fn default() -> Self {
        Self {
            translation: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            scale: Vec3::ONE,
        }
    }
}

impl DecomposedTransform {
    pub fn matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scale, self.rotation, self.translation)
    }
}

/// Bedrock bone transform: rotation around a pivot
///
/// `matrix = scale · translate(pivot) · rotation · translate(-pivot) · translate(translation)`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BedrockTransform {
    pub pivot: Vec3,
    pub rotation: Quat,
    pub translation: Vec3,
    pub scale: Vec3,
}

impl Default for BedrockTransform {
    fn default() -> Self {
        Self {
            pivot: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            translation: Vec3::ZERO,
            scale: Vec3::ONE,
        }
    }
}

impl BedrockTransform {
    pub fn new(pivot: Vec3, rotation: Quat) -> Self {
        Self {
            pivot,
            rotation,
            ..Self::default()
        }
    }

    pub fn matrix(&self) -> Mat4 {
        Mat4::from_scale(self.scale)
            * Mat4::from_translation(self.pivot)
            * Mat4::from_quat(self.rotation)
            * Mat4::from_translation(-self.pivot)
            * Mat4::from_translation(self.translation)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NodeTransform {
    Decomposed(DecomposedTransform),
    Bedrock(BedrockTransform),
}

impl NodeTransform {
    pub fn matrix(&self) -> Mat4 {
        match self {
            NodeTransform::Decomposed(transform) => transform.matrix(),
            NodeTransform::Bedrock(transform) => transform.matrix(),
        }
    }
}

/// Raw bytes shared between buffer views
#[derive(Debug, Clone, PartialEq)]
pub struct Buffer {
    pub name: String,
    pub data: Arc<[u8]>,
}

impl Buffer {
    pub fn new(name: impl Into<String>, data: impl Into<Arc<[u8]>>) -> Self {
        Self {
            name: name.into(),
            data: data.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BufferView {
    pub buffer: Arc<Buffer>,
    pub byte_offset: usize,
    pub byte_length: usize,
    /// Zero for tightly packed data
    pub byte_stride: usize,
}

impl BufferView {
    pub fn whole(buffer: Arc<Buffer>, byte_stride: usize) -> Self {
        let byte_length = buffer.data.len();
        Self {
            buffer,
            byte_offset: 0,
            byte_length,
            byte_stride,
        }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.buffer.data[self.byte_offset..self.byte_offset + self.byte_length]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComponentType {
    UnsignedShort,
    Float,
}

impl ComponentType {
    pub fn size(self) -> usize {
        match self {
            ComponentType::UnsignedShort => 2,
            ComponentType::Float => 4,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessorKind {
    Scalar,
    Vec2,
    Vec3,
    Vec4,
}

impl AccessorKind {
    pub fn components(self) -> usize {
        match self {
            AccessorKind::Scalar => 1,
            AccessorKind::Vec2 => 2,
            AccessorKind::Vec3 => 3,
            AccessorKind::Vec4 => 4,
        }
    }
}

/// Typed view of one attribute inside a buffer view
#[derive(Debug, Clone, PartialEq)]
pub struct Accessor {
    pub buffer_view: BufferView,
    pub byte_offset: usize,
    pub component_type: ComponentType,
    pub count: usize,
    pub kind: AccessorKind,
}

impl Accessor {
    pub fn element_size(&self) -> usize {
        self.component_type.size() * self.kind.components()
    }

    fn stride(&self) -> usize {
        match self.buffer_view.byte_stride {
            0 => self.element_size(),
            stride => stride,
        }
    }

    /// Bytes of element `index`, if in range
    pub fn element(&self, index: usize) -> Option<&[u8]> {
        if index >= self.count {
            return None;
        }
        let start = self.byte_offset + index * self.stride();
        self.buffer_view.bytes().get(start..start + self.element_size())
    }

    /// Read a float element (`Vec2`..`Vec4`) widened to four components
    pub fn read_f32(&self, index: usize) -> Option<[f32; 4]> {
        if self.component_type != ComponentType::Float {
            return None;
        }
        let bytes = self.element(index)?;
        let mut out = [0.0; 4];
        for (slot, chunk) in out.iter_mut().zip(bytes.chunks_exact(4)) {
            *slot = f32::from_ne_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        }
        Some(out)
    }

    /// Read every element of an unsigned short scalar accessor
    pub fn read_u16(&self) -> Option<Vec<u16>> {
        if self.component_type != ComponentType::UnsignedShort || self.kind != AccessorKind::Scalar {
            return None;
        }
        (0..self.count)
            .map(|i| self.element(i).map(|b| u16::from_ne_bytes([b[0], b[1]])))
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Filter {
    #[default]
    Nearest,
    Linear,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Sampler {
    pub mag_filter: Filter,
    pub min_filter: Filter,
}

/// Encoded image bytes (PNG / JPEG), decoded by the host
#[derive(Debug, Clone, PartialEq)]
pub struct Texture {
    pub name: String,
    pub data: Arc<[u8]>,
    pub sampler: Sampler,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Material {
    Unlit {
        name: String,
        base_color: Vec4,
        base_color_texture: Option<Arc<Texture>>,
    },
    Vanilla {
        name: String,
        base_color: Vec4,
        base_color_texture: Arc<Texture>,
    },
}

impl Default for Material {
    fn default() -> Self {
        Material::Unlit {
            name: "default".to_string(),
            base_color: Vec4::ONE,
            base_color_texture: None,
        }
    }
}

impl Material {
    pub fn name(&self) -> &str {
        match self {
            Material::Unlit { name, .. } | Material::Vanilla { name, .. } => name,
        }
    }

    pub fn base_color(&self) -> Vec4 {
        match self {
            Material::Unlit { base_color, .. } | Material::Vanilla { base_color, .. } => *base_color,
        }
    }

    pub fn base_color_texture(&self) -> Option<&Arc<Texture>> {
        match self {
            Material::Unlit {
                base_color_texture, ..
            } => base_color_texture.as_ref(),
            Material::Vanilla {
                base_color_texture, ..
            } => Some(base_color_texture),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Attributes {
    pub position: Accessor,
    pub normal: Option<Accessor>,
    pub texcoords: Vec<Accessor>,
    pub joints: Vec<Accessor>,
    pub weights: Vec<Accessor>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrimitiveMode {
    Triangles,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Primitive {
    pub mode: PrimitiveMode,
    pub material: Material,
    pub attributes: Attributes,
    pub indices: Option<Accessor>,
}

impl Primitive {
    pub fn vertex_count(&self) -> usize {
        self.attributes.position.count
    }

    /// Copy the interleaved vertices out of the shared buffer
    ///
    /// Returns `None` when the position accessor does not use the loader's
    /// interleaved layout.
    pub fn read_vertices(&self) -> Option<Vec<Vertex>> {
        let position = &self.attributes.position;
        if position.buffer_view.byte_stride != VERTEX_STRIDE || position.byte_offset != 0 {
            return None;
        }
        let bytes = position
            .buffer_view
            .bytes()
            .get(..position.count * VERTEX_STRIDE)?;
        Some(
            bytes
                .chunks_exact(VERTEX_STRIDE)
                .map(bytemuck::pod_read_unaligned)
                .collect(),
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Mesh {
    pub id: MeshId,
    pub primitives: Vec<Primitive>,
}

/// Joint list plus parallel inverse bind matrices, indexed by bone index
#[derive(Debug, Clone, PartialEq)]
pub struct Skin {
    pub name: String,
    pub joints: Vec<NodeId>,
    pub inverse_bind_matrices: Vec<Mat4>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeComponent {
    Mesh(Mesh),
    /// Index into [`Model::skins`] plus the meshes it deforms
    Skin { skin: usize, meshes: Vec<MeshId> },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub id: NodeId,
    pub name: String,
    pub transform: Option<NodeTransform>,
    pub children: Vec<NodeId>,
    pub components: Vec<NodeComponent>,
}

impl Node {
    pub fn mesh(&self) -> Option<&Mesh> {
        self.components.iter().find_map(|c| match c {
            NodeComponent::Mesh(mesh) => Some(mesh),
            NodeComponent::Skin { .. } => None,
        })
    }

    pub fn skin(&self) -> Option<usize> {
        self.components.iter().find_map(|c| match c {
            NodeComponent::Skin { skin, .. } => Some(*skin),
            NodeComponent::Mesh(_) => None,
        })
    }
}

/// One geometry: root nodes plus the scene root transform
#[derive(Debug, Clone, PartialEq)]
pub struct Scene {
    pub name: String,
    pub nodes: Vec<NodeId>,
    pub transform: Option<NodeTransform>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Model {
    pub nodes: Vec<Node>,
    pub scenes: Vec<Scene>,
    pub skins: Vec<Skin>,
    pub default_scene: Option<usize>,
}

impl Model {
    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.0)
    }

    pub fn default_scene(&self) -> Option<&Scene> {
        self.default_scene.and_then(|index| self.scenes.get(index))
    }

    /// Depth-first walk of a scene, parents before children
    pub fn walk_scene(&self, scene: &Scene) -> Vec<NodeId> {
        let mut order = Vec::with_capacity(self.nodes.len());
        let mut stack: Vec<NodeId> = scene.nodes.iter().rev().copied().collect();
        while let Some(id) = stack.pop() {
            order.push(id);
            if let Some(node) = self.node(id) {
                stack.extend(node.children.iter().rev().copied());
            }
        }
        order
    }

    /// The node carrying the mesh of a scene
    pub fn mesh_node(&self, scene: &Scene) -> Option<&Node> {
        self.walk_scene(scene)
            .into_iter()
            .filter_map(|id| self.node(id))
            .find(|node| node.mesh().is_some())
    }
}
