//! Cube-to-mesh compilation
//!
//! Every cube becomes 24 vertices (4 per face, 6 faces) already transformed
//! into model space by its bone's rest matrix. Triangles are described by a
//! single index buffer shared by every geometry of the model.
//!
//! # Vertex layout (56 bytes)
//! ```text
//! offset  0: position  [f32; 3]
//! offset 12: normal    [f32; 3]
//! offset 24: uv        [f32; 2]
//! offset 32: joint     [u16; 4]
//! offset 40: weight    [f32; 4]
//! ```

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Quat, Vec2, Vec3};

use super::bone::rest_rotation;
use super::cube::{Cube, Face};

pub const VERTICES_PER_CUBE: usize = 24;
pub const INDICES_PER_CUBE: usize = 36;

/// Most cubes a geometry may hold while every vertex stays addressable by `u16`
pub const MAX_CUBES_PER_GEOMETRY: usize = (u16::MAX as usize + 1) / VERTICES_PER_CUBE;

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub uv: [f32; 2],
    pub joint: [u16; 4],
    pub weight: [f32; 4],
}

pub const VERTEX_STRIDE: usize = std::mem::size_of::<Vertex>();

impl Vertex {
    pub const POSITION_OFFSET: usize = 0;
    pub const NORMAL_OFFSET: usize = 12;
    pub const UV_OFFSET: usize = 24;
    pub const JOINT_OFFSET: usize = 32;
    pub const WEIGHT_OFFSET: usize = 40;

    pub fn position(&self) -> Vec3 {
        Vec3::from_array(self.position)
    }

    pub fn normal(&self) -> Vec3 {
        Vec3::from_array(self.normal)
    }

    pub fn uv(&self) -> Vec2 {
        Vec2::from_array(self.uv)
    }
}

/// Two triangles per face quad
const QUAD_INDICES: [u16; 6] = [0, 1, 2, 0, 2, 3];

/// Index pattern of one cube, relative to its first vertex
pub const CUBE_INDICES: [u16; INDICES_PER_CUBE] = {
    let mut out = [0u16; INDICES_PER_CUBE];
    let mut face = 0;
    while face < 6 {
        let mut i = 0;
        while i < 6 {
            out[face * 6 + i] = (face * 4) as u16 + QUAD_INDICES[i];
            i += 1;
        }
        face += 1;
    }
    out
};

/// Index buffer covering `cubes` consecutive cubes
pub fn build_index_buffer(cubes: usize) -> Vec<u16> {
    let cubes = cubes.min(MAX_CUBES_PER_GEOMETRY);
    let mut indices = Vec::with_capacity(cubes * INDICES_PER_CUBE);
    for cube in 0..cubes {
        let base = (cube * VERTICES_PER_CUBE) as u16;
        indices.extend(CUBE_INDICES.iter().map(|index| base + index));
    }
    indices
}

/// Accumulates cube vertices for one geometry
pub struct MeshBuilder {
    vertices: Vec<Vertex>,
    texture_size: Vec2,
}

impl MeshBuilder {
    pub fn new(cube_count: usize, texture_size: Vec2) -> Self {
        Self {
            vertices: Vec::with_capacity(cube_count * VERTICES_PER_CUBE),
            texture_size,
        }
    }

    /// Emit the 24 vertices of `cube`, bound rigidly to `joint`
    pub fn push_cube(&mut self, cube: &Cube, bone_matrix: Mat4, joint: u16) {
        let matrix = bone_matrix * cube_matrix(cube);

        let min = -Vec3::splat(cube.inflate);
        let max = cube.size + Vec3::splat(cube.inflate);
        let corners: [Vec3; 8] = std::array::from_fn(|i| {
            let pick = |bit: usize, axis_min: f32, axis_max: f32| {
                if i & bit == 0 { axis_min } else { axis_max }
            };
            let local = Vec3::new(
                pick(1, min.x, max.x),
                pick(2, min.y, max.y),
                pick(4, min.z, max.z),
            );
            matrix.transform_point3(local / 16.0)
        });

        for face in Face::ALL {
            let uv = cube.face(face).corners(self.texture_size);
            let uv_corners = face.uv_corners();
            let normal = matrix
                .transform_vector3(face.normal())
                .normalize_or_zero();
            for (slot, corner) in face.corners().into_iter().enumerate() {
                self.vertices.push(Vertex {
                    position: corners[corner].to_array(),
                    normal: normal.to_array(),
                    uv: uv[uv_corners[slot]].to_array(),
                    joint: [joint, 0, 0, 0],
                    weight: [1.0, 0.0, 0.0, 0.0],
                });
            }
        }
    }

    pub fn len(&self) -> usize {
        self.vertices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }

    pub fn finish(self) -> Vec<Vertex> {
        self.vertices
    }
}

/// Cube-local to bone space: rotate around the cube pivot, then place the
/// minimum corner at `origin`
fn cube_matrix(cube: &Cube) -> Mat4 {
    let pivot = cube.pivot / 16.0;
    let rotation = if cube.rotation == Vec3::ZERO {
        Quat::IDENTITY
    } else {
        rest_rotation(cube.rotation)
    };
    Mat4::from_translation(pivot)
        * Mat4::from_quat(rotation)
        * Mat4::from_translation(-pivot)
        * Mat4::from_translation(cube.origin / 16.0)
}
