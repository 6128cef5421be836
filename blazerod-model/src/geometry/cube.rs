//! Cube parsing and UV layout

use glam::{Vec2, Vec3};
use serde_json::Value;

use super::BoneSpec;
use crate::error::{ModelLoadError, Result};
use crate::json::{self, JsonKind};

/// Cube faces, in vertex emission order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Face {
    North,
    South,
    West,
    East,
    Up,
    Down,
}

impl Face {
    pub const ALL: [Face; 6] = [
        Face::North,
        Face::South,
        Face::West,
        Face::East,
        Face::Up,
        Face::Down,
    ];

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "north" => Some(Face::North),
            "south" => Some(Face::South),
            "west" => Some(Face::West),
            "east" => Some(Face::East),
            "up" => Some(Face::Up),
            "down" => Some(Face::Down),
            _ => None,
        }
    }

    pub fn index(self) -> usize {
        self as usize
    }

    /// Box corners of this face; corner bit 0 is +X, bit 1 is +Y, bit 2 is +Z
    pub(crate) fn corners(self) -> [usize; 4] {
        match self {
            Face::North => [0, 2, 3, 1],
            Face::South => [4, 5, 7, 6],
            Face::West => [0, 4, 6, 2],
            Face::East => [1, 3, 7, 5],
            Face::Up => [2, 6, 7, 3],
            Face::Down => [0, 1, 5, 4],
        }
    }

    /// Which rotated UV corner each face corner takes
    pub(crate) fn uv_corners(self) -> [usize; 4] {
        match self {
            Face::North => [0, 2, 3, 1],
            Face::South => [1, 0, 2, 3],
            Face::West => [1, 0, 2, 3],
            Face::East => [0, 2, 3, 1],
            Face::Up => [3, 1, 0, 2],
            Face::Down => [0, 1, 3, 2],
        }
    }

    pub fn normal(self) -> Vec3 {
        match self {
            Face::North => Vec3::NEG_Z,
            Face::South => Vec3::Z,
            Face::West => Vec3::NEG_X,
            Face::East => Vec3::X,
            Face::Up => Vec3::Y,
            Face::Down => Vec3::NEG_Y,
        }
    }
}

/// UV rectangle of one face, in pixels
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FaceUv {
    pub uv: Vec2,
    pub size: Vec2,
    /// Degrees, multiples of 90
    pub rotation: i32,
}

impl FaceUv {
    pub fn new(uv: Vec2, size: Vec2) -> Self {
        Self {
            uv,
            size,
            rotation: 0,
        }
    }

    /// Normalized UV corners after rotation
    pub fn corners(&self, texture_size: Vec2) -> [Vec2; 4] {
        let base = self.uv / texture_size;
        let size = self.size / texture_size;
        let canonical = [
            base + size,
            Vec2::new(base.x, base.y + size.y),
            Vec2::new(base.x + size.x, base.y),
            base,
        ];
        let steps = (self.rotation / 90).rem_euclid(4) as usize;
        std::array::from_fn(|k| canonical[(k + steps) % 4])
    }
}

/// A cube in converted coordinates, pixels
#[derive(Debug, Clone, PartialEq)]
pub struct Cube {
    /// Minimum corner
    pub origin: Vec3,
    pub size: Vec3,
    pub pivot: Vec3,
    /// Euler degrees
    pub rotation: Vec3,
    pub inflate: f32,
    pub mirror: bool,
    /// Indexed by [`Face::index`]
    pub faces: [FaceUv; 6],
}

impl Cube {
    /// Parse a cube token; `inflate` and `mirror` default to the bone's
    pub(crate) fn parse(value: &Value, bone: &BoneSpec) -> Result<Self> {
        let object = json::object(value, "cube")?;

        let mut origin = Vec3::ZERO;
        let mut size = Vec3::ZERO;
        let mut pivot = Vec3::ZERO;
        let mut rotation = Vec3::ZERO;
        let mut inflate = bone.inflate;
        let mut mirror = bone.mirror;
        let mut uv = None;
        for (key, value) in object {
            match key.as_str() {
                "origin" => {
                    let v = json::vec3(value, "origin")?;
                    origin = Vec3::new(-v.x, v.y, v.z);
                }
                "size" => size = json::vec3(value, "size")?,
                "pivot" => {
                    let v = json::vec3(value, "pivot")?;
                    pivot = Vec3::new(-v.x, v.y, v.z);
                }
                "rotation" => {
                    let v = json::vec3(value, "rotation")?;
                    rotation = Vec3::new(-v.x, -v.y, v.z);
                }
                "inflate" => inflate = json::float(value, "inflate")?,
                "mirror" => mirror = json::boolean(value, "mirror")?,
                "uv" => uv = Some(value),
                _ => {}
            }
        }
        // Negated X makes the declared origin the maximum corner
        origin.x -= size.x;

        let faces = match uv {
            None => [FaceUv::default(); 6],
            Some(value @ Value::Array(_)) => box_uv(json::vec2(value, "uv")?, size, mirror),
            Some(Value::Object(faces)) => per_face_uv(faces)?,
            Some(other) => return Err(ModelLoadError::InvalidUv(JsonKind::of(other))),
        };

        Ok(Self {
            origin,
            size,
            pivot,
            rotation,
            inflate,
            mirror,
            faces,
        })
    }

    pub fn face(&self, face: Face) -> &FaceUv {
        &self.faces[face.index()]
    }
}

/// Standard Minecraft box unwrap starting at `uv`
pub fn box_uv(uv: Vec2, size: Vec3, mirror: bool) -> [FaceUv; 6] {
    let (u, v) = (uv.x, uv.y);
    let (dx, dy, dz) = (size.x.floor(), size.y.floor(), size.z.floor());

    let north = FaceUv::new(Vec2::new(u + dz, v + dz), Vec2::new(dx, dy));
    let south = FaceUv::new(Vec2::new(u + 2.0 * dz + dx, v + dz), Vec2::new(dx, dy));
    let (west, east) = if mirror {
        (
            FaceUv::new(Vec2::new(u, v + dz), Vec2::new(-dz, dy)),
            FaceUv::new(Vec2::new(u + dz + dx, v + dz), Vec2::new(-dz, dy)),
        )
    } else {
        (
            FaceUv::new(Vec2::new(u + dz + dx, v + dz), Vec2::new(dz, dy)),
            FaceUv::new(Vec2::new(u, v + dz), Vec2::new(dz, dy)),
        )
    };
    let up = FaceUv::new(Vec2::new(u + dz, v), Vec2::new(dx, dz));
    let down = FaceUv::new(Vec2::new(u + dz + dx, v), Vec2::new(dx, dz));

    [north, south, west, east, up, down]
}

fn per_face_uv(faces: &serde_json::Map<String, Value>) -> Result<[FaceUv; 6]> {
    let mut out = [FaceUv::default(); 6];
    for (name, value) in faces {
        let face = Face::from_name(name).ok_or_else(|| ModelLoadError::InvalidUvFace(name.clone()))?;
        let slot = &mut out[face.index()];
        for (key, value) in json::object(value, "face uv")? {
            match key.as_str() {
                "uv" => slot.uv = json::vec2(value, "uv")?,
                "uv_size" => slot.size = json::vec2(value, "uv_size")?,
                "uv_rotation" => slot.rotation = json::int(value, "uv_rotation")? as i32,
                _ => {}
            }
        }
    }
    Ok(out)
}
