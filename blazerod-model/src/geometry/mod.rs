//! Bedrock geometry compiler
//!
//! Compilation runs in three passes over a parsed `minecraft:geometry`
//! document:
//! 1. [`preprocess`] reads every geometry header and bone, counts cubes and
//!    keeps the raw cube tokens per bone
//! 2. [`BoneHierarchy::build`] resolves parents and computes bone matrices
//! 3. [`MeshBuilder`] turns every cube into 24 vertices baked into model space
//!
//! Coordinates are converted on ingestion: Bedrock is left handed, so pivot
//! and origin X and rotation X/Y are negated.

mod bone;
mod cube;
mod mesh;


use glam::Vec3;
use hashbrown::HashMap;
use serde_json::Value;

use crate::error::{ModelLoadError, Result};
use crate::json;

pub use bone::{BoneHierarchy, BoneNode};
pub use cube::{Cube, Face, FaceUv};
pub use mesh::{
    INDICES_PER_CUBE, MAX_CUBES_PER_GEOMETRY, MeshBuilder, VERTEX_STRIDE, VERTICES_PER_CUBE, Vertex,
    build_index_buffer,
};

pub const DEFAULT_TEXTURE_SIZE: u32 = 64;

/// One bone as declared in the geometry file, in converted coordinates
#[derive(Debug, Clone, PartialEq)]
pub struct BoneSpec {
    pub name: String,
    pub parent: Option<String>,
    /// Pivot in pixels
    pub pivot: Vec3,
    /// Euler angles in degrees
    pub rotation: Vec3,
    pub inflate: f32,
    pub mirror: bool,
}

/// Header and bones of one geometry, with cube tokens left unparsed
#[derive(Debug)]
pub(crate) struct GeometryContext<'a> {
    pub identifier: String,
    pub texture_width: u32,
    pub texture_height: u32,
    pub cube_count: usize,
    pub bones: Vec<BoneSpec>,
    /// Raw cube tokens, parallel to `bones`
    pub bone_cubes: Vec<&'a [Value]>,
}

#[derive(Debug)]
pub(crate) struct ParseContext<'a> {
    pub format_version: String,
    pub geometries: Vec<GeometryContext<'a>>,
}

/// First pass over a geometry document
pub(crate) fn preprocess(document: &Value) -> Result<ParseContext<'_>> {
    let root = json::object(document, "geometry document")?;
    let format_version = root
        .get("format_version")
        .ok_or(ModelLoadError::MissingField("format version"))
        .and_then(|v| json::string(v, "format_version"))?
        .to_string();
    let geometries = root
        .get("minecraft:geometry")
        .ok_or(ModelLoadError::MissingField("minecraft:geometry"))
        .and_then(|v| json::array(v, "minecraft:geometry"))?
        .iter()
        .map(preprocess_geometry)
        .collect::<Result<Vec<_>>>()?;
    Ok(ParseContext {
        format_version,
        geometries,
    })
}

fn preprocess_geometry(value: &Value) -> Result<GeometryContext<'_>> {
    let geometry = json::object(value, "geometry")?;

    let mut identifier = None;
    let mut texture_width = DEFAULT_TEXTURE_SIZE;
    let mut texture_height = DEFAULT_TEXTURE_SIZE;
    if let Some(description) = geometry.get("description") {
        for (key, value) in json::object(description, "description")? {
            match key.as_str() {
                "identifier" => identifier = Some(json::string(value, "identifier")?.to_string()),
                "texture_width" => texture_width = texture_dimension(value, "texture_width")?,
                "texture_height" => texture_height = texture_dimension(value, "texture_height")?,
                _ => {}
            }
        }
    }
    let identifier = identifier.ok_or(ModelLoadError::MissingField("identifier"))?;

    let mut bones = Vec::new();
    let mut bone_cubes = Vec::new();
    let mut names = HashMap::new();
    let mut cube_count = 0;
    if let Some(list) = geometry.get("bones") {
        for value in json::array(list, "bones")? {
            let (bone, cubes) = preprocess_bone(value)?;
            if names.insert(bone.name.clone(), bones.len()).is_some() {
                return Err(ModelLoadError::DuplicateBone(bone.name));
            }
            cube_count += cubes.len();
            bones.push(bone);
            bone_cubes.push(cubes);
        }
    }

    tracing::debug!(
        "Preprocessed geometry '{}': {} bones, {} cubes, texture {}x{}",
        identifier,
        bones.len(),
        cube_count,
        texture_width,
        texture_height
    );

    Ok(GeometryContext {
        identifier,
        texture_width,
        texture_height,
        cube_count,
        bones,
        bone_cubes,
    })
}

fn texture_dimension(value: &Value, field: &'static str) -> Result<u32> {
    // At least one pixel
    Ok(json::int(value, field)?.clamp(1, u32::MAX as i64) as u32)
}

fn preprocess_bone(value: &Value) -> Result<(BoneSpec, &[Value])> {
    let object = json::object(value, "bone")?;

    let mut name = None;
    let mut bone = BoneSpec {
        name: String::new(),
        parent: None,
        pivot: Vec3::ZERO,
        rotation: Vec3::ZERO,
        inflate: 0.0,
        mirror: false,
    };
    let mut cubes: &[Value] = &[];
    for (key, value) in object {
        match key.as_str() {
            "name" => name = Some(json::string(value, "bone name")?.to_string()),
            "parent" => bone.parent = Some(json::string(value, "parent")?.to_string()),
            "pivot" => {
                let pivot = json::vec3(value, "pivot")?;
                bone.pivot = Vec3::new(-pivot.x, pivot.y, pivot.z);
            }
            "rotation" => {
                let rotation = json::vec3(value, "rotation")?;
                bone.rotation = Vec3::new(-rotation.x, -rotation.y, rotation.z);
            }
            "inflate" => bone.inflate = json::float(value, "inflate")?,
            "mirror" => bone.mirror = json::boolean(value, "mirror")?,
            "cubes" => cubes = json::array(value, "cubes")?,
            _ => {}
        }
    }
    bone.name = name.ok_or(ModelLoadError::MissingField("bone name"))?;
    Ok((bone, cubes))
}

/// A fully compiled geometry
#[derive(Debug, Clone)]
pub struct CompiledGeometry {
    pub identifier: String,
    pub texture_width: u32,
    pub texture_height: u32,
    pub cube_count: usize,
    pub bones: Vec<BoneSpec>,
    pub hierarchy: BoneHierarchy,
    pub vertices: Vec<Vertex>,
}

/// Every geometry of a document plus the index buffer they share
#[derive(Debug, Clone)]
pub struct CompiledGeometries {
    pub format_version: String,
    pub geometries: Vec<CompiledGeometry>,
    /// Sized for the geometry with the most cubes
    pub indices: Vec<u16>,
}

/// Compile a parsed geometry document
pub fn compile(document: &Value) -> Result<CompiledGeometries> {
    let context = preprocess(document)?;

    for geometry in &context.geometries {
        if geometry.cube_count > MAX_CUBES_PER_GEOMETRY {
            return Err(ModelLoadError::TooManyCubes {
                identifier: geometry.identifier.clone(),
                cubes: geometry.cube_count,
            });
        }
    }

    // Structure for every geometry before any mesh work
    let hierarchies = context
        .geometries
        .iter()
        .map(|geometry| BoneHierarchy::build(&geometry.bones))
        .collect::<Result<Vec<_>>>()?;

    let mut geometries = Vec::with_capacity(context.geometries.len());
    for (geometry, hierarchy) in context.geometries.into_iter().zip(hierarchies) {
        let texture_size = glam::Vec2::new(
            geometry.texture_width as f32,
            geometry.texture_height as f32,
        );
        let mut builder = MeshBuilder::new(geometry.cube_count, texture_size);
        for (bone_index, cubes) in geometry.bone_cubes.iter().enumerate() {
            let bone = &geometry.bones[bone_index];
            let node = hierarchy.node(bone_index);
            for value in cubes.iter() {
                let cube = Cube::parse(value, bone)?;
                builder.push_cube(&cube, node.transitive_matrix, bone_index as u16);
            }
        }

        tracing::debug!(
            "Compiled geometry '{}': {} vertices",
            geometry.identifier,
            geometry.cube_count * VERTICES_PER_CUBE
        );
        geometries.push(CompiledGeometry {
            identifier: geometry.identifier,
            texture_width: geometry.texture_width,
            texture_height: geometry.texture_height,
            cube_count: geometry.cube_count,
            bones: geometry.bones,
            hierarchy,
            vertices: builder.finish(),
        });
    }

    let max_cubes = geometries.iter().map(|g| g.cube_count).max().unwrap_or(0);
    Ok(CompiledGeometries {
        format_version: context.format_version,
        geometries,
        indices: build_index_buffer(max_cubes),
    })
}
