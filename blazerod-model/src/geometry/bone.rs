//! Bone hierarchy resolution
//!
//! Bones may be declared in any order. Each bone is resolved on demand: its
//! parent first, then its own local and transitive matrices, exactly once.

use glam::{EulerRot, Mat4, Quat};
use hashbrown::HashMap;

use super::BoneSpec;
use crate::error::{ModelLoadError, Result};
use crate::scene::BedrockTransform;

/// A resolved bone, stored at the same index as its [`BoneSpec`]
#[derive(Debug, Clone, PartialEq)]
pub struct BoneNode {
    pub name: String,
    pub transform: BedrockTransform,
    pub local_matrix: Mat4,
    /// Parent transitive matrix times the local matrix
    pub transitive_matrix: Mat4,
    pub parent: Option<usize>,
    pub children: Vec<usize>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BoneHierarchy {
    nodes: Vec<BoneNode>,
    roots: Vec<usize>,
    by_name: HashMap<String, usize>,
    matrix_evaluations: usize,
}

/// Rest rotation of a bone from Euler degrees (already converted)
pub(crate) fn rest_rotation(degrees: glam::Vec3) -> Quat {
    Quat::from_euler(
        EulerRot::ZYX,
        degrees.z.to_radians(),
        degrees.y.to_radians(),
        degrees.x.to_radians(),
    )
}

impl BoneHierarchy {
    pub fn build(bones: &[BoneSpec]) -> Result<Self> {
        let by_name: HashMap<String, usize> = bones
            .iter()
            .enumerate()
            .map(|(index, bone)| (bone.name.clone(), index))
            .collect();

        let mut resolver = Resolver {
            bones,
            by_name: &by_name,
            nodes: bones
                .iter()
                .map(|bone| BoneNode {
                    name: bone.name.clone(),
                    transform: BedrockTransform::default(),
                    local_matrix: Mat4::IDENTITY,
                    transitive_matrix: Mat4::IDENTITY,
                    parent: None,
                    children: Vec::new(),
                })
                .collect(),
            resolved: vec![false; bones.len()],
            visiting: vec![false; bones.len()],
            roots: Vec::new(),
            evaluations: 0,
        };
        for index in 0..bones.len() {
            resolver.resolve(index)?;
        }

        let Resolver {
            nodes,
            roots,
            evaluations,
            ..
        } = resolver;
        Ok(Self {
            nodes,
            roots,
            by_name,
            matrix_evaluations: evaluations,
        })
    }

    /// Node at bone index `index`
    ///
    /// # Panics
    /// If `index` is out of range.
    pub fn node(&self, index: usize) -> &BoneNode {
        &self.nodes[index]
    }

    pub fn get(&self, index: usize) -> Option<&BoneNode> {
        self.nodes.get(index)
    }

    pub fn nodes(&self) -> &[BoneNode] {
        &self.nodes
    }

    /// Bones without a parent, in resolution order
    pub fn roots(&self) -> &[usize] {
        &self.roots
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.by_name.get(name).copied()
    }

    pub fn find(&self, name: &str) -> Option<&BoneNode> {
        self.index_of(name).map(|index| &self.nodes[index])
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// How many bone matrices were computed while building
    pub fn matrix_evaluations(&self) -> usize {
        self.matrix_evaluations
    }
}

struct Resolver<'a> {
    bones: &'a [BoneSpec],
    by_name: &'a HashMap<String, usize>,
    nodes: Vec<BoneNode>,
    resolved: Vec<bool>,
    visiting: Vec<bool>,
    roots: Vec<usize>,
    evaluations: usize,
}

impl Resolver<'_> {
    fn resolve(&mut self, index: usize) -> Result<usize> {
        if self.resolved[index] {
            return Ok(index);
        }
        let bones = self.bones;
        let bone = &bones[index];
        if self.visiting[index] {
            return Err(ModelLoadError::BoneCycle(bone.name.clone()));
        }
        self.visiting[index] = true;

        let parent = match &bone.parent {
            Some(parent) => {
                let parent_index = self.by_name.get(parent).copied().ok_or_else(|| {
                    ModelLoadError::BoneParentNotFound {
                        bone: bone.name.clone(),
                        parent: parent.clone(),
                    }
                })?;
                Some(self.resolve(parent_index)?)
            }
            None => None,
        };

        let transform = BedrockTransform::new(bone.pivot / 16.0, rest_rotation(bone.rotation));
        let local_matrix = transform.matrix();
        let transitive_matrix = match parent {
            Some(parent) => self.nodes[parent].transitive_matrix * local_matrix,
            None => local_matrix,
        };
        self.evaluations += 1;

        let node = &mut self.nodes[index];
        node.transform = transform;
        node.local_matrix = local_matrix;
        node.transitive_matrix = transitive_matrix;
        node.parent = parent;
        match parent {
            Some(parent) => self.nodes[parent].children.push(index),
            None => self.roots.push(index),
        }

        self.visiting[index] = false;
        self.resolved[index] = true;
        Ok(index)
    }
}
