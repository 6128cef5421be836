//! Animated skeleton evaluation
//!
//! A [`Skeleton`] is the rest pose of one skin; a [`Pose`] holds the animated
//! rotation, translation and scale of every joint. Joint matrices map
//! model-space rest vertices to their animated position:
//! `joint_matrix = world(pose) · inverse_bind`.

use std::sync::Arc;

use glam::{Mat4, Quat, Vec3};
use hashbrown::HashMap;

use crate::scene::{BedrockTransform, Model, NodeId, NodeTransform, Scene};

#[derive(Debug, Clone, PartialEq)]
pub struct Joint {
    pub name: String,
    pub node: NodeId,
    pub parent: Option<usize>,
    pub rest: BedrockTransform,
    pub inverse_bind: Mat4,
}

#[derive(Debug, Clone)]
pub struct Skeleton {
    joints: Vec<Joint>,
    /// Parents before children
    order: Vec<usize>,
    names: Arc<HashMap<String, usize>>,
}

impl Skeleton {
    /// Skeleton of the model's default scene
    pub fn from_model(model: &Model) -> Option<Self> {
        Self::from_scene(model, model.default_scene()?)
    }

    /// Skeleton of the first skinned mesh in `scene`
    pub fn from_scene(model: &Model, scene: &Scene) -> Option<Self> {
        let skin = model
            .walk_scene(scene)
            .into_iter()
            .filter_map(|id| model.node(id)?.skin())
            .next()?;
        Self::from_skin(model, skin)
    }

    pub fn from_skin(model: &Model, skin: usize) -> Option<Self> {
        let skin = model.skins.get(skin)?;
        let by_node: HashMap<NodeId, usize> = skin
            .joints
            .iter()
            .enumerate()
            .map(|(index, node)| (*node, index))
            .collect();

        let mut joints = Vec::with_capacity(skin.joints.len());
        for (index, node_id) in skin.joints.iter().enumerate() {
            let node = model.node(*node_id)?;
            let rest = match node.transform {
                Some(NodeTransform::Bedrock(transform)) => transform,
                _ => BedrockTransform::default(),
            };
            joints.push(Joint {
                name: node.name.clone(),
                node: *node_id,
                parent: None,
                rest,
                inverse_bind: skin.inverse_bind_matrices[index],
            });
        }
        for (index, node_id) in skin.joints.iter().enumerate() {
            if let Some(node) = model.node(*node_id) {
                for child in &node.children {
                    if let Some(&child) = by_node.get(child) {
                        joints[child].parent = Some(index);
                    }
                }
            }
        }

        let names = joints
            .iter()
            .enumerate()
            .map(|(index, joint)| (joint.name.clone(), index))
            .collect();
        let order = parent_first_order(&joints);
        Some(Self {
            joints,
            order,
            names: Arc::new(names),
        })
    }

    pub fn joints(&self) -> &[Joint] {
        &self.joints
    }

    pub fn len(&self) -> usize {
        self.joints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.joints.is_empty()
    }

    pub fn joint_index(&self, name: &str) -> Option<usize> {
        self.names.get(name).copied()
    }

    pub fn rest_pose(&self) -> Pose {
        Pose {
            joints: vec![JointPose::REST; self.joints.len()],
            names: Arc::clone(&self.names),
        }
    }

    /// World matrix of every joint under `pose`
    pub fn world_matrices(&self, pose: &Pose) -> Vec<Mat4> {
        let mut world = vec![Mat4::IDENTITY; self.joints.len()];
        for &index in &self.order {
            let joint = &self.joints[index];
            let animated = pose.joints.get(index).copied().unwrap_or(JointPose::REST);
            let local = BedrockTransform {
                pivot: joint.rest.pivot,
                rotation: joint.rest.rotation * animated.rotation,
                translation: animated.translation,
                scale: animated.scale,
            }
            .matrix();
            world[index] = match joint.parent {
                Some(parent) => world[parent] * local,
                None => local,
            };
        }
        world
    }

    /// `world · inverse_bind` per joint, in joint order
    pub fn joint_matrices(&self, pose: &Pose) -> Vec<Mat4> {
        self.world_matrices(pose)
            .into_iter()
            .zip(&self.joints)
            .map(|(world, joint)| world * joint.inverse_bind)
            .collect()
    }
}

fn parent_first_order(joints: &[Joint]) -> Vec<usize> {
    let mut children = vec![Vec::new(); joints.len()];
    let mut order = Vec::with_capacity(joints.len());
    for (index, joint) in joints.iter().enumerate() {
        match joint.parent {
            Some(parent) => children[parent].push(index),
            None => order.push(index),
        }
    }
    let mut cursor = 0;
    while cursor < order.len() {
        order.extend(children[order[cursor]].iter().copied());
        cursor += 1;
    }
    order
}

/// Animated part of one joint's transform
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JointPose {
    pub rotation: Quat,
    pub translation: Vec3,
    pub scale: Vec3,
}

impl JointPose {
    pub const REST: Self = Self {
        rotation: Quat::IDENTITY,
        translation: Vec3::ZERO,
        scale: Vec3::ONE,
    };
}

#[derive(Debug, Clone)]
pub struct Pose {
    joints: Vec<JointPose>,
    names: Arc<HashMap<String, usize>>,
}

impl Pose {
    pub fn joint_index(&self, name: &str) -> Option<usize> {
        self.names.get(name).copied()
    }

    pub fn joint(&self, index: usize) -> Option<&JointPose> {
        self.joints.get(index)
    }

    pub fn joints(&self) -> &[JointPose] {
        &self.joints
    }

    pub fn reset(&mut self) {
        self.joints.fill(JointPose::REST);
    }

    pub fn set(&mut self, index: usize, pose: JointPose) {
        if let Some(joint) = self.joints.get_mut(index) {
            *joint = pose;
        }
    }

    pub fn blend_rotation(&mut self, index: usize, rotation: Quat, weight: f32) {
        if let Some(joint) = self.joints.get_mut(index) {
            joint.rotation = joint.rotation.slerp(rotation, weight);
        }
    }

    pub fn blend_translation(&mut self, index: usize, translation: Vec3, weight: f32) {
        if let Some(joint) = self.joints.get_mut(index) {
            joint.translation = joint.translation.lerp(translation, weight);
        }
    }

    pub fn blend_scale(&mut self, index: usize, scale: Vec3, weight: f32) {
        if let Some(joint) = self.joints.get_mut(index) {
            joint.scale = joint.scale.lerp(scale, weight);
        }
    }
}
