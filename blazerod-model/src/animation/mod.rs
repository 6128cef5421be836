//! Bedrock animation clips
//!
//! Every bone property (`rotation`, `position`, `scale`) compiles into one
//! [`AnimationChannel`] holding one of three shapes of data:
//!
//! | Source token            | Channel data                         |
//! |-------------------------|--------------------------------------|
//! | constant number/array   | [`ChannelData::SingleFrame`]         |
//! | Molang string/array     | [`ChannelData::Molang`]              |
//! | object keyed by seconds | [`ChannelData::Keyframe`]            |
//!
//! Unit conversion happens through a [`ValueMapper`] chosen once per channel.

mod keyframe;
mod parse;
mod playback;


use glam::{EulerRot, Quat, Vec3};

use crate::molang::{MolangValue, MolangVec3, Runtime};
use crate::pose::Pose;

pub use keyframe::{KeyframeIndex, KeyframeTrack, LerpMode, catmull_rom_weights};
pub use parse::parse_animations;
pub use playback::{
    AnimationContext, AnimationPlayback, PlaybackState, Property, PropertyValue, QueryScope,
    SECONDS_PER_TICK,
};

/// Which part of a bone transform a channel drives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransformKind {
    Rotation,
    Position,
    Scale,
}

impl TransformKind {
    pub fn from_key(key: &str) -> Option<Self> {
        match key {
            "rotation" => Some(TransformKind::Rotation),
            "position" => Some(TransformKind::Position),
            "scale" => Some(TransformKind::Scale),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            TransformKind::Rotation => "rotation",
            TransformKind::Position => "position",
            TransformKind::Scale => "scale",
        }
    }

    /// Unit conversion applied to every value of this kind
    pub fn mapper(self) -> ValueMapper {
        match self {
            TransformKind::Rotation => ValueMapper::DegreesToQuaternion,
            TransformKind::Position => ValueMapper::DivideBy16,
            TransformKind::Scale => ValueMapper::Identity,
        }
    }
}

/// Sampled channel value
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ChannelValue {
    Vec3(Vec3),
    Quat(Quat),
}

impl ChannelValue {
    pub fn as_vec3(self) -> Option<Vec3> {
        match self {
            ChannelValue::Vec3(value) => Some(value),
            ChannelValue::Quat(_) => None,
        }
    }

    pub fn as_quat(self) -> Option<Quat> {
        match self {
            ChannelValue::Quat(value) => Some(value),
            ChannelValue::Vec3(_) => None,
        }
    }
}

/// Converts authored Bedrock units into model units
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueMapper {
    Identity,
    /// Pixels to blocks
    DivideBy16,
    /// Euler degrees to a quaternion in ZYX order, with X and Y negated
    DegreesToQuaternion,
}

impl ValueMapper {
    pub fn map(self, value: Vec3) -> ChannelValue {
        match self {
            ValueMapper::Identity => ChannelValue::Vec3(value),
            ValueMapper::DivideBy16 => ChannelValue::Vec3(value / 16.0),
            ValueMapper::DegreesToQuaternion => ChannelValue::Quat(Quat::from_euler(
                EulerRot::ZYX,
                value.z.to_radians(),
                -value.y.to_radians(),
                -value.x.to_radians(),
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ChannelData {
    /// Already mapped
    SingleFrame(ChannelValue),
    Molang {
        value: MolangVec3,
        mapper: ValueMapper,
    },
    Keyframe(KeyframeTrack),
}

#[derive(Debug, Clone, PartialEq)]
pub struct AnimationChannel {
    pub bone: String,
    pub kind: TransformKind,
    pub data: ChannelData,
}

impl AnimationChannel {
    pub fn sample(&self, time: f32, runtime: &mut Runtime<'_>) -> ChannelValue {
        match &self.data {
            ChannelData::SingleFrame(value) => *value,
            ChannelData::Molang { value, mapper } => mapper.map(value.evaluate(runtime)),
            ChannelData::Keyframe(track) => track.sample(time, runtime),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoopMode {
    #[default]
    NoLoop,
    Loop,
    HoldOnLastFrame,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AnimationClip {
    pub name: String,
    /// Seconds
    pub duration: f32,
    pub loop_mode: LoopMode,
    pub start_delay: MolangValue,
    pub loop_delay: MolangValue,
    pub anim_time_update: MolangValue,
    pub blend_weight: MolangValue,
    pub override_previous_animation: bool,
    pub channels: Vec<AnimationChannel>,
}

impl AnimationClip {
    /// Sample every channel at `time` and write the result into `pose`
    ///
    /// Channels targeting bones the pose does not know are ignored. A blend
    /// weight below one mixes the sampled values with what the pose already
    /// holds.
    pub fn apply(&self, pose: &mut Pose, time: f32, runtime: &mut Runtime<'_>) {
        if self.override_previous_animation {
            pose.reset();
        }
        let weight = runtime.value(&self.blend_weight).clamp(0.0, 1.0);
        for channel in &self.channels {
            let Some(joint) = pose.joint_index(&channel.bone) else {
                continue;
            };
            let value = channel.sample(time, runtime);
            match (channel.kind, value) {
                (TransformKind::Rotation, ChannelValue::Quat(rotation)) => {
                    pose.blend_rotation(joint, rotation, weight)
                }
                (TransformKind::Position, ChannelValue::Vec3(translation)) => {
                    pose.blend_translation(joint, translation, weight)
                }
                (TransformKind::Scale, ChannelValue::Vec3(scale)) => {
                    pose.blend_scale(joint, scale, weight)
                }
                (kind, value) => {
                    tracing::warn!(
                        "Channel {} of bone {} produced {:?}",
                        kind.name(),
                        channel.bone,
                        value
                    );
                }
            }
        }
    }
}
