//! Animation document compiler
//!
//! ```text
//! {
//!   "format_version": "1.8.0",
//!   "animations": {
//!     "walk": {
//!       "loop": true,
//!       "animation_length": 1.0,
//!       "bones": {
//!         "leg": {
//!           "rotation": { "0.0": [0, 0, 0], "0.5": { "post": [30, 0, 0], "lerp_mode": "catmullrom" } },
//!           "position": "math.sin(query.anim_time * 360)",
//!           "scale": 1.2
//!         }
//!       }
//!     }
//!   }
//! }
//! ```

use serde_json::{Map, Value};

use super::keyframe::{KeyframeTrack, LerpMode};
use super::{AnimationChannel, AnimationClip, ChannelData, LoopMode, TransformKind, ValueMapper};
use crate::error::{ModelLoadError, Result};
use crate::json::{self, JsonKind};
use crate::molang::{MolangValue, MolangVec3};

const DEFAULT_ANIM_TIME_UPDATE: &str = "query.anim_time + query.delta_time";

/// Compile every clip of a parsed animation document, in document order
pub fn parse_animations(document: &Value) -> Result<Vec<AnimationClip>> {
    let root = json::object(document, "animation document")?;
    root.get("format_version")
        .ok_or(ModelLoadError::MissingField("format version"))
        .and_then(|v| json::string(v, "format_version"))?;

    let Some(animations) = root.get("animations") else {
        return Ok(Vec::new());
    };
    let clips = json::object(animations, "animations")?
        .iter()
        .map(|(name, value)| parse_clip(name, value))
        .collect::<Result<Vec<_>>>()?;
    tracing::debug!("Parsed {} animations", clips.len());
    Ok(clips)
}

fn parse_clip(name: &str, value: &Value) -> Result<AnimationClip> {
    let object = json::object(value, "animation")?;

    let mut clip = AnimationClip {
        name: name.to_string(),
        duration: 0.0,
        loop_mode: LoopMode::NoLoop,
        start_delay: MolangValue::ZERO,
        loop_delay: MolangValue::ZERO,
        anim_time_update: MolangValue::parse(DEFAULT_ANIM_TIME_UPDATE),
        blend_weight: MolangValue::ONE,
        override_previous_animation: false,
        channels: Vec::new(),
    };
    let mut length = None;
    for (key, value) in object {
        match key.as_str() {
            "animation_length" => length = Some(json::float(value, "animation_length")?),
            "loop" => clip.loop_mode = parse_loop_mode(name, value)?,
            "start_delay" => clip.start_delay = parse_value(value, "start_delay")?,
            "loop_delay" => clip.loop_delay = parse_value(value, "loop_delay")?,
            "anim_time_update" => clip.anim_time_update = parse_value(value, "anim_time_update")?,
            "blend_weight" => clip.blend_weight = parse_value(value, "blend_weight")?,
            "override_previous_animation" => {
                clip.override_previous_animation = json::boolean(value, "override_previous_animation")?
            }
            "bones" => {
                for (bone, value) in json::object(value, "bones")? {
                    parse_bone(name, bone, value, &mut clip.channels)?;
                }
            }
            _ => {}
        }
    }

    clip.duration = length.unwrap_or_else(|| last_keyframe(&clip.channels));
    Ok(clip)
}

fn last_keyframe(channels: &[AnimationChannel]) -> f32 {
    channels
        .iter()
        .filter_map(|channel| match &channel.data {
            ChannelData::Keyframe(track) => track.timestamps.last().copied(),
            _ => None,
        })
        .fold(0.0, f32::max)
}

fn parse_loop_mode(animation: &str, value: &Value) -> Result<LoopMode> {
    let invalid = |mode: String| ModelLoadError::InvalidLoopMode {
        animation: animation.to_string(),
        mode,
    };
    match value {
        Value::Bool(true) => Ok(LoopMode::Loop),
        Value::Bool(false) => Ok(LoopMode::NoLoop),
        Value::String(mode) => match mode.as_str() {
            "true" => Ok(LoopMode::Loop),
            "false" => Ok(LoopMode::NoLoop),
            "hold_on_last_frame" => Ok(LoopMode::HoldOnLastFrame),
            other => Err(invalid(other.to_string())),
        },
        other => Err(invalid(other.to_string())),
    }
}

/// Number or Molang string
fn parse_value(value: &Value, field: &'static str) -> Result<MolangValue> {
    match value {
        Value::Number(_) => Ok(MolangValue::Plain(json::float(value, field)?)),
        Value::String(source) => Ok(MolangValue::parse(source)),
        other => Err(ModelLoadError::UnexpectedToken {
            field,
            expected: "number or string",
            found: JsonKind::of(other),
        }),
    }
}

/// Scalar, 1- or 3-array, or string
pub(crate) fn parse_vec3(value: &Value) -> Result<MolangVec3> {
    match value {
        Value::Array(items) => {
            let components = items
                .iter()
                .map(|item| parse_value(item, "vector component"))
                .collect::<Result<Vec<_>>>()?;
            match <[MolangValue; 3]>::try_from(components) {
                Ok([x, y, z]) => Ok(MolangVec3::new(x, y, z)),
                Err(mut components) if components.len() == 1 => {
                    Ok(MolangVec3::splat(components.remove(0)))
                }
                Err(components) => Err(ModelLoadError::InvalidVector(components.len())),
            }
        }
        Value::Number(_) | Value::String(_) => Ok(MolangVec3::splat(parse_value(value, "vector")?)),
        other => Err(ModelLoadError::UnexpectedToken {
            field: "vector",
            expected: "number, string or array",
            found: JsonKind::of(other),
        }),
    }
}

fn parse_bone(
    animation: &str,
    bone: &str,
    value: &Value,
    channels: &mut Vec<AnimationChannel>,
) -> Result<()> {
    for (key, value) in json::object(value, "bone animation")? {
        let Some(kind) = TransformKind::from_key(key) else {
            continue;
        };
        let mapper = kind.mapper();
        let data = match value {
            Value::Object(frames) => {
                let channel = format!("{bone}.{key}");
                match parse_keyframes(animation, &channel, frames, mapper)? {
                    Some(track) => ChannelData::Keyframe(track),
                    None => {
                        tracing::debug!("Skipping empty channel {} in {}", channel, animation);
                        continue;
                    }
                }
            }
            _ => {
                let vector = parse_vec3(value)?;
                match vector.as_plain() {
                    Some(constant) => ChannelData::SingleFrame(mapper.map(constant)),
                    None => ChannelData::Molang {
                        value: vector,
                        mapper,
                    },
                }
            }
        };
        channels.push(AnimationChannel {
            bone: bone.to_string(),
            kind,
            data,
        });
    }
    Ok(())
}

struct Frame {
    time: f32,
    pre: MolangVec3,
    post: MolangVec3,
    lerp_mode: LerpMode,
}

fn parse_frame(time: f32, value: &Value) -> Result<Option<Frame>> {
    let Value::Object(object) = value else {
        let vector = parse_vec3(value)?;
        return Ok(Some(Frame {
            time,
            pre: vector.clone(),
            post: vector,
            lerp_mode: LerpMode::Linear,
        }));
    };

    let mut pre = None;
    let mut post = None;
    let mut lerp_mode = LerpMode::Linear;
    for (key, value) in object {
        match key.as_str() {
            "pre" => pre = Some(parse_vec3(value)?),
            "post" => post = Some(parse_vec3(value)?),
            "lerp_mode" => {
                if let Some(mode) = LerpMode::from_name(json::string(value, "lerp_mode")?) {
                    lerp_mode = mode;
                }
            }
            _ => {}
        }
    }
    let (pre, post) = match (pre, post) {
        (Some(pre), Some(post)) => (pre, post),
        (Some(pre), None) => (pre.clone(), pre),
        (None, Some(post)) => (post.clone(), post),
        (None, None) => return Ok(None),
    };
    Ok(Some(Frame {
        time,
        pre,
        post,
        lerp_mode,
    }))
}

fn parse_keyframes(
    animation: &str,
    channel: &str,
    frames: &Map<String, Value>,
    mapper: ValueMapper,
) -> Result<Option<KeyframeTrack>> {
    let mut parsed = Vec::with_capacity(frames.len());
    for (stamp, value) in frames {
        let time: f32 = stamp
            .trim()
            .parse()
            .map_err(|_| ModelLoadError::InvalidTimestamp(stamp.clone()))?;
        if let Some(frame) = parse_frame(time, value)? {
            parsed.push(frame);
        }
    }
    if parsed.is_empty() {
        return Ok(None);
    }
    parsed.sort_by(|a, b| a.time.total_cmp(&b.time));

    let mut timestamps = Vec::with_capacity(parsed.len());
    let mut values = Vec::with_capacity(parsed.len() * 6);
    let mut lerp_modes: Option<Vec<LerpMode>> = None;
    let mut molang = None;
    for (index, frame) in parsed.into_iter().enumerate() {
        timestamps.push(frame.time);
        if frame.lerp_mode != LerpMode::Linear {
            let modes = lerp_modes.get_or_insert_with(|| vec![LerpMode::Linear; index]);
            modes.push(frame.lerp_mode);
        } else if let Some(modes) = &mut lerp_modes {
            modes.push(LerpMode::Linear);
        }
        for vector in [&frame.pre, &frame.post] {
            for component in vector.components() {
                match component {
                    MolangValue::Plain(value) => values.push(*value),
                    MolangValue::Expression(program) => {
                        let slots = molang.get_or_insert_with(Vec::new);
                        slots.resize(values.len(), None);
                        slots.push(Some(program.clone()));
                        values.push(0.0);
                    }
                }
            }
        }
    }
    if let Some(slots) = &mut molang {
        slots.resize(values.len(), None);
    }

    let frames = timestamps.len();
    let mismatch = values.len() != frames * 6
        || lerp_modes.as_ref().is_some_and(|modes| modes.len() != frames)
        || molang.as_ref().is_some_and(|slots| slots.len() != values.len());
    if mismatch {
        return Err(ModelLoadError::KeyframeLength {
            animation: animation.to_string(),
            channel: channel.to_string(),
            values: values.len(),
            timestamps: frames,
        });
    }

    Ok(Some(KeyframeTrack {
        timestamps,
        values,
        lerp_modes,
        molang,
        mapper,
    }))
}
