//! Animate command - sample a clip on a fixed clock and print the pose

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use blazerod_model::animation::{AnimationContext, SECONDS_PER_TICK};
use blazerod_model::{AnimationClip, AnimationPlayback, Pose, Skeleton};
use clap::Args;
use glam::EulerRot;
use serde_json::{Map, Value, json};

use crate::model;

#[derive(Args)]
pub struct AnimateArgs {
    /// Model directory or marker file
    pub model: PathBuf,

    /// Clip to play (defaults to the first clip)
    #[arg(short, long)]
    pub animation: Option<String>,

    /// Samples per second
    #[arg(long, default_value_t = 20.0)]
    pub fps: f32,

    /// Seconds to sample (defaults to the clip length)
    #[arg(short, long)]
    pub duration: Option<f32>,

    /// Only print these bones
    #[arg(short, long)]
    pub bone: Vec<String>,

    /// Print samples as JSON
    #[arg(long)]
    pub json: bool,
}

/// Game clock stopped at one instant
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FixedClock {
    tick: u64,
    delta: f32,
}

impl FixedClock {
    pub fn at(seconds: f32) -> Self {
        let ticks = seconds.max(0.0) / SECONDS_PER_TICK;
        Self {
            tick: ticks.trunc() as u64,
            delta: ticks.fract(),
        }
    }
}

impl AnimationContext for FixedClock {
    fn game_tick(&self) -> u64 {
        self.tick
    }

    fn delta_tick(&self) -> f32 {
        self.delta
    }
}

struct Sample {
    time: f32,
    clip_time: f32,
    state: String,
    pose: Pose,
}

pub fn execute(args: AnimateArgs) -> Result<()> {
    if args.fps.is_nan() || args.fps <= 0.0 {
        bail!("--fps must be positive, got {}", args.fps);
    }

    let result = model::load(&args.model)?;
    let model = model::require_model(&result, &args.model)?;
    let skeleton = Skeleton::from_model(model).context("Model has no skeleton")?;
    let clip = model::find_clip(&result.animations, args.animation.as_deref())?;
    for bone in &args.bone {
        if skeleton.joint_index(bone).is_none() {
            bail!("No bone '{}' in the skeleton", bone);
        }
    }

    let duration = args.duration.unwrap_or(clip.duration).max(0.0);
    let samples = sample(clip, &skeleton, duration, args.fps);
    tracing::debug!("Sampled '{}' {} times", clip.name, samples.len());

    let joints: Vec<usize> = if args.bone.is_empty() {
        (0..skeleton.len()).collect()
    } else {
        args.bone
            .iter()
            .filter_map(|bone| skeleton.joint_index(bone))
            .collect()
    };

    if args.json {
        let output = samples_json(clip, &skeleton, &joints, &samples);
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        print_samples(clip, &skeleton, &joints, &samples);
    }
    Ok(())
}

/// Sample `duration` seconds of `clip` at `fps`, both ends included
fn sample(clip: &AnimationClip, skeleton: &Skeleton, duration: f32, fps: f32) -> Vec<Sample> {
    let count = (duration * fps).floor() as usize + 1;
    let mut playback = AnimationPlayback::new(clip, &FixedClock::at(0.0));
    (0..count)
        .map(|frame| {
            let time = frame as f32 / fps;
            let mut pose = skeleton.rest_pose();
            playback.apply(clip, &FixedClock::at(time), &mut pose);
            Sample {
                time,
                clip_time: playback.time(),
                state: format!("{:?}", playback.state()),
                pose,
            }
        })
        .collect()
}

fn print_samples(clip: &AnimationClip, skeleton: &Skeleton, joints: &[usize], samples: &[Sample]) {
    println!(
        "Animation: {} ({:.2}s, {:?})",
        clip.name, clip.duration, clip.loop_mode
    );
    for sample in samples {
        println!(
            "t={:.3}s clip={:.3}s {}",
            sample.time, sample.clip_time, sample.state
        );
        for &index in joints {
            let Some(joint) = sample.pose.joint(index) else {
                continue;
            };
            let (x, y, z) = joint.rotation.to_euler(EulerRot::XYZ);
            println!(
                "  {}: rotation [{:.2}, {:.2}, {:.2}] translation [{:.3}, {:.3}, {:.3}] scale [{:.3}, {:.3}, {:.3}]",
                skeleton.joints()[index].name,
                x.to_degrees(),
                y.to_degrees(),
                z.to_degrees(),
                joint.translation.x,
                joint.translation.y,
                joint.translation.z,
                joint.scale.x,
                joint.scale.y,
                joint.scale.z,
            );
        }
    }
}

fn samples_json(
    clip: &AnimationClip,
    skeleton: &Skeleton,
    joints: &[usize],
    samples: &[Sample],
) -> Value {
    let samples: Vec<Value> = samples
        .iter()
        .map(|sample| {
            let mut bones = Map::new();
            for &index in joints {
                let Some(joint) = sample.pose.joint(index) else {
                    continue;
                };
                bones.insert(
                    skeleton.joints()[index].name.clone(),
                    json!({
                        "rotation": joint.rotation.to_array(),
                        "translation": joint.translation.to_array(),
                        "scale": joint.scale.to_array(),
                    }),
                );
            }
            json!({
                "time": sample.time,
                "clip_time": sample.clip_time,
                "state": sample.state,
                "bones": bones,
            })
        })
        .collect();

    json!({
        "animation": clip.name,
        "duration": clip.duration,
        "loop_mode": format!("{:?}", clip.loop_mode),
        "samples": samples,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_clock_splits_ticks() {
        let clock = FixedClock::at(1.0);
        let ticks = clock.game_tick() as f32 + clock.delta_tick();
        assert!((ticks - 20.0).abs() < 1e-3);

        let clock = FixedClock::at(0.125);
        assert_eq!(clock.game_tick(), 2);
        assert!((clock.delta_tick() - 0.5).abs() < 1e-3);

        assert_eq!(FixedClock::at(-1.0).game_tick(), 0);
    }
}
