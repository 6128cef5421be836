//! Keyframe tracks and sampling
//!
//! # Layout
//! Each keyframe stores two stacked values so a track can jump:
//! ```text
//! values[i * 6 .. i * 6 + 3]      pre  (value arriving at frame i)
//! values[i * 6 + 3 .. i * 6 + 6]  post (value leaving frame i)
//! ```
//! Slots driven by Molang keep `0.0` in `values` and the program in the
//! parallel `molang` array.

use glam::Vec3;

use super::{ChannelValue, ValueMapper};
use crate::molang::{Program, Runtime};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LerpMode {
    #[default]
    Linear,
    CatmullRom,
}

impl LerpMode {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "linear" => Some(LerpMode::Linear),
            "catmullrom" => Some(LerpMode::CatmullRom),
            _ => None,
        }
    }
}

/// Bracketing frames for a query time
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KeyframeIndex {
    pub from: usize,
    pub to: usize,
    /// Normalized position between `from` and `to`
    pub t: f32,
}

impl KeyframeIndex {
    /// Binary search over sorted timestamps
    ///
    /// Before the first frame and at or after the last frame the index is
    /// clamped to that frame with `t = 0`.
    pub fn find(timestamps: &[f32], time: f32) -> Option<Self> {
        let last = timestamps.len().checked_sub(1)?;
        if time < timestamps[0] {
            return Some(Self { from: 0, to: 0, t: 0.0 });
        }
        if time >= timestamps[last] {
            return Some(Self {
                from: last,
                to: last,
                t: 0.0,
            });
        }
        // Last frame with timestamp <= time
        let from = timestamps.partition_point(|stamp| *stamp <= time) - 1;
        let to = from + 1;
        let span = timestamps[to] - timestamps[from];
        let t = if span > 0.0 {
            (time - timestamps[from]) / span
        } else {
            0.0
        };
        Some(Self { from, to, t })
    }

    pub fn is_clamped(&self) -> bool {
        self.from == self.to
    }
}

/// Catmull-Rom weights for `p0..p3` at `t`
pub fn catmull_rom_weights(t: f32) -> [f32; 4] {
    let t2 = t * t;
    let t3 = t2 * t;
    [
        -0.5 * t3 + t2 - 0.5 * t,
        1.5 * t3 - 2.5 * t2 + 1.0,
        -1.5 * t3 + 2.0 * t2 + 0.5 * t,
        0.5 * t3 - 0.5 * t2,
    ]
}

#[derive(Debug, Clone, PartialEq)]
pub struct KeyframeTrack {
    /// Seconds, ascending
    pub timestamps: Vec<f32>,
    /// `timestamps.len() * 6` floats
    pub values: Vec<f32>,
    /// Per-frame mode of the segment starting at that frame
    pub lerp_modes: Option<Vec<LerpMode>>,
    /// Same length as `values`
    pub molang: Option<Vec<Option<Program>>>,
    pub mapper: ValueMapper,
}

impl KeyframeTrack {
    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    pub fn lerp_mode(&self, frame: usize) -> LerpMode {
        self.lerp_modes
            .as_ref()
            .and_then(|modes| modes.get(frame).copied())
            .unwrap_or_default()
    }

    /// Raw (unmapped) pre or post value of `frame`
    pub fn raw_slot(&self, frame: usize, post: bool, runtime: &mut Runtime<'_>) -> Vec3 {
        let base = frame * 6 + if post { 3 } else { 0 };
        let mut out = [0.0; 3];
        for (axis, slot) in out.iter_mut().enumerate() {
            let index = base + axis;
            let program = self
                .molang
                .as_ref()
                .and_then(|molang| molang.get(index))
                .and_then(Option::as_ref);
            *slot = match program {
                Some(program) => runtime.eval_or_zero(program),
                None => self.values[index],
            };
        }
        Vec3::from_array(out)
    }

    fn slot(&self, frame: usize, post: bool, runtime: &mut Runtime<'_>) -> ChannelValue {
        self.mapper.map(self.raw_slot(frame, post, runtime))
    }

    pub fn sample(&self, time: f32, runtime: &mut Runtime<'_>) -> ChannelValue {
        let Some(index) = KeyframeIndex::find(&self.timestamps, time) else {
            return self.mapper.map(Vec3::ZERO);
        };
        if index.is_clamped() {
            // Before the first frame read its pre slot, otherwise the last post slot
            let post = index.from != 0 || time >= self.timestamps[0];
            return self.slot(index.from, post, runtime);
        }

        let start = self.slot(index.from, true, runtime);
        let end = self.slot(index.to, false, runtime);
        match self.lerp_mode(index.from) {
            LerpMode::Linear => lerp(start, end, index.t),
            LerpMode::CatmullRom => {
                let last = self.len() - 1;
                let p0 = self.slot(index.from.saturating_sub(1), false, runtime);
                let p3 = self.slot((index.to + 1).min(last), false, runtime);
                catmull_rom([p0, start, end, p3], index.t)
            }
        }
    }
}

fn lerp(start: ChannelValue, end: ChannelValue, t: f32) -> ChannelValue {
    match (start, end) {
        (ChannelValue::Vec3(a), ChannelValue::Vec3(b)) => ChannelValue::Vec3(a.lerp(b, t)),
        (ChannelValue::Quat(a), ChannelValue::Quat(b)) => ChannelValue::Quat(a.slerp(b, t)),
        (a, _) => a,
    }
}

fn catmull_rom(points: [ChannelValue; 4], t: f32) -> ChannelValue {
    let weights = catmull_rom_weights(t);
    match points {
        [
            ChannelValue::Vec3(p0),
            ChannelValue::Vec3(p1),
            ChannelValue::Vec3(p2),
            ChannelValue::Vec3(p3),
        ] => ChannelValue::Vec3(p0 * weights[0] + p1 * weights[1] + p2 * weights[2] + p3 * weights[3]),
        [
            ChannelValue::Quat(p0),
            ChannelValue::Quat(p1),
            ChannelValue::Quat(p2),
            ChannelValue::Quat(p3),
        ] => {
            let sum = p0 * weights[0] + p1 * weights[1] + p2 * weights[2] + p3 * weights[3];
            ChannelValue::Quat(sum.normalize())
        }
        [_, p1, ..] => p1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::molang::Variables;

    fn track(timestamps: Vec<f32>, values: Vec<f32>) -> KeyframeTrack {
        KeyframeTrack {
            timestamps,
            values,
            lerp_modes: None,
            molang: None,
            mapper: ValueMapper::Identity,
        }
    }

    fn sample(track: &KeyframeTrack, time: f32) -> Vec3 {
        let mut variables = Variables::new();
        let mut runtime = Runtime::new(&(), &mut variables);
        track.sample(time, &mut runtime).as_vec3().unwrap()
    }

    #[test]
    fn test_index_brackets() {
        let stamps = [0.0, 1.0, 3.0];
        assert_eq!(KeyframeIndex::find(&stamps, -1.0), Some(KeyframeIndex { from: 0, to: 0, t: 0.0 }));
        assert_eq!(KeyframeIndex::find(&stamps, 0.5), Some(KeyframeIndex { from: 0, to: 1, t: 0.5 }));
        assert_eq!(KeyframeIndex::find(&stamps, 1.0), Some(KeyframeIndex { from: 1, to: 2, t: 0.0 }));
        assert_eq!(KeyframeIndex::find(&stamps, 2.0), Some(KeyframeIndex { from: 1, to: 2, t: 0.5 }));
        assert_eq!(KeyframeIndex::find(&stamps, 3.0), Some(KeyframeIndex { from: 2, to: 2, t: 0.0 }));
        assert_eq!(KeyframeIndex::find(&[], 1.0), None);
    }

    #[test]
    fn test_linear_segment_uses_post_then_pre() {
        // Frame 0: pre 0, post 10. Frame 1: pre 20, post 100.
        let track = track(
            vec![0.0, 1.0],
            vec![0.0, 0.0, 0.0, 10.0, 10.0, 10.0, 20.0, 20.0, 20.0, 100.0, 100.0, 100.0],
        );
        assert_eq!(sample(&track, -1.0), Vec3::ZERO);
        assert_eq!(sample(&track, 0.5), Vec3::splat(15.0));
        assert_eq!(sample(&track, 1.0), Vec3::splat(100.0));
        assert_eq!(sample(&track, 5.0), Vec3::splat(100.0));
    }

    #[test]
    fn test_catmull_rom_weights_interpolate_endpoints() {
        assert_eq!(catmull_rom_weights(0.0), [0.0, 1.0, 0.0, 0.0]);
        assert_eq!(catmull_rom_weights(1.0), [0.0, 0.0, 1.0, 0.0]);
        let sum: f32 = catmull_rom_weights(0.3).iter().sum();
        assert!((sum - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_catmull_rom_on_a_line_is_linear() {
        let mut values = Vec::new();
        for x in [0.0, 1.0, 2.0, 3.0] {
            values.extend([x; 6]);
        }
        let mut track = track(vec![0.0, 1.0, 2.0, 3.0], values);
        track.lerp_modes = Some(vec![LerpMode::CatmullRom; 4]);
        assert!(sample(&track, 1.5).abs_diff_eq(Vec3::splat(1.5), 1e-6));
    }

    #[test]
    fn test_segment_mode_comes_from_start_frame() {
        let mut values = Vec::new();
        for x in [0.0, 4.0, 4.0, 0.0] {
            values.extend([x; 6]);
        }
        let mut track = track(vec![0.0, 1.0, 2.0, 3.0], values);
        track.lerp_modes = Some(vec![
            LerpMode::Linear,
            LerpMode::Linear,
            LerpMode::CatmullRom,
            LerpMode::Linear,
        ]);
        // Segment 0..1 stays linear
        assert_eq!(sample(&track, 0.5), Vec3::splat(2.0));
        // Segment 2..3 uses Catmull-Rom with neighbours 4 and 0
        let [c0, c1, c2, c3] = catmull_rom_weights(0.5);
        let expected = 4.0 * c0 + 4.0 * c1 + 0.0 * c2 + 0.0 * c3;
        assert!((sample(&track, 2.5).x - expected).abs() < 1e-6);
    }

    #[test]
    fn test_molang_override_slot() {
        let mut track = track(vec![0.0], vec![1.0; 6]);
        let mut molang = vec![None; 6];
        molang[4] = Some(Program::parse("2 + 3").unwrap());
        track.molang = Some(molang);
        assert_eq!(sample(&track, 0.0), Vec3::new(1.0, 5.0, 1.0));
        assert_eq!(sample(&track, -1.0), Vec3::ONE);
    }

    #[test]
    fn test_quaternion_tracks_stay_normalized() {
        let mut values = Vec::new();
        for angle in [0.0, 90.0, 180.0] {
            values.extend([0.0, angle, 0.0, 0.0, angle, 0.0]);
        }
        let mut track = track(vec![0.0, 1.0, 2.0], values);
        track.mapper = ValueMapper::DegreesToQuaternion;
        track.lerp_modes = Some(vec![LerpMode::CatmullRom; 3]);

        let mut variables = Variables::new();
        let mut runtime = Runtime::new(&(), &mut variables);
        for step in 0..=20 {
            let rotation = track.sample(step as f32 * 0.1, &mut runtime).as_quat().unwrap();
            assert!((rotation.length() - 1.0).abs() < 1e-5);
        }
    }
}
