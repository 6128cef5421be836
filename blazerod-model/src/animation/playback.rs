//! Clip playback driven by the host's game clock
//!
//! ```text
//! WaitingStartDelay --start_delay--> Playing --duration--> WaitingLoopDelay
//!                                       ^                        |
//!                                       +--------- Loop ---------+
//!                                   NoLoop -> Ended(0)   HoldOnLastFrame -> Ended(duration)
//! ```
//! Each transition carries its start tick forward by exactly the elapsed
//! phase, so a large time step can cross several states in one update.

use glam::Vec3;

use super::{AnimationClip, LoopMode};
use crate::molang::{MolangValue, QueryProvider, Runtime, Variables};
use crate::pose::Pose;

pub const SECONDS_PER_TICK: f32 = 1.0 / 20.0;

/// Loops shorter than this end instead of spinning
const MIN_LOOP_DURATION: f32 = 1e-2;

/// Host state exposed to Molang through `query.*`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Property {
    EntityPosition,
    EntityPositionDelta,
    EntityHorizontalFacing,
    EntityGroundSpeed,
    EntityVerticalSpeed,
    EntityHasRider,
    EntityIsRiding,
    EntityIsInWater,
    EntityIsInFire,
    EntityIsOnGround,
    LivingEntityHealth,
    LivingEntityMaxHealth,
    LivingEntityHurtTime,
    LivingEntityIsDead,
    LivingEntityEquipmentCount,
    PlayerHeadXRotation,
    PlayerHeadYRotation,
    PlayerBodyXRotation,
    PlayerBodyYRotation,
    PlayerIsFirstPerson,
    PlayerIsSpectator,
    PlayerIsSneaking,
    PlayerIsSprinting,
    PlayerIsSwimming,
    PlayerIsEating,
    PlayerIsUsingItem,
    PlayerIsJumping,
    PlayerIsSleeping,
    PlayerLevel,
    WorldMoonPhase,
    WorldTimeOfDay,
    WorldTimeStamp,
}

impl Property {
    /// Map a lowercase `query.*` name to a property
    pub fn from_query(name: &str) -> Option<Self> {
        Some(match name {
            "position" => Property::EntityPosition,
            "position_delta" => Property::EntityPositionDelta,
            "cardinal_facing_2d" => Property::EntityHorizontalFacing,
            "ground_speed" => Property::EntityGroundSpeed,
            "vertical_speed" => Property::EntityVerticalSpeed,
            "has_rider" => Property::EntityHasRider,
            "is_riding" => Property::EntityIsRiding,
            "is_in_water" => Property::EntityIsInWater,
            "is_in_fire" => Property::EntityIsInFire,
            "is_on_ground" => Property::EntityIsOnGround,
            "health" => Property::LivingEntityHealth,
            "max_health" => Property::LivingEntityMaxHealth,
            "hurt_time" => Property::LivingEntityHurtTime,
            "is_dead" => Property::LivingEntityIsDead,
            "equipment_count" => Property::LivingEntityEquipmentCount,
            "head_x_rotation" => Property::PlayerHeadXRotation,
            "head_y_rotation" => Property::PlayerHeadYRotation,
            "body_x_rotation" => Property::PlayerBodyXRotation,
            "body_y_rotation" => Property::PlayerBodyYRotation,
            "is_first_person" => Property::PlayerIsFirstPerson,
            "is_spectator" => Property::PlayerIsSpectator,
            "is_sneaking" => Property::PlayerIsSneaking,
            "is_sprinting" => Property::PlayerIsSprinting,
            "is_swimming" => Property::PlayerIsSwimming,
            "is_eating" => Property::PlayerIsEating,
            "is_using_item" => Property::PlayerIsUsingItem,
            "is_jumping" => Property::PlayerIsJumping,
            "is_sleeping" => Property::PlayerIsSleeping,
            "player_level" => Property::PlayerLevel,
            "moon_phase" => Property::WorldMoonPhase,
            "time_of_day" => Property::WorldTimeOfDay,
            "time_stamp" => Property::WorldTimeStamp,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PropertyValue {
    Number(f32),
    Bool(bool),
    Vec3(Vec3),
}

/// The host side of an animation: a game clock plus optional entity state
pub trait AnimationContext {
    /// Whole ticks since some fixed epoch
    fn game_tick(&self) -> u64;

    /// Fraction of the current tick, `0.0..1.0`
    fn delta_tick(&self) -> f32;

    fn property(&self, _property: Property) -> Option<PropertyValue> {
        None
    }
}

/// `query.*` bindings for one evaluation
pub struct QueryScope<'a> {
    context: &'a dyn AnimationContext,
    anim_time: f32,
    delta_time: f32,
}

impl<'a> QueryScope<'a> {
    pub fn new(context: &'a dyn AnimationContext, anim_time: f32, delta_time: f32) -> Self {
        Self {
            context,
            anim_time,
            delta_time,
        }
    }
}

impl QueryProvider for QueryScope<'_> {
    fn query(&self, name: &str, args: &[f32]) -> Option<f32> {
        match name {
            "anim_time" => Some(self.anim_time),
            "delta_time" => Some(self.delta_time),
            "life_time" => Some(
                (self.context.game_tick() as f32 + self.context.delta_tick()) * SECONDS_PER_TICK,
            ),
            "all_animations_finished" | "any_animation_finished" => Some(0.0),
            _ => {
                let value = self.context.property(Property::from_query(name)?)?;
                Some(match value {
                    PropertyValue::Number(value) => value,
                    PropertyValue::Bool(value) => value as u8 as f32,
                    PropertyValue::Vec3(value) => match args.first().map(|axis| *axis as i32) {
                        None | Some(0) => value.x,
                        Some(1) => value.y,
                        Some(2) => value.z,
                        Some(_) => 0.0,
                    },
                })
            }
        }
    }
}

/// Point on the game clock
#[derive(Debug, Clone, Copy, PartialEq)]
struct Tick {
    game: u64,
    delta: f32,
}

impl Tick {
    fn now(context: &dyn AnimationContext) -> Self {
        Self {
            game: context.game_tick(),
            delta: context.delta_tick(),
        }
    }

    /// Seconds from this tick to the context's current tick
    fn elapsed(self, context: &dyn AnimationContext) -> f32 {
        let game = context.game_tick() as f64 - self.game as f64;
        let delta = context.delta_tick() - self.delta;
        (game as f32 + delta) * SECONDS_PER_TICK
    }

    fn advance(self, seconds: f32) -> Self {
        let ticks = seconds.max(0.0) / SECONDS_PER_TICK;
        let whole = ticks.trunc();
        let mut game = self.game + whole as u64;
        let mut delta = self.delta + (ticks - whole);
        if delta > 1.0 {
            delta -= 1.0;
            game += 1;
        }
        Self { game, delta }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum State {
    WaitingStartDelay { start: Tick, delay: f32 },
    Playing { start: Tick },
    WaitingLoopDelay { start: Tick, delay: f32 },
    Ended { time: f32 },
}

/// Public view of the playback phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    WaitingStartDelay,
    Playing,
    WaitingLoopDelay,
    Ended,
}

/// Playback of one clip; owns the clip's `variable.*` storage
#[derive(Debug, Clone)]
pub struct AnimationPlayback {
    state: State,
    time: f32,
    duration: f32,
    loop_mode: LoopMode,
    loop_delay: MolangValue,
    variables: Variables,
}

impl AnimationPlayback {
    pub fn new(clip: &AnimationClip, context: &dyn AnimationContext) -> Self {
        let mut variables = Variables::new();
        let delay = {
            let scope = QueryScope::new(context, 0.0, 0.0);
            Runtime::new(&scope, &mut variables).value(&clip.start_delay)
        };
        Self {
            state: State::WaitingStartDelay {
                start: Tick::now(context),
                delay,
            },
            time: 0.0,
            duration: clip.duration,
            loop_mode: clip.loop_mode,
            loop_delay: clip.loop_delay.clone(),
            variables,
        }
    }

    /// Current clip time in seconds
    pub fn time(&self) -> f32 {
        self.time
    }

    pub fn state(&self) -> PlaybackState {
        match self.state {
            State::WaitingStartDelay { .. } => PlaybackState::WaitingStartDelay,
            State::Playing { .. } => PlaybackState::Playing,
            State::WaitingLoopDelay { .. } => PlaybackState::WaitingLoopDelay,
            State::Ended { .. } => PlaybackState::Ended,
        }
    }

    pub fn is_playing(&self) -> bool {
        matches!(self.state, State::Playing { .. })
    }

    pub fn variables(&self) -> &Variables {
        &self.variables
    }

    /// Advance to the context's current tick
    pub fn update(&mut self, context: &dyn AnimationContext) {
        while let Some(next) = self.step(context) {
            self.state = next;
        }
        self.time = match self.state {
            State::WaitingStartDelay { .. } => 0.0,
            State::Playing { start } => start.elapsed(context),
            State::WaitingLoopDelay { .. } => self.duration,
            State::Ended { time } => time,
        };
    }

    fn step(&mut self, context: &dyn AnimationContext) -> Option<State> {
        match self.state {
            State::WaitingStartDelay { start, delay } => (start.elapsed(context) >= delay).then(|| {
                State::Playing {
                    start: start.advance(delay),
                }
            }),
            State::Playing { start } => {
                if start.elapsed(context) < self.duration {
                    return None;
                }
                let scope = QueryScope::new(context, self.duration, 0.0);
                let delay = Runtime::new(&scope, &mut self.variables).value(&self.loop_delay);
                Some(State::WaitingLoopDelay {
                    start: start.advance(self.duration),
                    delay,
                })
            }
            State::WaitingLoopDelay { start, delay } => {
                if start.elapsed(context) < delay {
                    return None;
                }
                let start = start.advance(delay);
                Some(match self.loop_mode {
                    LoopMode::NoLoop => State::Ended { time: 0.0 },
                    LoopMode::Loop if self.duration < MIN_LOOP_DURATION => State::Ended {
                        time: self.duration,
                    },
                    LoopMode::Loop => State::Playing { start },
                    LoopMode::HoldOnLastFrame => State::Ended {
                        time: self.duration,
                    },
                })
            }
            State::Ended { .. } => None,
        }
    }

    /// Update, then sample `clip` at the new time into `pose`
    pub fn apply(&mut self, clip: &AnimationClip, context: &dyn AnimationContext, pose: &mut Pose) {
        let previous = self.time;
        self.update(context);
        let delta_time = (self.time - previous).max(0.0);
        let scope = QueryScope::new(context, self.time, delta_time);
        let mut runtime = Runtime::new(&scope, &mut self.variables);
        clip.apply(pose, self.time, &mut runtime);
    }
}
