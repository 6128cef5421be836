//! Render command - record frames against an in-memory device
//!
//! Nothing is drawn: the chosen transform strategy records its dispatches,
//! barriers and draws into [`FrameCommands`], which are validated and
//! summarized.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use blazerod_model::animation::SECONDS_PER_TICK;
use blazerod_model::AnimationPlayback;
use blazerod_render::transform::Command;
use blazerod_render::{
    DeviceCapabilities, FrameCommands, MemoryBackend, RenderScene, RendererConfig, RendererKind,
    SpecCompiler, create_renderer,
};
use clap::Args;
use glam::{Mat4, Vec3};

use crate::animate::FixedClock;
use crate::model;

/// Distance between instances along X, in model units
const INSTANCE_SPACING: f32 = 1.0;

#[derive(Args)]
pub struct RenderArgs {
    /// Model directory or marker file
    pub model: PathBuf,

    /// Transform strategy: vertex_transform, cpu_transform or compute_shader
    /// (defaults to the config's preferred renderer)
    #[arg(short, long)]
    pub renderer: Option<RendererKind>,

    /// Renderer settings (TOML)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Instances of the model per frame
    #[arg(short, long, default_value_t = 1)]
    pub instances: usize,

    /// Frames to record, one game tick apart
    #[arg(short, long, default_value_t = 1)]
    pub frames: usize,

    /// Batch instances with schedule / execute
    #[arg(long)]
    pub schedule: bool,

    /// Animation clip to play across the frames
    #[arg(short, long)]
    pub animation: Option<String>,

    /// Pretend the device has neither storage buffers nor compute shaders
    #[arg(long)]
    pub minimal_device: bool,

    /// Print every recorded command
    #[arg(long)]
    pub commands: bool,
}

pub fn execute(args: RenderArgs) -> Result<()> {
    if args.instances == 0 {
        bail!("--instances must be at least 1");
    }

    let config = match &args.config {
        Some(path) => RendererConfig::load(path)
            .with_context(|| format!("Failed to load renderer config {}", path.display()))?,
        None => RendererConfig::default(),
    };
    let caps = if args.minimal_device {
        DeviceCapabilities::minimal()
    } else {
        DeviceCapabilities::default()
    };

    let result = model::load(&args.model)?;
    let model = model::require_model(&result, &args.model)?;
    let scene = Arc::new(RenderScene::from_model(model)?);
    let clip = match &args.animation {
        Some(name) => Some(model::find_clip(&result.animations, Some(name))?),
        None => None,
    };

    let preferred = args.renderer.unwrap_or(config.preferred_renderer);
    let mut renderer = create_renderer(
        preferred,
        MemoryBackend::new(),
        SpecCompiler::new(),
        &caps,
        &config,
    )?;
    let schedule = args.schedule && renderer.kind().supports_scheduling();
    if args.schedule && !schedule {
        tracing::warn!(
            "'{}' renderer cannot schedule, rendering each instance directly",
            renderer.kind()
        );
    }

    println!("Renderer: {}", renderer.kind());
    println!(
        "Scene: {}, {} primitives, {} vertices",
        scene.name,
        scene.primitives.len(),
        scene.vertex_count()
    );

    let mut playback = clip.map(|clip| AnimationPlayback::new(clip, &FixedClock::at(0.0)));
    let mut frame = FrameCommands::new();
    for index in 0..args.frames {
        let pose = match (clip, playback.as_mut(), scene.skeleton.as_ref()) {
            (Some(clip), Some(playback), Some(skeleton)) => {
                let mut pose = skeleton.rest_pose();
                let clock = FixedClock::at(index as f32 * SECONDS_PER_TICK);
                playback.apply(clip, &clock, &mut pose);
                Some(pose)
            }
            _ => None,
        };

        frame.clear();
        for instance in 0..args.instances {
            let offset = Vec3::new(instance as f32 * INSTANCE_SPACING, 0.0, 0.0);
            let task = scene.task(Mat4::from_translation(offset), pose.as_ref());
            if schedule {
                renderer.schedule(&mut frame, &scene, task)?;
            } else {
                renderer.render(&mut frame, &scene, &task)?;
            }
        }
        if schedule {
            renderer.execute(&mut frame)?;
        }
        frame
            .validate_barriers()
            .with_context(|| format!("Frame {} is missing a memory barrier", index))?;

        print_frame(index, &frame, args.commands);
        renderer.rotate();
    }

    println!("Pipelines: {}", renderer.pipeline_count());
    renderer.close();
    Ok(())
}

fn print_frame(index: usize, frame: &FrameCommands, commands: bool) {
    let instances: u32 = frame.draws().map(|draw| draw.instance_count).sum();
    println!(
        "Frame {}: {} dispatches, {} barriers, {} draws, {} instances",
        index,
        frame.dispatches().count(),
        frame.barrier_count(),
        frame.draws().count(),
        instances
    );
    if !commands {
        return;
    }
    for command in frame.commands() {
        match command {
            Command::Dispatch(dispatch) => println!(
                "  dispatch {} {:?} workgroups {:?}",
                dispatch.label, dispatch.pipeline, dispatch.workgroups
            ),
            Command::MemoryBarrier(flags) => println!("  barrier {:?}", flags),
            Command::Draw(draw) => println!(
                "  draw {} {:?} vertices {} indices {} instances {}",
                draw.label,
                draw.pipeline,
                draw.vertex_count,
                draw.index_count.unwrap_or(0),
                draw.instance_count
            ),
        }
    }
}
