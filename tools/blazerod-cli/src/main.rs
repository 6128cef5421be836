//! BlazeRod CLI - work with Bedrock models outside the game
//!
//! # Commands
//!
//! - `blazerod inspect` - Print metadata, scene, bones, animations and textures
//! - `blazerod animate` - Sample an animation clip on a fixed game clock
//! - `blazerod render` - Record frames with a transform strategy and summarize them
//!
//! Every command takes a model directory, or the `ysm.json` / `model.json`
//! inside it.
//!
//! # Usage
//!
//! ```bash
//! # What's in this model?
//! blazerod inspect models/person
//!
//! # Joint transforms of one clip, 10 samples per second, as JSON
//! blazerod animate models/person -a animation.person.nod --fps 10 --json
//!
//! # Four instances batched on the compute path
//! blazerod render models/person -r compute_shader -i 4 --schedule
//! ```
//!
//! Logs go to stderr; `RUST_LOG` overrides `--verbose`.

mod animate;
mod inspect;
mod model;
mod render;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

/// BlazeRod CLI - inspect and render Bedrock models
#[derive(Parser)]
#[command(name = "blazerod")]
#[command(about = "Inspect, animate and dry-run render Bedrock models")]
#[command(version)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print metadata, scene, bones, animations and textures of a model
    Inspect(inspect::InspectArgs),

    /// Sample an animation clip and print joint transforms
    Animate(animate::AnimateArgs),

    /// Record frames with a transform strategy and print what was recorded
    Render(render::RenderArgs),
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Inspect(args) => inspect::execute(args),
        Commands::Animate(args) => animate::execute(args),
        Commands::Render(args) => render::execute(args),
    }
}
