//! Rendering core for BlazeRod models
//!
//! Sits between a loaded [`blazerod_model::Model`] and the graphics API:
//! per-frame shader data lives in ring-buffered pools, pipeline variants are
//! compiled once and cached, and one of three vertex transform strategies
//! records the frame's dispatches, barriers and draws.
//!
//! # Layout
//! - [`pool`]: GPU shader data pool (ring slots, slicing, growth)
//! - [`pipeline`]: variant flags, pipeline specs and the variant cache
//! - [`transform`]: CPU, vertex-shader and compute-shader strategies
//! - [`scene`]: renderer inputs built from a model scene
//! - [`caps`] / [`config`]: device capabilities and renderer settings

pub mod caps;
pub mod config;
pub mod error;
pub mod material;
pub mod pipeline;
pub mod pool;
pub mod scene;
pub mod transform;

pub use caps::{DeviceCapabilities, RendererKind};
pub use config::RendererConfig;
pub use error::{RenderError, Result};
pub use material::{MaterialDescriptor, RenderMaterial};
pub use pipeline::{PipelineCompiler, PipelineSpec, PipelineVariantCache, SpecCompiler};
pub use pool::{MemoryBackend, ShaderDataBackend, ShaderDataPool, ShaderDataSlice, WgpuBackend};
pub use scene::{RenderScene, RenderTask};
pub use transform::{FrameCommands, TransformRenderer, create_renderer};
