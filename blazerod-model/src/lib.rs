//! Bedrock model loader for the BlazeRod renderer
//!
//! Converts a Bedrock-format model directory (metadata document, geometry JSON,
//! animation JSON and textures) into an in-memory scene graph plus a list of
//! animation clips.
//!
//! # Layout
//! - [`molang`]: Molang expression language (values, parser, evaluator)
//! - [`geometry`]: bone hierarchy builder and cube-to-mesh compiler
//! - [`animation`]: channel compiler, keyframe sampling and playback
//! - [`scene`]: scene graph, skins, accessors and materials
//! - [`pose`]: animated skeleton evaluation into joint matrices
//! - [`loader`]: metadata-driven entry point

pub mod animation;
pub mod error;
pub mod geometry;
mod json;
pub mod loader;
pub mod metadata;
pub mod molang;
pub mod pose;
pub mod scene;

pub use animation::{AnimationClip, AnimationContext, AnimationPlayback};
pub use error::{ModelLoadError, Result};
pub use json::JsonKind;
pub use loader::{BedrockModelLoader, LoadResult, LoaderOptions};
pub use metadata::ModelMetadata;
pub use molang::{MolangValue, MolangVec3};
pub use pose::{Pose, Skeleton};
pub use scene::{Model, Node, NodeId, NodeTransform, Scene, Skin};
