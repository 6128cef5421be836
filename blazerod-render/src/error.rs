//! Error types for the render crate

use std::path::PathBuf;

use thiserror::Error;

use crate::caps::RendererKind;
use crate::pool::PoolError;

pub type Result<T, E = RenderError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum RenderError {
    #[error(transparent)]
    Pool(#[from] PoolError),

    #[error("Draw '{draw}' reads a buffer written by a dispatch without a memory barrier")]
    MissingBarrier { draw: String },

    #[error("Primitive {primitive} is skinned but the task has no joint matrices")]
    MissingJoints { primitive: usize },

    #[error("Task has {found} local matrices, scene has {expected} primitives")]
    LocalMatrixCount { expected: usize, found: usize },

    #[error("Model has no scene to render")]
    NoScene,

    #[error("Renderer '{0}' draws tasks immediately and cannot schedule them")]
    SchedulingUnsupported(RendererKind),

    #[error("Failed to read config {path}: {source}")]
    ConfigIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config {path}: {source}")]
    Config {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}
