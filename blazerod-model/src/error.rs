//! Model load errors
//!
//! Every format error is fatal for the model being loaded. Molang parse and
//! evaluation errors are not represented here: they are recovered locally.

use std::path::PathBuf;

use crate::json::JsonKind;

/// Error raised while loading a Bedrock model or its animations
#[derive(Debug, thiserror::Error)]
pub enum ModelLoadError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid JSON in {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("{path} is larger than {limit} bytes")]
    FileTooLarge { path: PathBuf, limit: u64 },

    #[error("Unsupported model spec: {0}")]
    UnsupportedSpec(u32),

    #[error("No {0}")]
    MissingField(&'static str),

    #[error("Unexpected {found} for {field}, expected {expected}")]
    UnexpectedToken {
        field: &'static str,
        expected: &'static str,
        found: JsonKind,
    },

    #[error("Duplicate bone name: {0}")]
    DuplicateBone(String),

    #[error("BoneNode not found: parent {parent} of bone {bone}")]
    BoneParentNotFound { bone: String, parent: String },

    #[error("Bone {0} is its own ancestor")]
    BoneCycle(String),

    #[error("Invalid UV face: {0}")]
    InvalidUvFace(String),

    #[error("Invalid UV: expected array or object, got {0}")]
    InvalidUv(JsonKind),

    #[error("Invalid vector: expected 1 or 3 elements, got {0}")]
    InvalidVector(usize),

    #[error("Invalid keyframe timestamp {0:?}")]
    InvalidTimestamp(String),

    #[error("Animation {animation} channel {channel} has {values} values for {timestamps} timestamps")]
    KeyframeLength {
        animation: String,
        channel: String,
        values: usize,
        timestamps: usize,
    },

    #[error("Unknown animation loop mode {mode} in animation {animation}")]
    InvalidLoopMode { animation: String, mode: String },

    #[error("Joint index #{0} not found")]
    JointIndexMissing(usize),

    #[error("Geometry {identifier} has {cubes} cubes, more than a 16-bit index buffer can address")]
    TooManyCubes { identifier: String, cubes: usize },
}

pub type Result<T, E = ModelLoadError> = std::result::Result<T, E>;
