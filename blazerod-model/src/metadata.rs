//! Model metadata document (`ysm.json` / `model.json`)
//!
//! # Layout
//! ```text
//! {
//!   "spec": 2,
//!   "metadata": { "name": ..., "tips": ..., "license": {...}, "authors": [...], "link": {...} },
//!   "properties": { "height_scale": 0.7, "width_scale": 0.7, "default_texture": ..., "free": true },
//!   "files": {
//!     "player": {
//!       "model": { "main": "models/main.json" },
//!       "animation": { "main": "animations/main.animation.json" },
//!       "texture": [ "textures/default.png", { "uv": ..., "normal": ..., "specular": ... } ]
//!     }
//!   }
//! }
//! ```
//!
//! Unknown keys are ignored at every level.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{ModelLoadError, Result};
use crate::json::read_limited;

/// Oldest metadata schema revision this loader understands
pub const MIN_SUPPORTED_SPEC: u32 = 2;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelMetadata {
    pub spec: u32,
    #[serde(default)]
    pub metadata: Option<ModelInfo>,
    #[serde(default)]
    pub properties: Option<Properties>,
    pub files: Files,
}

/// Human-readable information about a model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelInfo {
    pub name: String,
    #[serde(default)]
    pub tips: Option<String>,
    #[serde(default)]
    pub license: Option<License>,
    #[serde(default)]
    pub authors: Option<Vec<Author>>,
    #[serde(default)]
    pub link: Option<Link>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct License {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub desc: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Author {
    pub name: String,
    #[serde(default)]
    pub role: Option<String>,
    /// Contact entries keyed by service (e.g. `"email"`, `"qq"`)
    #[serde(default)]
    pub contact: Option<BTreeMap<String, String>>,
    #[serde(default)]
    pub comment: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Link {
    #[serde(default)]
    pub home: Option<String>,
    #[serde(default)]
    pub donate: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Properties {
    #[serde(default)]
    pub height_scale: Option<f32>,
    #[serde(default)]
    pub width_scale: Option<f32>,
    #[serde(default)]
    pub default_texture: Option<String>,
    #[serde(default)]
    pub free: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Files {
    pub player: PlayerFiles,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerFiles {
    /// Geometry files keyed by model id (`"main"`, ...)
    pub model: BTreeMap<String, String>,
    /// Animation files keyed by model id
    #[serde(default)]
    pub animation: Option<BTreeMap<String, String>>,
    #[serde(default)]
    pub animation_controllers: Option<Vec<String>>,
    #[serde(default)]
    pub texture: Vec<TextureEntry>,
}

/// A texture is either a plain path or a PBR set
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TextureEntry {
    Path(String),
    Pbr {
        uv: String,
        #[serde(default)]
        normal: Option<String>,
        #[serde(default)]
        specular: Option<String>,
    },
}

impl TextureEntry {
    /// Path of the base color image
    pub fn base_color(&self) -> &str {
        match self {
            TextureEntry::Path(path) => path,
            TextureEntry::Pbr { uv, .. } => uv,
        }
    }
}

impl ModelMetadata {
    /// Parse a metadata document and apply the schema version gate
    pub fn from_slice(bytes: &[u8], path: &Path) -> Result<Self> {
        let metadata: ModelMetadata =
            serde_json::from_slice(bytes).map_err(|source| ModelLoadError::Json {
                path: path.to_path_buf(),
                source,
            })?;
        if metadata.spec < MIN_SUPPORTED_SPEC {
            return Err(ModelLoadError::UnsupportedSpec(metadata.spec));
        }
        Ok(metadata)
    }

    /// Read a metadata file no larger than `limit` bytes
    pub fn read(path: &Path, limit: u64) -> Result<Self> {
        let bytes = read_limited(path, limit)?;
        Self::from_slice(&bytes, path)
    }

    /// Scene scale `(width, height)`; height falls back to width
    pub fn scale(&self, default_width: f32) -> (f32, f32) {
        let properties = self.properties.as_ref();
        let width = properties
            .and_then(|p| p.width_scale)
            .unwrap_or(default_width);
        let height = properties.and_then(|p| p.height_scale).unwrap_or(width);
        (width, height)
    }

    /// Files a model directory depends on, relative to the metadata file
    pub fn dependencies(&self) -> Vec<&str> {
        let player = &self.files.player;
        let mut files: Vec<&str> = player.model.values().map(String::as_str).collect();
        files.extend(player.texture.iter().filter_map(|texture| match texture {
            TextureEntry::Path(path) => Some(path.as_str()),
            TextureEntry::Pbr { normal, .. } => normal.as_deref(),
        }));
        if let Some(animation) = &player.animation {
            files.extend(animation.values().map(String::as_str));
        }
        files
    }
}
