//! Metadata-driven model loading
//!
//! A model directory is recognised by a marker file (`ysm.json` or
//! `model.json`). The marker's metadata names the geometry, animation and
//! texture files, all resolved relative to the base directory. Only the
//! `"main"` player model is loaded.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::animation::{AnimationClip, parse_animations};
use crate::error::Result;
use crate::geometry;
use crate::json::{read_json_file, read_limited};
use crate::metadata::{ModelInfo, ModelMetadata, PlayerFiles};
use crate::scene::{DEFAULT_WIDTH_SCALE, Model, Sampler, SceneAssembler, Texture};

pub const MARKER_FILES: [&str; 2] = ["ysm.json", "model.json"];

/// Model id loaded from `files.player`
pub const MAIN_MODEL: &str = "main";

/// Limits and defaults for a load
#[derive(Debug, Clone, PartialEq)]
pub struct LoaderOptions {
    pub default_width_scale: f32,
    pub max_texture_bytes: u64,
    pub max_metadata_bytes: u64,
    /// Geometry and animation documents
    pub max_document_bytes: u64,
}

impl Default for LoaderOptions {
    fn default() -> Self {
        Self {
            default_width_scale: DEFAULT_WIDTH_SCALE,
            max_texture_bytes: 16 * 1024 * 1024,
            max_metadata_bytes: 1024 * 1024,
            max_document_bytes: 64 * 1024 * 1024,
        }
    }
}

/// Everything a load produced
///
/// A result without a model is the "no model" state shown to users when a
/// load fails or the metadata has no main model.
#[derive(Debug, Clone, Default)]
pub struct LoadResult {
    pub metadata: Option<ModelInfo>,
    pub model: Option<Model>,
    pub animations: Vec<AnimationClip>,
    pub textures: Vec<Arc<Texture>>,
}

impl LoadResult {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.model.is_none()
    }
}

#[derive(Debug, Clone, Default)]
pub struct BedrockModelLoader {
    options: LoaderOptions,
}

impl BedrockModelLoader {
    pub fn new(options: LoaderOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &LoaderOptions {
        &self.options
    }

    /// Whether `path` names a marker file
    pub fn is_marker(path: &Path) -> bool {
        path.file_name()
            .and_then(|name| name.to_str())
            .is_some_and(|name| MARKER_FILES.contains(&name))
    }

    fn read_metadata(&self, marker: &Path) -> Result<ModelMetadata> {
        ModelMetadata::read(marker, self.options.max_metadata_bytes)
    }

    /// Descriptive metadata only, without touching geometry
    pub fn metadata(&self, marker: &Path) -> Result<Option<ModelInfo>> {
        Ok(self.read_metadata(marker)?.metadata)
    }

    /// Every file the model depends on, resolved against `directory`
    pub fn dependencies(&self, marker: &Path, directory: &Path) -> Result<Vec<PathBuf>> {
        let metadata = self.read_metadata(marker)?;
        let files: BTreeSet<PathBuf> = metadata
            .dependencies()
            .into_iter()
            .map(|file| directory.join(file))
            .collect();
        Ok(files.into_iter().collect())
    }

    pub fn load(&self, marker: &Path, base_path: &Path) -> Result<LoadResult> {
        let metadata = self.read_metadata(marker)?;
        let player = &metadata.files.player;

        let Some(model_file) = player.model.get(MAIN_MODEL) else {
            tracing::info!("{} has no {} model", marker.display(), MAIN_MODEL);
            return Ok(LoadResult::empty());
        };

        let textures = self.load_textures(player, base_path)?;
        let (width, height) = metadata.scale(self.options.default_width_scale);
        let mut assembler = SceneAssembler::new(width, height);
        if let Some(texture) = textures.first() {
            assembler = assembler.with_texture(Arc::clone(texture));
        }

        let model_path = base_path.join(model_file);
        let document = read_json_file(&model_path, self.options.max_document_bytes)?;
        let compiled = geometry::compile(&document)?;
        let model = assembler.assemble(&compiled)?;

        let animations = match player.animation.as_ref().and_then(|files| files.get(MAIN_MODEL)) {
            Some(file) => {
                let path = base_path.join(file);
                parse_animations(&read_json_file(&path, self.options.max_document_bytes)?)?
            }
            None => Vec::new(),
        };

        tracing::info!(
            "Loaded {}: {} scenes, {} animations, {} textures",
            model_path.display(),
            model.scenes.len(),
            animations.len(),
            textures.len()
        );
        Ok(LoadResult {
            metadata: metadata.metadata,
            model: Some(model),
            animations,
            textures,
        })
    }

    /// Load, turning any failure into the empty result
    pub fn load_or_empty(&self, marker: &Path, base_path: &Path) -> LoadResult {
        match self.load(marker, base_path) {
            Ok(result) => result,
            Err(error) => {
                tracing::warn!("Failed to load model {}: {}", marker.display(), error);
                LoadResult::empty()
            }
        }
    }

    fn load_textures(&self, player: &PlayerFiles, base_path: &Path) -> Result<Vec<Arc<Texture>>> {
        player
            .texture
            .iter()
            .map(|entry| {
                let name = entry.base_color();
                let bytes = read_limited(&base_path.join(name), self.options.max_texture_bytes)?;
                tracing::debug!("Read texture {} ({} bytes)", name, bytes.len());
                Ok(Arc::new(Texture {
                    name: name.to_string(),
                    data: bytes.into(),
                    sampler: Sampler::default(),
                }))
            })
            .collect()
    }
}
