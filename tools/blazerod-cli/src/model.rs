//! Locating and loading the model named on the command line

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use blazerod_model::animation::AnimationClip;
use blazerod_model::loader::MARKER_FILES;
use blazerod_model::{BedrockModelLoader, LoadResult, Model};

/// Marker file plus the directory its paths are relative to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelLocation {
    pub marker: PathBuf,
    pub base: PathBuf,
}

/// Accept a model directory or a marker file inside one
pub fn locate(path: &Path) -> Result<ModelLocation> {
    if path.is_dir() {
        let marker = MARKER_FILES
            .iter()
            .map(|name| path.join(name))
            .find(|candidate| candidate.is_file())
            .with_context(|| {
                format!(
                    "No {} found in {}",
                    MARKER_FILES.join(" or "),
                    path.display()
                )
            })?;
        return Ok(ModelLocation {
            marker,
            base: path.to_path_buf(),
        });
    }

    if !BedrockModelLoader::is_marker(path) {
        bail!(
            "{} is neither a model directory nor one of: {}",
            path.display(),
            MARKER_FILES.join(", ")
        );
    }
    let base = path.parent().map(Path::to_path_buf).unwrap_or_default();
    Ok(ModelLocation {
        marker: path.to_path_buf(),
        base,
    })
}

pub fn load(path: &Path) -> Result<LoadResult> {
    let location = locate(path)?;
    tracing::info!("Loading model from {}", location.marker.display());
    BedrockModelLoader::default()
        .load(&location.marker, &location.base)
        .with_context(|| format!("Failed to load model {}", location.marker.display()))
}

pub fn require_model<'a>(result: &'a LoadResult, path: &Path) -> Result<&'a Model> {
    result
        .model
        .as_ref()
        .with_context(|| format!("{} has no main model", path.display()))
}

/// Clip by name, or the first clip when no name is given
pub fn find_clip<'a>(clips: &'a [AnimationClip], name: Option<&str>) -> Result<&'a AnimationClip> {
    match name {
        Some(name) => clips.iter().find(|clip| clip.name == name).with_context(|| {
            let names: Vec<&str> = clips.iter().map(|clip| clip.name.as_str()).collect();
            format!(
                "No animation '{}' (available: {})",
                name,
                if names.is_empty() {
                    "none".to_string()
                } else {
                    names.join(", ")
                }
            )
        }),
        None => clips.first().context("Model has no animations"),
    }
}
