//! Renderer configuration (TOML)
//!
//! ```toml
//! preferred_renderer = "compute_shader"
//! ring_depth = 3
//! cpu_parallel_threshold = 1000
//! instance_size = 64
//! compute_local_size = 256
//! max_enabled_morph_targets = 32
//! ```
//! Every key is optional.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::caps::RendererKind;
use crate::error::{RenderError, Result};
use crate::pool::DEFAULT_RING_DEPTH;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RendererConfig {
    /// Strategy to use when the device supports it (default: vertex_transform)
    #[serde(default)]
    pub preferred_renderer: RendererKind,
    /// Ring slots per shader data pool (default: 3, minimum 2)
    #[serde(default = "default_ring_depth")]
    pub ring_depth: usize,
    /// Vertex count above which the CPU path fans out (default: 1000)
    #[serde(default = "default_cpu_parallel_threshold")]
    pub cpu_parallel_threshold: usize,
    /// Maximum tasks per instanced draw (default: 64)
    #[serde(default = "default_instance_size")]
    pub instance_size: usize,
    /// Compute workgroup size (default: 256)
    #[serde(default = "default_compute_local_size")]
    pub compute_local_size: u32,
    /// Morph targets blended per vertex (default: 32)
    #[serde(default = "default_max_enabled_morph_targets")]
    pub max_enabled_morph_targets: usize,
}

fn default_ring_depth() -> usize {
    DEFAULT_RING_DEPTH
}
fn default_cpu_parallel_threshold() -> usize {
    1000
}
fn default_instance_size() -> usize {
    64
}
fn default_compute_local_size() -> u32 {
    256
}
fn default_max_enabled_morph_targets() -> usize {
    32
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            preferred_renderer: RendererKind::default(),
            ring_depth: default_ring_depth(),
            cpu_parallel_threshold: default_cpu_parallel_threshold(),
            instance_size: default_instance_size(),
            compute_local_size: default_compute_local_size(),
            max_enabled_morph_targets: default_max_enabled_morph_targets(),
        }
    }
}

impl RendererConfig {
    /// Load from a TOML file; a missing file yields the defaults
    pub fn load(path: &Path) -> Result<Self> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!("No renderer config at {}, using defaults", path.display());
                return Ok(Self::default());
            }
            Err(source) => {
                return Err(RenderError::ConfigIo {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };
        toml::from_str(&content).map_err(|source| RenderError::Config {
            path: path.to_path_buf(),
            source,
        })
    }
}
