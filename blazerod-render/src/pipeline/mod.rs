//! Render pipeline variants
//!
//! A pipeline is identified by its material descriptor plus a small bitset of
//! variant flags (double sided, skinned, instanced, morphed). Each variant
//! expands into a [`PipelineSpec`]: shader paths, preprocessor defines and the
//! named bindings the shader declares. The host turns specs into real
//! pipelines through a [`PipelineCompiler`]; the [`PipelineVariantCache`]
//! makes sure every variant is compiled once.

mod cache;
mod variant;

pub use cache::PipelineVariantCache;
pub use variant::{ComputeVariant, ShaderOptions, VertexVariant};

use std::sync::Arc;

/// Texel format of a texture-buffer binding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TexelFormat {
    Rgba32Float,
    Rg32Float,
    R32Sint,
    R32Float,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UniformKind {
    UniformBuffer,
    TexelBuffer(TexelFormat),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UniformBinding {
    pub name: &'static str,
    pub kind: UniformKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ShaderStages {
    Render { vertex: String, fragment: String },
    Compute { shader: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ShaderDefine {
    pub name: &'static str,
    pub value: Option<String>,
}

/// Everything needed to compile one pipeline variant
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PipelineSpec {
    pub label: String,
    pub stages: ShaderStages,
    pub defines: Vec<ShaderDefine>,
    pub storage_buffers: Vec<&'static str>,
    pub uniforms: Vec<UniformBinding>,
    pub samplers: Vec<&'static str>,
    /// Back-face culling
    pub cull: bool,
    pub translucent: bool,
}

impl PipelineSpec {
    pub(crate) fn new(label: String, stages: ShaderStages) -> Self {
        Self {
            label,
            stages,
            defines: Vec::new(),
            storage_buffers: Vec::new(),
            uniforms: Vec::new(),
            samplers: Vec::new(),
            cull: true,
            translucent: false,
        }
    }

    pub(crate) fn define(&mut self, name: &'static str) {
        self.defines.push(ShaderDefine { name, value: None });
    }

    pub(crate) fn define_value(&mut self, name: &'static str, value: impl ToString) {
        self.defines.push(ShaderDefine {
            name,
            value: Some(value.to_string()),
        });
    }

    pub(crate) fn uniform(&mut self, name: &'static str, kind: UniformKind) {
        self.uniforms.push(UniformBinding { name, kind });
    }

    pub fn has_define(&self, name: &str) -> bool {
        self.defines.iter().any(|define| define.name == name)
    }

    /// Value of a valued define, `None` if absent or a plain flag
    pub fn define_value_of(&self, name: &str) -> Option<&str> {
        self.defines
            .iter()
            .find(|define| define.name == name)
            .and_then(|define| define.value.as_deref())
    }

    pub fn has_storage_buffer(&self, name: &str) -> bool {
        self.storage_buffers.contains(&name)
    }

    pub fn uniform_kind(&self, name: &str) -> Option<UniformKind> {
        self.uniforms
            .iter()
            .find(|uniform| uniform.name == name)
            .map(|uniform| uniform.kind)
    }

    /// Binding names in declaration order: storage buffers, uniforms, samplers
    pub fn binding_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.storage_buffers
            .iter()
            .copied()
            .chain(self.uniforms.iter().map(|uniform| uniform.name))
            .chain(self.samplers.iter().copied())
    }
}

/// Turns a pipeline spec into an API pipeline object
pub trait PipelineCompiler {
    type Pipeline;

    fn compile(&mut self, spec: &PipelineSpec) -> Self::Pipeline;
}

/// Compiler that keeps the spec itself, for dry runs and tests
#[derive(Debug, Default)]
pub struct SpecCompiler {
    compiled: usize,
}

impl SpecCompiler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of pipelines compiled so far
    pub fn compiled(&self) -> usize {
        self.compiled
    }
}

impl PipelineCompiler for SpecCompiler {
    type Pipeline = Arc<PipelineSpec>;

    fn compile(&mut self, spec: &PipelineSpec) -> Arc<PipelineSpec> {
        self.compiled += 1;
        tracing::debug!("Compiled pipeline spec '{}'", spec.label);
        Arc::new(spec.clone())
    }
}
