//! Variant flags and their pipeline specs

use crate::caps::DeviceCapabilities;
use crate::config::RendererConfig;
use crate::material::{MaterialDescriptor, RenderMaterial};

use super::{PipelineSpec, ShaderStages, TexelFormat, UniformKind};

const NAMESPACE: &str = "blazerod";

/// Device and config values baked into shader defines
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShaderOptions {
    /// Vertex path reads its data from storage buffers instead of texel buffers
    pub ssbo: bool,
    pub instance_size: usize,
    pub compute_local_size: u32,
    pub max_enabled_morph_targets: usize,
}

impl ShaderOptions {
    pub fn new(caps: &DeviceCapabilities, config: &RendererConfig) -> Self {
        Self {
            ssbo: caps.vertex_ssbo(),
            instance_size: config.instance_size.max(1),
            compute_local_size: config.compute_local_size.max(1),
            max_enabled_morph_targets: config.max_enabled_morph_targets,
        }
    }
}

impl Default for ShaderOptions {
    fn default() -> Self {
        Self::new(&DeviceCapabilities::default(), &RendererConfig::default())
    }
}

bitflags::bitflags! {
    /// Variant flags of the vertex-shader transform pipelines
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct VertexVariant: u32 {
        const DOUBLE_SIDED = 1 << 0;
        const SKINNED = 1 << 1;
        const INSTANCED = 1 << 2;
        const MORPHED = 1 << 3;
    }
}

bitflags::bitflags! {
    /// Variant flags of the compute transform pipelines
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ComputeVariant: u32 {
        const SKINNED = 1 << 0;
        /// Target vertices use the 64-byte shader-pack layout
        const IRIS_VERTEX_FORMAT = 1 << 1;
        const MORPHED = 1 << 2;
    }
}

fn morph_bindings(spec: &mut PipelineSpec, options: &ShaderOptions, ssbo: bool) {
    spec.define("MORPHED");
    spec.define_value("MAX_ENABLED_MORPH_TARGETS", options.max_enabled_morph_targets);
    spec.uniform("MorphData", UniformKind::UniformBuffer);
    if ssbo {
        spec.storage_buffers.extend([
            "MorphPositionBlock",
            "MorphColorBlock",
            "MorphTexCoordBlock",
            "MorphTargetIndicesData",
            "MorphWeightsData",
        ]);
    } else {
        spec.uniform("MorphPositionData", UniformKind::TexelBuffer(TexelFormat::Rgba32Float));
        spec.uniform("MorphColorData", UniformKind::TexelBuffer(TexelFormat::Rgba32Float));
        spec.uniform("MorphTexCoordData", UniformKind::TexelBuffer(TexelFormat::Rg32Float));
        spec.uniform("MorphTargetIndices", UniformKind::TexelBuffer(TexelFormat::R32Sint));
        spec.uniform("MorphWeights", UniformKind::TexelBuffer(TexelFormat::R32Float));
    }
}

impl VertexVariant {
    pub fn of(material: &RenderMaterial, instanced: bool) -> Self {
        let mut variant = VertexVariant::empty();
        variant.set(VertexVariant::DOUBLE_SIDED, material.double_sided);
        variant.set(VertexVariant::SKINNED, material.skinned);
        variant.set(VertexVariant::INSTANCED, instanced);
        variant.set(VertexVariant::MORPHED, material.morphed);
        variant
    }

    /// `_cull` or `_no_cull`, then one suffix per set flag
    pub fn name_suffix(&self) -> String {
        let mut suffix = String::from(if self.contains(VertexVariant::DOUBLE_SIDED) {
            "_no_cull"
        } else {
            "_cull"
        });
        if self.contains(VertexVariant::SKINNED) {
            suffix.push_str("_skinned");
        }
        if self.contains(VertexVariant::INSTANCED) {
            suffix.push_str("_instanced");
        }
        if self.contains(VertexVariant::MORPHED) {
            suffix.push_str("_morphed");
        }
        suffix
    }

    pub fn spec(&self, descriptor: MaterialDescriptor, options: &ShaderOptions) -> PipelineSpec {
        let shader = format!("{}:core/{}", NAMESPACE, descriptor.name());
        let mut spec = PipelineSpec::new(
            format!("{}:{}{}", NAMESPACE, descriptor.name(), self.name_suffix()),
            ShaderStages::Render {
                vertex: shader.clone(),
                fragment: shader,
            },
        );
        spec.cull = !self.contains(VertexVariant::DOUBLE_SIDED);
        spec.uniform("Projection", UniformKind::UniformBuffer);
        if options.ssbo {
            spec.define("SUPPORT_SSBO");
        }

        if self.contains(VertexVariant::MORPHED) {
            morph_bindings(&mut spec, options, options.ssbo);
        }
        if self.contains(VertexVariant::SKINNED) {
            spec.define("SKINNED");
            spec.uniform("SkinModelIndices", UniformKind::UniformBuffer);
            if options.ssbo {
                spec.storage_buffers.push("JointsData");
            } else {
                spec.uniform("Joints", UniformKind::TexelBuffer(TexelFormat::Rgba32Float));
            }
        }

        spec.uniform("InstanceData", UniformKind::UniformBuffer);
        if options.ssbo {
            spec.storage_buffers.push("LocalMatricesData");
        } else {
            spec.uniform("LocalMatrices", UniformKind::TexelBuffer(TexelFormat::Rgba32Float));
        }
        spec.define_value("INSTANCE_SIZE", options.instance_size);
        if self.contains(VertexVariant::INSTANCED) {
            spec.define("INSTANCED");
        }

        spec.samplers.extend(["SamplerBaseColor", "SamplerLightMap"]);
        spec.uniform(descriptor.uniform_block(), UniformKind::UniformBuffer);
        match descriptor {
            MaterialDescriptor::Unlit => spec.translucent = true,
            MaterialDescriptor::Vanilla => {
                spec.samplers.push("SamplerOverlay");
                spec.uniform("Lighting", UniformKind::UniformBuffer);
            }
        }
        spec
    }
}

impl ComputeVariant {
    pub fn of(material: &RenderMaterial, iris_vertex_format: bool) -> Self {
        let mut variant = ComputeVariant::empty();
        variant.set(ComputeVariant::SKINNED, material.skinned);
        variant.set(ComputeVariant::IRIS_VERTEX_FORMAT, iris_vertex_format);
        variant.set(ComputeVariant::MORPHED, material.morphed);
        variant
    }

    pub fn name_suffix(&self) -> String {
        let mut suffix = String::new();
        if self.contains(ComputeVariant::SKINNED) {
            suffix.push_str("_skinned");
        }
        if self.contains(ComputeVariant::IRIS_VERTEX_FORMAT) {
            suffix.push_str("_iris");
        }
        if self.contains(ComputeVariant::MORPHED) {
            suffix.push_str("_morphed");
        }
        suffix
    }

    pub fn spec(&self, descriptor: MaterialDescriptor, options: &ShaderOptions) -> PipelineSpec {
        let mut spec = PipelineSpec::new(
            format!(
                "{}:vertex_transform_{}{}",
                NAMESPACE,
                descriptor.name(),
                self.name_suffix()
            ),
            ShaderStages::Compute {
                shader: format!("{}:compute/vertex_transform", NAMESPACE),
            },
        );
        spec.define("SUPPORT_SSBO");
        spec.define("COMPUTE_SHADER");
        spec.storage_buffers
            .extend(["SourceVertexData", "TargetVertexData"]);
        if self.contains(ComputeVariant::IRIS_VERTEX_FORMAT) {
            spec.define("IRIS_VERTEX_FORMAT");
        }
        if self.contains(ComputeVariant::MORPHED) {
            morph_bindings(&mut spec, options, true);
        }
        if self.contains(ComputeVariant::SKINNED) {
            spec.define("SKINNED");
            spec.uniform("SkinModelIndices", UniformKind::UniformBuffer);
            spec.storage_buffers.push("JointsData");
        }
        spec.uniform("ComputeData", UniformKind::UniformBuffer);
        spec.define_value("INSTANCE_SIZE", options.instance_size);
        spec.define_value("COMPUTE_LOCAL_SIZE", options.compute_local_size);
        spec.define_value("INPUT_MATERIAL", descriptor.id());
        spec
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn material(skinned: bool, morphed: bool) -> RenderMaterial {
        RenderMaterial::new(&Default::default(), skinned, morphed)
    }

    #[test]
    fn test_vertex_variant_bits() {
        assert_eq!(VertexVariant::of(&material(false, false), false).bits(), 0);
        let variant = VertexVariant::of(&material(true, true), true);
        assert_eq!(variant.bits(), 0b1110);
        assert_eq!(variant.name_suffix(), "_cull_skinned_instanced_morphed");
        assert_eq!(VertexVariant::DOUBLE_SIDED.name_suffix(), "_no_cull");
    }

    #[test]
    fn test_vertex_spec_with_ssbo() {
        let options = ShaderOptions::default();
        let spec = (VertexVariant::SKINNED | VertexVariant::INSTANCED)
            .spec(MaterialDescriptor::Vanilla, &options);

        assert_eq!(spec.label, "blazerod:vanilla_cull_skinned_instanced");
        assert!(spec.cull);
        assert!(spec.has_define("SUPPORT_SSBO"));
        assert!(spec.has_define("SKINNED"));
        assert!(spec.has_define("INSTANCED"));
        assert!(!spec.has_define("MORPHED"));
        assert_eq!(spec.define_value_of("INSTANCE_SIZE"), Some("64"));
        assert!(spec.has_storage_buffer("JointsData"));
        assert!(spec.has_storage_buffer("LocalMatricesData"));
        assert_eq!(spec.uniform_kind("VanillaData"), Some(UniformKind::UniformBuffer));
        assert_eq!(spec.uniform_kind("Lighting"), Some(UniformKind::UniformBuffer));
        assert!(spec.samplers.contains(&"SamplerOverlay"));
    }

    #[test]
    fn test_vertex_spec_with_texel_buffers() {
        let options = ShaderOptions {
            ssbo: false,
            ..ShaderOptions::default()
        };
        let spec = (VertexVariant::SKINNED | VertexVariant::MORPHED | VertexVariant::DOUBLE_SIDED)
            .spec(MaterialDescriptor::Unlit, &options);

        assert!(!spec.cull);
        assert!(spec.translucent);
        assert!(!spec.has_define("SUPPORT_SSBO"));
        assert!(spec.storage_buffers.is_empty());
        assert_eq!(
            spec.uniform_kind("Joints"),
            Some(UniformKind::TexelBuffer(TexelFormat::Rgba32Float))
        );
        assert_eq!(
            spec.uniform_kind("MorphTexCoordData"),
            Some(UniformKind::TexelBuffer(TexelFormat::Rg32Float))
        );
        assert_eq!(spec.define_value_of("MAX_ENABLED_MORPH_TARGETS"), Some("32"));
        assert!(!spec.samplers.contains(&"SamplerOverlay"));
    }

    #[test]
    fn test_compute_spec() {
        let options = ShaderOptions::default();
        let variant = ComputeVariant::of(&material(true, false), true);
        assert_eq!(variant.bits(), 0b011);

        let spec = variant.spec(MaterialDescriptor::Vanilla, &options);
        assert_eq!(spec.label, "blazerod:vertex_transform_vanilla_skinned_iris");
        assert!(matches!(spec.stages, ShaderStages::Compute { .. }));
        assert!(spec.has_define("COMPUTE_SHADER"));
        assert!(spec.has_define("IRIS_VERTEX_FORMAT"));
        assert_eq!(spec.define_value_of("COMPUTE_LOCAL_SIZE"), Some("256"));
        assert_eq!(spec.define_value_of("INPUT_MATERIAL"), Some("1"));
        assert_eq!(
            spec.binding_names().take(3).collect::<Vec<_>>(),
            ["SourceVertexData", "TargetVertexData", "JointsData"]
        );
    }
}
