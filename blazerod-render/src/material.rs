//! Render-side view of model materials

use std::fmt;
use std::sync::Arc;

use blazerod_model::scene::{Material, Texture};
use glam::Vec4;

/// Shader family a material is drawn with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MaterialDescriptor {
    /// Translucent, texture optional, no lighting
    Unlit,
    /// Entity shading with overlay and diffuse lighting
    Vanilla,
}

impl MaterialDescriptor {
    /// Value of the `INPUT_MATERIAL` shader define
    pub fn id(&self) -> u32 {
        match self {
            MaterialDescriptor::Unlit => 0,
            MaterialDescriptor::Vanilla => 1,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            MaterialDescriptor::Unlit => "unlit",
            MaterialDescriptor::Vanilla => "vanilla",
        }
    }

    /// Name of the per-draw uniform block carrying the material parameters
    pub fn uniform_block(&self) -> &'static str {
        match self {
            MaterialDescriptor::Unlit => "UnlitData",
            MaterialDescriptor::Vanilla => "VanillaData",
        }
    }
}

impl fmt::Display for MaterialDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RenderMaterial {
    pub descriptor: MaterialDescriptor,
    pub name: String,
    pub base_color: Vec4,
    pub texture: Option<Arc<Texture>>,
    /// Bedrock cubes are closed boxes, so models never request this
    pub double_sided: bool,
    pub skinned: bool,
    pub morphed: bool,
}

impl RenderMaterial {
    pub fn new(material: &Material, skinned: bool, morphed: bool) -> Self {
        let descriptor = match material {
            Material::Unlit { .. } => MaterialDescriptor::Unlit,
            Material::Vanilla { .. } => MaterialDescriptor::Vanilla,
        };
        Self {
            descriptor,
            name: material.name().to_string(),
            base_color: material.base_color(),
            texture: material.base_color_texture().cloned(),
            double_sided: false,
            skinned,
            morphed,
        }
    }

    /// Material block as uploaded to `UnlitData` / `VanillaData`
    pub fn uniform_bytes(&self) -> [u8; 16] {
        bytemuck::cast(self.base_color.to_array())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_material_from_model() {
        let unlit = RenderMaterial::new(&Material::default(), false, false);
        assert_eq!(unlit.descriptor, MaterialDescriptor::Unlit);
        assert_eq!(unlit.name, "default");
        assert!(unlit.texture.is_none());
        assert!(!unlit.double_sided);

        let texture = Arc::new(Texture {
            name: "skin".to_string(),
            data: Arc::from(&b"png"[..]),
            sampler: Default::default(),
        });
        let vanilla = Material::Vanilla {
            name: "body".to_string(),
            base_color: Vec4::new(1.0, 0.5, 0.25, 1.0),
            base_color_texture: Arc::clone(&texture),
        };
        let material = RenderMaterial::new(&vanilla, true, false);
        assert_eq!(material.descriptor, MaterialDescriptor::Vanilla);
        assert_eq!(material.descriptor.uniform_block(), "VanillaData");
        assert_eq!(material.texture, Some(texture));
        assert!(material.skinned);
        let color: [f32; 4] = bytemuck::cast(material.uniform_bytes());
        assert_eq!(color, [1.0, 0.5, 0.25, 1.0]);
    }
}
