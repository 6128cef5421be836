//! Inspect command - summarize a model directory

use std::io::Cursor;
use std::path::PathBuf;

use anyhow::Result;
use blazerod_model::metadata::ModelInfo;
use blazerod_model::scene::{Material, Model};
use blazerod_model::{LoadResult, Skeleton};
use clap::Args;

use crate::model;

#[derive(Args)]
pub struct InspectArgs {
    /// Model directory or marker file
    pub model: PathBuf,

    /// List every bone with its parent
    #[arg(short, long)]
    pub bones: bool,
}

pub fn execute(args: InspectArgs) -> Result<()> {
    let result = model::load(&args.model)?;

    print_info(result.metadata.as_ref());
    match result.model.as_ref() {
        Some(model) => print_model(model, args.bones),
        None => println!("No model"),
    }
    print_animations(&result);
    print_textures(&result);
    Ok(())
}

fn print_info(info: Option<&ModelInfo>) {
    let Some(info) = info else {
        println!("Name: (unnamed)");
        return;
    };
    println!("Name: {}", info.name);
    if let Some(tips) = &info.tips {
        println!("Tips: {}", tips);
    }
    for author in info.authors.iter().flatten() {
        match &author.role {
            Some(role) => println!("Author: {} ({})", author.name, role),
            None => println!("Author: {}", author.name),
        }
    }
    if let Some(license) = &info.license {
        println!("License: {}", license.kind);
    }
    if let Some(home) = info.link.as_ref().and_then(|link| link.home.as_ref()) {
        println!("Home: {}", home);
    }
}

fn print_model(model: &Model, bones: bool) {
    for (index, scene) in model.scenes.iter().enumerate() {
        let marker = if model.default_scene == Some(index) {
            " (default)"
        } else {
            ""
        };
        println!(
            "Scene: {}{}, {} nodes",
            scene.name,
            marker,
            model.walk_scene(scene).len()
        );
        let Some(mesh) = model.mesh_node(scene).and_then(|node| node.mesh()) else {
            continue;
        };
        for (primitive_index, primitive) in mesh.primitives.iter().enumerate() {
            let kind = match primitive.material {
                Material::Unlit { .. } => "unlit",
                Material::Vanilla { .. } => "vanilla",
            };
            let indices = primitive
                .indices
                .as_ref()
                .map_or(0, |accessor| accessor.count);
            println!(
                "  Primitive {}: {} vertices, {} indices, {} material '{}'",
                primitive_index,
                primitive.vertex_count(),
                indices,
                kind,
                primitive.material.name()
            );
        }
    }

    let Some(skeleton) = Skeleton::from_model(model) else {
        println!("Bones: 0");
        return;
    };
    println!("Bones: {}", skeleton.len());
    if bones {
        for joint in skeleton.joints() {
            match joint.parent.and_then(|parent| skeleton.joints().get(parent)) {
                Some(parent) => println!("  {} <- {}", joint.name, parent.name),
                None => println!("  {}", joint.name),
            }
        }
    }
}

fn print_animations(result: &LoadResult) {
    println!("Animations: {}", result.animations.len());
    for clip in &result.animations {
        println!(
            "  {}: {:.2}s, {:?}, {} channels",
            clip.name,
            clip.duration,
            clip.loop_mode,
            clip.channels.len()
        );
    }
}

fn print_textures(result: &LoadResult) {
    println!("Textures: {}", result.textures.len());
    for texture in &result.textures {
        match texture_dimensions(&texture.data) {
            Ok((width, height)) => println!(
                "  {}: {}x{}, {} bytes",
                texture.name,
                width,
                height,
                texture.data.len()
            ),
            Err(e) => {
                tracing::warn!("Failed to decode texture {}: {}", texture.name, e);
                println!(
                    "  {}: undecodable, {} bytes",
                    texture.name,
                    texture.data.len()
                );
            }
        }
    }
}

/// Read the image header without decoding pixels
fn texture_dimensions(data: &[u8]) -> image::ImageResult<(u32, u32)> {
    image::ImageReader::new(Cursor::new(data))
        .with_guessed_format()?
        .into_dimensions()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_texture_dimensions() {
        let mut png = Vec::new();
        image::RgbaImage::new(4, 2)
            .write_to(&mut Cursor::new(&mut png), image::ImageFormat::Png)
            .unwrap();
        assert_eq!(texture_dimensions(&png).unwrap(), (4, 2));
        assert!(texture_dimensions(b"\x89PNG fake pixels").is_err());
    }
}
