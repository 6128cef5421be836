//! Integration tests for the blazerod binary
//!
//! Writes a small model directory, runs each command and checks its output

use std::fs;
use std::io::Cursor;
use std::path::Path;
use std::process::{Command, Output};

use tempfile::{TempDir, tempdir};

const METADATA: &str = r#"{
    "spec": 2,
    "metadata": { "name": "Cube Person", "authors": [ { "name": "tester", "role": "modeler" } ] },
    "properties": { "width_scale": 1.0, "height_scale": 1.0 },
    "files": {
        "player": {
            "model": { "main": "models/main.json" },
            "animation": { "main": "animations/main.json" },
            "texture": [ "textures/skin.png" ]
        }
    }
}"#;

const GEOMETRY: &str = r#"{
    "format_version": "1.12.0",
    "minecraft:geometry": [{
        "description": { "identifier": "geometry.person", "texture_width": 64, "texture_height": 64 },
        "bones": [
            { "name": "body", "pivot": [0, 0, 0] },
            { "name": "head", "parent": "body", "pivot": [0, 24, 0],
              "cubes": [ { "origin": [-4, 24, -4], "size": [8, 8, 8], "uv": [0, 0] } ] }
        ]
    }]
}"#;

const ANIMATION: &str = r#"{
    "format_version": "1.8.0",
    "animations": {
        "animation.person.nod": {
            "loop": true,
            "bones": {
                "head": { "rotation": { "0.0": [0, 0, 0], "0.5": [20, 0, 0], "1.0": [0, 0, 0] } }
            }
        }
    }
}"#;

fn write(dir: &Path, name: &str, contents: &[u8]) {
    let path = dir.join(name);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, contents).unwrap();
}

fn model_dir() -> TempDir {
    let dir = tempdir().expect("Failed to create temp dir");
    let mut png = Vec::new();
    image::RgbaImage::new(4, 4)
        .write_to(&mut Cursor::new(&mut png), image::ImageFormat::Png)
        .unwrap();

    write(dir.path(), "ysm.json", METADATA.as_bytes());
    write(dir.path(), "models/main.json", GEOMETRY.as_bytes());
    write(dir.path(), "animations/main.json", ANIMATION.as_bytes());
    write(dir.path(), "textures/skin.png", &png);
    dir
}

fn blazerod(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_blazerod"))
        .args(args)
        .env("RUST_LOG", "warn")
        .output()
        .expect("Failed to run blazerod")
}

fn stdout(output: &Output) -> String {
    assert!(
        output.status.success(),
        "blazerod failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8(output.stdout.clone()).unwrap()
}

#[test]
fn test_inspect() {
    let dir = model_dir();
    let output = stdout(&blazerod(&["inspect", dir.path().to_str().unwrap(), "--bones"]));

    assert!(output.contains("Name: Cube Person"));
    assert!(output.contains("Author: tester (modeler)"));
    assert!(output.contains("Scene: geometry.person (default)"));
    assert!(output.contains("24 vertices, 36 indices"));
    assert!(output.contains("Bones: 2"));
    assert!(output.contains("head <- body"));
    assert!(output.contains("animation.person.nod: 1.00s, Loop, 1 channels"));
    assert!(output.contains("textures/skin.png: 4x4"));
}

#[test]
fn test_inspect_marker_file() {
    let dir = model_dir();
    let marker = dir.path().join("ysm.json");
    let output = stdout(&blazerod(&["inspect", marker.to_str().unwrap()]));
    assert!(output.contains("Bones: 2"));
}

#[test]
fn test_inspect_rejects_other_files() {
    let dir = model_dir();
    let path = dir.path().join("models/main.json");
    let output = blazerod(&["inspect", path.to_str().unwrap()]);
    assert!(!output.status.success());
}

#[test]
fn test_animate_json() {
    let dir = model_dir();
    let output = stdout(&blazerod(&[
        "animate",
        dir.path().to_str().unwrap(),
        "--fps",
        "2",
        "--json",
    ]));
    let value: serde_json::Value = serde_json::from_str(&output).unwrap();

    assert_eq!(value["animation"], "animation.person.nod");
    let samples = value["samples"].as_array().unwrap();
    assert_eq!(samples.len(), 3);

    let middle = &samples[1];
    assert_eq!(middle["state"], "Playing");
    let head = middle["bones"]["head"]["rotation"].as_array().unwrap();
    assert!(head[0].as_f64().unwrap().abs() > 0.1);
    let body = middle["bones"]["body"]["rotation"].as_array().unwrap();
    assert!(body[0].as_f64().unwrap().abs() < 1e-4);
}

#[test]
fn test_animate_unknown_clip() {
    let dir = model_dir();
    let output = blazerod(&["animate", dir.path().to_str().unwrap(), "-a", "missing"]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("No animation 'missing'"));
    assert!(stderr.contains("animation.person.nod"));
}

#[test]
fn test_render_vertex_shader_instanced() {
    let dir = model_dir();
    let output = stdout(&blazerod(&[
        "render",
        dir.path().to_str().unwrap(),
        "-r",
        "vertex_transform",
        "-i",
        "3",
        "--schedule",
    ]));
    assert!(output.contains("Renderer: vertex_transform"));
    assert!(output.contains("Frame 0: 0 dispatches, 0 barriers, 1 draws, 3 instances"));
}

#[test]
fn test_render_compute_frames() {
    let dir = model_dir();
    let output = stdout(&blazerod(&[
        "render",
        dir.path().to_str().unwrap(),
        "-r",
        "compute_shader",
        "-i",
        "2",
        "-f",
        "3",
        "-a",
        "animation.person.nod",
    ]));
    assert!(output.contains("Renderer: compute_shader"));
    for frame in 0..3 {
        assert!(output.contains(&format!(
            "Frame {}: 2 dispatches, 2 barriers, 2 draws, 2 instances",
            frame
        )));
    }

    let scheduled = stdout(&blazerod(&[
        "render",
        dir.path().to_str().unwrap(),
        "-r",
        "compute_shader",
        "-i",
        "2",
        "--schedule",
    ]));
    assert!(scheduled.contains("Frame 0: 2 dispatches, 1 barriers, 2 draws, 2 instances"));
}

#[test]
fn test_render_minimal_device_falls_back_to_cpu() {
    let dir = model_dir();
    let config = dir.path().join("renderer.toml");
    fs::write(&config, "preferred_renderer = \"compute_shader\"\n").unwrap();

    let output = stdout(&blazerod(&[
        "render",
        dir.path().to_str().unwrap(),
        "-c",
        config.to_str().unwrap(),
        "--minimal-device",
        "-i",
        "2",
        "--schedule",
    ]));
    assert!(output.contains("Renderer: cpu_transform"));
    assert!(output.contains("Frame 0: 0 dispatches, 0 barriers, 2 draws, 2 instances"));
    assert!(output.contains("Pipelines: 0"));
}

#[test]
fn test_render_rejects_unknown_renderer() {
    let dir = model_dir();
    let output = blazerod(&["render", dir.path().to_str().unwrap(), "-r", "raytrace"]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("Unknown renderer 'raytrace'"));
}
