use std::sync::Arc;

use glam::{Mat4, Quat, Vec3};
use serde_json::json;

use super::*;
use crate::geometry;
use crate::pose::Skeleton;

fn two_bone_model() -> Model {
    let document = json!({
        "format_version": "1.12.0",
        "minecraft:geometry": [{
            "description": { "identifier": "geometry.arm", "texture_width": 32, "texture_height": 32 },
            "bones": [
                { "name": "hand", "parent": "arm", "pivot": [0, 12, 0],
                  "cubes": [{ "origin": [0, 8, 0], "size": [2, 4, 2], "uv": [0, 0] }] },
                { "name": "arm", "pivot": [0, 24, 0],
                  "cubes": [{ "origin": [0, 12, 0], "size": [2, 12, 2], "uv": [8, 0] }] }
            ]
        }]
    });
    let compiled = geometry::compile(&document).unwrap();
    SceneAssembler::new(0.5, 0.9).assemble(&compiled).unwrap()
}

#[test]
fn test_scene_structure() {
    let model = two_bone_model();
    assert_eq!(model.scenes.len(), 1);
    assert_eq!(model.default_scene, Some(0));

    let scene = model.default_scene().unwrap();
    assert_eq!(scene.name, "geometry.arm");
    let transform = scene.transform.unwrap();
    let NodeTransform::Decomposed(transform) = transform else {
        panic!("scene root should be decomposed");
    };
    assert_eq!(transform.scale, Vec3::new(0.5, 0.9, 0.5));

    // arm is the root bone, Meshes comes last
    let roots: Vec<&str> = scene
        .nodes
        .iter()
        .map(|id| model.node(*id).unwrap().name.as_str())
        .collect();
    assert_eq!(roots, vec!["arm", "Meshes"]);
    let arm = model.node(scene.nodes[0]).unwrap();
    assert_eq!(arm.children, vec![NodeId(0)]);
    assert!(matches!(arm.transform, Some(NodeTransform::Bedrock(_))));
}

#[test]
fn test_skin_is_ordered_by_bone_index() {
    let model = two_bone_model();
    let mesh_node = model.mesh_node(model.default_scene().unwrap()).unwrap();
    let skin = &model.skins[mesh_node.skin().unwrap()];
    assert_eq!(skin.joints, vec![NodeId(0), NodeId(1)]);
    assert_eq!(skin.inverse_bind_matrices.len(), 2);

    // arm pivot at 24 px: inverse bind is the identity rotation around it
    let arm_inverse = skin.inverse_bind_matrices[1];
    assert!(arm_inverse.abs_diff_eq(Mat4::IDENTITY, 1e-6));
}

#[test]
fn test_primitive_accessors() {
    let model = two_bone_model();
    let mesh_node = model.mesh_node(model.default_scene().unwrap()).unwrap();
    let mesh = mesh_node.mesh().unwrap();
    let primitive = &mesh.primitives[0];

    assert_eq!(primitive.vertex_count(), 48);
    assert_eq!(primitive.material, Material::default());
    assert_eq!(primitive.material.name(), "default");

    let attributes = &primitive.attributes;
    assert_eq!(attributes.position.buffer_view.byte_stride, 56);
    assert_eq!(attributes.normal.as_ref().unwrap().byte_offset, 12);
    assert_eq!(attributes.texcoords[0].byte_offset, 24);
    assert_eq!(attributes.joints[0].byte_offset, 32);
    assert_eq!(attributes.weights[0].byte_offset, 40);

    let vertices = primitive.read_vertices().unwrap();
    assert_eq!(vertices.len(), 48);
    // Cubes are bound to their declaring bone, in declaration order
    assert_eq!(vertices[0].joint[0], 0);
    assert_eq!(vertices[24].joint[0], 1);
    assert_eq!(
        attributes.position.read_f32(0).unwrap()[..3],
        vertices[0].position[..]
    );

    let indices = primitive.indices.as_ref().unwrap().read_u16().unwrap();
    assert_eq!(indices.len(), 72);
    assert_eq!(indices[36], 24);
}

#[test]
fn test_texture_becomes_vanilla_material() {
    let document = json!({
        "format_version": "1.12.0",
        "minecraft:geometry": [{
            "description": { "identifier": "g" },
            "bones": [{ "name": "b", "cubes": [{ "size": [1, 1, 1] }] }]
        }]
    });
    let compiled = geometry::compile(&document).unwrap();
    let texture = Texture {
        name: "skin.png".into(),
        data: Arc::from(&b"not really a png"[..]),
        sampler: Sampler::default(),
    };
    let model = SceneAssembler::default()
        .with_texture(texture)
        .assemble(&compiled)
        .unwrap();
    let primitive = &model.mesh_node(&model.scenes[0]).unwrap().mesh().unwrap().primitives[0];
    assert!(matches!(primitive.material, Material::Vanilla { .. }));
    assert_eq!(primitive.material.base_color_texture().unwrap().sampler.mag_filter, Filter::Nearest);

    let NodeTransform::Decomposed(transform) = model.scenes[0].transform.unwrap() else {
        panic!("scene root should be decomposed");
    };
    assert_eq!(transform.scale, Vec3::splat(DEFAULT_WIDTH_SCALE));
}

#[test]
fn test_geometry_without_cubes_keeps_mesh_node() {
    let document = json!({
        "format_version": "1.12.0",
        "minecraft:geometry": [{ "description": { "identifier": "g" }, "bones": [{ "name": "b" }] }]
    });
    let model = SceneAssembler::default()
        .assemble(&geometry::compile(&document).unwrap())
        .unwrap();
    let scene = &model.scenes[0];
    let roots: Vec<&str> = scene
        .nodes
        .iter()
        .map(|id| model.node(*id).unwrap().name.as_str())
        .collect();
    assert_eq!(roots, vec!["b", "Meshes"]);

    let mesh_node = model.mesh_node(scene).unwrap();
    assert!(mesh_node.mesh().unwrap().primitives.is_empty());
    assert_eq!(model.skins.len(), 1);
    assert_eq!(Skeleton::from_model(&model).unwrap().len(), 1);
}

#[test]
fn test_rest_pose_joint_matrices_are_identity() {
    let model = two_bone_model();
    let skeleton = Skeleton::from_model(&model).unwrap();
    assert_eq!(skeleton.len(), 2);
    assert_eq!(skeleton.joints()[0].parent, Some(1));

    let pose = skeleton.rest_pose();
    for matrix in skeleton.joint_matrices(&pose) {
        assert!(matrix.abs_diff_eq(Mat4::IDENTITY, 1e-5));
    }
}

#[test]
fn test_parent_rotation_moves_child() {
    let model = two_bone_model();
    let skeleton = Skeleton::from_model(&model).unwrap();
    let mut pose = skeleton.rest_pose();
    let arm = pose.joint_index("arm").unwrap();
    pose.blend_rotation(arm, Quat::from_rotation_z(std::f32::consts::FRAC_PI_2), 1.0);

    let matrices = skeleton.joint_matrices(&pose);
    // The hand hangs 12 px below the arm pivot; a quarter turn swings it sideways
    let hand_pivot = Vec3::new(0.0, 0.75, 0.0);
    let moved = matrices[0].transform_point3(hand_pivot);
    assert!(moved.abs_diff_eq(Vec3::new(0.75, 1.5, 0.0), 1e-5));
    // The arm pivot itself stays put
    let arm_pivot = Vec3::new(0.0, 1.5, 0.0);
    assert!(matrices[1].transform_point3(arm_pivot).abs_diff_eq(arm_pivot, 1e-5));
}
