//! Record whole frames of a loaded model with every transform strategy

use std::fs;
use std::sync::Arc;

use blazerod_model::{BedrockModelLoader, Model};
use blazerod_render::caps::{DeviceCapabilities, RendererKind};
use blazerod_render::pipeline::{ComputeVariant, SpecCompiler, VertexVariant};
use blazerod_render::scene::MorphTargets;
use blazerod_render::transform::{
    BufferRef, Command, ComputeShaderRenderer, CpuTransformRenderer, EntityVertex, PipelineId,
    VertexShaderRenderer,
};
use blazerod_render::{
    FrameCommands, MaterialDescriptor, MemoryBackend, RenderError, RenderScene, RendererConfig,
    TransformRenderer,
};
use glam::{Mat4, Vec2, Vec3};

const METADATA: &str = r#"{
    "spec": 2,
    "properties": { "width_scale": 1.0, "height_scale": 1.0 },
    "files": {
        "player": {
            "model": { "main": "models/main.json" },
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

fn entity_vertices(bytes: &[u8]) -> Vec<EntityVertex> {
    bytes
        .chunks_exact(std::mem::size_of::<EntityVertex>())
        .map(bytemuck::pod_read_unaligned)
        .collect()
}

fn load_model() -> Model {
    let dir = tempfile::tempdir().unwrap();
    let write = |name: &str, contents: &[u8]| {
        let path = dir.path().join(name);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    };
    write("ysm.json", METADATA.as_bytes());
    write("models/main.json", GEOMETRY.as_bytes());
    write("textures/skin.png", b"\x89PNG fake pixels");

    let marker = dir.path().join("ysm.json");
    BedrockModelLoader::default()
        .load(&marker, dir.path())
        .unwrap()
        .model
        .unwrap()
}

fn scene() -> Arc<RenderScene> {
    Arc::new(RenderScene::from_model(&load_model()).unwrap())
}

#[test]
fn test_scene_from_loaded_model() {
    let scene = scene();
    assert_eq!(scene.name, "geometry.person");
    assert_eq!(scene.primitives.len(), 1);
    assert_eq!(scene.vertex_count(), 24);
    assert_eq!(scene.primitives[0].index_count(), Some(36));
    assert_eq!(scene.primitives[0].material.descriptor, MaterialDescriptor::Vanilla);
    assert!(scene.primitives[0].skinned());
    assert_eq!(scene.skeleton.as_ref().unwrap().len(), 2);

    let task = scene.task(Mat4::IDENTITY, None);
    assert_eq!(task.local_matrices.len(), 1);
    assert_eq!(task.joint_matrices.len(), 2);
}

#[test]
fn test_cpu_frame_matches_rest_pose() {
    let scene = scene();
    let mut renderer = CpuTransformRenderer::new(MemoryBackend::new(), 3, 1000).unwrap();
    let mut frame = FrameCommands::new();
    renderer
        .render(&mut frame, &scene, &scene.task(Mat4::IDENTITY, None))
        .unwrap();

    assert_eq!(frame.len(), 1);
    let draw = frame.draws().next().unwrap();
    assert_eq!(draw.pipeline, PipelineId::Entity);
    assert_eq!(draw.vertex_count, 24);
    assert_eq!(draw.index_count, Some(36));
    let BufferRef::Pooled { slice, .. } = draw.vertex_buffer else {
        panic!("cpu draws read pooled vertices");
    };

    let bytes = renderer.vertex_pool().read(&slice).unwrap();
    let vertices = entity_vertices(bytes);
    for (output, source) in vertices.iter().zip(scene.primitives[0].vertices.iter()) {
        let moved = Vec3::from_array(output.position) - source.position();
        assert!(moved.length() < 1e-4, "rest pose moved a vertex by {moved}");
        assert_eq!(output.uv, source.uv);
    }
    assert!(frame.validate_barriers().is_ok());
    assert!(matches!(
        renderer.schedule(&mut frame, &scene, scene.task(Mat4::IDENTITY, None)),
        Err(RenderError::SchedulingUnsupported(RendererKind::CpuTransform))
    ));
}

#[test]
fn test_vertex_shader_instancing() {
    let scene = scene();
    let config = RendererConfig {
        instance_size: 2,
        ..RendererConfig::default()
    };
    let mut renderer =
        VertexShaderRenderer::new(MemoryBackend::new(), SpecCompiler::new(), &DeviceCapabilities::default(), &config)
            .unwrap();
    let mut frame = FrameCommands::new();

    renderer
        .render(&mut frame, &scene, &scene.task(Mat4::IDENTITY, None))
        .unwrap();
    for x in 0..3 {
        let task = scene.task(Mat4::from_translation(Vec3::X * x as f32), None);
        renderer.schedule(&mut frame, &scene, task).unwrap();
    }
    assert_eq!(renderer.scheduled_count(), 3);
    renderer.execute(&mut frame).unwrap();
    assert_eq!(renderer.scheduled_count(), 0);

    let draws: Vec<_> = frame.draws().collect();
    assert_eq!(draws.len(), 3);
    assert_eq!(draws[0].instance_count, 1);
    assert_eq!(
        draws[0].pipeline,
        PipelineId::Vertex {
            material: MaterialDescriptor::Vanilla,
            variant: VertexVariant::SKINNED,
        }
    );
    // Three tasks with instance size 2: one draw of two, one of one
    assert_eq!(draws[1].instance_count, 2);
    assert_eq!(draws[2].instance_count, 1);
    assert_eq!(
        draws[2].pipeline,
        PipelineId::Vertex {
            material: MaterialDescriptor::Vanilla,
            variant: VertexVariant::SKINNED | VertexVariant::INSTANCED,
        }
    );
    assert!(matches!(draws[1].vertex_buffer, BufferRef::Primitive { scene: 0, primitive: 0 }));
    let names: Vec<&str> = draws[1].bindings.iter().map(|binding| binding.name).collect();
    assert!(names.contains(&"InstanceData"));
    assert!(names.contains(&"LocalMatricesData"));
    assert!(names.contains(&"JointsData"));
    assert!(names.contains(&"VanillaData"));

    // One pipeline per variant, no matter how many draws used it
    assert_eq!(renderer.pipeline_count(), 2);
    assert!(frame.validate_barriers().is_ok());

    renderer.close();
    assert_eq!(renderer.pipeline_count(), 0);
    assert!(renderer.data_pool().is_closed());
}

#[test]
fn test_vertex_shader_without_ssbo_uses_texel_buffers() {
    let scene = scene();
    let caps = DeviceCapabilities {
        max_vertex_storage_buffers: 4,
        ..DeviceCapabilities::default()
    };
    let mut renderer =
        VertexShaderRenderer::new(MemoryBackend::new(), SpecCompiler::new(), &caps, &RendererConfig::default())
            .unwrap();
    assert!(!renderer.options().ssbo);

    let mut frame = FrameCommands::new();
    renderer
        .render(&mut frame, &scene, &scene.task(Mat4::IDENTITY, None))
        .unwrap();
    let draw = frame.draws().next().unwrap();
    let names: Vec<&str> = draw.bindings.iter().map(|binding| binding.name).collect();
    assert!(names.contains(&"LocalMatrices"));
    assert!(names.contains(&"Joints"));
    assert!(!names.contains(&"JointsData"));
}

#[test]
fn test_compute_render_puts_barrier_before_each_draw() {
    let scene = scene();
    let mut renderer = ComputeShaderRenderer::new(
        MemoryBackend::new(),
        SpecCompiler::new(),
        &DeviceCapabilities::default(),
        &RendererConfig::default(),
    )
    .unwrap();
    let mut frame = FrameCommands::new();
    renderer
        .render(&mut frame, &scene, &scene.task(Mat4::IDENTITY, None))
        .unwrap();

    let commands = frame.commands();
    assert_eq!(commands.len(), 3);
    let Command::Dispatch(dispatch) = &commands[0] else {
        panic!("expected dispatch first, got {:?}", commands[0]);
    };
    assert_eq!(dispatch.workgroups, [1, 1, 1]);
    assert_eq!(
        dispatch.pipeline,
        PipelineId::Compute {
            material: MaterialDescriptor::Vanilla,
            variant: ComputeVariant::SKINNED,
        }
    );
    assert!(matches!(commands[1], Command::MemoryBarrier(_)));
    let Command::Draw(draw) = &commands[2] else {
        panic!("expected draw last");
    };
    assert_eq!(draw.vertex_buffer, dispatch.target);
    assert_eq!(draw.vertex_stride, 48);
    assert!(frame.validate_barriers().is_ok());
}

#[test]
fn test_compute_schedule_shares_one_barrier() {
    let scene = scene();
    let mut renderer = ComputeShaderRenderer::new(
        MemoryBackend::new(),
        SpecCompiler::new(),
        &DeviceCapabilities::default(),
        &RendererConfig::default(),
    )
    .unwrap()
    .with_iris_vertex_format(true);
    let mut frame = FrameCommands::new();
    for _ in 0..2 {
        renderer
            .schedule(&mut frame, &scene, scene.task(Mat4::IDENTITY, None))
            .unwrap();
    }
    // Draws are held back until execute
    assert_eq!(frame.dispatches().count(), 2);
    assert_eq!(frame.draws().count(), 0);
    assert!(frame.validate_barriers().is_ok());

    renderer.execute(&mut frame).unwrap();
    assert_eq!(frame.barrier_count(), 1);
    assert_eq!(frame.draws().count(), 2);
    assert!(frame.draws().all(|draw| draw.vertex_stride == 64));
    assert!(frame.validate_barriers().is_ok());

    // Each dispatch wrote its own buffer
    let targets: Vec<_> = frame.dispatches().map(|dispatch| dispatch.target).collect();
    assert!(!targets[0].overlaps(&targets[1]));
    assert_eq!(renderer.pipeline_count(), 1);
}

#[test]
fn test_morphed_primitive_on_cpu_and_compute() {
    let loaded = scene();
    let mut scene = (*loaded).clone();
    let primitive = &mut scene.primitives[0];
    let vertex_count = primitive.vertex_count();
    primitive.material.morphed = true;
    primitive.morph_targets = Some(Arc::new(MorphTargets {
        position: vec![vec![Vec3::Y; vertex_count]],
        texcoord: vec![vec![Vec2::ZERO; vertex_count]],
    }));
    let scene = Arc::new(scene);
    let task = scene.task(Mat4::IDENTITY, None).with_morph_weights(vec![1.0, 0.0]);

    let mut cpu = CpuTransformRenderer::new(MemoryBackend::new(), 2, 1000).unwrap();
    let mut frame = FrameCommands::new();
    cpu.render(&mut frame, &scene, &task).unwrap();
    let BufferRef::Pooled { slice, .. } = frame.draws().next().unwrap().vertex_buffer else {
        panic!("cpu draws read pooled vertices");
    };
    let vertices = entity_vertices(cpu.vertex_pool().read(&slice).unwrap());
    let lifted = Vec3::from_array(vertices[0].position) - scene.primitives[0].vertices[0].position();
    assert!((lifted - Vec3::Y).length() < 1e-4);

    let mut compute = ComputeShaderRenderer::new(
        MemoryBackend::new(),
        SpecCompiler::new(),
        &DeviceCapabilities::default(),
        &RendererConfig::default(),
    )
    .unwrap();
    let mut frame = FrameCommands::new();
    compute.render(&mut frame, &scene, &task).unwrap();
    let dispatch = frame.dispatches().next().unwrap();
    assert_eq!(
        dispatch.pipeline,
        PipelineId::Compute {
            material: MaterialDescriptor::Vanilla,
            variant: ComputeVariant::SKINNED | ComputeVariant::MORPHED,
        }
    );
    let names: Vec<&str> = dispatch.bindings.iter().map(|binding| binding.name).collect();
    assert!(names.contains(&"MorphWeightsData"));
    assert!(names.contains(&"MorphTargetIndicesData"));
}

#[test]
fn test_rotation_keeps_previous_frame_valid() {
    let scene = scene();
    let mut renderer = CpuTransformRenderer::new(MemoryBackend::new(), 2, 1000).unwrap();

    let mut first = FrameCommands::new();
    renderer
        .render(&mut first, &scene, &scene.task(Mat4::IDENTITY, None))
        .unwrap();
    renderer.rotate();
    let mut second = FrameCommands::new();
    renderer
        .render(&mut second, &scene, &scene.task(Mat4::from_scale(Vec3::splat(2.0)), None))
        .unwrap();

    let slice_of = |frame: &FrameCommands| match frame.draws().next().unwrap().vertex_buffer {
        BufferRef::Pooled { slice, .. } => slice,
        BufferRef::Primitive { .. } => panic!("cpu draws read pooled vertices"),
    };
    assert_ne!(slice_of(&first).buffer, slice_of(&second).buffer);
    assert!(renderer.vertex_pool().read(&slice_of(&first)).is_some());
}
