use glam::{Mat4, Vec3, Vec4};
use gles_batch_renderer::asset::Handle;
use gles_batch_renderer::gpu::{DeviceCapabilities, GpuCall, TextureTarget, UniformValue};
use gles_batch_renderer::renderer::{
    cube_mesh, Image, Light, Material, MaterialTexture, ProgramCache, Texture, TextureSlot,
};
use gles_batch_renderer::{
    Camera, Mesh, RecordingDevice, RenderSettings, Renderer, Scene, Transform,
};

fn renderer() -> Renderer<RecordingDevice> {
    renderer_with(DeviceCapabilities::default(), RenderSettings::default())
}

fn renderer_with(
    capabilities: DeviceCapabilities,
    settings: RenderSettings,
) -> Renderer<RecordingDevice> {
    let mut renderer = Renderer::new(RecordingDevice::with_capabilities(capabilities), settings);
    renderer.resize(800, 600);
    renderer
}

/// Spawns `count` small cubes in a row in front of the default camera.
fn spawn_row(scene: &mut Scene, mesh: Handle<Mesh>, material: Handle<Material>, count: usize) {
    for i in 0..count {
        let x = (i as f32 / count.max(1) as f32) - 0.5;
        scene.spawn_node(
            "cube",
            Transform::from_translation(Vec3::new(x, 0.0, 0.0)).with_scale(Vec3::splat(0.05)),
            Some(mesh),
            Some(material),
        );
    }
}

fn links(renderer: &Renderer<RecordingDevice>) -> usize {
    renderer
        .context()
        .device()
        .count(|c| matches!(c, GpuCall::LinkProgram(_)))
}

#[test]
fn identical_defines_share_one_program() {
    let mut cache = ProgramCache::new();
    let a = cache.get_or_create("UNLIT\nINSTANCED\n");
    let b = cache.get_or_create("UNLIT\nINSTANCED\n");
    let c = cache.get_or_create("UNLIT\n");
    assert_eq!(a, b);
    assert_ne!(a, c);
    assert_eq!(cache.len(), 2);
}

#[test]
fn two_materials_render_as_two_instanced_draws() {
    let mut renderer = renderer();
    let mut scene = Scene::new();
    let mesh = scene.assets.meshes.insert(cube_mesh());
    let red = scene
        .assets
        .materials
        .insert(Material::unlit("red", Vec4::new(1.0, 0.0, 0.0, 1.0)));
    let green = scene
        .assets
        .materials
        .insert(Material::unlit("green", Vec4::new(0.0, 1.0, 0.0, 1.0)));
    spawn_row(&mut scene, mesh, red, 5);
    spawn_row(&mut scene, mesh, green, 5);

    let stats = renderer.render(&Camera::default(), &mut scene);
    assert_eq!(stats.visible_nodes, 10);
    assert_eq!(stats.batches, 2);
    assert_eq!(stats.instanced_batches, 2);
    assert_eq!(stats.draw_calls, 2);
    assert_eq!(
        renderer
            .context()
            .device()
            .count(|c| matches!(c, GpuCall::DrawElementsInstanced(_, _, 5))),
        2
    );
}

#[test]
fn batch_limit_splits_instanced_draws() {
    let settings = RenderSettings {
        max_nodes_in_batch: 4,
        ..RenderSettings::default()
    };
    let mut renderer = renderer_with(DeviceCapabilities::default(), settings);
    let mut scene = Scene::new();
    let mesh = scene.assets.meshes.insert(cube_mesh());
    let material = scene.assets.materials.insert(Material::unlit("m", Vec4::ONE));
    spawn_row(&mut scene, mesh, material, 10);

    let stats = renderer.render(&Camera::default(), &mut scene);
    assert_eq!(stats.batches, 3);
    assert_eq!(stats.draw_calls, 3);
}

#[test]
fn multi_pass_material_draws_per_node_per_light() {
    let mut renderer = renderer();
    let mut scene = Scene::new();
    let mesh = scene.assets.meshes.insert(cube_mesh());
    let material = scene.assets.materials.insert(Material::lit("lit"));
    spawn_row(&mut scene, mesh, material, 3);
    scene.add_light(Light::directional(Vec3::NEG_Y));
    scene.add_light(Light::point(Vec3::Y, 5.0));

    let stats = renderer.render(&Camera::default(), &mut scene);
    assert_eq!(stats.instanced_batches, 0);
    // Ambient pass plus one additive pass per light, for each node.
    assert_eq!(stats.draw_calls, 3 * 3);
    assert_eq!(stats.shadow_draw_calls, 0);
}

#[test]
fn shadowed_directional_light_renders_each_split() {
    let mut renderer = renderer();
    let mut scene = Scene::new();
    let mesh = scene.assets.meshes.insert(cube_mesh());
    let material = scene.assets.materials.insert(Material::lit("lit"));
    spawn_row(&mut scene, mesh, material, 3);
    scene.add_light(Light::directional(Vec3::new(-0.3, -1.0, 0.0)).with_shadows());

    let stats = renderer.render(&Camera::default(), &mut scene);
    let splits = renderer.settings().shadow_map_sizes.len();
    assert_eq!(renderer.shadow_maps().len(), 1);
    // One instanced depth draw per split for the single batch.
    assert_eq!(stats.shadow_draw_calls, splits);
    assert_eq!(stats.draw_calls, 3 * 2);
}

#[test]
fn pending_texture_skips_batch_until_loaded() {
    let mut renderer = renderer();
    let mut scene = Scene::new();
    let mesh = scene.assets.meshes.insert(cube_mesh());
    let (texture, loader) = Texture::pending();
    let texture = scene.assets.textures.insert(texture);
    let material = scene.assets.materials.insert(
        Material::unlit("textured", Vec4::ONE)
            .with_texture(TextureSlot::Diffuse, MaterialTexture::new(texture)),
    );
    spawn_row(&mut scene, mesh, material, 2);
    let camera = Camera::default();

    let stats = renderer.render(&camera, &mut scene);
    assert_eq!(stats.skipped_batches, 1);
    assert_eq!(stats.draw_calls, 0);

    loader.deliver(Image::checkerboard(8, 2));
    let stats = renderer.render(&camera, &mut scene);
    assert_eq!(stats.skipped_batches, 0);
    assert_eq!(stats.draw_calls, 1);
}

#[test]
fn failed_link_is_logged_once_and_never_retried() {
    let mut renderer = renderer();
    renderer
        .context_mut()
        .device_mut()
        .fail_links_containing("#define UNLIT");
    let mut scene = Scene::new();
    let mesh = scene.assets.meshes.insert(cube_mesh());
    let broken = scene.assets.materials.insert(Material::unlit("broken", Vec4::ONE));
    let fine = scene.assets.materials.insert(Material::lit("fine"));
    spawn_row(&mut scene, mesh, broken, 2);
    spawn_row(&mut scene, mesh, fine, 2);
    let camera = Camera::default();

    let first = renderer.render(&camera, &mut scene);
    let second = renderer.render(&camera, &mut scene);

    for stats in [first, second] {
        assert_eq!(stats.batches, 2);
        assert_eq!(stats.skipped_batches, 1);
        assert!(stats.draw_calls > 0);
    }
    assert_eq!(
        renderer
            .context()
            .device()
            .count(|c| matches!(c, GpuCall::LinkFailed)),
        1
    );
}

#[test]
fn missing_material_handle_is_skipped() {
    let mut renderer = renderer();
    let mut scene = Scene::new();
    let mesh = scene.assets.meshes.insert(cube_mesh());
    spawn_row(&mut scene, mesh, Handle::new(42), 1);
    scene.spawn_node("bare", Transform::IDENTITY, Some(mesh), None);

    let stats = renderer.render(&Camera::default(), &mut scene);
    assert_eq!(stats.batches, 2);
    assert_eq!(stats.skipped_batches, 2);
    assert_eq!(renderer.context().device().draw_calls(), 0);
}

#[test]
fn context_loss_recreates_every_gpu_object() {
    let mut renderer = renderer();
    let mut scene = Scene::new();
    let mesh = scene.assets.meshes.insert(cube_mesh());
    let material = scene.assets.materials.insert(Material::unlit("m", Vec4::ONE));
    spawn_row(&mut scene, mesh, material, 4);
    let camera = Camera::default();

    renderer.render(&camera, &mut scene);
    assert!(links(&renderer) > 0);

    renderer.context_lost(&mut scene.assets);
    assert!(renderer.program_cache().is_empty());
    assert!(renderer.vao_cache().is_empty());
    renderer.context_mut().device_mut().clear_calls();

    let stats = renderer.render(&camera, &mut scene);
    let device = renderer.context().device();
    assert_eq!(stats.draw_calls, 1);
    assert!(links(&renderer) > 0);
    assert!(device.count(|c| matches!(c, GpuCall::CreateBuffer(_))) >= 2);
    assert!(device.count(|c| matches!(c, GpuCall::CreateVertexArray(_))) >= 1);
    assert_eq!(device.count(|c| matches!(c, GpuCall::DeleteProgram(_))), 0);
}

#[test]
fn mesh_invalidation_rebuilds_vertex_array() {
    let mut renderer = renderer();
    let mut scene = Scene::new();
    let mesh = scene.assets.meshes.insert(cube_mesh());
    let material = scene.assets.materials.insert(Material::unlit("m", Vec4::ONE));
    spawn_row(&mut scene, mesh, material, 2);
    let camera = Camera::default();

    renderer.render(&camera, &mut scene);
    if let Some(mesh) = scene.assets.meshes.get_mut(mesh) {
        mesh.invalidate(renderer.context_mut());
    }
    renderer.context_mut().device_mut().clear_calls();
    renderer.render(&camera, &mut scene);

    let device = renderer.context().device();
    assert_eq!(device.count(|c| matches!(c, GpuCall::DeleteVertexArray(_))), 1);
    assert_eq!(device.count(|c| matches!(c, GpuCall::CreateVertexArray(_))), 1);
    assert_eq!(renderer.vao_cache().len(), 1);
}

#[test]
fn hidden_nodes_are_not_drawn() {
    let mut renderer = renderer();
    let mut scene = Scene::new();
    let mesh = scene.assets.meshes.insert(cube_mesh());
    let material = scene.assets.materials.insert(Material::unlit("m", Vec4::ONE));
    let node = scene.spawn_node("n", Transform::IDENTITY, Some(mesh), Some(material));
    scene.set_visible(node, false);

    let stats = renderer.render(&Camera::default(), &mut scene);
    assert_eq!(stats.visible_nodes, 0);
    assert_eq!(stats.draw_calls, 0);
}

/// One unlit cube at the origin, so two such scenes share entity, handle
/// and transform version.
fn single_cube_scene(color: Vec4) -> Scene {
    let mut scene = Scene::new();
    let mesh = scene.assets.meshes.insert(cube_mesh());
    let material = scene.assets.materials.insert(Material::unlit("m", color));
    scene.spawn_node("cube", Transform::IDENTITY, Some(mesh), Some(material));
    scene
}

#[test]
fn second_scene_uploads_its_own_uniforms() {
    let settings = RenderSettings {
        allow_instancing: false,
        ..RenderSettings::default()
    };
    let mut renderer = renderer_with(DeviceCapabilities::default(), settings);
    let red = Vec4::new(1.0, 0.0, 0.0, 1.0);
    let green = Vec4::new(0.0, 1.0, 0.0, 1.0);
    let mut first = single_cube_scene(red);
    let mut second = single_cube_scene(green);
    let camera = Camera::default();

    renderer.render(&camera, &mut first);
    renderer.context_mut().device_mut().clear_calls();
    let stats = renderer.render(&camera, &mut second);
    assert_eq!(stats.draw_calls, 1);

    let device = renderer.context().device();
    assert_eq!(
        device.count(|c| matches!(c, GpuCall::Uniform(_, UniformValue::Vec4(v)) if *v == green)),
        1
    );
    // Model matrix of the second scene's cube.
    assert_eq!(
        device.count(|c| matches!(c, GpuCall::Uniform(_, UniformValue::Mat4(m)) if *m == Mat4::IDENTITY)),
        1
    );
}

#[test]
fn caster_outside_the_view_still_casts() {
    let settings = RenderSettings {
        shadow_map_sizes: vec![1024],
        ..RenderSettings::default()
    };
    let mut renderer = renderer_with(DeviceCapabilities::default(), settings);
    let mut scene = Scene::new();
    let mesh = scene.assets.meshes.insert(cube_mesh());
    let material = scene.assets.materials.insert(Material::lit("lit"));
    let small = Vec3::splat(0.25);
    scene.spawn_node(
        "receiver",
        Transform::IDENTITY.with_scale(small),
        Some(mesh),
        Some(material),
    );
    // Straight above the receiver, well outside the camera's field of view.
    scene.spawn_node(
        "caster",
        Transform::from_translation(Vec3::new(0.0, 6.0, 0.0)).with_scale(small),
        Some(mesh),
        Some(material),
    );
    scene.add_light(Light::directional(Vec3::NEG_Y).with_shadows());

    let stats = renderer.render(&Camera::default(), &mut scene);
    assert_eq!(stats.visible_nodes, 1);
    assert_eq!(stats.shadow_draw_calls, 1);
    assert_eq!(
        renderer
            .context()
            .device()
            .count(|c| matches!(c, GpuCall::DrawElementsInstanced(_, _, 2))),
        1
    );
}

#[test]
fn non_casting_material_is_left_out_of_shadow_maps() {
    let mut renderer = renderer();
    let mut scene = Scene::new();
    let mesh = scene.assets.meshes.insert(cube_mesh());
    let material = scene
        .assets
        .materials
        .insert(Material::lit("lit").without_shadow_casting());
    spawn_row(&mut scene, mesh, material, 3);
    scene.add_light(Light::directional(Vec3::NEG_Y).with_shadows());

    let stats = renderer.render(&Camera::default(), &mut scene);
    assert_eq!(renderer.shadow_maps().len(), 1);
    assert_eq!(stats.shadow_draw_calls, 0);
    assert_eq!(stats.draw_calls, 3 * 2);
}

#[test]
fn shadowed_point_light_renders_cube_faces() {
    let mut renderer = renderer();
    let mut scene = Scene::new();
    let mesh = scene.assets.meshes.insert(cube_mesh());
    let material = scene.assets.materials.insert(Material::lit("lit"));
    spawn_row(&mut scene, mesh, material, 3);
    scene.add_light(Light::point(Vec3::new(0.0, 2.0, 0.0), 10.0).with_shadows());

    let stats = renderer.render(&Camera::default(), &mut scene);
    assert_eq!(renderer.shadow_maps().len(), 1);
    assert!(stats.shadow_draw_calls >= 1);

    let device = renderer.context().device();
    assert!(device.count(|c| matches!(
        c,
        GpuCall::FramebufferTexture(_, TextureTarget::CubeMapFace(_), _)
    )) >= 1);
    assert!(device.count(|c| matches!(c, GpuCall::BindTexture(TextureTarget::CubeMap, Some(_)))) >= 1);

    let programs = renderer.program_cache();
    assert!(programs.iter().any(|(_, p)| p.defines().contains("SHADOWCUBE")));
    assert!(programs.iter().any(|(_, p)| p.defines().contains("CUBESHADOWMAP")));
}
