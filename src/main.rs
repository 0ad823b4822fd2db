use glam::{Vec3, Vec4};
use gles_batch_renderer::renderer::{cube_mesh, quad_mesh, sphere_mesh, Light, Material};
use gles_batch_renderer::{init_logging, Camera, RecordingDevice, RenderSettings, Renderer, Scene, Transform};
use log::info;

const FRAMES: usize = 3;

fn build_scene() -> Scene {
    let mut scene = Scene::new();
    let cube = scene.assets.meshes.insert(cube_mesh());
    let sphere = scene.assets.meshes.insert(sphere_mesh(24, 12));
    let quad = scene.assets.meshes.insert(quad_mesh());

    let red = scene
        .assets
        .materials
        .insert(Material::lit("red").with_color(Vec4::new(0.9, 0.2, 0.2, 1.0)));
    let blue = scene
        .assets
        .materials
        .insert(Material::unlit("blue", Vec4::new(0.2, 0.3, 0.9, 1.0)));
    let ground = scene.assets.materials.insert(Material::lit("ground"));

    scene.spawn_node(
        "ground",
        Transform::from_trs(
            Vec3::new(0.0, -1.0, 0.0),
            glam::Quat::from_rotation_x(-std::f32::consts::FRAC_PI_2),
            Vec3::splat(20.0),
        ),
        Some(quad),
        Some(ground),
    );

    for x in -4..4 {
        for z in -4..4 {
            let position = Vec3::new(x as f32 * 1.5, 0.0, z as f32 * 1.5);
            let (mesh, material) = if (x + z) % 2 == 0 {
                (cube, red)
            } else {
                (sphere, blue)
            };
            scene.spawn_node(
                "prop",
                Transform::from_translation(position).with_scale(Vec3::splat(0.5)),
                Some(mesh),
                Some(material),
            );
        }
    }

    scene.add_light(
        Light::directional(Vec3::new(-0.4, -1.0, -0.3))
            .with_color(Vec3::new(1.0, 0.95, 0.9), 1.0)
            .with_shadows(),
    );
    scene.add_light(Light::point(Vec3::new(0.0, 3.0, 0.0), 8.0));
    scene
}

fn main() {
    init_logging();

    let settings = match std::env::args().nth(1) {
        Some(path) => RenderSettings::load_from_path(path),
        None => RenderSettings::load(),
    };
    let mut renderer = Renderer::new(RecordingDevice::new(), settings);
    renderer.resize(1280, 720);

    let mut scene = build_scene();
    let mut camera = Camera::new(Vec3::new(0.0, 8.0, 14.0), Vec3::ZERO);

    for frame in 0..FRAMES {
        renderer.context_mut().device_mut().clear_calls();
        let stats = renderer.render(&camera, &mut scene);
        let gpu_calls = renderer.context().device().calls().len();
        info!("Frame {}: {:?} ({} GPU calls)", frame, stats, gpu_calls);
        println!(
            "frame {frame}: {} visible, {} batches ({} instanced), {} draws + {} shadow draws, {} triangles, {} GPU calls",
            stats.visible_nodes,
            stats.batches,
            stats.instanced_batches,
            stats.draw_calls,
            stats.shadow_draw_calls,
            stats.triangles,
            gpu_calls
        );
        camera.look_at(Vec3::new(frame as f32, 8.0, 14.0), Vec3::ZERO);
    }

    info!("Simulating context loss");
    renderer.context_lost(&mut scene.assets);
    let stats = renderer.render(&camera, &mut scene);
    println!(
        "after context loss: {} draws, {} programs relinked",
        stats.total_draw_calls(),
        stats.programs
    );
}
