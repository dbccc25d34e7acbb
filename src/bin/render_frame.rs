//! Render a small scene headlessly and print the pass trace.
//!
//! Run with:
//!   cargo run --bin render_frame
//!   cargo run --bin render_frame -- --record
//!
//! Uses a headless wgpu device when one is available and falls back to the
//! recording backend otherwise. `RUST_LOG=debug` shows pass-level events.

use std::sync::Arc;

use glam::{Quat, UVec2, Vec3, Vec4};
use scene_renderer::{
    backend::{GraphicsBackend, TextureFormat},
    pipeline::{DebugLine, DebugShape, PhysicsShape},
    resources::{Material, Mesh, MeshInstance, Model},
    scene::{
        BrushComponent, Camera, LightComponent, ModelComponent, Name, Projection, Scene,
        SpriteComponent, Transform,
    },
    shaders::names,
    RecordingBackend, RenderTarget, RendererConfig, SceneRenderer, WgpuBackend,
};

const OUTPUT_SIZE: UVec2 = UVec2::new(1280, 720);

fn build_scene() -> Scene {
    let mut scene = Scene::new();
    scene.environment.ssao.enabled = true;
    scene.environment.bloom.enabled = true;
    scene.environment.vignette.enabled = true;

    let cube = Arc::new(Mesh::cube());
    let quad = Arc::new(Mesh::quad());

    let floor = Arc::new(Model::new(
        "Floor",
        vec![MeshInstance::new(
            quad.clone(),
            Arc::new(Material::plastic(Vec4::new(0.6, 0.6, 0.6, 1.0))),
        )],
    ));
    scene.world.spawn((
        Name::new("Floor"),
        Transform {
            rotation: Quat::from_rotation_x(-std::f32::consts::FRAC_PI_2),
            scale: Vec3::splat(20.0),
            ..Transform::new()
        },
        BrushComponent::new(floor),
    ));

    let crate_model = Arc::new(Model::new(
        "Crate",
        vec![MeshInstance::new(
            cube.clone(),
            Arc::new(Material::metal(Vec4::new(0.9, 0.5, 0.2, 1.0), 0.3)),
        )],
    ));
    for i in 0..3 {
        scene.world.spawn((
            Name::new(&format!("Crate {}", i)),
            Transform::from_position(Vec3::new(i as f32 * 2.0 - 2.0, 0.5, 0.0)),
            ModelComponent::new(crate_model.clone()),
        ));
    }

    let window = Arc::new(Model::new(
        "Window",
        vec![MeshInstance::new(quad.clone(), Arc::new(Material::glass()))],
    ));
    scene.world.spawn((
        Transform::from_position(Vec3::new(0.0, 1.0, 2.0)),
        BrushComponent::transparent(window),
    ));

    scene.world.spawn((
        Transform::from_position(Vec3::new(3.0, 1.5, 1.0)),
        SpriteComponent {
            billboard: true,
            position_facing: true,
            lock_y: true,
            mesh: Some(MeshInstance::untextured(quad)),
        },
    ));

    scene.world.spawn((
        Name::new("Sun"),
        Transform::new(),
        LightComponent::directional(Vec3::new(1.0, 0.95, 0.9), 3.0)
            .with_shadows()
            .synced_with_sky(),
    ));
    scene.world.spawn((
        Transform::from_position(Vec3::new(-2.0, 2.0, 2.0)),
        LightComponent::point(Vec3::new(0.3, 0.5, 1.0), 5.0, 8.0),
    ));

    scene.update_global_transforms();
    scene
}

fn render<B: GraphicsBackend>(renderer: &mut SceneRenderer<B>, scene: &Scene) {
    let mut camera = Camera::new(Vec3::new(0.0, 4.0, 8.0), Vec3::ZERO);
    camera.projection = Projection::perspective(60.0, 1.0, 0.1, 500.0);
    camera.set_aspect(OUTPUT_SIZE.x as f32, OUTPUT_SIZE.y as f32);
    let frame = camera.frame();

    renderer.draw_debug_line(
        DebugLine::new(Vec3::ZERO, Vec3::Y * 3.0, Vec4::new(0.0, 1.0, 0.0, 1.0), 1.0)
            .with_width(2.0),
    );
    renderer.draw_debug_shape(DebugShape::new(
        Vec3::new(2.0, 0.5, 0.0),
        Quat::IDENTITY,
        PhysicsShape::Box {
            half_extents: Vec3::splat(0.5),
        },
        Vec4::new(1.0, 0.0, 0.0, 1.0),
        1.0,
    ));

    let mut output = RenderTarget::color("Output", OUTPUT_SIZE, TextureFormat::Rgba8UnormSrgb);
    renderer.update(1.0 / 60.0, false);
    renderer.begin_render_scene(frame.projection, frame.view, frame.position);
    if let Err(e) = renderer.render_scene(scene, &mut output) {
        log::error!("Frame failed: {}", e);
    }

    let report = renderer.last_frame();
    log::info!(
        "Frame done: {} lights, {} shadow maps, effects {:?}",
        report.light_count,
        report.shadow_maps,
        report.active_effects
    );
    renderer.release_target(&mut output);
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let record = std::env::args().any(|arg| arg == "--record");
    let scene = build_scene();

    if !record {
        match WgpuBackend::new_headless() {
            Ok(backend) => {
                let mut renderer = SceneRenderer::new(backend, RendererConfig::default());
                renderer.init();
                render(&mut renderer, &scene);
                return;
            }
            Err(e) => log::warn!("No GPU available ({}), using the recording backend", e),
        }
    }

    let mut renderer = SceneRenderer::new(RecordingBackend::new(), RendererConfig::default());
    renderer.init();
    if let Err(e) = renderer.register_placeholder_shaders(names::ALL) {
        log::error!("Failed to register placeholder shaders: {}", e);
        return;
    }
    render(&mut renderer, &scene);

    for pass in renderer.backend().passes() {
        println!("{:<24} {:>4} draws", pass.label, pass.draw_count());
    }
}
