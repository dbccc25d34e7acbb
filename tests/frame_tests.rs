//! Whole-frame tests driven through the recording backend

use std::sync::Arc;

use glam::{Mat4, Quat, UVec2, Vec3, Vec4};
use scene_renderer::{
    backend::{Command, TextureFormat, UniformValue},
    pipeline::{
        skeleton::BONE_MATRICES_UNIFORM, DebugLine, DebugShape, GBufferPass, PhysicsShape,
    },
    resources::{Material, Mesh, MeshInstance, Model, SkeletonNode, SkinnedModel},
    scene::{
        LightComponent, ModelComponent, Name, Particle, ParticleEmitterComponent, Scene,
        SceneEnvironment, SkinnedModelComponent, SpriteComponent, Transform,
    },
    shaders::{names, ShaderResolver},
    RecordingBackend, RenderTarget, RendererConfig, SceneRenderer,
};

const SIZE: UVec2 = UVec2::new(320, 180);

fn renderer() -> SceneRenderer<RecordingBackend> {
    let config = RendererConfig {
        default_resolution: SIZE,
        cascade_count: 2,
        shadow_map_size: 256,
        ..Default::default()
    };
    let mut renderer = SceneRenderer::new(RecordingBackend::new(), config);
    renderer.init();
    renderer.register_placeholder_shaders(names::ALL).unwrap();
    renderer
}

fn output() -> RenderTarget {
    RenderTarget::color("Output", SIZE, TextureFormat::Rgba8UnormSrgb)
}

fn cube_model(name: &str) -> Arc<Model> {
    Arc::new(Model::new(
        name,
        vec![MeshInstance::new(
            Arc::new(Mesh::cube()),
            Arc::new(Material::plastic(Vec4::ONE)),
        )],
    ))
}

fn begin(renderer: &mut SceneRenderer<RecordingBackend>, eye: Vec3, target: Vec3, up: Vec3) {
    let projection = Mat4::perspective_rh(1.0, SIZE.x as f32 / SIZE.y as f32, 0.1, 200.0);
    renderer.begin_render_scene(projection, Mat4::look_at_rh(eye, target, up), eye);
}

/// A small scene exercising every optional effect's inputs
fn effect_scene(environment: SceneEnvironment) -> Scene {
    let mut scene = Scene::with_environment(environment);
    scene.world.spawn((
        Transform::from_position(Vec3::new(0.0, 0.5, 0.0)),
        ModelComponent::new(cube_model("Cube")),
    ));
    scene.world.spawn((
        Transform::new(),
        LightComponent::directional(Vec3::ONE, 2.0)
            .with_shadows()
            .with_volumetric(),
    ));
    scene.update_global_transforms();
    scene
}

fn frame_commands(scene: &Scene) -> Vec<Command> {
    let mut renderer = renderer();
    let mut target = output();
    begin(&mut renderer, Vec3::new(0.0, 3.0, 6.0), Vec3::ZERO, Vec3::Y);
    renderer.render_scene(scene, &mut target).unwrap();
    renderer.backend().commands().to_vec()
}

fn assert_toggle_equivalent(
    disable: impl Fn(&mut SceneEnvironment),
    neutralize: impl Fn(&mut SceneEnvironment),
) {
    let mut disabled = SceneEnvironment::default();
    disable(&mut disabled);
    let mut neutral = SceneEnvironment::default();
    neutralize(&mut neutral);

    let disabled = frame_commands(&effect_scene(disabled));
    let neutral = frame_commands(&effect_scene(neutral));
    assert!(!disabled.is_empty());
    assert_eq!(disabled, neutral);
}

#[test]
fn test_disabled_ssao_matches_neutral() {
    assert_toggle_equivalent(
        |env| env.ssao.enabled = false,
        |env| {
            env.ssao.enabled = true;
            env.ssao.strength = 0.0;
        },
    );
}

#[test]
fn test_disabled_bloom_matches_neutral() {
    assert_toggle_equivalent(
        |env| env.bloom.enabled = false,
        |env| {
            env.bloom.enabled = true;
            env.bloom.intensity = 0.0;
        },
    );
}

#[test]
fn test_disabled_volumetric_matches_neutral() {
    assert_toggle_equivalent(
        |env| env.volumetric.enabled = false,
        |env| {
            env.volumetric.enabled = true;
            env.volumetric.fog_amount = 0.0;
        },
    );
}

#[test]
fn test_disabled_ssr_matches_neutral() {
    assert_toggle_equivalent(
        |env| env.ssr.enabled = false,
        |env| {
            env.ssr.enabled = true;
            env.ssr.strength = 0.0;
        },
    );
}

#[test]
fn test_disabled_barrel_distortion_matches_neutral() {
    assert_toggle_equivalent(
        |env| env.barrel_distortion.enabled = false,
        |env| env.barrel_distortion.enabled = true,
    );
}

#[test]
fn test_requested_effects_are_reported_active() {
    let mut environment = SceneEnvironment::default();
    environment.ssao.enabled = true;
    environment.bloom.enabled = true;
    environment.volumetric.enabled = true;
    environment.ssr.enabled = true;
    environment.barrel_distortion.enabled = true;
    environment.barrel_distortion.distortion = 0.2;
    let scene = effect_scene(environment);

    let mut renderer = renderer();
    let mut target = output();
    begin(&mut renderer, Vec3::new(0.0, 3.0, 6.0), Vec3::ZERO, Vec3::Y);
    renderer.render_scene(&scene, &mut target).unwrap();

    let effects = renderer.last_frame().active_effects;
    assert!(effects.ssao);
    assert!(effects.bloom);
    assert!(effects.volumetric);
    assert!(effects.ssr);
    assert!(effects.barrel_distortion);
    assert!(renderer.targets().find("Bloom").is_some());
}

#[test]
fn test_frame_pass_order() {
    let scene = effect_scene(SceneEnvironment::default());
    let mut renderer = renderer();
    let mut target = output();
    begin(&mut renderer, Vec3::new(0.0, 3.0, 6.0), Vec3::ZERO, Vec3::Y);
    renderer.render_scene(&scene, &mut target).unwrap();

    let labels = renderer.backend().pass_labels();
    let position = |label: &str| {
        labels
            .iter()
            .position(|l| l == label)
            .unwrap_or_else(|| panic!("no {} pass in {:?}", label, labels))
    };

    assert!(labels[0].starts_with("Shadow"));
    assert!(position(GBufferPass::LABEL) < position("Display Depth"));
    assert!(position("Display Depth") < position("Shading"));
    assert!(position("Shading") < position("Tonemap"));
    assert!(position("Vignette") < position("Output"));
    assert_eq!(labels.last().map(String::as_str), Some("Output"));
    assert!(matches!(
        renderer.backend().commands().last(),
        Some(Command::Submit)
    ));
}

#[test]
fn test_debug_primitives_expire() {
    let scene = Scene::new();
    let mut renderer = renderer();
    let debug_line = renderer.shaders().resolve(names::DEBUG_LINE).unwrap();

    renderer.draw_debug_line(DebugLine::new(Vec3::ZERO, Vec3::Y, Vec4::ONE, 1.0));
    renderer.update(0.5, false);

    let mut target = output();
    begin(&mut renderer, Vec3::new(0.0, 0.0, 5.0), Vec3::ZERO, Vec3::Y);
    renderer.render_scene(&scene, &mut target).unwrap();
    let line_draws = |renderer: &SceneRenderer<RecordingBackend>| {
        renderer
            .backend()
            .draws()
            .iter()
            .filter(|d| d.shader == Some(debug_line))
            .count()
    };
    assert_eq!(line_draws(&renderer), 1);

    renderer.update(0.5, false);
    assert_eq!(renderer.debug_overlay().line_count(), 0);

    renderer.backend_mut().clear_commands();
    renderer.render_scene(&scene, &mut target).unwrap();
    assert_eq!(line_draws(&renderer), 0);
}

#[test]
fn test_lights_upload_nearest_first() {
    let mut scene = Scene::new();
    for x in [5.0, 1.0, 3.0] {
        scene.world.spawn((
            Transform::from_position(Vec3::new(x, 0.0, 0.0)),
            LightComponent::point(Vec3::ONE, 1.0, 10.0),
        ));
    }
    scene.update_global_transforms();

    let mut renderer = renderer();
    let mut target = output();
    begin(&mut renderer, Vec3::ZERO, Vec3::NEG_Z, Vec3::Y);
    renderer.render_scene(&scene, &mut target).unwrap();

    let deferred = renderer.shaders().resolve(names::DEFERRED).unwrap();
    let draw = renderer
        .backend()
        .draws()
        .iter()
        .find(|d| d.shader == Some(deferred))
        .unwrap();

    assert_eq!(draw.uniform("u_LightCount"), Some(UniformValue::Int(3)));
    for (i, x) in [1.0, 3.0, 5.0].into_iter().enumerate() {
        assert_eq!(
            draw.uniform_element("u_LightPositions", i as u32),
            Some(UniformValue::Vec3(Vec3::new(x, 0.0, 0.0)))
        );
    }
    assert_eq!(renderer.last_frame().light_count, 3);
}

#[test]
fn test_resize_applied_once() {
    let scene = effect_scene(SceneEnvironment::default());
    let mut renderer = renderer();
    let mut target = RenderTarget::color("Output", UVec2::new(640, 360), TextureFormat::Rgba8UnormSrgb);
    begin(&mut renderer, Vec3::new(0.0, 3.0, 6.0), Vec3::ZERO, Vec3::Y);

    let gbuffer = renderer.targets().find(GBufferPass::LABEL).unwrap();
    for _ in 0..3 {
        renderer.render_scene(&scene, &mut target).unwrap();
    }

    let resized = renderer.targets().get(gbuffer).unwrap();
    assert_eq!(resized.size(), UVec2::new(640, 360));
    assert_eq!(resized.resize_count(), 1);

    renderer.backend_mut().clear_commands();
    renderer.render_scene(&scene, &mut target).unwrap();
    let created = renderer
        .backend()
        .commands()
        .iter()
        .filter(|c| matches!(c, Command::CreateTexture { .. }))
        .count();
    assert_eq!(created, 0);
}

#[test]
fn test_entity_ids_and_selection_outline() {
    let mut scene = Scene::new();
    scene.world.spawn(Name::new("Placeholder"));
    let cube = scene
        .world
        .spawn((Transform::new(), ModelComponent::new(cube_model("Cube"))))
        .id();
    scene.update_global_transforms();

    let mut renderer = renderer();
    let outline = renderer.shaders().resolve(names::OUTLINE).unwrap();
    let mut target = output();
    begin(&mut renderer, Vec3::new(0.0, 2.0, 5.0), Vec3::ZERO, Vec3::Y);
    renderer.render_scene(&scene, &mut target).unwrap();

    let expected = UniformValue::Int(cube.index() as i32 + 1);
    let gbuffer_draws = renderer.backend().draws_in(GBufferPass::LABEL);
    assert_eq!(gbuffer_draws.len(), 1);
    assert_eq!(gbuffer_draws[0].uniform("u_EntityID"), Some(expected));

    let outline_id = |renderer: &SceneRenderer<RecordingBackend>| {
        renderer
            .backend()
            .draws()
            .iter()
            .find(|d| d.shader == Some(outline))
            .and_then(|d| d.uniform("u_EntityID"))
    };
    assert_eq!(outline_id(&renderer), Some(UniformValue::Int(0)));

    renderer.set_selected_entity(Some(cube));
    renderer.backend_mut().clear_commands();
    renderer.render_scene(&scene, &mut target).unwrap();
    assert_eq!(outline_id(&renderer), Some(expected));
}

#[test]
fn test_skinned_model_bones() {
    let skeleton = SkeletonNode::new("Root", 99, Mat4::IDENTITY).with_child(
        SkeletonNode::new("Hip", 0, Mat4::from_translation(Vec3::X))
            .with_child(SkeletonNode::new("Spine", 1, Mat4::from_translation(Vec3::Y)))
            .with_child(
                SkeletonNode::new("Unnamed", 2, Mat4::from_translation(Vec3::Z)).with_child(
                    SkeletonNode::new("Hand", 3, Mat4::from_translation(Vec3::ONE)),
                ),
            ),
    );
    let model = Arc::new(SkinnedModel::new(
        "Character",
        vec![MeshInstance::untextured(Arc::new(Mesh::cube()))],
        skeleton,
    ));

    let mut scene = Scene::new();
    for bone in ["Hip", "Spine", "Hand"] {
        scene.world.spawn(Name::new(bone));
    }
    scene
        .world
        .spawn((Transform::new(), SkinnedModelComponent::new(model)));
    scene.update_global_transforms();

    let mut renderer = renderer();
    let mut target = output();
    begin(&mut renderer, Vec3::new(0.0, 2.0, 5.0), Vec3::ZERO, Vec3::Y);
    renderer.render_scene(&scene, &mut target).unwrap();

    let skinned = renderer.shaders().resolve(names::GBUFFER_SKINNED).unwrap();
    let draw = renderer
        .backend()
        .draws_in(GBufferPass::LABEL)
        .into_iter()
        .find(|d| d.shader == Some(skinned))
        .unwrap();

    assert_eq!(draw.uniform("u_Model"), Some(UniformValue::Mat4(Mat4::IDENTITY)));
    assert_eq!(
        draw.uniform_element(BONE_MATRICES_UNIFORM, 0),
        Some(UniformValue::Mat4(Mat4::from_translation(Vec3::X)))
    );
    assert_eq!(
        draw.uniform_element(BONE_MATRICES_UNIFORM, 1),
        Some(UniformValue::Mat4(Mat4::from_translation(Vec3::Y)))
    );
    assert_eq!(draw.uniform_element(BONE_MATRICES_UNIFORM, 2), None);
    assert_eq!(
        draw.uniform_element(BONE_MATRICES_UNIFORM, 3),
        Some(UniformValue::Mat4(Mat4::from_translation(Vec3::ONE)))
    );
    assert_eq!(draw.uniform_element(BONE_MATRICES_UNIFORM, 99), None);
}

#[test]
fn test_lock_y_sprite_with_camera_looking_down() {
    let mut scene = Scene::new();
    scene.world.spawn((
        Transform::new(),
        SpriteComponent {
            billboard: true,
            position_facing: false,
            lock_y: true,
            mesh: Some(MeshInstance::untextured(Arc::new(Mesh::quad()))),
        },
    ));
    scene.update_global_transforms();

    let mut renderer = renderer();
    let mut target = output();
    begin(&mut renderer, Vec3::new(0.0, 10.0, 0.0), Vec3::ZERO, Vec3::NEG_Z);
    renderer.render_scene(&scene, &mut target).unwrap();

    let draws = renderer.backend().draws_in(GBufferPass::LABEL);
    assert_eq!(draws.len(), 1);
    let model = draws[0].uniform("u_Model").and_then(|u| u.as_mat4()).unwrap();
    assert!(model.y_axis.truncate().abs_diff_eq(Vec3::Y, 1e-5));
    assert!(model.x_axis.truncate().is_normalized());
    assert!(model.is_finite());
}

#[test]
fn test_particles_restore_quad_material() {
    let fire = Arc::new(Material::new("fire").with_emissive(4.0));
    let mut scene = Scene::new();
    scene.world.spawn((
        Transform::from_position(Vec3::new(0.0, 1.0, 0.0)),
        ParticleEmitterComponent {
            material: Some(fire),
            particles: vec![
                Particle::new(Vec3::ZERO, 1.0),
                Particle::new(Vec3::Y, 0.5),
            ],
            ..Default::default()
        },
    ));
    scene.update_global_transforms();

    let mut renderer = renderer();
    let mut target = output();
    begin(&mut renderer, Vec3::new(0.0, 2.0, 5.0), Vec3::ZERO, Vec3::Y);
    renderer.render_scene(&scene, &mut target).unwrap();

    let draws = renderer.backend().draws_in(GBufferPass::LABEL);
    assert_eq!(draws.len(), 2);
    for draw in draws {
        assert_eq!(draw.uniform("u_Emissive"), Some(UniformValue::Float(4.0)));
    }
    assert!(renderer.gbuffer().quad().material.is_none());
}

#[test]
fn test_temporary_model_last_write_wins() {
    let scene = Scene::new();
    let mut renderer = renderer();
    let first = Mat4::from_translation(Vec3::X);
    let second = Mat4::from_translation(Vec3::Y);
    renderer.draw_temporary_model("Gizmo", cube_model("A"), first);
    renderer.draw_temporary_model("Gizmo", cube_model("B"), second);

    assert_eq!(renderer.temporary_model("Gizmo").unwrap().model.name, "B");

    let mut target = output();
    begin(&mut renderer, Vec3::new(0.0, 2.0, 5.0), Vec3::ZERO, Vec3::Y);
    renderer.render_scene(&scene, &mut target).unwrap();

    let draws = renderer.backend().draws_in(GBufferPass::LABEL);
    assert_eq!(draws.len(), 1);
    assert_eq!(draws[0].uniform("u_Model"), Some(UniformValue::Mat4(second)));
    assert_eq!(draws[0].uniform("u_EntityID"), Some(UniformValue::Int(0)));

    assert!(renderer.remove_temporary_model("Gizmo"));
    renderer.backend_mut().clear_commands();
    renderer.render_scene(&scene, &mut target).unwrap();
    assert!(renderer.backend().draws_in(GBufferPass::LABEL).is_empty());
}

#[test]
fn test_shadow_maps_released_with_light() {
    let mut environment = SceneEnvironment::default();
    environment.bloom.enabled = false;
    let mut scene = effect_scene(environment);
    let mut renderer = renderer();
    let mut target = output();
    begin(&mut renderer, Vec3::new(0.0, 3.0, 6.0), Vec3::ZERO, Vec3::Y);

    let baseline = renderer.targets().len();
    renderer.render_scene(&scene, &mut target).unwrap();
    assert_eq!(renderer.last_frame().shadow_maps, 1);
    assert_eq!(renderer.targets().len(), baseline + 2);

    let lights: Vec<_> = scene
        .world
        .iter_entities()
        .filter(|e| e.contains::<LightComponent>())
        .map(|e| e.id())
        .collect();
    for light in lights {
        scene.world.despawn(light);
    }

    renderer.render_scene(&scene, &mut target).unwrap();
    assert!(renderer.shadows().is_empty());
    assert_eq!(renderer.targets().len(), baseline);
}

#[test]
fn test_cleanup_destroys_everything() {
    let scene = effect_scene(SceneEnvironment::default());
    let mut renderer = renderer();
    let mut target = output();
    begin(&mut renderer, Vec3::new(0.0, 3.0, 6.0), Vec3::ZERO, Vec3::Y);
    renderer.render_scene(&scene, &mut target).unwrap();
    renderer.release_target(&mut target);

    assert!(renderer.backend().live_texture_count() > 0);
    renderer.cleanup();
    assert_eq!(renderer.backend().live_texture_count(), 0);
    assert_eq!(renderer.backend().live_mesh_count(), 0);
}

#[test]
fn test_barrel_distortion_reads_depth_of_field_only_when_enabled() {
    let barrel_source = |dof: bool| {
        let mut environment = SceneEnvironment::default();
        environment.barrel_distortion.enabled = true;
        environment.barrel_distortion.distortion = 0.2;
        environment.dof.enabled = dof;
        let scene = effect_scene(environment);

        let mut renderer = renderer();
        let mut target = output();
        begin(&mut renderer, Vec3::new(0.0, 3.0, 6.0), Vec3::ZERO, Vec3::Y);
        renderer.render_scene(&scene, &mut target).unwrap();

        let barrel = renderer.shaders().resolve(names::BARREL_DISTORTION).unwrap();
        let source = renderer
            .backend()
            .draws_in("Barrel Distortion")
            .into_iter()
            .find(|d| d.shader == Some(barrel))
            .and_then(|d| d.texture("u_Source"));
        let targets = renderer.targets();
        let dof_output = targets.find("DOF").and_then(|id| targets.color_texture(id));
        let reflected = targets
            .find("Composite A")
            .and_then(|id| targets.color_texture(id));
        (source, dof_output, reflected)
    };

    let (source, dof_output, reflected) = barrel_source(true);
    assert!(source.is_some());
    assert_eq!(source, dof_output);
    assert_ne!(source, reflected);

    let (source, dof_output, reflected) = barrel_source(false);
    assert!(source.is_some());
    assert_eq!(source, reflected);
    assert_ne!(source, dof_output);
}

#[test]
fn test_vignette_skips_depth_of_field_without_barrel_distortion() {
    let mut environment = SceneEnvironment::default();
    environment.dof.enabled = true;
    environment.barrel_distortion.enabled = false;
    let scene = effect_scene(environment);

    let mut renderer = renderer();
    let mut target = output();
    begin(&mut renderer, Vec3::new(0.0, 3.0, 6.0), Vec3::ZERO, Vec3::Y);
    renderer.render_scene(&scene, &mut target).unwrap();

    let vignette = renderer.shaders().resolve(names::VIGNETTE).unwrap();
    let source = renderer
        .backend()
        .draws_in("Vignette")
        .into_iter()
        .find(|d| d.shader == Some(vignette))
        .and_then(|d| d.texture("u_Source"));
    let targets = renderer.targets();
    let reflected = targets
        .find("Composite A")
        .and_then(|id| targets.color_texture(id));

    assert!(source.is_some());
    assert_eq!(source, reflected);
    assert!(renderer.backend().pass_labels().iter().any(|l| l == "DOF"));
}

#[test]
fn test_particles_without_material_are_skipped() {
    let mut scene = Scene::new();
    scene.world.spawn((
        Transform::from_position(Vec3::new(0.0, 1.0, 0.0)),
        ParticleEmitterComponent {
            material: None,
            particles: vec![Particle::new(Vec3::ZERO, 1.0)],
            ..Default::default()
        },
    ));
    scene.update_global_transforms();

    let mut renderer = renderer();
    let mut target = output();
    begin(&mut renderer, Vec3::new(0.0, 2.0, 5.0), Vec3::ZERO, Vec3::Y);
    renderer.render_scene(&scene, &mut target).unwrap();

    assert!(renderer.backend().draws_in(GBufferPass::LABEL).is_empty());
}

#[test]
fn test_spot_shadow_includes_skinned_casters() {
    let model = Arc::new(SkinnedModel::new(
        "Character",
        vec![MeshInstance::untextured(Arc::new(Mesh::cube()))],
        SkeletonNode::new("Root", 0, Mat4::IDENTITY),
    ));
    let mut scene = Scene::new();
    scene
        .world
        .spawn((Transform::new(), SkinnedModelComponent::new(model)));
    scene.world.spawn((
        Transform::from_position(Vec3::new(0.0, 5.0, 0.0)),
        LightComponent::spot(Vec3::ONE, 2.0, 20.0, 0.3, 0.5).with_shadows(),
    ));
    scene.update_global_transforms();

    let mut renderer = renderer();
    let mut target = output();
    begin(&mut renderer, Vec3::new(0.0, 2.0, 5.0), Vec3::ZERO, Vec3::Y);
    renderer.render_scene(&scene, &mut target).unwrap();
    assert_eq!(renderer.last_frame().shadow_maps, 1);

    let skinned = renderer.shaders().resolve(names::SHADOW_MAP_SKINNED).unwrap();
    let shadow_draws: Vec<_> = renderer
        .backend()
        .draws()
        .iter()
        .filter(|d| d.pass.starts_with("Shadow") && d.shader == Some(skinned))
        .collect();
    assert_eq!(shadow_draws.len(), 1);
    assert!(shadow_draws[0].uniform("u_LightTransform").is_some());
}

#[test]
fn test_gizmos_of_different_sizes_keep_their_own_geometry() {
    let scene = Scene::new();
    let mut renderer = renderer();
    let gizmo = renderer.shaders().resolve(names::LINE_GIZMO).unwrap();
    let capsule = |radius: f32, height: f32, rotation: Quat| {
        DebugShape::new(
            Vec3::ZERO,
            rotation,
            PhysicsShape::Capsule { radius, height },
            Vec4::ONE,
            1.0,
        )
    };
    let gizmo_meshes = |renderer: &SceneRenderer<RecordingBackend>| -> Vec<_> {
        renderer
            .backend()
            .draws()
            .iter()
            .filter(|d| d.shader == Some(gizmo))
            .map(|d| d.mesh)
            .collect()
    };

    renderer.draw_debug_shape(capsule(0.5, 1.0, Quat::IDENTITY));
    renderer.draw_debug_shape(capsule(2.0, 4.0, Quat::IDENTITY));
    renderer.draw_debug_shape(capsule(0.5, 1.0, Quat::IDENTITY));
    let mut target = output();
    begin(&mut renderer, Vec3::new(0.0, 0.0, 8.0), Vec3::ZERO, Vec3::Y);
    renderer.render_scene(&scene, &mut target).unwrap();

    let meshes = gizmo_meshes(&renderer);
    assert_eq!(meshes.len(), 3);
    assert!(meshes.iter().all(Option::is_some));
    assert_ne!(meshes[0], meshes[1]);
    assert_eq!(meshes[0], meshes[2]);
    let (small, large) = (meshes[0].unwrap(), meshes[1].unwrap());

    renderer.update(1.0, false);
    renderer.draw_debug_shape(capsule(2.0, 4.0, Quat::from_xyzw(0.0, 0.0, 0.0, 0.0)));
    renderer.backend_mut().clear_commands();
    renderer.render_scene(&scene, &mut target).unwrap();

    let draws: Vec<_> = renderer
        .backend()
        .draws()
        .iter()
        .filter(|d| d.shader == Some(gizmo))
        .collect();
    assert_eq!(draws.len(), 1);
    assert_eq!(draws[0].mesh, Some(large));
    let view = draws[0].uniform("u_View").and_then(|u| u.as_mat4()).unwrap();
    assert!(view.is_finite());
    assert!(renderer
        .backend()
        .commands()
        .contains(&Command::DestroyMesh(small)));
}

#[test]
fn test_released_shadow_map_is_unbound_from_shading() {
    let mut scene = effect_scene(SceneEnvironment::default());
    let mut renderer = renderer();
    let deferred = renderer.shaders().resolve(names::DEFERRED).unwrap();
    let cascade_binding = |renderer: &SceneRenderer<RecordingBackend>| {
        renderer
            .backend()
            .draws_in("Shading")
            .into_iter()
            .find(|d| d.shader == Some(deferred))
            .map(|d| d.texture("u_CascadeShadowMap0"))
    };

    let mut target = output();
    begin(&mut renderer, Vec3::new(0.0, 3.0, 6.0), Vec3::ZERO, Vec3::Y);
    renderer.render_scene(&scene, &mut target).unwrap();
    assert!(matches!(cascade_binding(&renderer), Some(Some(_))));

    let lights: Vec<_> = scene
        .world
        .iter_entities()
        .filter(|e| e.contains::<LightComponent>())
        .map(|e| e.id())
        .collect();
    for light in lights {
        scene.world.despawn(light);
    }

    renderer.backend_mut().clear_commands();
    renderer.render_scene(&scene, &mut target).unwrap();
    assert!(renderer.shadows().is_empty());
    assert_eq!(cascade_binding(&renderer), Some(None));
    assert!(renderer.backend().commands().contains(&Command::UnbindTexture {
        shader: deferred,
        name: "u_CascadeShadowMap0".to_string(),
    }));
}
