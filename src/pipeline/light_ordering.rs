//! Per-frame light collection

use bevy_ecs::entity::Entity;
use glam::{Mat4, Vec3, Vec4};

use crate::scene::{LightComponent, LightType, Scene};

/// A visible light, resolved to world space for this frame
#[derive(Debug, Clone, PartialEq)]
pub struct OrderedLight {
    pub entity: Entity,
    pub light: LightComponent,
    /// World transform of the light entity
    pub transform: Mat4,
    pub position: Vec3,
    /// Direction the light travels
    pub direction: Vec3,
    /// Distance from the camera used for ordering
    pub distance: f32,
}

impl OrderedLight {
    pub fn kind(&self) -> LightType {
        self.light.kind
    }

    pub fn casts_shadows(&self) -> bool {
        self.light.cast_shadows
    }

    pub fn color_strength(&self) -> Vec4 {
        self.light.color_strength()
    }
}

/// Collect visible lights ordered nearest first.
///
/// Lights at equal distance keep their scene order. Directional lights that
/// follow the sky take the procedural sun direction, other directional lights
/// point along their local +Z and spot lights along their local -Z.
pub fn collect_lights(scene: &Scene, camera_position: Vec3) -> Vec<OrderedLight> {
    let sun_direction = scene.environment.procedural_sky.sun_direction;

    let mut lights: Vec<OrderedLight> = scene
        .lights()
        .map(|(entity, global, light)| {
            let position = global.translation();
            let rotation = global.rotation();
            let direction = match light.kind {
                LightType::Directional if light.sync_direction_with_sky => sun_direction,
                LightType::Directional => rotation * Vec3::Z,
                LightType::Spot | LightType::Point => rotation * Vec3::NEG_Z,
            }
            .normalize_or_zero();

            OrderedLight {
                entity,
                light: light.clone(),
                transform: global.matrix(),
                position,
                direction,
                distance: position.distance(camera_position),
            }
        })
        .collect();

    lights.sort_by(|a, b| a.distance.total_cmp(&b.distance));
    lights
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::Transform;

    fn spawn_light(scene: &mut Scene, x: f32) -> Entity {
        scene
            .world
            .spawn((
                LightComponent::point(Vec3::ONE, x, 10.0),
                Transform::from_position(Vec3::new(x, 0.0, 0.0)),
            ))
            .id()
    }

    #[test]
    fn test_lights_sorted_by_distance() {
        let mut scene = Scene::new();
        let far = spawn_light(&mut scene, 5.0);
        let near = spawn_light(&mut scene, 1.0);
        let middle = spawn_light(&mut scene, 3.0);

        let lights = collect_lights(&scene, Vec3::ZERO);
        let order: Vec<Entity> = lights.iter().map(|l| l.entity).collect();
        assert_eq!(order, vec![near, middle, far]);
        assert_eq!(lights[0].distance, 1.0);
    }

    #[test]
    fn test_equal_distances_keep_scene_order() {
        let mut scene = Scene::new();
        let first = spawn_light(&mut scene, 2.0);
        let second = spawn_light(&mut scene, -2.0);

        let lights = collect_lights(&scene, Vec3::ZERO);
        assert_eq!(lights[0].entity, first);
        assert_eq!(lights[1].entity, second);
    }

    #[test]
    fn test_sky_synced_directional_uses_sun() {
        let mut scene = Scene::new();
        let sun = Vec3::new(0.0, -1.0, 0.0);
        scene.environment.procedural_sky.sun_direction = sun;
        scene
            .world
            .spawn(LightComponent::directional(Vec3::ONE, 3.0).synced_with_sky());
        scene
            .world
            .spawn(LightComponent::directional(Vec3::ONE, 3.0));

        let lights = collect_lights(&scene, Vec3::ZERO);
        assert_eq!(lights[0].direction, sun);
        assert_eq!(lights[1].direction, Vec3::Z);
    }
}
