//! Scene management
//!
//! A [`Scene`] is a bevy_ecs [`World`] holding the renderer's component
//! vocabulary plus the [`SceneEnvironment`] settings table. The renderer only
//! reads it.

mod camera;
mod components;
mod environment;
mod transform;

pub use camera::*;
pub use components::*;
pub use environment::*;
pub use transform::*;

use std::collections::HashMap;

use bevy_ecs::prelude::{Component, Entity, World};
use glam::Mat4;

/// Entity lookup by [`Name`]
#[derive(Debug, Clone, Default)]
pub struct NameIndex {
    entities: HashMap<String, Entity>,
}

impl NameIndex {
    pub fn get(&self, name: &str) -> Option<Entity> {
        self.entities.get(name).copied()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entities.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}

/// The scene containing all renderable content
pub struct Scene {
    pub world: World,
    pub environment: SceneEnvironment,
}

impl Default for Scene {
    fn default() -> Self {
        Self::new()
    }
}

impl Scene {
    pub fn new() -> Self {
        Self {
            world: World::new(),
            environment: SceneEnvironment::default(),
        }
    }

    pub fn with_environment(environment: SceneEnvironment) -> Self {
        Self {
            world: World::new(),
            environment,
        }
    }

    /// Resolve every [`Transform`] through its [`Parent`] chain into a
    /// [`GlobalTransform`]. The hierarchy must be acyclic.
    pub fn update_global_transforms(&mut self) {
        let locals: HashMap<Entity, (Mat4, Option<Entity>)> = self
            .world
            .iter_entities()
            .filter_map(|e| {
                let transform = e.get::<Transform>()?;
                Some((e.id(), (transform.matrix(), e.get::<Parent>().map(|p| p.0))))
            })
            .collect();

        let mut resolved = HashMap::with_capacity(locals.len());
        for entity in locals.keys() {
            resolve_global(*entity, &locals, &mut resolved);
        }

        for (entity, matrix) in resolved {
            self.world.entity_mut(entity).insert(GlobalTransform(matrix));
        }
    }

    pub fn name_index(&self) -> NameIndex {
        NameIndex {
            entities: self
                .world
                .iter_entities()
                .filter_map(|e| Some((e.get::<Name>()?.0.clone(), e.id())))
                .collect(),
        }
    }

    /// Visible entities carrying `T`, with their world transform.
    ///
    /// Entities without a [`Visibility`] component count as visible; entities
    /// with neither transform component are placed at the origin.
    pub fn visible<T: Component>(&self) -> impl Iterator<Item = (Entity, GlobalTransform, &T)> {
        self.world.iter_entities().filter_map(|e| {
            let component = e.get::<T>()?;
            if !e.get::<Visibility>().map_or(true, |v| v.visible) {
                return None;
            }
            let global = e
                .get::<GlobalTransform>()
                .copied()
                .or_else(|| e.get::<Transform>().map(|t| GlobalTransform::from(*t)))
                .unwrap_or_default();
            Some((e.id(), global, component))
        })
    }

    pub fn models(&self) -> impl Iterator<Item = (Entity, GlobalTransform, &ModelComponent)> {
        self.visible::<ModelComponent>()
    }

    pub fn brushes(&self) -> impl Iterator<Item = (Entity, GlobalTransform, &BrushComponent)> {
        self.visible::<BrushComponent>()
    }

    pub fn skinned_models(
        &self,
    ) -> impl Iterator<Item = (Entity, GlobalTransform, &SkinnedModelComponent)> {
        self.visible::<SkinnedModelComponent>()
    }

    pub fn sprites(&self) -> impl Iterator<Item = (Entity, GlobalTransform, &SpriteComponent)> {
        self.visible::<SpriteComponent>()
    }

    pub fn particle_emitters(
        &self,
    ) -> impl Iterator<Item = (Entity, GlobalTransform, &ParticleEmitterComponent)> {
        self.visible::<ParticleEmitterComponent>()
    }

    pub fn lights(&self) -> impl Iterator<Item = (Entity, GlobalTransform, &LightComponent)> {
        self.visible::<LightComponent>()
    }
}

fn resolve_global(
    entity: Entity,
    locals: &HashMap<Entity, (Mat4, Option<Entity>)>,
    resolved: &mut HashMap<Entity, Mat4>,
) -> Mat4 {
    if let Some(matrix) = resolved.get(&entity) {
        return *matrix;
    }
    let Some((local, parent)) = locals.get(&entity) else {
        return Mat4::IDENTITY;
    };
    let matrix = match parent {
        Some(parent) => resolve_global(*parent, locals, resolved) * *local,
        None => *local,
    };
    resolved.insert(entity, matrix);
    matrix
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    #[test]
    fn test_global_transforms_follow_parents() {
        let mut scene = Scene::new();
        let parent = scene
            .world
            .spawn(Transform::from_position(Vec3::new(1.0, 0.0, 0.0)))
            .id();
        let child = scene
            .world
            .spawn((
                Transform::from_position(Vec3::new(0.0, 2.0, 0.0)),
                Parent(parent),
            ))
            .id();

        scene.update_global_transforms();

        let global = scene.world.get::<GlobalTransform>(child).unwrap();
        assert_eq!(global.translation(), Vec3::new(1.0, 2.0, 0.0));
    }

    #[test]
    fn test_hidden_entities_are_skipped() {
        let mut scene = Scene::new();
        scene.world.spawn(ModelComponent::default());
        scene
            .world
            .spawn((ModelComponent::default(), Visibility::hidden()));
        scene
            .world
            .spawn((ModelComponent::default(), Visibility::default()));

        assert_eq!(scene.models().count(), 2);
    }

    #[test]
    fn test_name_index() {
        let mut scene = Scene::new();
        let bone = scene.world.spawn(Name::new("spine")).id();

        let index = scene.name_index();
        assert_eq!(index.get("spine"), Some(bone));
        assert!(!index.contains("head"));
    }
}
