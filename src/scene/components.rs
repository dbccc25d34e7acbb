//! Renderable scene components

use std::sync::Arc;

use bevy_ecs::prelude::*;
use glam::{Vec3, Vec4};

use crate::resources::{Material, MeshInstance, Model, SkinnedModel};

/// Unique entity name. Skeleton bones are resolved through it.
#[derive(Component, Debug, Clone, PartialEq, Eq, Hash)]
pub struct Name(pub String);

impl Name {
    pub fn new(name: &str) -> Self {
        Self(name.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Entities without this component are visible
#[derive(Component, Debug, Clone, Copy, PartialEq, Eq)]
pub struct Visibility {
    pub visible: bool,
}

impl Default for Visibility {
    fn default() -> Self {
        Self { visible: true }
    }
}

impl Visibility {
    pub fn hidden() -> Self {
        Self { visible: false }
    }
}

/// A static model. `None` while the model is still loading.
#[derive(Component, Debug, Clone, Default)]
pub struct ModelComponent {
    pub model: Option<Arc<Model>>,
}

impl ModelComponent {
    pub fn new(model: Arc<Model>) -> Self {
        Self { model: Some(model) }
    }
}

/// Level brush geometry
#[derive(Component, Debug, Clone, Default)]
pub struct BrushComponent {
    pub model: Option<Arc<Model>>,
    /// Transparent brushes render in the translucent group and cast no shadows
    pub transparent: bool,
}

impl BrushComponent {
    pub fn new(model: Arc<Model>) -> Self {
        Self {
            model: Some(model),
            transparent: false,
        }
    }

    pub fn transparent(model: Arc<Model>) -> Self {
        Self {
            model: Some(model),
            transparent: true,
        }
    }
}

#[derive(Component, Debug, Clone, Default)]
pub struct SkinnedModelComponent {
    pub model: Option<Arc<SkinnedModel>>,
}

impl SkinnedModelComponent {
    pub fn new(model: Arc<SkinnedModel>) -> Self {
        Self { model: Some(model) }
    }
}

/// A textured quad, optionally turned towards the camera every frame
#[derive(Component, Debug, Clone, Default)]
pub struct SpriteComponent {
    pub billboard: bool,
    /// Face the camera position instead of copying the camera orientation
    pub position_facing: bool,
    /// Keep world up as the sprite's up axis (yaw only)
    pub lock_y: bool,
    pub mesh: Option<MeshInstance>,
}

/// One live particle, relative to its emitter unless the emitter is global-space
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Particle {
    pub position: Vec3,
    pub scale: f32,
}

impl Particle {
    pub fn new(position: Vec3, scale: f32) -> Self {
        Self { position, scale }
    }
}

/// Particle emitter state as simulated elsewhere; the renderer only draws it
#[derive(Component, Debug, Clone)]
pub struct ParticleEmitterComponent {
    pub material: Option<Arc<Material>>,
    pub particle_scale: Vec3,
    pub global_space: bool,
    pub particles: Vec<Particle>,
}

impl Default for ParticleEmitterComponent {
    fn default() -> Self {
        Self {
            material: None,
            particle_scale: Vec3::ONE,
            global_space: false,
            particles: Vec::new(),
        }
    }
}

/// Light type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LightType {
    Directional,
    Spot,
    Point,
}

impl LightType {
    /// Value written to the shading shader's light type array
    pub fn shader_index(&self) -> i32 {
        match self {
            LightType::Point => 0,
            LightType::Spot => 1,
            LightType::Directional => 2,
        }
    }
}

/// Light component. Position and orientation come from the entity transform.
#[derive(Component, Debug, Clone, PartialEq)]
pub struct LightComponent {
    pub kind: LightType,
    pub color: Vec3,
    pub strength: f32,
    pub cast_shadows: bool,
    /// Directional lights only: contributes to volumetric fog
    pub volumetric: bool,
    /// Directional lights only: follow the procedural sky's sun
    pub sync_direction_with_sky: bool,
    /// Spot cone, radians
    pub inner_angle: f32,
    pub outer_angle: f32,
    pub range: f32,
}

impl Default for LightComponent {
    fn default() -> Self {
        Self {
            kind: LightType::Point,
            color: Vec3::ONE,
            strength: 1.0,
            cast_shadows: false,
            volumetric: false,
            sync_direction_with_sky: false,
            inner_angle: 0.3,
            outer_angle: 0.5,
            range: 10.0,
        }
    }
}

impl LightComponent {
    pub fn point(color: Vec3, strength: f32, range: f32) -> Self {
        Self {
            kind: LightType::Point,
            color,
            strength,
            range,
            ..Default::default()
        }
    }

    pub fn spot(color: Vec3, strength: f32, range: f32, inner_angle: f32, outer_angle: f32) -> Self {
        Self {
            kind: LightType::Spot,
            color,
            strength,
            range,
            inner_angle,
            outer_angle,
            ..Default::default()
        }
    }

    pub fn directional(color: Vec3, strength: f32) -> Self {
        Self {
            kind: LightType::Directional,
            color,
            strength,
            range: f32::INFINITY,
            ..Default::default()
        }
    }

    pub fn with_shadows(mut self) -> Self {
        self.cast_shadows = true;
        self
    }

    pub fn with_volumetric(mut self) -> Self {
        self.volumetric = true;
        self
    }

    pub fn synced_with_sky(mut self) -> Self {
        self.sync_direction_with_sky = true;
        self
    }

    /// RGB color with strength in w
    pub fn color_strength(&self) -> Vec4 {
        self.color.extend(self.strength)
    }
}
