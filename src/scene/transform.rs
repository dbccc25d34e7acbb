//! Transform components

use bevy_ecs::prelude::*;
use glam::{Mat4, Quat, Vec3};

/// Local transform, relative to the [`Parent`] if there is one
#[derive(Component, Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    pub position: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            scale: Vec3::ONE,
        }
    }
}

impl Transform {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_position(position: Vec3) -> Self {
        Self {
            position,
            ..Default::default()
        }
    }

    pub fn from_position_rotation(position: Vec3, rotation: Quat) -> Self {
        Self {
            position,
            rotation,
            ..Default::default()
        }
    }

    pub fn from_position_scale(position: Vec3, scale: Vec3) -> Self {
        Self {
            position,
            scale,
            ..Default::default()
        }
    }

    /// Get the model matrix for this transform
    pub fn matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scale, self.rotation, self.position)
    }

    /// Get forward direction (local -Z in world space)
    pub fn forward(&self) -> Vec3 {
        self.rotation * -Vec3::Z
    }

    /// Rotate around an axis
    pub fn rotate_axis(&mut self, axis: Vec3, angle: f32) {
        let delta = Quat::from_axis_angle(axis, angle);
        self.rotation = delta * self.rotation;
    }

    /// Look at a target position
    pub fn look_at(&mut self, target: Vec3, up: Vec3) {
        let forward = (target - self.position).normalize();
        let right = up.cross(forward).normalize();
        let up = forward.cross(right);

        self.rotation = Quat::from_mat3(&glam::Mat3::from_cols(right, up, -forward));
    }
}

/// World-space transform resolved from the [`Transform`] hierarchy.
///
/// Written by `Scene::update_global_transforms`, read by the renderer.
#[derive(Component, Debug, Clone, Copy, PartialEq)]
pub struct GlobalTransform(pub Mat4);

impl Default for GlobalTransform {
    fn default() -> Self {
        Self(Mat4::IDENTITY)
    }
}

impl GlobalTransform {
    pub fn matrix(&self) -> Mat4 {
        self.0
    }

    pub fn translation(&self) -> Vec3 {
        self.0.w_axis.truncate()
    }

    pub fn rotation(&self) -> Quat {
        self.0.to_scale_rotation_translation().1
    }

    pub fn scale(&self) -> Vec3 {
        self.0.to_scale_rotation_translation().0
    }
}

impl From<Transform> for GlobalTransform {
    fn from(transform: Transform) -> Self {
        Self(transform.matrix())
    }
}

/// Hierarchy link to the entity this one is attached to
#[derive(Component, Debug, Clone, Copy, PartialEq, Eq)]
pub struct Parent(pub Entity);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_global_transform_decomposes() {
        let rotation = Quat::from_rotation_y(0.5);
        let global = GlobalTransform::from(Transform {
            position: Vec3::new(1.0, 2.0, 3.0),
            rotation,
            scale: Vec3::splat(2.0),
        });

        assert_eq!(global.translation(), Vec3::new(1.0, 2.0, 3.0));
        assert!(global.scale().abs_diff_eq(Vec3::splat(2.0), 1e-5));
        assert!(global.rotation().abs_diff_eq(rotation, 1e-5));
    }
}
