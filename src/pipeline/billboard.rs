//! Camera-facing transforms for sprites and particles

use glam::{Mat4, Vec3, Vec4};

use crate::scene::{GlobalTransform, Particle, SpriteComponent};

const EPSILON: f32 = 1e-6;

/// World matrix of a sprite for the current view
pub fn sprite_transform(sprite: &SpriteComponent, global: &GlobalTransform, view: Mat4) -> Mat4 {
    if !sprite.billboard {
        return global.matrix();
    }

    let position = global.translation();
    let mut orientation = if sprite.position_facing {
        facing_position(position, view.inverse().w_axis.truncate())
    } else {
        view.inverse()
    };

    if sprite.lock_y {
        orientation = lock_y(orientation);
    }

    orientation.w_axis = position.extend(1.0);
    orientation * Mat4::from_scale(global.scale())
}

/// World matrix of one particle quad. Particles always copy the camera orientation.
pub fn particle_transform(
    particle: &Particle,
    emitter: &GlobalTransform,
    global_space: bool,
    base_scale: Vec3,
    view: Mat4,
) -> Mat4 {
    let position = if global_space {
        particle.position
    } else {
        emitter.translation() + particle.position
    };

    let scale = if particle.scale != 1.0 {
        base_scale + base_scale * particle.scale
    } else {
        base_scale
    };

    let mut orientation = view.inverse();
    orientation.w_axis = position.extend(1.0);
    orientation * Mat4::from_scale(scale)
}

/// Rotation whose -Z axis points from `position` towards `camera`
fn facing_position(position: Vec3, camera: Vec3) -> Mat4 {
    let direction = camera - position;
    if direction.length_squared() < EPSILON {
        return Mat4::IDENTITY;
    }
    let up = if direction.normalize().dot(Vec3::Y).abs() > 0.999 {
        Vec3::Z
    } else {
        Vec3::Y
    };
    Mat4::look_at_rh(Vec3::ZERO, direction, up).inverse()
}

/// Keep world up as the up axis and flatten the forward axis onto the ground plane
fn lock_y(orientation: Mat4) -> Mat4 {
    let up = Vec3::Y;
    let mut forward = Vec3::new(orientation.z_axis.x, 0.0, orientation.z_axis.z);
    if forward.length_squared() < EPSILON {
        // Looking straight up or down: derive forward from the right axis
        let right = Vec3::new(orientation.x_axis.x, 0.0, orientation.x_axis.z);
        let right = if right.length_squared() < EPSILON {
            Vec3::X
        } else {
            right.normalize()
        };
        forward = right.cross(up);
    }
    let forward = forward.normalize();
    let right = up.cross(forward);

    Mat4::from_cols(
        right.extend(0.0),
        up.extend(0.0),
        forward.extend(0.0),
        Vec4::W,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: Vec3, b: Vec3) -> bool {
        (a - b).length() < 1e-4
    }

    #[test]
    fn test_non_billboard_uses_world_transform() {
        let sprite = SpriteComponent::default();
        let global = GlobalTransform(Mat4::from_translation(Vec3::new(1.0, 2.0, 3.0)));
        let view = Mat4::look_at_rh(Vec3::new(0.0, 0.0, 5.0), Vec3::ZERO, Vec3::Y);

        assert_eq!(sprite_transform(&sprite, &global, view), global.matrix());
    }

    #[test]
    fn test_billboard_copies_camera_orientation() {
        let sprite = SpriteComponent {
            billboard: true,
            ..Default::default()
        };
        let global = GlobalTransform(Mat4::from_translation(Vec3::new(4.0, 0.0, 0.0)));
        let view = Mat4::look_at_rh(Vec3::new(10.0, 3.0, 10.0), Vec3::ZERO, Vec3::Y);

        let m = sprite_transform(&sprite, &global, view);
        let camera = view.inverse();
        assert!(approx(m.x_axis.truncate(), camera.x_axis.truncate()));
        assert!(approx(m.z_axis.truncate(), camera.z_axis.truncate()));
        assert!(approx(m.w_axis.truncate(), Vec3::new(4.0, 0.0, 0.0)));
    }

    #[test]
    fn test_position_facing_points_at_camera() {
        let sprite = SpriteComponent {
            billboard: true,
            position_facing: true,
            ..Default::default()
        };
        let global = GlobalTransform(Mat4::IDENTITY);
        let view = Mat4::look_at_rh(Vec3::new(0.0, 0.0, 5.0), Vec3::new(0.0, 0.0, -1.0), Vec3::Y);

        let m = sprite_transform(&sprite, &global, view);
        // -Z points towards the camera at +Z
        assert!(approx(-m.z_axis.truncate(), Vec3::Z));
    }

    #[test]
    fn test_lock_y_keeps_world_up_from_above() {
        let sprite = SpriteComponent {
            billboard: true,
            lock_y: true,
            ..Default::default()
        };
        let global = GlobalTransform(Mat4::from_translation(Vec3::new(0.0, 1.0, 0.0)));
        let view = Mat4::look_at_rh(Vec3::new(0.0, 10.0, 0.0), Vec3::ZERO, Vec3::NEG_Z);

        let m = sprite_transform(&sprite, &global, view);
        assert!(approx(m.y_axis.truncate(), Vec3::Y));
        assert!(m.x_axis.truncate().is_finite());
        assert!(m.z_axis.truncate().is_finite());
        assert!((m.z_axis.truncate().length() - 1.0).abs() < 1e-4);
        assert!(m.z_axis.truncate().dot(Vec3::Y).abs() < 1e-4);
    }

    #[test]
    fn test_lock_y_from_oblique_camera() {
        let sprite = SpriteComponent {
            billboard: true,
            lock_y: true,
            ..Default::default()
        };
        let view = Mat4::look_at_rh(Vec3::new(3.0, 6.0, 3.0), Vec3::ZERO, Vec3::Y);

        let m = sprite_transform(&sprite, &GlobalTransform::default(), view);
        assert!(approx(m.y_axis.truncate(), Vec3::Y));
        assert!(approx(
            m.z_axis.truncate(),
            Vec3::new(1.0, 0.0, 1.0).normalize()
        ));
    }

    #[test]
    fn test_particle_scale_and_space() {
        let emitter = GlobalTransform(Mat4::from_translation(Vec3::new(10.0, 0.0, 0.0)));
        let particle = Particle::new(Vec3::new(1.0, 0.0, 0.0), 2.0);
        let view = Mat4::IDENTITY;

        let local = particle_transform(&particle, &emitter, false, Vec3::ONE, view);
        assert!(approx(local.w_axis.truncate(), Vec3::new(11.0, 0.0, 0.0)));
        assert!(approx(local.x_axis.truncate(), Vec3::new(3.0, 0.0, 0.0)));

        let global = particle_transform(&particle, &emitter, true, Vec3::ONE, view);
        assert!(approx(global.w_axis.truncate(), Vec3::new(1.0, 0.0, 0.0)));

        let unit = Particle::new(Vec3::ZERO, 1.0);
        let m = particle_transform(&unit, &emitter, false, Vec3::splat(0.5), view);
        assert!(approx(m.x_axis.truncate(), Vec3::new(0.5, 0.0, 0.0)));
    }
}
