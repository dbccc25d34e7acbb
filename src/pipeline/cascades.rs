//! Cascaded shadow map fitting for directional lights

use glam::{Mat4, Vec3, Vec4};

use crate::scene::FrameCamera;

/// One slice of the view frustum as seen from the light
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Cascade {
    /// Light projection × light view
    pub view_projection: Mat4,
    /// View-space distance where this cascade ends
    pub split_depth: f32,
}

/// Near and far planes encoded in a right-handed, zero-to-one depth perspective matrix.
///
/// Falls back to `(0.1, fallback_far)` for matrices without a finite perspective depth range.
pub fn clip_planes(projection: Mat4, fallback_far: f32) -> (f32, f32) {
    let near = projection.w_axis.z / projection.z_axis.z;
    let far = projection.w_axis.z / (projection.z_axis.z + 1.0);
    if near.is_finite() && far.is_finite() && near > 0.0 && far > near {
        (near, far)
    } else {
        (0.1, fallback_far.max(0.2))
    }
}

/// Split distances mixing logarithmic and uniform schemes, as fractions of the
/// camera clip range
fn split_fractions(near: f32, far: f32, max_distance: f32, count: usize, lambda: f32) -> Vec<f32> {
    let clip_range = far - near;
    let min_z = near;
    let max_z = far.min(max_distance).max(near + f32::EPSILON);
    let range = max_z - min_z;
    let ratio = max_z / min_z;

    (0..count)
        .map(|i| {
            let p = (i + 1) as f32 / count as f32;
            let log = min_z * ratio.powf(p);
            let uniform = min_z + range * p;
            let d = lambda * (log - uniform) + uniform;
            (d - near) / clip_range
        })
        .collect()
}

/// Fit `count` orthographic cascades covering the camera frustum up to `shadow_distance`.
///
/// `light_direction` is the direction light travels.
pub fn compute_cascades(
    camera: &FrameCamera,
    light_direction: Vec3,
    count: usize,
    split_lambda: f32,
    shadow_distance: f32,
) -> Vec<Cascade> {
    if count == 0 {
        return Vec::new();
    }

    let direction = light_direction.try_normalize().unwrap_or(Vec3::NEG_Y);
    let (near, far) = clip_planes(camera.projection, shadow_distance);
    let splits = split_fractions(near, far, shadow_distance, count, split_lambda);
    let corners = frustum_corners(camera.view_projection().inverse());

    let up = if direction.dot(Vec3::Y).abs() > 0.99 {
        Vec3::Z
    } else {
        Vec3::Y
    };

    let mut cascades = Vec::with_capacity(count);
    let mut last_split = 0.0;
    for split in splits {
        let mut slice = corners;
        for i in 0..4 {
            let edge = corners[i + 4] - corners[i];
            slice[i + 4] = corners[i] + edge * split;
            slice[i] = corners[i] + edge * last_split;
        }

        let center = slice.iter().copied().sum::<Vec3>() / 8.0;
        let radius = slice
            .iter()
            .map(|c| c.distance(center))
            .fold(0.0f32, f32::max);
        // Snapped so the projection size does not shimmer as the camera rotates
        let radius = ((radius * 16.0).ceil() / 16.0).max(1.0 / 16.0);

        let eye = center - direction * radius;
        let light_view = Mat4::look_at_rh(eye, center, up);
        let light_projection =
            Mat4::orthographic_rh(-radius, radius, -radius, radius, 0.0, radius * 2.0);

        cascades.push(Cascade {
            view_projection: light_projection * light_view,
            split_depth: near + split * (far - near),
        });
        last_split = split;
    }

    cascades
}

/// World-space frustum corners: the near plane (0..4) then the far plane (4..8)
fn frustum_corners(inverse_view_projection: Mat4) -> [Vec3; 8] {
    let mut corners = [Vec3::ZERO; 8];
    let ndc = [(-1.0, 1.0), (1.0, 1.0), (1.0, -1.0), (-1.0, -1.0)];
    for (plane, z) in [0.0f32, 1.0].into_iter().enumerate() {
        for (i, (x, y)) in ndc.iter().enumerate() {
            let world = inverse_view_projection * Vec4::new(*x, *y, z, 1.0);
            corners[plane * 4 + i] = world.truncate() / world.w;
        }
    }
    corners
}

#[cfg(test)]
mod tests {
    use super::*;

    fn camera() -> FrameCamera {
        FrameCamera::new(
            Mat4::perspective_rh(60f32.to_radians(), 16.0 / 9.0, 0.1, 500.0),
            Mat4::look_at_rh(Vec3::new(0.0, 2.0, 10.0), Vec3::ZERO, Vec3::Y),
            Vec3::new(0.0, 2.0, 10.0),
        )
    }

    #[test]
    fn test_clip_planes_from_perspective() {
        let (near, far) = clip_planes(camera().projection, 100.0);
        assert!((near - 0.1).abs() < 1e-4);
        assert!((far - 500.0).abs() < 1.0);
    }

    #[test]
    fn test_splits_increase_and_respect_shadow_distance() {
        let cascades = compute_cascades(&camera(), Vec3::new(0.3, -1.0, 0.2), 4, 0.91, 100.0);
        assert_eq!(cascades.len(), 4);
        for pair in cascades.windows(2) {
            assert!(pair[0].split_depth < pair[1].split_depth);
        }
        assert!((cascades[3].split_depth - 100.0).abs() < 0.01);
    }

    #[test]
    fn test_cascade_contains_its_slice_center() {
        let cam = camera();
        let cascades = compute_cascades(&cam, Vec3::NEG_Y, 2, 0.5, 50.0);
        // A point right in front of the camera lands inside the first cascade
        let point = Vec3::new(0.0, 2.0, 9.0);
        let clip = cascades[0].view_projection * point.extend(1.0);
        let ndc = clip.truncate() / clip.w;
        assert!(ndc.x.abs() <= 1.0 && ndc.y.abs() <= 1.0);
        assert!((0.0..=1.0).contains(&ndc.z));
        assert!(cascades.iter().all(|c| c.view_projection.is_finite()));
    }
}
