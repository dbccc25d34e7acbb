//! Time-limited debug lines and physics shape gizmos
//!
//! Any thread may queue primitives. They are drawn into the shading buffer every
//! frame until [`DebugOverlay::update`] has consumed their lifetime.

use glam::{Mat4, Quat, Vec3, Vec4};
use parking_lot::Mutex;

use super::context::{Gpu, RenderContext};
use crate::backend::{RenderState, ShaderHandle};
use crate::error::RenderResult;
use crate::render_target::{LoadAction, TargetId};
use crate::resources::Mesh;
use crate::shaders::names;

/// Opacity of shape gizmos
const GIZMO_OPACITY: f32 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DebugLine {
    pub start: Vec3,
    pub end: Vec3,
    pub color: Vec4,
    /// Seconds left
    pub life: f32,
    pub width: f32,
    pub depth_test: bool,
}

impl DebugLine {
    pub fn new(start: Vec3, end: Vec3, color: Vec4, life: f32) -> Self {
        Self {
            start,
            end,
            color,
            life,
            width: 1.0,
            depth_test: true,
        }
    }

    #[must_use]
    pub fn with_width(mut self, width: f32) -> Self {
        self.width = width;
        self
    }

    /// Draw on top of geometry
    #[must_use]
    pub fn on_top(mut self) -> Self {
        self.depth_test = false;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PhysicsShape {
    Box { half_extents: Vec3 },
    Sphere { radius: f32 },
    Capsule { radius: f32, height: f32 },
    Cylinder { radius: f32, height: f32 },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DebugShape {
    pub position: Vec3,
    pub rotation: Quat,
    pub shape: PhysicsShape,
    pub color: Vec4,
    pub life: f32,
    pub width: f32,
    pub depth_test: bool,
}

impl DebugShape {
    pub fn new(position: Vec3, rotation: Quat, shape: PhysicsShape, color: Vec4, life: f32) -> Self {
        Self {
            position,
            rotation,
            shape,
            color,
            life,
            width: 1.0,
            depth_test: true,
        }
    }

    #[must_use]
    pub fn with_width(mut self, width: f32) -> Self {
        self.width = width;
        self
    }

    #[must_use]
    pub fn on_top(mut self) -> Self {
        self.depth_test = false;
        self
    }
}

struct GizmoVariant {
    dimensions: (f32, f32),
    mesh: Mesh,
    used: bool,
}

/// Tessellations of one gizmo shape, one uploaded mesh per distinct radius and height.
///
/// Draws reference meshes by handle until the pass is submitted, so a size can
/// never be re-tessellated in place while an earlier draw still points at it.
struct GizmoVariants {
    tessellate: fn(f32, f32) -> Mesh,
    variants: Vec<GizmoVariant>,
}

impl GizmoVariants {
    fn new(tessellate: fn(f32, f32) -> Mesh) -> Self {
        Self {
            tessellate,
            variants: Vec::new(),
        }
    }

    /// Mesh for `(radius, height)`, tessellated on first use
    fn mesh_for(&mut self, radius: f32, height: f32) -> &Mesh {
        let dimensions = (radius, height);
        let index = match self.variants.iter().position(|v| v.dimensions == dimensions) {
            Some(index) => index,
            None => {
                self.variants.push(GizmoVariant {
                    dimensions,
                    mesh: (self.tessellate)(radius, height),
                    used: false,
                });
                self.variants.len() - 1
            }
        };
        let variant = &mut self.variants[index];
        variant.used = true;
        &variant.mesh
    }

    /// Drop the variants nothing drew since the last call, with their uploads
    fn evict_unused(&mut self, gpu: &mut Gpu<'_>) {
        self.variants.retain_mut(|variant| {
            let used = std::mem::take(&mut variant.used);
            if !used {
                gpu.meshes.evict(&mut *gpu.backend, variant.mesh.id());
            }
            used
        });
    }
}

pub struct DebugOverlay {
    lines: Mutex<Vec<DebugLine>>,
    shapes: Mutex<Vec<DebugShape>>,
    line_mesh: Mesh,
    box_mesh: Mesh,
    sphere_mesh: Mesh,
    capsules: GizmoVariants,
    cylinders: GizmoVariants,
}

impl Default for DebugOverlay {
    fn default() -> Self {
        Self::new()
    }
}

impl DebugOverlay {
    pub fn new() -> Self {
        Self {
            lines: Mutex::new(Vec::new()),
            shapes: Mutex::new(Vec::new()),
            line_mesh: Mesh::line(),
            box_mesh: Mesh::box_gizmo(),
            sphere_mesh: Mesh::sphere_gizmo(),
            capsules: GizmoVariants::new(Mesh::capsule_gizmo),
            cylinders: GizmoVariants::new(Mesh::cylinder_gizmo),
        }
    }

    pub fn draw_line(&self, line: DebugLine) {
        self.lines.lock().push(line);
    }

    pub fn draw_shape(&self, shape: DebugShape) {
        self.shapes.lock().push(shape);
    }

    pub fn line_count(&self) -> usize {
        self.lines.lock().len()
    }

    pub fn shape_count(&self) -> usize {
        self.shapes.lock().len()
    }

    pub fn clear(&self) {
        self.lines.lock().clear();
        self.shapes.lock().clear();
    }

    /// Advance lifetimes by `dt` seconds and drop expired primitives
    pub fn update(&self, dt: f32) {
        self.lines.lock().retain_mut(|line| {
            line.life -= dt;
            line.life > 0.0
        });
        self.shapes.lock().retain_mut(|shape| {
            shape.life -= dt;
            shape.life > 0.0
        });
    }

    /// Draw every queued primitive on top of `target`'s current contents
    pub fn render(
        &mut self,
        ctx: &RenderContext<'_>,
        gpu: &mut Gpu<'_>,
        target: TargetId,
    ) -> RenderResult<()> {
        let lines = self.lines.lock().clone();
        let shapes = self.shapes.lock().clone();
        if lines.is_empty() && shapes.is_empty() {
            self.evict_unused_gizmos(gpu);
            return Ok(());
        }

        gpu.bind_target(target, LoadAction::Load)?;

        if !lines.is_empty() {
            if let Some(shader) = gpu.shader(names::DEBUG_LINE) {
                self.render_lines(ctx, gpu, shader, &lines);
            }
        }

        if !shapes.is_empty() {
            if let Some(shader) = gpu.shader(names::LINE_GIZMO) {
                self.render_shapes(ctx, gpu, shader, &shapes);
            }
        }

        gpu.unbind();
        self.evict_unused_gizmos(gpu);
        Ok(())
    }

    fn evict_unused_gizmos(&mut self, gpu: &mut Gpu<'_>) {
        self.capsules.evict_unused(gpu);
        self.cylinders.evict_unused(gpu);
    }

    fn render_lines(
        &self,
        ctx: &RenderContext<'_>,
        gpu: &mut Gpu<'_>,
        shader: ShaderHandle,
        lines: &[DebugLine],
    ) {
        gpu.use_shader(shader, RenderState::depth_read_only());
        gpu.set_uniform(shader, "u_Projection", ctx.camera.projection);
        gpu.set_uniform(shader, "u_View", ctx.camera.view);

        for line in lines {
            gpu.set_render_state(RenderState::depth_read_only().with_depth_test(line.depth_test));
            gpu.backend.set_line_width(line.width);
            gpu.set_uniform(shader, "u_Color", line.color);
            gpu.set_uniform(shader, "u_StartPos", line.start);
            gpu.set_uniform(shader, "u_EndPos", line.end);
            gpu.draw_mesh(&self.line_mesh);
        }
    }

    fn render_shapes(
        &mut self,
        ctx: &RenderContext<'_>,
        gpu: &mut Gpu<'_>,
        shader: ShaderHandle,
        shapes: &[DebugShape],
    ) {
        gpu.use_shader(shader, RenderState::depth_read_only());
        gpu.set_uniform(shader, "u_Opacity", GIZMO_OPACITY);
        gpu.set_uniform(shader, "u_Projection", ctx.camera.projection);

        for shape in shapes {
            gpu.set_render_state(RenderState::depth_read_only().with_depth_test(shape.depth_test));
            gpu.backend.set_line_width(shape.width);
            gpu.set_uniform(shader, "u_Color", shape.color);

            let (mesh, scale) = match shape.shape {
                PhysicsShape::Box { half_extents } => (&self.box_mesh, half_extents),
                PhysicsShape::Sphere { radius } => (&self.sphere_mesh, Vec3::splat(radius)),
                PhysicsShape::Capsule { radius, height } => {
                    (self.capsules.mesh_for(radius, height), Vec3::ONE)
                }
                PhysicsShape::Cylinder { radius, height } => {
                    (self.cylinders.mesh_for(radius, height), Vec3::ONE)
                }
            };

            let view = ctx.camera.view
                * Mat4::from_translation(shape.position)
                * Mat4::from_quat(gizmo_rotation(shape.rotation))
                * Mat4::from_scale(scale);
            gpu.set_uniform(shader, "u_View", view);
            gpu.draw_mesh(mesh);
        }
    }
}

/// Unit rotation of a gizmo. Degenerate quaternions draw unrotated.
fn gizmo_rotation(rotation: Quat) -> Quat {
    if rotation.is_finite() && rotation.length_squared() > f32::EPSILON {
        rotation.normalize()
    } else {
        Quat::IDENTITY
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_primitives_expire_after_their_life() {
        let overlay = DebugOverlay::new();
        overlay.draw_line(DebugLine::new(Vec3::ZERO, Vec3::X, Vec4::ONE, 1.0));
        overlay.draw_line(DebugLine::new(Vec3::ZERO, Vec3::Y, Vec4::ONE, 0.25));
        overlay.draw_shape(DebugShape::new(
            Vec3::ZERO,
            Quat::IDENTITY,
            PhysicsShape::Sphere { radius: 1.0 },
            Vec4::ONE,
            0.5,
        ));

        overlay.update(0.25);
        assert_eq!(overlay.line_count(), 1);
        assert_eq!(overlay.shape_count(), 1);

        overlay.update(0.25);
        assert_eq!(overlay.shape_count(), 0);
        assert_eq!(overlay.line_count(), 1);

        overlay.update(0.5);
        assert_eq!(overlay.line_count(), 0);
    }

    #[test]
    fn test_queue_accepts_other_threads() {
        let overlay = std::sync::Arc::new(DebugOverlay::new());
        let handles: Vec<_> = (0..4)
            .map(|i| {
                let overlay = overlay.clone();
                std::thread::spawn(move || {
                    overlay.draw_line(DebugLine::new(Vec3::ZERO, Vec3::splat(i as f32), Vec4::ONE, 1.0));
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(overlay.line_count(), 4);
    }

    fn top(mesh: &Mesh) -> f32 {
        mesh.data()
            .vertices
            .iter()
            .map(|v| v.position.y)
            .fold(f32::MIN, f32::max)
    }

    #[test]
    fn test_gizmo_variant_per_size() {
        let mut capsules = GizmoVariants::new(Mesh::capsule_gizmo);
        let small = capsules.mesh_for(0.5, 1.0).id();
        let large = capsules.mesh_for(2.0, 4.0);
        assert_ne!(large.id(), small);
        assert!((top(large) - 4.0).abs() < 1e-4);

        assert_eq!(capsules.mesh_for(0.5, 1.0).id(), small);
        assert_eq!(capsules.variants.len(), 2);
    }

    #[test]
    fn test_gizmo_rotation_handles_degenerate_quaternions() {
        assert_eq!(gizmo_rotation(Quat::from_xyzw(0.0, 0.0, 0.0, 0.0)), Quat::IDENTITY);
        assert_eq!(gizmo_rotation(Quat::from_xyzw(f32::NAN, 0.0, 0.0, 1.0)), Quat::IDENTITY);

        let scaled = Quat::from_xyzw(0.0, 0.0, 0.0, 2.0);
        assert!(gizmo_rotation(scaled).is_normalized());
        let turn = Quat::from_rotation_y(1.0);
        assert!(gizmo_rotation(turn * 3.0).abs_diff_eq(turn, 1e-5));
    }
}
