//! Screen-space reflections

use glam::UVec2;

use super::composite::{fullscreen_pass, stage_target};
use crate::backend::TextureHandle;
use crate::error::RenderResult;
use crate::pipeline::context::{Gpu, RenderContext};
use crate::render_target::{AttachmentRole, RenderTargetPool, TargetId};
use crate::shaders::names;

pub struct SsrPass {
    target: TargetId,
}

impl SsrPass {
    pub fn new(targets: &mut RenderTargetPool, size: UVec2) -> Self {
        Self {
            target: stage_target(targets, "SSR", size),
        }
    }

    /// Reflections with their weight in alpha, or `None` when inactive
    pub fn execute(
        &self,
        ctx: &RenderContext<'_>,
        gpu: &mut Gpu<'_>,
        gbuffer: TargetId,
        source: TextureHandle,
    ) -> RenderResult<Option<TextureHandle>> {
        let settings = ctx.environment().ssr;
        if !settings.is_requested() || !gpu.has_shaders(&[names::SSR]) {
            return Ok(None);
        }

        let depth = gpu.texture(gbuffer, AttachmentRole::Depth);
        let normal = gpu.texture(gbuffer, AttachmentRole::Normal);
        let material = gpu.texture(gbuffer, AttachmentRole::Material);
        let camera = ctx.camera;
        let output = fullscreen_pass(gpu, self.target, ctx.output_size, names::SSR, |gpu, shader| {
            gpu.set_uniform(shader, "u_Projection", camera.projection);
            gpu.set_uniform(shader, "u_View", camera.view);
            gpu.set_uniform(shader, "u_InverseProjection", camera.projection.inverse());
            gpu.set_uniform(shader, "u_InverseView", camera.inverse_view());
            gpu.set_uniform(shader, "u_Strength", settings.strength);
            gpu.set_uniform(shader, "u_RayStep", settings.ray_step);
            gpu.set_uniform(shader, "u_MaxSteps", settings.max_steps as i32);
            gpu.set_uniform(shader, "u_Thickness", settings.thickness);
            gpu.bind_texture(shader, "u_Depth", depth);
            gpu.bind_texture(shader, "u_Normal", normal);
            gpu.bind_texture(shader, "u_Material", material);
            gpu.bind_texture(shader, "u_Source", Some(source));
        })?;
        Ok(Some(output))
    }
}
