//! Screen-space ambient occlusion: raw occlusion then a blur

use glam::UVec2;

use super::composite::fullscreen_pass;
use crate::backend::{TextureFormat, TextureHandle};
use crate::error::RenderResult;
use crate::pipeline::context::{Gpu, RenderContext};
use crate::render_target::{AttachmentRole, RenderTarget, RenderTargetPool, TargetId};
use crate::shaders::names;

/// Fully unoccluded
const NO_OCCLUSION: [f32; 4] = [1.0; 4];

pub struct SsaoPass {
    raw: TargetId,
    blurred: TargetId,
}

impl SsaoPass {
    pub fn new(targets: &mut RenderTargetPool, size: UVec2) -> Self {
        Self {
            raw: targets.insert(RenderTarget::color("SSAO", size, TextureFormat::R8Unorm)),
            blurred: targets.insert(
                RenderTarget::color("SSAO Blur", size, TextureFormat::R8Unorm)
                    .with_clear_color(NO_OCCLUSION),
            ),
        }
    }

    /// Occlusion factors for the shading pass. Returns whether occlusion was computed;
    /// otherwise the output is plain white.
    pub fn execute(
        &self,
        ctx: &RenderContext<'_>,
        gpu: &mut Gpu<'_>,
        gbuffer: TargetId,
    ) -> RenderResult<(TextureHandle, bool)> {
        let settings = ctx.environment().ssao;
        let size = ctx.output_size;
        let active = settings.is_requested() && gpu.has_shaders(&[names::SSAO, names::SSAO_BLUR]);

        if !active {
            gpu.queue_resize(self.blurred, size);
            gpu.clear_target(self.blurred, Some(NO_OCCLUSION))?;
            return Ok((gpu.output(self.blurred)?, false));
        }

        let depth = gpu.texture(gbuffer, AttachmentRole::Depth);
        let normal = gpu.texture(gbuffer, AttachmentRole::Normal);
        let camera = ctx.camera;
        let raw = fullscreen_pass(gpu, self.raw, size, names::SSAO, |gpu, shader| {
            gpu.set_uniform(shader, "u_Projection", camera.projection);
            gpu.set_uniform(shader, "u_View", camera.view);
            gpu.set_uniform(shader, "u_Radius", settings.radius);
            gpu.set_uniform(shader, "u_Bias", settings.bias);
            gpu.set_uniform(shader, "u_Area", settings.area);
            gpu.set_uniform(shader, "u_Falloff", settings.falloff);
            gpu.set_uniform(shader, "u_Strength", settings.strength);
            gpu.bind_texture(shader, "u_Depth", depth);
            gpu.bind_texture(shader, "u_Normal", normal);
        })?;

        let blurred = fullscreen_pass(gpu, self.blurred, size, names::SSAO_BLUR, |gpu, shader| {
            gpu.bind_texture(shader, "u_Source", Some(raw));
        })?;
        Ok((blurred, true))
    }
}
