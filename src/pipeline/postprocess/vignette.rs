//! Vignette, the last stage before the output copy

use glam::UVec2;

use super::composite::{fullscreen_pass, stage_target};
use crate::backend::TextureHandle;
use crate::error::RenderResult;
use crate::pipeline::context::{Gpu, RenderContext};
use crate::render_target::{RenderTargetPool, TargetId};
use crate::shaders::names;

pub struct VignettePass {
    target: TargetId,
}

impl VignettePass {
    pub fn new(targets: &mut RenderTargetPool, size: UVec2) -> Self {
        Self {
            target: stage_target(targets, "Vignette", size),
        }
    }

    pub fn execute(
        &self,
        ctx: &RenderContext<'_>,
        gpu: &mut Gpu<'_>,
        source: TextureHandle,
    ) -> RenderResult<TextureHandle> {
        let vignette = ctx.environment().vignette;
        fullscreen_pass(gpu, self.target, ctx.output_size, names::VIGNETTE, |gpu, shader| {
            gpu.set_uniform(shader, "u_Intensity", vignette.intensity);
            gpu.set_uniform(shader, "u_Extend", vignette.effective_extend());
            gpu.bind_texture(shader, "u_Source", Some(source));
        })
    }
}
