//! Tonemapping post-processing

use glam::UVec2;

use super::composite::{fullscreen_pass, stage_target};
use crate::backend::TextureHandle;
use crate::error::RenderResult;
use crate::pipeline::context::{Gpu, RenderContext};
use crate::render_target::{RenderTargetPool, TargetId};
use crate::shaders::names;

/// HDR to display range with the scene's exposure and gamma
pub struct TonemappingPass {
    target: TargetId,
}

impl TonemappingPass {
    pub fn new(targets: &mut RenderTargetPool, size: UVec2) -> Self {
        Self {
            target: stage_target(targets, "Tonemap", size),
        }
    }

    pub fn execute(
        &self,
        ctx: &RenderContext<'_>,
        gpu: &mut Gpu<'_>,
        source: TextureHandle,
    ) -> RenderResult<TextureHandle> {
        let environment = ctx.environment();
        fullscreen_pass(gpu, self.target, ctx.output_size, names::TONEMAP, |gpu, shader| {
            gpu.set_uniform(shader, "u_Exposure", environment.exposure);
            gpu.set_uniform(shader, "u_Gamma", environment.gamma);
            gpu.bind_texture(shader, "u_Source", Some(source));
        })
    }
}
