//! Lens barrel distortion

use glam::UVec2;

use super::composite::{fullscreen_pass, stage_target};
use crate::backend::TextureHandle;
use crate::error::RenderResult;
use crate::pipeline::context::{Gpu, RenderContext};
use crate::render_target::{RenderTargetPool, TargetId};
use crate::shaders::names;

pub struct BarrelDistortionPass {
    target: TargetId,
}

impl BarrelDistortionPass {
    pub fn new(targets: &mut RenderTargetPool, size: UVec2) -> Self {
        Self {
            target: stage_target(targets, "Barrel Distortion", size),
        }
    }

    pub fn is_active(ctx: &RenderContext<'_>, gpu: &mut Gpu<'_>) -> bool {
        ctx.environment().barrel_distortion.is_requested()
            && gpu.has_shaders(&[names::BARREL_DISTORTION])
    }

    /// Call only when [`Self::is_active`] holds
    pub fn execute(
        &self,
        ctx: &RenderContext<'_>,
        gpu: &mut Gpu<'_>,
        source: TextureHandle,
    ) -> RenderResult<TextureHandle> {
        let settings = ctx.environment().barrel_distortion;
        fullscreen_pass(
            gpu,
            self.target,
            ctx.output_size,
            names::BARREL_DISTORTION,
            |gpu, shader| {
                gpu.set_uniform(shader, "u_Distortion", settings.distortion);
                gpu.set_uniform(shader, "u_DistortionEdge", settings.edge_distortion);
                gpu.set_uniform(shader, "u_Scale", settings.scale);
                gpu.bind_texture(shader, "u_Source", Some(source));
            },
        )
    }
}
