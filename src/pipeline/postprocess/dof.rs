//! Bokeh depth of field

use glam::UVec2;

use super::composite::{fullscreen_pass, stage_target};
use crate::backend::TextureHandle;
use crate::error::RenderResult;
use crate::pipeline::context::{Gpu, RenderContext};
use crate::render_target::{RenderTargetPool, TargetId};
use crate::shaders::names;

pub struct DofPass {
    target: TargetId,
}

impl DofPass {
    pub fn new(targets: &mut RenderTargetPool, size: UVec2) -> Self {
        Self {
            target: stage_target(targets, "DOF", size),
        }
    }

    /// Runs every frame whether or not depth of field is enabled
    pub fn execute(
        &self,
        ctx: &RenderContext<'_>,
        gpu: &mut Gpu<'_>,
        depth: Option<TextureHandle>,
        source: TextureHandle,
    ) -> RenderResult<TextureHandle> {
        let dof = ctx.environment().dof;
        let size = ctx.output_size;

        fullscreen_pass(gpu, self.target, size, names::DOF, |gpu, shader| {
            gpu.set_uniform(shader, "focalDepth", dof.focal_depth);
            gpu.set_uniform(shader, "focalLength", dof.focal_length);
            gpu.set_uniform(shader, "fstop", dof.f_stop);
            gpu.set_uniform(shader, "showFocus", dof.show_focus);
            gpu.set_uniform(shader, "autofocus", dof.auto_focus);
            gpu.set_uniform(shader, "manualdof", dof.manual_focus);
            gpu.set_uniform(shader, "samples", dof.samples);
            gpu.set_uniform(shader, "rings", dof.rings);
            gpu.set_uniform(shader, "ndofstart", dof.start);
            gpu.set_uniform(shader, "ndofdist", dof.distance);
            gpu.set_uniform(shader, "fdofstart", dof.start);
            gpu.set_uniform(shader, "fdofdist", dof.distance);
            gpu.set_uniform(shader, "CoC", dof.coc);
            gpu.set_uniform(shader, "maxblur", dof.max_blur);
            gpu.set_uniform(shader, "threshold", dof.threshold);
            gpu.set_uniform(shader, "gain", dof.gain);
            gpu.set_uniform(shader, "bias", dof.bias);
            gpu.set_uniform(shader, "fringe", dof.fringe);
            gpu.set_uniform(shader, "namount", dof.noise_amount);
            gpu.set_uniform(shader, "dbsize", dof.blur_size);
            gpu.set_uniform(shader, "feather", dof.feather);
            gpu.set_uniform(shader, "width", size.x as f32);
            gpu.set_uniform(shader, "height", size.y as f32);
            gpu.bind_texture(shader, "depthTex", depth);
            gpu.bind_texture(shader, "renderTex", Some(source));
        })
    }
}
