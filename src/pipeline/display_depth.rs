//! Viewable copy of the G-buffer depth for editor panels

use glam::UVec2;

use super::context::{Gpu, RenderContext};
use crate::backend::{RenderState, TextureFormat, TextureHandle};
use crate::error::RenderResult;
use crate::render_target::{AttachmentRole, LoadAction, RenderTarget, RenderTargetPool, TargetId};
use crate::shaders::names;

pub struct DisplayDepthPass {
    target: TargetId,
}

impl DisplayDepthPass {
    pub const LABEL: &'static str = "Display Depth";

    pub fn new(targets: &mut RenderTargetPool, size: UVec2) -> Self {
        Self {
            target: targets.insert(RenderTarget::color(
                Self::LABEL,
                size,
                TextureFormat::Rgba8Unorm,
            )),
        }
    }

    pub fn target(&self) -> TargetId {
        self.target
    }

    pub fn execute(
        &self,
        ctx: &RenderContext<'_>,
        gpu: &mut Gpu<'_>,
        gbuffer: TargetId,
    ) -> RenderResult<TextureHandle> {
        gpu.queue_resize(self.target, ctx.output_size);
        gpu.bind_target(self.target, LoadAction::Clear)?;
        if let Some(shader) = gpu.shader(names::DISPLAY_DEPTH) {
            gpu.use_shader(shader, RenderState::fullscreen());
            let depth = gpu.texture(gbuffer, AttachmentRole::Depth);
            gpu.bind_texture(shader, "u_Source", depth);
            gpu.draw_fullscreen();
        }
        gpu.unbind();
        gpu.output(self.target)
    }
}
