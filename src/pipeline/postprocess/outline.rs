//! Selection outline from the G-buffer entity ids

use glam::UVec2;

use super::composite::{fullscreen_pass, stage_target};
use crate::backend::TextureHandle;
use crate::error::RenderResult;
use crate::pipeline::context::{entity_id, Gpu, RenderContext, NO_ENTITY};
use crate::render_target::{RenderTargetPool, TargetId};
use crate::shaders::names;

pub struct OutlinePass {
    target: TargetId,
}

impl OutlinePass {
    pub fn new(targets: &mut RenderTargetPool, size: UVec2) -> Self {
        Self {
            target: stage_target(targets, "Outline", size),
        }
    }

    /// Outline of the selected entity over a transparent background. Without a
    /// selection the shader matches id 0 and draws nothing.
    pub fn execute(
        &self,
        ctx: &RenderContext<'_>,
        gpu: &mut Gpu<'_>,
        entity_texture: Option<TextureHandle>,
    ) -> RenderResult<TextureHandle> {
        let outline = ctx.environment().outline;
        let selected = ctx.selected_entity.map_or(NO_ENTITY, entity_id);
        let radius = outline.radius * ctx.config.resolution_scale;

        fullscreen_pass(gpu, self.target, ctx.output_size, names::OUTLINE, |gpu, shader| {
            gpu.set_uniform(shader, "u_EntityID", selected);
            gpu.set_uniform(shader, "u_OutlineColor", outline.color);
            gpu.set_uniform(shader, "u_Radius", radius);
            gpu.bind_texture(shader, "u_EntityTexture", entity_texture);
        })
    }
}
