//! Bloom post-processing
//!
//! Bright parts are extracted into a half-size target, repeatedly downsampled,
//! then accumulated back up the chain with additive blending and finally added
//! over the source image.

use glam::UVec2;

use super::composite::{fullscreen_pass, stage_target};
use crate::backend::{BlendMode, RenderState, TextureHandle};
use crate::error::RenderResult;
use crate::pipeline::context::{Gpu, RenderContext};
use crate::render_target::{LoadAction, RenderTargetPool, TargetId};
use crate::shaders::names;

pub struct BloomPass {
    /// Mip chain, grown on demand. Level 0 is half the output size.
    mips: Vec<TargetId>,
    output: TargetId,
}

impl BloomPass {
    pub const LABEL: &'static str = "Bloom";

    pub fn new(targets: &mut RenderTargetPool, size: UVec2) -> Self {
        Self {
            mips: Vec::new(),
            output: stage_target(targets, Self::LABEL, size),
        }
    }

    pub fn mip_count(&self) -> usize {
        self.mips.len()
    }

    fn is_active(ctx: &RenderContext<'_>, gpu: &mut Gpu<'_>) -> bool {
        ctx.environment().bloom.is_requested()
            && gpu.has_shaders(&[
                names::BLOOM_THRESHOLD,
                names::BLOOM_DOWNSAMPLE,
                names::BLOOM_UPSAMPLE,
                names::COPY,
            ])
    }

    /// Bloomed copy of `source`, or `None` when bloom is inactive
    pub fn execute(
        &mut self,
        ctx: &RenderContext<'_>,
        gpu: &mut Gpu<'_>,
        source: TextureHandle,
    ) -> RenderResult<Option<TextureHandle>> {
        if !Self::is_active(ctx, gpu) {
            return Ok(None);
        }
        let settings = ctx.environment().bloom;

        // Mip sizes, stopping once a level would collapse to a single pixel
        let max_levels = settings.iterations.min(ctx.config.bloom_max_iterations).max(1) as usize;
        let mut sizes = Vec::with_capacity(max_levels);
        let mut size = ctx.output_size;
        while sizes.len() < max_levels && size.x > 1 && size.y > 1 {
            size = (size / 2).max(UVec2::ONE);
            sizes.push(size);
        }
        if sizes.is_empty() {
            sizes.push(UVec2::ONE);
        }

        while self.mips.len() < sizes.len() {
            let label = format!("Bloom Mip {}", self.mips.len());
            let target = stage_target(gpu.targets, &label, sizes[self.mips.len()]);
            self.mips.push(target);
        }

        let mut levels = Vec::with_capacity(sizes.len());
        let threshold = settings.threshold;
        levels.push(fullscreen_pass(
            gpu,
            self.mips[0],
            sizes[0],
            names::BLOOM_THRESHOLD,
            |gpu, shader| {
                gpu.set_uniform(shader, "u_Threshold", threshold);
                gpu.bind_texture(shader, "u_Source", Some(source));
            },
        )?);

        for level in 1..sizes.len() {
            let previous = levels[level - 1];
            levels.push(fullscreen_pass(
                gpu,
                self.mips[level],
                sizes[level],
                names::BLOOM_DOWNSAMPLE,
                |gpu, shader| {
                    gpu.bind_texture(shader, "u_Source", Some(previous));
                },
            )?);
        }

        let upsample = gpu.require_shader(names::BLOOM_UPSAMPLE)?;
        let additive = RenderState::fullscreen().with_blend(BlendMode::Additive);
        for level in (1..sizes.len()).rev() {
            gpu.bind_target(self.mips[level - 1], LoadAction::Load)?;
            gpu.use_shader(upsample, additive);
            gpu.set_uniform(upsample, "u_Intensity", 1.0f32);
            gpu.bind_texture(upsample, "u_Source", Some(levels[level]));
            gpu.draw_fullscreen();
            gpu.unbind();
        }

        let copy = gpu.require_shader(names::COPY)?;
        gpu.queue_resize(self.output, ctx.output_size);
        gpu.bind_target(self.output, LoadAction::Clear)?;
        gpu.use_shader(copy, RenderState::fullscreen());
        gpu.bind_texture(copy, "u_Source", Some(source));
        gpu.draw_fullscreen();
        gpu.use_shader(upsample, additive);
        gpu.set_uniform(upsample, "u_Intensity", settings.intensity);
        gpu.bind_texture(upsample, "u_Source", Some(levels[0]));
        gpu.draw_fullscreen();
        gpu.unbind();

        Ok(Some(gpu.output(self.output)?))
    }
}
