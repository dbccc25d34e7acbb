//! Post-processing effects
//!
//! The chain runs after the shading buffer is complete:
//!
//! ```text
//! shading ─ bloom? ─ volumetric combine | copy ─ tonemap ─ + outline
//!         ─ SSR combine | copy ─ DOF ─ barrel? ─ vignette
//! ```
//!
//! Optional effects that are disabled, neutral or missing their shader are
//! bypassed, so their input flows straight into the next stage. Two ping-pong
//! targets hold the intermediate composites so no stage reads the texture it
//! writes.

mod barrel;
mod bloom;
pub mod composite;
mod dof;
mod outline;
mod ssao;
mod ssr;
mod tonemapping;
mod vignette;
mod volumetric;

pub use barrel::BarrelDistortionPass;
pub use bloom::BloomPass;
pub use dof::DofPass;
pub use outline::OutlinePass;
pub use ssao::SsaoPass;
pub use ssr::SsrPass;
pub use tonemapping::TonemappingPass;
pub use vignette::VignettePass;
pub use volumetric::VolumetricPass;

use glam::UVec2;

use super::context::{Gpu, RenderContext};
use super::light_ordering::OrderedLight;
use super::shadow_pass::ShadowPass;
use crate::backend::TextureHandle;
use crate::error::RenderResult;
use crate::render_target::{AttachmentRole, RenderTargetPool, TargetId};
use composite::stage_target;

/// Which optional effects ran in the last frame
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ActiveEffects {
    pub ssao: bool,
    pub bloom: bool,
    pub volumetric: bool,
    pub ssr: bool,
    pub barrel_distortion: bool,
}

/// Inputs of the chain produced by earlier passes
pub struct ChainInputs<'a> {
    pub shading: TextureHandle,
    pub gbuffer: TargetId,
    pub lights: &'a [OrderedLight],
    pub shadows: &'a ShadowPass,
}

pub struct PostProcessChain {
    pub ssao: SsaoPass,
    bloom: BloomPass,
    volumetric: VolumetricPass,
    tonemap: TonemappingPass,
    outline: OutlinePass,
    ssr: SsrPass,
    dof: DofPass,
    barrel: BarrelDistortionPass,
    vignette: VignettePass,
    composite_a: TargetId,
    composite_b: TargetId,
}

impl PostProcessChain {
    pub fn new(targets: &mut RenderTargetPool, size: UVec2) -> Self {
        Self {
            ssao: SsaoPass::new(targets, size),
            bloom: BloomPass::new(targets, size),
            volumetric: VolumetricPass::new(targets, size),
            tonemap: TonemappingPass::new(targets, size),
            outline: OutlinePass::new(targets, size),
            ssr: SsrPass::new(targets, size),
            dof: DofPass::new(targets, size),
            barrel: BarrelDistortionPass::new(targets, size),
            vignette: VignettePass::new(targets, size),
            composite_a: stage_target(targets, "Composite A", size),
            composite_b: stage_target(targets, "Composite B", size),
        }
    }

    pub fn bloom(&self) -> &BloomPass {
        &self.bloom
    }

    /// Run every stage after shading. Returns the finished image and the
    /// optional effects that ran (SSAO is reported by the caller).
    pub fn execute(
        &mut self,
        ctx: &RenderContext<'_>,
        gpu: &mut Gpu<'_>,
        inputs: ChainInputs<'_>,
    ) -> RenderResult<(TextureHandle, ActiveEffects)> {
        let size = ctx.output_size;
        let environment = ctx.environment();
        let mut active = ActiveEffects::default();

        let depth = gpu.texture(inputs.gbuffer, AttachmentRole::Depth);
        let entity_ids = gpu.texture(inputs.gbuffer, AttachmentRole::EntityId);

        let mut current = inputs.shading;
        if let Some(bloomed) = self.bloom.execute(ctx, gpu, current)? {
            active.bloom = true;
            current = bloomed;
        }

        let fog = self
            .volumetric
            .execute(ctx, gpu, depth, inputs.lights, inputs.shadows)?;
        let scattered = match fog {
            Some(fog) => {
                active.volumetric = true;
                composite::combine(gpu, self.composite_a, size, current, fog)?
            }
            None => composite::copy(gpu, self.composite_a, size, current)?,
        };

        let tonemapped = self.tonemap.execute(ctx, gpu, scattered)?;
        let outline = self.outline.execute(ctx, gpu, entity_ids)?;
        let outlined = composite::add(gpu, self.composite_b, size, tonemapped, outline)?;

        let reflections = self.ssr.execute(ctx, gpu, inputs.gbuffer, outlined)?;
        let reflected = match reflections {
            Some(reflections) => {
                active.ssr = true;
                composite::combine(gpu, self.composite_a, size, outlined, reflections)?
            }
            None => composite::copy(gpu, self.composite_a, size, outlined)?,
        };

        let focused = self.dof.execute(ctx, gpu, depth, reflected)?;

        let current = if BarrelDistortionPass::is_active(ctx, gpu) {
            active.barrel_distortion = true;
            let source = if environment.dof.enabled {
                focused
            } else {
                reflected
            };
            let distorted = self.barrel.execute(ctx, gpu, source)?;
            composite::copy(gpu, self.composite_b, size, distorted)?
        } else {
            // Depth of field only reaches the output through barrel distortion
            reflected
        };

        let output = self.vignette.execute(ctx, gpu, current)?;
        Ok((output, active))
    }
}
