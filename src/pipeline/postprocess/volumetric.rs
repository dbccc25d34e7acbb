//! Volumetric light scattering through the cascades of a directional light

use glam::UVec2;

use super::composite::{fullscreen_pass, stage_target};
use crate::backend::TextureHandle;
use crate::error::RenderResult;
use crate::pipeline::context::{Gpu, RenderContext};
use crate::pipeline::light_ordering::OrderedLight;
use crate::pipeline::shadow_pass::ShadowPass;
use crate::render_target::{RenderTargetPool, TargetId};
use crate::scene::LightType;
use crate::shaders::names;

pub struct VolumetricPass {
    target: TargetId,
}

impl VolumetricPass {
    pub fn new(targets: &mut RenderTargetPool, size: UVec2) -> Self {
        Self {
            target: stage_target(targets, "Volumetric", size),
        }
    }

    /// Fog color with coverage in alpha, or `None` when there is nothing to scatter
    pub fn execute(
        &self,
        ctx: &RenderContext<'_>,
        gpu: &mut Gpu<'_>,
        depth: Option<TextureHandle>,
        lights: &[OrderedLight],
        shadows: &ShadowPass,
    ) -> RenderResult<Option<TextureHandle>> {
        let settings = ctx.environment().volumetric;
        if !settings.is_requested() {
            return Ok(None);
        }

        let caster = lights.iter().find_map(|light| {
            let volumetric = light.kind() == LightType::Directional
                && light.light.volumetric
                && light.casts_shadows();
            volumetric
                .then(|| shadows.shadow_map(light.entity).map(|map| (light, map)))
                .flatten()
        });
        let Some((light, map)) = caster else {
            return Ok(None);
        };
        if !gpu.has_shaders(&[names::VOLUMETRIC]) {
            return Ok(None);
        }

        let shadow_textures = map.depth_textures(gpu);
        let camera = ctx.camera;
        let output = fullscreen_pass(
            gpu,
            self.target,
            ctx.output_size,
            names::VOLUMETRIC,
            |gpu, shader| {
                gpu.set_uniform(shader, "u_Projection", camera.projection);
                gpu.set_uniform(shader, "u_View", camera.view);
                gpu.set_uniform(shader, "u_InverseProjection", camera.projection.inverse());
                gpu.set_uniform(shader, "u_InverseView", camera.inverse_view());
                gpu.set_uniform(shader, "u_CamPosition", camera.position);
                gpu.set_uniform(shader, "u_FogAmount", settings.fog_amount);
                gpu.set_uniform(shader, "u_StepCount", settings.step_count as i32);
                gpu.set_uniform(shader, "u_LightDirection", light.direction);
                gpu.set_uniform(shader, "u_LightColor", light.color_strength());
                gpu.set_uniform(shader, "u_CascadeCount", map.targets.len() as i32);
                for (i, transform) in map.light_transforms.iter().enumerate() {
                    gpu.set_uniform_element(shader, "u_CascadeLightTransforms", i as u32, *transform);
                }
                for (i, split) in map.split_depths.iter().enumerate() {
                    gpu.set_uniform_element(shader, "u_CascadeSplits", i as u32, *split);
                }
                for (i, texture) in shadow_textures.into_iter().enumerate() {
                    gpu.bind_texture(shader, &format!("u_ShadowMap{}", i), texture);
                }
                gpu.bind_texture(shader, "u_Depth", depth);
            },
        )?;
        Ok(Some(output))
    }
}
