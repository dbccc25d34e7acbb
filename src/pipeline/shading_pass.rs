//! Deferred lighting resolve
//!
//! Fills the background (procedural sky or the ambient color), then lights the
//! G-buffer in one fullscreen draw into the shading buffer.

use glam::{UVec2, Vec4};

use super::context::{Gpu, RenderContext};
use super::light_ordering::OrderedLight;
use super::shadow_pass::ShadowPass;
use crate::backend::{BlendMode, RenderState, ShaderHandle, TextureFormat, TextureHandle};
use crate::error::RenderResult;
use crate::render_target::{
    AttachmentDesc, AttachmentRole, LoadAction, RenderTarget, RenderTargetPool, TargetId,
};
use crate::scene::{LightType, SkyMode};
use crate::shaders::names;

/// Value of the shadow slot for lights without a shadow map
const NO_SHADOW: f32 = -1.0;

pub struct ShadingPass {
    target: TargetId,
}

impl ShadingPass {
    pub const LABEL: &'static str = "Shading";

    pub fn new(targets: &mut RenderTargetPool, size: UVec2) -> Self {
        Self {
            target: targets.insert(RenderTarget::new(
                Self::LABEL,
                size,
                vec![
                    AttachmentDesc::color(TextureFormat::Rgba16Float),
                    AttachmentDesc::depth(),
                ],
            )),
        }
    }

    pub fn target(&self) -> TargetId {
        self.target
    }

    /// Resize is queued separately so the G-buffer and shading buffer change together
    pub fn queue_resize(&self, gpu: &mut Gpu<'_>, size: UVec2) {
        gpu.queue_resize(self.target, size);
    }

    pub fn execute(
        &self,
        ctx: &RenderContext<'_>,
        gpu: &mut Gpu<'_>,
        gbuffer: TargetId,
        ssao: Option<TextureHandle>,
        lights: &[OrderedLight],
        shadows: &ShadowPass,
    ) -> RenderResult<()> {
        let environment = ctx.environment();

        let deferred_state = match environment.sky {
            SkyMode::Procedural => {
                gpu.bind_target(self.target, LoadAction::ClearWith([0.0, 0.0, 0.0, 1.0]))?;
                if let Some(sky) = gpu.shader(names::SKY_PROCEDURAL) {
                    gpu.use_shader(sky, RenderState::fullscreen());
                    gpu.set_uniform(sky, "u_Projection", ctx.camera.projection);
                    gpu.set_uniform(sky, "u_View", ctx.camera.view);
                    gpu.set_uniform(sky, "u_SunDirection", environment.procedural_sky.sun_direction);
                    gpu.set_uniform(sky, "u_SunIntensity", environment.procedural_sky.sun_intensity);
                    gpu.draw_fullscreen();
                }
                RenderState::fullscreen().with_blend(BlendMode::Alpha)
            }
            SkyMode::ClearColor => {
                gpu.bind_target(
                    self.target,
                    LoadAction::ClearWith(environment.ambient_color.to_array()),
                )?;
                RenderState::fullscreen()
            }
        };

        let Some(shader) = gpu.shader(names::DEFERRED) else {
            gpu.unbind();
            return Ok(());
        };

        gpu.use_shader(shader, deferred_state);
        gpu.set_uniform(shader, "u_Projection", ctx.camera.projection);
        gpu.set_uniform(shader, "u_View", ctx.camera.view);
        gpu.set_uniform(shader, "u_EyePosition", ctx.camera.position);
        gpu.set_uniform(shader, "u_AmbientTerm", environment.ambient_term);

        for (name, role) in [
            ("m_Depth", AttachmentRole::Depth),
            ("m_Albedo", AttachmentRole::Albedo),
            ("m_Normal", AttachmentRole::Normal),
            ("m_Material", AttachmentRole::Material),
            ("m_Emissive", AttachmentRole::Emissive),
        ] {
            let texture = gpu.texture(gbuffer, role);
            gpu.bind_texture(shader, name, texture);
        }
        gpu.bind_texture(shader, "m_SSAO", ssao);

        register_lights(ctx, gpu, shader, lights, shadows);

        gpu.draw_fullscreen();
        gpu.unbind();
        Ok(())
    }
}

/// Write the nearest lights and their shadow maps into the deferred shader.
///
/// `u_LightParams` holds cos(inner), cos(outer), range and the shadow slot: the
/// spot shadow index for spot lights, 0 for the directional light owning the
/// cascades, -1 otherwise.
fn register_lights(
    ctx: &RenderContext<'_>,
    gpu: &mut Gpu<'_>,
    shader: ShaderHandle,
    lights: &[OrderedLight],
    shadows: &ShadowPass,
) {
    let config = ctx.config;
    let count = lights.len().min(config.max_lights);
    if lights.len() > count {
        log::trace!("Dropping {} lights beyond capacity", lights.len() - count);
    }

    let mut has_cascades = false;
    let mut spot_shadows = 0usize;

    for (i, light) in lights.iter().take(count).enumerate() {
        let i = i as u32;
        let mut shadow_slot = NO_SHADOW;

        if let Some(map) = shadows.shadow_map(light.entity) {
            match light.kind() {
                LightType::Directional if !has_cascades => {
                    has_cascades = true;
                    shadow_slot = 0.0;
                    let textures = map.depth_textures(gpu);
                    for (c, texture) in textures.into_iter().enumerate() {
                        gpu.bind_texture(shader, &format!("u_CascadeShadowMap{}", c), texture);
                    }
                    for (c, transform) in map.light_transforms.iter().enumerate() {
                        gpu.set_uniform_element(shader, "u_CascadeLightTransforms", c as u32, *transform);
                    }
                    for (c, split) in map.split_depths.iter().enumerate() {
                        gpu.set_uniform_element(shader, "u_CascadeSplits", c as u32, *split);
                    }
                }
                LightType::Spot if spot_shadows < config.max_spot_shadows => {
                    shadow_slot = spot_shadows as f32;
                    let texture = map.depth_textures(gpu).into_iter().next().flatten();
                    gpu.bind_texture(shader, &format!("u_SpotShadowMap{}", spot_shadows), texture);
                    if let Some(transform) = map.light_transforms.first() {
                        gpu.set_uniform_element(
                            shader,
                            "u_SpotLightTransforms",
                            spot_shadows as u32,
                            *transform,
                        );
                    }
                    spot_shadows += 1;
                }
                _ => {}
            }
        }

        gpu.set_uniform_element(shader, "u_LightPositions", i, light.position);
        gpu.set_uniform_element(shader, "u_LightDirections", i, light.direction);
        gpu.set_uniform_element(shader, "u_LightColors", i, light.color_strength());
        gpu.set_uniform_element(shader, "u_LightTypes", i, light.kind().shader_index());
        gpu.set_uniform_element(
            shader,
            "u_LightParams",
            i,
            Vec4::new(
                light.light.inner_angle.cos(),
                light.light.outer_angle.cos(),
                light.light.range.min(f32::MAX),
                shadow_slot,
            ),
        );
    }

    // Maps of lights gone since the last frame may already be destroyed
    if !has_cascades {
        for c in 0..config.cascade_count {
            gpu.bind_texture(shader, &format!("u_CascadeShadowMap{}", c), None);
        }
    }
    for slot in spot_shadows..config.max_spot_shadows {
        gpu.bind_texture(shader, &format!("u_SpotShadowMap{}", slot), None);
    }

    gpu.set_uniform(shader, "u_LightCount", count as i32);
    gpu.set_uniform(shader, "u_HasDirectionalShadow", has_cascades);
    gpu.set_uniform(shader, "u_SpotShadowCount", spot_shadows as i32);
}
