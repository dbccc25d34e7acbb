//! Shadow depth pass
//!
//! Directional lights render `cascade_count` orthographic cascades, spot lights a
//! single perspective view. Shadow targets are created the first time a light
//! casts and removed once the light is gone.

use std::collections::BTreeMap;

use bevy_ecs::entity::Entity;
use glam::{Mat4, UVec2};

use super::billboard::sprite_transform;
use super::cascades::compute_cascades;
use super::context::{Gpu, RenderContext};
use super::light_ordering::OrderedLight;
use super::skeleton::propagate_bones;
use crate::backend::{GraphicsBackend, RenderState, ShaderHandle, TextureHandle};
use crate::error::RenderResult;
use crate::render_target::{
    AttachmentDesc, AttachmentRole, LoadAction, RenderTarget, RenderTargetPool, TargetId,
};
use crate::scene::LightType;
use crate::shaders::names;

/// Near plane of spot light shadow views
const SPOT_NEAR: f32 = 0.1;

/// Depth targets and matrices of one shadow-casting light
#[derive(Debug, Clone)]
pub struct ShadowMap {
    pub kind: LightType,
    /// One per cascade for directional lights, one for spot lights
    pub targets: Vec<TargetId>,
    pub light_transforms: Vec<Mat4>,
    /// Cascade far distances, empty for spot lights
    pub split_depths: Vec<f32>,
}

impl ShadowMap {
    pub fn depth_textures(&self, gpu: &Gpu<'_>) -> Vec<Option<TextureHandle>> {
        self.targets
            .iter()
            .map(|t| gpu.texture(*t, AttachmentRole::Depth))
            .collect()
    }
}

#[derive(Debug, Default)]
pub struct ShadowPass {
    maps: BTreeMap<Entity, ShadowMap>,
}

impl ShadowPass {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shadow_map(&self, light: Entity) -> Option<&ShadowMap> {
        self.maps.get(&light)
    }

    pub fn len(&self) -> usize {
        self.maps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.maps.is_empty()
    }

    /// Render depth for every shadow-casting light. Spot lights beyond
    /// `max_spot_shadows` get no map.
    pub fn execute(
        &mut self,
        ctx: &RenderContext<'_>,
        gpu: &mut Gpu<'_>,
        lights: &[OrderedLight],
    ) -> RenderResult<()> {
        let mut spot_count = 0;
        for light in lights.iter().filter(|l| l.casts_shadows()) {
            match light.kind() {
                LightType::Directional => self.render_directional(ctx, gpu, light)?,
                LightType::Spot if spot_count < ctx.config.max_spot_shadows => {
                    spot_count += 1;
                    self.render_spot(ctx, gpu, light)?;
                }
                LightType::Spot | LightType::Point => {}
            }
        }
        Ok(())
    }

    /// Drop the maps of lights that no longer cast shadows this frame
    pub fn prune(&mut self, gpu: &mut Gpu<'_>, lights: &[OrderedLight]) {
        let stale: Vec<Entity> = self
            .maps
            .keys()
            .filter(|entity| {
                !lights
                    .iter()
                    .any(|l| l.entity == **entity && l.casts_shadows())
            })
            .copied()
            .collect();

        for entity in stale {
            if let Some(map) = self.maps.remove(&entity) {
                log::debug!("Releasing shadow map of light {}", entity);
                for target in map.targets {
                    gpu.targets.remove(target, &mut *gpu.backend);
                }
            }
        }
    }

    /// Remove every shadow target from the pool
    pub fn release<B: GraphicsBackend + ?Sized>(
        &mut self,
        targets: &mut RenderTargetPool,
        backend: &mut B,
    ) {
        for (_, map) in std::mem::take(&mut self.maps) {
            for target in map.targets {
                targets.remove(target, backend);
            }
        }
    }

    fn map_for(&mut self, gpu: &mut Gpu<'_>, light: &OrderedLight, count: usize, size: u32) -> &mut ShadowMap {
        let size = UVec2::splat(size.max(1));
        let stale = self
            .maps
            .get(&light.entity)
            .is_some_and(|m| m.kind != light.kind() || m.targets.len() != count);
        if stale {
            if let Some(map) = self.maps.remove(&light.entity) {
                for target in map.targets {
                    gpu.targets.remove(target, &mut *gpu.backend);
                }
            }
        }

        let map = self.maps.entry(light.entity).or_insert_with(|| {
            log::debug!(
                "Creating {} shadow target(s) for light {}",
                count,
                light.entity
            );
            let targets = (0..count)
                .map(|i| {
                    gpu.targets.insert(RenderTarget::new(
                        &format!("Shadow {} #{}", light.entity, i),
                        size,
                        vec![AttachmentDesc::depth()],
                    ))
                })
                .collect();
            ShadowMap {
                kind: light.kind(),
                targets,
                light_transforms: Vec::new(),
                split_depths: Vec::new(),
            }
        });
        for target in &map.targets {
            gpu.targets.queue_resize(*target, size);
        }
        map
    }

    fn render_directional(
        &mut self,
        ctx: &RenderContext<'_>,
        gpu: &mut Gpu<'_>,
        light: &OrderedLight,
    ) -> RenderResult<()> {
        let config = ctx.config;
        let cascades = compute_cascades(
            &ctx.camera,
            light.direction,
            config.cascade_count,
            config.cascade_split_lambda,
            config.shadow_distance,
        );

        let map = self.map_for(gpu, light, cascades.len(), config.shadow_map_size);
        map.light_transforms = cascades.iter().map(|c| c.view_projection).collect();
        map.split_depths = cascades.iter().map(|c| c.split_depth).collect();
        let map = map.clone();

        for (target, light_transform) in map.targets.iter().zip(&map.light_transforms) {
            gpu.bind_target(*target, LoadAction::Clear)?;
            if let Some(shader) = gpu.shader(names::SHADOW_MAP) {
                gpu.use_shader(shader, RenderState::opaque());
                gpu.set_uniform(shader, "u_LightTransform", *light_transform);
                draw_casters(ctx, gpu, shader);
            }
            if let Some(shader) = gpu.shader(names::SHADOW_MAP_SKINNED) {
                gpu.use_shader(shader, RenderState::opaque());
                gpu.set_uniform(shader, "u_LightTransform", *light_transform);
                draw_skinned_casters(ctx, gpu, shader);
            }
            gpu.unbind();
        }
        Ok(())
    }

    fn render_spot(
        &mut self,
        ctx: &RenderContext<'_>,
        gpu: &mut Gpu<'_>,
        light: &OrderedLight,
    ) -> RenderResult<()> {
        let projection = Mat4::perspective_rh(
            (light.light.outer_angle * 2.0).clamp(0.01, std::f32::consts::PI - 0.01),
            1.0,
            SPOT_NEAR,
            light.light.range.max(SPOT_NEAR * 2.0),
        );
        let light_transform = projection * light.transform.inverse();

        let map = self.map_for(gpu, light, 1, ctx.config.shadow_map_size);
        map.light_transforms = vec![light_transform];
        map.split_depths.clear();
        let target = map.targets[0];

        gpu.bind_target(target, LoadAction::Clear)?;
        if let Some(shader) = gpu.shader(names::SHADOW_MAP) {
            gpu.use_shader(shader, RenderState::opaque());
            gpu.set_uniform(shader, "u_LightTransform", light_transform);
            draw_casters(ctx, gpu, shader);
        }
        if let Some(shader) = gpu.shader(names::SHADOW_MAP_SKINNED) {
            gpu.use_shader(shader, RenderState::opaque());
            gpu.set_uniform(shader, "u_LightTransform", light_transform);
            draw_skinned_casters(ctx, gpu, shader);
        }
        gpu.unbind();
        Ok(())
    }
}

/// Static meshes, opaque brushes and sprites
fn draw_casters(ctx: &RenderContext<'_>, gpu: &mut Gpu<'_>, shader: ShaderHandle) {
    let scene = ctx.scene;

    for (_, global, component) in scene.models() {
        let Some(model) = &component.model else {
            continue;
        };
        for instance in &model.meshes {
            gpu.draw_depth(shader, &instance.mesh, global.matrix());
        }
    }

    for (_, global, brush) in scene.brushes() {
        let Some(model) = brush.model.as_ref().filter(|_| !brush.transparent) else {
            continue;
        };
        for instance in &model.meshes {
            gpu.draw_depth(shader, &instance.mesh, global.matrix());
        }
    }

    for (_, global, sprite) in scene.sprites() {
        let Some(instance) = &sprite.mesh else {
            continue;
        };
        let model = sprite_transform(sprite, &global, ctx.camera.view);
        gpu.draw_depth(shader, &instance.mesh, model);
    }
}

fn draw_skinned_casters(ctx: &RenderContext<'_>, gpu: &mut Gpu<'_>, shader: ShaderHandle) {
    gpu.set_uniform(shader, "u_Model", Mat4::IDENTITY);
    for (_, _, component) in ctx.scene.skinned_models() {
        let Some(model) = &component.model else {
            continue;
        };
        propagate_bones(&mut *gpu.backend, shader, &model.skeleton, &ctx.names);
        for instance in &model.meshes {
            gpu.draw_mesh(&instance.mesh);
        }
    }
}
