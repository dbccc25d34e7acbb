//! G-Buffer generation pass for deferred rendering
//!
//! Renders every surface of the scene into multiple render targets:
//! - Depth
//! - Albedo (base color)
//! - Normals
//! - Material properties (metallic, roughness)
//! - Entity id (index + 1, 0 for none)
//! - Emissive
//!
//! Draw order is fixed: opaque geometry, translucent geometry and temporary
//! models without depth writes, sprites, particles, then skinned meshes.

use std::collections::BTreeMap;
use std::sync::Arc;

use glam::{Mat4, UVec2};

use super::billboard::{particle_transform, sprite_transform};
use super::context::{entity_id, Gpu, RenderContext, NO_ENTITY};
use super::skeleton::propagate_bones;
use crate::backend::{RenderState, ShaderHandle, TextureFormat};
use crate::error::RenderResult;
use crate::render_target::{
    AttachmentDesc, AttachmentRole, LoadAction, RenderTarget, RenderTargetPool, TargetId,
};
use crate::resources::{Mesh, MeshInstance, Model};
use crate::shaders::names;

/// A model drawn for a single frame under a caller-chosen name
#[derive(Debug, Clone)]
pub struct TemporaryModel {
    pub model: Arc<Model>,
    pub transform: Mat4,
}

/// G-Buffer generation pass
pub struct GBufferPass {
    target: TargetId,
    /// Shared particle quad, its material swapped per emitter
    quad: MeshInstance,
}

impl GBufferPass {
    pub const LABEL: &'static str = "GBuffer";

    pub fn new(targets: &mut RenderTargetPool, size: UVec2) -> Self {
        let target = targets.insert(RenderTarget::new(
            Self::LABEL,
            size,
            vec![
                AttachmentDesc::depth(),
                AttachmentDesc::new(AttachmentRole::Albedo, TextureFormat::Rgba8Unorm),
                AttachmentDesc::new(AttachmentRole::Normal, TextureFormat::Rgba16Float),
                AttachmentDesc::new(AttachmentRole::Material, TextureFormat::Rgba8Unorm),
                AttachmentDesc::new(AttachmentRole::EntityId, TextureFormat::R32Sint),
                AttachmentDesc::new(AttachmentRole::Emissive, TextureFormat::R16Float),
            ],
        ));
        Self {
            target,
            quad: MeshInstance::untextured(Arc::new(Mesh::quad())),
        }
    }

    pub fn target(&self) -> TargetId {
        self.target
    }

    pub fn quad(&self) -> &MeshInstance {
        &self.quad
    }

    pub fn execute(
        &mut self,
        ctx: &RenderContext<'_>,
        gpu: &mut Gpu<'_>,
        temporary_models: &BTreeMap<String, TemporaryModel>,
    ) -> RenderResult<()> {
        gpu.queue_resize(self.target, ctx.output_size);
        gpu.bind_target(self.target, LoadAction::Clear)?;

        if let Some(shader) = gpu.shader(names::GBUFFER) {
            gpu.use_shader(shader, RenderState::opaque());
            gpu.set_uniform(shader, "u_Projection", ctx.camera.projection);
            gpu.set_uniform(shader, "u_View", ctx.camera.view);

            draw_opaque(ctx, gpu, shader);

            gpu.set_render_state(RenderState::depth_read_only());
            draw_translucent(ctx, gpu, shader, temporary_models);

            gpu.set_render_state(RenderState::opaque());
            draw_sprites(ctx, gpu, shader);
            self.draw_particles(ctx, gpu, shader);
        }

        if let Some(shader) = gpu.shader(names::GBUFFER_SKINNED) {
            gpu.use_shader(shader, RenderState::opaque());
            gpu.set_uniform(shader, "u_Projection", ctx.camera.projection);
            gpu.set_uniform(shader, "u_View", ctx.camera.view);
            draw_skinned(ctx, gpu, shader);
        }

        gpu.unbind();
        Ok(())
    }

    fn draw_particles(&mut self, ctx: &RenderContext<'_>, gpu: &mut Gpu<'_>, shader: ShaderHandle) {
        for (entity, global, emitter) in ctx.scene.particle_emitters() {
            let Some(material) = &emitter.material else {
                continue;
            };
            if emitter.particles.is_empty() {
                continue;
            }
            let previous = std::mem::replace(&mut self.quad.material, Some(material.clone()));
            for particle in &emitter.particles {
                let model = particle_transform(
                    particle,
                    &global,
                    emitter.global_space,
                    emitter.particle_scale,
                    ctx.camera.view,
                );
                gpu.draw_surface(shader, &self.quad, model, entity_id(entity));
            }
            self.quad.material = previous;
        }
    }
}

fn draw_opaque(ctx: &RenderContext<'_>, gpu: &mut Gpu<'_>, shader: ShaderHandle) {
    for (entity, global, component) in ctx.scene.models() {
        let Some(model) = &component.model else {
            continue;
        };
        for instance in model.meshes.iter().filter(|m| !m.is_transparent()) {
            gpu.draw_surface(shader, instance, global.matrix(), entity_id(entity));
        }
    }

    for (entity, global, brush) in ctx.scene.brushes() {
        let Some(model) = brush.model.as_ref().filter(|_| !brush.transparent) else {
            continue;
        };
        for instance in model.meshes.iter().filter(|m| !m.is_transparent()) {
            gpu.draw_surface(shader, instance, global.matrix(), entity_id(entity));
        }
    }
}

fn draw_translucent(
    ctx: &RenderContext<'_>,
    gpu: &mut Gpu<'_>,
    shader: ShaderHandle,
    temporary_models: &BTreeMap<String, TemporaryModel>,
) {
    for (entity, global, component) in ctx.scene.models() {
        let Some(model) = &component.model else {
            continue;
        };
        for instance in model.meshes.iter().filter(|m| m.is_transparent()) {
            gpu.draw_surface(shader, instance, global.matrix(), entity_id(entity));
        }
    }

    for (entity, global, brush) in ctx.scene.brushes() {
        let Some(model) = &brush.model else {
            continue;
        };
        for instance in model
            .meshes
            .iter()
            .filter(|m| brush.transparent || m.is_transparent())
        {
            gpu.draw_surface(shader, instance, global.matrix(), entity_id(entity));
        }
    }

    for temporary in temporary_models.values() {
        for instance in &temporary.model.meshes {
            gpu.draw_surface(shader, instance, temporary.transform, NO_ENTITY);
        }
    }
}

fn draw_sprites(ctx: &RenderContext<'_>, gpu: &mut Gpu<'_>, shader: ShaderHandle) {
    for (entity, global, sprite) in ctx.scene.sprites() {
        let Some(instance) = &sprite.mesh else {
            continue;
        };
        let model = sprite_transform(sprite, &global, ctx.camera.view);
        gpu.draw_surface(shader, instance, model, entity_id(entity));
    }
}

/// Bones carry the whole transform, so the model matrix stays identity
fn draw_skinned(ctx: &RenderContext<'_>, gpu: &mut Gpu<'_>, shader: ShaderHandle) {
    for (entity, _, component) in ctx.scene.skinned_models() {
        let Some(model) = &component.model else {
            continue;
        };
        let stats = propagate_bones(&mut *gpu.backend, shader, &model.skeleton, &ctx.names);
        log::trace!(
            "Skinned model '{}': {} bones visited, {} written",
            model.name,
            stats.visited,
            stats.written
        );
        for instance in &model.meshes {
            gpu.draw_surface(shader, instance, Mat4::IDENTITY, entity_id(entity));
        }
    }
}
