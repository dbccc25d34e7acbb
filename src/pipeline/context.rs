//! Per-frame state handed to every pass

use bevy_ecs::entity::Entity;
use glam::{Mat4, UVec2};

use crate::backend::{
    GraphicsBackend, MeshHandle, RenderState, ShaderHandle, TextureHandle, UniformValue,
};
use crate::error::{RenderError, RenderResult};
use crate::render_target::{AttachmentRole, LoadAction, RenderTarget, RenderTargetPool, TargetId};
use crate::resources::{Material, Mesh, MeshCache, MeshInstance};
use crate::scene::{FrameCamera, NameIndex, Scene, SceneEnvironment};
use crate::shaders::{ShaderCache, ShaderResolver};
use crate::RendererConfig;

/// Entity id value meaning "no entity"
pub const NO_ENTITY: i32 = 0;

/// Value written to the entity id attachment for `entity`
pub fn entity_id(entity: Entity) -> i32 {
    entity.index() as i32 + 1
}

/// Read-only inputs of one `render_scene` call
pub struct RenderContext<'a> {
    pub scene: &'a Scene,
    pub camera: FrameCamera,
    pub config: &'a RendererConfig,
    pub names: NameIndex,
    pub output_size: UVec2,
    pub selected_entity: Option<Entity>,
}

impl<'a> RenderContext<'a> {
    pub fn new(
        scene: &'a Scene,
        camera: FrameCamera,
        config: &'a RendererConfig,
        output_size: UVec2,
    ) -> Self {
        Self {
            scene,
            camera,
            config,
            names: scene.name_index(),
            output_size: output_size.max(UVec2::ONE),
            selected_entity: None,
        }
    }

    pub fn environment(&self) -> &'a SceneEnvironment {
        &self.scene.environment
    }
}

/// Backend access together with the renderer-owned GPU resources
pub struct Gpu<'a> {
    pub backend: &'a mut dyn GraphicsBackend,
    pub targets: &'a mut RenderTargetPool,
    pub meshes: &'a mut MeshCache,
    resolver: &'a dyn ShaderResolver,
    shader_cache: &'a mut ShaderCache,
}

impl<'a> Gpu<'a> {
    pub fn new(
        backend: &'a mut dyn GraphicsBackend,
        targets: &'a mut RenderTargetPool,
        meshes: &'a mut MeshCache,
        resolver: &'a dyn ShaderResolver,
        shader_cache: &'a mut ShaderCache,
    ) -> Self {
        Self {
            backend,
            targets,
            meshes,
            resolver,
            shader_cache,
        }
    }

    /// Resolve a logical shader name, warning once per missing name
    pub fn shader(&mut self, name: &str) -> Option<ShaderHandle> {
        self.shader_cache.resolve(self.resolver, name)
    }

    pub fn require_shader(&mut self, name: &str) -> RenderResult<ShaderHandle> {
        self.shader(name)
            .ok_or_else(|| RenderError::MissingShader(name.to_string()))
    }

    /// True when every name resolves
    pub fn has_shaders(&mut self, names: &[&str]) -> bool {
        names.iter().all(|name| self.shader(name).is_some())
    }

    pub fn queue_resize(&mut self, target: TargetId, size: UVec2) {
        self.targets.queue_resize(target, size);
    }

    pub fn bind_target(&mut self, target: TargetId, load: LoadAction) -> RenderResult<()> {
        self.targets
            .target_mut(target)?
            .bind(&mut *self.backend, load)?;
        Ok(())
    }

    /// Bind a target that is not owned by the pool
    pub fn bind_external(&mut self, target: &mut RenderTarget, load: LoadAction) -> RenderResult<()> {
        target.bind(&mut *self.backend, load)?;
        Ok(())
    }

    pub fn unbind(&mut self) {
        self.backend.end_render_pass();
    }

    pub fn clear_target(&mut self, target: TargetId, color: Option<[f32; 4]>) -> RenderResult<()> {
        self.targets
            .target_mut(target)?
            .clear(&mut *self.backend, color)?;
        Ok(())
    }

    pub fn texture(&self, target: TargetId, role: AttachmentRole) -> Option<TextureHandle> {
        self.targets.texture(target, role)
    }

    /// Color output of a target that has been drawn to
    pub fn output(&self, target: TargetId) -> RenderResult<TextureHandle> {
        self.targets
            .color_texture(target)
            .ok_or_else(|| RenderError::MissingTarget(format!("{:?} color output", target)))
    }

    pub fn target_size(&self, target: TargetId) -> Option<UVec2> {
        self.targets.get(target).map(RenderTarget::size)
    }

    /// Make `shader` current with the given fixed-function state
    pub fn use_shader(&mut self, shader: ShaderHandle, state: RenderState) {
        self.backend.use_shader(shader);
        self.backend.set_render_state(state);
    }

    pub fn set_render_state(&mut self, state: RenderState) {
        self.backend.set_render_state(state);
    }

    pub fn set_uniform(&mut self, shader: ShaderHandle, name: &str, value: impl Into<UniformValue>) {
        self.backend.set_uniform(shader, name, value.into());
    }

    pub fn set_uniform_element(
        &mut self,
        shader: ShaderHandle,
        name: &str,
        index: u32,
        value: impl Into<UniformValue>,
    ) {
        self.backend
            .set_uniform_element(shader, name, index, value.into());
    }

    /// Bind `texture`, or clear the input when it is missing so nothing samples
    /// a binding left over from an earlier pass or frame.
    pub fn bind_texture(&mut self, shader: ShaderHandle, name: &str, texture: Option<TextureHandle>) {
        match texture {
            Some(texture) => self.backend.bind_texture(shader, name, texture),
            None => {
                log::trace!("No texture for '{}'", name);
                self.backend.unbind_texture(shader, name);
            }
        }
    }

    pub fn draw_fullscreen(&mut self) {
        self.backend.draw_fullscreen();
    }

    pub fn mesh_handle(&mut self, mesh: &Mesh) -> Option<MeshHandle> {
        self.meshes.get_or_upload(&mut *self.backend, mesh)
    }

    /// Draw a mesh with the current shader. Returns false when the upload failed.
    pub fn draw_mesh(&mut self, mesh: &Mesh) -> bool {
        match self.mesh_handle(mesh) {
            Some(handle) => {
                self.backend.draw_mesh(handle);
                true
            }
            None => false,
        }
    }

    /// Draw into a depth-only target: only the model matrix is written
    pub fn draw_depth(&mut self, shader: ShaderHandle, mesh: &Mesh, model: Mat4) -> bool {
        self.set_uniform(shader, "u_Model", model);
        self.draw_mesh(mesh)
    }

    /// Draw into the G-buffer: material, model matrix and entity id
    pub fn draw_surface(
        &mut self,
        shader: ShaderHandle,
        instance: &MeshInstance,
        model: Mat4,
        entity_id: i32,
    ) -> bool {
        match &instance.material {
            Some(material) => material.bind(&mut *self.backend, shader),
            None => Material::default().bind(&mut *self.backend, shader),
        }
        self.set_uniform(shader, "u_Model", model);
        self.set_uniform(shader, "u_EntityID", entity_id);
        self.draw_mesh(&instance.mesh)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bevy_ecs::world::World;

    #[test]
    fn test_entity_id_reserves_zero() {
        let mut world = World::new();
        let first = world.spawn_empty().id();
        assert_eq!(first.index(), 0);
        assert_eq!(entity_id(first), 1);
        assert_ne!(entity_id(first), NO_ENTITY);
    }
}
