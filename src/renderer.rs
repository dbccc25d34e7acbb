//! Frame orchestrator

use std::collections::BTreeMap;
use std::sync::Arc;

use bevy_ecs::entity::Entity;
use glam::{Mat4, UVec2, Vec3};

use crate::backend::{
    BackendResult, GraphicsBackend, RenderState, ShaderDescriptor, ShaderHandle, TextureHandle,
};
use crate::error::{RenderError, RenderResult};
use crate::pipeline::{
    collect_lights, ActiveEffects, ChainInputs, DebugLine, DebugOverlay, DebugShape,
    DisplayDepthPass, GBufferPass, Gpu, PostProcessChain, RenderContext, ShadingPass, ShadowPass,
    TemporaryModel,
};
use crate::render_target::{AttachmentRole, LoadAction, RenderTarget, RenderTargetPool};
use crate::resources::{MeshCache, Model};
use crate::scene::{FrameCamera, Scene};
use crate::shaders::{names, ShaderCache, ShaderRegistry};
use crate::RendererConfig;

/// What the last rendered frame did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameReport {
    pub active_effects: ActiveEffects,
    /// Visible lights before the capacity cut
    pub light_count: usize,
    pub shadow_maps: usize,
}

/// Renders a [`Scene`] into a caller-provided [`RenderTarget`].
///
/// Owns every intermediate target, the mesh uploads, shadow maps and the debug
/// primitive queue. Shaders are looked up by logical name in its
/// [`ShaderRegistry`] every frame.
pub struct SceneRenderer<B: GraphicsBackend> {
    backend: B,
    config: RendererConfig,

    shaders: ShaderRegistry,
    shader_cache: ShaderCache,
    targets: RenderTargetPool,
    meshes: MeshCache,

    shadow: ShadowPass,
    gbuffer: GBufferPass,
    display_depth: DisplayDepthPass,
    shading: ShadingPass,
    post: PostProcessChain,
    debug: DebugOverlay,

    temporary_models: BTreeMap<String, TemporaryModel>,
    camera: FrameCamera,
    selected_entity: Option<Entity>,
    display_depth_texture: Option<TextureHandle>,
    last_frame: FrameReport,
}

impl<B: GraphicsBackend> SceneRenderer<B> {
    pub fn new(backend: B, config: RendererConfig) -> Self {
        let size = config.default_resolution.max(UVec2::ONE);
        let mut targets = RenderTargetPool::new();

        let gbuffer = GBufferPass::new(&mut targets, size);
        let display_depth = DisplayDepthPass::new(&mut targets, size);
        let shading = ShadingPass::new(&mut targets, size);
        let post = PostProcessChain::new(&mut targets, size);

        Self {
            backend,
            config,
            shaders: ShaderRegistry::new(),
            shader_cache: ShaderCache::new(),
            targets,
            meshes: MeshCache::new(),
            shadow: ShadowPass::new(),
            gbuffer,
            display_depth,
            shading,
            post,
            debug: DebugOverlay::new(),
            temporary_models: BTreeMap::new(),
            camera: FrameCamera::default(),
            selected_entity: None,
            display_depth_texture: None,
            last_frame: FrameReport::default(),
        }
    }

    /// Compile the built-in shaders. Returns how many are available.
    pub fn init(&mut self) -> usize {
        let count = self.shaders.register_builtin(&mut self.backend);
        log::info!(
            "Scene renderer initialized on {} with {} built-in shaders",
            self.backend.name(),
            count
        );
        count
    }

    pub fn config(&self) -> &RendererConfig {
        &self.config
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn shaders(&self) -> &ShaderRegistry {
        &self.shaders
    }

    /// Compile and register a shader under a logical name, replacing any previous one
    pub fn register_shader(
        &mut self,
        name: &str,
        desc: &ShaderDescriptor,
    ) -> BackendResult<ShaderHandle> {
        self.shaders.compile(&mut self.backend, name, desc)
    }

    /// Register an already compiled program
    pub fn register_shader_handle(&mut self, name: &str, shader: ShaderHandle) {
        self.shaders.register(name, shader);
    }

    /// Register an empty program for every name that has none yet
    pub fn register_placeholder_shaders(&mut self, names: &[&str]) -> BackendResult<()> {
        self.shaders.register_placeholders(&mut self.backend, names)
    }

    pub fn unregister_shader(&mut self, name: &str) -> Option<ShaderHandle> {
        self.shaders.unregister(name)
    }

    /// Advance debug primitive lifetimes
    pub fn update(&mut self, dt: f32, is_editor: bool) {
        log::trace!("Renderer update dt={} editor={}", dt, is_editor);
        self.debug.update(dt);
    }

    /// Camera matrices used by the next `render_scene`
    pub fn begin_render_scene(&mut self, projection: Mat4, view: Mat4, camera_position: Vec3) {
        self.camera = FrameCamera::new(projection, view, camera_position);
    }

    pub fn camera(&self) -> &FrameCamera {
        &self.camera
    }

    pub fn set_selected_entity(&mut self, entity: Option<Entity>) {
        self.selected_entity = entity;
    }

    pub fn selected_entity(&self) -> Option<Entity> {
        self.selected_entity
    }

    /// Draw `model` every frame until removed. A later call with the same name
    /// replaces the model and transform.
    pub fn draw_temporary_model(&mut self, name: &str, model: Arc<Model>, transform: Mat4) {
        self.temporary_models
            .insert(name.to_string(), TemporaryModel { model, transform });
    }

    pub fn remove_temporary_model(&mut self, name: &str) -> bool {
        self.temporary_models.remove(name).is_some()
    }

    pub fn clear_temporary_models(&mut self) {
        self.temporary_models.clear();
    }

    pub fn temporary_model(&self, name: &str) -> Option<&TemporaryModel> {
        self.temporary_models.get(name)
    }

    /// Queue a line. Callable from any thread holding a shared reference.
    pub fn draw_debug_line(&self, line: DebugLine) {
        self.debug.draw_line(line);
    }

    pub fn draw_debug_shape(&self, shape: DebugShape) {
        self.debug.draw_shape(shape);
    }

    pub fn debug_overlay(&self) -> &DebugOverlay {
        &self.debug
    }

    pub fn gbuffer(&self) -> &GBufferPass {
        &self.gbuffer
    }

    pub fn shadows(&self) -> &ShadowPass {
        &self.shadow
    }

    pub fn targets(&self) -> &RenderTargetPool {
        &self.targets
    }

    pub fn display_depth_texture(&self) -> Option<TextureHandle> {
        self.display_depth_texture
    }

    pub fn last_frame(&self) -> &FrameReport {
        &self.last_frame
    }

    /// Render one frame of `scene` into `target` at the target's size.
    ///
    /// Failures of passes whose output nothing else needs are logged and the frame
    /// continues. Failures on the path to the final image end the frame early.
    pub fn render_scene(&mut self, scene: &Scene, target: &mut RenderTarget) -> RenderResult<()> {
        let output_size = target.effective_size();
        let mut ctx = RenderContext::new(scene, self.camera, &self.config, output_size);
        ctx.selected_entity = self.selected_entity;

        let mut gpu = Gpu::new(
            &mut self.backend,
            &mut self.targets,
            &mut self.meshes,
            &self.shaders,
            &mut self.shader_cache,
        );

        let lights = collect_lights(scene, ctx.camera.position);
        log::trace!("Rendering {} lights at {}x{}", lights.len(), output_size.x, output_size.y);

        warn_on_error("Shadow", self.shadow.execute(&ctx, &mut gpu, &lights));

        let gbuffer = self.gbuffer.target();
        warn_on_error(
            GBufferPass::LABEL,
            self.gbuffer.execute(&ctx, &mut gpu, &self.temporary_models),
        );

        match self.display_depth.execute(&ctx, &mut gpu, gbuffer) {
            Ok(texture) => self.display_depth_texture = Some(texture),
            Err(e) => log::warn!("{} pass skipped: {}", DisplayDepthPass::LABEL, e),
        }

        let (ssao, ssao_active) = self.post.ssao.execute(&ctx, &mut gpu, gbuffer)?;

        let shading = self.shading.target();
        self.shading.queue_resize(&mut gpu, output_size);
        self.shading
            .execute(&ctx, &mut gpu, gbuffer, Some(ssao), &lights, &self.shadow)?;

        if let (Some(source), Some(destination)) = (
            gpu.texture(gbuffer, AttachmentRole::Depth),
            gpu.texture(shading, AttachmentRole::Depth),
        ) {
            gpu.backend.copy_texture(source, destination);
        }

        warn_on_error("Debug overlay", self.debug.render(&ctx, &mut gpu, shading));

        let shading_color = gpu.output(shading)?;
        let (image, mut active_effects) = self.post.execute(
            &ctx,
            &mut gpu,
            ChainInputs {
                shading: shading_color,
                gbuffer,
                lights: &lights,
                shadows: &self.shadow,
            },
        )?;
        active_effects.ssao = ssao_active;

        gpu.bind_external(target, LoadAction::Clear)?;
        if let Some(copy) = gpu.shader(names::COPY) {
            gpu.use_shader(copy, RenderState::fullscreen());
            gpu.bind_texture(copy, "u_Source", Some(image));
            gpu.draw_fullscreen();
        }
        gpu.unbind();
        gpu.backend.submit();

        self.shadow.prune(&mut gpu, &lights);

        self.last_frame = FrameReport {
            active_effects,
            light_count: lights.len(),
            shadow_maps: self.shadow.len(),
        };
        Ok(())
    }

    /// Destroy every GPU resource the renderer created
    pub fn cleanup(&mut self) {
        self.shadow.release(&mut self.targets, &mut self.backend);
        self.targets.release_all(&mut self.backend);
        self.meshes.release(&mut self.backend);
        self.shaders.release(&mut self.backend);
        self.display_depth_texture = None;
        log::debug!("Scene renderer resources released");
    }

    /// Release a caller-owned target through this renderer's backend
    pub fn release_target(&mut self, target: &mut RenderTarget) {
        target.release(&mut self.backend);
    }
}

impl<B: GraphicsBackend> Drop for SceneRenderer<B> {
    fn drop(&mut self) {
        self.cleanup();
    }
}

fn warn_on_error(pass: &str, result: RenderResult<()>) {
    if let Err(e) = result {
        match e {
            RenderError::MissingShader(_) => log::debug!("{} pass skipped: {}", pass, e),
            _ => log::warn!("{} pass skipped: {}", pass, e),
        }
    }
}
