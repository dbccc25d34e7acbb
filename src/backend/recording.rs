//! Recording backend for tests and tooling.
//!
//! This backend doesn't perform GPU work. It hands out handles, tracks per-shader
//! uniform state the way a real program object would, and records every call as a
//! [`Command`] so a whole frame can be inspected or compared against another frame.

use std::collections::HashMap;

use crate::backend::traits::*;
use crate::backend::types::*;

/// One recorded backend call
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    CreateTexture {
        texture: TextureHandle,
        desc: TextureDescriptor,
    },
    DestroyTexture(TextureHandle),
    CreateMesh {
        mesh: MeshHandle,
        label: String,
        vertex_count: usize,
        index_count: usize,
    },
    DestroyMesh(MeshHandle),
    CreateShader {
        shader: ShaderHandle,
        label: String,
    },
    DestroyShader(ShaderHandle),
    BeginRenderPass(RenderPassDescriptor),
    EndRenderPass,
    SetRenderState(RenderState),
    UseShader(ShaderHandle),
    SetUniform {
        shader: ShaderHandle,
        name: String,
        index: Option<u32>,
        value: UniformValue,
    },
    BindTexture {
        shader: ShaderHandle,
        name: String,
        texture: TextureHandle,
    },
    UnbindTexture {
        shader: ShaderHandle,
        name: String,
    },
    SetLineWidth(f32),
    DrawMesh(MeshHandle),
    DrawFullscreen,
    CopyTexture {
        source: TextureHandle,
        destination: TextureHandle,
    },
    Submit,
}

/// Snapshot of the state a draw was issued with
#[derive(Debug, Clone)]
pub struct DrawRecord {
    pub pass: String,
    pub shader: Option<ShaderHandle>,
    pub mesh: Option<MeshHandle>,
    pub state: RenderState,
    pub line_width: f32,
    uniforms: HashMap<(String, Option<u32>), UniformValue>,
    textures: HashMap<String, TextureHandle>,
}

impl DrawRecord {
    pub fn uniform(&self, name: &str) -> Option<UniformValue> {
        self.uniforms.get(&(name.to_string(), None)).copied()
    }

    pub fn uniform_element(&self, name: &str, index: u32) -> Option<UniformValue> {
        self.uniforms.get(&(name.to_string(), Some(index))).copied()
    }

    pub fn texture(&self, name: &str) -> Option<TextureHandle> {
        self.textures.get(name).copied()
    }

    pub fn is_fullscreen(&self) -> bool {
        self.mesh.is_none()
    }
}

/// Commands grouped by the render pass they were recorded in
#[derive(Debug, Clone)]
pub struct RecordedPass {
    pub label: String,
    pub descriptor: RenderPassDescriptor,
    pub commands: Vec<Command>,
}

impl RecordedPass {
    pub fn draw_count(&self) -> usize {
        self.commands
            .iter()
            .filter(|c| matches!(c, Command::DrawMesh(_) | Command::DrawFullscreen))
            .count()
    }

    /// Texture written by the first color attachment
    pub fn color_target(&self) -> Option<TextureHandle> {
        self.descriptor.color_attachments.first().map(|a| a.texture)
    }
}

/// Recording backend.
#[derive(Debug, Default)]
pub struct RecordingBackend {
    commands: Vec<Command>,
    draws: Vec<DrawRecord>,

    textures: HashMap<TextureHandle, TextureDescriptor>,
    meshes: HashMap<MeshHandle, (String, usize)>,
    shaders: HashMap<ShaderHandle, String>,

    uniforms: HashMap<(ShaderHandle, String, Option<u32>), UniformValue>,
    texture_bindings: HashMap<(ShaderHandle, String), TextureHandle>,

    current_pass: Option<String>,
    current_shader: Option<ShaderHandle>,
    current_state: RenderState,
    line_width: f32,

    next_texture_id: u64,
    next_mesh_id: u64,
    next_shader_id: u64,

    fail_mesh_uploads: bool,
}

impl RecordingBackend {
    pub fn new() -> Self {
        Self {
            line_width: 1.0,
            next_texture_id: 1,
            next_mesh_id: 1,
            next_shader_id: 1,
            ..Default::default()
        }
    }

    /// Make every mesh upload fail until switched off again.
    pub fn set_fail_mesh_uploads(&mut self, fail: bool) {
        self.fail_mesh_uploads = fail;
    }

    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    pub fn draws(&self) -> &[DrawRecord] {
        &self.draws
    }

    /// Draws recorded inside passes with the given label
    pub fn draws_in(&self, pass: &str) -> Vec<&DrawRecord> {
        self.draws.iter().filter(|d| d.pass == pass).collect()
    }

    /// Forget recorded commands and draws. Resource and uniform state is kept.
    pub fn clear_commands(&mut self) {
        self.commands.clear();
        self.draws.clear();
    }

    pub fn passes(&self) -> Vec<RecordedPass> {
        let mut passes = Vec::new();
        let mut current: Option<RecordedPass> = None;
        for command in &self.commands {
            match command {
                Command::BeginRenderPass(desc) => {
                    current = Some(RecordedPass {
                        label: desc.label.clone().unwrap_or_default(),
                        descriptor: desc.clone(),
                        commands: Vec::new(),
                    });
                }
                Command::EndRenderPass => {
                    if let Some(pass) = current.take() {
                        passes.push(pass);
                    }
                }
                other => {
                    if let Some(pass) = current.as_mut() {
                        pass.commands.push(other.clone());
                    }
                }
            }
        }
        passes
    }

    pub fn pass_labels(&self) -> Vec<String> {
        self.passes().into_iter().map(|p| p.label).collect()
    }

    pub fn shader_label(&self, shader: ShaderHandle) -> Option<&str> {
        self.shaders.get(&shader).map(String::as_str)
    }

    pub fn shader_by_label(&self, label: &str) -> Option<ShaderHandle> {
        self.shaders
            .iter()
            .find(|(_, l)| l.as_str() == label)
            .map(|(handle, _)| *handle)
    }

    pub fn uniform(&self, shader: ShaderHandle, name: &str) -> Option<UniformValue> {
        self.uniforms.get(&(shader, name.to_string(), None)).copied()
    }

    pub fn uniform_element(
        &self,
        shader: ShaderHandle,
        name: &str,
        index: u32,
    ) -> Option<UniformValue> {
        self.uniforms
            .get(&(shader, name.to_string(), Some(index)))
            .copied()
    }

    pub fn bound_texture(&self, shader: ShaderHandle, name: &str) -> Option<TextureHandle> {
        self.texture_bindings
            .get(&(shader, name.to_string()))
            .copied()
    }

    pub fn texture_descriptor(&self, texture: TextureHandle) -> Option<&TextureDescriptor> {
        self.textures.get(&texture)
    }

    pub fn live_texture_count(&self) -> usize {
        self.textures.len()
    }

    pub fn live_mesh_count(&self) -> usize {
        self.meshes.len()
    }

    fn record_draw(&mut self, mesh: Option<MeshHandle>) {
        let Some(pass) = self.current_pass.clone() else {
            log::warn!("RecordingBackend: draw issued outside of a render pass");
            return;
        };
        let (uniforms, textures) = match self.current_shader {
            Some(shader) => (
                self.uniforms
                    .iter()
                    .filter(|((s, _, _), _)| *s == shader)
                    .map(|((_, name, index), value)| ((name.clone(), *index), *value))
                    .collect(),
                self.texture_bindings
                    .iter()
                    .filter(|((s, _), _)| *s == shader)
                    .map(|((_, name), texture)| (name.clone(), *texture))
                    .collect(),
            ),
            None => {
                log::warn!("RecordingBackend: draw issued without a shader in pass {}", pass);
                (HashMap::new(), HashMap::new())
            }
        };
        self.draws.push(DrawRecord {
            pass,
            shader: self.current_shader,
            mesh,
            state: self.current_state,
            line_width: self.line_width,
            uniforms,
            textures,
        });
    }
}

impl GraphicsBackend for RecordingBackend {
    fn name(&self) -> &'static str {
        "Recording Backend"
    }

    fn create_texture(&mut self, desc: &TextureDescriptor) -> BackendResult<TextureHandle> {
        if desc.width == 0 || desc.height == 0 {
            return Err(BackendError::TextureCreationFailed(format!(
                "{:?} has zero extent",
                desc.label
            )));
        }
        let texture = TextureHandle(self.next_texture_id);
        self.next_texture_id += 1;
        log::trace!(
            "RecordingBackend: creating texture {:?} ({}x{} {:?})",
            desc.label,
            desc.width,
            desc.height,
            desc.format
        );
        self.textures.insert(texture, desc.clone());
        self.commands.push(Command::CreateTexture {
            texture,
            desc: desc.clone(),
        });
        Ok(texture)
    }

    fn destroy_texture(&mut self, texture: TextureHandle) {
        self.textures.remove(&texture);
        self.commands.push(Command::DestroyTexture(texture));
    }

    fn create_mesh(&mut self, data: &MeshData<'_>) -> BackendResult<MeshHandle> {
        if self.fail_mesh_uploads {
            return Err(BackendError::BufferCreationFailed(format!(
                "mesh upload of {} rejected",
                data.label
            )));
        }
        let mesh = MeshHandle(self.next_mesh_id);
        self.next_mesh_id += 1;
        self.meshes
            .insert(mesh, (data.label.to_string(), data.indices.len()));
        self.commands.push(Command::CreateMesh {
            mesh,
            label: data.label.to_string(),
            vertex_count: data.vertices.len(),
            index_count: data.indices.len(),
        });
        Ok(mesh)
    }

    fn destroy_mesh(&mut self, mesh: MeshHandle) {
        self.meshes.remove(&mesh);
        self.commands.push(Command::DestroyMesh(mesh));
    }

    fn create_shader(&mut self, desc: &ShaderDescriptor) -> BackendResult<ShaderHandle> {
        let shader = ShaderHandle(self.next_shader_id);
        self.next_shader_id += 1;
        self.shaders.insert(shader, desc.label.clone());
        self.commands.push(Command::CreateShader {
            shader,
            label: desc.label.clone(),
        });
        Ok(shader)
    }

    fn destroy_shader(&mut self, shader: ShaderHandle) {
        self.shaders.remove(&shader);
        self.uniforms.retain(|(s, _, _), _| *s != shader);
        self.texture_bindings.retain(|(s, _), _| *s != shader);
        self.commands.push(Command::DestroyShader(shader));
    }

    fn begin_render_pass(&mut self, desc: &RenderPassDescriptor) {
        if let Some(open) = &self.current_pass {
            log::warn!("RecordingBackend: pass {} was never ended", open);
        }
        self.current_pass = Some(desc.label.clone().unwrap_or_default());
        self.commands.push(Command::BeginRenderPass(desc.clone()));
    }

    fn end_render_pass(&mut self) {
        self.current_pass = None;
        self.commands.push(Command::EndRenderPass);
    }

    fn set_render_state(&mut self, state: RenderState) {
        self.current_state = state;
        self.commands.push(Command::SetRenderState(state));
    }

    fn use_shader(&mut self, shader: ShaderHandle) {
        self.current_shader = Some(shader);
        self.commands.push(Command::UseShader(shader));
    }

    fn set_uniform(&mut self, shader: ShaderHandle, name: &str, value: UniformValue) {
        self.uniforms.insert((shader, name.to_string(), None), value);
        self.commands.push(Command::SetUniform {
            shader,
            name: name.to_string(),
            index: None,
            value,
        });
    }

    fn set_uniform_element(
        &mut self,
        shader: ShaderHandle,
        name: &str,
        index: u32,
        value: UniformValue,
    ) {
        self.uniforms
            .insert((shader, name.to_string(), Some(index)), value);
        self.commands.push(Command::SetUniform {
            shader,
            name: name.to_string(),
            index: Some(index),
            value,
        });
    }

    fn bind_texture(&mut self, shader: ShaderHandle, name: &str, texture: TextureHandle) {
        self.texture_bindings
            .insert((shader, name.to_string()), texture);
        self.commands.push(Command::BindTexture {
            shader,
            name: name.to_string(),
            texture,
        });
    }

    fn unbind_texture(&mut self, shader: ShaderHandle, name: &str) {
        self.texture_bindings.remove(&(shader, name.to_string()));
        self.commands.push(Command::UnbindTexture {
            shader,
            name: name.to_string(),
        });
    }

    fn set_line_width(&mut self, width: f32) {
        self.line_width = width;
        self.commands.push(Command::SetLineWidth(width));
    }

    fn draw_mesh(&mut self, mesh: MeshHandle) {
        self.record_draw(Some(mesh));
        self.commands.push(Command::DrawMesh(mesh));
    }

    fn draw_fullscreen(&mut self) {
        self.record_draw(None);
        self.commands.push(Command::DrawFullscreen);
    }

    fn copy_texture(&mut self, source: TextureHandle, destination: TextureHandle) {
        if self.current_pass.is_some() {
            log::warn!("RecordingBackend: texture copy issued inside a render pass");
        }
        self.commands.push(Command::CopyTexture {
            source,
            destination,
        });
    }

    fn submit(&mut self) {
        self.commands.push(Command::Submit);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    fn pass(label: &str, texture: TextureHandle) -> RenderPassDescriptor {
        RenderPassDescriptor {
            label: Some(label.to_string()),
            color_attachments: vec![ColorAttachment {
                texture,
                load_op: LoadOp::Clear([0.0; 4]),
                store_op: StoreOp::Store,
            }],
            depth_stencil_attachment: None,
        }
    }

    #[test]
    fn test_handles_are_sequential() {
        let mut backend = RecordingBackend::new();
        let a = backend.create_texture(&TextureDescriptor::default()).unwrap();
        let b = backend.create_texture(&TextureDescriptor::default()).unwrap();
        assert_eq!(a.id() + 1, b.id());
        assert_eq!(backend.live_texture_count(), 2);

        backend.destroy_texture(a);
        assert_eq!(backend.live_texture_count(), 1);
    }

    #[test]
    fn test_zero_sized_texture_is_rejected() {
        let mut backend = RecordingBackend::new();
        let desc = TextureDescriptor {
            width: 0,
            ..Default::default()
        };
        assert!(backend.create_texture(&desc).is_err());
    }

    #[test]
    fn test_uniforms_persist_per_shader() {
        let mut backend = RecordingBackend::new();
        let a = backend.create_shader(&ShaderDescriptor::new("a", "")).unwrap();
        let b = backend.create_shader(&ShaderDescriptor::new("b", "")).unwrap();

        backend.set_uniform(a, "u_Value", UniformValue::Float(1.0));
        backend.set_uniform(b, "u_Value", UniformValue::Float(2.0));
        backend.set_uniform_element(a, "u_Array", 3, Vec3::ONE.into());

        assert_eq!(backend.uniform(a, "u_Value"), Some(UniformValue::Float(1.0)));
        assert_eq!(backend.uniform(b, "u_Value"), Some(UniformValue::Float(2.0)));
        assert_eq!(
            backend.uniform_element(a, "u_Array", 3),
            Some(UniformValue::Vec3(Vec3::ONE))
        );
        assert_eq!(backend.uniform_element(a, "u_Array", 2), None);
        assert_eq!(backend.shader_by_label("b"), Some(b));
    }

    #[test]
    fn test_draws_snapshot_shader_state() {
        let mut backend = RecordingBackend::new();
        let target = backend.create_texture(&TextureDescriptor::default()).unwrap();
        let shader = backend.create_shader(&ShaderDescriptor::new("s", "")).unwrap();

        backend.begin_render_pass(&pass("First", target));
        backend.use_shader(shader);
        backend.set_uniform(shader, "u_EntityID", UniformValue::Int(4));
        backend.draw_fullscreen();
        backend.set_uniform(shader, "u_EntityID", UniformValue::Int(5));
        backend.draw_fullscreen();
        backend.end_render_pass();

        let draws = backend.draws_in("First");
        assert_eq!(draws.len(), 2);
        assert_eq!(draws[0].uniform("u_EntityID"), Some(UniformValue::Int(4)));
        assert_eq!(draws[1].uniform("u_EntityID"), Some(UniformValue::Int(5)));
    }

    #[test]
    fn test_unbound_texture_is_not_sampled_by_later_draws() {
        let mut backend = RecordingBackend::new();
        let target = backend.create_texture(&TextureDescriptor::default()).unwrap();
        let source = backend.create_texture(&TextureDescriptor::default()).unwrap();
        let shader = backend.create_shader(&ShaderDescriptor::new("s", "")).unwrap();

        backend.begin_render_pass(&pass("First", target));
        backend.use_shader(shader);
        backend.bind_texture(shader, "u_Source", source);
        backend.draw_fullscreen();
        backend.unbind_texture(shader, "u_Source");
        backend.draw_fullscreen();
        backend.end_render_pass();

        let draws = backend.draws_in("First");
        assert_eq!(draws[0].texture("u_Source"), Some(source));
        assert_eq!(draws[1].texture("u_Source"), None);
        assert_eq!(backend.bound_texture(shader, "u_Source"), None);
    }

    #[test]
    fn test_passes_group_commands() {
        let mut backend = RecordingBackend::new();
        let target = backend.create_texture(&TextureDescriptor::default()).unwrap();
        let shader = backend.create_shader(&ShaderDescriptor::new("s", "")).unwrap();

        backend.begin_render_pass(&pass("A", target));
        backend.use_shader(shader);
        backend.draw_fullscreen();
        backend.end_render_pass();
        backend.begin_render_pass(&pass("B", target));
        backend.end_render_pass();

        let passes = backend.passes();
        assert_eq!(backend.pass_labels(), vec!["A", "B"]);
        assert_eq!(passes[0].draw_count(), 1);
        assert_eq!(passes[1].draw_count(), 0);
        assert_eq!(passes[0].color_target(), Some(target));
    }

    #[test]
    fn test_draw_outside_pass_is_not_recorded_as_draw() {
        let mut backend = RecordingBackend::new();
        backend.draw_fullscreen();
        assert!(backend.draws().is_empty());
    }
}
