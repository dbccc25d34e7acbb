//! Core backend abstraction traits
//!
//! The renderer never talks to a graphics API directly. Everything it needs from the
//! GPU goes through [`GraphicsBackend`]: creating attachments and meshes, compiling
//! shaders, opening render passes, writing per-shader uniforms and issuing draws.

use crate::backend::types::*;
use thiserror::Error;

/// Backend error type
#[derive(Error, Debug)]
pub enum BackendError {
    #[error("Failed to initialize backend: {0}")]
    InitializationFailed(String),
    #[error("Failed to create device: {0}")]
    DeviceCreationFailed(String),
    #[error("Failed to create buffer: {0}")]
    BufferCreationFailed(String),
    #[error("Failed to create texture: {0}")]
    TextureCreationFailed(String),
    #[error("Failed to create shader: {0}")]
    ShaderCreationFailed(String),
    #[error("Unknown {kind} handle {id}")]
    InvalidHandle { kind: &'static str, id: u64 },
}

pub type BackendResult<T> = Result<T, BackendError>;

/// Handle to a GPU texture
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureHandle(pub(crate) u64);

/// Handle to uploaded mesh geometry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MeshHandle(pub(crate) u64);

/// Handle to a compiled shader program
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ShaderHandle(pub(crate) u64);

impl TextureHandle {
    pub fn id(&self) -> u64 {
        self.0
    }
}

impl MeshHandle {
    pub fn id(&self) -> u64 {
        self.0
    }
}

impl ShaderHandle {
    pub fn id(&self) -> u64 {
        self.0
    }
}

/// Main graphics backend trait
///
/// Uniform values and texture bindings belong to a shader and persist until they are
/// overwritten, the same way program state behaves in immediate-mode APIs. Draws use
/// the shader selected by [`GraphicsBackend::use_shader`] and the last
/// [`RenderState`], and must happen between `begin_render_pass` and
/// `end_render_pass`.
pub trait GraphicsBackend {
    /// Human readable backend name
    fn name(&self) -> &'static str;

    // Resource creation

    /// Create a texture
    fn create_texture(&mut self, desc: &TextureDescriptor) -> BackendResult<TextureHandle>;

    /// Destroy a texture
    fn destroy_texture(&mut self, texture: TextureHandle);

    /// Upload mesh geometry
    fn create_mesh(&mut self, data: &MeshData<'_>) -> BackendResult<MeshHandle>;

    /// Destroy a mesh
    fn destroy_mesh(&mut self, mesh: MeshHandle);

    /// Compile a shader program
    fn create_shader(&mut self, desc: &ShaderDescriptor) -> BackendResult<ShaderHandle>;

    /// Destroy a shader program
    fn destroy_shader(&mut self, shader: ShaderHandle);

    // Command recording

    /// Begin a render pass
    fn begin_render_pass(&mut self, desc: &RenderPassDescriptor);

    /// End the current render pass
    fn end_render_pass(&mut self);

    /// Set the fixed-function state used by subsequent draws
    fn set_render_state(&mut self, state: RenderState);

    /// Select the shader used by subsequent draws
    fn use_shader(&mut self, shader: ShaderHandle);

    /// Write a uniform of `shader`
    fn set_uniform(&mut self, shader: ShaderHandle, name: &str, value: UniformValue);

    /// Write one element of a uniform array of `shader`
    fn set_uniform_element(
        &mut self,
        shader: ShaderHandle,
        name: &str,
        index: u32,
        value: UniformValue,
    );

    /// Bind a texture to a named sampler input of `shader`
    fn bind_texture(&mut self, shader: ShaderHandle, name: &str, texture: TextureHandle);

    /// Clear a sampler input of `shader` so it reads the backend's neutral texture
    fn unbind_texture(&mut self, shader: ShaderHandle, name: &str);

    /// Set the rasterized width of line primitives
    fn set_line_width(&mut self, width: f32);

    /// Draw a whole mesh with the current shader
    fn draw_mesh(&mut self, mesh: MeshHandle);

    /// Draw a full-screen triangle with the current shader
    fn draw_fullscreen(&mut self);

    /// Copy the full contents of one texture into another of the same size and format.
    /// Must not be called inside a render pass.
    fn copy_texture(&mut self, source: TextureHandle, destination: TextureHandle);

    /// Submit all recorded work to the GPU
    fn submit(&mut self);
}
