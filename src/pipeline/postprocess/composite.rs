//! Fullscreen stage helper and the copy/add/combine compositing passes

use glam::UVec2;

use crate::backend::{RenderState, ShaderHandle, TextureFormat, TextureHandle};
use crate::error::RenderResult;
use crate::pipeline::context::Gpu;
use crate::render_target::{LoadAction, RenderTarget, RenderTargetPool, TargetId};
use crate::shaders::names;

/// Pooled color target of a post-processing stage
pub(crate) fn stage_target(targets: &mut RenderTargetPool, label: &str, size: UVec2) -> TargetId {
    targets.insert(RenderTarget::color(label, size, TextureFormat::Rgba16Float))
}

/// Resize `target` to `size`, clear it and run one fullscreen draw of `shader_name`.
///
/// `setup` writes the stage's uniforms and textures. Without the shader the
/// target is only cleared. Returns the target's color output.
pub fn fullscreen_pass(
    gpu: &mut Gpu<'_>,
    target: TargetId,
    size: UVec2,
    shader_name: &str,
    setup: impl FnOnce(&mut Gpu<'_>, ShaderHandle),
) -> RenderResult<TextureHandle> {
    gpu.queue_resize(target, size);
    gpu.bind_target(target, LoadAction::Clear)?;
    if let Some(shader) = gpu.shader(shader_name) {
        gpu.use_shader(shader, RenderState::fullscreen());
        setup(gpu, shader);
        gpu.draw_fullscreen();
    }
    gpu.unbind();
    gpu.output(target)
}

pub fn copy(
    gpu: &mut Gpu<'_>,
    target: TargetId,
    size: UVec2,
    source: TextureHandle,
) -> RenderResult<TextureHandle> {
    fullscreen_pass(gpu, target, size, names::COPY, |gpu, shader| {
        gpu.bind_texture(shader, "u_Source", Some(source));
    })
}

/// `a + b`
pub fn add(
    gpu: &mut Gpu<'_>,
    target: TargetId,
    size: UVec2,
    a: TextureHandle,
    b: TextureHandle,
) -> RenderResult<TextureHandle> {
    fullscreen_pass(gpu, target, size, names::ADD, |gpu, shader| {
        gpu.bind_texture(shader, "u_Source", Some(a));
        gpu.bind_texture(shader, "u_Source2", Some(b));
    })
}

/// `b` over `a`, weighted by the alpha of `b`
pub fn combine(
    gpu: &mut Gpu<'_>,
    target: TargetId,
    size: UVec2,
    a: TextureHandle,
    b: TextureHandle,
) -> RenderResult<TextureHandle> {
    fullscreen_pass(gpu, target, size, names::COMBINE, |gpu, shader| {
        gpu.bind_texture(shader, "u_Source", Some(a));
        gpu.bind_texture(shader, "u_Source2", Some(b));
    })
}
