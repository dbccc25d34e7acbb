//! Common types shared between backends

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec2, Vec3, Vec4};

use super::traits::TextureHandle;

/// Texture format enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureFormat {
    Rgba8Unorm,
    Rgba8UnormSrgb,
    Bgra8UnormSrgb,
    Rgba16Float,
    R16Float,
    R8Unorm,
    R32Sint,
    Depth32Float,
}

impl TextureFormat {
    pub fn is_depth(&self) -> bool {
        matches!(self, TextureFormat::Depth32Float)
    }

    pub fn is_integer(&self) -> bool {
        matches!(self, TextureFormat::R32Sint)
    }

    /// How a shader samples this format.
    pub fn sample_type(&self) -> TextureSampleType {
        match self {
            TextureFormat::Depth32Float => TextureSampleType::Depth,
            TextureFormat::R32Sint => TextureSampleType::Sint,
            _ => TextureSampleType::Float { filterable: true },
        }
    }

    pub fn bytes_per_pixel(&self) -> u32 {
        match self {
            TextureFormat::R8Unorm => 1,
            TextureFormat::R16Float => 2,
            TextureFormat::Rgba8Unorm
            | TextureFormat::Rgba8UnormSrgb
            | TextureFormat::Bgra8UnormSrgb
            | TextureFormat::R32Sint
            | TextureFormat::Depth32Float => 4,
            TextureFormat::Rgba16Float => 8,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureSampleType {
    Float { filterable: bool },
    Depth,
    Sint,
}

/// Texture usage flags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureUsage(u32);

impl TextureUsage {
    pub const COPY_SRC: Self = Self(1 << 0);
    pub const COPY_DST: Self = Self(1 << 1);
    pub const TEXTURE_BINDING: Self = Self(1 << 2);
    pub const RENDER_ATTACHMENT: Self = Self(1 << 4);

    /// Every usage an off-screen render target attachment needs.
    pub const RENDER_TARGET: Self = Self((1 << 0) | (1 << 1) | (1 << 2) | (1 << 4));

    pub fn contains(&self, other: Self) -> bool {
        (self.0 & other.0) == other.0
    }
}

impl std::ops::BitOr for TextureUsage {
    type Output = Self;
    fn bitor(self, rhs: Self) -> Self::Output {
        Self(self.0 | rhs.0)
    }
}

/// Filter mode for samplers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FilterMode {
    Nearest,
    Linear,
}

/// Texture descriptor
#[derive(Debug, Clone, PartialEq)]
pub struct TextureDescriptor {
    pub label: Option<String>,
    pub width: u32,
    pub height: u32,
    pub format: TextureFormat,
    pub usage: TextureUsage,
    /// Filter used when the texture is sampled
    pub filter: FilterMode,
}

impl Default for TextureDescriptor {
    fn default() -> Self {
        Self {
            label: None,
            width: 1,
            height: 1,
            format: TextureFormat::Rgba8Unorm,
            usage: TextureUsage::TEXTURE_BINDING | TextureUsage::COPY_DST,
            filter: FilterMode::Linear,
        }
    }
}

/// Vertex attribute format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VertexFormat {
    Float32x2,
    Float32x3,
    Float32x4,
    Sint32x4,
}

/// Vertex attribute description
#[derive(Debug, Clone)]
pub struct VertexAttribute {
    pub location: u32,
    pub format: VertexFormat,
    pub offset: u64,
}

/// Vertex buffer layout
#[derive(Debug, Clone)]
pub struct VertexBufferLayout {
    pub array_stride: u64,
    pub attributes: Vec<VertexAttribute>,
}

/// Vertex with position, normal, UV, tangent and skinning data.
///
/// Static meshes leave `bone_ids` at -1 and `bone_weights` at zero.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    pub position: Vec3,
    pub normal: Vec3,
    pub uv: Vec2,
    pub tangent: Vec4,
    pub bone_ids: [i32; 4],
    pub bone_weights: Vec4,
}

impl Vertex {
    pub fn new(position: Vec3, normal: Vec3, uv: Vec2) -> Self {
        Self {
            position,
            normal,
            uv,
            tangent: Vec4::new(1.0, 0.0, 0.0, 1.0),
            bone_ids: [-1; 4],
            bone_weights: Vec4::ZERO,
        }
    }

    pub fn at(position: Vec3) -> Self {
        Self::new(position, Vec3::Y, Vec2::ZERO)
    }

    pub fn layout() -> VertexBufferLayout {
        VertexBufferLayout {
            array_stride: std::mem::size_of::<Self>() as u64,
            attributes: vec![
                VertexAttribute {
                    location: 0,
                    format: VertexFormat::Float32x3,
                    offset: 0,
                },
                VertexAttribute {
                    location: 1,
                    format: VertexFormat::Float32x3,
                    offset: 12,
                },
                VertexAttribute {
                    location: 2,
                    format: VertexFormat::Float32x2,
                    offset: 24,
                },
                VertexAttribute {
                    location: 3,
                    format: VertexFormat::Float32x4,
                    offset: 32,
                },
                VertexAttribute {
                    location: 4,
                    format: VertexFormat::Sint32x4,
                    offset: 48,
                },
                VertexAttribute {
                    location: 5,
                    format: VertexFormat::Float32x4,
                    offset: 64,
                },
            ],
        }
    }
}

/// Primitive topology
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrimitiveTopology {
    LineList,
    TriangleList,
}

/// Geometry handed to the backend for upload.
#[derive(Debug, Clone, Copy)]
pub struct MeshData<'a> {
    pub label: &'a str,
    pub vertices: &'a [Vertex],
    pub indices: &'a [u32],
    pub topology: PrimitiveTopology,
}

/// Cull mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CullMode {
    None,
    Front,
    Back,
}

/// Blend state applied to every color attachment of the current pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlendMode {
    Alpha,
    Additive,
}

/// Fixed-function state used by subsequent draws.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RenderState {
    pub depth_test: bool,
    pub depth_write: bool,
    pub cull_mode: CullMode,
    pub blend: Option<BlendMode>,
}

impl Default for RenderState {
    fn default() -> Self {
        Self::opaque()
    }
}

impl RenderState {
    /// Depth tested and written, no culling, no blending.
    pub fn opaque() -> Self {
        Self {
            depth_test: true,
            depth_write: true,
            cull_mode: CullMode::None,
            blend: None,
        }
    }

    /// Depth tested but not written.
    pub fn depth_read_only() -> Self {
        Self {
            depth_write: false,
            ..Self::opaque()
        }
    }

    /// Full-screen passes: no depth at all.
    pub fn fullscreen() -> Self {
        Self {
            depth_test: false,
            depth_write: false,
            cull_mode: CullMode::None,
            blend: None,
        }
    }

    #[must_use]
    pub fn with_cull_mode(mut self, cull_mode: CullMode) -> Self {
        self.cull_mode = cull_mode;
        self
    }

    #[must_use]
    pub fn with_blend(mut self, blend: BlendMode) -> Self {
        self.blend = Some(blend);
        self
    }

    #[must_use]
    pub fn with_depth_test(mut self, depth_test: bool) -> Self {
        self.depth_test = depth_test;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LoadOp {
    Clear([f32; 4]),
    Load,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreOp {
    Store,
    Discard,
}

/// Color attachment for render pass
#[derive(Debug, Clone, PartialEq)]
pub struct ColorAttachment {
    pub texture: TextureHandle,
    pub load_op: LoadOp,
    pub store_op: StoreOp,
}

/// Depth attachment for render pass
#[derive(Debug, Clone, PartialEq)]
pub struct DepthStencilAttachment {
    pub texture: TextureHandle,
    pub depth_load_op: LoadOp,
    pub depth_store_op: StoreOp,
    pub depth_clear_value: f32,
}

/// Render pass descriptor
#[derive(Debug, Clone, PartialEq)]
pub struct RenderPassDescriptor {
    pub label: Option<String>,
    pub color_attachments: Vec<ColorAttachment>,
    pub depth_stencil_attachment: Option<DepthStencilAttachment>,
}

/// Scalar and vector types a shader uniform can hold
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UniformType {
    Int,
    Float,
    Vec2,
    Vec3,
    Vec4,
    Mat4,
}

impl UniformType {
    pub fn size(&self) -> u64 {
        match self {
            UniformType::Int | UniformType::Float => 4,
            UniformType::Vec2 => 8,
            UniformType::Vec3 => 12,
            UniformType::Vec4 => 16,
            UniformType::Mat4 => 64,
        }
    }

    /// WGSL uniform address space alignment
    pub fn align(&self) -> u64 {
        match self {
            UniformType::Int | UniformType::Float => 4,
            UniformType::Vec2 => 8,
            UniformType::Vec3 | UniformType::Vec4 | UniformType::Mat4 => 16,
        }
    }
}

/// A value written to a named shader uniform
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UniformValue {
    Int(i32),
    Float(f32),
    Vec2(Vec2),
    Vec3(Vec3),
    Vec4(Vec4),
    Mat4(Mat4),
}

impl UniformValue {
    pub fn uniform_type(&self) -> UniformType {
        match self {
            UniformValue::Int(_) => UniformType::Int,
            UniformValue::Float(_) => UniformType::Float,
            UniformValue::Vec2(_) => UniformType::Vec2,
            UniformValue::Vec3(_) => UniformType::Vec3,
            UniformValue::Vec4(_) => UniformType::Vec4,
            UniformValue::Mat4(_) => UniformType::Mat4,
        }
    }

    /// Little-endian bytes as laid out in a uniform buffer.
    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            UniformValue::Int(v) => v.to_le_bytes().to_vec(),
            UniformValue::Float(v) => v.to_le_bytes().to_vec(),
            UniformValue::Vec2(v) => bytemuck::bytes_of(v).to_vec(),
            UniformValue::Vec3(v) => bytemuck::bytes_of(v).to_vec(),
            UniformValue::Vec4(v) => bytemuck::bytes_of(v).to_vec(),
            UniformValue::Mat4(v) => bytemuck::bytes_of(v).to_vec(),
        }
    }

    pub fn as_int(&self) -> Option<i32> {
        match self {
            UniformValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f32> {
        match self {
            UniformValue::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_mat4(&self) -> Option<Mat4> {
        match self {
            UniformValue::Mat4(v) => Some(*v),
            _ => None,
        }
    }
}

impl From<i32> for UniformValue {
    fn from(value: i32) -> Self {
        UniformValue::Int(value)
    }
}

impl From<bool> for UniformValue {
    fn from(value: bool) -> Self {
        UniformValue::Int(value as i32)
    }
}

impl From<f32> for UniformValue {
    fn from(value: f32) -> Self {
        UniformValue::Float(value)
    }
}

impl From<Vec2> for UniformValue {
    fn from(value: Vec2) -> Self {
        UniformValue::Vec2(value)
    }
}

impl From<Vec3> for UniformValue {
    fn from(value: Vec3) -> Self {
        UniformValue::Vec3(value)
    }
}

impl From<Vec4> for UniformValue {
    fn from(value: Vec4) -> Self {
        UniformValue::Vec4(value)
    }
}

impl From<Mat4> for UniformValue {
    fn from(value: Mat4) -> Self {
        UniformValue::Mat4(value)
    }
}

/// A named uniform declared by a shader. `count > 1` declares an array.
#[derive(Debug, Clone, PartialEq)]
pub struct UniformField {
    pub name: String,
    pub ty: UniformType,
    pub count: u32,
}

impl UniformField {
    pub fn new(name: &str, ty: UniformType) -> Self {
        Self {
            name: name.to_string(),
            ty,
            count: 1,
        }
    }

    pub fn array(name: &str, ty: UniformType, count: u32) -> Self {
        Self {
            name: name.to_string(),
            ty,
            count,
        }
    }
}

/// A named texture input declared by a shader
#[derive(Debug, Clone, PartialEq)]
pub struct TextureBinding {
    pub name: String,
    pub sample_type: TextureSampleType,
}

impl TextureBinding {
    pub fn new(name: &str, sample_type: TextureSampleType) -> Self {
        Self {
            name: name.to_string(),
            sample_type,
        }
    }

    pub fn color(name: &str) -> Self {
        Self::new(name, TextureSampleType::Float { filterable: true })
    }
}

/// Shader program descriptor.
///
/// `source` holds WGSL with `vs_main`/`fs_main` entry points. Uniforms live in one
/// buffer at `@group(0) @binding(0)` laid out in declaration order; texture `i`
/// binds at `@group(1) @binding(2 * i)` with its sampler at `2 * i + 1`.
#[derive(Debug, Clone, PartialEq)]
pub struct ShaderDescriptor {
    pub label: String,
    pub source: String,
    pub uniforms: Vec<UniformField>,
    pub textures: Vec<TextureBinding>,
}

impl ShaderDescriptor {
    pub fn new(label: &str, source: &str) -> Self {
        Self {
            label: label.to_string(),
            source: source.to_string(),
            uniforms: Vec::new(),
            textures: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_uniform(mut self, field: UniformField) -> Self {
        self.uniforms.push(field);
        self
    }

    #[must_use]
    pub fn with_texture(mut self, binding: TextureBinding) -> Self {
        self.textures.push(binding);
        self
    }
}
