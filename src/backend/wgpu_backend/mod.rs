//! Headless wgpu backend implementation
//!
//! Draw calls are buffered together with a snapshot of the shader's uniforms and
//! texture bindings and executed when the render pass ends, so shader state can be
//! changed freely between draws the same way the renderer does it on other APIs.

use std::collections::HashMap;

use wgpu::util::DeviceExt;

use crate::backend::traits::*;
use crate::backend::types::*;

/// Byte placement of a uniform inside a shader's uniform buffer
#[derive(Debug, Clone, Copy)]
struct UniformSlot {
    offset: u64,
    stride: u64,
    count: u32,
    ty: UniformType,
}

/// Name to slot map for a shader's uniform buffer. Arrays use a 16-byte element stride.
#[derive(Debug, Default)]
struct UniformLayout {
    slots: HashMap<String, UniformSlot>,
    size: u64,
}

fn align_to(value: u64, alignment: u64) -> u64 {
    value.div_ceil(alignment) * alignment
}

impl UniformLayout {
    fn new(fields: &[UniformField]) -> Self {
        let mut slots = HashMap::new();
        let mut offset = 0;
        for field in fields {
            let count = field.count.max(1);
            let (align, stride) = if count > 1 {
                (16, align_to(field.ty.size(), 16))
            } else {
                (field.ty.align(), field.ty.size())
            };
            offset = align_to(offset, align);
            slots.insert(
                field.name.clone(),
                UniformSlot {
                    offset,
                    stride,
                    count,
                    ty: field.ty,
                },
            );
            offset += stride * count as u64;
        }
        Self {
            slots,
            size: align_to(offset.max(16), 16),
        }
    }

    fn write(&self, data: &mut [u8], name: &str, index: u32, value: UniformValue) -> bool {
        let Some(slot) = self.slots.get(name) else {
            return false;
        };
        if index >= slot.count || slot.ty != value.uniform_type() {
            return false;
        }
        let start = (slot.offset + slot.stride * index as u64) as usize;
        let bytes = value.to_bytes();
        data[start..start + bytes.len()].copy_from_slice(&bytes);
        true
    }
}

struct GpuTexture {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    format: TextureFormat,
    filter: FilterMode,
    width: u32,
    height: u32,
}

struct GpuMesh {
    vertex_buffer: wgpu::Buffer,
    index_buffer: wgpu::Buffer,
    index_count: u32,
    topology: PrimitiveTopology,
}

struct GpuShader {
    label: String,
    module: wgpu::ShaderModule,
    uniforms: UniformLayout,
    uniform_data: Vec<u8>,
    textures: Vec<TextureBinding>,
    bound_textures: Vec<Option<TextureHandle>>,
    uniform_bind_group_layout: wgpu::BindGroupLayout,
    texture_bind_group_layout: wgpu::BindGroupLayout,
    pipeline_layout: wgpu::PipelineLayout,
}

/// Everything that selects a distinct render pipeline
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct PipelineKey {
    shader: u64,
    color_formats: Vec<TextureFormat>,
    depth_format: Option<TextureFormat>,
    state: RenderState,
    /// `None` for the full-screen triangle, which has no vertex buffer
    topology: Option<PrimitiveTopology>,
}

enum Geometry {
    Mesh(u64),
    Fullscreen,
}

/// Buffered draw with its own snapshot of shader state
struct DrawCommand {
    pipeline: PipelineKey,
    uniform_bind_group: wgpu::BindGroup,
    texture_bind_group: wgpu::BindGroup,
    geometry: Geometry,
}

/// Pending render pass with buffered commands
struct PendingRenderPass {
    descriptor: RenderPassDescriptor,
    color_formats: Vec<TextureFormat>,
    depth_format: Option<TextureFormat>,
    commands: Vec<DrawCommand>,
}

/// Fallback bound to texture inputs a pass left unset
struct FallbackTextures {
    color: GpuTexture,
    depth: GpuTexture,
    sint: GpuTexture,
}

/// wgpu backend implementation
pub struct WgpuBackend {
    device: wgpu::Device,
    queue: wgpu::Queue,

    // Resource storage
    textures: HashMap<u64, GpuTexture>,
    meshes: HashMap<u64, GpuMesh>,
    shaders: HashMap<u64, GpuShader>,
    pipelines: HashMap<PipelineKey, wgpu::RenderPipeline>,
    linear_sampler: wgpu::Sampler,
    nearest_sampler: wgpu::Sampler,
    fallback: FallbackTextures,

    // Handle counters
    next_texture_id: u64,
    next_mesh_id: u64,
    next_shader_id: u64,

    // Command state
    encoder: Option<wgpu::CommandEncoder>,
    pending_render_pass: Option<PendingRenderPass>,
    current_shader: Option<ShaderHandle>,
    current_state: RenderState,
}

impl WgpuBackend {
    fn convert_texture_format(format: TextureFormat) -> wgpu::TextureFormat {
        match format {
            TextureFormat::Rgba8Unorm => wgpu::TextureFormat::Rgba8Unorm,
            TextureFormat::Rgba8UnormSrgb => wgpu::TextureFormat::Rgba8UnormSrgb,
            TextureFormat::Bgra8UnormSrgb => wgpu::TextureFormat::Bgra8UnormSrgb,
            TextureFormat::Rgba16Float => wgpu::TextureFormat::Rgba16Float,
            TextureFormat::R16Float => wgpu::TextureFormat::R16Float,
            TextureFormat::R8Unorm => wgpu::TextureFormat::R8Unorm,
            TextureFormat::R32Sint => wgpu::TextureFormat::R32Sint,
            TextureFormat::Depth32Float => wgpu::TextureFormat::Depth32Float,
        }
    }

    fn convert_texture_usage(usage: TextureUsage) -> wgpu::TextureUsages {
        let mut result = wgpu::TextureUsages::empty();
        if usage.contains(TextureUsage::COPY_SRC) {
            result |= wgpu::TextureUsages::COPY_SRC;
        }
        if usage.contains(TextureUsage::COPY_DST) {
            result |= wgpu::TextureUsages::COPY_DST;
        }
        if usage.contains(TextureUsage::TEXTURE_BINDING) {
            result |= wgpu::TextureUsages::TEXTURE_BINDING;
        }
        if usage.contains(TextureUsage::RENDER_ATTACHMENT) {
            result |= wgpu::TextureUsages::RENDER_ATTACHMENT;
        }
        result
    }

    fn convert_vertex_format(format: VertexFormat) -> wgpu::VertexFormat {
        match format {
            VertexFormat::Float32x2 => wgpu::VertexFormat::Float32x2,
            VertexFormat::Float32x3 => wgpu::VertexFormat::Float32x3,
            VertexFormat::Float32x4 => wgpu::VertexFormat::Float32x4,
            VertexFormat::Sint32x4 => wgpu::VertexFormat::Sint32x4,
        }
    }

    fn convert_sample_type(sample_type: TextureSampleType) -> wgpu::TextureSampleType {
        match sample_type {
            TextureSampleType::Float { filterable } => wgpu::TextureSampleType::Float { filterable },
            TextureSampleType::Depth => wgpu::TextureSampleType::Depth,
            TextureSampleType::Sint => wgpu::TextureSampleType::Sint,
        }
    }

    fn convert_blend(blend: BlendMode) -> wgpu::BlendState {
        match blend {
            BlendMode::Alpha => wgpu::BlendState::ALPHA_BLENDING,
            BlendMode::Additive => wgpu::BlendState {
                color: wgpu::BlendComponent {
                    src_factor: wgpu::BlendFactor::One,
                    dst_factor: wgpu::BlendFactor::One,
                    operation: wgpu::BlendOperation::Add,
                },
                alpha: wgpu::BlendComponent::REPLACE,
            },
        }
    }

    fn convert_load_op(op: LoadOp) -> wgpu::LoadOp<wgpu::Color> {
        match op {
            LoadOp::Clear(color) => wgpu::LoadOp::Clear(wgpu::Color {
                r: color[0] as f64,
                g: color[1] as f64,
                b: color[2] as f64,
                a: color[3] as f64,
            }),
            LoadOp::Load => wgpu::LoadOp::Load,
        }
    }

    fn convert_store_op(op: StoreOp) -> wgpu::StoreOp {
        match op {
            StoreOp::Store => wgpu::StoreOp::Store,
            StoreOp::Discard => wgpu::StoreOp::Discard,
        }
    }

    fn allocate_texture(device: &wgpu::Device, desc: &TextureDescriptor) -> GpuTexture {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: desc.label.as_deref(),
            size: wgpu::Extent3d {
                width: desc.width,
                height: desc.height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: Self::convert_texture_format(desc.format),
            usage: Self::convert_texture_usage(desc.usage),
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        GpuTexture {
            texture,
            view,
            format: desc.format,
            filter: desc.filter,
            width: desc.width,
            height: desc.height,
        }
    }
}

impl WgpuBackend {
    /// Create a backend on the best available adapter without any surface
    pub fn new_headless() -> BackendResult<Self> {
        pollster::block_on(Self::new_headless_async())
    }

    pub async fn new_headless_async() -> BackendResult<Self> {
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .ok_or_else(|| BackendError::InitializationFailed("No suitable adapter found".into()))?;

        let adapter_info = adapter.get_info();
        log::info!(
            "Selected GPU: {} ({:?} backend)",
            adapter_info.name,
            adapter_info.backend
        );

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("Scene Renderer Device"),
                    required_features: wgpu::Features::empty(),
                    required_limits: wgpu::Limits::default(),
                },
                None,
            )
            .await
            .map_err(|e| BackendError::DeviceCreationFailed(e.to_string()))?;

        Ok(Self::from_device(device, queue))
    }

    /// Wrap an existing device, e.g. one shared with a windowing layer
    pub fn from_device(device: wgpu::Device, queue: wgpu::Queue) -> Self {
        device.on_uncaptured_error(Box::new(|error| {
            log::error!("wgpu error: {}", error);
        }));

        let sampler = |filter: wgpu::FilterMode, label: &str| {
            device.create_sampler(&wgpu::SamplerDescriptor {
                label: Some(label),
                address_mode_u: wgpu::AddressMode::ClampToEdge,
                address_mode_v: wgpu::AddressMode::ClampToEdge,
                address_mode_w: wgpu::AddressMode::ClampToEdge,
                mag_filter: filter,
                min_filter: filter,
                mipmap_filter: wgpu::FilterMode::Nearest,
                ..Default::default()
            })
        };
        let linear_sampler = sampler(wgpu::FilterMode::Linear, "Linear Sampler");
        let nearest_sampler = sampler(wgpu::FilterMode::Nearest, "Nearest Sampler");

        let fallback_desc = |label: &str, format: TextureFormat| TextureDescriptor {
            label: Some(label.to_string()),
            format,
            usage: TextureUsage::TEXTURE_BINDING | TextureUsage::COPY_DST,
            filter: FilterMode::Nearest,
            ..Default::default()
        };
        let fallback = FallbackTextures {
            color: Self::allocate_texture(
                &device,
                &fallback_desc("Fallback Color", TextureFormat::Rgba8Unorm),
            ),
            depth: Self::allocate_texture(
                &device,
                &TextureDescriptor {
                    usage: TextureUsage::TEXTURE_BINDING,
                    ..fallback_desc("Fallback Depth", TextureFormat::Depth32Float)
                },
            ),
            sint: Self::allocate_texture(
                &device,
                &fallback_desc("Fallback Sint", TextureFormat::R32Sint),
            ),
        };
        queue.write_texture(
            wgpu::ImageCopyTexture {
                texture: &fallback.color.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            &[255, 255, 255, 255],
            wgpu::ImageDataLayout {
                offset: 0,
                bytes_per_row: Some(4),
                rows_per_image: Some(1),
            },
            wgpu::Extent3d {
                width: 1,
                height: 1,
                depth_or_array_layers: 1,
            },
        );

        Self {
            device,
            queue,
            textures: HashMap::new(),
            meshes: HashMap::new(),
            shaders: HashMap::new(),
            pipelines: HashMap::new(),
            linear_sampler,
            nearest_sampler,
            fallback,
            next_texture_id: 1,
            next_mesh_id: 1,
            next_shader_id: 1,
            encoder: None,
            pending_render_pass: None,
            current_shader: None,
            current_state: RenderState::default(),
        }
    }

    /// Get device reference
    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    /// Get queue reference
    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    /// Raw wgpu texture behind a handle, for readback or presentation
    pub fn raw_texture(&self, texture: TextureHandle) -> Option<&wgpu::Texture> {
        self.textures.get(&texture.0).map(|t| &t.texture)
    }

    fn upload_mesh(&self, data: &MeshData<'_>) -> BackendResult<GpuMesh> {
        if data.vertices.is_empty() {
            return Err(BackendError::BufferCreationFailed(format!(
                "mesh {} has no vertices",
                data.label
            )));
        }
        let sequential: Vec<u32>;
        let indices = if data.indices.is_empty() {
            sequential = (0..data.vertices.len() as u32).collect();
            &sequential
        } else {
            data.indices
        };

        let vertex_buffer = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(data.label),
                contents: bytemuck::cast_slice(data.vertices),
                usage: wgpu::BufferUsages::VERTEX,
            });
        let index_buffer = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(data.label),
                contents: bytemuck::cast_slice(indices),
                usage: wgpu::BufferUsages::INDEX,
            });

        Ok(GpuMesh {
            vertex_buffer,
            index_buffer,
            index_count: indices.len() as u32,
            topology: data.topology,
        })
    }

    fn create_pipeline(&self, key: &PipelineKey) -> BackendResult<wgpu::RenderPipeline> {
        let shader = self.shaders.get(&key.shader).ok_or(BackendError::InvalidHandle {
            kind: "shader",
            id: key.shader,
        })?;

        let layout = Vertex::layout();
        let attributes: Vec<wgpu::VertexAttribute> = layout
            .attributes
            .iter()
            .map(|a| wgpu::VertexAttribute {
                format: Self::convert_vertex_format(a.format),
                offset: a.offset,
                shader_location: a.location,
            })
            .collect();
        let vertex_buffers = if key.topology.is_some() {
            vec![wgpu::VertexBufferLayout {
                array_stride: layout.array_stride,
                step_mode: wgpu::VertexStepMode::Vertex,
                attributes: &attributes,
            }]
        } else {
            Vec::new()
        };

        let color_targets: Vec<Option<wgpu::ColorTargetState>> = key
            .color_formats
            .iter()
            .map(|format| {
                Some(wgpu::ColorTargetState {
                    format: Self::convert_texture_format(*format),
                    // Integer attachments cannot blend
                    blend: if format.is_integer() {
                        None
                    } else {
                        key.state.blend.map(Self::convert_blend)
                    },
                    write_mask: wgpu::ColorWrites::ALL,
                })
            })
            .collect();

        let primitive = wgpu::PrimitiveState {
            topology: match key.topology {
                Some(PrimitiveTopology::LineList) => wgpu::PrimitiveTopology::LineList,
                _ => wgpu::PrimitiveTopology::TriangleList,
            },
            strip_index_format: None,
            front_face: wgpu::FrontFace::Ccw,
            cull_mode: match key.state.cull_mode {
                CullMode::None => None,
                CullMode::Front => Some(wgpu::Face::Front),
                CullMode::Back => Some(wgpu::Face::Back),
            },
            ..Default::default()
        };

        let depth_stencil = key.depth_format.map(|format| wgpu::DepthStencilState {
            format: Self::convert_texture_format(format),
            depth_write_enabled: key.state.depth_write,
            depth_compare: if key.state.depth_test {
                wgpu::CompareFunction::LessEqual
            } else {
                wgpu::CompareFunction::Always
            },
            stencil: wgpu::StencilState::default(),
            bias: wgpu::DepthBiasState::default(),
        });

        Ok(self
            .device
            .create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some(&shader.label),
                layout: Some(&shader.pipeline_layout),
                vertex: wgpu::VertexState {
                    module: &shader.module,
                    entry_point: "vs_main",
                    buffers: &vertex_buffers,
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                },
                // Depth-only passes run without a fragment stage
                fragment: if color_targets.is_empty() {
                    None
                } else {
                    Some(wgpu::FragmentState {
                        module: &shader.module,
                        entry_point: "fs_main",
                        targets: &color_targets,
                        compilation_options: wgpu::PipelineCompilationOptions::default(),
                    })
                },
                primitive,
                depth_stencil,
                multisample: wgpu::MultisampleState::default(),
                multiview: None,
            }))
    }

    fn record_draw(&mut self, geometry: Geometry) {
        let Some(pending) = self.pending_render_pass.as_ref() else {
            log::warn!("WgpuBackend: draw issued outside of a render pass");
            return;
        };
        let Some(shader_handle) = self.current_shader else {
            log::warn!("WgpuBackend: draw issued without a shader");
            return;
        };
        let topology = match geometry {
            Geometry::Mesh(id) => match self.meshes.get(&id) {
                Some(mesh) => Some(mesh.topology),
                None => {
                    log::warn!("WgpuBackend: draw of unknown mesh {}", id);
                    return;
                }
            },
            Geometry::Fullscreen => None,
        };

        let key = PipelineKey {
            shader: shader_handle.0,
            color_formats: pending.color_formats.clone(),
            depth_format: pending.depth_format,
            state: self.current_state,
            topology,
        };
        if !self.pipelines.contains_key(&key) {
            match self.create_pipeline(&key) {
                Ok(pipeline) => {
                    self.pipelines.insert(key.clone(), pipeline);
                }
                Err(e) => {
                    log::warn!("WgpuBackend: skipping draw: {}", e);
                    return;
                }
            }
        }

        let Some(shader) = self.shaders.get(&shader_handle.0) else {
            return;
        };

        let uniform_buffer = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(&shader.label),
                contents: &shader.uniform_data,
                usage: wgpu::BufferUsages::UNIFORM,
            });
        let uniform_bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(&shader.label),
            layout: &shader.uniform_bind_group_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: uniform_buffer.as_entire_binding(),
            }],
        });

        let mut entries = Vec::with_capacity(shader.textures.len() * 2);
        for (slot, binding) in shader.textures.iter().enumerate() {
            let bound = shader.bound_textures[slot]
                .and_then(|handle| self.textures.get(&handle.0))
                .filter(|texture| texture.format.sample_type() == binding.sample_type);
            let texture = bound.unwrap_or(match binding.sample_type {
                TextureSampleType::Depth => &self.fallback.depth,
                TextureSampleType::Sint => &self.fallback.sint,
                TextureSampleType::Float { .. } => &self.fallback.color,
            });
            let sampler = match (binding.sample_type, texture.filter) {
                (TextureSampleType::Float { filterable: true }, FilterMode::Linear) => {
                    &self.linear_sampler
                }
                _ => &self.nearest_sampler,
            };
            entries.push(wgpu::BindGroupEntry {
                binding: 2 * slot as u32,
                resource: wgpu::BindingResource::TextureView(&texture.view),
            });
            entries.push(wgpu::BindGroupEntry {
                binding: 2 * slot as u32 + 1,
                resource: wgpu::BindingResource::Sampler(sampler),
            });
        }
        let texture_bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(&shader.label),
            layout: &shader.texture_bind_group_layout,
            entries: &entries,
        });

        if let Some(pending) = self.pending_render_pass.as_mut() {
            pending.commands.push(DrawCommand {
                pipeline: key,
                uniform_bind_group,
                texture_bind_group,
                geometry,
            });
        }
    }
}

impl GraphicsBackend for WgpuBackend {
    fn name(&self) -> &'static str {
        "wgpu"
    }

    fn create_texture(&mut self, desc: &TextureDescriptor) -> BackendResult<TextureHandle> {
        let limit = self.device.limits().max_texture_dimension_2d;
        if desc.width == 0 || desc.height == 0 || desc.width > limit || desc.height > limit {
            return Err(BackendError::TextureCreationFailed(format!(
                "{:?}: {}x{} outside 1..={}",
                desc.label, desc.width, desc.height, limit
            )));
        }

        let texture = Self::allocate_texture(&self.device, desc);
        let id = self.next_texture_id;
        self.next_texture_id += 1;
        self.textures.insert(id, texture);

        Ok(TextureHandle(id))
    }

    fn destroy_texture(&mut self, texture: TextureHandle) {
        if let Some(tex) = self.textures.remove(&texture.0) {
            tex.texture.destroy();
        }
    }

    fn create_mesh(&mut self, data: &MeshData<'_>) -> BackendResult<MeshHandle> {
        let mesh = self.upload_mesh(data)?;
        let id = self.next_mesh_id;
        self.next_mesh_id += 1;
        self.meshes.insert(id, mesh);
        Ok(MeshHandle(id))
    }

    fn destroy_mesh(&mut self, mesh: MeshHandle) {
        self.meshes.remove(&mesh.0);
    }

    fn create_shader(&mut self, desc: &ShaderDescriptor) -> BackendResult<ShaderHandle> {
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let module = self
            .device
            .create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(&desc.label),
                source: wgpu::ShaderSource::Wgsl(desc.source.as_str().into()),
            });
        if let Some(error) = pollster::block_on(self.device.pop_error_scope()) {
            return Err(BackendError::ShaderCreationFailed(format!(
                "{}: {}",
                desc.label, error
            )));
        }

        let uniform_bind_group_layout =
            self.device
                .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                    label: Some(&desc.label),
                    entries: &[wgpu::BindGroupLayoutEntry {
                        binding: 0,
                        visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                        ty: wgpu::BindingType::Buffer {
                            ty: wgpu::BufferBindingType::Uniform,
                            has_dynamic_offset: false,
                            min_binding_size: None,
                        },
                        count: None,
                    }],
                });

        let texture_entries: Vec<wgpu::BindGroupLayoutEntry> = desc
            .textures
            .iter()
            .enumerate()
            .flat_map(|(slot, binding)| {
                let sampler_type = match binding.sample_type {
                    TextureSampleType::Float { filterable: true } => {
                        wgpu::SamplerBindingType::Filtering
                    }
                    _ => wgpu::SamplerBindingType::NonFiltering,
                };
                [
                    wgpu::BindGroupLayoutEntry {
                        binding: 2 * slot as u32,
                        visibility: wgpu::ShaderStages::FRAGMENT,
                        ty: wgpu::BindingType::Texture {
                            sample_type: Self::convert_sample_type(binding.sample_type),
                            view_dimension: wgpu::TextureViewDimension::D2,
                            multisampled: false,
                        },
                        count: None,
                    },
                    wgpu::BindGroupLayoutEntry {
                        binding: 2 * slot as u32 + 1,
                        visibility: wgpu::ShaderStages::FRAGMENT,
                        ty: wgpu::BindingType::Sampler(sampler_type),
                        count: None,
                    },
                ]
            })
            .collect();
        let texture_bind_group_layout =
            self.device
                .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                    label: Some(&desc.label),
                    entries: &texture_entries,
                });

        let pipeline_layout = self
            .device
            .create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some(&desc.label),
                bind_group_layouts: &[&uniform_bind_group_layout, &texture_bind_group_layout],
                push_constant_ranges: &[],
            });

        let uniforms = UniformLayout::new(&desc.uniforms);
        let shader = GpuShader {
            label: desc.label.clone(),
            module,
            uniform_data: vec![0; uniforms.size as usize],
            uniforms,
            textures: desc.textures.clone(),
            bound_textures: vec![None; desc.textures.len()],
            uniform_bind_group_layout,
            texture_bind_group_layout,
            pipeline_layout,
        };

        let id = self.next_shader_id;
        self.next_shader_id += 1;
        self.shaders.insert(id, shader);
        log::debug!("WgpuBackend: compiled shader {}", desc.label);

        Ok(ShaderHandle(id))
    }

    fn destroy_shader(&mut self, shader: ShaderHandle) {
        self.shaders.remove(&shader.0);
        self.pipelines.retain(|key, _| key.shader != shader.0);
    }

    fn begin_render_pass(&mut self, desc: &RenderPassDescriptor) {
        if self.pending_render_pass.is_some() {
            log::warn!("WgpuBackend: previous render pass was never ended");
            self.end_render_pass();
        }

        let color_formats = desc
            .color_attachments
            .iter()
            .filter_map(|att| self.textures.get(&att.texture.0).map(|t| t.format))
            .collect();
        let depth_format = desc
            .depth_stencil_attachment
            .as_ref()
            .and_then(|att| self.textures.get(&att.texture.0).map(|t| t.format));

        // Store the descriptor for later execution
        self.pending_render_pass = Some(PendingRenderPass {
            descriptor: desc.clone(),
            color_formats,
            depth_format,
            commands: Vec::new(),
        });
    }

    fn end_render_pass(&mut self) {
        // Take the pending pass and encoder temporarily
        let Some(pending) = self.pending_render_pass.take() else {
            return;
        };

        let mut encoder = self.encoder.take().unwrap_or_else(|| {
            self.device
                .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                    label: Some("Scene Renderer Encoder"),
                })
        });

        {
            let color_attachments: Vec<Option<wgpu::RenderPassColorAttachment>> = pending
                .descriptor
                .color_attachments
                .iter()
                .filter_map(|att| {
                    let view = &self.textures.get(&att.texture.0)?.view;
                    Some(Some(wgpu::RenderPassColorAttachment {
                        view,
                        resolve_target: None,
                        ops: wgpu::Operations {
                            load: Self::convert_load_op(att.load_op),
                            store: Self::convert_store_op(att.store_op),
                        },
                    }))
                })
                .collect();

            let depth_attachment = pending
                .descriptor
                .depth_stencil_attachment
                .as_ref()
                .and_then(|att| {
                    let view = &self.textures.get(&att.texture.0)?.view;
                    Some(wgpu::RenderPassDepthStencilAttachment {
                        view,
                        depth_ops: Some(wgpu::Operations {
                            load: match att.depth_load_op {
                                LoadOp::Clear(_) => wgpu::LoadOp::Clear(att.depth_clear_value),
                                LoadOp::Load => wgpu::LoadOp::Load,
                            },
                            store: Self::convert_store_op(att.depth_store_op),
                        }),
                        stencil_ops: None,
                    })
                });

            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: pending.descriptor.label.as_deref(),
                color_attachments: &color_attachments,
                depth_stencil_attachment: depth_attachment,
                timestamp_writes: None,
                occlusion_query_set: None,
            });

            // Execute buffered commands
            for command in &pending.commands {
                let Some(pipeline) = self.pipelines.get(&command.pipeline) else {
                    continue;
                };
                render_pass.set_pipeline(pipeline);
                render_pass.set_bind_group(0, &command.uniform_bind_group, &[]);
                render_pass.set_bind_group(1, &command.texture_bind_group, &[]);
                match command.geometry {
                    Geometry::Mesh(id) => {
                        if let Some(mesh) = self.meshes.get(&id) {
                            render_pass.set_vertex_buffer(0, mesh.vertex_buffer.slice(..));
                            render_pass.set_index_buffer(
                                mesh.index_buffer.slice(..),
                                wgpu::IndexFormat::Uint32,
                            );
                            render_pass.draw_indexed(0..mesh.index_count, 0, 0..1);
                        }
                    }
                    Geometry::Fullscreen => render_pass.draw(0..3, 0..1),
                }
            }
            // render_pass is dropped here, ending the pass
        }

        // Put encoder back
        self.encoder = Some(encoder);
    }

    fn set_render_state(&mut self, state: RenderState) {
        self.current_state = state;
    }

    fn use_shader(&mut self, shader: ShaderHandle) {
        self.current_shader = Some(shader);
    }

    fn set_uniform(&mut self, shader: ShaderHandle, name: &str, value: UniformValue) {
        self.set_uniform_element(shader, name, 0, value);
    }

    fn set_uniform_element(
        &mut self,
        shader: ShaderHandle,
        name: &str,
        index: u32,
        value: UniformValue,
    ) {
        if let Some(program) = self.shaders.get_mut(&shader.0) {
            if !program
                .uniforms
                .write(&mut program.uniform_data, name, index, value)
            {
                log::trace!(
                    "WgpuBackend: {} has no uniform slot {}[{}] of type {:?}",
                    program.label,
                    name,
                    index,
                    value.uniform_type()
                );
            }
        }
    }

    fn bind_texture(&mut self, shader: ShaderHandle, name: &str, texture: TextureHandle) {
        if let Some(program) = self.shaders.get_mut(&shader.0) {
            match program.textures.iter().position(|t| t.name == name) {
                Some(slot) => program.bound_textures[slot] = Some(texture),
                None => log::trace!("WgpuBackend: {} has no texture input {}", program.label, name),
            }
        }
    }

    fn unbind_texture(&mut self, shader: ShaderHandle, name: &str) {
        if let Some(program) = self.shaders.get_mut(&shader.0) {
            if let Some(slot) = program.textures.iter().position(|t| t.name == name) {
                program.bound_textures[slot] = None;
            }
        }
    }

    fn set_line_width(&mut self, width: f32) {
        // wgpu rasterizes lines one pixel wide
        log::trace!("WgpuBackend: ignoring line width {}", width);
    }

    fn draw_mesh(&mut self, mesh: MeshHandle) {
        self.record_draw(Geometry::Mesh(mesh.0));
    }

    fn draw_fullscreen(&mut self) {
        self.record_draw(Geometry::Fullscreen);
    }

    fn copy_texture(&mut self, source: TextureHandle, destination: TextureHandle) {
        if self.pending_render_pass.is_some() {
            log::warn!("WgpuBackend: texture copy requested inside a render pass");
            return;
        }
        let (Some(src), Some(dst)) = (
            self.textures.get(&source.0),
            self.textures.get(&destination.0),
        ) else {
            return;
        };
        if src.width != dst.width || src.height != dst.height || src.format != dst.format {
            log::warn!(
                "WgpuBackend: cannot copy {}x{} {:?} into {}x{} {:?}",
                src.width,
                src.height,
                src.format,
                dst.width,
                dst.height,
                dst.format
            );
            return;
        }

        let device = &self.device;
        let encoder = self.encoder.get_or_insert_with(|| {
            device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Scene Renderer Encoder"),
            })
        });
        encoder.copy_texture_to_texture(
            wgpu::ImageCopyTexture {
                texture: &src.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::ImageCopyTexture {
                texture: &dst.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::Extent3d {
                width: src.width,
                height: src.height,
                depth_or_array_layers: 1,
            },
        );
    }

    fn submit(&mut self) {
        if self.pending_render_pass.is_some() {
            self.end_render_pass();
        }
        if let Some(encoder) = self.encoder.take() {
            self.queue.submit(std::iter::once(encoder.finish()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uniform_layout_alignment() {
        let layout = UniformLayout::new(&[
            UniformField::new("u_Exposure", UniformType::Float),
            UniformField::new("u_Color", UniformType::Vec3),
            UniformField::new("u_Flag", UniformType::Int),
            UniformField::array("u_Bones", UniformType::Mat4, 4),
            UniformField::array("u_Splits", UniformType::Float, 4),
        ]);

        assert_eq!(layout.slots["u_Exposure"].offset, 0);
        assert_eq!(layout.slots["u_Color"].offset, 16);
        // vec3 leaves room for a trailing scalar
        assert_eq!(layout.slots["u_Flag"].offset, 28);
        assert_eq!(layout.slots["u_Bones"].offset, 32);
        assert_eq!(layout.slots["u_Splits"].offset, 32 + 4 * 64);
        assert_eq!(layout.slots["u_Splits"].stride, 16);
        assert_eq!(layout.size, 32 + 4 * 64 + 4 * 16);
    }

    #[test]
    fn test_uniform_layout_write() {
        let layout = UniformLayout::new(&[
            UniformField::new("u_Exposure", UniformType::Float),
            UniformField::array("u_Values", UniformType::Int, 3),
        ]);
        let mut data = vec![0u8; layout.size as usize];

        assert!(layout.write(&mut data, "u_Exposure", 0, UniformValue::Float(2.0)));
        assert!(layout.write(&mut data, "u_Values", 2, UniformValue::Int(7)));
        assert_eq!(&data[0..4], &2.0f32.to_le_bytes());
        assert_eq!(&data[16 + 32..16 + 36], &7i32.to_le_bytes());

        // Wrong type, unknown name and out of range index are rejected
        assert!(!layout.write(&mut data, "u_Exposure", 0, UniformValue::Int(1)));
        assert!(!layout.write(&mut data, "u_Missing", 0, UniformValue::Float(1.0)));
        assert!(!layout.write(&mut data, "u_Values", 3, UniformValue::Int(1)));
    }

    #[test]
    fn test_empty_uniform_layout_has_minimum_size() {
        let layout = UniformLayout::new(&[]);
        assert_eq!(layout.size, 16);
    }
}
