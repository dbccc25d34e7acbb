//! Off-screen render targets with deferred resize.
//!
//! A [`RenderTarget`] owns a fixed, ordered set of attachments. Only its size may
//! change, and only lazily: [`RenderTarget::queue_resize`] records the wanted size
//! and the next [`RenderTarget::bind`] recreates every attachment before anything is
//! drawn into it. This avoids reallocating textures while another pass of the same
//! frame may still sample them.

use glam::UVec2;

use crate::backend::{
    BackendResult, ColorAttachment, DepthStencilAttachment, FilterMode, GraphicsBackend, LoadOp,
    RenderPassDescriptor, StoreOp, TextureDescriptor, TextureFormat, TextureHandle, TextureUsage,
};
use crate::error::{RenderError, RenderResult};

/// What an attachment stores
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttachmentRole {
    Depth,
    Albedo,
    Normal,
    Material,
    EntityId,
    Emissive,
    Color,
}

/// One attachment of a render target
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AttachmentDesc {
    pub role: AttachmentRole,
    pub format: TextureFormat,
    pub filter: FilterMode,
}

impl AttachmentDesc {
    pub fn new(role: AttachmentRole, format: TextureFormat) -> Self {
        let filter = if format.is_depth() || format.is_integer() {
            FilterMode::Nearest
        } else {
            FilterMode::Linear
        };
        Self {
            role,
            format,
            filter,
        }
    }

    pub fn color(format: TextureFormat) -> Self {
        Self::new(AttachmentRole::Color, format)
    }

    pub fn depth() -> Self {
        Self::new(AttachmentRole::Depth, TextureFormat::Depth32Float)
    }

    #[must_use]
    pub fn with_filter(mut self, filter: FilterMode) -> Self {
        self.filter = filter;
        self
    }
}

/// How a bind treats the previous contents of the target
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LoadAction {
    /// Reset colors to the target clear color, depth to 1 and entity ids to 0
    Clear,
    /// Like `Clear` with an explicit color
    ClearWith([f32; 4]),
    /// Keep what is there
    Load,
}

/// A named off-screen framebuffer
#[derive(Debug, Clone)]
pub struct RenderTarget {
    label: String,
    size: UVec2,
    pending_size: Option<UVec2>,
    attachments: Vec<AttachmentDesc>,
    /// Parallel to `attachments`, empty until first created
    textures: Vec<TextureHandle>,
    clear_color: [f32; 4],
    resize_count: u32,
}

impl RenderTarget {
    pub fn new(label: &str, size: UVec2, attachments: Vec<AttachmentDesc>) -> Self {
        Self {
            label: label.to_string(),
            size: size.max(UVec2::ONE),
            pending_size: None,
            attachments,
            textures: Vec::new(),
            clear_color: [0.0, 0.0, 0.0, 1.0],
            resize_count: 0,
        }
    }

    /// A target with a single color attachment
    pub fn color(label: &str, size: UVec2, format: TextureFormat) -> Self {
        Self::new(label, size, vec![AttachmentDesc::color(format)])
    }

    #[must_use]
    pub fn with_clear_color(mut self, clear_color: [f32; 4]) -> Self {
        self.clear_color = clear_color;
        self
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Size of the attachments as currently allocated
    pub fn size(&self) -> UVec2 {
        self.size
    }

    pub fn pending_size(&self) -> Option<UVec2> {
        self.pending_size
    }

    /// Size the target will have once bound
    pub fn effective_size(&self) -> UVec2 {
        self.pending_size.unwrap_or(self.size)
    }

    /// How many queued resizes have been applied
    pub fn resize_count(&self) -> u32 {
        self.resize_count
    }

    pub fn is_created(&self) -> bool {
        !self.textures.is_empty()
    }

    pub fn attachments(&self) -> &[AttachmentDesc] {
        &self.attachments
    }

    /// Request a new size, applied at the next bind. Requesting the current size
    /// cancels any earlier request.
    pub fn queue_resize(&mut self, size: UVec2) {
        let size = size.max(UVec2::ONE);
        if size == self.size {
            self.pending_size = None;
        } else if self.pending_size != Some(size) {
            log::debug!(
                "{}: resize queued {}x{} -> {}x{}",
                self.label,
                self.size.x,
                self.size.y,
                size.x,
                size.y
            );
            self.pending_size = Some(size);
        }
    }

    pub fn texture(&self, role: AttachmentRole) -> Option<TextureHandle> {
        self.attachments
            .iter()
            .position(|a| a.role == role)
            .and_then(|index| self.textures.get(index).copied())
    }

    /// First non-depth attachment
    pub fn color_texture(&self) -> Option<TextureHandle> {
        self.attachments
            .iter()
            .position(|a| !a.format.is_depth())
            .and_then(|index| self.textures.get(index).copied())
    }

    pub fn depth_texture(&self) -> Option<TextureHandle> {
        self.texture(AttachmentRole::Depth)
    }

    /// Allocate the attachments, applying a pending resize first.
    pub fn prepare<B: GraphicsBackend + ?Sized>(&mut self, backend: &mut B) -> BackendResult<()> {
        if let Some(size) = self.pending_size.take() {
            self.release(backend);
            self.size = size;
            self.resize_count += 1;
        }
        if self.is_created() {
            return Ok(());
        }

        let mut textures = Vec::with_capacity(self.attachments.len());
        for attachment in &self.attachments {
            let desc = TextureDescriptor {
                label: Some(format!("{} {:?}", self.label, attachment.role)),
                width: self.size.x,
                height: self.size.y,
                format: attachment.format,
                usage: TextureUsage::RENDER_TARGET,
                filter: attachment.filter,
            };
            match backend.create_texture(&desc) {
                Ok(texture) => textures.push(texture),
                Err(e) => {
                    for texture in textures {
                        backend.destroy_texture(texture);
                    }
                    return Err(e);
                }
            }
        }
        self.textures = textures;
        Ok(())
    }

    /// Begin a render pass writing every attachment of this target.
    pub fn bind<B: GraphicsBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        load: LoadAction,
    ) -> BackendResult<()> {
        self.prepare(backend)?;

        let clear_color = match load {
            LoadAction::ClearWith(color) => color,
            _ => self.clear_color,
        };
        let mut color_attachments = Vec::new();
        let mut depth_stencil_attachment = None;
        for (attachment, texture) in self.attachments.iter().zip(&self.textures) {
            if attachment.format.is_depth() {
                depth_stencil_attachment = Some(DepthStencilAttachment {
                    texture: *texture,
                    depth_load_op: match load {
                        LoadAction::Load => LoadOp::Load,
                        _ => LoadOp::Clear([1.0; 4]),
                    },
                    depth_store_op: StoreOp::Store,
                    depth_clear_value: 1.0,
                });
                continue;
            }
            let load_op = match (load, attachment.role) {
                (LoadAction::Load, _) => LoadOp::Load,
                (_, AttachmentRole::EntityId) => LoadOp::Clear([0.0; 4]),
                _ => LoadOp::Clear(clear_color),
            };
            color_attachments.push(ColorAttachment {
                texture: *texture,
                load_op,
                store_op: StoreOp::Store,
            });
        }

        backend.begin_render_pass(&RenderPassDescriptor {
            label: Some(self.label.clone()),
            color_attachments,
            depth_stencil_attachment,
        });
        Ok(())
    }

    pub fn unbind<B: GraphicsBackend + ?Sized>(&self, backend: &mut B) {
        backend.end_render_pass();
    }

    /// Bind, clear and unbind
    pub fn clear<B: GraphicsBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        color: Option<[f32; 4]>,
    ) -> BackendResult<()> {
        let load = match color {
            Some(color) => LoadAction::ClearWith(color),
            None => LoadAction::Clear,
        };
        self.bind(backend, load)?;
        self.unbind(backend);
        Ok(())
    }

    /// Destroy the attachments. The next bind recreates them.
    pub fn release<B: GraphicsBackend + ?Sized>(&mut self, backend: &mut B) {
        for texture in self.textures.drain(..) {
            backend.destroy_texture(texture);
        }
    }
}

/// Handle to a target owned by a [`RenderTargetPool`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TargetId(usize);

/// Owns every off-screen target the renderer draws into
#[derive(Debug, Default)]
pub struct RenderTargetPool {
    targets: Vec<Option<RenderTarget>>,
}

impl RenderTargetPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, target: RenderTarget) -> TargetId {
        if let Some(index) = self.targets.iter().position(Option::is_none) {
            self.targets[index] = Some(target);
            return TargetId(index);
        }
        self.targets.push(Some(target));
        TargetId(self.targets.len() - 1)
    }

    pub fn get(&self, id: TargetId) -> Option<&RenderTarget> {
        self.targets.get(id.0).and_then(Option::as_ref)
    }

    pub fn get_mut(&mut self, id: TargetId) -> Option<&mut RenderTarget> {
        self.targets.get_mut(id.0).and_then(Option::as_mut)
    }

    /// Like [`Self::get_mut`] but reports a missing target as an error
    pub fn target_mut(&mut self, id: TargetId) -> RenderResult<&mut RenderTarget> {
        self.get_mut(id)
            .ok_or_else(|| RenderError::MissingTarget(format!("{:?}", id)))
    }

    pub fn find(&self, label: &str) -> Option<TargetId> {
        self.targets
            .iter()
            .position(|t| t.as_ref().is_some_and(|t| t.label() == label))
            .map(TargetId)
    }

    pub fn queue_resize(&mut self, id: TargetId, size: UVec2) {
        if let Some(target) = self.get_mut(id) {
            target.queue_resize(size);
        }
    }

    pub fn texture(&self, id: TargetId, role: AttachmentRole) -> Option<TextureHandle> {
        self.get(id).and_then(|t| t.texture(role))
    }

    pub fn color_texture(&self, id: TargetId) -> Option<TextureHandle> {
        self.get(id).and_then(RenderTarget::color_texture)
    }

    /// Remove a target and destroy its attachments
    pub fn remove<B: GraphicsBackend + ?Sized>(&mut self, id: TargetId, backend: &mut B) {
        if let Some(mut target) = self.targets.get_mut(id.0).and_then(Option::take) {
            target.release(backend);
        }
    }

    pub fn len(&self) -> usize {
        self.targets.iter().filter(|t| t.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn release_all<B: GraphicsBackend + ?Sized>(&mut self, backend: &mut B) {
        for target in self.targets.iter_mut().flatten() {
            target.release(backend);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{Command, RecordingBackend};

    fn created_textures(backend: &RecordingBackend) -> usize {
        backend
            .commands()
            .iter()
            .filter(|c| matches!(c, Command::CreateTexture { .. }))
            .count()
    }

    fn gbuffer_like() -> RenderTarget {
        RenderTarget::new(
            "GBuffer",
            UVec2::new(64, 32),
            vec![
                AttachmentDesc::depth(),
                AttachmentDesc::new(AttachmentRole::Albedo, TextureFormat::Rgba8Unorm),
                AttachmentDesc::new(AttachmentRole::EntityId, TextureFormat::R32Sint),
            ],
        )
    }

    #[test]
    fn test_lazy_creation_on_first_bind() {
        let mut backend = RecordingBackend::new();
        let mut target = gbuffer_like();
        assert!(!target.is_created());

        target.bind(&mut backend, LoadAction::Clear).unwrap();
        target.unbind(&mut backend);

        assert!(target.is_created());
        assert_eq!(created_textures(&backend), 3);
        assert!(target.depth_texture().is_some());
        assert_eq!(target.color_texture(), target.texture(AttachmentRole::Albedo));
    }

    #[test]
    fn test_resize_applied_once_at_next_bind() {
        let mut backend = RecordingBackend::new();
        let mut target = gbuffer_like();
        target.prepare(&mut backend).unwrap();
        let before = target.texture(AttachmentRole::Albedo);

        target.queue_resize(UVec2::new(128, 64));
        target.queue_resize(UVec2::new(128, 64));
        assert_eq!(target.size(), UVec2::new(64, 32));
        assert_eq!(target.effective_size(), UVec2::new(128, 64));

        target.bind(&mut backend, LoadAction::Clear).unwrap();
        target.unbind(&mut backend);
        target.bind(&mut backend, LoadAction::Load).unwrap();
        target.unbind(&mut backend);

        assert_eq!(target.size(), UVec2::new(128, 64));
        assert_eq!(target.resize_count(), 1);
        assert_eq!(created_textures(&backend), 6);
        assert_ne!(target.texture(AttachmentRole::Albedo), before);
        assert_eq!(backend.live_texture_count(), 3);
    }

    #[test]
    fn test_resize_to_current_size_is_noop() {
        let mut backend = RecordingBackend::new();
        let mut target = gbuffer_like();
        target.prepare(&mut backend).unwrap();

        target.queue_resize(UVec2::new(64, 32));
        assert_eq!(target.pending_size(), None);
        target.bind(&mut backend, LoadAction::Clear).unwrap();
        target.unbind(&mut backend);

        assert_eq!(target.resize_count(), 0);
        assert_eq!(created_textures(&backend), 3);
    }

    #[test]
    fn test_later_request_supersedes_pending_one() {
        let mut target = gbuffer_like();
        target.queue_resize(UVec2::new(10, 10));
        target.queue_resize(UVec2::new(64, 32));
        assert_eq!(target.pending_size(), None);
    }

    #[test]
    fn test_clear_resets_entity_ids_to_zero() {
        let mut backend = RecordingBackend::new();
        let mut target = gbuffer_like().with_clear_color([0.2, 0.3, 0.4, 1.0]);
        target.clear(&mut backend, None).unwrap();

        let pass = &backend.passes()[0];
        let loads: Vec<LoadOp> = pass
            .descriptor
            .color_attachments
            .iter()
            .map(|a| a.load_op)
            .collect();
        assert_eq!(
            loads,
            vec![LoadOp::Clear([0.2, 0.3, 0.4, 1.0]), LoadOp::Clear([0.0; 4])]
        );
        let depth = pass.descriptor.depth_stencil_attachment.as_ref().unwrap();
        assert_eq!(depth.depth_clear_value, 1.0);
    }

    #[test]
    fn test_pool_reuses_removed_slots() {
        let mut backend = RecordingBackend::new();
        let mut pool = RenderTargetPool::new();
        let a = pool.insert(RenderTarget::color("A", UVec2::ONE, TextureFormat::Rgba8Unorm));
        let b = pool.insert(RenderTarget::color("B", UVec2::ONE, TextureFormat::Rgba8Unorm));
        pool.target_mut(a).unwrap().prepare(&mut backend).unwrap();

        pool.remove(a, &mut backend);
        assert!(pool.get(a).is_none());
        assert_eq!(backend.live_texture_count(), 0);
        assert_eq!(pool.find("B"), Some(b));

        let c = pool.insert(RenderTarget::color("C", UVec2::ONE, TextureFormat::Rgba8Unorm));
        assert_eq!(c, a);
        assert_eq!(pool.len(), 2);
    }
}
