//! Shader lookup by logical name
//!
//! Passes never hold shader handles across frames. They ask a [`ShaderResolver`]
//! for the program registered under a stable logical name (see [`names`]) every
//! time they run, so a shader that shows up later is picked up automatically.

mod builtin;

use std::collections::{HashMap, HashSet};

use crate::backend::{BackendResult, GraphicsBackend, ShaderDescriptor, ShaderHandle};

pub use builtin::{builtin_shaders, FULLSCREEN_VERTEX_SHADER};

/// Logical shader names used by the renderer
pub mod names {
    pub const SHADOW_MAP: &str = "shadow_map";
    pub const SHADOW_MAP_SKINNED: &str = "shadow_map_skinned";
    pub const GBUFFER: &str = "gbuffer";
    pub const GBUFFER_SKINNED: &str = "gbuffer_skinned";
    pub const DEFERRED: &str = "deferred";
    pub const SKY_PROCEDURAL: &str = "sky_procedural";
    pub const DISPLAY_DEPTH: &str = "display_depth";
    pub const DEBUG_LINE: &str = "debug_line";
    pub const LINE_GIZMO: &str = "line_gizmo";
    pub const COPY: &str = "copy";
    pub const ADD: &str = "add";
    pub const COMBINE: &str = "combine";
    pub const TONEMAP: &str = "tonemap";
    pub const OUTLINE: &str = "outline";
    pub const SSAO: &str = "ssao";
    pub const SSAO_BLUR: &str = "ssao_blur";
    pub const BLOOM_THRESHOLD: &str = "bloom_threshold";
    pub const BLOOM_DOWNSAMPLE: &str = "bloom_downsample";
    pub const BLOOM_UPSAMPLE: &str = "bloom_upsample";
    pub const VOLUMETRIC: &str = "volumetric";
    pub const SSR: &str = "ssr";
    pub const DOF: &str = "dof";
    pub const BARREL_DISTORTION: &str = "barrel_distortion";
    pub const VIGNETTE: &str = "vignette";

    pub const ALL: &[&str] = &[
        SHADOW_MAP,
        SHADOW_MAP_SKINNED,
        GBUFFER,
        GBUFFER_SKINNED,
        DEFERRED,
        SKY_PROCEDURAL,
        DISPLAY_DEPTH,
        DEBUG_LINE,
        LINE_GIZMO,
        COPY,
        ADD,
        COMBINE,
        TONEMAP,
        OUTLINE,
        SSAO,
        SSAO_BLUR,
        BLOOM_THRESHOLD,
        BLOOM_DOWNSAMPLE,
        BLOOM_UPSAMPLE,
        VOLUMETRIC,
        SSR,
        DOF,
        BARREL_DISTORTION,
        VIGNETTE,
    ];
}

/// Maps a logical shader name to a compiled program
pub trait ShaderResolver {
    fn resolve(&self, name: &str) -> Option<ShaderHandle>;
}

/// Name to handle table filled by the application
#[derive(Debug, Default, Clone)]
pub struct ShaderRegistry {
    shaders: HashMap<String, ShaderHandle>,
}

impl ShaderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a compiled program. Replaces any previous program with that name.
    pub fn register(&mut self, name: &str, shader: ShaderHandle) -> Option<ShaderHandle> {
        self.shaders.insert(name.to_string(), shader)
    }

    pub fn unregister(&mut self, name: &str) -> Option<ShaderHandle> {
        self.shaders.remove(name)
    }

    /// Compile `desc` and register it under `name`
    pub fn compile<B: GraphicsBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        name: &str,
        desc: &ShaderDescriptor,
    ) -> BackendResult<ShaderHandle> {
        let shader = backend.create_shader(desc)?;
        if let Some(old) = self.register(name, shader) {
            backend.destroy_shader(old);
        }
        Ok(shader)
    }

    /// Compile every shader shipped with the crate.
    ///
    /// A shader that fails to compile is logged and left unregistered.
    pub fn register_builtin<B: GraphicsBackend + ?Sized>(&mut self, backend: &mut B) -> usize {
        let mut count = 0;
        for (name, desc) in builtin_shaders() {
            match self.compile(backend, name, &desc) {
                Ok(_) => count += 1,
                Err(e) => log::warn!("Built-in shader '{}' failed to compile: {}", name, e),
            }
        }
        log::info!("Registered {} built-in shaders", count);
        count
    }

    /// Register source-less programs under `names`.
    ///
    /// Backends that do not compile source, such as the recording backend, accept
    /// these as stand-ins for shaders that live with the application's assets.
    pub fn register_placeholders<B: GraphicsBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        names: &[&str],
    ) -> BackendResult<()> {
        for name in names {
            if self.shaders.contains_key(*name) {
                continue;
            }
            self.compile(backend, name, &ShaderDescriptor::new(name, ""))?;
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.shaders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shaders.is_empty()
    }

    pub fn release<B: GraphicsBackend + ?Sized>(&mut self, backend: &mut B) {
        for (_, shader) in self.shaders.drain() {
            backend.destroy_shader(shader);
        }
    }
}

impl ShaderResolver for ShaderRegistry {
    fn resolve(&self, name: &str) -> Option<ShaderHandle> {
        self.shaders.get(name).copied()
    }
}

/// Remembers which names already failed so each one is reported only once
#[derive(Debug, Default)]
pub struct ShaderCache {
    missing: HashSet<String>,
}

impl ShaderCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn resolve(&mut self, resolver: &dyn ShaderResolver, name: &str) -> Option<ShaderHandle> {
        match resolver.resolve(name) {
            Some(shader) => {
                if self.missing.remove(name) {
                    log::info!("Shader '{}' is now available", name);
                }
                Some(shader)
            }
            None => {
                if self.missing.insert(name.to_string()) {
                    log::warn!("Shader '{}' is not available, skipping its draws", name);
                }
                None
            }
        }
    }

    pub fn is_missing(&self, name: &str) -> bool {
        self.missing.contains(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{Command, RecordingBackend};

    #[test]
    fn test_registry_replaces_and_destroys_old_program() {
        let mut backend = RecordingBackend::new();
        let mut registry = ShaderRegistry::new();

        let first = registry
            .compile(&mut backend, names::COPY, &ShaderDescriptor::new("copy", ""))
            .unwrap();
        let second = registry
            .compile(&mut backend, names::COPY, &ShaderDescriptor::new("copy", ""))
            .unwrap();

        assert_ne!(first, second);
        assert_eq!(registry.resolve(names::COPY), Some(second));
        assert!(backend
            .commands()
            .contains(&Command::DestroyShader(first)));
    }

    #[test]
    fn test_placeholders_keep_existing_programs() {
        let mut backend = RecordingBackend::new();
        let mut registry = ShaderRegistry::new();
        registry.register_builtin(&mut backend);
        let copy = registry.resolve(names::COPY);

        registry
            .register_placeholders(&mut backend, names::ALL)
            .unwrap();

        assert_eq!(registry.resolve(names::COPY), copy);
        assert_eq!(registry.len(), names::ALL.len());
        for name in names::ALL {
            assert!(registry.resolve(name).is_some(), "{} unresolved", name);
        }
    }

    #[test]
    fn test_cache_reports_missing_once_and_recovers() {
        let mut registry = ShaderRegistry::new();
        let mut cache = ShaderCache::new();

        assert!(cache.resolve(&registry, names::SSR).is_none());
        assert!(cache.resolve(&registry, names::SSR).is_none());
        assert!(cache.is_missing(names::SSR));

        let mut backend = RecordingBackend::new();
        registry
            .register_placeholders(&mut backend, &[names::SSR])
            .unwrap();
        assert!(cache.resolve(&registry, names::SSR).is_some());
        assert!(!cache.is_missing(names::SSR));
    }
}
