//! Scene Renderer - a deferred frame orchestrator over a bevy_ecs scene
//!
//! Each frame runs, in order:
//! - shadow maps for every shadow-casting light (cascaded for directional lights)
//! - a G-buffer pass over models, brushes, sprites, particles and skinned models
//! - SSAO and deferred shading with a procedural or clear-color sky
//! - a debug overlay of lines and physics gizmos
//! - a post-processing chain (bloom, volumetrics, tonemapping, outline, SSR,
//!   depth of field, barrel distortion, vignette)
//!
//! All GPU work goes through [`GraphicsBackend`]. Two backends are provided:
//! - **wgpu**: headless wgpu device
//! - **Recording**: captures every command for inspection without a GPU

pub mod backend;
pub mod error;
pub mod pipeline;
pub mod render_target;
pub mod renderer;
pub mod resources;
pub mod scene;
pub mod shaders;

// Re-export Bevy ECS prelude for users
pub use bevy_ecs::prelude::*;

pub use backend::wgpu_backend::WgpuBackend;
pub use backend::{GraphicsBackend, RecordingBackend};
pub use error::{RenderError, RenderResult};
pub use render_target::RenderTarget;
pub use renderer::{FrameReport, SceneRenderer};

use glam::UVec2;

/// Configuration for a [`SceneRenderer`]
#[derive(Debug, Clone)]
pub struct RendererConfig {
    /// Size of the intermediate targets before the first frame resizes them
    pub default_resolution: UVec2,
    /// Cascades per directional light
    pub cascade_count: usize,
    /// Width and height of every shadow map
    pub shadow_map_size: u32,
    /// Distance from the camera covered by cascades
    pub shadow_distance: f32,
    /// Blend between uniform (0) and logarithmic (1) cascade splits
    pub cascade_split_lambda: f32,
    /// Lights uploaded to the shading pass, nearest first
    pub max_lights: usize,
    /// Spot lights that get a shadow map, nearest first
    pub max_spot_shadows: usize,
    /// Scales pixel-sized effect parameters such as the outline radius
    pub resolution_scale: f32,
    /// Upper bound for bloom downsample levels
    pub bloom_max_iterations: u32,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            default_resolution: UVec2::new(1920, 1080),
            cascade_count: 4,
            shadow_map_size: 2048,
            shadow_distance: 100.0,
            cascade_split_lambda: 0.91,
            max_lights: 32,
            max_spot_shadows: 4,
            resolution_scale: 1.0,
            bloom_max_iterations: 6,
        }
    }
}
