//! Deferred rendering pipeline
//!
//! The passes of one frame, in execution order:
//! 1. Shadow pass - depth from every shadow-casting light
//! 2. G-Buffer pass - geometry into multiple render targets
//! 3. Display depth - viewable copy of the depth buffer
//! 4. SSAO - occlusion, or plain white when inactive
//! 5. Shading pass - sky plus fullscreen deferred lighting
//! 6. Debug overlay - lines and gizmos over the shaded image
//! 7. Post-processing - bloom, volumetrics, tonemapping, outline, SSR, DOF,
//!    barrel distortion, vignette

pub mod billboard;
pub mod cascades;
pub mod context;
pub mod debug_overlay;
pub mod display_depth;
pub mod gbuffer_pass;
pub mod light_ordering;
pub mod postprocess;
pub mod shading_pass;
pub mod shadow_pass;
pub mod skeleton;

pub use context::{entity_id, Gpu, RenderContext, NO_ENTITY};
pub use debug_overlay::{DebugLine, DebugOverlay, DebugShape, PhysicsShape};
pub use display_depth::DisplayDepthPass;
pub use gbuffer_pass::{GBufferPass, TemporaryModel};
pub use light_ordering::{collect_lights, OrderedLight};
pub use postprocess::{ActiveEffects, ChainInputs, PostProcessChain};
pub use shading_pass::ShadingPass;
pub use shadow_pass::{ShadowMap, ShadowPass};
pub use skeleton::{propagate_bones, PropagationStats, MAX_BONES};
