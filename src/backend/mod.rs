//! Backend abstraction layer
//!
//! Provides the [`GraphicsBackend`] trait plus two implementations: a headless wgpu
//! backend and a recording backend that captures commands without touching a GPU.

pub mod recording;
pub mod traits;
pub mod types;
pub mod wgpu_backend;

pub use recording::{Command, RecordedPass, RecordingBackend};
pub use traits::*;
pub use types::*;
