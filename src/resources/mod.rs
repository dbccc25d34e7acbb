//! Resource management
//!
//! Meshes, materials and models referenced by scene components, plus the cache
//! of their GPU uploads.

mod material;
mod mesh;
mod model;

pub use material::*;
pub use mesh::*;
pub use model::*;
