//! Models: meshes paired with materials, optionally skinned

use std::sync::Arc;

use glam::Mat4;

use super::{Material, Mesh};

/// One drawable piece of a model
#[derive(Debug, Clone)]
pub struct MeshInstance {
    pub mesh: Arc<Mesh>,
    /// `None` draws with the default material
    pub material: Option<Arc<Material>>,
}

impl MeshInstance {
    pub fn new(mesh: Arc<Mesh>, material: Arc<Material>) -> Self {
        Self {
            mesh,
            material: Some(material),
        }
    }

    pub fn untextured(mesh: Arc<Mesh>) -> Self {
        Self {
            mesh,
            material: None,
        }
    }

    pub fn is_transparent(&self) -> bool {
        self.material.as_ref().is_some_and(|m| m.transparent)
    }
}

/// A static model
#[derive(Debug, Clone, Default)]
pub struct Model {
    pub name: String,
    pub meshes: Vec<MeshInstance>,
}

impl Model {
    pub fn new(name: &str, meshes: Vec<MeshInstance>) -> Self {
        Self {
            name: name.to_string(),
            meshes,
        }
    }
}

/// A bone of a skeleton.
///
/// `id` is the bone's slot in the skinned shader's bone matrix array. The tree is
/// acyclic by construction.
#[derive(Debug, Clone)]
pub struct SkeletonNode {
    pub name: String,
    pub id: u32,
    pub final_transform: Mat4,
    pub children: Vec<SkeletonNode>,
}

impl SkeletonNode {
    pub fn new(name: &str, id: u32, final_transform: Mat4) -> Self {
        Self {
            name: name.to_string(),
            id,
            final_transform,
            children: Vec::new(),
        }
    }

    pub fn with_child(mut self, child: SkeletonNode) -> Self {
        self.children.push(child);
        self
    }

    /// Number of nodes below this one
    pub fn descendant_count(&self) -> usize {
        self.children
            .iter()
            .map(|c| 1 + c.descendant_count())
            .sum()
    }
}

/// A model deformed by a skeleton
#[derive(Debug, Clone)]
pub struct SkinnedModel {
    pub name: String,
    pub meshes: Vec<MeshInstance>,
    pub skeleton: SkeletonNode,
}

impl SkinnedModel {
    pub fn new(name: &str, meshes: Vec<MeshInstance>, skeleton: SkeletonNode) -> Self {
        Self {
            name: name.to_string(),
            meshes,
            skeleton,
        }
    }
}
