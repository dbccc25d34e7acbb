//! Bone matrix upload for skinned draws

use crate::backend::{GraphicsBackend, ShaderHandle};
use crate::resources::SkeletonNode;
use crate::scene::NameIndex;

/// Capacity of the skinned shaders' bone matrix array
pub const MAX_BONES: u32 = 100;

pub const BONE_MATRICES_UNIFORM: &str = "u_FinalBonesMatrice";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PropagationStats {
    /// Non-root nodes walked
    pub visited: usize,
    /// Bone slots written
    pub written: usize,
}

/// Write the final transform of every bone below `root` into its slot.
///
/// Bones whose name has no entity in the scene are still walked, so their
/// children get written, but their own slot keeps its previous value. The root
/// itself is never written.
pub fn propagate_bones<B: GraphicsBackend + ?Sized>(
    backend: &mut B,
    shader: ShaderHandle,
    root: &SkeletonNode,
    names: &NameIndex,
) -> PropagationStats {
    let mut stats = PropagationStats::default();
    for child in &root.children {
        propagate_node(backend, shader, child, names, &mut stats);
    }
    stats
}

fn propagate_node<B: GraphicsBackend + ?Sized>(
    backend: &mut B,
    shader: ShaderHandle,
    node: &SkeletonNode,
    names: &NameIndex,
    stats: &mut PropagationStats,
) {
    stats.visited += 1;

    if names.contains(&node.name) {
        if node.id < MAX_BONES {
            backend.set_uniform_element(
                shader,
                BONE_MATRICES_UNIFORM,
                node.id,
                node.final_transform.into(),
            );
            stats.written += 1;
        } else {
            log::warn!(
                "Bone '{}' has slot {} beyond the {} supported bones",
                node.name,
                node.id,
                MAX_BONES
            );
        }
    }

    for child in &node.children {
        propagate_node(backend, shader, child, names, stats);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{RecordingBackend, ShaderDescriptor};
    use crate::scene::{Name, Scene};
    use glam::{Mat4, Vec3};

    fn bone(name: &str, id: u32) -> SkeletonNode {
        SkeletonNode::new(name, id, Mat4::from_translation(Vec3::splat(id as f32)))
    }

    #[test]
    fn test_propagation_skips_root_and_unresolved_names() {
        let mut scene = Scene::new();
        scene.world.spawn(Name::new("spine"));
        scene.world.spawn(Name::new("hand"));
        let names = scene.name_index();

        let skeleton = bone("root", 0).with_child(
            bone("spine", 1).with_child(bone("missing", 2).with_child(bone("hand", 3))),
        );

        let mut backend = RecordingBackend::new();
        let shader = backend
            .create_shader(&ShaderDescriptor::new("skinned", ""))
            .unwrap();

        let stats = propagate_bones(&mut backend, shader, &skeleton, &names);
        assert_eq!(stats.visited, 3);
        assert_eq!(stats.written, 2);

        assert!(backend
            .uniform_element(shader, BONE_MATRICES_UNIFORM, 0)
            .is_none());
        assert!(backend
            .uniform_element(shader, BONE_MATRICES_UNIFORM, 2)
            .is_none());
        assert_eq!(
            backend
                .uniform_element(shader, BONE_MATRICES_UNIFORM, 3)
                .and_then(|v| v.as_mat4()),
            Some(Mat4::from_translation(Vec3::splat(3.0)))
        );
    }

    #[test]
    fn test_out_of_range_slot_is_skipped() {
        let mut scene = Scene::new();
        scene.world.spawn(Name::new("tail"));
        let names = scene.name_index();

        let skeleton = bone("root", 0).with_child(bone("tail", MAX_BONES));
        let mut backend = RecordingBackend::new();
        let shader = backend
            .create_shader(&ShaderDescriptor::new("skinned", ""))
            .unwrap();

        let stats = propagate_bones(&mut backend, shader, &skeleton, &names);
        assert_eq!(stats.visited, 1);
        assert_eq!(stats.written, 0);
    }
}
