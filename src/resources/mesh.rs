//! Mesh data, procedural meshes and GPU upload cache

use std::collections::HashMap;
use std::f32::consts::{PI, TAU};
use std::sync::atomic::{AtomicU64, Ordering};

use glam::{Vec2, Vec3};

use crate::backend::{GraphicsBackend, MeshData, MeshHandle, PrimitiveTopology, Vertex};

static NEXT_MESH_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of a [`Mesh`], used to find its GPU upload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MeshId(u64);

impl MeshId {
    fn next() -> Self {
        Self(NEXT_MESH_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// A mesh with vertex and index data
#[derive(Debug, Clone)]
pub struct Mesh {
    id: MeshId,
    pub name: String,
    pub vertices: Vec<Vertex>,
    pub indices: Vec<u32>,
    pub topology: PrimitiveTopology,
}

impl Mesh {
    pub fn new(name: &str, topology: PrimitiveTopology) -> Self {
        Self {
            id: MeshId::next(),
            name: name.to_string(),
            vertices: Vec::new(),
            indices: Vec::new(),
            topology,
        }
    }

    pub fn id(&self) -> MeshId {
        self.id
    }

    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    pub fn index_count(&self) -> usize {
        self.indices.len()
    }

    pub fn data(&self) -> MeshData<'_> {
        MeshData {
            label: &self.name,
            vertices: &self.vertices,
            indices: &self.indices,
            topology: self.topology,
        }
    }

    fn push_line(&mut self, a: Vec3, b: Vec3) {
        let base = self.vertices.len() as u32;
        self.vertices.push(Vertex::at(a));
        self.vertices.push(Vertex::at(b));
        self.indices.extend_from_slice(&[base, base + 1]);
    }

    /// Line segments approximating an arc. `point` maps an angle to a position.
    fn push_arc(&mut self, from: f32, to: f32, segments: u32, point: impl Fn(f32) -> Vec3) {
        let step = (to - from) / segments as f32;
        for i in 0..segments {
            let a = from + step * i as f32;
            self.push_line(point(a), point(a + step));
        }
    }

    /// Unit quad in the XY plane facing +Z, used by sprites and particles
    pub fn quad() -> Self {
        let mut mesh = Mesh::new("quad", PrimitiveTopology::TriangleList);
        let corners = [
            (Vec3::new(-0.5, -0.5, 0.0), Vec2::new(0.0, 1.0)),
            (Vec3::new(0.5, -0.5, 0.0), Vec2::new(1.0, 1.0)),
            (Vec3::new(0.5, 0.5, 0.0), Vec2::new(1.0, 0.0)),
            (Vec3::new(-0.5, 0.5, 0.0), Vec2::new(0.0, 0.0)),
        ];
        for (position, uv) in corners {
            mesh.vertices.push(Vertex::new(position, Vec3::Z, uv));
        }
        mesh.indices.extend_from_slice(&[0, 1, 2, 0, 2, 3]);
        mesh
    }

    /// Two-point line from the origin to (1, 1, 1). The debug line shader places
    /// the endpoints itself.
    pub fn line() -> Self {
        let mut mesh = Mesh::new("debug line", PrimitiveTopology::LineList);
        mesh.push_line(Vec3::ZERO, Vec3::ONE);
        mesh
    }

    /// Unit cube centered at origin
    pub fn cube() -> Self {
        let mut mesh = Mesh::new("cube", PrimitiveTopology::TriangleList);

        let faces = [
            (Vec3::Z, Vec3::X, Vec3::Y),
            (-Vec3::Z, -Vec3::X, Vec3::Y),
            (Vec3::X, -Vec3::Z, Vec3::Y),
            (-Vec3::X, Vec3::Z, Vec3::Y),
            (Vec3::Y, Vec3::X, -Vec3::Z),
            (-Vec3::Y, Vec3::X, Vec3::Z),
        ];
        for (normal, right, up) in faces {
            let base = mesh.vertices.len() as u32;
            let center = normal * 0.5;
            let corners = [
                (-right - up, Vec2::new(0.0, 1.0)),
                (right - up, Vec2::new(1.0, 1.0)),
                (right + up, Vec2::new(1.0, 0.0)),
                (-right + up, Vec2::new(0.0, 0.0)),
            ];
            for (offset, uv) in corners {
                let mut vertex = Vertex::new(center + offset * 0.5, normal, uv);
                vertex.tangent = right.extend(1.0);
                mesh.vertices.push(vertex);
            }
            mesh.indices
                .extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
        }

        mesh
    }

    /// Wireframe cube spanning -1..1, scaled by half extents when drawn
    pub fn box_gizmo() -> Self {
        let mut mesh = Mesh::new("box gizmo", PrimitiveTopology::LineList);
        let corner = |i: u32| {
            Vec3::new(
                if i & 1 == 0 { -1.0 } else { 1.0 },
                if i & 2 == 0 { -1.0 } else { 1.0 },
                if i & 4 == 0 { -1.0 } else { 1.0 },
            )
        };
        for a in 0..8u32 {
            for axis in [1u32, 2, 4] {
                if a & axis == 0 {
                    mesh.push_line(corner(a), corner(a | axis));
                }
            }
        }
        mesh
    }

    /// Three unit circles, one per axis plane
    pub fn sphere_gizmo() -> Self {
        const SEGMENTS: u32 = 32;
        let mut mesh = Mesh::new("sphere gizmo", PrimitiveTopology::LineList);
        mesh.push_arc(0.0, TAU, SEGMENTS, |a| Vec3::new(a.cos(), a.sin(), 0.0));
        mesh.push_arc(0.0, TAU, SEGMENTS, |a| Vec3::new(a.cos(), 0.0, a.sin()));
        mesh.push_arc(0.0, TAU, SEGMENTS, |a| Vec3::new(0.0, a.cos(), a.sin()));
        mesh
    }

    /// Capsule along Y. `height` is the length of the cylindrical section.
    pub fn capsule_gizmo(radius: f32, height: f32) -> Self {
        const SEGMENTS: u32 = 32;
        let mut mesh = Mesh::new("capsule gizmo", PrimitiveTopology::LineList);
        let half = height * 0.5;

        for y in [-half, half] {
            mesh.push_arc(0.0, TAU, SEGMENTS, |a| {
                Vec3::new(a.cos() * radius, y, a.sin() * radius)
            });
        }
        for a in [0.0, PI * 0.5, PI, PI * 1.5] {
            let offset = Vec3::new(a.cos() * radius, 0.0, a.sin() * radius);
            mesh.push_line(offset + Vec3::Y * -half, offset + Vec3::Y * half);
        }
        // Caps: half circles in the XY and ZY planes
        let cap = SEGMENTS / 2;
        mesh.push_arc(0.0, PI, cap, |a| Vec3::new(a.cos() * radius, half + a.sin() * radius, 0.0));
        mesh.push_arc(0.0, PI, cap, |a| Vec3::new(0.0, half + a.sin() * radius, a.cos() * radius));
        mesh.push_arc(PI, TAU, cap, |a| Vec3::new(a.cos() * radius, -half + a.sin() * radius, 0.0));
        mesh.push_arc(PI, TAU, cap, |a| Vec3::new(0.0, -half + a.sin() * radius, a.cos() * radius));
        mesh
    }

    /// Cylinder along Y with total height `height`
    pub fn cylinder_gizmo(radius: f32, height: f32) -> Self {
        const SEGMENTS: u32 = 32;
        let mut mesh = Mesh::new("cylinder gizmo", PrimitiveTopology::LineList);
        let half = height * 0.5;

        for y in [-half, half] {
            mesh.push_arc(0.0, TAU, SEGMENTS, |a| {
                Vec3::new(a.cos() * radius, y, a.sin() * radius)
            });
        }
        for a in [0.0, PI * 0.5, PI, PI * 1.5] {
            let offset = Vec3::new(a.cos() * radius, 0.0, a.sin() * radius);
            mesh.push_line(offset + Vec3::Y * -half, offset + Vec3::Y * half);
        }
        mesh
    }
}

/// GPU uploads of [`Mesh`]es, created on first use
#[derive(Debug, Default)]
pub struct MeshCache {
    uploads: HashMap<MeshId, MeshHandle>,
}

impl MeshCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle of the mesh's upload, uploading it now if needed.
    ///
    /// A failed upload is logged and retried the next time the mesh is drawn.
    pub fn get_or_upload<B: GraphicsBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        mesh: &Mesh,
    ) -> Option<MeshHandle> {
        if let Some(handle) = self.uploads.get(&mesh.id()) {
            return Some(*handle);
        }
        match backend.create_mesh(&mesh.data()) {
            Ok(handle) => {
                log::trace!("Uploaded mesh '{}'", mesh.name);
                self.uploads.insert(mesh.id(), handle);
                Some(handle)
            }
            Err(e) => {
                log::warn!("Skipping mesh '{}': {}", mesh.name, e);
                None
            }
        }
    }

    pub fn contains(&self, id: MeshId) -> bool {
        self.uploads.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.uploads.len()
    }

    pub fn is_empty(&self) -> bool {
        self.uploads.is_empty()
    }

    pub fn evict<B: GraphicsBackend + ?Sized>(&mut self, backend: &mut B, id: MeshId) {
        if let Some(handle) = self.uploads.remove(&id) {
            backend.destroy_mesh(handle);
        }
    }

    pub fn release<B: GraphicsBackend + ?Sized>(&mut self, backend: &mut B) {
        for (_, handle) in self.uploads.drain() {
            backend.destroy_mesh(handle);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::RecordingBackend;

    #[test]
    fn test_mesh_ids_are_unique() {
        let a = Mesh::quad();
        let b = Mesh::quad();
        assert_ne!(a.id(), b.id());
        assert_eq!(a.clone().id(), a.id());
    }

    #[test]
    fn test_box_gizmo_has_twelve_edges() {
        let mesh = Mesh::box_gizmo();
        assert_eq!(mesh.index_count(), 24);
        assert!(mesh
            .vertices
            .iter()
            .all(|v| v.position.abs() == Vec3::ONE));
    }

    #[test]
    fn test_failed_upload_is_retried() {
        let mut backend = RecordingBackend::new();
        let mut cache = MeshCache::new();
        let quad = Mesh::quad();

        backend.set_fail_mesh_uploads(true);
        assert!(cache.get_or_upload(&mut backend, &quad).is_none());
        assert!(!cache.contains(quad.id()));

        backend.set_fail_mesh_uploads(false);
        let handle = cache.get_or_upload(&mut backend, &quad);
        assert!(handle.is_some());
        assert_eq!(cache.get_or_upload(&mut backend, &quad), handle);
        assert_eq!(backend.live_mesh_count(), 1);
    }
}
