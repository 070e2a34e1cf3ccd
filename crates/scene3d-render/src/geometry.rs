//! Static meshes shared by every instance of a kind.
//!
//! Meshes are generated on the CPU once and uploaded once per device. All use
//! the same vertex format (`position`, `normal`) and `u32` indices.

use std::collections::HashMap;
use std::f32::consts::{PI, TAU};

use glam::Vec3;

use crate::buffer::{create_index_buffer, create_vertex_buffer};
use crate::pipeline_cache::DeviceId;

/// One mesh vertex.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct Vertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
}

impl Vertex {
    /// Byte stride of one vertex.
    pub const STRIDE: u64 = std::mem::size_of::<Vertex>() as u64;

    const ATTRIBUTES: [wgpu::VertexAttribute; 2] =
        wgpu::vertex_attr_array![0 => Float32x3, 1 => Float32x3];

    /// Layout of the geometry buffer (slot 0).
    #[must_use]
    pub fn layout() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: Self::STRIDE,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &Self::ATTRIBUTES,
        }
    }

    fn new(position: Vec3, normal: Vec3) -> Self {
        Self {
            position: position.to_array(),
            normal: normal.to_array(),
        }
    }
}

/// CPU-side indexed mesh.
#[derive(Debug, Clone, Default)]
pub struct MeshData {
    pub vertices: Vec<Vertex>,
    pub indices: Vec<u32>,
}

/// The shared meshes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GeometryKind {
    /// Unit-radius UV sphere.
    Sphere,
    /// Ring of unit major radius around the z axis.
    Torus,
    /// Cube spanning `[-0.5, 0.5]` with per-face normals.
    Cube,
    /// Quad spanning `[-0.5, 0.5]` in xy.
    Quad,
}

impl GeometryKind {
    /// Generates the mesh.
    #[must_use]
    pub fn generate(self) -> MeshData {
        match self {
            GeometryKind::Sphere => uv_sphere(16, 24),
            GeometryKind::Torus => torus(1.0, 0.02, 48, 8),
            GeometryKind::Cube => cube(),
            GeometryKind::Quad => quad(),
        }
    }
}

/// UV sphere of radius 1 with the poles on the z axis.
#[must_use]
pub fn uv_sphere(stacks: u32, slices: u32) -> MeshData {
    let mut mesh = MeshData::default();
    for i in 0..=stacks {
        let theta = PI * i as f32 / stacks as f32;
        for j in 0..=slices {
            let phi = TAU * j as f32 / slices as f32;
            let n = Vec3::new(theta.sin() * phi.cos(), theta.sin() * phi.sin(), theta.cos());
            mesh.vertices.push(Vertex::new(n, n));
        }
    }
    let row = slices + 1;
    for i in 0..stacks {
        for j in 0..slices {
            let a = i * row + j;
            let b = a + row;
            mesh.indices.extend_from_slice(&[a, b, b + 1, a, b + 1, a + 1]);
        }
    }
    mesh
}

/// Torus in the xy plane.
#[must_use]
pub fn torus(major_radius: f32, minor_radius: f32, ring_segments: u32, tube_segments: u32) -> MeshData {
    let mut mesh = MeshData::default();
    for i in 0..=ring_segments {
        let u = TAU * i as f32 / ring_segments as f32;
        let (su, cu) = u.sin_cos();
        for j in 0..=tube_segments {
            let v = TAU * j as f32 / tube_segments as f32;
            let (sv, cv) = v.sin_cos();
            let normal = Vec3::new(cv * cu, cv * su, sv);
            let position = Vec3::new(major_radius * cu, major_radius * su, 0.0) + normal * minor_radius;
            mesh.vertices.push(Vertex::new(position, normal));
        }
    }
    let row = tube_segments + 1;
    for i in 0..ring_segments {
        for j in 0..tube_segments {
            let a = i * row + j;
            let b = a + row;
            mesh.indices.extend_from_slice(&[a, b, b + 1, a, b + 1, a + 1]);
        }
    }
    mesh
}

/// Cube spanning `[-0.5, 0.5]`, four vertices per face.
#[must_use]
pub fn cube() -> MeshData {
    // (normal, u, v) with u x v = normal so corners wind counter-clockwise
    let faces = [
        (Vec3::X, Vec3::Y, Vec3::Z),
        (Vec3::NEG_X, Vec3::Z, Vec3::Y),
        (Vec3::Y, Vec3::Z, Vec3::X),
        (Vec3::NEG_Y, Vec3::X, Vec3::Z),
        (Vec3::Z, Vec3::X, Vec3::Y),
        (Vec3::NEG_Z, Vec3::Y, Vec3::X),
    ];
    let mut mesh = MeshData::default();
    for (normal, u, v) in faces {
        let base = mesh.vertices.len() as u32;
        for (su, sv) in [(-0.5, -0.5), (0.5, -0.5), (0.5, 0.5), (-0.5, 0.5)] {
            mesh.vertices
                .push(Vertex::new(normal * 0.5 + u * su + v * sv, normal));
        }
        mesh.indices
            .extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
    }
    mesh
}

/// Billboard quad facing +z.
#[must_use]
pub fn quad() -> MeshData {
    let vertices = [(-0.5, -0.5), (0.5, -0.5), (0.5, 0.5), (-0.5, 0.5)]
        .into_iter()
        .map(|(x, y)| Vertex::new(Vec3::new(x, y, 0.0), Vec3::Z))
        .collect();
    MeshData {
        vertices,
        indices: vec![0, 1, 2, 0, 2, 3],
    }
}

/// A mesh uploaded to the GPU.
#[derive(Debug, Clone)]
pub struct GpuMesh {
    pub vertex_buffer: wgpu::Buffer,
    pub index_buffer: wgpu::Buffer,
    pub index_count: u32,
}

/// Uploaded meshes for the current device.
#[derive(Debug, Default)]
pub struct GeometryCache {
    device_id: Option<DeviceId>,
    meshes: HashMap<GeometryKind, GpuMesh>,
}

impl GeometryCache {
    /// Returns the mesh for `kind`, uploading it on first use on this device.
    pub fn get(&mut self, device: &wgpu::Device, device_id: DeviceId, kind: GeometryKind) -> GpuMesh {
        if self.device_id != Some(device_id) {
            self.meshes.clear();
            self.device_id = Some(device_id);
        }
        self.meshes
            .entry(kind)
            .or_insert_with(|| {
                let data = kind.generate();
                log::debug!(
                    "uploading {kind:?} mesh: {} vertices, {} indices",
                    data.vertices.len(),
                    data.indices.len()
                );
                GpuMesh {
                    vertex_buffer: create_vertex_buffer(device, &data.vertices, "geometry vertices"),
                    index_buffer: create_index_buffer(device, &data.indices, "geometry indices"),
                    index_count: data.indices.len() as u32,
                }
            })
            .clone()
    }

    /// Destroys every uploaded mesh.
    pub fn destroy(&mut self) {
        for mesh in self.meshes.values() {
            mesh.vertex_buffer.destroy();
            mesh.index_buffer.destroy();
        }
        self.meshes.clear();
        self.device_id = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [GeometryKind; 4] = [
        GeometryKind::Sphere,
        GeometryKind::Torus,
        GeometryKind::Cube,
        GeometryKind::Quad,
    ];

    fn position(mesh: &MeshData, i: u32) -> Vec3 {
        Vec3::from_array(mesh.vertices[i as usize].position)
    }

    #[test]
    fn test_indices_in_range_and_normals_unit() {
        for kind in ALL {
            let mesh = kind.generate();
            assert_eq!(mesh.indices.len() % 3, 0, "{kind:?}");
            assert!(
                mesh.indices.iter().all(|&i| (i as usize) < mesh.vertices.len()),
                "{kind:?}"
            );
            for v in &mesh.vertices {
                let n = Vec3::from_array(v.normal);
                assert!((n.length() - 1.0).abs() < 1e-4, "{kind:?}");
            }
        }
    }

    #[test]
    fn test_cube_counts_and_bounds() {
        let mesh = cube();
        assert_eq!(mesh.vertices.len(), 24);
        assert_eq!(mesh.indices.len(), 36);
        for v in &mesh.vertices {
            assert!(v.position.iter().all(|c| (c.abs() - 0.5).abs() < 1e-6));
        }
    }

    #[test]
    fn test_sphere_and_cube_wind_outward() {
        for mesh in [uv_sphere(8, 12), cube()] {
            for tri in mesh.indices.chunks_exact(3) {
                let (a, b, c) = (position(&mesh, tri[0]), position(&mesh, tri[1]), position(&mesh, tri[2]));
                let face_normal = (b - a).cross(c - a);
                if face_normal.length() < 1e-6 {
                    // Degenerate at the poles
                    continue;
                }
                let centroid = (a + b + c) / 3.0;
                assert!(face_normal.dot(centroid) > 0.0);
            }
        }
    }

    #[test]
    fn test_sphere_is_unit() {
        for v in uv_sphere(6, 8).vertices {
            assert!((Vec3::from_array(v.position).length() - 1.0).abs() < 1e-5);
        }
    }

    #[test]
    fn test_torus_ring_radius() {
        let mesh = torus(1.0, 0.1, 16, 6);
        for v in &mesh.vertices {
            let p = Vec3::from_array(v.position);
            let ring = p.truncate().length();
            assert!(ring > 0.89 && ring < 1.11);
            assert!(p.z.abs() <= 0.1 + 1e-6);
        }
    }

    #[test]
    fn test_quad() {
        let mesh = quad();
        assert_eq!(mesh.vertices.len(), 4);
        assert_eq!(mesh.indices, vec![0, 1, 2, 0, 2, 3]);
    }
}
