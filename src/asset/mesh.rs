use wgpu::util::DeviceExt;

use crate::math::{BoundingBox, BoundingSphere};
use crate::render::Vertex;

/// Geometry shared by every primitive variant. The CPU copy always exists
/// (culling needs the local bounds); GPU buffers are created once by
/// [`Mesh::upload`] and absent in headless use.
pub struct Mesh {
    vertices: Vec<Vertex>,
    indices: Vec<u32>,
    bounds: BoundingBox,
    gpu: Option<GpuMesh>,
}

pub struct GpuMesh {
    vertex_buffer: wgpu::Buffer,
    index_buffer: wgpu::Buffer,
    index_count: u32,
}

impl Mesh {
    pub fn new(vertices: Vec<Vertex>, indices: Vec<u32>) -> Self {
        let bounds = BoundingBox::from_points(vertices.iter().map(|v| v.pos.into()));
        Self {
            vertices,
            indices,
            bounds,
            gpu: None,
        }
    }

    pub fn bounds(&self) -> BoundingBox {
        self.bounds
    }

    pub fn bounding_sphere(&self) -> BoundingSphere {
        self.bounds.bounding_sphere()
    }

    pub fn index_count(&self) -> u32 {
        self.indices.len() as u32
    }

    pub fn vertices(&self) -> &[Vertex] {
        &self.vertices
    }

    pub fn upload(&mut self, device: &wgpu::Device) {
        if self.gpu.is_some() {
            return;
        }
        let vertex_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("VertexBuffer"),
            contents: bytemuck::cast_slice(&self.vertices),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let index_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("IndexBuffer"),
            contents: bytemuck::cast_slice(&self.indices),
            usage: wgpu::BufferUsages::INDEX,
        });
        self.gpu = Some(GpuMesh {
            vertex_buffer,
            index_buffer,
            index_count: self.indices.len() as u32,
        });
    }

    pub fn gpu(&self) -> Option<&GpuMesh> {
        self.gpu.as_ref()
    }
}

impl GpuMesh {
    pub fn vertex_buffer(&self) -> &wgpu::Buffer {
        &self.vertex_buffer
    }

    pub fn index_buffer(&self) -> &wgpu::Buffer {
        &self.index_buffer
    }

    pub fn index_format(&self) -> wgpu::IndexFormat {
        wgpu::IndexFormat::Uint32
    }

    pub fn index_count(&self) -> u32 {
        self.index_count
    }
}

/// Unit cube centered on the origin, used by debug draws and tests.
pub fn cube_mesh() -> Mesh {
    use crate::render::vertex::v;

    let p = 0.5f32;
    let n = -0.5f32;
    let vertices = vec![
        // +Z
        v([n, n, p], [0.0, 0.0, 1.0], [0.0, 1.0]),
        v([p, n, p], [0.0, 0.0, 1.0], [1.0, 1.0]),
        v([p, p, p], [0.0, 0.0, 1.0], [1.0, 0.0]),
        v([n, p, p], [0.0, 0.0, 1.0], [0.0, 0.0]),
        // -Z
        v([p, n, n], [0.0, 0.0, -1.0], [0.0, 1.0]),
        v([n, n, n], [0.0, 0.0, -1.0], [1.0, 1.0]),
        v([n, p, n], [0.0, 0.0, -1.0], [1.0, 0.0]),
        v([p, p, n], [0.0, 0.0, -1.0], [0.0, 0.0]),
        // +X
        v([p, n, p], [1.0, 0.0, 0.0], [0.0, 1.0]),
        v([p, n, n], [1.0, 0.0, 0.0], [1.0, 1.0]),
        v([p, p, n], [1.0, 0.0, 0.0], [1.0, 0.0]),
        v([p, p, p], [1.0, 0.0, 0.0], [0.0, 0.0]),
        // -X
        v([n, n, n], [-1.0, 0.0, 0.0], [0.0, 1.0]),
        v([n, n, p], [-1.0, 0.0, 0.0], [1.0, 1.0]),
        v([n, p, p], [-1.0, 0.0, 0.0], [1.0, 0.0]),
        v([n, p, n], [-1.0, 0.0, 0.0], [0.0, 0.0]),
        // +Y
        v([n, p, p], [0.0, 1.0, 0.0], [0.0, 1.0]),
        v([p, p, p], [0.0, 1.0, 0.0], [1.0, 1.0]),
        v([p, p, n], [0.0, 1.0, 0.0], [1.0, 0.0]),
        v([n, p, n], [0.0, 1.0, 0.0], [0.0, 0.0]),
        // -Y
        v([n, n, n], [0.0, -1.0, 0.0], [0.0, 1.0]),
        v([p, n, n], [0.0, -1.0, 0.0], [1.0, 1.0]),
        v([p, n, p], [0.0, -1.0, 0.0], [1.0, 0.0]),
        v([n, n, p], [0.0, -1.0, 0.0], [0.0, 0.0]),
    ];

    let mut indices = Vec::with_capacity(36);
    for face in 0..6u32 {
        let base = face * 4;
        indices.extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
    }

    Mesh::new(vertices, indices)
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    #[test]
    fn cube_bounds_are_unit() {
        let mesh = cube_mesh();
        assert!(mesh.bounds().min.abs_diff_eq(Vec3::splat(-0.5), 1e-6));
        assert!(mesh.bounds().max.abs_diff_eq(Vec3::splat(0.5), 1e-6));
        assert_eq!(mesh.index_count(), 36);
    }

    #[test]
    fn bounding_sphere_covers_corners() {
        let mesh = cube_mesh();
        let sphere = mesh.bounding_sphere();
        assert!(sphere.center.abs_diff_eq(Vec3::ZERO, 1e-6));
        assert!((sphere.radius - (0.75f32).sqrt()).abs() < 1e-5);
    }
}
