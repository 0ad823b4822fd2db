// renderer/primitives.rs
// Procedural meshes for demos and tests.
use std::f32::consts::PI;

use glam::Vec3;

use crate::asset::Mesh;

use super::vertex::{v, Vertex};

fn with_tangent(mut vertex: Vertex, tangent: Vec3) -> Vertex {
    vertex.tangent = tangent.to_array();
    vertex
}

pub fn sphere_mesh(segments: u32, rings: u32) -> Mesh {
    let segments = segments.max(3);
    let rings = rings.max(2);
    let mut vertices = Vec::new();
    let mut indices = Vec::new();

    for ring in 0..=rings {
        let phi = PI * ring as f32 / rings as f32;
        let y = phi.cos();
        let ring_radius = phi.sin();

        for segment in 0..=segments {
            let theta = 2.0 * PI * segment as f32 / segments as f32;
            let x = ring_radius * theta.cos();
            let z = ring_radius * theta.sin();

            // For a unit sphere, position = normal
            let u = segment as f32 / segments as f32;
            let tex_v = ring as f32 / rings as f32;
            let tangent = Vec3::new(-theta.sin(), 0.0, theta.cos());
            vertices.push(with_tangent(v([x, y, z], [x, y, z], [u, tex_v]), tangent));
        }
    }

    for ring in 0..rings {
        for segment in 0..segments {
            let current = (ring * (segments + 1) + segment) as u16;
            let next = current + segments as u16 + 1;

            indices.extend_from_slice(&[current, next, current + 1]);
            indices.extend_from_slice(&[current + 1, next, next + 1]);
        }
    }

    Mesh::new(vertices, indices)
}

/// Unit cube centred on the origin, four vertices per face.
pub fn cube_mesh() -> Mesh {
    // (normal, tangent) per face; bitangent is normal x tangent.
    let faces = [
        (Vec3::X, Vec3::Z),
        (Vec3::NEG_X, Vec3::NEG_Z),
        (Vec3::Y, Vec3::X),
        (Vec3::NEG_Y, Vec3::X),
        (Vec3::Z, Vec3::X),
        (Vec3::NEG_Z, Vec3::NEG_X),
    ];

    let mut vertices = Vec::with_capacity(24);
    let mut indices = Vec::with_capacity(36);
    for (normal, tangent) in faces {
        let bitangent = normal.cross(tangent);
        let base = vertices.len() as u16;
        for (du, dv) in [(-0.5, -0.5), (0.5, -0.5), (0.5, 0.5), (-0.5, 0.5)] {
            let position = normal * 0.5 + tangent * du + bitangent * dv;
            let uv = [du + 0.5, 0.5 - dv];
            vertices.push(with_tangent(
                v(position.to_array(), normal.to_array(), uv),
                tangent,
            ));
        }
        indices.extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
    }

    Mesh::new(vertices, indices)
}

/// Unit quad in the XY plane facing +Z.
pub fn quad_mesh() -> Mesh {
    let normal = [0.0, 0.0, 1.0];
    let vertices = vec![
        with_tangent(v([-0.5, -0.5, 0.0], normal, [0.0, 1.0]), Vec3::X),
        with_tangent(v([0.5, -0.5, 0.0], normal, [1.0, 1.0]), Vec3::X),
        with_tangent(v([0.5, 0.5, 0.0], normal, [1.0, 0.0]), Vec3::X),
        with_tangent(v([-0.5, 0.5, 0.0], normal, [0.0, 0.0]), Vec3::X),
    ];
    Mesh::new(vertices, vec![0, 1, 2, 0, 2, 3])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cube_faces_wind_counter_clockwise() {
        let cube = cube_mesh();
        assert_eq!(cube.vertices().len(), 24);
        assert_eq!(cube.triangle_count(), 12);
        for tri in cube.indices(true).chunks_exact(3) {
            let [a, b, c] = [tri[0], tri[1], tri[2]].map(|i| Vec3::from(cube.vertices()[i as usize].position));
            let normal = Vec3::from(cube.vertices()[tri[0] as usize].normal);
            assert!((b - a).cross(c - a).dot(normal) > 0.0);
        }
    }

    #[test]
    fn sphere_indices_stay_in_range() {
        let sphere = sphere_mesh(16, 8);
        let count = sphere.vertices().len();
        assert!(sphere.indices(true).iter().all(|&i| (i as usize) < count));
        assert_eq!(sphere.triangle_count(), 16 * 8 * 2);
    }
}
