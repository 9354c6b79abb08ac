use std::f32::consts::{PI, TAU};

use bytemuck::{Pod, Zeroable};

use crate::types::GeometryKind;

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct MeshVertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub uv: [f32; 2],
}

/// Indexed triangle list with counter-clockwise front faces.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MeshData {
    pub vertices: Vec<MeshVertex>,
    pub indices: Vec<u32>,
}

impl MeshData {
    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    fn push(&mut self, position: [f32; 3], normal: [f32; 3], uv: [f32; 2]) -> u32 {
        let index = self.vertices.len() as u32;
        self.vertices.push(MeshVertex {
            position,
            normal,
            uv,
        });
        index
    }
}

/// Tessellation used for every preview primitive; dense enough for displacement.
pub const SPHERE_SEGMENTS: (u32, u32) = (128, 128);
pub const CUBE_SIZE: f32 = 1.5;
pub const CUBE_SUBDIVISIONS: u32 = 64;
pub const CYLINDER_SEGMENTS: (u32, u32) = (128, 64);
pub const PLANE_SIZE: f32 = 2.0;
pub const PLANE_SUBDIVISIONS: u32 = 128;

pub struct GeometryProvider;

impl GeometryProvider {
    pub fn build(kind: GeometryKind) -> MeshData {
        match kind {
            GeometryKind::Sphere => sphere(1.0, SPHERE_SEGMENTS.0, SPHERE_SEGMENTS.1),
            GeometryKind::Cube => cube(CUBE_SIZE, CUBE_SUBDIVISIONS),
            GeometryKind::Cylinder => cylinder(1.0, 2.0, CYLINDER_SEGMENTS.0, CYLINDER_SEGMENTS.1),
            GeometryKind::Plane => plane(PLANE_SIZE, PLANE_SUBDIVISIONS),
        }
    }
}

fn sphere(radius: f32, width_segments: u32, height_segments: u32) -> MeshData {
    let mut mesh = MeshData::default();
    let columns = width_segments + 1;
    for iy in 0..=height_segments {
        let v = iy as f32 / height_segments as f32;
        let theta = v * PI;
        for ix in 0..=width_segments {
            let u = ix as f32 / width_segments as f32;
            let phi = u * TAU;
            let normal = [
                -phi.cos() * theta.sin(),
                theta.cos(),
                phi.sin() * theta.sin(),
            ];
            let position = normal.map(|component| component * radius);
            mesh.push(position, normal, [u, 1.0 - v]);
        }
    }

    for iy in 0..height_segments {
        for ix in 0..width_segments {
            let a = iy * columns + ix + 1;
            let b = iy * columns + ix;
            let c = (iy + 1) * columns + ix;
            let d = (iy + 1) * columns + ix + 1;
            // Pole rows collapse to a point; skip their degenerate halves.
            if iy != 0 {
                mesh.indices.extend_from_slice(&[a, b, d]);
            }
            if iy != height_segments - 1 {
                mesh.indices.extend_from_slice(&[b, c, d]);
            }
        }
    }
    mesh
}

/// Adds one subdivided square face. `u_axis × v_axis` points along `normal`.
fn push_face(
    mesh: &mut MeshData,
    normal: [f32; 3],
    u_axis: [f32; 3],
    v_axis: [f32; 3],
    half: f32,
    subdivisions: u32,
) {
    let base = mesh.vertices.len() as u32;
    let columns = subdivisions + 1;
    for iy in 0..=subdivisions {
        let tv = iy as f32 / subdivisions as f32;
        for ix in 0..=subdivisions {
            let tu = ix as f32 / subdivisions as f32;
            let su = (tu * 2.0 - 1.0) * half;
            let sv = (tv * 2.0 - 1.0) * half;
            let position = [
                normal[0] * half + u_axis[0] * su + v_axis[0] * sv,
                normal[1] * half + u_axis[1] * su + v_axis[1] * sv,
                normal[2] * half + u_axis[2] * su + v_axis[2] * sv,
            ];
            mesh.push(position, normal, [tu, tv]);
        }
    }
    for iy in 0..subdivisions {
        for ix in 0..subdivisions {
            let a = base + iy * columns + ix;
            let b = a + 1;
            let c = a + columns + 1;
            let d = a + columns;
            mesh.indices.extend_from_slice(&[a, b, c, a, c, d]);
        }
    }
}

fn cube(size: f32, subdivisions: u32) -> MeshData {
    let half = size / 2.0;
    let mut mesh = MeshData::default();
    let faces: [([f32; 3], [f32; 3], [f32; 3]); 6] = [
        ([1.0, 0.0, 0.0], [0.0, 0.0, -1.0], [0.0, 1.0, 0.0]),
        ([-1.0, 0.0, 0.0], [0.0, 0.0, 1.0], [0.0, 1.0, 0.0]),
        ([0.0, 1.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, -1.0]),
        ([0.0, -1.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, 1.0]),
        ([0.0, 0.0, 1.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]),
        ([0.0, 0.0, -1.0], [-1.0, 0.0, 0.0], [0.0, 1.0, 0.0]),
    ];
    for (normal, u_axis, v_axis) in faces {
        push_face(&mut mesh, normal, u_axis, v_axis, half, subdivisions);
    }
    mesh
}

fn plane(size: f32, subdivisions: u32) -> MeshData {
    let mut mesh = MeshData::default();
    // Faces the default camera on +Z.
    push_face(
        &mut mesh,
        [0.0, 0.0, 1.0],
        [1.0, 0.0, 0.0],
        [0.0, 1.0, 0.0],
        size / 2.0,
        subdivisions,
    );
    for vertex in &mut mesh.vertices {
        vertex.position[2] = 0.0;
    }
    mesh
}

fn cylinder(radius: f32, height: f32, radial_segments: u32, height_segments: u32) -> MeshData {
    let mut mesh = MeshData::default();
    let half_height = height / 2.0;
    let columns = radial_segments + 1;

    for iy in 0..=height_segments {
        let v = iy as f32 / height_segments as f32;
        let y = half_height - v * height;
        for ix in 0..=radial_segments {
            let u = ix as f32 / radial_segments as f32;
            let theta = u * TAU;
            let (sin, cos) = theta.sin_cos();
            mesh.push(
                [radius * sin, y, radius * cos],
                [sin, 0.0, cos],
                [u, 1.0 - v],
            );
        }
    }
    for iy in 0..height_segments {
        for ix in 0..radial_segments {
            let a = iy * columns + ix;
            let b = (iy + 1) * columns + ix;
            let c = (iy + 1) * columns + ix + 1;
            let d = iy * columns + ix + 1;
            mesh.indices.extend_from_slice(&[a, b, d, b, c, d]);
        }
    }

    push_cap(&mut mesh, radius, half_height, radial_segments, true);
    push_cap(&mut mesh, radius, half_height, radial_segments, false);
    mesh
}

/// Closes one end of the cylinder with a triangle fan around its centre.
fn push_cap(mesh: &mut MeshData, radius: f32, half_height: f32, radial_segments: u32, top: bool) {
    let sign = if top { 1.0 } else { -1.0 };
    let y = half_height * sign;
    let normal = [0.0, sign, 0.0];
    let center = mesh.push([0.0, y, 0.0], normal, [0.5, 0.5]);
    let rim_start = mesh.vertices.len() as u32;
    for ix in 0..=radial_segments {
        let theta = ix as f32 / radial_segments as f32 * TAU;
        let (sin, cos) = theta.sin_cos();
        mesh.push(
            [radius * sin, y, radius * cos],
            normal,
            [sin * 0.5 + 0.5, cos * 0.5 * sign + 0.5],
        );
    }
    for ix in 0..radial_segments {
        let current = rim_start + ix;
        let next = current + 1;
        if top {
            mesh.indices.extend_from_slice(&[current, next, center]);
        } else {
            mesh.indices.extend_from_slice(&[next, current, center]);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use glam::Vec3;

    use super::*;

    const WELD_EPSILON: f32 = 1.0e-5;

    /// Maps every vertex to the first vertex sharing its position.
    fn weld(mesh: &MeshData) -> Vec<u32> {
        let mut cells: HashMap<[i64; 3], Vec<(Vec3, u32)>> = HashMap::new();
        let mut next = 0u32;
        mesh.vertices
            .iter()
            .map(|vertex| {
                let position = Vec3::from(vertex.position);
                let cell = vertex.position.map(|c| (c / WELD_EPSILON).floor() as i64);
                for dx in -1..=1 {
                    for dy in -1..=1 {
                        for dz in -1..=1 {
                            let neighbour = [cell[0] + dx, cell[1] + dy, cell[2] + dz];
                            let found = cells.get(&neighbour).and_then(|bucket| {
                                bucket
                                    .iter()
                                    .find(|(other, _)| other.distance(position) <= WELD_EPSILON)
                            });
                            if let Some((_, id)) = found {
                                return *id;
                            }
                        }
                    }
                }
                let id = next;
                next += 1;
                cells.entry(cell).or_default().push((position, id));
                id
            })
            .collect()
    }

    /// Edge usage counts after welding vertices that share a position.
    fn welded_edge_counts(mesh: &MeshData) -> HashMap<(u32, u32), u32> {
        let remap = weld(mesh);
        let mut edges = HashMap::new();
        for triangle in mesh.indices.chunks_exact(3) {
            let [a, b, c] = [triangle[0], triangle[1], triangle[2]].map(|i| remap[i as usize]);
            assert!(a != b && b != c && a != c, "degenerate triangle");
            for (from, to) in [(a, b), (b, c), (c, a)] {
                *edges.entry((from.min(to), from.max(to))).or_insert(0) += 1;
            }
        }
        edges
    }

    fn boundary_edges(mesh: &MeshData) -> usize {
        let edges = welded_edge_counts(mesh);
        assert!(
            edges.values().all(|&count| count <= 2),
            "edge shared by more than two triangles"
        );
        edges.values().filter(|&&count| count == 1).count()
    }

    #[test]
    fn closed_primitives_have_no_boundary() {
        for kind in [GeometryKind::Sphere, GeometryKind::Cube, GeometryKind::Cylinder] {
            let mesh = GeometryProvider::build(kind);
            assert_eq!(boundary_edges(&mesh), 0, "{kind:?} is not closed");
        }
    }

    #[test]
    fn plane_boundary_is_its_outline() {
        let mesh = GeometryProvider::build(GeometryKind::Plane);
        assert_eq!(boundary_edges(&mesh), 4 * PLANE_SUBDIVISIONS as usize);
    }

    #[test]
    fn cylinder_caps_close_both_ends() {
        let mesh = GeometryProvider::build(GeometryKind::Cylinder);
        let edges = welded_edge_counts(&mesh);
        assert!(edges.values().all(|&count| count == 2));
        let capped = mesh
            .vertices
            .iter()
            .filter(|vertex| vertex.normal == [0.0, 1.0, 0.0] || vertex.normal == [0.0, -1.0, 0.0])
            .count();
        assert_eq!(capped, 2 * (CYLINDER_SEGMENTS.0 as usize + 2));
    }

    #[test]
    fn indices_reference_existing_vertices() {
        for kind in GeometryKind::ALL {
            let mesh = GeometryProvider::build(kind);
            let len = mesh.vertices.len() as u32;
            assert!(mesh.indices.iter().all(|&index| index < len), "{kind:?}");
            assert_eq!(mesh.indices.len() % 3, 0);
        }
    }

    #[test]
    fn tessellation_is_dense_enough_for_displacement() {
        for kind in GeometryKind::ALL {
            assert!(GeometryProvider::build(kind).triangle_count() >= 16_000, "{kind:?}");
        }
    }

    #[test]
    fn build_is_deterministic() {
        assert_eq!(
            GeometryProvider::build(GeometryKind::Cube),
            GeometryProvider::build(GeometryKind::Cube)
        );
    }

    #[test]
    fn normals_face_outward() {
        for kind in [GeometryKind::Sphere, GeometryKind::Cube, GeometryKind::Cylinder] {
            let mesh = GeometryProvider::build(kind);
            for triangle in mesh.indices.chunks_exact(3) {
                let [a, b, c] = [triangle[0], triangle[1], triangle[2]]
                    .map(|i| Vec3::from(mesh.vertices[i as usize].position));
                let face = (b - a).cross(c - a);
                let centroid = (a + b + c) / 3.0;
                if face.length_squared() > 1e-12 {
                    assert!(face.dot(centroid) > 0.0, "{kind:?} has an inward face");
                }
            }
        }
    }
}
