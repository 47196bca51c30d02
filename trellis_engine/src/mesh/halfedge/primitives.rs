// Copyright (C) 2022 setzer22 and contributors
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::f64::consts::PI;

use super::*;

pub struct Tetrahedron;

impl Tetrahedron {
    /// Builds a tetrahedron over the four given corners. The faces wind
    /// outward when the corners are ordered so that `d` sits on the positive
    /// side of the (a, b, c) plane.
    pub fn build(a: DVec3, b: DVec3, c: DVec3, d: DVec3) -> HalfEdgeMesh {
        HalfEdgeMesh::build_from_triangles(
            &[a, b, c, d],
            &[[1u32, 2, 3], [0, 2, 1], [0, 1, 3], [0, 3, 2]],
        )
        .expect("Tetrahedron construction should not fail")
    }
}

pub struct UVSphere;

impl UVSphere {
    /// A lat-long triangulated sphere: triangle fans at the two poles and
    /// two triangles per quad in between. Faces wind outward.
    pub fn build(center: DVec3, segments: u32, rings: u32, radius: f64) -> HalfEdgeMesh {
        let mut vertices = Vec::<DVec3>::new();
        let mut triangles = Vec::<[u32; 3]>::new();

        let top_vertex = 0;
        vertices.push(center + DVec3::Y * radius);

        for i in 0..rings - 1 {
            let phi = PI * (i + 1) as f64 / rings as f64;
            for j in 0..segments {
                let theta = 2.0 * PI * j as f64 / segments as f64;
                let x = phi.sin() * theta.cos() * radius;
                let y = phi.cos() * radius;
                let z = phi.sin() * theta.sin() * radius;
                vertices.push(center + DVec3::new(x, y, z));
            }
        }

        let bottom_vertex = vertices.len() as u32;
        vertices.push(center - DVec3::Y * radius);

        // Top triangles
        for i in 0..segments {
            let i0 = i + 1;
            let i1 = (i + 1) % segments + 1;
            triangles.push([top_vertex, i1, i0]);
        }
        // Bottom triangles
        for i in 0..segments {
            let i0 = i + segments * (rings - 2) + 1;
            let i1 = (i + 1) % segments + segments * (rings - 2) + 1;
            triangles.push([bottom_vertex, i0, i1]);
        }
        // Middle quads, diagonalized
        for j in 0..rings - 2 {
            let j0 = j * segments + 1;
            let j1 = (j + 1) * segments + 1;
            for i in 0..segments {
                let i0 = j0 + i;
                let i1 = j0 + (i + 1) % segments;
                let i2 = j1 + (i + 1) % segments;
                let i3 = j1 + i;
                triangles.push([i0, i1, i2]);
                triangles.push([i0, i2, i3]);
            }
        }

        HalfEdgeMesh::build_from_triangles(&vertices, &triangles)
            .expect("Sphere construction should not fail")
    }
}

pub struct Plane;

impl Plane {
    /// A square grid in the XY plane with `subdivisions` cells per side, two
    /// triangles per cell. Faces wind counter-clockwise seen from +Z.
    pub fn build(center: DVec3, size: f64, subdivisions: u32) -> HalfEdgeMesh {
        let n = subdivisions.max(1);
        let side = n + 1;

        let mut vertices = Vec::<DVec3>::new();
        for j in 0..side {
            for i in 0..side {
                let u = i as f64 / n as f64 - 0.5;
                let v = j as f64 / n as f64 - 0.5;
                vertices.push(center + DVec3::new(u * size, v * size, 0.0));
            }
        }

        let at = |i: u32, j: u32| j * side + i;
        let mut triangles = Vec::<[u32; 3]>::new();
        for j in 0..n {
            for i in 0..n {
                let v00 = at(i, j);
                let v10 = at(i + 1, j);
                let v11 = at(i + 1, j + 1);
                let v01 = at(i, j + 1);
                triangles.push([v00, v10, v11]);
                triangles.push([v00, v11, v01]);
            }
        }

        HalfEdgeMesh::build_from_triangles(&vertices, &triangles)
            .expect("Plane construction should not fail")
    }
}

pub struct HalfDisc;

impl HalfDisc {
    /// A triangulated half disc in the XY plane: `rings` concentric
    /// semicircles of `segments` angular steps around a center vertex. The
    /// open boundary is the outer arc plus the diameter. Faces wind
    /// counter-clockwise seen from +Z.
    pub fn build(center: DVec3, radius: f64, rings: u32, segments: u32) -> HalfEdgeMesh {
        let mut vertices = Vec::<DVec3>::new();
        vertices.push(center);

        for k in 1..=rings {
            let r = radius * k as f64 / rings as f64;
            for j in 0..=segments {
                let theta = PI * j as f64 / segments as f64;
                vertices.push(center + DVec3::new(r * theta.cos(), r * theta.sin(), 0.0));
            }
        }

        let at = |k: u32, j: u32| 1 + (k - 1) * (segments + 1) + j;
        let mut triangles = Vec::<[u32; 3]>::new();

        // Innermost fan around the center
        for j in 0..segments {
            triangles.push([0, at(1, j), at(1, j + 1)]);
        }
        // Bands between consecutive rings
        for k in 1..rings {
            for j in 0..segments {
                let inner_a = at(k, j);
                let inner_b = at(k, j + 1);
                let outer_a = at(k + 1, j);
                let outer_b = at(k + 1, j + 1);
                triangles.push([inner_a, outer_a, outer_b]);
                triangles.push([inner_a, outer_b, inner_b]);
            }
        }

        HalfEdgeMesh::build_from_triangles(&vertices, &triangles)
            .expect("Half disc construction should not fail")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::halfedge::validation;

    fn euler_characteristic(mesh: &HalfEdgeMesh) -> i64 {
        let conn = &mesh.connectivity;
        let num_edges = conn.num_halfedges() as i64 / 2;
        conn.num_vertices() as i64 - num_edges + conn.num_faces() as i64
    }

    #[test]
    fn sphere_is_closed_and_genus_zero() {
        let sphere = UVSphere::build(DVec3::ZERO, 10, 10, 1.0);
        let conn = &sphere.connectivity;

        assert_eq!(conn.num_vertices(), 2 + 10 * 9);
        assert!(conn.iter_halfedges().all(|(_, h)| h.face.is_some()));
        assert!(conn.iter_vertices().all(|(_, v)| !v.is_boundary()));
        assert_eq!(euler_characteristic(&sphere), 2);

        validation::check_connectivity(conn).unwrap();
        validation::check_orientation(conn, &sphere.positions, DVec3::ZERO).unwrap();
    }

    #[test]
    fn plane_flags_its_rim() {
        let plane = Plane::build(DVec3::ZERO, 2.0, 3);
        let conn = &plane.connectivity;

        assert_eq!(conn.num_vertices(), 16);
        assert_eq!(conn.num_faces(), 18);
        // 4x4 grid: 12 rim vertices, 4 interior ones
        assert_eq!(
            conn.iter_vertices().filter(|(_, v)| v.is_boundary()).count(),
            12
        );
        assert_eq!(euler_characteristic(&plane), 1);

        validation::check_connectivity(conn).unwrap();
    }

    #[test]
    fn half_disc_has_a_single_boundary_loop() {
        let disc = HalfDisc::build(DVec3::new(0.0, 0.0, 1.0), 1.0, 4, 12);
        let conn = &disc.connectivity;

        validation::check_connectivity(conn).unwrap();
        validation::check_orientation(conn, &disc.positions, DVec3::ZERO).unwrap();

        let boundary: Vec<HalfEdgeId> = conn
            .iter_halfedges()
            .filter(|(_, h)| h.face.is_none())
            .map(|(h, _)| h)
            .collect();
        // Outer arc + the two halves of the diameter
        assert_eq!(boundary.len(), (12 + 2 * 4) as usize);

        // Walking next from any boundary halfedge covers the whole loop
        let h0 = boundary[0];
        let mut h = h0;
        let mut visited = 0;
        loop {
            visited += 1;
            h = conn.at_halfedge(h).next().end();
            if h == h0 {
                break;
            }
        }
        assert_eq!(visited, boundary.len());
    }

    #[test]
    fn tetrahedron_counts() {
        let tetra = Tetrahedron::build(
            DVec3::ZERO,
            DVec3::X,
            DVec3::Y,
            DVec3::Z,
        );
        let conn = &tetra.connectivity;
        assert_eq!(conn.num_vertices(), 4);
        assert_eq!(conn.num_faces(), 4);
        assert_eq!(conn.num_halfedges(), 12);
        validation::check_connectivity(conn).unwrap();
    }
}
