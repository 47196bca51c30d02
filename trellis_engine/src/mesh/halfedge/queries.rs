// Copyright (C) 2023 setzer22 and contributors
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use float_ord::FloatOrd;

use super::*;

/// Aggregate edge length metrics over a mesh, counting each geometric edge
/// once rather than once per halfedge.
#[derive(Debug, Clone, Copy, Default)]
pub struct EdgeLengthStats {
    pub count: usize,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
}

impl MeshConnectivity {
    /// The 3d euclidean length of the edge spanned by this halfedge and its
    /// twin.
    pub fn edge_length(&self, positions: &Positions, h: HalfEdgeId) -> f64 {
        let (src, dst) = self.at_halfedge(h).src_dst_pair().unwrap_or_else(|err| {
            panic!("Error during traversal: {err:?}");
        });
        positions[src].distance(positions[dst])
    }

    /// The componentwise average of the edge's two endpoints.
    pub fn edge_midpoint(&self, positions: &Positions, h: HalfEdgeId) -> DVec3 {
        let (src, dst) = self.at_halfedge(h).src_dst_pair().unwrap_or_else(|err| {
            panic!("Error during traversal: {err:?}");
        });
        lerp(positions[src], positions[dst], 0.5)
    }

    /// The cross product of two triangle edges sharing a corner, which is
    /// the same vector for every corner of the triangle. Left un-normalised:
    /// the direction encodes the face orientation and the magnitude is twice
    /// the triangle area.
    pub fn face_normal(&self, positions: &Positions, face: FaceId) -> DVec3 {
        let verts = self.face_vertices(face);
        let p0 = positions[verts[0]];
        let p1 = positions[verts[1]];
        let p2 = positions[verts[2]];
        (p1 - p0).cross(p2 - p0)
    }

    /// The mean of the `face_normal` of every bounded face around the vertex.
    /// Not normalised.
    pub fn vertex_normal(&self, positions: &Positions, vertex: VertexId) -> DVec3 {
        let faces = self
            .at_vertex(vertex)
            .adjacent_faces()
            .unwrap_or_else(|err| panic!("Error during traversal: {err:?}"));
        if faces.is_empty() {
            return DVec3::ZERO;
        }
        let sum: DVec3 = faces
            .iter_cpy()
            .map(|f| self.face_normal(positions, f))
            .fold(DVec3::ZERO, |acc, n| acc + n);
        sum / faces.len() as f64
    }

    /// True when either side of the edge is a boundary loop.
    pub fn is_boundary_edge(&self, h: HalfEdgeId) -> bool {
        let boundary = self
            .at_halfedge(h)
            .is_boundary()
            .and_then(|b| Ok(b || self.at_halfedge(h).twin().is_boundary()?));
        boundary.unwrap_or_else(|err| panic!("Error during traversal: {err:?}"))
    }

    /// True when either endpoint carries the boundary flag.
    pub fn has_boundary_vertex(&self, h: HalfEdgeId) -> bool {
        let (src, dst) = self.at_halfedge(h).src_dst_pair().unwrap_or_else(|err| {
            panic!("Error during traversal: {err:?}");
        });
        self[src].is_boundary() || self[dst].is_boundary()
    }

    /// The sign of the signed volume of the tetrahedron formed by the face's
    /// three vertices and `reference`, computed with the exact `orient3d`
    /// predicate. Positive for every face of a consistently outward-oriented
    /// mesh around the reference point.
    pub fn face_orientation(&self, positions: &Positions, face: FaceId, reference: DVec3) -> f64 {
        let verts = self.face_vertices(face);
        robust::orient3d(
            coord(positions[verts[0]]),
            coord(positions[verts[1]]),
            coord(positions[verts[2]]),
            coord(reference),
        )
    }

    /// Min / mean / max edge length over the live mesh. Each geometric edge
    /// is counted once: of the two twins, only the one with the smaller
    /// handle contributes.
    pub fn edge_length_stats(&self, positions: &Positions) -> EdgeLengthStats {
        let lengths: Vec<f64> = self
            .iter_halfedges()
            .filter(|(h, halfedge)| match halfedge.twin {
                Some(t) => *h < t,
                None => true,
            })
            .map(|(h, _)| self.edge_length(positions, h))
            .collect();

        if lengths.is_empty() {
            return EdgeLengthStats::default();
        }

        EdgeLengthStats {
            count: lengths.len(),
            min: lengths.iter_cpy().map(FloatOrd).min().unwrap().0,
            max: lengths.iter_cpy().map(FloatOrd).max().unwrap().0,
            mean: lengths.iter().sum::<f64>() / lengths.len() as f64,
        }
    }
}

fn coord(p: DVec3) -> robust::Coord3D<f64> {
    robust::Coord3D {
        x: p.x,
        y: p.y,
        z: p.z,
    }
}

#[cfg(test)]
mod tests {
    use crate::prelude::*;

    fn two_triangle_square() -> HalfEdgeMesh {
        // Unit square in the XY plane, split along the (0,0) - (1,1) diagonal
        let positions = [
            DVec3::new(0.0, 0.0, 0.0),
            DVec3::new(1.0, 0.0, 0.0),
            DVec3::new(1.0, 1.0, 0.0),
            DVec3::new(0.0, 1.0, 0.0),
        ];
        HalfEdgeMesh::build_from_triangles(&positions, &[[0u32, 1, 2], [0, 2, 3]]).unwrap()
    }

    fn vertex_with_index(mesh: &HalfEdgeMesh, position: DVec3) -> VertexId {
        mesh.connectivity
            .iter_vertices()
            .find(|(v, _)| mesh.positions[*v] == position)
            .map(|(v, _)| v)
            .unwrap()
    }

    #[test]
    fn edge_length_uses_all_three_axes() {
        let positions = [
            DVec3::new(0.0, 0.0, 0.0),
            DVec3::new(0.0, 0.0, 2.0),
            DVec3::new(1.0, 0.0, 1.0),
            DVec3::new(0.0, 1.0, 1.0),
        ];
        let mesh = HalfEdgeMesh::build_from_triangles(&positions, &[[0u32, 1, 2], [0, 3, 1]]).unwrap();
        let conn = &mesh.connectivity;

        let a = vertex_with_index(&mesh, positions[0]);
        let b = vertex_with_index(&mesh, positions[1]);
        let h = conn.at_vertex(a).halfedge_to(b).end();

        // A purely vertical edge has zero extent in x and y
        assert_eq!(conn.edge_length(&mesh.positions, h), 2.0);
        assert_eq!(
            conn.edge_midpoint(&mesh.positions, h),
            DVec3::new(0.0, 0.0, 1.0)
        );
    }

    #[test]
    fn face_normal_encodes_orientation_and_area() {
        let mesh = two_triangle_square();
        let conn = &mesh.connectivity;
        for (f, _) in conn.iter_faces() {
            let n = conn.face_normal(&mesh.positions, f);
            // Both triangles are CCW in the XY plane and have area 1/2
            assert_eq!(n, DVec3::new(0.0, 0.0, 1.0));
        }
    }

    #[test]
    fn vertex_normal_averages_the_ring() {
        let mesh = two_triangle_square();
        let conn = &mesh.connectivity;
        for (v, _) in conn.iter_vertices() {
            assert_eq!(
                conn.vertex_normal(&mesh.positions, v),
                DVec3::new(0.0, 0.0, 1.0)
            );
        }
    }

    #[test]
    fn boundary_predicates() {
        let mesh = two_triangle_square();
        let conn = &mesh.connectivity;

        let a = vertex_with_index(&mesh, DVec3::new(0.0, 0.0, 0.0));
        let c = vertex_with_index(&mesh, DVec3::new(1.0, 1.0, 0.0));
        let diagonal = conn.at_vertex(a).halfedge_to(c).end();

        // The diagonal is interior, but every vertex of a two-triangle square
        // lies on the boundary.
        assert!(!conn.is_boundary_edge(diagonal));
        assert!(conn.has_boundary_vertex(diagonal));

        let b = vertex_with_index(&mesh, DVec3::new(1.0, 0.0, 0.0));
        let rim = conn.at_vertex(a).halfedge_to(b).end();
        assert!(conn.is_boundary_edge(rim));
    }

    #[test]
    fn orientation_is_positive_seen_from_below() {
        let positions = [
            DVec3::new(0.0, 0.0, 1.0),
            DVec3::new(1.0, 0.0, 1.0),
            DVec3::new(0.0, 1.0, 1.0),
        ];
        let mesh = HalfEdgeMesh::build_from_triangles(&positions, &[[0u32, 1, 2]]).unwrap();
        let conn = &mesh.connectivity;
        let (f, _) = conn.iter_faces().next().unwrap();

        assert!(conn.face_orientation(&mesh.positions, f, DVec3::ZERO) > 0.0);
        // A reference point in the triangle's plane is degenerate
        assert_eq!(
            conn.face_orientation(&mesh.positions, f, DVec3::new(5.0, 5.0, 1.0)),
            0.0
        );
    }

    #[test]
    fn length_stats_count_geometric_edges_once() {
        let mesh = two_triangle_square();
        let stats = mesh.connectivity.edge_length_stats(&mesh.positions);

        // 4 rim edges of length 1 plus the sqrt(2) diagonal
        assert_eq!(stats.count, 5);
        assert_eq!(stats.min, 1.0);
        assert_eq!(stats.max, 2.0f64.sqrt());
        assert!((stats.mean - (4.0 + 2.0f64.sqrt()) / 5.0).abs() < 1e-12);
    }
}
