// Copyright (C) 2023 setzer22 and contributors
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use smallvec::smallvec;

use crate::prelude::*;
use crate::sizing::SizingField;

/// An edge longer than this, relative to the local sizing field, gets split.
pub const LONG_EDGE_RATIO: f64 = std::f64::consts::SQRT_2;

/// An edge shorter than this, relative to the local sizing field, gets
/// collapsed. Together with [`LONG_EDGE_RATIO`] this forms the stable band of
/// the incremental remesher: neither operation undoes the other.
pub const SHORT_EDGE_RATIO: f64 = std::f64::consts::SQRT_2 / 2.0;

/// A split is skipped when any of the edges it would create toward the
/// opposite vertices falls under this ratio.
pub const SPLIT_GUARD_RATIO: f64 = 0.6;

/// What [`check_split`] decided for an edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SplitDecision {
    /// The edge stays as it is.
    Keep,
    /// The edge is interior and long: split its two faces into four.
    Interior,
    /// The edge lies on the boundary and is long: split its single bounded
    /// face into two.
    Boundary,
}

/// The outcome of a committed collapse. The removed halfedge handles let the
/// driver skip queued candidates that no longer exist.
#[derive(Debug, Clone)]
pub struct CollapsedEdge {
    /// The surviving vertex, now located at the removed endpoint's position.
    pub vertex: VertexId,
    pub removed_halfedges: SVecN<HalfEdgeId, 6>,
}

/// Decides whether `h` should be split. Let L be the edge length and l the
/// sizing field sampled at the edge midpoint:
///
/// - `L / l < sqrt(2)`: keep.
/// - Any new edge toward an opposite vertex would be shorter than `0.6 * l`:
///   keep, the split would immediately create collapse candidates.
/// - Otherwise split, on the bounded side only when the edge is boundary.
pub fn check_split<S: SizingField>(
    conn: &MeshConnectivity,
    positions: &Positions,
    sizing: &S,
    h: HalfEdgeId,
) -> Result<SplitDecision> {
    let length = conn.edge_length(positions, h);
    let midpoint = conn.edge_midpoint(positions, h);
    let target = sizing.size_at(midpoint);

    if length / target < LONG_EDGE_RATIO {
        return Ok(SplitDecision::Keep);
    }

    if conn.is_boundary_edge(h) {
        // Only the bounded side gains an edge toward its opposite vertex
        let inner = bounded_side(conn, h)?;
        let r = conn.at_halfedge(inner).next().vertex().try_end()?;
        if positions[r].distance(midpoint) / target < SPLIT_GUARD_RATIO {
            Ok(SplitDecision::Keep)
        } else {
            Ok(SplitDecision::Boundary)
        }
    } else {
        let r = conn.at_halfedge(h).next().vertex().try_end()?;
        let s = conn.at_halfedge(h).twin().next().vertex().try_end()?;
        let shortest = positions[r]
            .distance(midpoint)
            .min(positions[s].distance(midpoint));
        if shortest / target < SPLIT_GUARD_RATIO {
            Ok(SplitDecision::Keep)
        } else {
            Ok(SplitDecision::Interior)
        }
    }
}

/// Splits the interior edge spanned by `h` at its midpoint, replacing the two
/// incident triangles by four. Allocates the midpoint vertex, six halfedges
/// and two faces; `h` and its twin keep spanning the half of the edge on
/// their origin's side. Returns the new vertex.
pub fn split_edge(
    conn: &mut MeshConnectivity,
    positions: &mut Positions,
    h: HalfEdgeId,
) -> Result<VertexId> {
    // Collect the current setup. With q the origin of h and p its
    // destination, the two faces are (q, p, r) above and (p, q, s) below.
    let t = conn.at_halfedge(h).twin().try_end()?;
    let tr = conn.at_halfedge(h).next().try_end()?;
    let tl = conn.at_halfedge(tr).next().try_end()?;
    let bl = conn.at_halfedge(t).next().try_end()?;
    let br = conn.at_halfedge(bl).next().try_end()?;

    let p = conn.at_halfedge(h).vertex().try_end()?;
    let r = conn.at_halfedge(tr).vertex().try_end()?;
    let s = conn.at_halfedge(bl).vertex().try_end()?;

    let f1 = conn.at_halfedge(h).face().try_end()?;
    let f4 = conn.at_halfedge(t).face().try_end()?;

    // The new vertex sits at the middle of the edge. Only the sign of a
    // vertex index is meaningful after remeshing has started, so any fresh
    // non-negative value works here.
    let midpoint = conn.edge_midpoint(positions, h);
    let index = conn.num_vertices() as i32;
    let m = conn.alloc_vertex(positions, midpoint, None, index);

    // Six new halfedges and two new faces complete the four-triangle fan
    // around m.
    let a = conn.alloc_halfedge(HalfEdge::default());
    let b = conn.alloc_halfedge(HalfEdge::default());
    let c = conn.alloc_halfedge(HalfEdge::default());
    let d = conn.alloc_halfedge(HalfEdge::default());
    let e = conn.alloc_halfedge(HalfEdge::default());
    let f = conn.alloc_halfedge(HalfEdge::default());

    let f2 = conn.alloc_face(None);
    let f3 = conn.alloc_face(None);

    // (q, m, r) reuses f1 with h, a, tl
    conn[a] = HalfEdge {
        next: Some(tl),
        twin: Some(b),
        vertex: Some(r),
        face: Some(f1),
    };
    // (m, p, r) is the new f2 with c, tr, b
    conn[b] = HalfEdge {
        next: Some(c),
        twin: Some(a),
        vertex: Some(m),
        face: Some(f2),
    };
    conn[c] = HalfEdge {
        next: Some(tr),
        twin: Some(d),
        vertex: Some(p),
        face: Some(f2),
    };
    // (p, m, s) is the new f3 with d, e, br
    conn[d] = HalfEdge {
        next: Some(e),
        twin: Some(c),
        vertex: Some(m),
        face: Some(f3),
    };
    conn[e] = HalfEdge {
        next: Some(br),
        twin: Some(f),
        vertex: Some(s),
        face: Some(f3),
    };
    // (m, q, s) reuses f4 with t, bl, f
    conn[f] = HalfEdge {
        next: Some(t),
        twin: Some(e),
        vertex: Some(m),
        face: Some(f4),
    };

    // The split pair now spans the q side of the original edge
    conn[h].next = Some(a);
    conn[h].vertex = Some(m);

    conn[tr].next = Some(b);
    conn[tr].face = Some(f2);
    conn[bl].next = Some(f);
    conn[br].next = Some(d);
    conn[br].face = Some(f3);

    // p's outgoing anchor may have been the twin, which now leaves from m
    conn[m].halfedge = Some(a);
    conn[p].halfedge = Some(d);

    conn[f1].halfedge = Some(h);
    conn[f2].halfedge = Some(b);
    conn[f3].halfedge = Some(d);
    conn[f4].halfedge = Some(t);

    Ok(m)
}

/// Splits a boundary edge at its midpoint. The bounded side is divided into
/// two triangles and the boundary loop is re-linked through a new boundary
/// halfedge, so it remains a single cycle spanning the same segment. The new
/// vertex is flagged as a boundary vertex.
pub fn split_boundary_edge(
    conn: &mut MeshConnectivity,
    positions: &mut Positions,
    h: HalfEdgeId,
) -> Result<VertexId> {
    // Either halfedge of the pair is accepted; work happens on the bounded
    // side.
    let inner = bounded_side(conn, h)?;
    let t = conn.at_halfedge(inner).twin().try_end()?;
    if conn.at_halfedge(t).face_or_boundary()?.is_some() {
        bail!("split_boundary_edge: edge {h:?} is not on the boundary");
    }

    let tr = conn.at_halfedge(inner).next().try_end()?;
    let tl = conn.at_halfedge(tr).next().try_end()?;
    let p = conn.at_halfedge(inner).vertex().try_end()?;
    let r = conn.at_halfedge(tr).vertex().try_end()?;
    let f1 = conn.at_halfedge(inner).face().try_end()?;

    // The boundary halfedge that flows into t; found by walking the boundary
    // loop before any pointers change.
    let t_prev = conn.at_halfedge(t).previous().try_end()?;

    let midpoint = conn.edge_midpoint(positions, inner);
    let m = conn.alloc_vertex(positions, midpoint, None, BOUNDARY_VERTEX_INDEX);

    let a = conn.alloc_halfedge(HalfEdge::default());
    let b = conn.alloc_halfedge(HalfEdge::default());
    let c = conn.alloc_halfedge(HalfEdge::default());
    let d = conn.alloc_halfedge(HalfEdge::default());

    let f2 = conn.alloc_face(None);

    // (q, m, r) reuses f1 with inner, a, tl
    conn[a] = HalfEdge {
        next: Some(tl),
        twin: Some(b),
        vertex: Some(r),
        face: Some(f1),
    };
    // (m, p, r) is the new f2 with c, tr, b
    conn[b] = HalfEdge {
        next: Some(c),
        twin: Some(a),
        vertex: Some(m),
        face: Some(f2),
    };
    conn[c] = HalfEdge {
        next: Some(tr),
        twin: Some(d),
        vertex: Some(p),
        face: Some(f2),
    };
    // d continues the boundary loop from p to m, flowing into t
    conn[d] = HalfEdge {
        next: Some(t),
        twin: Some(c),
        vertex: Some(m),
        face: None,
    };

    conn[inner].next = Some(a);
    conn[inner].vertex = Some(m);

    conn[tr].next = Some(b);
    conn[tr].face = Some(f2);
    conn[t_prev].next = Some(d);

    conn[m].halfedge = Some(a);
    conn[p].halfedge = Some(tr);

    conn[f1].halfedge = Some(inner);
    conn[f2].halfedge = Some(b);

    Ok(m)
}

/// Decides whether `h` should be collapsed: never for boundary edges or
/// edges touching a boundary vertex, otherwise when the edge is shorter than
/// `sqrt(2)/2` times the sizing field at its midpoint.
pub fn check_collapse<S: SizingField>(
    conn: &MeshConnectivity,
    positions: &Positions,
    sizing: &S,
    h: HalfEdgeId,
) -> bool {
    if conn.is_boundary_edge(h) || conn.has_boundary_vertex(h) {
        return false;
    }

    let length = conn.edge_length(positions, h);
    let target = sizing.size_at(conn.edge_midpoint(positions, h));
    length / target < SHORT_EDGE_RATIO
}

/// Collapses the edge spanned by `h`, merging its origin `p` into its
/// destination `q`. The survivor `q` takes `p`'s position; two faces, six
/// halfedges and one vertex are removed.
///
/// Before committing, every face that will remain around `q` is tested with
/// the exact orient3d predicate against `reference`. If moving `q` flips or
/// degenerates any of them the collapse is abandoned, the mesh is left
/// untouched and `Ok(None)` is returned.
pub fn collapse_edge(
    conn: &mut MeshConnectivity,
    positions: &mut Positions,
    h: HalfEdgeId,
    reference: DVec3,
) -> Result<Option<CollapsedEdge>> {
    let t = conn.at_halfedge(h).twin().try_end()?;
    let q = conn.at_halfedge(h).vertex().try_end()?;
    let p = conn.at_halfedge(t).vertex().try_end()?;
    let f0 = conn.at_halfedge(h).face().try_end()?;
    let f1 = conn.at_halfedge(t).face().try_end()?;

    // In the face (p, q, r) the surviving halfedge a spans the edge that
    // does not touch p; the pair over (r, p) is discarded and a takes the
    // slot of its outer half. Symmetrically for (q, p, s) below.
    let a = conn.at_halfedge(h).next().try_end()?;
    let c_in = conn.at_halfedge(a).next().try_end()?;
    let c_out = conn.at_halfedge(c_in).twin().try_end()?;
    let d_in = conn.at_halfedge(t).next().try_end()?;
    let b = conn.at_halfedge(d_in).next().try_end()?;
    let d_out = conn.at_halfedge(d_in).twin().try_end()?;

    let r = conn.at_halfedge(a).vertex().try_end()?;
    let s = conn.at_halfedge(d_in).vertex().try_end()?;
    let a_twin = conn.at_halfedge(a).twin().try_end()?;

    // Ring snapshots, taken while the connectivity is still intact
    let q_ring_faces = conn.at_vertex(q).adjacent_faces()?;
    let p_incoming = conn.at_vertex(p).incoming_halfedges()?;

    // Tentatively move q onto p and verify that no surviving ring face flips
    // or degenerates. The two faces being removed are exempt.
    let q_original = positions[q];
    positions[q] = positions[p];
    for face in q_ring_faces.iter_cpy() {
        if face == f0 || face == f1 {
            continue;
        }
        if conn.face_orientation(positions, face, reference) <= 0.0 {
            positions[q] = q_original;
            return Ok(None);
        }
    }

    // Every halfedge that pointed at p now points at q. The halfedge being
    // removed is skipped; its destination no longer matters.
    for incoming in p_incoming.iter_cpy() {
        if incoming != t {
            conn[incoming].vertex = Some(q);
        }
    }

    // Bridge the upper rabbit ear: a replaces c_out in the neighbouring face
    let c_next = conn.at_halfedge(c_out).next().try_end()?;
    let c_prev = conn.at_halfedge(c_next).next().try_end()?;
    let fc = conn.at_halfedge(c_out).face().try_end()?;
    conn[a].next = Some(c_next);
    conn[a].face = Some(fc);
    conn[fc].halfedge = Some(a);
    conn[c_prev].next = Some(a);

    // And the lower one: b replaces d_out. When p had valence three both
    // ears bridge into the same face, which is why the d side is re-read
    // only after the a side has been spliced.
    let d_next = conn.at_halfedge(d_out).next().try_end()?;
    let d_prev = conn.at_halfedge(d_next).next().try_end()?;
    let fd = conn.at_halfedge(d_out).face().try_end()?;
    conn[b].next = Some(d_next);
    conn[b].face = Some(fd);
    conn[fd].halfedge = Some(b);
    conn[d_prev].next = Some(b);

    // Drop the collapsed pair, both inner edges with their outer partners,
    // the two faces, and p itself
    conn.remove_halfedge(h);
    conn.remove_halfedge(t);
    conn.remove_halfedge(c_in);
    conn.remove_halfedge(c_out);
    conn.remove_halfedge(d_in);
    conn.remove_halfedge(d_out);
    conn.remove_face(f0);
    conn.remove_face(f1);
    conn.remove_vertex(p);
    positions.remove(p);

    // The surviving corner vertices may have anchored on a removed halfedge
    conn[q].halfedge = Some(a);
    conn[r].halfedge = Some(a_twin);
    conn[s].halfedge = Some(b);

    Ok(Some(CollapsedEdge {
        vertex: q,
        removed_halfedges: smallvec![h, t, c_in, c_out, d_in, d_out],
    }))
}

/// Of the two halfedges spanning an edge, returns the one with a bounded
/// face.
fn bounded_side(conn: &MeshConnectivity, h: HalfEdgeId) -> Result<HalfEdgeId> {
    if conn.at_halfedge(h).face_or_boundary()?.is_some() {
        Ok(h)
    } else {
        Ok(conn.at_halfedge(h).twin().try_end()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::halfedge::primitives::{Plane, UVSphere};
    use crate::mesh::halfedge::validation;
    use crate::sizing::UniformSizing;

    fn interior_halfedge(mesh: &HalfEdgeMesh) -> HalfEdgeId {
        mesh.connectivity
            .iter_halfedges()
            .map(|(h, _)| h)
            .find(|&h| !mesh.connectivity.is_boundary_edge(h))
            .expect("mesh has no interior edge")
    }

    fn boundary_halfedge(mesh: &HalfEdgeMesh) -> HalfEdgeId {
        mesh.connectivity
            .iter_halfedges()
            .map(|(h, _)| h)
            .find(|&h| mesh.connectivity.is_boundary_edge(h))
            .expect("mesh has no boundary edge")
    }

    #[test]
    fn check_split_applies_the_length_band() {
        let mesh = Plane::build(DVec3::ZERO, 1.0, 1);
        let conn = &mesh.connectivity;
        let h = interior_halfedge(&mesh);

        // The sqrt(2) diagonal is not long enough for a target of 1.0...
        assert_eq!(
            check_split(conn, &mesh.positions, &UniformSizing::new(1.0), h).unwrap(),
            SplitDecision::Keep
        );
        // ...but clearly long for a target of 0.5
        assert_eq!(
            check_split(conn, &mesh.positions, &UniformSizing::new(0.5), h).unwrap(),
            SplitDecision::Interior
        );

        let rim = boundary_halfedge(&mesh);
        assert_eq!(
            check_split(conn, &mesh.positions, &UniformSizing::new(0.5), rim).unwrap(),
            SplitDecision::Boundary
        );
    }

    #[test]
    fn check_split_guards_against_degenerate_edges() {
        // A long edge whose opposite vertex hugs the midpoint: splitting
        // would immediately create a collapse candidate
        let positions = [
            DVec3::new(0.0, 0.0, 0.0),
            DVec3::new(2.0, 0.0, 0.0),
            DVec3::new(1.0, 0.05, 0.0),
            DVec3::new(1.0, -1.0, 0.0),
        ];
        let mesh =
            HalfEdgeMesh::build_from_triangles(&positions, &[[0u32, 1, 2], [1, 0, 3]]).unwrap();
        let conn = &mesh.connectivity;

        let a = conn
            .iter_vertices()
            .find(|(v, _)| mesh.positions[*v] == positions[0])
            .map(|(v, _)| v)
            .unwrap();
        let b = conn
            .iter_vertices()
            .find(|(v, _)| mesh.positions[*v] == positions[1])
            .map(|(v, _)| v)
            .unwrap();
        let h = conn.at_vertex(a).halfedge_to(b).end();

        assert_eq!(
            check_split(conn, &mesh.positions, &UniformSizing::new(1.0), h).unwrap(),
            SplitDecision::Keep
        );
    }

    #[test]
    fn interior_split_counts_and_invariants() {
        // Lifted off the origin so the orientation reference is not coplanar
        let mut mesh = Plane::build(DVec3::new(0.0, 0.0, 1.0), 1.0, 2);
        let (num_v, num_h, num_f) = (
            mesh.connectivity.num_vertices(),
            mesh.connectivity.num_halfedges(),
            mesh.connectivity.num_faces(),
        );

        let h = interior_halfedge(&mesh);
        let midpoint = mesh.connectivity.edge_midpoint(&mesh.positions, h);
        let m = split_edge(&mut mesh.connectivity, &mut mesh.positions, h).unwrap();

        assert_eq!(mesh.positions[m], midpoint);
        assert!(!mesh.connectivity[m].is_boundary());
        assert_eq!(mesh.connectivity.num_vertices(), num_v + 1);
        assert_eq!(mesh.connectivity.num_halfedges(), num_h + 6);
        assert_eq!(mesh.connectivity.num_faces(), num_f + 2);

        validation::check_connectivity(&mesh.connectivity).unwrap();
        validation::check_orientation(&mesh.connectivity, &mesh.positions, DVec3::ZERO).unwrap();
        // The new vertex has valence 4
        assert_eq!(
            mesh.connectivity
                .at_vertex(m)
                .outgoing_halfedges()
                .unwrap()
                .len(),
            4
        );
    }

    #[test]
    fn boundary_split_counts_and_invariants() {
        // Lifted off the origin so the orientation reference is not coplanar
        let mut mesh = Plane::build(DVec3::new(0.0, 0.0, 1.0), 1.0, 2);
        let (num_v, num_h, num_f) = (
            mesh.connectivity.num_vertices(),
            mesh.connectivity.num_halfedges(),
            mesh.connectivity.num_faces(),
        );

        let h = boundary_halfedge(&mesh);
        let m = split_boundary_edge(&mut mesh.connectivity, &mut mesh.positions, h).unwrap();

        assert!(mesh.connectivity[m].is_boundary());
        assert_eq!(mesh.connectivity[m].index(), BOUNDARY_VERTEX_INDEX);
        assert_eq!(mesh.connectivity.num_vertices(), num_v + 1);
        assert_eq!(mesh.connectivity.num_halfedges(), num_h + 4);
        assert_eq!(mesh.connectivity.num_faces(), num_f + 1);

        validation::check_connectivity(&mesh.connectivity).unwrap();
        validation::check_orientation(&mesh.connectivity, &mesh.positions, DVec3::ZERO).unwrap();
    }

    #[test]
    fn collapse_counts_and_invariants() {
        let mut mesh = UVSphere::build(DVec3::ZERO, 8, 8, 1.0);
        let (num_v, num_h, num_f) = (
            mesh.connectivity.num_vertices(),
            mesh.connectivity.num_halfedges(),
            mesh.connectivity.num_faces(),
        );

        let h = interior_halfedge(&mesh);
        let (p, q) = {
            let conn = &mesh.connectivity;
            let (src, dst) = conn.at_halfedge(h).src_dst_pair().unwrap();
            (mesh.positions[src], dst)
        };

        let collapsed = collapse_edge(&mut mesh.connectivity, &mut mesh.positions, h, DVec3::ZERO)
            .unwrap()
            .expect("collapse on a round sphere should not invert anything");

        assert_eq!(collapsed.vertex, q);
        assert_eq!(collapsed.removed_halfedges.len(), 6);
        // The survivor moved onto the removed endpoint
        assert_eq!(mesh.positions[q], p);
        assert_eq!(mesh.connectivity.num_vertices(), num_v - 1);
        assert_eq!(mesh.connectivity.num_halfedges(), num_h - 6);
        assert_eq!(mesh.connectivity.num_faces(), num_f - 2);
        for removed in collapsed.removed_halfedges.iter_cpy() {
            assert!(!mesh.connectivity.halfedge_exists(removed));
        }

        validation::check_connectivity(&mesh.connectivity).unwrap();
        validation::check_orientation(&mesh.connectivity, &mesh.positions, DVec3::ZERO).unwrap();
    }

    #[test]
    fn check_collapse_refuses_boundary() {
        let mesh = Plane::build(DVec3::ZERO, 1.0, 2);
        let conn = &mesh.connectivity;
        let tiny = UniformSizing::new(1000.0);

        // Every edge is absurdly short against that sizing, but the rim and
        // everything touching it must still refuse
        let rim = boundary_halfedge(&mesh);
        assert!(!check_collapse(conn, &mesh.positions, &tiny, rim));

        // A 3x3 grid has a single interior vertex and no interior edge away
        // from the boundary, so every candidate is refused
        for (h, _) in conn.iter_halfedges() {
            assert!(!check_collapse(conn, &mesh.positions, &tiny, h));
        }
    }
}
