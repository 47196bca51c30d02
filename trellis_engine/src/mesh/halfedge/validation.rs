// Copyright (C) 2023 setzer22 and contributors
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use crate::prelude::*;

/// Checks the structural invariants of the halfedge graph:
///
/// - twin involution: `h.twin.twin == h`, and the two endpoints differ
/// - triangle closure: three `next` steps return to `h` within a single face
/// - ring closure: the fan orbit around a vertex enumerates each outgoing
///   halfedge exactly once
/// - boundary structure: a boundary halfedge's twin is bounded, and boundary
///   loops are closed under `next`
///
/// Any violation is a programming bug in an operator, so callers are
/// expected to fail fast on the returned error, which names the broken
/// invariant and the offending element.
pub fn check_connectivity(conn: &MeshConnectivity) -> Result<()> {
    for (h, _) in conn.iter_halfedges() {
        let t = conn
            .at_halfedge(h)
            .twin()
            .try_end()
            .map_err(|_| anyhow!("twin involution: {h:?} has no live twin"))?;
        let t_t = conn
            .at_halfedge(t)
            .twin()
            .try_end()
            .map_err(|_| anyhow!("twin involution: twin of {h:?} has no live twin"))?;
        if t_t != h {
            bail!("twin involution: {h:?}.twin.twin resolves to {t_t:?}");
        }

        let src = conn.at_halfedge(h).src_vertex().try_end()?;
        let dst = conn.at_halfedge(h).dst_vertex().try_end()?;
        if src == dst {
            bail!("twin involution: {h:?} starts and ends at {src:?}");
        }
        if !conn.vertex_exists(src) || !conn.vertex_exists(dst) {
            bail!("liveness: {h:?} references a removed vertex");
        }

        match conn.at_halfedge(h).face_or_boundary()? {
            Some(face) => {
                let mut walk = h;
                for _ in 0..3 {
                    if conn.at_halfedge(walk).face_or_boundary()? != Some(face) {
                        bail!("triangle closure: {h:?} visits more than one face");
                    }
                    walk = conn.at_halfedge(walk).next().try_end()?;
                }
                if walk != h {
                    bail!("triangle closure: {h:?} does not close after three next steps");
                }
            }
            None => {
                // Boundary halfedges chain into boundary halfedges, and their
                // twin is always on a bounded face
                if conn.at_halfedge(h).twin().face_or_boundary()?.is_none() {
                    bail!("boundary structure: {h:?} and its twin are both unbounded");
                }
                let next = conn.at_halfedge(h).next().try_end()?;
                if conn.at_halfedge(next).face_or_boundary()?.is_some() {
                    bail!("boundary structure: boundary loop broken after {h:?}");
                }
            }
        }
    }

    for (f, _) in conn.iter_faces() {
        let edges = conn
            .at_face(f)
            .halfedges()
            .map_err(|err| anyhow!("triangle closure: face {f:?} has a broken loop: {err}"))?;
        if edges.len() != 3 {
            bail!("triangle closure: face {f:?} has {} edges", edges.len());
        }
    }

    // Count the outgoing halfedges per vertex, then compare against each fan
    // orbit
    let mut outgoing_count = HashMap::<VertexId, usize>::new();
    for (h, _) in conn.iter_halfedges() {
        let src = conn.at_halfedge(h).src_vertex().try_end()?;
        *outgoing_count.entry(src).or_insert(0) += 1;
    }

    for (v, _) in conn.iter_vertices() {
        let h0 = conn
            .at_vertex(v)
            .halfedge()
            .try_end()
            .map_err(|_| anyhow!("ring closure: {v:?} has no outgoing halfedge"))?;
        if conn.at_halfedge(h0).src_vertex().try_end()? != v {
            bail!("ring closure: {v:?} anchors on a halfedge that does not leave from it");
        }

        let mut seen = HashSet::new();
        let mut h = h0;
        loop {
            if seen.len() > MAX_LOOP_ITERATIONS {
                bail!("ring closure: the fan around {v:?} does not close");
            }
            if conn.at_halfedge(h).src_vertex().try_end()? != v {
                bail!("ring closure: the fan around {v:?} left the vertex at {h:?}");
            }
            if !seen.insert(h) {
                bail!("ring closure: the fan around {v:?} repeats {h:?} before closing");
            }
            h = conn.at_halfedge(h).cycle_around_fan().try_end()?;
            if h == h0 {
                break;
            }
        }

        if seen.len() != outgoing_count.get(&v).copied().unwrap_or(0) {
            bail!(
                "ring closure: the fan around {v:?} visits {} of its {} outgoing halfedges",
                seen.len(),
                outgoing_count.get(&v).copied().unwrap_or(0)
            );
        }
    }

    Ok(())
}

/// Checks that every bounded face keeps a strictly positive orientation
/// against the reference point, via the exact orient3d predicate. Only
/// meaningful for meshes that enclose (or consistently face away from) the
/// reference, like the analytic shapes the remesher is pointed at.
pub fn check_orientation(
    conn: &MeshConnectivity,
    positions: &Positions,
    reference: DVec3,
) -> Result<()> {
    for (f, _) in conn.iter_faces() {
        let orientation = conn.face_orientation(positions, f, reference);
        if orientation <= 0.0 {
            bail!("orientation: face {f:?} is degenerate or inverted against the reference point");
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::halfedge::primitives::{Plane, UVSphere};

    #[test]
    fn accepts_well_formed_meshes() {
        let sphere = UVSphere::build(DVec3::ZERO, 8, 6, 1.0);
        check_connectivity(&sphere.connectivity).unwrap();
        check_orientation(&sphere.connectivity, &sphere.positions, DVec3::ZERO).unwrap();

        let plane = Plane::build(DVec3::new(0.0, 0.0, 1.0), 1.0, 3);
        check_connectivity(&plane.connectivity).unwrap();
        check_orientation(&plane.connectivity, &plane.positions, DVec3::ZERO).unwrap();
    }

    #[test]
    fn detects_a_broken_twin() {
        let mut mesh = UVSphere::build(DVec3::ZERO, 6, 4, 1.0);
        let (h, _) = mesh.connectivity.iter_halfedges().next().unwrap();
        let other = mesh
            .connectivity
            .iter_halfedges()
            .map(|(h2, _)| h2)
            .find(|&h2| {
                let old_twin = mesh.connectivity.at_halfedge(h).twin().end();
                h2 != h && h2 != old_twin
            })
            .unwrap();
        mesh.connectivity[h].twin = Some(other);

        let err = check_connectivity(&mesh.connectivity).unwrap_err();
        assert!(err.to_string().contains("twin involution"));
    }

    #[test]
    fn detects_a_broken_face_loop() {
        let mut mesh = UVSphere::build(DVec3::ZERO, 6, 4, 1.0);
        let (h, _) = mesh.connectivity.iter_halfedges().next().unwrap();
        let skip = mesh.connectivity.at_halfedge(h).next().next().try_end().unwrap();
        mesh.connectivity[h].next = Some(skip);

        assert!(check_connectivity(&mesh.connectivity).is_err());
    }

    #[test]
    fn detects_an_inverted_face() {
        let mut mesh = UVSphere::build(DVec3::ZERO, 6, 4, 1.0);
        // Push a vertex through the center, far out the other side
        let (v, _) = mesh.connectivity.iter_vertices().next().unwrap();
        mesh.positions[v] = mesh.positions[v] * -3.0;

        assert!(check_orientation(&mesh.connectivity, &mesh.positions, DVec3::ZERO).is_err());
    }
}
