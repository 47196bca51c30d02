// Copyright (C) 2023 setzer22 and contributors
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use serde::{Deserialize, Serialize};

use crate::prelude::*;
use crate::sizing::{SizingField, SurfaceField};

use crate::mesh::halfedge::edit_ops::{self, SplitDecision};

/// Operation counts accumulated over the passes of a remeshing run. Rejected
/// collapses are the ones abandoned by the orientation guard; they are not
/// errors, just part of the bookkeeping.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemeshStats {
    pub splits: usize,
    pub boundary_splits: usize,
    pub collapses: usize,
    pub rejected_collapses: usize,
}

impl std::fmt::Display for RemeshStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} splits, {} boundary splits, {} collapses ({} rejected)",
            self.splits, self.boundary_splits, self.collapses, self.rejected_collapses
        )
    }
}

/// The incremental remesher. Borrows a mesh and a sizing field and drives
/// the local operators over it: long edges get split, short edges get
/// collapsed, and vertices are relaxed tangentially toward the centroid of
/// their one-ring. When a surface is attached, vertices are pulled back onto
/// it at the end of every iteration.
pub struct Remesher<'a, S> {
    mesh: &'a mut HalfEdgeMesh,
    sizing: S,
    projection: Option<&'a dyn SurfaceField>,
    reference_point: DVec3,
}

impl<'a, S: SizingField> Remesher<'a, S> {
    pub fn new(mesh: &'a mut HalfEdgeMesh, sizing: S) -> Self {
        Self {
            mesh,
            sizing,
            projection: None,
            reference_point: DVec3::ZERO,
        }
    }

    /// Attaches an implicit surface; vertices are projected back onto it
    /// after tangential relaxation.
    pub fn with_projection(mut self, surface: &'a dyn SurfaceField) -> Self {
        self.projection = Some(surface);
        self
    }

    /// Sets the reference point of the collapse orientation guard. All faces
    /// must have positive orient3d sign against it; the origin is the right
    /// choice for the analytic shapes centered there.
    pub fn with_reference_point(mut self, reference_point: DVec3) -> Self {
        self.reference_point = reference_point;
        self
    }

    /// Runs the full remeshing pipeline `num_iterations` times. Each
    /// iteration splits all long edges, collapses all short edges, relaxes
    /// vertices once, and projects back onto the attached surface, in that
    /// order. Every sub-pass completes before the next begins.
    #[profiling::function]
    pub fn incremental_relaxation(&mut self, num_iterations: usize) -> Result<RemeshStats> {
        let mut stats = RemeshStats::default();

        for iteration in 0..num_iterations {
            let (splits, boundary_splits) = self.split_edges()?;
            let (collapses, rejected_collapses) = self.collapse_edges()?;
            self.tangential_relaxation(1)?;
            self.project_to_surface();
            self.assert_invariants();

            stats.splits += splits;
            stats.boundary_splits += boundary_splits;
            stats.collapses += collapses;
            stats.rejected_collapses += rejected_collapses;

            let lengths = self.mesh.connectivity.edge_length_stats(&self.mesh.positions);
            log::debug!(
                "remesh iteration {iteration}: {splits} splits, {boundary_splits} boundary splits, \
                 {collapses} collapses ({rejected_collapses} rejected), edge length \
                 min/mean/max {:.4}/{:.4}/{:.4} over {} edges",
                lengths.min,
                lengths.mean,
                lengths.max,
                lengths.count
            );
        }

        let (center, size) = self.mesh.bounding_box();
        log::debug!(
            "incremental relaxation done: {stats}; bounding box center {center:?}, size {size:?}"
        );
        Ok(stats)
    }

    /// Splits every edge the decision policy marks as long. The candidate
    /// set is snapshot before the pass; edges created by a split are not
    /// revisited until the next pass, where their halved length disqualifies
    /// them anyway.
    #[profiling::function]
    pub fn split_edges(&mut self) -> Result<(usize, usize)> {
        let mesh = &mut *self.mesh;
        let snapshot: Vec<HalfEdgeId> =
            mesh.connectivity.iter_halfedges().map(|(h, _)| h).collect();

        let mut splits = 0;
        let mut boundary_splits = 0;
        for h in snapshot {
            let decision =
                edit_ops::check_split(&mesh.connectivity, &mesh.positions, &self.sizing, h)?;
            match decision {
                SplitDecision::Keep => {}
                SplitDecision::Interior => {
                    edit_ops::split_edge(&mut mesh.connectivity, &mut mesh.positions, h)?;
                    splits += 1;
                }
                SplitDecision::Boundary => {
                    edit_ops::split_boundary_edge(&mut mesh.connectivity, &mut mesh.positions, h)?;
                    boundary_splits += 1;
                }
            }
        }

        log::trace!("split pass: {splits} interior, {boundary_splits} boundary");
        Ok((splits, boundary_splits))
    }

    /// Collapses every edge the decision policy marks as short, unless the
    /// orientation guard rejects it. The candidate snapshot is taken before
    /// any collapse runs; a collapse removes six halfedges, so every
    /// dequeued candidate is checked against the removed set (and against
    /// the arena, whose generational handles expire on removal) before it is
    /// dereferenced.
    #[profiling::function]
    pub fn collapse_edges(&mut self) -> Result<(usize, usize)> {
        let mesh = &mut *self.mesh;
        let snapshot: Vec<HalfEdgeId> =
            mesh.connectivity.iter_halfedges().map(|(h, _)| h).collect();

        let mut removed = HashSet::<HalfEdgeId>::new();
        let mut collapses = 0;
        let mut rejected_collapses = 0;
        for h in snapshot {
            if removed.contains(&h) || !mesh.connectivity.halfedge_exists(h) {
                continue;
            }
            if !edit_ops::check_collapse(&mesh.connectivity, &mesh.positions, &self.sizing, h) {
                continue;
            }
            match edit_ops::collapse_edge(
                &mut mesh.connectivity,
                &mut mesh.positions,
                h,
                self.reference_point,
            )? {
                Some(collapsed) => {
                    collapses += 1;
                    removed.extend(collapsed.removed_halfedges.iter_cpy());
                }
                None => rejected_collapses += 1,
            }
        }

        log::trace!("collapse pass: {collapses} collapsed, {rejected_collapses} rejected");
        Ok((collapses, rejected_collapses))
    }

    /// Moves every interior vertex toward the centroid of its one-ring,
    /// constrained to its tangent plane: `p' = q + <n, p - q> n` with q the
    /// ring centroid and n the normalised ring normal. New positions are
    /// computed from a snapshot of the old ones and committed together, so
    /// the result does not depend on vertex order. Boundary vertices and
    /// vertices with a degenerate ring normal stay where they are.
    #[profiling::function]
    pub fn tangential_relaxation(&mut self, num_iterations: usize) -> Result<()> {
        for _ in 0..num_iterations {
            self.relax_vertices()?;
        }
        Ok(())
    }

    fn relax_vertices(&mut self) -> Result<()> {
        let mesh = &mut *self.mesh;

        let mut new_positions =
            Vec::<(VertexId, DVec3)>::with_capacity(mesh.connectivity.num_vertices());
        for (v, vertex) in mesh.connectivity.iter_vertices() {
            if vertex.is_boundary() {
                continue;
            }
            if let Some(relaxed) = relax_vertex(&mesh.connectivity, &mesh.positions, v)? {
                new_positions.push((v, relaxed));
            }
        }

        for (v, position) in new_positions {
            mesh.positions[v] = position;
        }
        Ok(())
    }

    /// Pulls every interior vertex back onto the attached surface, if any:
    /// `p <- p - F(p)`. A no-op without a projection.
    pub fn project_to_surface(&mut self) {
        let surface = match self.projection {
            Some(surface) => surface,
            None => return,
        };

        let mesh = &mut *self.mesh;
        for (v, vertex) in mesh.connectivity.iter_vertices() {
            if vertex.is_boundary() {
                continue;
            }
            let p = mesh.positions[v];
            mesh.positions[v] = p - surface.correction(p);
        }
    }

    /// An invariant violation after a pass is a bug in an operator, not a
    /// recoverable condition. Checked in debug builds only.
    fn assert_invariants(&self) {
        if cfg!(debug_assertions) {
            if let Err(err) = halfedge::validation::check_connectivity(&self.mesh.connectivity) {
                panic!("mesh invariant violated after a remesh pass: {err}");
            }
        }
    }
}

/// The tangential relaxation update for a single vertex, computed from the
/// snapshot `positions`. Returns None when the vertex has no usable ring.
fn relax_vertex(
    conn: &MeshConnectivity,
    positions: &Positions,
    v: VertexId,
) -> Result<Option<DVec3>> {
    let ring = conn.at_vertex(v).neighbour_vertices()?;
    if ring.is_empty() {
        return Ok(None);
    }

    let centroid = ring
        .iter_cpy()
        .map(|n| positions[n])
        .fold(DVec3::ZERO, |acc, p| acc + p)
        / ring.len() as f64;
    let normal = match conn.vertex_normal(positions, v).try_normalize() {
        Some(normal) => normal,
        None => return Ok(None),
    };

    let p = positions[v];
    Ok(Some(centroid + normal * (p - centroid).dot(normal)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::halfedge::primitives::Plane;
    use crate::sizing::UniformSizing;

    #[test]
    fn relaxation_is_stable_on_a_uniform_grid() {
        // On a symmetric planar triangulation every interior vertex already
        // sits at its ring centroid, so relaxation must not move anything
        let mut mesh = Plane::build(DVec3::ZERO, 1.0, 4);
        let before: Vec<(VertexId, DVec3)> = mesh
            .connectivity
            .iter_vertices()
            .map(|(v, _)| (v, mesh.positions[v]))
            .collect();

        let mut remesher = Remesher::new(&mut mesh, UniformSizing::new(0.25));
        remesher.tangential_relaxation(3).unwrap();

        for (v, position) in before {
            assert!(
                mesh.positions[v].distance(position) < 1e-12,
                "vertex {v:?} drifted during relaxation on a flat uniform grid"
            );
        }
    }

    #[test]
    fn relaxation_leaves_the_boundary_alone() {
        let mut mesh = Plane::build(DVec3::ZERO, 1.0, 3);
        // Shove an interior vertex off center so relaxation has work to do
        let interior = mesh
            .connectivity
            .iter_vertices()
            .find(|(_, v)| !v.is_boundary())
            .map(|(v, _)| v)
            .unwrap();
        mesh.positions[interior] += DVec3::new(0.05, 0.02, 0.0);

        let boundary_before: Vec<(VertexId, DVec3)> = mesh
            .connectivity
            .iter_vertices()
            .filter(|(_, v)| v.is_boundary())
            .map(|(v, _)| (v, mesh.positions[v]))
            .collect();

        let mut remesher = Remesher::new(&mut mesh, UniformSizing::new(0.25));
        remesher.tangential_relaxation(5).unwrap();

        for (v, position) in boundary_before {
            assert_eq!(mesh.positions[v], position);
        }
    }

    #[test]
    fn projection_is_a_noop_without_a_surface() {
        let mut mesh = Plane::build(DVec3::ZERO, 1.0, 2);
        let before: Vec<DVec3> = mesh
            .connectivity
            .iter_vertices()
            .map(|(v, _)| mesh.positions[v])
            .collect();

        let mut remesher = Remesher::new(&mut mesh, UniformSizing::new(0.25));
        remesher.project_to_surface();

        let after: Vec<DVec3> = mesh
            .connectivity
            .iter_vertices()
            .map(|(v, _)| mesh.positions[v])
            .collect();
        assert_eq!(before, after);
    }
}
