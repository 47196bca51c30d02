// Copyright (C) 2023 setzer22 and contributors
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::marker::PhantomData;

use crate::prelude::*;

use glam::DVec3;
use itertools::Itertools;
use slotmap::{SecondaryMap, SlotMap};
use smallvec::SmallVec;

/// Implements indexing traits so the mesh data structure can be used to access
/// vertex, face or halfedge information using ids as indices.
pub mod mesh_index_impls;

/// Type-safe wrappers over the internal allocator indices used as pointers
pub mod id_types;
pub use id_types::*;

/// An API to represent type-safe and error-handled graph traversals over a mesh
pub mod traversals;
pub use traversals::*;

/// Local geometric queries: edge lengths, midpoints, normals and boundary tests
pub mod queries;
pub use queries::*;

/// The local remeshing operators: edge split and edge collapse
pub mod edit_ops;

/// Structural invariant checks, used at pass boundaries and in tests
pub mod validation;

/// Primitive shapes, like spheres or planar grids
pub mod primitives;

/// HalfEdge meshes are a type of linked list. This means it is sometimes
/// impossible to ensure some algorithms will terminate when the mesh is
/// malformed. To ensure the code never goes into an infinite loop, this max
/// number of iterations will be performed before giving an error.
pub const MAX_LOOP_ITERATIONS: usize = 8196;

/// Vertices flagged with a negative index lie on the mesh boundary and are
/// never moved or removed by the remeshing operators.
pub const BOUNDARY_VERTEX_INDEX: i32 = -1;

#[derive(Debug, Default, Clone)]
pub struct HalfEdge {
    twin: Option<HalfEdgeId>,
    next: Option<HalfEdgeId>,
    /// The vertex this halfedge points at. The origin is `twin.vertex`.
    vertex: Option<VertexId>,
    /// The face at the left of this halfedge, or None when the halfedge is
    /// part of a boundary loop.
    face: Option<FaceId>,
}

#[derive(Debug, Clone)]
pub struct Vertex {
    /// An outgoing halfedge, i.e. one whose origin is this vertex.
    halfedge: Option<HalfEdgeId>,
    index: i32,
}

impl Vertex {
    pub fn index(&self) -> i32 {
        self.index
    }

    pub fn is_boundary(&self) -> bool {
        self.index < 0
    }
}

#[derive(Debug, Clone)]
pub struct Face {
    halfedge: Option<HalfEdgeId>,
}

/// Vertex positions are kept in a secondary map, parallel to the vertex
/// arena, so connectivity and geometry can be borrowed independently.
pub type Positions = SecondaryMap<VertexId, DVec3>;

#[derive(Debug, Clone, Default)]
pub struct MeshConnectivity {
    vertices: SlotMap<VertexId, Vertex>,
    faces: SlotMap<FaceId, Face>,
    halfedges: SlotMap<HalfEdgeId, HalfEdge>,
}

impl MeshConnectivity {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the edges of a given face
    pub fn face_edges(&self, face_id: FaceId) -> SVec<HalfEdgeId> {
        let mut edges = SmallVec::new();
        let h0 = self[face_id].halfedge.expect("Face should have a halfedge");
        let mut h = h0;

        edges.push(h);

        let mut counter = 0;

        loop {
            if counter > MAX_LOOP_ITERATIONS {
                panic!("Max number of iterations reached. Is the mesh malformed?");
            }
            counter += 1;

            h = self[h]
                .next
                .unwrap_or_else(|| panic!("Halfedge {h:?} has no next"));
            if h == h0 {
                break;
            }
            edges.push(h);
        }

        edges
    }

    /// Returns the vertices of a given face, in winding order. Note that the
    /// cycle starts at the destination of the face's anchor halfedge, so the
    /// result is a rotation of the triple the face was built from.
    pub fn face_vertices(&self, face_id: FaceId) -> SVec<VertexId> {
        self.face_edges(face_id)
            .iter()
            .map(|e| self.at_halfedge(*e).vertex().end())
            .collect_svec()
    }

    fn halfedge_loop(&self, h0: HalfEdgeId) -> SVec<HalfEdgeId> {
        let mut ret = smallvec::smallvec![h0];
        let mut h = h0;

        let mut count = 0;

        loop {
            if count > MAX_LOOP_ITERATIONS {
                panic!("Max number of iterations reached. Is the mesh malformed?");
            }
            count += 1;

            h = self[h].next.expect("Halfedges should form a loop");
            if h == h0 {
                break;
            } else {
                ret.push(h);
            }
        }
        ret
    }

    /// Returns an iterator that follows the next pointer for halfedges starting
    /// at `h0` until closing the loop.
    fn halfedge_loop_iter(&self, h0: HalfEdgeId) -> HalfedgeOpIterator<'_, NextOp> {
        HalfedgeOpIterator {
            conn: self,
            start: h0,
            next: h0,
            count: 0,
            _op: PhantomData,
        }
    }

    /// Returns an iterator that cycles around the halfedge fan starting at `h0`
    /// until closing the loop.
    fn halfedge_fan_iter(&self, h0: HalfEdgeId) -> HalfedgeOpIterator<'_, CycleFanOp> {
        HalfedgeOpIterator {
            conn: self,
            start: h0,
            next: h0,
            count: 0,
            _op: PhantomData,
        }
    }

    pub fn iter_vertices(&self) -> impl Iterator<Item = (VertexId, &Vertex)> {
        self.vertices.iter()
    }

    pub fn iter_faces(&self) -> impl Iterator<Item = (FaceId, &Face)> {
        self.faces.iter()
    }

    pub fn iter_halfedges(&self) -> impl Iterator<Item = (HalfEdgeId, &HalfEdge)> {
        self.halfedges.iter()
    }

    /// Adds a new vertex to the mesh, disconnected from everything else.
    /// Returns its handle.
    fn alloc_vertex(
        &mut self,
        positions: &mut Positions,
        position: DVec3,
        halfedge: Option<HalfEdgeId>,
        index: i32,
    ) -> VertexId {
        let v = self.vertices.insert(Vertex { halfedge, index });
        positions.insert(v, position);
        v
    }

    /// Adds a new face to the mesh, disconnected from everything else. Returns its handle.
    fn alloc_face(&mut self, halfedge: Option<HalfEdgeId>) -> FaceId {
        self.faces.insert(Face { halfedge })
    }

    /// Adds a new halfedge to the mesh, disconnected from everything else. Returns its handle.
    fn alloc_halfedge(&mut self, halfedge: HalfEdge) -> HalfEdgeId {
        self.halfedges.insert(halfedge)
    }

    /// Removes a face from the mesh. This does not attempt to preserve mesh
    /// connectivity and should only be used as part of internal operations.
    fn remove_face(&mut self, face: FaceId) {
        self.faces.remove(face);
    }

    /// Removes a halfedge from the mesh. This does not attempt to preserve mesh
    /// connectivity and should only be used as part of internal operations.
    fn remove_halfedge(&mut self, halfedge: HalfEdgeId) {
        self.halfedges.remove(halfedge);
    }

    /// Removes a vertex from the mesh. This does not attempt to preserve mesh
    /// connectivity and should only be used as part of internal operations.
    fn remove_vertex(&mut self, vertex: VertexId) {
        self.vertices.remove(vertex);
    }

    /// Returns true when the handle still resolves to a live vertex. Handles
    /// are generational, so a handle taken before a removal never aliases a
    /// later allocation.
    pub fn vertex_exists(&self, vertex: VertexId) -> bool {
        self.vertex(vertex).is_some()
    }

    /// Returns true when the handle still resolves to a live halfedge. Drivers
    /// that snapshot the halfedges of a mesh and then mutate it use this as
    /// the dereference guard for stale handles.
    pub fn halfedge_exists(&self, halfedge: HalfEdgeId) -> bool {
        self.halfedge(halfedge).is_some()
    }

    pub fn num_halfedges(&self) -> usize {
        self.halfedges.len()
    }

    pub fn num_vertices(&self) -> usize {
        self.vertices.len()
    }

    pub fn num_faces(&self) -> usize {
        self.faces.len()
    }

    /// Given a `self` in an inconsistent state, where some halfedges have no
    /// `twin` (because it's in the boundary), this method adds twin halfedges
    /// forming a loop across the boundaries of the mesh. The new halfedges will
    /// be marked as boundary with a None face.
    fn add_boundary_halfedges(&mut self) {
        // Clone to avoid double-borrow issues
        let halfedges: Vec<HalfEdgeId> = self.iter_halfedges().map(|(h, _)| h).collect();

        for &h0 in halfedges.iter() {
            let mut boundary_halfedges = Vec::<HalfEdgeId>::new();
            if self[h0].twin.is_none() {
                let mut h_it = h0;
                loop {
                    let t = self.alloc_halfedge(HalfEdge::default());
                    boundary_halfedges.push(t);
                    self[h_it].twin = Some(t);
                    self[t].twin = Some(h_it);
                    // The twin points back at the origin of h_it. Not every
                    // halfedge has its twin yet, so the origin is recovered by
                    // walking the triangle loop instead.
                    self[t].vertex = Some(self.at_halfedge(h_it).next().next().vertex().end());

                    // Look for the next twinless halfedge along the hole,
                    // fanning around the destination vertex of h_it
                    h_it = self.at_halfedge(h_it).next().end();
                    while h_it != h0 && self[h_it].twin.is_some() {
                        // Twin-next cycles around the outgoing halfedges of a vertex
                        h_it = self.at_halfedge(h_it).twin().next().end();
                    }

                    if h_it == h0 {
                        break;
                    }
                }
            }

            // Boundary halfedges run opposite to the interior winding, so the
            // loop is linked in reverse collection order.
            for (&b_h, &b_h_next) in boundary_halfedges.iter().rev().circular_tuple_windows() {
                self[b_h].next = Some(b_h_next);
            }
        }
    }
}

/// The triangle halfedge mesh: the connectivity arenas plus the vertex
/// positions that the geometric queries and operators read and write.
#[derive(Debug, Clone, Default)]
pub struct HalfEdgeMesh {
    pub connectivity: MeshConnectivity,
    pub positions: Positions,
}

impl HalfEdgeMesh {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds this mesh from a list of vertices, and a list of triangles,
    /// containing indices that reference those vertices.
    ///
    /// - Generic over Index: Use as much precision as you need / want.
    /// - Generic over Triangle: Use whatever input layout you want.
    ///
    /// If unsure, you can pass `Vec<[u32; 3]>` as `triangles`. You can also
    /// use `&[&[u32]]` or `Vec<Vec<u32>>`. Same for `u8`, `u16` or `usize`
    /// indices.
    ///
    /// Every vertex keeps the index it had in the input array. Vertices that
    /// end up on the mesh boundary are flagged with a negative index instead,
    /// which is what shields them from the remeshing operators.
    pub fn build_from_triangles<Index, Triangle>(
        positions: &[DVec3],
        triangles: &[Triangle],
    ) -> Result<Self>
    where
        Index: num_traits::AsPrimitive<usize> + 'static + Eq + PartialEq + core::hash::Hash + Copy,
        Triangle: AsRef<[Index]>,
    {
        let mut conn = MeshConnectivity::new();
        let mut positions_map = Positions::default();

        // Maps indices from the `triangles` array to the allocated vertices in
        // the newly created halfedge mesh.
        let mut index_to_vertex = HashMap::<Index, VertexId>::new();

        // Used to compute the degree of a vertex. Useful to do some sanity
        // checks.
        let mut vertex_degree = HashMap::<VertexId, u32>::new();

        // First pass over the triangle data to determine some initial properties
        for triangle in triangles.iter().map(|t| t.as_ref()) {
            // Some sanity checks
            if triangle.len() != 3 {
                bail!("This mesh is specialized for triangles, but a polygon had {} vertices.", triangle.len())
            }
            if triangle.iter().duplicates().next().is_some() {
                bail!("Cannot build meshes where a triangle has duplicate vertices")
            }

            // Compute correspondence between vertices and indices. Also fill in vertex degree data.
            for index in triangle {
                // Create the vertex if it doesn't exist
                let position = positions.get(index.as_()).ok_or_else(|| {
                    anyhow!("Out-of-bounds index in the triangle array {}", index.as_())
                })?;
                let v_id = index_to_vertex.entry(*index).or_insert_with(|| {
                    conn.alloc_vertex(&mut positions_map, *position, None, index.as_() as i32)
                });

                // Increment the vertex degree counter for that vertex.
                *vertex_degree.entry(*v_id).or_insert(0) += 1;
            }
        }

        // Maps pairs of indices to mesh halfedges
        let mut pair_to_halfedge = HashMap::<(Index, Index), HalfEdgeId>::new();

        // We can now start building connectivity information by doing a second
        // pass over the triangle list
        for triangle in triangles.iter().map(|t| t.as_ref()) {
            // Cyclically ordered list of the half edge ids of this face.
            let mut half_edges_in_face = SVec::new();

            let face = conn.alloc_face(None);

            for (&a, &b) in triangle.iter().circular_tuple_windows() {
                if pair_to_halfedge.get(&(a, b)).is_some() {
                    bail!(
                        "Found multiple oriented edges with the same indices.\
                         This means either (i) surface is non-manifold or (ii) faces \
                         are not oriented in the same direction"
                    )
                }

                let h = conn.alloc_halfedge(HalfEdge::default());
                // Link halfedge to face
                conn[h].face = Some(face);
                conn[face].halfedge = Some(h);

                // The halfedge points at b and leaves from a, so it can serve
                // as a's outgoing anchor
                let v_a = index_to_vertex[&a];
                let v_b = index_to_vertex[&b];
                conn[h].vertex = Some(v_b);
                conn[v_a].halfedge = Some(h);

                half_edges_in_face.push(h);

                pair_to_halfedge.insert((a, b), h);

                if let Some(&other) = pair_to_halfedge.get(&(b, a)) {
                    conn[h].twin = Some(other);
                    conn[other].twin = Some(h);
                }
            }

            for (&h1, &h2) in half_edges_in_face.iter().circular_tuple_windows() {
                conn[h1].next = Some(h2);
            }
        }

        // Construct the boundary halfedges. Right now, the boundary consists of
        // incomplete edges, i.e. half edges that do not have a twin. Leaving it
        // like this would complicate some kinds of traversal because we can't
        // rely on halfedges always having a twin. We will instead create
        // boundary half edges: That is, twin halfedges that do not point to any
        // face. The boundary halfedges are linked following a circle around the
        // closed boundary.
        conn.add_boundary_halfedges();

        // Do some final manifoldness checks, and record which vertices touch
        // the boundary so they can be flagged.
        let mut boundary_vertices = Vec::new();
        for (v, vertex) in conn.iter_vertices() {
            if vertex.halfedge.is_none() {
                bail!("There is at least a single vertex that's disconnected from any triangle");
            }

            // Check that the number of halfedges emanating from this vertex
            // equal the number of triangles containing this vertex. If this
            // doesn't check out, it means our vertex is not a triangle "fan",
            // but some other (thus, non-manifold) structure
            let h0 = conn.at_vertex(v).halfedge().try_end()?;
            let mut h = h0;
            let mut count = 0;
            let mut on_boundary = false;
            let mut iterations = 0;
            loop {
                if iterations > MAX_LOOP_ITERATIONS {
                    bail!("The halfedge fan around a vertex does not close");
                }
                iterations += 1;

                if conn.at_halfedge(h).is_boundary()? {
                    on_boundary = true;
                } else {
                    count += 1;
                }
                h = conn.at_halfedge(h).twin().next().try_end()?;

                if h == h0 {
                    break;
                }
            }

            if count != vertex_degree[&v] {
                bail!("At least one of the vertices is not a triangle fan, but some other nonmanifold structure instead.")
            }
            if on_boundary {
                boundary_vertices.push(v);
            }
        }
        for v in boundary_vertices {
            conn[v].index = BOUNDARY_VERTEX_INDEX;
        }

        Ok(HalfEdgeMesh {
            connectivity: conn,
            positions: positions_map,
        })
    }

    /// Flattens the halfedge connectivity back into an indexed triangle mesh.
    /// The result round-trips with `build_from_triangles` up to vertex
    /// reordering and rotation of each triangle's triple.
    pub fn extract(&self) -> TriangleMesh {
        let conn = &self.connectivity;

        let mut id_to_index = SecondaryMap::<VertexId, u32>::new();
        let mut positions = Vec::with_capacity(conn.num_vertices());
        for (v, _) in conn.iter_vertices() {
            id_to_index.insert(v, positions.len() as u32);
            positions.push(self.positions[v]);
        }

        let mut triangles = Vec::with_capacity(conn.num_faces());
        for (f, _) in conn.iter_faces() {
            let verts = conn.face_vertices(f);
            debug_assert_eq!(verts.len(), 3);
            triangles.push([
                id_to_index[verts[0]],
                id_to_index[verts[1]],
                id_to_index[verts[2]],
            ]);
        }

        TriangleMesh {
            positions,
            triangles,
        }
    }

    pub fn bounding_box(&self) -> (DVec3, DVec3) {
        let mut min = DVec3::splat(f64::MAX);
        let mut max = DVec3::splat(f64::MIN);
        for (v, _) in self.connectivity.iter_vertices() {
            let p = self.positions[v];
            min = min.min(p);
            max = max.max(p);
        }
        let center = (min + max) * 0.5;
        let size = max - min;
        (center, size)
    }
}

pub trait HalfEdgeOp {
    fn op(conn: &MeshConnectivity, h: HalfEdgeId) -> HalfEdgeId;
}

pub struct NextOp;
impl HalfEdgeOp for NextOp {
    fn op(conn: &MeshConnectivity, h: HalfEdgeId) -> HalfEdgeId {
        conn.at_halfedge(h).next().end()
    }
}

pub struct CycleFanOp;
impl HalfEdgeOp for CycleFanOp {
    fn op(conn: &MeshConnectivity, h: HalfEdgeId) -> HalfEdgeId {
        conn.at_halfedge(h).cycle_around_fan().end()
    }
}

pub struct HalfedgeOpIterator<'a, Op: HalfEdgeOp> {
    conn: &'a MeshConnectivity,
    start: HalfEdgeId,
    next: HalfEdgeId,
    count: usize,
    _op: PhantomData<Op>,
}

impl<'a, Op: HalfEdgeOp> Iterator for HalfedgeOpIterator<'a, Op> {
    type Item = HalfEdgeId;

    fn next(&mut self) -> Option<Self::Item> {
        if self.count >= MAX_LOOP_ITERATIONS {
            panic!("Max number of iterations reached. Is the mesh malformed?");
        } else if self.count > 0 && self.next == self.start {
            None
        } else {
            let res = self.next;
            self.next = Op::op(self.conn, self.next);
            self.count += 1;
            Some(res)
        }
    }
}
