// Copyright (C) 2022 setzer22 and contributors
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use glam::DVec3;
use serde::{Deserialize, Serialize};

/// The halfedge graph data structure and main edit operations
pub mod halfedge;

/// A flat, indexed triangle mesh. This is the interchange format at the
/// library boundary: meshes come in as one of these and leave through
/// [`halfedge::HalfEdgeMesh::extract`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TriangleMesh {
    pub positions: Vec<DVec3>,
    pub triangles: Vec<[u32; 3]>,
}

impl TriangleMesh {
    pub fn num_vertices(&self) -> usize {
        self.positions.len()
    }

    pub fn num_triangles(&self) -> usize {
        self.triangles.len()
    }
}
