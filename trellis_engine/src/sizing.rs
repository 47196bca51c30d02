// Copyright (C) 2023 setzer22 and contributors
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use glam::DVec3;

/// A target edge length field over the ambient space. The remesher samples
/// it at edge midpoints to decide which edges are too long or too short.
/// Implementations must be total and return finite, strictly positive
/// lengths over the mesh domain.
pub trait SizingField {
    fn size_at(&self, point: DVec3) -> f64;
}

/// The same target edge length everywhere.
#[derive(Debug, Clone, Copy)]
pub struct UniformSizing {
    edge_length: f64,
}

impl UniformSizing {
    pub fn new(edge_length: f64) -> Self {
        Self { edge_length }
    }
}

impl SizingField for UniformSizing {
    fn size_at(&self, _point: DVec3) -> f64 {
        self.edge_length
    }
}

impl<F> SizingField for F
where
    F: Fn(DVec3) -> f64,
{
    fn size_at(&self, point: DVec3) -> f64 {
        self(point)
    }
}

/// An implicit surface the remesher can project vertices back onto. The
/// returned vector points from the surface to the queried point, so
/// `point - correction(point)` lies on the surface.
pub trait SurfaceField {
    fn correction(&self, point: DVec3) -> DVec3;
}

/// The analytic sphere, the standing example of a projection target:
/// vertices drift off the radius during relaxation and get pulled back.
#[derive(Debug, Clone, Copy)]
pub struct SphereField {
    pub center: DVec3,
    pub radius: f64,
}

impl SurfaceField for SphereField {
    fn correction(&self, point: DVec3) -> DVec3 {
        let offset = point - self.center;
        let distance = offset.length();
        if distance == 0.0 {
            // The center projects nowhere in particular
            return DVec3::ZERO;
        }
        offset / distance * (distance - self.radius)
    }
}
