/*
Copyright 2024 - 2025 The gridpost developers

This file is part of the Gridded Ensemble Post-Processor (gridpost).

gridpost is a free software: you can redistribute it and/or modify
it under the terms of the GNU General Public License as published by
the Free Software Foundation; either version 3 of the License, or
(at your option) any later version.

gridpost is distributed in the hope that it will be useful,
but WITHOUT ANY WARRANTY; without even the implied warranty of
MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
GNU General Public License for more details.

You should have received a copy of the GNU General Public License
along with gridpost. If not, see https://www.gnu.org/licenses/.
*/

//! Geographic primitives for distances on the sphere.

use crate::constants::{is_valid, MV, RADIUS_EARTH};
use crate::Float;

/// Cached sine/cosine pair of a coordinate given in degrees.
///
/// The spatial index stores one pair per coordinate so that queries
/// never touch transcendental functions.
#[derive(Copy, Clone, Debug)]
pub struct SinCos {
    pub sin: f64,
    pub cos: f64,
}

impl SinCos {
    pub fn new(degrees: Float) -> Self {
        let radians = f64::from(degrees).to_radians();
        SinCos {
            sin: radians.sin(),
            cos: radians.cos(),
        }
    }
}

/// Comparison metric between two points given as sine/cosine pairs.
///
/// Returns `1 - cos d` where `d` is the great-circle angle, from the
/// identity `cos d = sin p1 sin p2 + cos p1 cos p2 cos(l1 - l2)`.
/// Monotone in the angle, so nearest-neighbour ordering does not need
/// the acos step.
pub fn angular_offset(lat1: &SinCos, lon1: &SinCos, lat2: &SinCos, lon2: &SinCos) -> f64 {
    let cos_dlon = lon1.cos * lon2.cos + lon1.sin * lon2.sin;
    let cos_d = lat1.sin * lat2.sin + lat1.cos * lat2.cos * cos_dlon;
    1.0 - cos_d
}

/// Chord length between two points on the unit sphere, computed as
/// `sqrt(2 (1 - cos d))`.
///
/// Monotone in the great-circle angle like [`angular_offset`], but
/// also a true metric (it is the straight-line distance through the
/// sphere), so triangle-inequality search bounds hold exactly.
pub fn chord_distance(lat1: &SinCos, lon1: &SinCos, lat2: &SinCos, lon2: &SinCos) -> f64 {
    (2.0 * angular_offset(lat1, lon1, lat2, lon2)).max(0.0).sqrt()
}

/// Great-circle distance in meters between two points in degrees.
///
/// Returns [`MV`] when any coordinate is missing.
pub fn distance(lat1: Float, lon1: Float, lat2: Float, lon2: Float) -> Float {
    if !is_valid(lat1) || !is_valid(lon1) || !is_valid(lat2) || !is_valid(lon2) {
        return MV;
    }

    let offset = angular_offset(
        &SinCos::new(lat1),
        &SinCos::new(lon1),
        &SinCos::new(lat2),
        &SinCos::new(lon2),
    );
    let cos_d = (1.0 - offset).clamp(-1.0, 1.0);

    (cos_d.acos() * f64::from(RADIUS_EARTH)) as Float
}
