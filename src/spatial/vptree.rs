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

//! Vantage-point tree over the points of a grid, giving average-case
//! O(log N) nearest-neighbour queries on the sphere.

use crate::constants::is_valid;
use crate::geo::{chord_distance, SinCos};
use crate::Float;
use ndarray::Array2;
use rayon::prelude::*;

/// Nearest source-grid indices for every cell of a target grid.
/// `None` marks target cells with missing coordinates.
pub type IndexMap = Array2<Option<(usize, usize)>>;

/// A grid point with its precomputed sine/cosine pairs and its
/// indices in the originating grid.
struct Indexed {
    lat: SinCos,
    lon: SinCos,
    ipos: usize,
    jpos: usize,
}

struct TreeNode {
    /// Index of the vantage point in the coordinate list.
    index: usize,
    /// Median distance from the vantage point to the points below.
    cut_distance: f64,
    left: Option<Box<TreeNode>>,
    right: Option<Box<TreeNode>>,
}

pub struct VpTree {
    coords: Vec<Indexed>,
    root: Option<Box<TreeNode>>,
}

impl VpTree {
    /// Builds the tree from a grid of coordinates in degrees. Cells
    /// with a missing latitude or longitude are left out.
    pub fn build(lats: &Array2<Float>, lons: &Array2<Float>) -> Self {
        let mut coords = Vec::with_capacity(lats.len());
        for ((i, j), &lat) in lats.indexed_iter() {
            let lon = lons[[i, j]];
            if is_valid(lat) && is_valid(lon) {
                coords.push(Indexed {
                    lat: SinCos::new(lat),
                    lon: SinCos::new(lon),
                    ipos: i,
                    jpos: j,
                });
            }
        }

        let count = coords.len();
        let root = subtree(&mut coords, 0, count);
        VpTree { coords, root }
    }

    /// Grid indices of the source point nearest to the query, or
    /// `None` for a missing query or an empty tree.
    pub fn nearest_neighbour(&self, lat: Float, lon: Float) -> Option<(usize, usize)> {
        if !is_valid(lat) || !is_valid(lon) {
            return None;
        }

        let query_lat = SinCos::new(lat);
        let query_lon = SinCos::new(lon);
        let mut min_dist = f64::MAX;
        let mut best = None;
        self.search(
            self.root.as_deref(),
            &query_lat,
            &query_lon,
            &mut min_dist,
            &mut best,
        );

        best.map(|id| {
            let found: &Indexed = &self.coords[id];
            (found.ipos, found.jpos)
        })
    }

    /// Nearest-neighbour indices for every cell of a target grid,
    /// computed in parallel over latitude rows.
    pub fn bulk_nearest_neighbour(
        &self,
        lats: &Array2<Float>,
        lons: &Array2<Float>,
    ) -> IndexMap {
        let (num_lat, num_lon) = lats.dim();

        let rows: Vec<Vec<Option<(usize, usize)>>> = (0..num_lat)
            .into_par_iter()
            .map(|i| {
                (0..num_lon)
                    .map(|j| self.nearest_neighbour(lats[[i, j]], lons[[i, j]]))
                    .collect()
            })
            .collect();

        let flat: Vec<Option<(usize, usize)>> = rows.into_iter().flatten().collect();
        Array2::from_shape_vec((num_lat, num_lon), flat)
            .expect("row-collected neighbour map has grid shape")
    }

    fn search(
        &self,
        node: Option<&TreeNode>,
        query_lat: &SinCos,
        query_lon: &SinCos,
        min_dist: &mut f64,
        best: &mut Option<usize>,
    ) {
        let node = match node {
            Some(node) => node,
            None => return,
        };

        let point = &self.coords[node.index];
        let dist = chord_distance(query_lat, query_lon, &point.lat, &point.lon);
        if dist < *min_dist {
            *min_dist = dist;
            *best = Some(node.index);
        }

        if node.left.is_none() && node.right.is_none() {
            return;
        }

        // Triangle-inequality bounds: a side is skipped when it
        // cannot hold anything closer than the current best.
        if dist < node.cut_distance {
            if dist - *min_dist <= node.cut_distance {
                self.search(node.left.as_deref(), query_lat, query_lon, min_dist, best);
            }
            if dist + *min_dist >= node.cut_distance {
                self.search(node.right.as_deref(), query_lat, query_lon, min_dist, best);
            }
        } else {
            if dist + *min_dist >= node.cut_distance {
                self.search(node.right.as_deref(), query_lat, query_lon, min_dist, best);
            }
            if dist - *min_dist <= node.cut_distance {
                self.search(node.left.as_deref(), query_lat, query_lon, min_dist, best);
            }
        }
    }
}

/// Recursively partitions `coords[from..to]`: the element at `from`
/// becomes the vantage point, the remainder is split around the
/// median of its distances to the vantage point.
fn subtree(coords: &mut [Indexed], from: usize, to: usize) -> Option<Box<TreeNode>> {
    if from >= to {
        return None;
    }
    if to - from == 1 {
        return Some(Box::new(TreeNode {
            index: from,
            cut_distance: 0.0,
            left: None,
            right: None,
        }));
    }

    let vantage_lat = coords[from].lat;
    let vantage_lon = coords[from].lon;
    let median = (from + 1 + to) / 2;

    coords[from + 1..to].select_nth_unstable_by(median - from - 1, |a, b| {
        let da = chord_distance(&vantage_lat, &vantage_lon, &a.lat, &a.lon);
        let db = chord_distance(&vantage_lat, &vantage_lon, &b.lat, &b.lon);
        da.total_cmp(&db)
    });

    let cut_distance = chord_distance(
        &vantage_lat,
        &vantage_lon,
        &coords[median].lat,
        &coords[median].lon,
    );
    let left = subtree(coords, from + 1, median);
    let right = subtree(coords, median, to);

    Some(Box::new(TreeNode {
        index: from,
        cut_distance,
        left,
        right,
    }))
}
