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

//! Process-wide memoization of grid-to-grid nearest-neighbour maps.

use super::vptree::{IndexMap, VpTree};
use crate::file::Grid;
use log::info;
use ndarray::Array2;
use rustc_hash::FxHashMap;
use std::sync::{Arc, RwLock};

/// Two-level cache `source tag -> target tag -> index map`.
///
/// Lookup goes by the unique grid tags, never by content. The cache
/// is written during setup and read during processing, so a
/// reader-writer lock is all the coordination needed. There is no
/// eviction; [`NeighbourCache::clear`] drops everything.
#[derive(Default)]
pub struct NeighbourCache {
    maps: RwLock<FxHashMap<u64, FxHashMap<u64, Arc<IndexMap>>>>,
}

impl NeighbourCache {
    pub fn new() -> Self {
        NeighbourCache::default()
    }

    /// Returns the nearest-neighbour index map from `source` onto
    /// `target`, computing and memoizing it on first use.
    pub fn nearest_neighbour_map(&self, source: &Grid, target: &Grid) -> Arc<IndexMap> {
        let cached = self
            .maps
            .read()
            .expect("neighbour cache lock poisoned")
            .get(&source.unique_tag())
            .and_then(|targets| targets.get(&target.unique_tag()))
            .cloned();
        if let Some(map) = cached {
            return map;
        }

        let map = Arc::new(compute_map(source, target));

        self.maps
            .write()
            .expect("neighbour cache lock poisoned")
            .entry(source.unique_tag())
            .or_default()
            .entry(target.unique_tag())
            .or_insert_with(|| Arc::clone(&map));

        map
    }

    pub fn clear(&self) {
        self.maps
            .write()
            .expect("neighbour cache lock poisoned")
            .clear();
    }
}

fn compute_map(source: &Grid, target: &Grid) -> IndexMap {
    if source.same_geometry(target) {
        info!("Grids are identical, short cut in finding nearest neighbours");
        return identity_map(target.num_lat(), target.num_lon());
    }

    let tree = VpTree::build(source.lats(), source.lons());
    tree.bulk_nearest_neighbour(target.lats(), target.lons())
}

fn identity_map(num_lat: usize, num_lon: usize) -> IndexMap {
    Array2::from_shape_fn((num_lat, num_lon), |(i, j)| Some((i, j)))
}
