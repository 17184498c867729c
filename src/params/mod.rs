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

//! Scheme coefficients keyed by location and lead-time.
//!
//! A [`ParameterStore`] maps locations to per-lead-time parameter
//! vectors, with nearest-neighbour fallback for unknown locations.
//! Location-independence and time-independence are degenerate cases:
//! a single stored location serves every query, and a store that only
//! ever saw lead-time zero collapses all positive lead-times to zero.

mod kalman;
mod text;

use crate::constants::is_valid;
use crate::errors::{ConfigError, DomainError, PostError};
use crate::geo;
use crate::options::Options;
use crate::spatial::VpTree;
use crate::Float;
use ndarray::Array2;
use std::collections::BTreeMap;
use std::ops::Index;
use std::sync::RwLock;

/// Geographic key for parameter lookup.
///
/// Equality and ordering ignore the elevation: two stations at the
/// same coordinates are the same key regardless of their height.
#[derive(Clone, Debug)]
pub struct Location {
    lat: Float,
    lon: Float,
    elev: Float,
}

impl Location {
    pub fn new(lat: Float, lon: Float, elev: Float) -> Self {
        Location { lat, lon, elev }
    }

    pub fn lat(&self) -> Float {
        self.lat
    }

    pub fn lon(&self) -> Float {
        self.lon
    }

    pub fn elev(&self) -> Float {
        self.elev
    }

    /// Great-circle distance to another location in meters.
    pub fn distance_to(&self, other: &Location) -> Float {
        geo::distance(self.lat, self.lon, other.lat, other.lon)
    }
}

impl PartialEq for Location {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == std::cmp::Ordering::Equal
    }
}

impl Eq for Location {}

impl PartialOrd for Location {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Location {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.lat
            .total_cmp(&other.lat)
            .then(self.lon.total_cmp(&other.lon))
    }
}

/// An ordered sequence of scheme coefficients. The empty sequence
/// denotes "no parameters available for this cell".
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Parameters(Vec<Float>);

impl Parameters {
    pub fn new(values: Vec<Float>) -> Self {
        Parameters(values)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn values(&self) -> &[Float] {
        &self.0
    }
}

impl Index<usize> for Parameters {
    type Output = Float;

    fn index(&self, index: usize) -> &Float {
        &self.0[index]
    }
}

/// Spatial index over the stored locations, rebuilt lazily after
/// mutations.
struct NearestIndex {
    tree: VpTree,
    locations: Vec<Location>,
}

/// Mapping `location -> lead-time -> parameters`.
pub struct ParameterStore {
    parameters: BTreeMap<Location, Vec<Parameters>>,
    max_time: i64,
    time_dependent: bool,
    index: RwLock<Option<NearestIndex>>,
}

impl Default for ParameterStore {
    fn default() -> Self {
        ParameterStore::new()
    }
}

impl PartialEq for ParameterStore {
    fn eq(&self, other: &Self) -> bool {
        self.parameters == other.parameters
            && self.max_time == other.max_time
            && self.time_dependent == other.time_dependent
    }
}

impl std::fmt::Debug for ParameterStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParameterStore")
            .field("locations", &self.parameters.len())
            .field("max_time", &self.max_time)
            .field("time_dependent", &self.time_dependent)
            .finish()
    }
}

impl ParameterStore {
    pub fn new() -> Self {
        ParameterStore {
            parameters: BTreeMap::new(),
            max_time: 0,
            time_dependent: false,
            index: RwLock::new(None),
        }
    }

    /// Stores a parameter vector for a location and lead-time,
    /// updating the time-dependence flag and the max-time high-water
    /// mark. Invalidates the spatial index.
    pub fn set_parameters(
        &mut self,
        parameters: Parameters,
        time: i64,
        location: Location,
    ) -> Result<(), DomainError> {
        if time < 0 {
            return Err(DomainError::NegativeTime(time));
        }

        self.max_time = self.max_time.max(time);
        let slots = self.parameters.entry(location).or_default();
        let needed = time as usize + 1;
        if slots.len() < needed {
            slots.resize(needed, Parameters::default());
        }
        slots[time as usize] = parameters;
        self.time_dependent = self.time_dependent || time > 0;

        *self
            .index
            .get_mut()
            .expect("parameter index lock poisoned") = None;
        Ok(())
    }

    /// Retrieves parameters from a location-independent store.
    ///
    /// Fails on a location-dependent store; use
    /// [`ParameterStore::get_parameters_at`] there.
    pub fn get_parameters(&self, time: i64) -> Result<Parameters, PostError> {
        let time = self.checked_time(time)?;

        if self.is_location_dependent() {
            return Err(DomainError::LocationDependent.into());
        }

        match self.parameters.values().next() {
            Some(slots) => Ok(slots.get(time).cloned().unwrap_or_default()),
            None => Ok(Parameters::default()),
        }
    }

    /// Retrieves parameters for a location and lead-time.
    ///
    /// With `allow_nearest`, the query location is replaced by the
    /// stored location nearest to it that actually has a non-empty
    /// vector at the requested lead-time; when no such location
    /// exists the result is empty.
    pub fn get_parameters_at(
        &self,
        time: i64,
        location: &Location,
        allow_nearest: bool,
    ) -> Result<Parameters, PostError> {
        let time = self.checked_time(time)?;

        if self.parameters.is_empty() {
            return Ok(Parameters::default());
        }

        let lookup = if allow_nearest {
            match self.nearest_location(time, location) {
                Some(found) => found,
                None => return Ok(Parameters::default()),
            }
        } else {
            location.clone()
        };

        Ok(self
            .parameters
            .get(&lookup)
            .and_then(|slots| slots.get(time))
            .cloned()
            .unwrap_or_default())
    }

    pub fn is_location_dependent(&self) -> bool {
        self.parameters.len() > 1
    }

    pub fn is_time_dependent(&self) -> bool {
        self.time_dependent
    }

    pub fn max_time(&self) -> i64 {
        self.max_time
    }

    /// Common length of the stored non-empty vectors, `None` when the
    /// populated cells disagree.
    pub fn num_parameters(&self) -> Option<usize> {
        let mut size: Option<usize> = None;
        for slots in self.parameters.values() {
            for parameters in slots {
                if parameters.is_empty() {
                    continue;
                }
                match size {
                    None => size = Some(parameters.len()),
                    Some(seen) if seen != parameters.len() => return None,
                    Some(_) => {}
                }
            }
        }
        Some(size.unwrap_or(0))
    }

    pub fn locations(&self) -> Vec<Location> {
        self.parameters.keys().cloned().collect()
    }

    fn checked_time(&self, time: i64) -> Result<usize, DomainError> {
        if time < 0 {
            return Err(DomainError::NegativeTime(time));
        }

        let time = if self.time_dependent { time } else { 0 };
        if time > self.max_time {
            return Err(DomainError::TimeBeyondMax {
                time,
                max: self.max_time,
            });
        }

        Ok(time as usize)
    }

    fn non_empty_at(&self, location: &Location, time: usize) -> bool {
        self.parameters
            .get(location)
            .and_then(|slots| slots.get(time))
            .map_or(false, |parameters| !parameters.is_empty())
    }

    /// Stored location standing in for the query location: the tree
    /// candidate when it has data at the requested lead-time, the
    /// exact location when it does, otherwise a linear scan for the
    /// nearest location with data.
    fn nearest_location(&self, time: usize, location: &Location) -> Option<Location> {
        if self.parameters.len() == 1 {
            return self.parameters.keys().next().cloned();
        }

        let candidate = if self.parameters.contains_key(location) {
            Some(location.clone())
        } else {
            self.with_index(|index| {
                index
                    .tree
                    .nearest_neighbour(location.lat, location.lon)
                    .map(|(i, _)| index.locations[i].clone())
            })
        };

        if let Some(candidate) = candidate {
            if self.non_empty_at(&candidate, time) {
                return Some(candidate);
            }
        }
        if self.non_empty_at(location, time) {
            return Some(location.clone());
        }

        let mut best: Option<(Float, &Location)> = None;
        for (stored, slots) in &self.parameters {
            let has_data = slots
                .get(time)
                .map_or(false, |parameters| !parameters.is_empty());
            if !has_data {
                continue;
            }
            let dist = location.distance_to(stored);
            if is_valid(dist) && best.map_or(true, |(best_dist, _)| dist < best_dist) {
                best = Some((dist, stored));
            }
        }
        best.map(|(_, found)| found.clone())
    }

    fn with_index<R>(&self, action: impl FnOnce(&NearestIndex) -> R) -> R {
        {
            let guard = self.index.read().expect("parameter index lock poisoned");
            if let Some(index) = guard.as_ref() {
                return action(index);
            }
        }

        let built = self.build_index();
        let mut guard = self.index.write().expect("parameter index lock poisoned");
        action(guard.get_or_insert(built))
    }

    fn build_index(&self) -> NearestIndex {
        let locations: Vec<Location> = self.parameters.keys().cloned().collect();
        let count = locations.len();
        let lats = Array2::from_shape_fn((count, 1), |(i, _)| locations[i].lat);
        let lons = Array2::from_shape_fn((count, 1), |(i, _)| locations[i].lon);

        NearestIndex {
            tree: VpTree::build(&lats, &lons),
            locations,
        }
    }
}

/// Loads a parameter store from disk with the format selected by the
/// `type` option, defaulting to the text format.
pub fn load_parameter_store(path: &str, options: &Options) -> Result<ParameterStore, PostError> {
    let format = options
        .get::<String>("type")
        .unwrap_or_else(|| "text".to_string());

    match format.as_str() {
        "text" => text::load(path, options),
        "metnoKalman" => kalman::load(path, options),
        "netcdf" => Err(ConfigError::UnavailableParameterFormat("netcdf").into()),
        _ => Err(ConfigError::UnknownParameterFormat(format).into()),
    }
}

pub fn descriptions() -> String {
    let mut out = String::new();
    out.push_str("   text         Rows of 'time p1 .. pN', or 'time lat lon elev p1 .. pN' with spatial=1\n");
    out.push_str("   metnoKalman  met.no Kalman coefficient dump with 24 hourly values per station\n");
    out.push_str("   netcdf       Gridded parameter sets (not compiled into this build)\n");
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loc(lat: Float, lon: Float) -> Location {
        Location::new(lat, lon, 0.0)
    }

    #[test]
    fn location_equality_ignores_elevation() {
        let a = Location::new(60.0, 10.0, 100.0);
        let b = Location::new(60.0, 10.0, 900.0);
        assert_eq!(a, b);
        assert!(Location::new(59.0, 10.0, 0.0) < a);
    }

    #[test]
    fn set_then_get_round_trip() {
        let mut store = ParameterStore::new();
        store
            .set_parameters(Parameters::new(vec![1.0, 2.0]), 0, loc(60.0, 10.0))
            .unwrap();

        let fetched = store.get_parameters(0).unwrap();
        assert_eq!(fetched.values(), &[1.0, 2.0]);
        assert!(!store.is_location_dependent());
        assert!(!store.is_time_dependent());
    }

    #[test]
    fn time_independent_store_collapses_time() {
        let mut store = ParameterStore::new();
        store
            .set_parameters(Parameters::new(vec![3.0]), 0, loc(60.0, 10.0))
            .unwrap();

        for time in [0, 1, 7, 100] {
            assert_eq!(store.get_parameters(time).unwrap().values(), &[3.0]);
        }
    }

    #[test]
    fn negative_time_is_rejected() {
        let mut store = ParameterStore::new();
        store
            .set_parameters(Parameters::new(vec![3.0]), 0, loc(60.0, 10.0))
            .unwrap();
        assert!(store.get_parameters(-1).is_err());
        assert!(store
            .set_parameters(Parameters::default(), -4, loc(60.0, 10.0))
            .is_err());
    }

    #[test]
    fn time_beyond_max_is_rejected_when_time_dependent() {
        let mut store = ParameterStore::new();
        store
            .set_parameters(Parameters::new(vec![1.0]), 0, loc(60.0, 10.0))
            .unwrap();
        store
            .set_parameters(Parameters::new(vec![2.0]), 3, loc(60.0, 10.0))
            .unwrap();

        assert!(store.is_time_dependent());
        assert_eq!(store.max_time(), 3);
        assert!(store.get_parameters(4).is_err());
    }

    #[test]
    fn unpopulated_lead_time_reads_empty() {
        let mut store = ParameterStore::new();
        store
            .set_parameters(Parameters::new(vec![1.0]), 2, loc(60.0, 10.0))
            .unwrap();

        // time 1 is within max_time but was never populated
        assert!(store.get_parameters(1).unwrap().is_empty());
    }

    #[test]
    fn location_dependent_store_rejects_plain_get() {
        let mut store = ParameterStore::new();
        store
            .set_parameters(Parameters::new(vec![1.0]), 0, loc(60.0, 10.0))
            .unwrap();
        store
            .set_parameters(Parameters::new(vec![2.0]), 0, loc(61.0, 10.0))
            .unwrap();

        assert!(store.is_location_dependent());
        assert!(store.get_parameters(0).is_err());
    }

    #[test]
    fn exact_location_lookup() {
        let mut store = ParameterStore::new();
        store
            .set_parameters(Parameters::new(vec![1.0]), 0, loc(60.0, 10.0))
            .unwrap();
        store
            .set_parameters(Parameters::new(vec![2.0]), 0, loc(61.0, 10.0))
            .unwrap();

        let fetched = store
            .get_parameters_at(0, &loc(61.0, 10.0), false)
            .unwrap();
        assert_eq!(fetched.values(), &[2.0]);

        let absent = store
            .get_parameters_at(0, &loc(62.0, 10.0), false)
            .unwrap();
        assert!(absent.is_empty());
    }

    #[test]
    fn nearest_lookup_skips_empty_vectors() {
        // location B has an empty vector at time 0; the nearest
        // populated location must be substituted
        let mut store = ParameterStore::new();
        store
            .set_parameters(Parameters::new(vec![5.0]), 0, loc(60.0, 10.0))
            .unwrap();
        store
            .set_parameters(Parameters::default(), 0, loc(61.0, 10.0))
            .unwrap();

        let fetched = store.get_parameters_at(0, &loc(61.0, 10.0), true).unwrap();
        assert_eq!(fetched.values(), &[5.0]);
    }

    #[test]
    fn nearest_lookup_prefers_closest_populated() {
        let mut store = ParameterStore::new();
        store
            .set_parameters(Parameters::new(vec![1.0]), 0, loc(60.0, 10.0))
            .unwrap();
        store
            .set_parameters(Parameters::new(vec![2.0]), 0, loc(65.0, 10.0))
            .unwrap();
        store
            .set_parameters(Parameters::new(vec![3.0]), 0, loc(70.0, 10.0))
            .unwrap();

        let fetched = store.get_parameters_at(0, &loc(64.0, 10.0), true).unwrap();
        assert_eq!(fetched.values(), &[2.0]);
    }

    #[test]
    fn nearest_lookup_with_no_populated_location_reads_empty() {
        let mut store = ParameterStore::new();
        store
            .set_parameters(Parameters::default(), 0, loc(60.0, 10.0))
            .unwrap();
        store
            .set_parameters(Parameters::default(), 0, loc(61.0, 10.0))
            .unwrap();

        let fetched = store.get_parameters_at(0, &loc(60.5, 10.0), true).unwrap();
        assert!(fetched.is_empty());
    }

    #[test]
    fn mutation_invalidates_the_spatial_index() {
        let mut store = ParameterStore::new();
        store
            .set_parameters(Parameters::new(vec![1.0]), 0, loc(60.0, 10.0))
            .unwrap();
        store
            .set_parameters(Parameters::new(vec![2.0]), 0, loc(65.0, 10.0))
            .unwrap();

        // first query builds the index
        let fetched = store.get_parameters_at(0, &loc(66.0, 10.0), true).unwrap();
        assert_eq!(fetched.values(), &[2.0]);

        // a closer location added afterwards must win
        store
            .set_parameters(Parameters::new(vec![9.0]), 0, loc(66.5, 10.0))
            .unwrap();
        let fetched = store.get_parameters_at(0, &loc(66.0, 10.0), true).unwrap();
        assert_eq!(fetched.values(), &[9.0]);
    }

    #[test]
    fn num_parameters_reports_disagreement() {
        let mut store = ParameterStore::new();
        assert_eq!(store.num_parameters(), Some(0));

        store
            .set_parameters(Parameters::new(vec![1.0, 2.0]), 0, loc(60.0, 10.0))
            .unwrap();
        store
            .set_parameters(Parameters::default(), 0, loc(61.0, 10.0))
            .unwrap();
        assert_eq!(store.num_parameters(), Some(2));

        store
            .set_parameters(Parameters::new(vec![1.0]), 0, loc(62.0, 10.0))
            .unwrap();
        assert_eq!(store.num_parameters(), None);
    }

    #[test]
    fn unknown_format_is_rejected() {
        let options = Options::from_tokens("type=sqlite");
        assert!(load_parameter_store("anywhere", &options).is_err());
    }
}
