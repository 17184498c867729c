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

//! Gridded forecast files: the grid and field data model and the
//! capability consumed by downscalers, calibrators and the driver.
//!
//! Concrete formats implement [`GriddedFile`]. The repository ships a
//! plain-text format and an in-memory backend; NetCDF and GRIB
//! readers are external collaborators that would plug in behind the
//! same trait.

mod memory;
mod text;

pub use memory::MemoryFile;
pub use text::TextFile;

use crate::constants::MV;
use crate::errors::{ConfigError, DataError, PostError};
use crate::options::Options;
use crate::Float;
use ndarray::{Array2, Array3};
use std::sync::atomic::{AtomicU64, Ordering};

/// A dense ensemble field indexed by (latitude, longitude, member).
/// Missing values carry the sentinel.
pub type Field = Array3<Float>;

/// Creates a field of the given shape filled with missing values.
pub fn empty_field(num_lat: usize, num_lon: usize, num_ens: usize) -> Field {
    Array3::from_elem((num_lat, num_lon, num_ens), MV)
}

static NEXT_GRID_TAG: AtomicU64 = AtomicU64::new(0);

/// Horizontal grid of a file: parallel latitude/longitude arrays in
/// degrees with optional altitudes and land fractions.
///
/// Every grid receives a process-unique tag on creation. The tag is
/// the cache key for neighbour maps; equal tags imply identical
/// coordinate arrays, so content is never hashed on the hot path.
#[derive(Clone, Debug)]
pub struct Grid {
    lats: Array2<Float>,
    lons: Array2<Float>,
    elevs: Option<Array2<Float>>,
    land_fractions: Option<Array2<Float>>,
    tag: u64,
}

impl Grid {
    pub fn new(lats: Array2<Float>, lons: Array2<Float>) -> Result<Self, DataError> {
        if lats.dim() != lons.dim() {
            return Err(DataError::GridShapeMismatch {
                lats: lats.dim(),
                lons: lons.dim(),
            });
        }

        Ok(Grid {
            lats,
            lons,
            elevs: None,
            land_fractions: None,
            tag: NEXT_GRID_TAG.fetch_add(1, Ordering::Relaxed),
        })
    }

    pub fn set_elevations(&mut self, elevs: Array2<Float>) -> Result<(), DataError> {
        if elevs.dim() != self.lats.dim() {
            return Err(DataError::BadGridField {
                field: "altitude",
                expected: self.lats.dim(),
                actual: elevs.dim(),
            });
        }
        self.elevs = Some(elevs);
        Ok(())
    }

    pub fn set_land_fractions(&mut self, land_fractions: Array2<Float>) -> Result<(), DataError> {
        if land_fractions.dim() != self.lats.dim() {
            return Err(DataError::BadGridField {
                field: "land fraction",
                expected: self.lats.dim(),
                actual: land_fractions.dim(),
            });
        }
        self.land_fractions = Some(land_fractions);
        Ok(())
    }

    pub fn num_lat(&self) -> usize {
        self.lats.nrows()
    }

    pub fn num_lon(&self) -> usize {
        self.lats.ncols()
    }

    pub fn lats(&self) -> &Array2<Float> {
        &self.lats
    }

    pub fn lons(&self) -> &Array2<Float> {
        &self.lons
    }

    pub fn elevs(&self) -> Option<&Array2<Float>> {
        self.elevs.as_ref()
    }

    pub fn land_fractions(&self) -> Option<&Array2<Float>> {
        self.land_fractions.as_ref()
    }

    pub fn unique_tag(&self) -> u64 {
        self.tag
    }

    /// Element-wise equality of the coordinate arrays. Used for the
    /// identity short-circuit in neighbour searches.
    pub fn same_geometry(&self, other: &Grid) -> bool {
        self.lats == other.lats && self.lons == other.lons
    }
}

/// Capability of a gridded forecast file as consumed by the core: an
/// ordered time axis, a fixed ensemble size, and per
/// (variable, time) field access.
pub trait GriddedFile {
    /// Identifier used in messages, normally the file path.
    fn name(&self) -> &str;

    fn grid(&self) -> &Grid;

    /// Valid times of the file as floating-point timestamps.
    fn times(&self) -> &[f64];

    fn num_ens(&self) -> usize;

    fn num_time(&self) -> usize {
        self.times().len()
    }

    fn num_lat(&self) -> usize {
        self.grid().num_lat()
    }

    fn num_lon(&self) -> usize {
        self.grid().num_lon()
    }

    fn unique_tag(&self) -> u64 {
        self.grid().unique_tag()
    }

    fn has_variable(&self, variable: &str) -> bool;

    /// Makes the variable known to the file so fields can be added.
    fn define_variable(&mut self, variable: &str);

    /// Returns the field for a variable at a time index. A defined
    /// variable with no data yet yields an all-missing field.
    fn get_field(&self, variable: &str, time: usize) -> Result<Field, PostError>;

    fn add_field(&mut self, variable: &str, time: usize, field: Field) -> Result<(), PostError>;

    /// Flushes buffered fields to the backing store.
    fn write(&mut self) -> Result<(), PostError>;
}

/// Opens a gridded file with the format selected by the `type`
/// option. The on-disk text format is the default.
pub fn open_gridded_file(path: &str, options: &Options) -> Result<Box<dyn GriddedFile>, PostError> {
    let format = options
        .get::<String>("type")
        .unwrap_or_else(|| "text".to_string());

    match format.as_str() {
        "text" => Ok(Box::new(TextFile::open(path, options)?)),
        "netcdf" => Err(ConfigError::UnavailableFileFormat("netcdf").into()),
        "grib" => Err(ConfigError::UnavailableFileFormat("grib").into()),
        _ => Err(ConfigError::UnknownFileFormat(format).into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn grid_tags_are_unique() {
        let lats = array![[0.0, 0.0], [1.0, 1.0]];
        let lons = array![[0.0, 1.0], [0.0, 1.0]];
        let a = Grid::new(lats.clone(), lons.clone()).unwrap();
        let b = Grid::new(lats, lons).unwrap();
        assert_ne!(a.unique_tag(), b.unique_tag());
        assert!(a.same_geometry(&b));
    }

    #[test]
    fn grid_rejects_shape_mismatch() {
        let lats = array![[0.0, 0.0]];
        let lons = array![[0.0], [1.0]];
        assert!(Grid::new(lats, lons).is_err());
    }

    #[test]
    fn grid_rejects_misshapen_elevations() {
        let lats = array![[0.0, 0.0]];
        let lons = array![[0.0, 1.0]];
        let mut grid = Grid::new(lats, lons).unwrap();
        assert!(grid.set_elevations(array![[10.0]]).is_err());
        assert!(grid.set_elevations(array![[10.0, 20.0]]).is_ok());
    }

    #[test]
    fn unknown_file_format_is_rejected() {
        let options = Options::from_tokens("type=hdf4");
        assert!(open_gridded_file("somewhere", &options).is_err());
    }
}
