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

//! Downscalers populate a variable in the output file from the input
//! file's values, honouring the output grid.
//!
//! The set of schemes is closed: construction goes through
//! [`Downscaler::from_name`] and dispatch through the enum. All
//! schemes are pure in (source field, target grid) and share the
//! nearest-neighbour index map infrastructure.

mod bypass;
mod gradient;
mod nearest;
mod pressure;
mod smart;

use crate::errors::{ConfigError, DataError, PostError};
use crate::file::GriddedFile;
use crate::options::Options;
use crate::spatial::NeighbourCache;
use crate::Float;
use ndarray::Array2;

use bypass::Bypass;
use gradient::Gradient;
use nearest::NearestNeighbour;
use pressure::Pressure;
use smart::Smart;

#[derive(Debug, PartialEq)]
pub enum Downscaler {
    NearestNeighbour(NearestNeighbour),
    Gradient(Gradient),
    Smart(Smart),
    Pressure(Pressure),
    Bypass(Bypass),
}

impl Downscaler {
    /// Instantiates a downscaler by scheme name. Unknown names and
    /// missing required options are configuration errors.
    pub fn from_name(name: &str, options: &Options) -> Result<Self, PostError> {
        match name {
            "nearestNeighbour" => Ok(Downscaler::NearestNeighbour(NearestNeighbour::from_options(
                options,
            )?)),
            "gradient" => Ok(Downscaler::Gradient(Gradient::from_options(options)?)),
            "smart" => Ok(Downscaler::Smart(Smart::from_options(options)?)),
            "pressure" => Ok(Downscaler::Pressure(Pressure::from_options(options)?)),
            "bypass" => Ok(Downscaler::Bypass(Bypass::from_options(options)?)),
            _ => Err(ConfigError::UnknownDownscaler(name.to_string()).into()),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Downscaler::NearestNeighbour(_) => "nearestNeighbour",
            Downscaler::Gradient(_) => "gradient",
            Downscaler::Smart(_) => "smart",
            Downscaler::Pressure(_) => "pressure",
            Downscaler::Bypass(_) => "bypass",
        }
    }

    pub fn requires_parameter_file(&self) -> bool {
        false
    }

    /// Populates the output file for every time step.
    pub fn downscale(
        &self,
        input: &dyn GriddedFile,
        output: &mut dyn GriddedFile,
        cache: &NeighbourCache,
    ) -> Result<(), PostError> {
        if input.num_time() != output.num_time() {
            return Err(DataError::TimeCountMismatch {
                input: input.num_time(),
                output: output.num_time(),
            }
            .into());
        }
        if input.num_ens() != output.num_ens() {
            return Err(DataError::EnsembleSizeMismatch {
                input: input.num_ens(),
                output: output.num_ens(),
            }
            .into());
        }

        match self {
            Downscaler::NearestNeighbour(scheme) => scheme.downscale_core(input, output, cache),
            Downscaler::Gradient(scheme) => scheme.downscale_core(input, output, cache),
            Downscaler::Smart(scheme) => scheme.downscale_core(input, output, cache),
            Downscaler::Pressure(scheme) => scheme.downscale_core(input, output, cache),
            Downscaler::Bypass(scheme) => scheme.downscale_core(input, output),
        }
    }
}

pub fn descriptions() -> String {
    let mut out = String::new();
    for (name, description) in [
        ("nearestNeighbour", NearestNeighbour::description()),
        ("gradient", Gradient::description()),
        ("smart", Smart::description()),
        ("pressure", Pressure::description()),
        ("bypass", Bypass::description()),
    ] {
        out.push_str(&format!("   {:<17}{}\n", name, description));
    }
    out
}

/// Elevation arrays of both grids, required by the terrain-aware
/// schemes. Returned by value so the output file stays borrowable
/// while fields are written.
fn require_elevations(
    name: &'static str,
    input: &dyn GriddedFile,
    output: &dyn GriddedFile,
) -> Result<(Array2<Float>, Array2<Float>), PostError> {
    match (input.grid().elevs(), output.grid().elevs()) {
        (Some(input_elevs), Some(output_elevs)) => {
            Ok((input_elevs.clone(), output_elevs.clone()))
        }
        _ => Err(DataError::MissingElevation(name).into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file::{Grid, MemoryFile};
    use ndarray::Array2;

    pub(super) fn grid(num_lat: usize, num_lon: usize, lat0: Float) -> Grid {
        let lats = Array2::from_shape_fn((num_lat, num_lon), |(i, _)| lat0 + i as Float);
        let lons = Array2::from_shape_fn((num_lat, num_lon), |(_, j)| 5.0 + j as Float);
        Grid::new(lats, lons).unwrap()
    }

    #[test]
    fn unknown_scheme_is_rejected() {
        let options = Options::from_tokens("variable=T");
        assert!(Downscaler::from_name("bilinear", &options).is_err());
    }

    #[test]
    fn schemes_need_a_variable() {
        for name in ["nearestNeighbour", "gradient", "smart", "pressure", "bypass"] {
            let err = Downscaler::from_name(name, &Options::new()).unwrap_err();
            assert!(err.to_string().contains("needs variable"), "{}", name);
        }
    }

    #[test]
    fn time_count_mismatch_is_rejected() {
        let options = Options::from_tokens("variable=T");
        let scheme = Downscaler::from_name("nearestNeighbour", &options).unwrap();
        let cache = NeighbourCache::new();

        let input = MemoryFile::new(grid(2, 2, 40.0), vec![0.0, 3600.0], 1);
        let mut output = MemoryFile::new(grid(2, 2, 40.0), vec![0.0], 1);
        assert!(scheme.downscale(&input, &mut output, &cache).is_err());
    }

    #[test]
    fn ensemble_mismatch_is_rejected() {
        let options = Options::from_tokens("variable=T");
        let scheme = Downscaler::from_name("nearestNeighbour", &options).unwrap();
        let cache = NeighbourCache::new();

        let input = MemoryFile::new(grid(2, 2, 40.0), vec![0.0], 2);
        let mut output = MemoryFile::new(grid(2, 2, 40.0), vec![0.0], 3);
        assert!(scheme.downscale(&input, &mut output, &cache).is_err());
    }
}
