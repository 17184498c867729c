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

//! Pressure downscaler: exponential adjustment of the nearest value
//! by the elevation difference.

use super::require_elevations;
use crate::constants::is_valid;
use crate::errors::{ConfigError, PostError};
use crate::file::{empty_field, GriddedFile};
use crate::options::Options;
use crate::spatial::NeighbourCache;

/// Inverse scale height (1/m) of an isothermal standard atmosphere.
const DECAY_RATE: f64 = 1.21e-4;

#[derive(Debug, PartialEq)]
pub struct Pressure {
    variable: String,
}

impl Pressure {
    pub(super) fn from_options(options: &Options) -> Result<Self, ConfigError> {
        let variable = options.require("Downscaler", "pressure", "variable")?;
        Ok(Pressure { variable })
    }

    pub(super) fn description() -> &'static str {
        "Adjusts the nearest pressure value exponentially for the elevation difference"
    }

    pub(super) fn downscale_core(
        &self,
        input: &dyn GriddedFile,
        output: &mut dyn GriddedFile,
        cache: &NeighbourCache,
    ) -> Result<(), PostError> {
        let (input_elevs, output_elevs) = require_elevations("pressure", input, output)?;
        let map = cache.nearest_neighbour_map(input.grid(), output.grid());
        let num_ens = output.num_ens();

        for time in 0..input.num_time() {
            let source = input.get_field(&self.variable, time)?;
            let mut result = empty_field(output.num_lat(), output.num_lon(), num_ens);

            for ((i, j), &slot) in map.indexed_iter() {
                let (si, sj) = match slot {
                    Some(indices) => indices,
                    None => continue,
                };
                let target_elev = output_elevs[[i, j]];
                let source_elev = input_elevs[[si, sj]];

                for e in 0..num_ens {
                    let base = source[[si, sj, e]];
                    if !is_valid(base) {
                        continue;
                    }

                    result[[i, j, e]] = if is_valid(target_elev) && is_valid(source_elev) {
                        let delta = f64::from(target_elev - source_elev);
                        (f64::from(base) * (-DECAY_RATE * delta).exp()) as crate::Float
                    } else {
                        base
                    };
                }
            }

            output.add_field(&self.variable, time, result)?;
        }

        Ok(())
    }
}
