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

//! Smart neighbour downscaler.
//!
//! For each output cell the scheme searches a window around the
//! nearest input point and averages the `numSmart` input cells whose
//! elevation is closest to the output cell's elevation. With
//! `minElevDiff`, a nearest point already within that margin is used
//! directly.

use super::require_elevations;
use crate::constants::{is_valid, MV};
use crate::errors::{ConfigError, PostError};
use crate::file::{empty_field, GriddedFile};
use crate::options::Options;
use crate::spatial::NeighbourCache;
use crate::Float;

#[derive(Debug, PartialEq)]
pub struct Smart {
    variable: String,
    search_radius: usize,
    num_smart: usize,
    min_elev_diff: Option<Float>,
}

impl Smart {
    pub(super) fn from_options(options: &Options) -> Result<Self, ConfigError> {
        Ok(Smart {
            variable: options.require("Downscaler", "smart", "variable")?,
            search_radius: options.get("searchRadius").unwrap_or(11),
            num_smart: options.get("numSmart").unwrap_or(5),
            min_elev_diff: options.get("minElevDiff"),
        })
    }

    pub(super) fn description() -> &'static str {
        "Averages the input cells with the most similar elevation near each output cell"
    }

    pub(super) fn downscale_core(
        &self,
        input: &dyn GriddedFile,
        output: &mut dyn GriddedFile,
        cache: &NeighbourCache,
    ) -> Result<(), PostError> {
        let (input_elevs, output_elevs) = require_elevations("smart", input, output)?;
        let map = cache.nearest_neighbour_map(input.grid(), output.grid());
        let num_ens = output.num_ens();
        let (num_lat, num_lon) = input_elevs.dim();

        for time in 0..input.num_time() {
            let source = input.get_field(&self.variable, time)?;
            let mut result = empty_field(output.num_lat(), output.num_lon(), num_ens);

            for ((i, j), &slot) in map.indexed_iter() {
                let (si, sj) = match slot {
                    Some(indices) => indices,
                    None => continue,
                };
                let target_elev = output_elevs[[i, j]];

                let copy_nearest = !is_valid(target_elev)
                    || self.min_elev_diff.map_or(false, |margin| {
                        let nearest_elev = input_elevs[[si, sj]];
                        is_valid(nearest_elev) && (target_elev - nearest_elev).abs() <= margin
                    });
                if copy_nearest {
                    for e in 0..num_ens {
                        result[[i, j, e]] = source[[si, sj, e]];
                    }
                    continue;
                }

                // rank window cells by elevation similarity
                let i_from = si.saturating_sub(self.search_radius);
                let i_to = (si + self.search_radius).min(num_lat - 1);
                let j_from = sj.saturating_sub(self.search_radius);
                let j_to = (sj + self.search_radius).min(num_lon - 1);

                let mut candidates: Vec<(Float, usize, usize)> = Vec::new();
                for ii in i_from..=i_to {
                    for jj in j_from..=j_to {
                        let elev = input_elevs[[ii, jj]];
                        if is_valid(elev) {
                            candidates.push(((elev - target_elev).abs(), ii, jj));
                        }
                    }
                }

                if candidates.is_empty() {
                    for e in 0..num_ens {
                        result[[i, j, e]] = source[[si, sj, e]];
                    }
                    continue;
                }

                candidates.sort_by(|a, b| a.0.total_cmp(&b.0));
                candidates.truncate(self.num_smart);

                for e in 0..num_ens {
                    let mut sum = 0.0f64;
                    let mut count = 0usize;
                    for &(_, ii, jj) in &candidates {
                        let value = source[[ii, jj, e]];
                        if is_valid(value) {
                            sum += f64::from(value);
                            count += 1;
                        }
                    }
                    result[[i, j, e]] = if count == 0 {
                        MV
                    } else {
                        (sum / count as f64) as Float
                    };
                }
            }

            output.add_field(&self.variable, time, result)?;
        }

        Ok(())
    }
}
