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

//! Elevation-gradient downscaler.
//!
//! Values are copied from the nearest input point and corrected by a
//! vertical gradient times the elevation difference between the
//! output cell and that point. The gradient is fitted per member by
//! regressing values on elevation within a window around the nearest
//! point, or fixed with the `constantGradient` option.

use super::require_elevations;
use crate::constants::is_valid;
use crate::errors::{ConfigError, PostError};
use crate::file::{empty_field, Field, GriddedFile};
use crate::options::Options;
use crate::spatial::NeighbourCache;
use crate::Float;
use ndarray::Array2;

#[derive(Debug, PartialEq)]
pub struct Gradient {
    variable: String,
    search_radius: usize,
    min_elev_diff: Float,
    constant_gradient: Option<Float>,
}

impl Gradient {
    pub(super) fn from_options(options: &Options) -> Result<Self, ConfigError> {
        Ok(Gradient {
            variable: options.require("Downscaler", "gradient", "variable")?,
            search_radius: options.get("searchRadius").unwrap_or(3),
            min_elev_diff: options.get("minElevDiff").unwrap_or(0.0),
            constant_gradient: options.get("constantGradient"),
        })
    }

    pub(super) fn description() -> &'static str {
        "Corrects the nearest value by a locally fitted elevation gradient"
    }

    pub(super) fn downscale_core(
        &self,
        input: &dyn GriddedFile,
        output: &mut dyn GriddedFile,
        cache: &NeighbourCache,
    ) -> Result<(), PostError> {
        let (input_elevs, output_elevs) = require_elevations("gradient", input, output)?;
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

                    if !is_valid(target_elev) || !is_valid(source_elev) {
                        result[[i, j, e]] = base;
                        continue;
                    }

                    let delta = target_elev - source_elev;
                    if delta.abs() < self.min_elev_diff {
                        result[[i, j, e]] = base;
                        continue;
                    }

                    let gradient = match self.constant_gradient {
                        Some(gradient) => gradient,
                        None => {
                            local_gradient(&source, &input_elevs, si, sj, e, self.search_radius)
                        }
                    };
                    result[[i, j, e]] = base + gradient * delta;
                }
            }

            output.add_field(&self.variable, time, result)?;
        }

        Ok(())
    }
}

/// Least-squares slope of value against elevation within the window.
/// Degenerate windows (fewer than two points or nearly flat terrain)
/// fit no gradient.
fn local_gradient(
    field: &Field,
    elevs: &Array2<Float>,
    center_i: usize,
    center_j: usize,
    member: usize,
    radius: usize,
) -> Float {
    let (num_lat, num_lon) = elevs.dim();
    let i_from = center_i.saturating_sub(radius);
    let i_to = (center_i + radius).min(num_lat - 1);
    let j_from = center_j.saturating_sub(radius);
    let j_to = (center_j + radius).min(num_lon - 1);

    let mut count = 0.0f64;
    let mut sum_x = 0.0f64;
    let mut sum_y = 0.0f64;
    let mut sum_xx = 0.0f64;
    let mut sum_xy = 0.0f64;

    for i in i_from..=i_to {
        for j in j_from..=j_to {
            let elev = elevs[[i, j]];
            let value = field[[i, j, member]];
            if !is_valid(elev) || !is_valid(value) {
                continue;
            }
            let x = f64::from(elev);
            let y = f64::from(value);
            count += 1.0;
            sum_x += x;
            sum_y += y;
            sum_xx += x * x;
            sum_xy += x * y;
        }
    }

    if count < 2.0 {
        return 0.0;
    }
    let variance = sum_xx - sum_x * sum_x / count;
    if variance < 1e-3 {
        return 0.0;
    }

    ((sum_xy - sum_x * sum_y / count) / variance) as Float
}
