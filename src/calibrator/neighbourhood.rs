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

//! Neighbourhood smoother: each cell becomes a statistic of the
//! valid values in a square window around it, member by member.

use super::Statistic;
use crate::constants::is_valid;
use crate::errors::{ConfigError, PostError};
use crate::file::{Field, GriddedFile};
use crate::options::Options;
use crate::Float;
use ndarray::Array3;
use rayon::prelude::*;

#[derive(Debug, PartialEq)]
pub struct Neighbourhood {
    variable: String,
    radius: usize,
    statistic: Statistic,
}

impl Neighbourhood {
    pub(super) fn from_options(options: &Options) -> Result<Self, ConfigError> {
        Ok(Neighbourhood {
            variable: options.require("Calibrator", "neighbourhood", "variable")?,
            radius: options.get("radius").unwrap_or(3),
            statistic: Statistic::from_options(options)?,
        })
    }

    pub(super) fn description() -> &'static str {
        "Smooths each member with a square-window statistic (radius=, stat=)"
    }

    pub(super) fn calibrate_core(&self, file: &mut dyn GriddedFile) -> Result<(), PostError> {
        for time in 0..file.num_time() {
            let field = file.get_field(&self.variable, time)?;
            let smoothed = self.smooth(&field);
            file.add_field(&self.variable, time, smoothed)?;
        }
        Ok(())
    }

    /// Window statistic over the whole field, parallel over latitude
    /// rows: each row reads the shared input and writes only itself.
    fn smooth(&self, field: &Field) -> Field {
        let (num_lat, num_lon, num_ens) = field.dim();
        let radius = self.radius;

        let rows: Vec<Vec<Float>> = (0..num_lat)
            .into_par_iter()
            .map(|i| {
                let i_from = i.saturating_sub(radius);
                let i_to = (i + radius).min(num_lat - 1);
                let mut row = Vec::with_capacity(num_lon * num_ens);

                for j in 0..num_lon {
                    let j_from = j.saturating_sub(radius);
                    let j_to = (j + radius).min(num_lon - 1);

                    for e in 0..num_ens {
                        let mut values = Vec::new();
                        for ii in i_from..=i_to {
                            for jj in j_from..=j_to {
                                let value = field[[ii, jj, e]];
                                if is_valid(value) {
                                    values.push(value);
                                }
                            }
                        }
                        row.push(self.statistic.compute(&values));
                    }
                }
                row
            })
            .collect();

        let flat: Vec<Float> = rows.into_iter().flatten().collect();
        Array3::from_shape_vec((num_lat, num_lon, num_ens), flat)
            .expect("row-collected field has grid shape")
    }
}
