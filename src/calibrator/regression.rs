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

//! Linear regression calibrator: every member becomes
//! `intercept + slope * value` with coefficients from the parameter
//! store. Cells without coefficients become missing.
//!
//! The scheme can also train its coefficients from
//! `(observation, ensemble)` pairs by ordinary least squares on the
//! ensemble mean.

use crate::constants::{is_valid, MV};
use crate::errors::{ConfigError, DomainError, PostError};
use crate::file::GriddedFile;
use crate::options::Options;
use crate::params::{Location, ParameterStore, Parameters};
use crate::Float;
use nalgebra::{Matrix2, Vector2};

#[derive(Debug, PartialEq)]
pub struct Regression {
    variable: String,
}

impl Regression {
    pub(super) fn from_options(options: &Options) -> Result<Self, ConfigError> {
        let variable = options.require("Calibrator", "regression", "variable")?;
        Ok(Regression { variable })
    }

    pub(super) fn description() -> &'static str {
        "Applies intercept + slope from a parameter file to every member"
    }

    pub(super) fn calibrate_core(
        &self,
        file: &mut dyn GriddedFile,
        parameters: Option<&ParameterStore>,
    ) -> Result<(), PostError> {
        let store = match parameters {
            Some(store) => store,
            None => return Err(ConfigError::MissingParameterStore("regression").into()),
        };

        let lats = file.grid().lats().clone();
        let lons = file.grid().lons().clone();
        let elevs = file.grid().elevs().cloned();

        for time in 0..file.num_time() {
            let mut field = file.get_field(&self.variable, time)?;

            if store.is_location_dependent() {
                for i in 0..field.dim().0 {
                    for j in 0..field.dim().1 {
                        let elev = elevs.as_ref().map_or(0.0, |array| array[[i, j]]);
                        let location = Location::new(lats[[i, j]], lons[[i, j]], elev);
                        let coefficients =
                            store.get_parameters_at(time as i64, &location, true)?;
                        for e in 0..field.dim().2 {
                            field[[i, j, e]] = apply(&coefficients, field[[i, j, e]]);
                        }
                    }
                }
            } else {
                let coefficients = store.get_parameters(time as i64)?;
                for value in field.iter_mut() {
                    *value = apply(&coefficients, *value);
                }
            }

            file.add_field(&self.variable, time, field)?;
        }

        Ok(())
    }

    /// Ordinary least-squares fit of observations against the
    /// ensemble mean, producing `[intercept, slope]`.
    pub(super) fn train(&self, data: &[(Float, Vec<Float>)]) -> Result<Parameters, PostError> {
        let mut count = 0.0f64;
        let mut sum_x = 0.0f64;
        let mut sum_y = 0.0f64;
        let mut sum_xx = 0.0f64;
        let mut sum_xy = 0.0f64;

        for (observation, ensemble) in data {
            if !is_valid(*observation) {
                continue;
            }
            let valid: Vec<f64> = ensemble
                .iter()
                .filter(|&&member| is_valid(member))
                .map(|&member| f64::from(member))
                .collect();
            if valid.is_empty() {
                continue;
            }

            let x = valid.iter().sum::<f64>() / valid.len() as f64;
            let y = f64::from(*observation);
            count += 1.0;
            sum_x += x;
            sum_y += y;
            sum_xx += x * x;
            sum_xy += x * y;
        }

        if count < 2.0 {
            return Err(
                DomainError::TrainingDataInsufficient("regression", count as usize).into(),
            );
        }

        let normal = Matrix2::new(count, sum_x, sum_x, sum_xx);
        let moments = Vector2::new(sum_y, sum_xy);
        let solution = normal.lu().solve(&moments).ok_or(
            DomainError::TrainingDataInsufficient("regression", count as usize),
        )?;

        Ok(Parameters::new(vec![
            solution[0] as Float,
            solution[1] as Float,
        ]))
    }
}

fn apply(coefficients: &Parameters, value: Float) -> Float {
    if coefficients.len() < 2 || !is_valid(value) {
        return MV;
    }
    coefficients[0] + coefficients[1] * value
}
