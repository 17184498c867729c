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

//! Gaussian ensemble calibrator.
//!
//! Fits a normal distribution with corrected moments
//! `mean' = p0 + p1 * mean`, `spread' = p2 + p3 * spread` and redraws
//! the members at the quantiles `(e+1)/(N+1)`. The redraw is passed
//! through the rank-preserving shuffle so members keep their original
//! ordering.

use super::shuffle;
use crate::constants::{is_valid, MV};
use crate::errors::{ConfigError, PostError};
use crate::file::GriddedFile;
use crate::options::Options;
use crate::params::{Location, ParameterStore, Parameters};
use crate::Float;

#[derive(Debug, PartialEq)]
pub struct Gaussian {
    variable: String,
}

impl Gaussian {
    pub(super) fn from_options(options: &Options) -> Result<Self, ConfigError> {
        let variable = options.require("Calibrator", "gaussian", "variable")?;
        Ok(Gaussian { variable })
    }

    pub(super) fn description() -> &'static str {
        "Redraws members from a normal fit with corrected mean and spread"
    }

    pub(super) fn calibrate_core(
        &self,
        file: &mut dyn GriddedFile,
        parameters: Option<&ParameterStore>,
    ) -> Result<(), PostError> {
        let store = match parameters {
            Some(store) => store,
            None => return Err(ConfigError::MissingParameterStore("gaussian").into()),
        };

        let lats = file.grid().lats().clone();
        let lons = file.grid().lons().clone();
        let num_ens = file.num_ens();

        for time in 0..file.num_time() {
            let mut field = file.get_field(&self.variable, time)?;

            let shared = if store.is_location_dependent() {
                None
            } else {
                Some(store.get_parameters(time as i64)?)
            };

            for i in 0..field.dim().0 {
                for j in 0..field.dim().1 {
                    let coefficients = match &shared {
                        Some(coefficients) => coefficients.clone(),
                        None => {
                            let location = Location::new(lats[[i, j]], lons[[i, j]], 0.0);
                            store.get_parameters_at(time as i64, &location, true)?
                        }
                    };

                    let members: Vec<Float> = (0..num_ens).map(|e| field[[i, j, e]]).collect();
                    if members.iter().any(|&member| !is_valid(member)) {
                        continue;
                    }

                    if coefficients.len() != 4 {
                        for e in 0..num_ens {
                            field[[i, j, e]] = MV;
                        }
                        continue;
                    }

                    let calibrated = redraw(&members, &coefficients);
                    for (e, value) in calibrated.into_iter().enumerate() {
                        field[[i, j, e]] = value;
                    }
                }
            }

            file.add_field(&self.variable, time, field)?;
        }

        Ok(())
    }
}

/// Redraws the ensemble at even quantiles of the corrected normal
/// and restores the original member ranking.
fn redraw(members: &[Float], coefficients: &Parameters) -> Vec<Float> {
    let count = members.len();
    let mean = members.iter().map(|&v| f64::from(v)).sum::<f64>() / count as f64;
    let variance = members
        .iter()
        .map(|&v| (f64::from(v) - mean).powi(2))
        .sum::<f64>()
        / count as f64;
    let spread = variance.sqrt();

    let new_mean = f64::from(coefficients[0]) + f64::from(coefficients[1]) * mean;
    let new_spread = (f64::from(coefficients[2]) + f64::from(coefficients[3]) * spread).max(0.0);

    let mut calibrated: Vec<Float> = (0..count)
        .map(|e| {
            let probability = (e + 1) as f64 / (count + 1) as f64;
            (new_mean + new_spread * inverse_normal_cdf(probability)) as Float
        })
        .collect();

    shuffle(members, &mut calibrated);
    calibrated
}

/// Inverse CDF of the standard normal distribution, Acklam's
/// rational approximation (relative error below 1.2e-9).
fn inverse_normal_cdf(probability: f64) -> f64 {
    const A: [f64; 6] = [
        -3.969683028665376e+01,
        2.209460984245205e+02,
        -2.759285104469687e+02,
        1.383577518672690e+02,
        -3.066479806614716e+01,
        2.506628277459239e+00,
    ];
    const B: [f64; 5] = [
        -5.447609879822406e+01,
        1.615858368580409e+02,
        -1.556989798598866e+02,
        6.680131188771972e+01,
        -1.328068155288572e+01,
    ];
    const C: [f64; 6] = [
        -7.784894002430293e-03,
        -3.223964580411365e-01,
        -2.400758277161838e+00,
        -2.549732539343734e+00,
        4.374664141464968e+00,
        2.938163982698783e+00,
    ];
    const D: [f64; 4] = [
        7.784695709041462e-03,
        3.224671290700398e-01,
        2.445134137142996e+00,
        3.754408661907416e+00,
    ];
    const P_LOW: f64 = 0.02425;

    if probability < P_LOW {
        let q = (-2.0 * probability.ln()).sqrt();
        (((((C[0] * q + C[1]) * q + C[2]) * q + C[3]) * q + C[4]) * q + C[5])
            / ((((D[0] * q + D[1]) * q + D[2]) * q + D[3]) * q + 1.0)
    } else if probability <= 1.0 - P_LOW {
        let q = probability - 0.5;
        let r = q * q;
        (((((A[0] * r + A[1]) * r + A[2]) * r + A[3]) * r + A[4]) * r + A[5]) * q
            / (((((B[0] * r + B[1]) * r + B[2]) * r + B[3]) * r + B[4]) * r + 1.0)
    } else {
        let q = (-2.0 * (1.0 - probability).ln()).sqrt();
        -((((((C[0] * q + C[1]) * q + C[2]) * q + C[3]) * q + C[4]) * q + C[5])
            / ((((D[0] * q + D[1]) * q + D[2]) * q + D[3]) * q + 1.0))
    }
}
