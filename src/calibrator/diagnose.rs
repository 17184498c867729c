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

//! Diagnostic calibrator: writes the designated variable as the
//! magnitude of two component variables, e.g. wind speed from U/V.

use crate::constants::{is_valid, MV};
use crate::errors::{ConfigError, DataError, PostError};
use crate::file::GriddedFile;
use crate::options::Options;

#[derive(Debug, PartialEq)]
pub struct Diagnose {
    variable: String,
    x_variable: String,
    y_variable: String,
}

impl Diagnose {
    pub(super) fn from_options(options: &Options) -> Result<Self, ConfigError> {
        Ok(Diagnose {
            variable: options.require("Calibrator", "diagnose", "variable")?,
            x_variable: options.require("Calibrator", "diagnose", "x")?,
            y_variable: options.require("Calibrator", "diagnose", "y")?,
        })
    }

    pub(super) fn description() -> &'static str {
        "Diagnoses the variable as the magnitude of component variables x= and y="
    }

    pub(super) fn calibrate_core(&self, file: &mut dyn GriddedFile) -> Result<(), PostError> {
        for component in [&self.x_variable, &self.y_variable] {
            if !file.has_variable(component) {
                return Err(DataError::MissingComponent {
                    calibrator: "diagnose",
                    variable: component.clone(),
                }
                .into());
            }
        }

        for time in 0..file.num_time() {
            let x_field = file.get_field(&self.x_variable, time)?;
            let y_field = file.get_field(&self.y_variable, time)?;

            let mut result = x_field.clone();
            for ((i, j, e), value) in result.indexed_iter_mut() {
                let x = x_field[[i, j, e]];
                let y = y_field[[i, j, e]];
                *value = if is_valid(x) && is_valid(y) {
                    x.hypot(y)
                } else {
                    MV
                };
            }

            file.add_field(&self.variable, time, result)?;
        }

        Ok(())
    }
}
