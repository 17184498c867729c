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

//! Range check calibrator: values outside [min, max] become missing.

use crate::constants::{is_valid, MV};
use crate::errors::{ConfigError, PostError};
use crate::file::GriddedFile;
use crate::options::Options;
use crate::Float;

#[derive(Debug, PartialEq)]
pub struct Qc {
    variable: String,
    min: Option<Float>,
    max: Option<Float>,
}

impl Qc {
    pub(super) fn from_options(options: &Options) -> Result<Self, ConfigError> {
        Ok(Qc {
            variable: options.require("Calibrator", "qc", "variable")?,
            min: options.get("min"),
            max: options.get("max"),
        })
    }

    pub(super) fn description() -> &'static str {
        "Removes values outside the range given by min= and max="
    }

    pub(super) fn calibrate_core(&self, file: &mut dyn GriddedFile) -> Result<(), PostError> {
        for time in 0..file.num_time() {
            let mut field = file.get_field(&self.variable, time)?;

            for value in field.iter_mut() {
                if !is_valid(*value) {
                    continue;
                }
                let below = self.min.map_or(false, |min| *value < min);
                let above = self.max.map_or(false, |max| *value > max);
                if below || above {
                    *value = MV;
                }
            }

            file.add_field(&self.variable, time, field)?;
        }

        Ok(())
    }
}
