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

//! Accumulation calibrator: turns per-step rates into running totals
//! along the time axis. A missing step poisons the rest of the
//! series for that cell.

use crate::constants::{is_valid, MV};
use crate::errors::{ConfigError, PostError};
use crate::file::GriddedFile;
use crate::options::Options;

#[derive(Debug, PartialEq)]
pub struct Accumulate {
    variable: String,
}

impl Accumulate {
    pub(super) fn from_options(options: &Options) -> Result<Self, ConfigError> {
        let variable = options.require("Calibrator", "accumulate", "variable")?;
        Ok(Accumulate { variable })
    }

    pub(super) fn description() -> &'static str {
        "Accumulates per-step values into running totals over the time axis"
    }

    pub(super) fn calibrate_core(&self, file: &mut dyn GriddedFile) -> Result<(), PostError> {
        if file.num_time() == 0 {
            return Ok(());
        }

        let mut accumulated = file.get_field(&self.variable, 0)?;
        file.add_field(&self.variable, 0, accumulated.clone())?;

        for time in 1..file.num_time() {
            let step = file.get_field(&self.variable, time)?;
            for (previous, current) in accumulated.iter_mut().zip(step.iter()) {
                *previous = if is_valid(*previous) && is_valid(*current) {
                    *previous + *current
                } else {
                    MV
                };
            }
            file.add_field(&self.variable, time, accumulated.clone())?;
        }

        Ok(())
    }
}
