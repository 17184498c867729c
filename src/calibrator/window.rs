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

//! Running-window calibrator: each time step becomes a statistic of
//! the surrounding steps, cell by cell and member by member. The
//! window shrinks at the edges of the time axis.

use super::Statistic;
use crate::constants::is_valid;
use crate::errors::{ConfigError, PostError};
use crate::file::{Field, GriddedFile};
use crate::options::Options;
use crate::Float;

#[derive(Debug, PartialEq)]
pub struct Window {
    variable: String,
    length: usize,
    statistic: Statistic,
}

impl Window {
    pub(super) fn from_options(options: &Options) -> Result<Self, ConfigError> {
        Ok(Window {
            variable: options.require("Calibrator", "window", "variable")?,
            length: options.get("length").unwrap_or(1),
            statistic: Statistic::from_options(options)?,
        })
    }

    pub(super) fn description() -> &'static str {
        "Replaces each time step by a running statistic over time (length=, stat=)"
    }

    pub(super) fn calibrate_core(&self, file: &mut dyn GriddedFile) -> Result<(), PostError> {
        let num_time = file.num_time();
        if num_time == 0 {
            return Ok(());
        }

        let originals: Vec<Field> = (0..num_time)
            .map(|time| file.get_field(&self.variable, time))
            .collect::<Result<_, _>>()?;

        for time in 0..num_time {
            let from = time.saturating_sub(self.length);
            let to = (time + self.length).min(num_time - 1);

            let mut result = originals[time].clone();
            for ((i, j, e), value) in result.indexed_iter_mut() {
                let mut values: Vec<Float> = Vec::with_capacity(to - from + 1);
                for field in &originals[from..=to] {
                    let sample = field[[i, j, e]];
                    if is_valid(sample) {
                        values.push(sample);
                    }
                }
                *value = self.statistic.compute(&values);
            }

            file.add_field(&self.variable, time, result)?;
        }

        Ok(())
    }
}
