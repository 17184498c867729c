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

//! Sort calibrator: orders the ensemble members of each cell
//! ascending. Cells containing a missing member are left untouched.

use crate::constants::is_valid;
use crate::errors::{ConfigError, PostError};
use crate::file::GriddedFile;
use crate::options::Options;
use crate::Float;

#[derive(Debug, PartialEq)]
pub struct Sort {
    variable: String,
}

impl Sort {
    pub(super) fn from_options(options: &Options) -> Result<Self, ConfigError> {
        let variable = options.require("Calibrator", "sort", "variable")?;
        Ok(Sort { variable })
    }

    pub(super) fn description() -> &'static str {
        "Sorts the ensemble members of every cell ascending"
    }

    pub(super) fn calibrate_core(&self, file: &mut dyn GriddedFile) -> Result<(), PostError> {
        let num_ens = file.num_ens();

        for time in 0..file.num_time() {
            let mut field = file.get_field(&self.variable, time)?;

            for i in 0..field.dim().0 {
                for j in 0..field.dim().1 {
                    let mut members: Vec<Float> =
                        (0..num_ens).map(|e| field[[i, j, e]]).collect();
                    if members.iter().any(|&v| !is_valid(v)) {
                        continue;
                    }
                    members.sort_by(Float::total_cmp);
                    for (e, value) in members.into_iter().enumerate() {
                        field[[i, j, e]] = value;
                    }
                }
            }

            file.add_field(&self.variable, time, field)?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::file;
    use super::super::Calibrator;
    use crate::constants::MV;
    use crate::file::GriddedFile;
    use crate::options::Options;
    use crate::Float;
    use ndarray::Array3;

    #[test]
    fn members_are_sorted() {
        let scheme = Calibrator::from_name("sort", &Options::from_tokens("variable=T")).unwrap();

        let mut target = file(1, 1, 4, 1);
        let values = [3.0 as Float, 1.0, 4.0, 2.0];
        let field = Array3::from_shape_fn((1, 1, 4), |(_, _, e)| values[e]);
        target.add_field("T", 0, field).unwrap();

        scheme.calibrate(&mut target, None).unwrap();
        let result = target.get_field("T", 0).unwrap();
        let sorted: Vec<Float> = (0..4).map(|e| result[[0, 0, e]]).collect();
        assert_eq!(sorted, vec![1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn cells_with_missing_members_are_untouched() {
        let scheme = Calibrator::from_name("sort", &Options::from_tokens("variable=T")).unwrap();

        let mut target = file(1, 1, 3, 1);
        let values = [3.0 as Float, MV, 1.0];
        let field = Array3::from_shape_fn((1, 1, 3), |(_, _, e)| values[e]);
        target.add_field("T", 0, field).unwrap();

        scheme.calibrate(&mut target, None).unwrap();
        let result = target.get_field("T", 0).unwrap();
        let kept: Vec<Float> = (0..3).map(|e| result[[0, 0, e]]).collect();
        assert_eq!(kept, vec![3.0, MV, 1.0]);
    }
}
