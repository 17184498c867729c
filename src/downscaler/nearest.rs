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

//! Nearest-neighbour downscaler.

use crate::errors::{ConfigError, PostError};
use crate::file::{empty_field, GriddedFile};
use crate::options::Options;
use crate::spatial::NeighbourCache;

#[derive(Debug, PartialEq)]
pub struct NearestNeighbour {
    variable: String,
}

impl NearestNeighbour {
    pub(super) fn from_options(options: &Options) -> Result<Self, ConfigError> {
        let variable = options.require("Downscaler", "nearestNeighbour", "variable")?;
        Ok(NearestNeighbour { variable })
    }

    pub(super) fn description() -> &'static str {
        "Copies the value of the nearest input grid point onto each output cell"
    }

    pub(super) fn downscale_core(
        &self,
        input: &dyn GriddedFile,
        output: &mut dyn GriddedFile,
        cache: &NeighbourCache,
    ) -> Result<(), PostError> {
        let map = cache.nearest_neighbour_map(input.grid(), output.grid());
        let num_ens = output.num_ens();

        for time in 0..input.num_time() {
            let source = input.get_field(&self.variable, time)?;
            let mut result = empty_field(output.num_lat(), output.num_lon(), num_ens);

            for ((i, j), &slot) in map.indexed_iter() {
                if let Some((si, sj)) = slot {
                    for e in 0..num_ens {
                        result[[i, j, e]] = source[[si, sj, e]];
                    }
                }
            }

            output.add_field(&self.variable, time, result)?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::grid;
    use super::super::Downscaler;
    use crate::constants::MV;
    use crate::file::{GriddedFile, MemoryFile};
    use crate::options::Options;
    use crate::spatial::NeighbourCache;
    use crate::Float;
    use ndarray::Array3;

    #[test]
    fn copies_nearest_values() {
        let scheme =
            Downscaler::from_name("nearestNeighbour", &Options::from_tokens("variable=T")).unwrap();
        let cache = NeighbourCache::new();

        // 3x3 source, 2x2 target offset slightly towards the south-west
        let input_grid = grid(3, 3, 40.0);
        let output_grid = grid(2, 2, 40.2);

        let mut input = MemoryFile::new(input_grid, vec![0.0], 1);
        let field = Array3::from_shape_fn((3, 3, 1), |(i, j, _)| (i * 3 + j) as Float);
        input.add_field("T", 0, field).unwrap();

        let mut output = MemoryFile::new(output_grid, vec![0.0], 1);
        scheme.downscale(&input, &mut output, &cache).unwrap();

        let result = output.get_field("T", 0).unwrap();
        assert_eq!(result[[0, 0, 0]], 0.0);
        assert_eq!(result[[0, 1, 0]], 1.0);
        assert_eq!(result[[1, 0, 0]], 3.0);
        assert_eq!(result[[1, 1, 0]], 4.0);
    }

    #[test]
    fn missing_input_propagates() {
        let scheme =
            Downscaler::from_name("nearestNeighbour", &Options::from_tokens("variable=T")).unwrap();
        let cache = NeighbourCache::new();

        let mut input = MemoryFile::new(grid(2, 2, 40.0), vec![0.0], 1);
        let mut field = Array3::from_elem((2, 2, 1), 1.0);
        field[[0, 0, 0]] = MV;
        input.add_field("T", 0, field).unwrap();

        let mut output = MemoryFile::new(grid(2, 2, 40.0), vec![0.0], 1);
        scheme.downscale(&input, &mut output, &cache).unwrap();

        let result = output.get_field("T", 0).unwrap();
        assert_eq!(result[[0, 0, 0]], MV);
        assert_eq!(result[[1, 1, 0]], 1.0);
    }
}
