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

//! Bypass downscaler: a straight copy requiring identical grids.
//! Used when the pipeline only calibrates.

use crate::errors::{ConfigError, DataError, PostError};
use crate::file::GriddedFile;
use crate::options::Options;

#[derive(Debug, PartialEq)]
pub struct Bypass {
    variable: String,
}

impl Bypass {
    pub(super) fn from_options(options: &Options) -> Result<Self, ConfigError> {
        let variable = options.require("Downscaler", "bypass", "variable")?;
        Ok(Bypass { variable })
    }

    pub(super) fn description() -> &'static str {
        "Copies fields unchanged; input and output grids must be identical"
    }

    pub(super) fn downscale_core(
        &self,
        input: &dyn GriddedFile,
        output: &mut dyn GriddedFile,
    ) -> Result<(), PostError> {
        if !input.grid().same_geometry(output.grid()) {
            return Err(DataError::GridsNotIdentical.into());
        }

        for time in 0..input.num_time() {
            let field = input.get_field(&self.variable, time)?;
            output.add_field(&self.variable, time, field)?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::grid;
    use super::super::Downscaler;
    use crate::file::{GriddedFile, MemoryFile};
    use crate::options::Options;
    use crate::spatial::NeighbourCache;
    use ndarray::Array3;

    #[test]
    fn copies_on_identical_grids() {
        let scheme = Downscaler::from_name("bypass", &Options::from_tokens("variable=T")).unwrap();
        let cache = NeighbourCache::new();

        let mut input = MemoryFile::new(grid(2, 2, 40.0), vec![0.0], 1);
        input
            .add_field("T", 0, Array3::from_elem((2, 2, 1), 4.5))
            .unwrap();
        let mut output = MemoryFile::new(grid(2, 2, 40.0), vec![0.0], 1);

        scheme.downscale(&input, &mut output, &cache).unwrap();
        assert_eq!(output.get_field("T", 0).unwrap()[[1, 0, 0]], 4.5);
    }

    #[test]
    fn rejects_differing_grids() {
        let scheme = Downscaler::from_name("bypass", &Options::from_tokens("variable=T")).unwrap();
        let cache = NeighbourCache::new();

        let input = MemoryFile::new(grid(2, 2, 40.0), vec![0.0], 1);
        let mut output = MemoryFile::new(grid(2, 2, 50.0), vec![0.0], 1);
        assert!(scheme.downscale(&input, &mut output, &cache).is_err());
    }
}
