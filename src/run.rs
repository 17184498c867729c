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

//! The driver: executes every variable pipeline for every
//! input/output file pair. Failures are fatal; nothing is retried.

use crate::errors::PostError;
use crate::setup::Setup;
use crate::spatial::NeighbourCache;
use indicatif::{ProgressBar, ProgressStyle};
use log::{debug, info};
use std::rc::Rc;

pub fn run(setup: &mut Setup, cache: &NeighbourCache) -> Result<(), PostError> {
    let pairs = setup.input_files.len();
    info!(
        "Processing {} file pair(s), {} variable(s)",
        pairs,
        setup.variable_configurations.len()
    );

    let files_bar = ProgressBar::new(pairs as u64);
    files_bar.set_style(
        ProgressStyle::default_bar()
            .template("{prefix} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {pos}/{len} {msg}")
            .progress_chars("#>-"),
    );
    files_bar.set_prefix("Processed files");

    for pair in 0..pairs {
        let input = Rc::clone(&setup.input_files[pair]);
        let output = Rc::clone(&setup.output_files[pair]);
        let input_path = &setup.input_paths[pair];
        let output_path = &setup.output_paths[pair];
        debug!("Processing '{}' into '{}'", input_path, output_path);

        for configuration in &setup.variable_configurations {
            let variable = &configuration.variable;

            {
                let mut target = output.borrow_mut();
                if !target.has_variable(variable) {
                    target.define_variable(variable);
                }
            }

            if Rc::ptr_eq(&input, &output) {
                // same handle for input and output: the grids are one
                // and the same and downscaling is the identity
                debug!("'{}' is both input and output, downscaling skipped", input_path);
            } else {
                let source = input.borrow();
                let mut target = output.borrow_mut();
                configuration
                    .downscaler
                    .downscale(source.as_ref(), target.as_mut(), cache)
                    .map_err(|err| PostError::Downscale {
                        variable: variable.clone(),
                        input: input_path.clone(),
                        output: output_path.clone(),
                        source: Box::new(err),
                    })?;
            }

            for (calibrator, store) in &configuration.calibrators {
                let mut target = output.borrow_mut();
                calibrator
                    .calibrate(target.as_mut(), store.as_ref())
                    .map_err(|err| PostError::Calibrate {
                        calibrator: calibrator.name(),
                        variable: variable.clone(),
                        output: output_path.clone(),
                        source: Box::new(err),
                    })?;
            }

            output.borrow_mut().write()?;
            debug!("Wrote variable '{}' to '{}'", variable, output_path);
        }

        files_bar.inc(1);
    }

    files_bar.finish_with_message("All files processed");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calibrator::Calibrator;
    use crate::downscaler::Downscaler;
    use crate::file::{Grid, GriddedFile, MemoryFile};
    use crate::options::Options;
    use crate::setup::VariableConfiguration;
    use crate::Float;
    use ndarray::{Array2, Array3};
    use std::cell::RefCell;

    fn grid(num_lat: usize, num_lon: usize, lat0: Float) -> Grid {
        let lats = Array2::from_shape_fn((num_lat, num_lon), |(i, _)| lat0 + i as Float);
        let lons = Array2::from_shape_fn((num_lat, num_lon), |(_, j)| 5.0 + j as Float);
        Grid::new(lats, lons).unwrap()
    }

    fn handle(file: MemoryFile) -> crate::setup::FileHandle {
        Rc::new(RefCell::new(Box::new(file) as Box<dyn GriddedFile>))
    }

    fn configuration(tokens: &str, calibrators: &[(&str, &str)]) -> VariableConfiguration {
        let options = Options::from_tokens(tokens);
        VariableConfiguration {
            variable: options.get("variable").unwrap(),
            downscaler: Downscaler::from_name("nearestNeighbour", &options).unwrap(),
            downscaler_parameters: None,
            calibrators: calibrators
                .iter()
                .map(|(name, tokens)| {
                    (
                        Calibrator::from_name(name, &Options::from_tokens(tokens)).unwrap(),
                        None,
                    )
                })
                .collect(),
            variable_options: Options::new(),
        }
    }

    #[test]
    fn downscales_then_calibrates_in_order() {
        let mut input = MemoryFile::new(grid(2, 2, 40.0), vec![0.0], 1);
        input
            .add_field("T", 0, Array3::from_elem((2, 2, 1), 150.0))
            .unwrap();
        let output = MemoryFile::new(grid(2, 2, 40.0), vec![0.0], 1);

        let mut setup = Setup {
            input_paths: vec!["in".to_string()],
            output_paths: vec!["out".to_string()],
            input_files: vec![handle(input)],
            output_files: vec![handle(output)],
            variable_configurations: vec![configuration(
                "variable=T",
                &[("qc", "variable=T max=100")],
            )],
        };

        let cache = NeighbourCache::new();
        run(&mut setup, &cache).unwrap();

        // downscaled to 150, then removed by the range check
        let result = setup.output_files[0]
            .borrow()
            .get_field("T", 0)
            .unwrap();
        assert_eq!(result[[0, 0, 0]], crate::constants::MV);
    }

    #[test]
    fn same_file_as_input_and_output_only_calibrates() {
        let mut both = MemoryFile::new(grid(1, 1, 40.0), vec![0.0], 2);
        let values = [3.0 as Float, 1.0];
        both.add_field("T", 0, Array3::from_shape_fn((1, 1, 2), |(_, _, e)| values[e]))
            .unwrap();

        let shared = handle(both);
        let mut setup = Setup {
            input_paths: vec!["both".to_string()],
            output_paths: vec!["both".to_string()],
            input_files: vec![Rc::clone(&shared)],
            output_files: vec![shared],
            variable_configurations: vec![configuration("variable=T", &[("sort", "variable=T")])],
        };

        let cache = NeighbourCache::new();
        run(&mut setup, &cache).unwrap();

        let result = setup.output_files[0].borrow().get_field("T", 0).unwrap();
        assert_eq!(result[[0, 0, 0]], 1.0);
        assert_eq!(result[[0, 0, 1]], 3.0);
    }

    #[test]
    fn downscale_failure_names_the_files() {
        let input = MemoryFile::new(grid(2, 2, 40.0), vec![0.0, 3600.0], 1);
        let output = MemoryFile::new(grid(2, 2, 40.0), vec![0.0], 1);

        let mut setup = Setup {
            input_paths: vec!["in".to_string()],
            output_paths: vec!["out".to_string()],
            input_files: vec![handle(input)],
            output_files: vec![handle(output)],
            variable_configurations: vec![configuration("variable=T", &[])],
        };

        let cache = NeighbourCache::new();
        let err = run(&mut setup, &cache).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("'T'"));
        assert!(message.contains("'in'"));
        assert!(message.contains("'out'"));
    }
}
