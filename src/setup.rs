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

//! Command-line setup: expands the file lists and parses the
//! per-variable pipelines with a finite state machine.
//!
//! The grammar after the file/option preamble:
//!
//! ```text
//! (-v <var> <varOpt...>
//!    [ -d <downscaler> <dOpt...> [ -p <paramFile> <pOpt...> ] ]
//!    ( -c <calibrator> <cOpt...> [ -p <paramFile> <pOpt...> ] )*
//! )+
//! ```

use crate::calibrator::Calibrator;
use crate::downscaler::Downscaler;
use crate::errors::{ConfigError, ExternalError, PostError};
use crate::file::{open_gridded_file, GriddedFile};
use crate::options::Options;
use crate::params::{load_parameter_store, ParameterStore};
use log::warn;
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

/// File handles are shared between the input and output lists when
/// paths coincide, mirroring the deduplicated file map.
pub type FileHandle = Rc<RefCell<Box<dyn GriddedFile>>>;

const DEFAULT_DOWNSCALER: &str = "nearestNeighbour";

/// One variable's pipeline: a downscaler and an ordered calibrator
/// chain, each with an optional parameter store.
#[derive(Debug, PartialEq)]
pub struct VariableConfiguration {
    pub variable: String,
    pub downscaler: Downscaler,
    pub downscaler_parameters: Option<ParameterStore>,
    pub calibrators: Vec<(Calibrator, Option<ParameterStore>)>,
    pub variable_options: Options,
}

pub struct Setup {
    pub input_paths: Vec<String>,
    pub output_paths: Vec<String>,
    pub input_files: Vec<FileHandle>,
    pub output_files: Vec<FileHandle>,
    pub variable_configurations: Vec<VariableConfiguration>,
}

impl std::fmt::Debug for Setup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let file_names = |files: &[FileHandle]| -> Vec<String> {
            files.iter().map(|fh| fh.borrow().name().to_string()).collect()
        };
        f.debug_struct("Setup")
            .field("input_paths", &self.input_paths)
            .field("output_paths", &self.output_paths)
            .field("input_files", &file_names(&self.input_files))
            .field("output_files", &file_names(&self.output_files))
            .field("variable_configurations", &self.variable_configurations)
            .finish()
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum State {
    Start,
    Var,
    VarOpt,
    NewVar,
    Down,
    DownOpt,
    ParDown,
    ParOptDown,
    Cal,
    CalOpt,
    NewCal,
    ParCal,
    ParOptCal,
    End,
}

impl Setup {
    pub fn from_argv(argv: &[String]) -> Result<Setup, PostError> {
        // File names and file options come first: the input name, then
        // key=value tokens for it, the output name, then key=value
        // tokens for it. The first later token starts the pipelines.
        let mut input_pattern = String::new();
        let mut output_pattern = String::new();
        let mut input_options = Options::new();
        let mut output_options = Options::new();

        let mut index = 0;
        while index < argv.len() {
            let arg = &argv[index];
            if input_pattern.is_empty() {
                input_pattern = arg.clone();
            } else if output_pattern.is_empty() {
                if arg.contains('=') {
                    input_options.add_options(arg);
                } else {
                    output_pattern = arg.clone();
                }
            } else if arg.contains('=') {
                output_options.add_options(arg);
            } else {
                break;
            }
            index += 1;
        }

        let input_paths = expand(&input_pattern)?;
        let output_paths = expand(&output_pattern)?;
        if input_paths.len() != output_paths.len() {
            return Err(ConfigError::UnequalFileLists {
                inputs: input_paths.len(),
                outputs: output_paths.len(),
            }
            .into());
        }
        if input_paths.is_empty() {
            return Err(ConfigError::NoInputFiles.into());
        }
        if output_paths.is_empty() {
            return Err(ConfigError::NoOutputFiles.into());
        }

        let mut file_map: BTreeMap<String, FileHandle> = BTreeMap::new();
        let mut input_files = Vec::with_capacity(input_paths.len());
        let mut output_files = Vec::with_capacity(output_paths.len());

        for pair in 0..output_paths.len() {
            let output_path = &output_paths[pair];
            if !file_map.contains_key(output_path) {
                let file = open_gridded_file(output_path, &output_options)?;
                file_map.insert(output_path.clone(), Rc::new(RefCell::new(file)));
            }
            output_files.push(Rc::clone(&file_map[output_path]));

            let input_path = &input_paths[pair];
            if !file_map.contains_key(input_path) {
                let file = open_gridded_file(input_path, &input_options)?;
                file_map.insert(input_path.clone(), Rc::new(RefCell::new(file)));
            }
            input_files.push(Rc::clone(&file_map[input_path]));
        }

        let variable_configurations = parse_pipelines(argv, index)?;

        Ok(Setup {
            input_paths,
            output_paths,
            input_files,
            output_files,
            variable_configurations,
        })
    }
}

/// The state machine over the pipeline tokens. Scheme construction
/// and parameter file loading happen at the completion states, so a
/// bad scheme name or unreadable file aborts the parse.
fn parse_pipelines(
    argv: &[String],
    mut index: usize,
) -> Result<Vec<VariableConfiguration>, PostError> {
    let mut configurations: Vec<VariableConfiguration> = Vec::new();
    let mut state = State::Start;

    let mut variable = String::new();
    let mut variable_options = Options::new();
    let mut downscaler_options = Options::new();
    let mut calibrator_options = Options::new();

    let mut downscaler_name = DEFAULT_DOWNSCALER.to_string();
    let mut calibrator_name = String::new();

    let mut down_parameter_path = String::new();
    let mut down_parameter_options = Options::new();
    let mut cal_parameter_path = String::new();
    let mut cal_parameter_options = Options::new();

    let mut calibrators: Vec<(Calibrator, Option<ParameterStore>)> = Vec::new();

    loop {
        match state {
            State::Start => {
                if index < argv.len() && argv[index] == "-v" {
                    state = State::Var;
                    index += 1;
                } else {
                    return Err(ConfigError::NoVariables.into());
                }
            }

            State::Var => {
                if argv.len() <= index {
                    return Err(ConfigError::MissingVariable.into());
                }
                variable = argv[index].clone();
                index += 1;
                if argv.len() <= index || argv[index] == "-v" {
                    state = State::NewVar;
                } else if argv[index] == "-d" {
                    state = State::Down;
                    index += 1;
                } else if argv[index] == "-c" {
                    state = State::Cal;
                    index += 1;
                } else if argv[index] == "-p" {
                    return Err(ConfigError::OrphanParameterFile.into());
                } else {
                    state = State::VarOpt;
                }
            }

            State::VarOpt => {
                if argv.len() <= index || argv[index] == "-v" {
                    state = State::NewVar;
                } else if argv[index] == "-d" {
                    state = State::Down;
                    index += 1;
                } else if argv[index] == "-c" {
                    state = State::Cal;
                    index += 1;
                } else if argv[index] == "-p" {
                    return Err(ConfigError::OrphanParameterFile.into());
                } else {
                    variable_options.add_options(&argv[index]);
                    index += 1;
                }
            }

            State::NewVar => {
                let exists = configurations
                    .iter()
                    .any(|configuration| configuration.variable == variable);
                if exists {
                    warn!(
                        "Variable '{}' already read. Using first instance.",
                        variable
                    );
                } else {
                    downscaler_options.add_option("variable", &variable);
                    let downscaler = Downscaler::from_name(&downscaler_name, &downscaler_options)?;
                    let downscaler_parameters = if down_parameter_path.is_empty() {
                        None
                    } else {
                        Some(load_parameter_store(
                            &down_parameter_path,
                            &down_parameter_options,
                        )?)
                    };
                    if downscaler.requires_parameter_file() && downscaler_parameters.is_none() {
                        return Err(
                            ConfigError::MissingParameterStore(downscaler.name()).into()
                        );
                    }

                    configurations.push(VariableConfiguration {
                        variable: variable.clone(),
                        downscaler,
                        downscaler_parameters,
                        calibrators: std::mem::take(&mut calibrators),
                        variable_options: variable_options.clone(),
                    });
                }

                variable_options.clear();
                downscaler_name = DEFAULT_DOWNSCALER.to_string();
                downscaler_options.clear();
                down_parameter_path.clear();
                down_parameter_options.clear();
                calibrators.clear();

                if argv.len() <= index {
                    state = State::End;
                } else {
                    state = State::Var;
                    index += 1;
                }
            }

            State::Down => {
                if argv.len() <= index {
                    return Err(ConfigError::MissingDownscaler.into());
                }
                downscaler_name = argv[index].clone();
                index += 1;
                if argv.len() <= index || argv[index] == "-v" {
                    state = State::NewVar;
                } else if argv[index] == "-c" {
                    state = State::Cal;
                    index += 1;
                } else if argv[index] == "-d" {
                    // a second downscaler replaces the first
                    state = State::Down;
                    index += 1;
                } else if argv[index] == "-p" {
                    state = State::ParDown;
                    index += 1;
                } else {
                    state = State::DownOpt;
                }
            }

            State::DownOpt => {
                if argv.len() <= index || argv[index] == "-v" {
                    state = State::NewVar;
                } else if argv[index] == "-c" {
                    state = State::Cal;
                    index += 1;
                } else if argv[index] == "-p" {
                    state = State::ParDown;
                    index += 1;
                } else {
                    downscaler_options.add_options(&argv[index]);
                    index += 1;
                }
            }

            State::ParDown => {
                if argv.len() <= index {
                    return Err(ConfigError::MissingParameterFile.into());
                }
                down_parameter_path = argv[index].clone();
                index += 1;
                if argv.len() <= index || argv[index] == "-v" {
                    state = State::NewVar;
                } else if argv[index] == "-c" {
                    state = State::Cal;
                    index += 1;
                } else if argv[index] == "-d" {
                    state = State::Down;
                    index += 1;
                } else if argv[index] == "-p" {
                    return Err(ConfigError::DuplicateParameterFile("downscaler").into());
                } else {
                    state = State::ParOptDown;
                }
            }

            State::ParOptDown => {
                if argv.len() <= index || argv[index] == "-v" {
                    state = State::NewVar;
                } else if argv[index] == "-c" {
                    state = State::Cal;
                    index += 1;
                } else if argv[index] == "-p" {
                    return Err(ConfigError::DuplicateParameterFile("downscaler").into());
                } else {
                    down_parameter_options.add_options(&argv[index]);
                    index += 1;
                }
            }

            State::Cal => {
                if argv.len() <= index {
                    return Err(ConfigError::MissingCalibrator.into());
                }
                calibrator_name = argv[index].clone();
                index += 1;
                if argv.len() <= index
                    || argv[index] == "-v"
                    || argv[index] == "-c"
                    || argv[index] == "-d"
                {
                    state = State::NewCal;
                } else if argv[index] == "-p" {
                    state = State::ParCal;
                    index += 1;
                } else {
                    state = State::CalOpt;
                }
            }

            State::CalOpt => {
                if argv.len() <= index
                    || argv[index] == "-v"
                    || argv[index] == "-c"
                    || argv[index] == "-d"
                {
                    state = State::NewCal;
                } else if argv[index] == "-p" {
                    state = State::ParCal;
                    index += 1;
                } else {
                    calibrator_options.add_options(&argv[index]);
                    index += 1;
                }
            }

            State::ParCal => {
                if argv.len() <= index {
                    return Err(ConfigError::MissingParameterFile.into());
                }
                cal_parameter_path = argv[index].clone();
                index += 1;
                if argv.len() <= index
                    || argv[index] == "-v"
                    || argv[index] == "-c"
                    || argv[index] == "-d"
                {
                    state = State::NewCal;
                } else if argv[index] == "-p" {
                    return Err(ConfigError::DuplicateParameterFile("calibrator").into());
                } else {
                    state = State::ParOptCal;
                }
            }

            State::ParOptCal => {
                if argv.len() <= index
                    || argv[index] == "-v"
                    || argv[index] == "-c"
                    || argv[index] == "-d"
                {
                    state = State::NewCal;
                } else if argv[index] == "-p" {
                    return Err(ConfigError::DuplicateParameterFile("calibrator").into());
                } else {
                    cal_parameter_options.add_options(&argv[index]);
                    index += 1;
                }
            }

            State::NewCal => {
                // the same calibrator may appear twice in a chain,
                // e.g. smoothing twice, so no duplicate check here
                calibrator_options.add_option("variable", &variable);
                let calibrator = Calibrator::from_name(&calibrator_name, &calibrator_options)?;
                let store = if cal_parameter_path.is_empty() {
                    None
                } else {
                    Some(load_parameter_store(
                        &cal_parameter_path,
                        &cal_parameter_options,
                    )?)
                };
                calibrators.push((calibrator, store));

                calibrator_name.clear();
                calibrator_options.clear();
                cal_parameter_path.clear();
                cal_parameter_options.clear();

                if argv.len() <= index || argv[index] == "-v" {
                    state = State::NewVar;
                } else if argv[index] == "-c" {
                    state = State::Cal;
                    index += 1;
                } else if argv[index] == "-d" {
                    state = State::Down;
                    index += 1;
                } else {
                    return Err(ConfigError::UnrecognizedAfterCalibrator.into());
                }
            }

            State::End => break,
        }
    }

    Ok(configurations)
}

/// Expands a shell glob into a sorted path list. A pattern without
/// matches yields the empty list, like the shell with nullglob.
fn expand(pattern: &str) -> Result<Vec<String>, PostError> {
    if pattern.is_empty() {
        return Ok(Vec::new());
    }

    let mut paths = Vec::new();
    for entry in glob::glob(pattern).map_err(ConfigError::BadPattern)? {
        let path = entry.map_err(ExternalError::Glob)?;
        paths.push(path.to_string_lossy().into_owned());
    }
    Ok(paths)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::Path;

    const GRIDDED: &str = "\
gridded 1
dims 1 2 2
times 0
lats
60 60
lons
10 11
elevs
100 200
field T 0
1 2
3 4
";

    fn write_gridded(dir: &Path, name: &str) -> String {
        let path = dir.join(name);
        fs::write(&path, GRIDDED).unwrap();
        path.to_string_lossy().into_owned()
    }

    fn write_parameters(dir: &Path, name: &str) -> String {
        let path = dir.join(name);
        fs::write(&path, "0 0.5 1.1\n").unwrap();
        path.to_string_lossy().into_owned()
    }

    fn argv(tokens: &[&str]) -> Vec<String> {
        tokens.iter().map(|token| token.to_string()).collect()
    }

    #[test]
    fn parses_a_pipeline() {
        let dir = tempfile::tempdir().unwrap();
        let input = write_gridded(dir.path(), "in.txt");
        let output = write_gridded(dir.path(), "out.txt");

        let setup = Setup::from_argv(&argv(&[
            &input,
            &output,
            "-v",
            "T",
            "-d",
            "gradient",
            "-c",
            "neighbourhood",
            "radius=3",
            "-c",
            "sort",
        ]))
        .unwrap();

        assert_eq!(setup.input_files.len(), 1);
        assert_eq!(setup.variable_configurations.len(), 1);

        let configuration = &setup.variable_configurations[0];
        assert_eq!(configuration.variable, "T");
        assert_eq!(configuration.downscaler.name(), "gradient");
        assert_eq!(configuration.calibrators.len(), 2);
        assert_eq!(configuration.calibrators[0].0.name(), "neighbourhood");
        assert_eq!(configuration.calibrators[1].0.name(), "sort");

        let expected = Calibrator::from_name(
            "neighbourhood",
            &Options::from_tokens("radius=3 variable=T"),
        )
        .unwrap();
        assert_eq!(configuration.calibrators[0].0, expected);
    }

    #[test]
    fn default_downscaler_is_nearest_neighbour() {
        let dir = tempfile::tempdir().unwrap();
        let input = write_gridded(dir.path(), "in.txt");
        let output = write_gridded(dir.path(), "out.txt");

        let setup = Setup::from_argv(&argv(&[&input, &output, "-v", "T"])).unwrap();
        assert_eq!(
            setup.variable_configurations[0].downscaler.name(),
            "nearestNeighbour"
        );
    }

    #[test]
    fn first_variable_instance_wins() {
        let dir = tempfile::tempdir().unwrap();
        let input = write_gridded(dir.path(), "in.txt");
        let output = write_gridded(dir.path(), "out.txt");

        let setup = Setup::from_argv(&argv(&[
            &input, &output, "-v", "T", "-d", "gradient", "-v", "T", "-d", "bypass",
        ]))
        .unwrap();

        assert_eq!(setup.variable_configurations.len(), 1);
        assert_eq!(setup.variable_configurations[0].downscaler.name(), "gradient");
    }

    #[test]
    fn attaches_parameter_files() {
        let dir = tempfile::tempdir().unwrap();
        let input = write_gridded(dir.path(), "in.txt");
        let output = write_gridded(dir.path(), "out.txt");
        let parameters = write_parameters(dir.path(), "coeffs.txt");

        let setup = Setup::from_argv(&argv(&[
            &input,
            &output,
            "-v",
            "T",
            "-d",
            "nearestNeighbour",
            "-p",
            &parameters,
            "-c",
            "regression",
            "-p",
            &parameters,
        ]))
        .unwrap();

        let configuration = &setup.variable_configurations[0];
        assert!(configuration.downscaler_parameters.is_some());
        assert!(configuration.calibrators[0].1.is_some());
    }

    #[test]
    fn orphan_parameter_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let input = write_gridded(dir.path(), "in.txt");
        let output = write_gridded(dir.path(), "out.txt");

        let err = Setup::from_argv(&argv(&[&input, &output, "-v", "T", "-p", "x"])).unwrap_err();
        assert!(err.to_string().contains("-p must be after"));
    }

    #[test]
    fn duplicate_parameter_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let input = write_gridded(dir.path(), "in.txt");
        let output = write_gridded(dir.path(), "out.txt");
        let parameters = write_parameters(dir.path(), "coeffs.txt");

        let err = Setup::from_argv(&argv(&[
            &input,
            &output,
            "-v",
            "T",
            "-c",
            "regression",
            "-p",
            &parameters,
            "-p",
            &parameters,
        ]))
        .unwrap_err();
        assert!(err.to_string().contains("Two or more -p"));
    }

    #[test]
    fn unreadable_parameter_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let input = write_gridded(dir.path(), "in.txt");
        let output = write_gridded(dir.path(), "out.txt");

        let err = Setup::from_argv(&argv(&[
            &input,
            &output,
            "-v",
            "T",
            "-c",
            "regression",
            "-p",
            "/nonexistent/coeffs.txt",
        ]))
        .unwrap_err();
        assert!(err.to_string().contains("Could not open parameter file"));
    }

    #[test]
    fn unknown_scheme_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let input = write_gridded(dir.path(), "in.txt");
        let output = write_gridded(dir.path(), "out.txt");

        let err = Setup::from_argv(&argv(&[&input, &output, "-v", "T", "-c", "zaga"]))
            .unwrap_err();
        assert!(err.to_string().contains("zaga"));
    }

    #[test]
    fn no_variables_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let input = write_gridded(dir.path(), "in.txt");
        let output = write_gridded(dir.path(), "out.txt");

        let err = Setup::from_argv(&argv(&[&input, &output])).unwrap_err();
        assert!(err.to_string().contains("No variables defined"));
    }

    #[test]
    fn unequal_file_lists_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let input = write_gridded(dir.path(), "in.txt");

        let err = Setup::from_argv(&argv(&[&input, "/nonexistent/out*.txt", "-v", "T"]))
            .unwrap_err();
        assert!(err.to_string().contains("Unequal number"));
    }

    #[test]
    fn same_path_for_input_and_output_shares_the_handle() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_gridded(dir.path(), "both.txt");

        let setup = Setup::from_argv(&argv(&[&path, &path, "-v", "T"])).unwrap();
        assert!(Rc::ptr_eq(&setup.input_files[0], &setup.output_files[0]));
    }

    #[test]
    fn parsing_is_deterministic() {
        let dir = tempfile::tempdir().unwrap();
        let input = write_gridded(dir.path(), "in.txt");
        let output = write_gridded(dir.path(), "out.txt");
        let parameters = write_parameters(dir.path(), "coeffs.txt");

        let tokens = argv(&[
            &input,
            &output,
            "-v",
            "T",
            "-d",
            "gradient",
            "searchRadius=5",
            "-c",
            "regression",
            "-p",
            &parameters,
            "-c",
            "sort",
        ]);

        let first = Setup::from_argv(&tokens).unwrap();
        let second = Setup::from_argv(&tokens).unwrap();
        assert_eq!(
            first.variable_configurations,
            second.variable_configurations
        );
    }

    #[test]
    fn glob_patterns_expand_to_matched_pairs() {
        let dir = tempfile::tempdir().unwrap();
        write_gridded(dir.path(), "in0.txt");
        write_gridded(dir.path(), "in1.txt");
        write_gridded(dir.path(), "out0.txt");
        write_gridded(dir.path(), "out1.txt");

        let in_pattern = dir.path().join("in*.txt");
        let out_pattern = dir.path().join("out*.txt");
        let setup = Setup::from_argv(&argv(&[
            in_pattern.to_str().unwrap(),
            out_pattern.to_str().unwrap(),
            "-v",
            "T",
        ]))
        .unwrap();

        assert_eq!(setup.input_files.len(), 2);
        assert_eq!(setup.output_files.len(), 2);
    }
}
