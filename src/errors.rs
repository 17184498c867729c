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

//! Module with error definitions for all subsystems of the
//! post-processor.
//!
//! Four concerns are distinguished: configuration (command line and
//! scheme instantiation), domain (invalid requests against a valid
//! store), data (shape and content mismatches between files) and
//! external (I/O and file formats). A missing value in data is never
//! an error; it propagates through transforms as the sentinel.

use thiserror::Error;

/// General errors gathering all failures the post-processor can
/// surface. Every fatal is reported as a single line.
#[derive(Error, Debug)]
pub enum PostError {
    #[error("Invalid command line arguments: {0}")]
    Config(#[from] ConfigError),

    #[error("{0}")]
    Domain(#[from] DomainError),

    #[error("{0}")]
    Data(#[from] DataError),

    #[error("{0}")]
    External(#[from] ExternalError),

    #[error("Downscaling variable '{variable}' from '{input}' into '{output}' failed: {source}")]
    Downscale {
        variable: String,
        input: String,
        output: String,
        #[source]
        source: Box<PostError>,
    },

    #[error("Calibrator '{calibrator}' on variable '{variable}' in '{output}' failed: {source}")]
    Calibrate {
        calibrator: &'static str,
        variable: String,
        output: String,
        #[source]
        source: Box<PostError>,
    },
}

/// Errors raised while interpreting the command line and
/// instantiating schemes.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("No variables defined")]
    NoVariables,

    #[error("No variable after '-v'")]
    MissingVariable,

    #[error("No downscaler after '-d'")]
    MissingDownscaler,

    #[error("No calibrator after '-c'")]
    MissingCalibrator,

    #[error("No parameter file after '-p'")]
    MissingParameterFile,

    #[error("-p must be after a -d or -c")]
    OrphanParameterFile,

    #[error("Two or more -p used for one {0}")]
    DuplicateParameterFile(&'static str),

    #[error("No recognized option after '-c <calibrator>'")]
    UnrecognizedAfterCalibrator,

    #[error("Could not instantiate downscaler with name '{0}'")]
    UnknownDownscaler(String),

    #[error("Could not instantiate calibrator with name '{0}'")]
    UnknownCalibrator(String),

    #[error("Parameter file format '{0}' not recognized")]
    UnknownParameterFormat(String),

    #[error("Parameter file format '{0}' is not compiled into this build")]
    UnavailableParameterFormat(&'static str),

    #[error("Gridded file format '{0}' not recognized")]
    UnknownFileFormat(String),

    #[error("Gridded file format '{0}' is not compiled into this build")]
    UnavailableFileFormat(&'static str),

    #[error("{kind} '{name}' needs {key}")]
    MissingOption {
        kind: &'static str,
        name: &'static str,
        key: &'static str,
    },

    #[error("Unequal number of input ({inputs}) and output ({outputs}) files")]
    UnequalFileLists { inputs: usize, outputs: usize },

    #[error("No valid input files")]
    NoInputFiles,

    #[error("No valid output files")]
    NoOutputFiles,

    #[error("Scheme '{0}' requires a parameter file")]
    MissingParameterStore(&'static str),

    #[error("Unknown statistic '{0}'")]
    UnknownStatistic(String),

    #[error("Invalid file pattern: {0}")]
    BadPattern(#[from] glob::PatternError),
}

/// Errors raised by valid stores receiving invalid requests.
#[derive(Error, Debug)]
pub enum DomainError {
    #[error("Could not load parameters for time {0}")]
    NegativeTime(i64),

    #[error("Could not load parameters for time {time} (max {max})")]
    TimeBeyondMax { time: i64, max: i64 },

    #[error("Cannot retrieve location-independent parameters from a location-dependent store")]
    LocationDependent,

    #[error("Cannot train calibrator '{0}'. Not implemented.")]
    TrainingNotImplemented(&'static str),

    #[error("Cannot train calibrator '{0}' from {1} data points")]
    TrainingDataInsufficient(&'static str, usize),
}

/// Errors raised by shape or content mismatches between grids,
/// fields and files.
#[derive(Error, Debug)]
pub enum DataError {
    #[error("Latitude grid has shape {lats:?} but longitude grid has shape {lons:?}")]
    GridShapeMismatch {
        lats: (usize, usize),
        lons: (usize, usize),
    },

    #[error("Grid {field} array has shape {actual:?}, expected {expected:?}")]
    BadGridField {
        field: &'static str,
        expected: (usize, usize),
        actual: (usize, usize),
    },

    #[error("Input has {input} time steps but output has {output}")]
    TimeCountMismatch { input: usize, output: usize },

    #[error("Input has {input} ensemble members but output has {output}")]
    EnsembleSizeMismatch { input: usize, output: usize },

    #[error("Field has shape {actual:?}, expected {expected:?}")]
    FieldShapeMismatch {
        expected: (usize, usize, usize),
        actual: (usize, usize, usize),
    },

    #[error("Variable '{variable}' is not defined in file '{file}'")]
    MissingVariable { variable: String, file: String },

    #[error("Time index {time} is beyond the {num_time} time steps of file '{file}'")]
    TimeOutOfRange {
        time: usize,
        num_time: usize,
        file: String,
    },

    #[error("Downscaler '{0}' requires altitudes in both input and output grids")]
    MissingElevation(&'static str),

    #[error("Downscaler 'bypass' requires identical input and output grids")]
    GridsNotIdentical,

    #[error("Calibrator '{calibrator}' requires variable '{variable}' in the file")]
    MissingComponent {
        calibrator: &'static str,
        variable: String,
    },
}

/// Errors raised by the world outside the core: I/O and the on-disk
/// formats of gridded and parameter files.
#[derive(Error, Debug)]
pub enum ExternalError {
    #[error("Error while handling the file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Error while reading a parameter file: {0}")]
    Csv(#[from] csv::Error),

    #[error("Could not open parameter file '{path}': {reason}")]
    ParameterFileUnreadable { path: String, reason: String },

    #[error("Malformed parameter file '{path}' at line {line}: {reason}")]
    MalformedParameterFile {
        path: String,
        line: usize,
        reason: String,
    },

    #[error("Could not open gridded file '{path}': {reason}")]
    FileUnreadable { path: String, reason: String },

    #[error("Malformed gridded file '{path}': {reason}")]
    MalformedGriddedFile { path: String, reason: String },

    #[error("Error while expanding file pattern: {0}")]
    Glob(#[from] glob::GlobError),
}
