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

//! Calibrators transform a variable's fields in place, one file at a
//! time. The chain order on the command line is the application
//! order.
//!
//! The module also carries two pieces shared between schemes: the
//! rank-preserving ensemble shuffle and the window statistic.

mod accumulate;
mod diagnose;
mod gaussian;
mod neighbourhood;
mod qc;
mod regression;
mod sort;
mod window;

use crate::constants::{is_valid, MV};
use crate::errors::{ConfigError, DomainError, PostError};
use crate::file::GriddedFile;
use crate::options::Options;
use crate::params::{ParameterStore, Parameters};
use crate::Float;

use accumulate::Accumulate;
use diagnose::Diagnose;
use gaussian::Gaussian;
use neighbourhood::Neighbourhood;
use qc::Qc;
use regression::Regression;
use sort::Sort;
use window::Window;

#[derive(Debug, PartialEq)]
pub enum Calibrator {
    Neighbourhood(Neighbourhood),
    Accumulate(Accumulate),
    Sort(Sort),
    Qc(Qc),
    Window(Window),
    Regression(Regression),
    Diagnose(Diagnose),
    Gaussian(Gaussian),
}

impl Calibrator {
    /// Instantiates a calibrator by scheme name. Unknown names and
    /// missing required options are configuration errors.
    pub fn from_name(name: &str, options: &Options) -> Result<Self, PostError> {
        match name {
            "neighbourhood" => Ok(Calibrator::Neighbourhood(Neighbourhood::from_options(
                options,
            )?)),
            "accumulate" => Ok(Calibrator::Accumulate(Accumulate::from_options(options)?)),
            "sort" => Ok(Calibrator::Sort(Sort::from_options(options)?)),
            "qc" => Ok(Calibrator::Qc(Qc::from_options(options)?)),
            "window" => Ok(Calibrator::Window(Window::from_options(options)?)),
            "regression" => Ok(Calibrator::Regression(Regression::from_options(options)?)),
            "diagnose" => Ok(Calibrator::Diagnose(Diagnose::from_options(options)?)),
            "gaussian" => Ok(Calibrator::Gaussian(Gaussian::from_options(options)?)),
            _ => Err(ConfigError::UnknownCalibrator(name.to_string()).into()),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Calibrator::Neighbourhood(_) => "neighbourhood",
            Calibrator::Accumulate(_) => "accumulate",
            Calibrator::Sort(_) => "sort",
            Calibrator::Qc(_) => "qc",
            Calibrator::Window(_) => "window",
            Calibrator::Regression(_) => "regression",
            Calibrator::Diagnose(_) => "diagnose",
            Calibrator::Gaussian(_) => "gaussian",
        }
    }

    pub fn requires_parameter_file(&self) -> bool {
        matches!(self, Calibrator::Regression(_) | Calibrator::Gaussian(_))
    }

    /// Applies the calibrator to the designated variable across all
    /// time steps of the file.
    pub fn calibrate(
        &self,
        file: &mut dyn GriddedFile,
        parameters: Option<&ParameterStore>,
    ) -> Result<(), PostError> {
        if self.requires_parameter_file() && parameters.is_none() {
            return Err(ConfigError::MissingParameterStore(self.name()).into());
        }

        match self {
            Calibrator::Neighbourhood(scheme) => scheme.calibrate_core(file),
            Calibrator::Accumulate(scheme) => scheme.calibrate_core(file),
            Calibrator::Sort(scheme) => scheme.calibrate_core(file),
            Calibrator::Qc(scheme) => scheme.calibrate_core(file),
            Calibrator::Window(scheme) => scheme.calibrate_core(file),
            Calibrator::Regression(scheme) => scheme.calibrate_core(file, parameters),
            Calibrator::Diagnose(scheme) => scheme.calibrate_core(file),
            Calibrator::Gaussian(scheme) => scheme.calibrate_core(file, parameters),
        }
    }

    /// Produces a parameter vector from `(observation, ensemble)`
    /// training pairs. Only some schemes can train.
    pub fn train(&self, data: &[(Float, Vec<Float>)]) -> Result<Parameters, PostError> {
        match self {
            Calibrator::Regression(scheme) => scheme.train(data),
            _ => Err(DomainError::TrainingNotImplemented(self.name()).into()),
        }
    }
}

pub fn descriptions() -> String {
    let mut out = String::new();
    for (name, description) in [
        ("accumulate", Accumulate::description()),
        ("diagnose", Diagnose::description()),
        ("gaussian", Gaussian::description()),
        ("neighbourhood", Neighbourhood::description()),
        ("qc", Qc::description()),
        ("regression", Regression::description()),
        ("sort", Sort::description()),
        ("window", Window::description()),
    ] {
        out.push_str(&format!("   {:<17}{}\n", name, description));
    }
    out
}

/// Reorders calibrated ensemble values so every member keeps the rank
/// it had before calibration.
///
/// `after` is rewritten in place: its sorted values are assigned to
/// members in the rank order of `before`, ties broken by original
/// index. When the sizes differ or any element of either vector is
/// missing, `after` is left untouched.
pub fn shuffle(before: &[Float], after: &mut [Float]) {
    if before.len() != after.len() || before.is_empty() {
        return;
    }
    if before.iter().chain(after.iter()).any(|&v| !is_valid(v)) {
        return;
    }

    let mut pairs: Vec<(Float, usize)> = before.iter().copied().zip(0..).collect();
    pairs.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));

    let mut sorted_after = after.to_vec();
    sorted_after.sort_by(Float::total_cmp);

    for (rank, &(_, member)) in pairs.iter().enumerate() {
        after[member] = sorted_after[rank];
    }
}

/// Window statistic shared by the smoothing calibrators.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Statistic {
    Mean,
    Median,
    Min,
    Max,
}

impl Statistic {
    /// Reads the `stat` option, defaulting to the mean.
    pub fn from_options(options: &Options) -> Result<Self, ConfigError> {
        match options.get::<String>("stat").as_deref() {
            None | Some("mean") => Ok(Statistic::Mean),
            Some("median") => Ok(Statistic::Median),
            Some("min") => Ok(Statistic::Min),
            Some("max") => Ok(Statistic::Max),
            Some(other) => Err(ConfigError::UnknownStatistic(other.to_string())),
        }
    }

    /// Computes the statistic over the given values. The caller is
    /// expected to have filtered out missing values; an empty slice
    /// yields the sentinel.
    pub fn compute(&self, values: &[Float]) -> Float {
        if values.is_empty() {
            return MV;
        }

        match self {
            Statistic::Mean => {
                let sum: f64 = values.iter().map(|&v| f64::from(v)).sum();
                (sum / values.len() as f64) as Float
            }
            Statistic::Median => {
                let mut sorted = values.to_vec();
                sorted.sort_by(Float::total_cmp);
                let middle = sorted.len() / 2;
                if sorted.len() % 2 == 1 {
                    sorted[middle]
                } else {
                    (sorted[middle - 1] + sorted[middle]) / 2.0
                }
            }
            Statistic::Min => values.iter().copied().fold(Float::MAX, Float::min),
            Statistic::Max => values.iter().copied().fold(Float::MIN, Float::max),
        }
    }
}
