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

//! gridpost post-processes gridded ensemble weather forecasts.
//!
//! An input forecast file (time x member x latitude x longitude) is
//! transformed into an output file on a possibly different grid by a
//! per-variable pipeline of one downscaler and an ordered chain of
//! calibrators, described entirely on the command line:
//!
//! ```text
//! gridpost <input> <output> [options...] \
//!     (-v <variable> [options...]
//!        [-d <downscaler> [options...] [-p <file> [options...]]]
//!        (-c <calibrator> [options...] [-p <file> [options...]])*)+
//! ```

mod calibrator;
mod constants;
mod downscaler;
mod errors;
mod file;
mod geo;
mod options;
mod params;
mod run;
mod setup;
mod spatial;

#[cfg(test)]
mod super_tests;

use env_logger::Env;
use log::error;
use std::process::ExitCode;

/// Floating point type used for gridded values and parameters.
type Float = f32;

/// The main program function.
///
/// The logger must be initiated before anything else so that setup
/// failures already produce well-formed messages. Any error makes the
/// process exit non-zero after a single reported line.
fn main() -> ExitCode {
    #[cfg(not(feature = "debug"))]
    let logger_env = Env::new().filter_or("GRIDPOST_LOG_LEVEL", "info");

    #[cfg(feature = "debug")]
    let logger_env = Env::new().filter_or("GRIDPOST_LOG_LEVEL", "debug");

    env_logger::Builder::from_env(logger_env)
        .format_timestamp_millis()
        .init();

    let argv: Vec<String> = std::env::args().skip(1).collect();
    if argv.is_empty() {
        print_usage();
        return ExitCode::FAILURE;
    }

    let mut setup = match setup::Setup::from_argv(&argv) {
        Ok(setup) => setup,
        Err(err) => {
            error!("{}", err);
            return ExitCode::FAILURE;
        }
    };

    let cache = spatial::NeighbourCache::new();

    match run::run(&mut setup, &cache) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{}", err);
            ExitCode::FAILURE
        }
    }
}

fn print_usage() {
    println!("usage: gridpost <input> <output> [options...]");
    println!("                (-v <variable> [options...]");
    println!("                   [-d <downscaler> [options...] [-p <file> [options...]]]");
    println!("                   (-c <calibrator> [options...] [-p <file> [options...]])*)+");
    println!();
    println!("Downscalers:");
    print!("{}", downscaler::descriptions());
    println!();
    println!("Calibrators:");
    print!("{}", calibrator::descriptions());
    println!();
    println!("Parameter file formats:");
    print!("{}", params::descriptions());
}
