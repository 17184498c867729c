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

//! Text parameter format.
//!
//! Space-delimited rows, one per (lead-time, location) cell. Without
//! the `spatial` option rows read `time p1 .. pN` and the store is
//! location-independent; with `spatial=1` rows read
//! `time lat lon elev p1 .. pN`. A row carrying no coefficients
//! records an empty vector for that cell. Lines starting with `#` are
//! comments. A malformed row rejects the whole file.

use super::{Location, ParameterStore, Parameters};
use crate::errors::{ExternalError, PostError};
use crate::options::Options;
use crate::Float;
use std::fs::File;
use std::io::Read;

pub(super) fn load(path: &str, options: &Options) -> Result<ParameterStore, PostError> {
    let file = File::open(path).map_err(|err| ExternalError::ParameterFileUnreadable {
        path: path.to_string(),
        reason: err.to_string(),
    })?;

    parse(path, file, options)
}

fn parse<R: Read>(path: &str, reader: R, options: &Options) -> Result<ParameterStore, PostError> {
    let spatial = options.get_bool("spatial").unwrap_or(false);

    let mut records = csv::ReaderBuilder::new()
        .delimiter(b' ')
        .has_headers(false)
        .flexible(true)
        .comment(Some(b'#'))
        .from_reader(reader);

    let mut store = ParameterStore::new();

    for (row, record) in records.records().enumerate() {
        let line = row + 1;
        let record = record.map_err(ExternalError::Csv)?;
        let fields: Vec<&str> = record.iter().filter(|field| !field.is_empty()).collect();
        if fields.is_empty() {
            continue;
        }

        let values = parse_values(path, line, &fields)?;

        let fixed = if spatial { 4 } else { 1 };
        if values.len() < fixed {
            return Err(malformed(path, line, "too few columns"));
        }

        let time = values[0] as i64;
        let location = if spatial {
            Location::new(values[1], values[2], values[3])
        } else {
            Location::new(0.0, 0.0, 0.0)
        };
        let parameters = Parameters::new(values[fixed..].to_vec());

        store
            .set_parameters(parameters, time, location)
            .map_err(|err| malformed(path, line, &err.to_string()))?;
    }

    Ok(store)
}

fn parse_values(path: &str, line: usize, fields: &[&str]) -> Result<Vec<Float>, PostError> {
    fields
        .iter()
        .map(|field| {
            field
                .parse()
                .map_err(|_| malformed(path, line, &format!("cannot read value '{}'", field)))
        })
        .collect()
}

fn malformed(path: &str, line: usize, reason: &str) -> PostError {
    ExternalError::MalformedParameterFile {
        path: path.to_string(),
        line,
        reason: reason.to_string(),
    }
    .into()
}
