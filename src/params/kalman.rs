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

//! met.no Kalman coefficient dump.
//!
//! A header line `metnoKalman <date>` stamps the run the coefficients
//! were produced for, followed by one row per station:
//! `stationId lat lon elev c0 .. c23` with one bias coefficient per
//! forecast hour. The resulting store is time-dependent with a single
//! coefficient per lead-time.

use super::{Location, ParameterStore, Parameters};
use crate::errors::{ExternalError, PostError};
use crate::options::Options;
use crate::Float;
use chrono::NaiveDate;
use log::debug;
use std::fs;

const HOURS: usize = 24;

pub(super) fn load(path: &str, _options: &Options) -> Result<ParameterStore, PostError> {
    let content = fs::read_to_string(path).map_err(|err| ExternalError::ParameterFileUnreadable {
        path: path.to_string(),
        reason: err.to_string(),
    })?;

    parse(path, &content)
}

fn parse(path: &str, content: &str) -> Result<ParameterStore, PostError> {
    let mut lines = content
        .lines()
        .enumerate()
        .map(|(row, line)| (row + 1, line.trim()))
        .filter(|(_, line)| !line.is_empty() && !line.starts_with('#'));

    let (line, header) = lines
        .next()
        .ok_or_else(|| malformed(path, 1, "empty file"))?;
    let date = parse_header(header).ok_or_else(|| malformed(path, line, "bad header"))?;
    debug!("Kalman coefficients stamped {}", date);

    let mut store = ParameterStore::new();

    for (line, row) in lines {
        let fields: Vec<&str> = row.split_whitespace().collect();
        if fields.len() != 4 + HOURS {
            return Err(malformed(
                path,
                line,
                &format!("expected {} columns, got {}", 4 + HOURS, fields.len()),
            ));
        }

        let station: i64 = fields[0]
            .parse()
            .map_err(|_| malformed(path, line, "bad station id"))?;
        let lat: Float = fields[1]
            .parse()
            .map_err(|_| malformed(path, line, "bad latitude"))?;
        let lon: Float = fields[2]
            .parse()
            .map_err(|_| malformed(path, line, "bad longitude"))?;
        let elev: Float = fields[3]
            .parse()
            .map_err(|_| malformed(path, line, "bad elevation"))?;

        for hour in 0..HOURS {
            let coefficient: Float = fields[4 + hour]
                .parse()
                .map_err(|_| malformed(path, line, "bad coefficient"))?;
            store
                .set_parameters(
                    Parameters::new(vec![coefficient]),
                    hour as i64,
                    Location::new(lat, lon, elev),
                )
                .map_err(|err| malformed(path, line, &err.to_string()))?;
        }
        debug!("Read Kalman coefficients for station {}", station);
    }

    Ok(store)
}

fn parse_header(header: &str) -> Option<NaiveDate> {
    let mut tokens = header.split_whitespace();
    if tokens.next() != Some("metnoKalman") {
        return None;
    }
    tokens.next()?.parse().ok()
}

fn malformed(path: &str, line: usize, reason: &str) -> PostError {
    ExternalError::MalformedParameterFile {
        path: path.to_string(),
        line,
        reason: reason.to_string(),
    }
    .into()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> String {
        let mut content = String::from("metnoKalman 2015-01-15\n");
        content.push_str("18700 59.94 10.72 94");
        for hour in 0..HOURS {
            content.push_str(&format!(" {}", hour as Float * 0.1));
        }
        content.push('\n');
        content
    }

    #[test]
    fn parses_station_rows() {
        let store = parse("memory", &sample()).unwrap();
        assert!(store.is_time_dependent());
        assert_eq!(store.max_time(), 23);
        assert_eq!(store.num_parameters(), Some(1));
        assert_eq!(store.locations().len(), 1);
        assert_eq!(store.locations()[0].elev(), 94.0);

        let location = Location::new(59.94, 10.72, 0.0);
        let fetched = store.get_parameters_at(3, &location, false).unwrap();
        assert_eq!(fetched.values().len(), 1);
        float_cmp::assert_approx_eq!(Float, fetched[0], 0.3);
    }

    #[test]
    fn bad_header_is_rejected() {
        assert!(parse("memory", "kalman 2015-01-15\n").is_err());
        assert!(parse("memory", "metnoKalman someday\n").is_err());
    }

    #[test]
    fn short_row_is_rejected() {
        let content = "metnoKalman 2015-01-15\n18700 59.94 10.72 94 1.0\n";
        assert!(parse("memory", content).is_err());
    }
}
