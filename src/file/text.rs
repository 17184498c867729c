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

//! Plain-text gridded file format.
//!
//! The format is line-oriented and self-describing:
//!
//! ```text
//! gridded 1
//! dims <nlat> <nlon> <nens>
//! missing <value>                    # optional, defaults to -999
//! times <t0> <t1> ...
//! lats
//! <nlat rows of nlon values>
//! lons
//! <nlat rows of nlon values>
//! elevs                              # optional section
//! <nlat rows of nlon values>
//! landfractions                      # optional section
//! <nlat rows of nlon values>
//! field <variable> <timeIndex>
//! <nlat blocks of nens rows, each nlon values>
//! ```
//!
//! Blank lines and lines starting with `#` are ignored. The `missing`
//! value is file-local: it is translated to the internal sentinel on
//! read and back on write.

use super::{Field, Grid, GriddedFile, MemoryFile};
use crate::constants::MV;
use crate::errors::{ExternalError, PostError};
use crate::options::Options;
use crate::Float;
use ndarray::{Array2, Array3};
use std::fmt::Write as _;
use std::fs;

pub struct TextFile {
    path: String,
    missing: Float,
    store: MemoryFile,
}

impl TextFile {
    pub fn open(path: &str, options: &Options) -> Result<Self, PostError> {
        let content = fs::read_to_string(path).map_err(|err| ExternalError::FileUnreadable {
            path: path.to_string(),
            reason: err.to_string(),
        })?;

        TextFile::parse(path, &content, options)
    }

    fn parse(path: &str, content: &str, options: &Options) -> Result<Self, PostError> {
        let lines: Vec<&str> = content
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .collect();
        let mut cursor = 0usize;

        let header = take(&lines, &mut cursor).ok_or_else(|| malformed(path, "empty file"))?;
        if header != "gridded 1" {
            return Err(malformed(path, &format!("unexpected header '{}'", header)));
        }

        let dims = take_tagged(&lines, &mut cursor, "dims", path)?;
        let dims: Vec<usize> = parse_row(dims, path)?;
        if dims.len() != 3 {
            return Err(malformed(path, "dims needs <nlat> <nlon> <nens>"));
        }
        let (num_lat, num_lon, num_ens) = (dims[0], dims[1], dims[2]);

        let mut missing: Float = -999.0;
        if peek(&lines, cursor).map_or(false, |line| line.starts_with("missing")) {
            let tokens: Vec<Float> = parse_row(take_tagged(&lines, &mut cursor, "missing", path)?, path)?;
            if tokens.len() != 1 {
                return Err(malformed(path, "missing needs a single value"));
            }
            missing = tokens[0];
        }
        if let Some(value) = options.get::<Float>("missing") {
            missing = value;
        }

        let times: Vec<f64> = parse_row(take_tagged(&lines, &mut cursor, "times", path)?, path)?;
        if times.is_empty() {
            return Err(malformed(path, "times needs at least one value"));
        }

        expect_marker(&lines, &mut cursor, "lats", path)?;
        let lats = read_array(&lines, &mut cursor, num_lat, num_lon, path)?;
        expect_marker(&lines, &mut cursor, "lons", path)?;
        let lons = read_array(&lines, &mut cursor, num_lat, num_lon, path)?;

        let mut grid =
            Grid::new(lats, lons).map_err(|err| malformed(path, &err.to_string()))?;

        if peek(&lines, cursor) == Some("elevs") {
            cursor += 1;
            let elevs = read_array(&lines, &mut cursor, num_lat, num_lon, path)?;
            grid.set_elevations(elevs)
                .map_err(|err| malformed(path, &err.to_string()))?;
        }
        if peek(&lines, cursor) == Some("landfractions") {
            cursor += 1;
            let fractions = read_array(&lines, &mut cursor, num_lat, num_lon, path)?;
            grid.set_land_fractions(fractions)
                .map_err(|err| malformed(path, &err.to_string()))?;
        }

        let num_time = times.len();
        let mut store = MemoryFile::with_name(path, grid, times, num_ens);

        while let Some(line) = take(&lines, &mut cursor) {
            let tokens: Vec<&str> = line.split_whitespace().collect();
            if tokens.len() != 3 || tokens[0] != "field" {
                return Err(malformed(path, &format!("expected a field block, got '{}'", line)));
            }
            let variable = tokens[1];
            let time: usize = tokens[2]
                .parse()
                .map_err(|_| malformed(path, &format!("bad time index '{}'", tokens[2])))?;
            if time >= num_time {
                return Err(malformed(
                    path,
                    &format!("field time index {} is beyond {} time steps", time, num_time),
                ));
            }

            let mut field: Field = Array3::from_elem((num_lat, num_lon, num_ens), MV);
            for i in 0..num_lat {
                for e in 0..num_ens {
                    let row = take(&lines, &mut cursor)
                        .ok_or_else(|| malformed(path, "truncated field block"))?;
                    let values: Vec<Float> = parse_row(row, path)?;
                    if values.len() != num_lon {
                        return Err(malformed(
                            path,
                            &format!("field row has {} values, expected {}", values.len(), num_lon),
                        ));
                    }
                    for (j, &value) in values.iter().enumerate() {
                        field[[i, j, e]] = if value == missing { MV } else { value };
                    }
                }
            }
            store.add_field(variable, time, field)?;
        }

        Ok(TextFile {
            path: path.to_string(),
            missing,
            store,
        })
    }

    fn render(&self) -> String {
        let mut out = String::new();
        let grid = self.store.grid();

        out.push_str("gridded 1\n");
        let _ = writeln!(
            out,
            "dims {} {} {}",
            grid.num_lat(),
            grid.num_lon(),
            self.store.num_ens()
        );
        let _ = writeln!(out, "missing {}", self.missing);

        out.push_str("times");
        for time in self.store.times() {
            let _ = write!(out, " {}", time);
        }
        out.push('\n');

        render_array(&mut out, "lats", grid.lats());
        render_array(&mut out, "lons", grid.lons());
        if let Some(elevs) = grid.elevs() {
            render_array(&mut out, "elevs", elevs);
        }
        if let Some(fractions) = grid.land_fractions() {
            render_array(&mut out, "landfractions", fractions);
        }

        for variable in self.store.variables() {
            for time in 0..self.store.num_time() {
                let field = match self.store.raw_field(variable, time) {
                    Some(field) => field,
                    None => continue,
                };
                let _ = writeln!(out, "field {} {}", variable, time);
                for i in 0..grid.num_lat() {
                    for e in 0..self.store.num_ens() {
                        for j in 0..grid.num_lon() {
                            let value = field[[i, j, e]];
                            let value = if value == MV { self.missing } else { value };
                            if j > 0 {
                                out.push(' ');
                            }
                            let _ = write!(out, "{}", value);
                        }
                        out.push('\n');
                    }
                }
            }
        }

        out
    }
}

impl GriddedFile for TextFile {
    fn name(&self) -> &str {
        &self.path
    }

    fn grid(&self) -> &Grid {
        self.store.grid()
    }

    fn times(&self) -> &[f64] {
        self.store.times()
    }

    fn num_ens(&self) -> usize {
        self.store.num_ens()
    }

    fn has_variable(&self, variable: &str) -> bool {
        self.store.has_variable(variable)
    }

    fn define_variable(&mut self, variable: &str) {
        self.store.define_variable(variable);
    }

    fn get_field(&self, variable: &str, time: usize) -> Result<Field, PostError> {
        self.store.get_field(variable, time)
    }

    fn add_field(&mut self, variable: &str, time: usize, field: Field) -> Result<(), PostError> {
        self.store.add_field(variable, time, field)
    }

    fn write(&mut self) -> Result<(), PostError> {
        fs::write(&self.path, self.render()).map_err(|err| ExternalError::Io(err).into())
    }
}

fn malformed(path: &str, reason: &str) -> PostError {
    ExternalError::MalformedGriddedFile {
        path: path.to_string(),
        reason: reason.to_string(),
    }
    .into()
}

fn take<'a>(lines: &[&'a str], cursor: &mut usize) -> Option<&'a str> {
    let line = lines.get(*cursor).copied();
    if line.is_some() {
        *cursor += 1;
    }
    line
}

fn peek<'a>(lines: &[&'a str], cursor: usize) -> Option<&'a str> {
    lines.get(cursor).copied()
}

/// Consumes a line of the form `<tag> <payload...>` and returns the
/// payload.
fn take_tagged<'a>(
    lines: &[&'a str],
    cursor: &mut usize,
    tag: &str,
    path: &str,
) -> Result<&'a str, PostError> {
    let line = take(lines, cursor).ok_or_else(|| malformed(path, &format!("missing {}", tag)))?;
    line.strip_prefix(tag)
        .map(str::trim)
        .ok_or_else(|| malformed(path, &format!("expected '{}', got '{}'", tag, line)))
}

fn expect_marker(
    lines: &[&str],
    cursor: &mut usize,
    marker: &str,
    path: &str,
) -> Result<(), PostError> {
    let line =
        take(lines, cursor).ok_or_else(|| malformed(path, &format!("missing {}", marker)))?;
    if line != marker {
        return Err(malformed(path, &format!("expected '{}', got '{}'", marker, line)));
    }
    Ok(())
}

fn parse_row<T: std::str::FromStr>(line: &str, path: &str) -> Result<Vec<T>, PostError> {
    line.split_whitespace()
        .map(|token| {
            token
                .parse()
                .map_err(|_| malformed(path, &format!("cannot read value '{}'", token)))
        })
        .collect()
}

fn read_array(
    lines: &[&str],
    cursor: &mut usize,
    num_lat: usize,
    num_lon: usize,
    path: &str,
) -> Result<Array2<Float>, PostError> {
    let mut values = Vec::with_capacity(num_lat * num_lon);
    for _ in 0..num_lat {
        let row = take(lines, cursor).ok_or_else(|| malformed(path, "truncated grid array"))?;
        let parsed: Vec<Float> = parse_row(row, path)?;
        if parsed.len() != num_lon {
            return Err(malformed(
                path,
                &format!("grid row has {} values, expected {}", parsed.len(), num_lon),
            ));
        }
        values.extend(parsed);
    }

    Array2::from_shape_vec((num_lat, num_lon), values)
        .map_err(|err| malformed(path, &err.to_string()))
}

fn render_array(out: &mut String, marker: &str, array: &Array2<Float>) {
    out.push_str(marker);
    out.push('\n');
    for row in array.rows() {
        for (j, value) in row.iter().enumerate() {
            if j > 0 {
                out.push(' ');
            }
            let _ = write!(out, "{}", value);
        }
        out.push('\n');
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::Options;
    use std::io::Write as _;

    const SAMPLE: &str = "\
# 2x3 grid, two members, two times
gridded 1
dims 2 3 2
missing -9999
times 0 3600
lats
50 50 50
51 51 51
lons
8 9 10
8 9 10
elevs
100 150 200
110 160 210
field T 0
1 2 3
4 5 6
7 8 -9999
10 11 12
";

    #[test]
    fn parses_sample() {
        let file = TextFile::parse("sample", SAMPLE, &Options::new()).unwrap();
        assert_eq!(file.num_time(), 2);
        assert_eq!(file.num_ens(), 2);
        assert_eq!(file.num_lat(), 2);
        assert_eq!(file.num_lon(), 3);
        assert!(file.has_variable("T"));
        assert!(file.grid().elevs().is_some());

        let field = file.get_field("T", 0).unwrap();
        assert_eq!(field[[0, 0, 0]], 1.0);
        assert_eq!(field[[0, 0, 1]], 4.0);
        assert_eq!(field[[1, 2, 0]], MV);
        assert_eq!(field[[1, 2, 1]], 12.0);
    }

    #[test]
    fn missing_value_translates_both_ways() {
        let file = TextFile::parse("sample", SAMPLE, &Options::new()).unwrap();
        let rendered = file.render();
        assert!(rendered.contains("missing -9999"));
        assert!(rendered.contains("7 8 -9999"));

        let reread = TextFile::parse("sample", &rendered, &Options::new()).unwrap();
        let field = reread.get_field("T", 0).unwrap();
        assert_eq!(field[[1, 2, 0]], MV);
    }

    #[test]
    fn disk_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("forecast.txt");
        let mut handle = std::fs::File::create(&path).unwrap();
        handle.write_all(SAMPLE.as_bytes()).unwrap();

        let path = path.to_str().unwrap();
        let mut file = TextFile::open(path, &Options::new()).unwrap();
        let mut field = file.get_field("T", 0).unwrap();
        field[[0, 0, 0]] = 42.0;
        file.add_field("T", 0, field).unwrap();
        file.write().unwrap();

        let reread = TextFile::open(path, &Options::new()).unwrap();
        assert_eq!(reread.get_field("T", 0).unwrap()[[0, 0, 0]], 42.0);
    }

    #[test]
    fn truncated_field_is_malformed() {
        let truncated = &SAMPLE[..SAMPLE.len() - 9];
        assert!(TextFile::parse("sample", truncated, &Options::new()).is_err());
    }

    #[test]
    fn bad_header_is_malformed() {
        assert!(TextFile::parse("sample", "gridded 2\n", &Options::new()).is_err());
    }

    #[test]
    fn field_beyond_time_axis_is_malformed() {
        let content = SAMPLE.replace("field T 0", "field T 5");
        assert!(TextFile::parse("sample", &content, &Options::new()).is_err());
    }
}
