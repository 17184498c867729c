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

//! In-memory gridded file. Backs the text format's field buffer and
//! serves as a constructible file for tests.

use super::{empty_field, Field, Grid, GriddedFile};
use crate::errors::{DataError, PostError};
use rustc_hash::FxHashMap;

pub struct MemoryFile {
    name: String,
    grid: Grid,
    times: Vec<f64>,
    num_ens: usize,
    fields: FxHashMap<String, Vec<Option<Field>>>,
}

impl MemoryFile {
    pub fn new(grid: Grid, times: Vec<f64>, num_ens: usize) -> Self {
        MemoryFile::with_name("<memory>", grid, times, num_ens)
    }

    pub fn with_name(name: &str, grid: Grid, times: Vec<f64>, num_ens: usize) -> Self {
        MemoryFile {
            name: name.to_string(),
            grid,
            times,
            num_ens,
            fields: FxHashMap::default(),
        }
    }

    /// Variables carrying data or defined on this file, sorted for
    /// deterministic serialization.
    pub fn variables(&self) -> Vec<&str> {
        let mut variables: Vec<&str> = self.fields.keys().map(String::as_str).collect();
        variables.sort_unstable();
        variables
    }

    /// Direct view of a stored field, without materializing missing
    /// data the way [`GriddedFile::get_field`] does.
    pub fn raw_field(&self, variable: &str, time: usize) -> Option<&Field> {
        self.fields
            .get(variable)
            .and_then(|slots| slots.get(time))
            .and_then(Option::as_ref)
    }

    fn check_shape(&self, field: &Field) -> Result<(), DataError> {
        let expected = (self.num_lat(), self.num_lon(), self.num_ens);
        if field.dim() != expected {
            return Err(DataError::FieldShapeMismatch {
                expected,
                actual: field.dim(),
            });
        }
        Ok(())
    }
}

impl GriddedFile for MemoryFile {
    fn name(&self) -> &str {
        &self.name
    }

    fn grid(&self) -> &Grid {
        &self.grid
    }

    fn times(&self) -> &[f64] {
        &self.times
    }

    fn num_ens(&self) -> usize {
        self.num_ens
    }

    fn has_variable(&self, variable: &str) -> bool {
        self.fields.contains_key(variable)
    }

    fn define_variable(&mut self, variable: &str) {
        let num_time = self.times.len();
        self.fields
            .entry(variable.to_string())
            .or_insert_with(|| vec![None; num_time]);
    }

    fn get_field(&self, variable: &str, time: usize) -> Result<Field, PostError> {
        let slots = self
            .fields
            .get(variable)
            .ok_or_else(|| DataError::MissingVariable {
                variable: variable.to_string(),
                file: self.name.clone(),
            })?;

        if time >= slots.len() {
            return Err(DataError::TimeOutOfRange {
                time,
                num_time: slots.len(),
                file: self.name.clone(),
            }
            .into());
        }

        Ok(slots[time]
            .clone()
            .unwrap_or_else(|| empty_field(self.num_lat(), self.num_lon(), self.num_ens)))
    }

    fn add_field(&mut self, variable: &str, time: usize, field: Field) -> Result<(), PostError> {
        self.check_shape(&field)?;

        if time >= self.times.len() {
            return Err(DataError::TimeOutOfRange {
                time,
                num_time: self.times.len(),
                file: self.name.clone(),
            }
            .into());
        }

        self.define_variable(variable);
        if let Some(slots) = self.fields.get_mut(variable) {
            slots[time] = Some(field);
        }
        Ok(())
    }

    fn write(&mut self) -> Result<(), PostError> {
        Ok(())
    }
}
