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

//! Free-form `key=value` option bags attached to files, variables
//! and schemes on the command line.

use crate::errors::ConfigError;
use rustc_hash::FxHashMap;
use std::fmt;
use std::str::FromStr;

/// A bag of `key=value` options.
///
/// Keys are case-sensitive and a repeated key keeps the last value.
/// Values are stored as text and typed at read time.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Options {
    values: FxHashMap<String, String>,
}

impl Options {
    pub fn new() -> Self {
        Options::default()
    }

    /// Convenience constructor from a whitespace-separated string of
    /// `key=value` tokens.
    pub fn from_tokens(tokens: &str) -> Self {
        let mut options = Options::new();
        options.add_options(tokens);
        options
    }

    /// Parses one or more `key=value` tokens into the bag. Tokens
    /// without a `=` are ignored.
    pub fn add_options(&mut self, tokens: &str) {
        for token in tokens.split_whitespace() {
            if let Some((key, value)) = token.split_once('=') {
                self.values.insert(key.to_string(), value.to_string());
            }
        }
    }

    pub fn add_option(&mut self, key: &str, value: &str) {
        self.values.insert(key.to_string(), value.to_string());
    }

    pub fn has(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// Reads a value typed by the caller. Returns `None` when the key
    /// is absent or the value does not parse as the requested type.
    pub fn get<T: FromStr>(&self, key: &str) -> Option<T> {
        self.values.get(key).and_then(|raw| raw.parse().ok())
    }

    /// Reads a boolean. Accepts `0`/`false` as false and anything
    /// else as true, matching the numeric flags used on the command
    /// line.
    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.values
            .get(key)
            .map(|raw| raw != "0" && raw != "false")
    }

    /// Reads a value a scheme cannot function without.
    pub fn require<T: FromStr>(
        &self,
        kind: &'static str,
        name: &'static str,
        key: &'static str,
    ) -> Result<T, ConfigError> {
        self.get(key)
            .ok_or(ConfigError::MissingOption { kind, name, key })
    }

    pub fn clear(&mut self) {
        self.values.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl fmt::Display for Options {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<&String> = self.values.keys().collect();
        keys.sort();
        let joined = keys
            .iter()
            .map(|key| format!("{}={}", key, self.values[*key]))
            .collect::<Vec<String>>()
            .join(" ");
        write!(f, "{}", joined)
    }
}
