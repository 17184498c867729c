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

//! End-to-end tests driving the whole pipeline through the command
//! line surface: on-disk text files in, setup, run, files back out.

use crate::constants::MV;
use crate::file::{GriddedFile, TextFile};
use crate::options::Options;
use crate::run;
use crate::setup::Setup;
use crate::spatial::NeighbourCache;
use crate::Float;
use float_cmp::assert_approx_eq;
use std::fs;
use std::path::Path;

/// 2x2 grid at 60/61 N, two members, two times, temperatures rising
/// with time.
const INPUT: &str = "\
gridded 1
dims 2 2 2
times 0 3600
lats
60 60
61 61
lons
10 11
10 11
elevs
0 100
200 300
field T 0
280 281
283 284
282 283
285 286
field T 1
290 291
293 294
292 293
295 296
";

/// Output template: the same grid, fields initially absent.
const TEMPLATE: &str = "\
gridded 1
dims 2 2 2
times 0 3600
lats
60 60
61 61
lons
10 11
10 11
elevs
0 100
200 300
";

fn write(dir: &Path, name: &str, content: &str) -> String {
    let path = dir.join(name);
    fs::write(&path, content).unwrap();
    path.to_string_lossy().into_owned()
}

fn argv(tokens: &[&str]) -> Vec<String> {
    tokens.iter().map(|token| token.to_string()).collect()
}

fn execute(tokens: &[&str]) {
    let mut setup = Setup::from_argv(&argv(tokens)).unwrap();
    let cache = NeighbourCache::new();
    run::run(&mut setup, &cache).unwrap();
}

#[test]
fn identity_downscale_writes_the_input_values() {
    let dir = tempfile::tempdir().unwrap();
    let input = write(dir.path(), "in.txt", INPUT);
    let output = write(dir.path(), "out.txt", TEMPLATE);

    execute(&[&input, &output, "-v", "T"]);

    let result = TextFile::open(&output, &Options::new()).unwrap();
    assert!(result.has_variable("T"));
    let field = result.get_field("T", 0).unwrap();
    assert_eq!(field[[0, 0, 0]], 280.0);
    assert_eq!(field[[1, 1, 0]], 285.0);
    assert_eq!(field[[1, 1, 1]], 286.0);
    let field = result.get_field("T", 1).unwrap();
    assert_eq!(field[[0, 1, 1]], 294.0);
}

#[test]
fn calibrator_chain_applies_in_declared_order() {
    let dir = tempfile::tempdir().unwrap();
    let input = write(dir.path(), "in.txt", INPUT);
    let output = write(dir.path(), "out.txt", TEMPLATE);

    // qc removes everything above 284, sort orders what is left;
    // applying these in the opposite order would sort first and
    // remove afterwards, leaving different member positions
    execute(&[
        &input, &output, "-v", "T", "-c", "qc", "max=284", "-c", "sort",
    ]);

    let result = TextFile::open(&output, &Options::new()).unwrap();
    let field = result.get_field("T", 0).unwrap();
    // cell (1,0): members 282, 285 -> qc leaves (282, MV), sort skips
    assert_eq!(field[[1, 0, 0]], 282.0);
    assert_eq!(field[[1, 0, 1]], MV);
    // cell (0,0): members 280, 283 survive and stay ordered
    assert_eq!(field[[0, 0, 0]], 280.0);
    assert_eq!(field[[0, 0, 1]], 283.0);
}

#[test]
fn regression_pipeline_with_parameter_file() {
    let dir = tempfile::tempdir().unwrap();
    let input = write(dir.path(), "in.txt", INPUT);
    let output = write(dir.path(), "out.txt", TEMPLATE);
    // doubled slope at lead time 1
    let parameters = write(dir.path(), "coeffs.txt", "0 1 1\n1 1 2\n");

    execute(&[
        &input,
        &output,
        "-v",
        "T",
        "-c",
        "regression",
        "-p",
        &parameters,
    ]);

    let result = TextFile::open(&output, &Options::new()).unwrap();
    let field = result.get_field("T", 0).unwrap();
    assert_approx_eq!(Float, field[[0, 0, 0]], 281.0, epsilon = 1e-3);
    let field = result.get_field("T", 1).unwrap();
    assert_approx_eq!(Float, field[[0, 0, 0]], 581.0, epsilon = 1e-3);
}

#[test]
fn gradient_downscaling_onto_a_finer_grid() {
    let dir = tempfile::tempdir().unwrap();
    let input = write(dir.path(), "in.txt", INPUT);
    // single-cell target between the input points, 500 m high
    let template = "\
gridded 1
dims 1 1 2
times 0 3600
lats
60.1
lons
10.1
elevs
500
";
    let output = write(dir.path(), "out.txt", template);

    execute(&[
        &input,
        &output,
        "-v",
        "T",
        "-d",
        "gradient",
        "constantGradient=-0.0065",
    ]);

    // nearest input point is (60, 10) at 0 m holding 280; the cell
    // sits 500 m higher
    let result = TextFile::open(&output, &Options::new()).unwrap();
    let field = result.get_field("T", 0).unwrap();
    assert_approx_eq!(Float, field[[0, 0, 0]], 280.0 - 0.0065 * 500.0, epsilon = 1e-2);
}

#[test]
fn multiple_variables_process_independently() {
    let dir = tempfile::tempdir().unwrap();
    let mut content = INPUT.to_string();
    content.push_str(
        "\
field U 0
3 3
3 3
3 3
3 3
field U 1
3 3
3 3
3 3
3 3
",
    );
    let input = write(dir.path(), "in.txt", &content);
    let output = write(dir.path(), "out.txt", TEMPLATE);

    execute(&[
        &input, &output, "-v", "U", "-v", "T", "-c", "qc", "min=281",
    ]);

    let result = TextFile::open(&output, &Options::new()).unwrap();
    let wind = result.get_field("U", 0).unwrap();
    assert_eq!(wind[[0, 0, 0]], 3.0);
    let temperature = result.get_field("T", 0).unwrap();
    assert_eq!(temperature[[0, 0, 0]], MV);
    assert_eq!(temperature[[0, 1, 0]], 281.0);
}

#[test]
fn output_written_after_each_variable_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let input = write(dir.path(), "in.txt", INPUT);
    let output = write(dir.path(), "out.txt", TEMPLATE);

    execute(&[&input, &output, "-v", "T", "-c", "accumulate"]);

    let result = TextFile::open(&output, &Options::new()).unwrap();
    let field = result.get_field("T", 1).unwrap();
    // accumulated: 280 + 290
    assert_eq!(field[[0, 0, 0]], 570.0);
}
