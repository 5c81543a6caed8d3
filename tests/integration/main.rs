// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Integration tests.
//!
//! Some help for laying out these tests was taken from:
//! https://matklad.github.io/2021/02/27/delete-cargo-integration-tests.html

mod fit;
mod simulate;

use std::{
    path::{Path, PathBuf},
    process::Output,
    str::from_utf8,
};

use assert_cmd::{output::OutputError, Command};

fn ubercal() -> Command {
    Command::cargo_bin("ubercal").unwrap()
}

fn get_cmd_output(result: Result<Output, OutputError>) -> (String, String) {
    let output = match result {
        Ok(o) => o,
        Err(o) => o.as_output().unwrap().clone(),
    };
    (
        from_utf8(&output.stdout).unwrap().to_string(),
        from_utf8(&output.stderr).unwrap().to_string(),
    )
}

/// Simulate a small noiseless survey with two detector channels into `dir`
/// with the binary itself.
fn simulate_survey(dir: &Path) -> PathBuf {
    let survey = dir.join("survey.csv");
    #[rustfmt::skip]
    let cmd = ubercal()
        .args([
            "simulate",
            "-o", &format!("{}", survey.display()),
            "--num-stars", "60",
            "--num-exposures", "8",
            "--stars-per-exposure", "20", "40",
            "--num-channels", "2",
            "--no-noise",
            "--seed", "7",
        ])
        .ok();
    assert!(cmd.is_ok(), "simulate failed: {:?}", get_cmd_output(cmd));
    assert!(survey.exists());
    survey
}
