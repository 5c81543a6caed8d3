// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use tempfile::TempDir;

use crate::{get_cmd_output, simulate_survey, ubercal};
use ubercal::read_csv;

#[test]
fn test_simulate_writes_truth_columns() {
    let tmp_dir = TempDir::new().expect("couldn't make tmp dir");
    let survey = simulate_survey(tmp_dir.path());

    let table = read_csv(&survey).unwrap();
    for column in [
        "star_key",
        "exposure_key",
        "channel_key",
        "mag",
        "mag_err",
        "true_mag",
        "true_zp",
        "true_channel_off",
    ] {
        assert!(table.has_column(column), "missing {column}");
    }
    assert!(table.num_rows() >= 8 * 20);
    assert!(table.num_rows() <= 8 * 40);
}

#[test]
fn test_simulate_is_reproducible() {
    let tmp_dir = TempDir::new().expect("couldn't make tmp dir");
    let mut contents = vec![];
    for name in ["a.csv", "b.csv"] {
        let output = tmp_dir.path().join(name);
        let cmd = ubercal()
            .args(["simulate", "--num-stars", "50", "--seed", "3", "-o"])
            .arg(&output)
            .ok();
        assert!(cmd.is_ok(), "{:?}", get_cmd_output(cmd));
        contents.push(std::fs::read_to_string(&output).unwrap());
    }
    assert_eq!(contents[0], contents[1]);
}

#[test]
fn test_simulate_without_output_fails() {
    let cmd = ubercal().args(["simulate", "--num-stars", "10"]).ok();
    assert!(cmd.is_err());
    let (_, stderr) = get_cmd_output(cmd);
    assert!(stderr.contains("No output file"), "{stderr}");
}
