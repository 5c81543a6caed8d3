// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Tests against the `fit` subcommand.

use std::{fs::File, io::Write};

use approx::assert_abs_diff_eq;
use indoc::writedoc;
use tempfile::TempDir;

use crate::{get_cmd_output, simulate_survey, ubercal};
use ubercal::{read_csv, FitSummary};

#[test]
fn test_fit_recovers_simulated_offsets() {
    let tmp_dir = TempDir::new().expect("couldn't make tmp dir");
    let survey = simulate_survey(tmp_dir.path());
    let output = tmp_dir.path().join("fitted.csv");
    let summary = tmp_dir.path().join("summary.toml");

    #[rustfmt::skip]
    let cmd = ubercal()
        .args([
            "fit",
            "-i", &format!("{}", survey.display()),
            "-f", "star_mag,zp,channel_off",
            "-r", "zp=0", "channel_off=0",
            "-o", &format!("{}", output.display()),
            "--summary-output", &format!("{}", summary.display()),
        ])
        .ok();
    assert!(cmd.is_ok(), "fit failed: {:?}", get_cmd_output(cmd));
    let (stdout, stderr) = get_cmd_output(cmd);
    assert!(stderr.is_empty(), "stderr wasn't empty: {stderr}");
    assert!(stdout.contains("ubercal fit complete."), "{stdout}");

    let fitted = read_csv(&output).unwrap();
    for (value, truth) in [
        ("value_star_mag", "true_mag"),
        ("value_zp", "true_zp"),
        ("value_channel_off", "true_channel_off"),
    ] {
        let value = fitted.floats(value).unwrap();
        let truth = fitted.floats(truth).unwrap();
        for (v, t) in value.iter().zip(truth.iter()) {
            assert_abs_diff_eq!(*v, *t, epsilon = 1e-6);
        }
    }
    for r in fitted.floats("residual").unwrap().iter() {
        assert_abs_diff_eq!(*r, 0.0, epsilon = 1e-6);
    }

    let summary: FitSummary = toml::from_str(&std::fs::read_to_string(&summary).unwrap()).unwrap();
    assert_eq!(summary.model, "_star_mag_zp_channel_off");
    assert_eq!(summary.num_observations, fitted.num_rows());
    assert_eq!(summary.num_free, summary.num_unknowns - 2);
    assert_eq!(summary.families.len(), 3);
}

#[test]
fn test_fit_dry_run() {
    let tmp_dir = TempDir::new().expect("couldn't make tmp dir");
    let survey = simulate_survey(tmp_dir.path());
    let output = tmp_dir.path().join("fitted.csv");

    let cmd = ubercal()
        .args(["fit", "--dry-run", "-r", "zp=0", "-i"])
        .arg(&survey)
        .arg("-o")
        .arg(&output)
        .ok();
    assert!(cmd.is_ok(), "{:?}", get_cmd_output(cmd));
    let (stdout, _) = get_cmd_output(cmd);
    assert!(stdout.contains("Dry run -- exiting now."), "{stdout}");
    assert!(!output.exists());
}

#[test]
fn test_fit_bad_family() {
    let tmp_dir = TempDir::new().expect("couldn't make tmp dir");
    let survey = simulate_survey(tmp_dir.path());

    let cmd = ubercal()
        .args(["fit", "-f", "star_mag,zp,flat_field", "-i"])
        .arg(&survey)
        .ok();
    assert!(cmd.is_err());
    let (_, stderr) = get_cmd_output(cmd);
    assert!(stderr.starts_with("Error: "), "{stderr}");
    assert!(stderr.contains("flat_field"), "{stderr}");
    assert!(stderr.contains("ubercal fit --help"), "{stderr}");
}

#[test]
fn test_fit_without_references_is_singular() {
    let tmp_dir = TempDir::new().expect("couldn't make tmp dir");
    let survey = simulate_survey(tmp_dir.path());

    let cmd = ubercal()
        .args(["fit", "--solver", "cholesky", "-i"])
        .arg(&survey)
        .ok();
    assert!(cmd.is_err());
    let (_, stderr) = get_cmd_output(cmd);
    assert!(stderr.contains("reference"), "{stderr}");
}

#[test]
fn test_fit_arguments_file_and_save_toml() {
    let tmp_dir = TempDir::new().expect("couldn't make tmp dir");
    let survey = simulate_survey(tmp_dir.path());
    let output = tmp_dir.path().join("fitted.csv");
    let args_file = tmp_dir.path().join("args.toml");
    let saved = tmp_dir.path().join("saved.toml");

    let mut f = File::create(&args_file).unwrap();
    writedoc!(
        f,
        r#"
            input = "{}"
            output = "{}"
            families = ["star_mag,zp"]
            references = ["zp=0"]
            solver = "lsqr"
        "#,
        survey.display(),
        output.display()
    )
    .unwrap();
    f.flush().unwrap();
    drop(f);

    let cmd = ubercal()
        .arg("fit")
        .arg(&args_file)
        .arg("--save-toml")
        .arg(&saved)
        .ok();
    assert!(cmd.is_ok(), "{:?}", get_cmd_output(cmd));
    assert!(output.exists());

    // The saved arguments reproduce the run.
    let saved_contents = std::fs::read_to_string(&saved).unwrap();
    assert!(saved_contents.contains("lsqr"), "{saved_contents}");
    std::fs::remove_file(&output).unwrap();
    let cmd = ubercal().arg("fit").arg(&saved).ok();
    assert!(cmd.is_ok(), "{:?}", get_cmd_output(cmd));
    assert!(output.exists());
}
