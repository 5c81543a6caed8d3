// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use approx::assert_abs_diff_eq;

use super::*;
use crate::{
    constants::{PULL_COLUMN, RESIDUAL_COLUMN},
    index::ParameterKey,
    model::{FamilyDescriptor, References},
    solver::{FillOrdering, SolverType},
    store::{Column, Key},
};

fn star_zp_model() -> FitModel {
    FitModel::configure(vec![
        FamilyDescriptor::new(FamilyKind::StarMag),
        FamilyDescriptor::new(FamilyKind::Zp).reference_key(0),
    ])
    .unwrap()
    .with_min_observations(1)
    .unwrap()
}

/// Two stars seen on two exposures; exposure 1 is 0.2 mag fainter.
fn two_by_two() -> ObservationTable {
    ObservationTable::from_columns([
        ("star_key", Column::from(vec!["A", "A", "B", "B"])),
        ("exposure_key", Column::from(vec![0_i64, 1, 0, 1])),
        ("mag", Column::from(vec![10.00, 10.20, 12.00, 12.20])),
        ("mag_err", Column::from(vec![0.01; 4])),
    ])
    .unwrap()
}

/// Four stars on three exposures and two channels, with a little noise so
/// the residuals aren't all zero.
fn noisy_table() -> ObservationTable {
    let stars = ["s1", "s2", "s3", "s4"];
    let star_mags = [14.0, 15.5, 16.25, 17.0];
    let zps = [0.0, 0.13, -0.07];
    let channels = [0_i64, 1];
    let channel_offs = [0.0, 0.04];
    let noise = [0.003, -0.002, 0.001, 0.0, -0.004, 0.002];

    let (mut star, mut exposure, mut channel, mut mag, mut err) = (vec![], vec![], vec![], vec![], vec![]);
    let mut n = 0;
    for (s, m) in stars.iter().zip(star_mags) {
        for (e, zp) in zps.iter().enumerate() {
            for (c, off) in channels.iter().zip(channel_offs) {
                star.push(*s);
                exposure.push(e as i64);
                channel.push(*c);
                mag.push(m + zp + off + noise[n % noise.len()]);
                err.push(0.01 + 0.001 * (n % 3) as f64);
                n += 1;
            }
        }
    }
    ObservationTable::from_columns([
        ("star_key", Column::from(star)),
        ("exposure_key", Column::from(exposure)),
        ("channel_key", Column::from(channel)),
        ("mag", Column::from(mag)),
        ("mag_err", Column::from(err)),
    ])
    .unwrap()
}

fn noisy_model() -> FitModel {
    FitModel::configure(vec![
        FamilyDescriptor::new(FamilyKind::StarMag),
        FamilyDescriptor::new(FamilyKind::Zp).reference_key(0),
        FamilyDescriptor::new(FamilyKind::ChannelOff).reference_key(0),
    ])
    .unwrap()
}

#[test]
fn test_two_stars_one_zero_point() {
    let result = run(&two_by_two(), &star_zp_model(), &SolverParams::default()).unwrap();
    let solution = &result.solution;
    assert_abs_diff_eq!(solution.value_of(FamilyKind::StarMag, "A").unwrap(), 10.0, epsilon = 1e-9);
    assert_abs_diff_eq!(solution.value_of(FamilyKind::StarMag, "B").unwrap(), 12.0, epsilon = 1e-9);
    assert_abs_diff_eq!(solution.value_of(FamilyKind::Zp, 0).unwrap(), 0.0);
    assert_abs_diff_eq!(solution.value_of(FamilyKind::Zp, 1).unwrap(), 0.2, epsilon = 1e-9);
    for r in solution.residuals() {
        assert_abs_diff_eq!(*r, 0.0, epsilon = 1e-9);
    }
    assert_eq!(solution.gauge().num_free(), 3);
}

#[test]
fn test_channel_offset() {
    let table = ObservationTable::from_columns([
        ("star_key", Column::from(vec!["A"; 4])),
        ("exposure_key", Column::from(vec![0_i64, 0, 1, 1])),
        ("channel_key", Column::from(vec!["ch0", "ch1", "ch0", "ch1"])),
        ("mag", Column::from(vec![10.00, 10.05, 10.20, 10.25])),
        ("mag_err", Column::from(vec![0.01; 4])),
    ])
    .unwrap();
    let model = FitModel::configure(vec![
        FamilyDescriptor::new(FamilyKind::StarMag),
        FamilyDescriptor::new(FamilyKind::Zp).reference_key(0),
        FamilyDescriptor::new(FamilyKind::ChannelOff).reference_key("ch0"),
    ])
    .unwrap();

    let result = run(&table, &model, &SolverParams::default()).unwrap();
    let solution = &result.solution;
    assert_abs_diff_eq!(solution.value_of(FamilyKind::StarMag, "A").unwrap(), 10.0, epsilon = 1e-9);
    assert_abs_diff_eq!(solution.value_of(FamilyKind::Zp, 1).unwrap(), 0.2, epsilon = 1e-9);
    assert_abs_diff_eq!(solution.value_of(FamilyKind::ChannelOff, "ch1").unwrap(), 0.05, epsilon = 1e-9);
    assert_abs_diff_eq!(solution.value_of(FamilyKind::ChannelOff, "ch0").unwrap(), 0.0);
}

#[test]
fn test_extinction_without_zero_points() {
    let airmass = vec![1.0, 1.5, 2.0, 1.0, 1.5, 2.0];
    let truth = [13.0, 13.0, 13.0, 15.5, 15.5, 15.5];
    let mag: Vec<f64> = truth.iter().zip(&airmass).map(|(m, x)| m + 0.1 * x).collect();
    let table = ObservationTable::from_columns([
        ("star_key", Column::from(vec![1_i64, 1, 1, 2, 2, 2])),
        ("airmass", Column::from(airmass)),
        ("mag", Column::from(mag)),
        ("mag_err", Column::from(vec![0.02; 6])),
    ])
    .unwrap();
    let model = FitModel::configure(vec![
        FamilyDescriptor::new(FamilyKind::StarMag),
        FamilyDescriptor::new(FamilyKind::KExt),
    ])
    .unwrap();

    let result = run(&table, &model, &SolverParams::default()).unwrap();
    let solution = &result.solution;
    assert_abs_diff_eq!(solution.global_value(FamilyKind::KExt).unwrap(), 0.1, epsilon = 1e-9);
    assert_abs_diff_eq!(solution.value_of(FamilyKind::StarMag, 1).unwrap(), 13.0, epsilon = 1e-9);
    assert_abs_diff_eq!(solution.value_of(FamilyKind::StarMag, 2).unwrap(), 15.5, epsilon = 1e-9);
}

#[test]
fn test_missing_reference_is_degenerate() {
    let model = FitModel::configure(vec![
        FamilyDescriptor::new(FamilyKind::StarMag),
        FamilyDescriptor::new(FamilyKind::Zp),
    ])
    .unwrap()
    .with_min_observations(1)
    .unwrap();
    for solver in [SolverType::Cholesky, SolverType::Dense] {
        let params = SolverParams {
            solver,
            ..Default::default()
        };
        let result = run(&two_by_two(), &model, &params);
        match result {
            Err(FitError::Numerical { source, context }) => {
                assert!(source.is_singular());
                assert!(context.is_some());
            }
            other => panic!("expected a numerical error, got {other:?}"),
        }
    }
}

/// Precise and very noisy stars in the same fit give a normal matrix whose
/// diagonal spans many orders of magnitude; it is still well-posed.
#[test]
fn test_wide_uncertainty_range_is_not_degenerate() {
    let (mut star, mut exposure, mut mag, mut err) = (vec![], vec![], vec![], vec![]);
    for s in 0..201_i64 {
        let (m, e) = if s == 200 { (20.0, 1.5) } else { (12.0 + 0.01 * s as f64, 1e-4) };
        for (x, zp) in [(0_i64, 0.0), (1, 0.1)] {
            star.push(s);
            exposure.push(x);
            mag.push(m + zp);
            err.push(e);
        }
    }
    let table = ObservationTable::from_columns([
        ("star_key", Column::from(star)),
        ("exposure_key", Column::from(exposure)),
        ("mag", Column::from(mag)),
        ("mag_err", Column::from(err)),
    ])
    .unwrap();

    let solvers = [
        (SolverType::Cholesky, FillOrdering::Rcm),
        (SolverType::Cholesky, FillOrdering::Natural),
        (SolverType::Dense, FillOrdering::Natural),
    ];
    for (solver, ordering) in solvers {
        let params = SolverParams {
            solver,
            ordering,
            ..Default::default()
        };
        let result = match run(&table, &star_zp_model(), &params) {
            Ok(r) => r,
            Err(e) => panic!("{solver} ({ordering}) failed: {e}"),
        };
        let solution = &result.solution;
        assert_abs_diff_eq!(solution.value_of(FamilyKind::Zp, 1).unwrap(), 0.1, epsilon = 1e-8);
        assert_abs_diff_eq!(solution.value_of(FamilyKind::StarMag, 200).unwrap(), 20.0, epsilon = 1e-6);
        assert_abs_diff_eq!(solution.value_of(FamilyKind::StarMag, 0).unwrap(), 12.0, epsilon = 1e-8);
    }
}

#[test]
fn test_min_observations_filter() {
    let table = ObservationTable::from_columns([
        ("star_key", Column::from(vec!["X", "Y", "Y", "Z", "Z"])),
        ("exposure_key", Column::from(vec![0_i64, 0, 1, 0, 1])),
        ("mag", Column::from(vec![11.0, 12.0, 12.1, 13.0, 13.1])),
        ("mag_err", Column::from(vec![0.01; 5])),
    ])
    .unwrap();
    let model = star_zp_model().with_min_observations(2).unwrap();

    let result = run(&table, &model, &SolverParams::default()).unwrap();
    assert_eq!(result.observations.num_rows(), 4);
    let (stars, _) = result.solution.index().family(FamilyKind::StarMag).unwrap();
    assert_eq!(stars.size(), 2);
    assert_eq!(stars.ids(), &[0, 0, 1, 1]);
    assert!(result.solution.value_of(FamilyKind::StarMag, "X").is_none());
    assert_abs_diff_eq!(result.solution.value_of(FamilyKind::Zp, 1).unwrap(), 0.1, epsilon = 1e-9);
}

#[test]
fn test_nothing_survives_the_filter() {
    let model = star_zp_model().with_min_observations(3).unwrap();
    assert!(matches!(
        run(&two_by_two(), &model, &SolverParams::default()),
        Err(FitError::Size(_))
    ));
}

#[test]
fn test_sliced_zero_point() {
    let table = ObservationTable::from_columns([
        ("star_key", Column::from(vec![1_i64, 2, 3, 1, 2, 3])),
        ("exposure_key", Column::from(vec![0_i64; 6])),
        ("night", Column::from(vec![0_i64, 0, 0, 1, 1, 1])),
        ("mag", Column::from(vec![14.0, 15.0, 16.0, 14.3, 15.3, 16.3])),
        ("mag_err", Column::from(vec![0.01; 6])),
    ])
    .unwrap();
    let zp = FamilyDescriptor::new(FamilyKind::Zp)
        .time_slice_column("night")
        .references(References::Keys {
            keys: vec![Key::Int(0)],
            slices: Some(vec![Key::Int(0)]),
        });
    let model = FitModel::configure(vec![FamilyDescriptor::new(FamilyKind::StarMag), zp])
        .unwrap()
        .with_min_observations(2)
        .unwrap();

    let result = run(&table, &model, &SolverParams::default()).unwrap();
    let solution = &result.solution;
    let (zps, _) = solution.index().family(FamilyKind::Zp).unwrap();
    assert_eq!(zps.size(), 2);
    assert_eq!(solution.gauge().num_references(FamilyKind::Zp), 1);
    let night_1 = ParameterKey {
        base: Some(Key::Int(0)),
        slice: Some(Key::Int(1)),
    };
    assert_abs_diff_eq!(solution.value(FamilyKind::Zp, &night_1).unwrap(), 0.3, epsilon = 1e-9);
    assert_abs_diff_eq!(solution.value_of(FamilyKind::StarMag, 2).unwrap(), 15.0, epsilon = 1e-9);
}

#[test]
fn test_residuals_close_the_model() {
    let table = noisy_table();
    let result = run(&table, &noisy_model(), &SolverParams::default()).unwrap();
    let output = result.output_table().unwrap();
    let mags = output.floats("mag").unwrap();
    let residuals = output.floats(RESIDUAL_COLUMN).unwrap();
    let pulls = output.floats(PULL_COLUMN).unwrap();
    let errs = output.floats("mag_err").unwrap();
    let families = [FamilyKind::StarMag, FamilyKind::Zp, FamilyKind::ChannelOff];
    let values: Vec<_> = families
        .iter()
        .map(|k| output.floats(&k.value_column()).unwrap().into_owned())
        .collect();
    for row in 0..output.num_rows() {
        let model: f64 = values.iter().map(|v| v[row]).sum();
        assert_abs_diff_eq!(mags[row], model + residuals[row], epsilon = 1e-9);
        assert_abs_diff_eq!(pulls[row], residuals[row] / errs[row], epsilon = 1e-9);
    }
    assert!(result.solution.chi2() > 0.0);
    assert!(result.solution.reduced_chi2().is_some());
    for kind in families {
        assert!(output.has_column(&kind.id_column()));
    }
}

#[test]
fn test_input_table_is_untouched() {
    let table = noisy_table();
    let before = table.clone();
    let result = run(&table, &noisy_model(), &SolverParams::default()).unwrap();
    assert_eq!(table, before);
    assert!(!table.has_column(RESIDUAL_COLUMN));
    assert!(result.output_table().unwrap().has_column(RESIDUAL_COLUMN));
}

#[test]
fn test_fit_is_repeatable() {
    let table = noisy_table();
    let model = noisy_model();
    let first = run(&table, &model, &SolverParams::default()).unwrap();
    let second = run(&table, &model, &SolverParams::default()).unwrap();
    assert_eq!(first.solution.parameters(), second.solution.parameters());
    assert_eq!(first.solution.residuals(), second.solution.residuals());
}

#[test]
fn test_referenced_single_key_family_changes_nothing() {
    let mut table = noisy_table();
    table
        .add_column("cell_key", Column::from(vec![7_i64; table.num_rows()]))
        .unwrap();
    let without = run(&table, &noisy_model(), &SolverParams::default()).unwrap();

    let mut families = noisy_model().families().to_vec();
    families.push(FamilyDescriptor::new(FamilyKind::CellOff).reference_key(7));
    let with = run(&table, &FitModel::configure(families).unwrap(), &SolverParams::default()).unwrap();

    for kind in [FamilyKind::StarMag, FamilyKind::Zp, FamilyKind::ChannelOff] {
        let a = without.solution.family_values(kind).unwrap();
        let b = with.solution.family_values(kind).unwrap();
        for (a, b) in a.iter().zip(b) {
            assert_abs_diff_eq!(*a, *b, epsilon = 1e-9);
        }
    }
    assert_eq!(with.solution.value_of(FamilyKind::CellOff, 7), Some(0.0));
}

#[test]
fn test_solvers_agree_on_a_fit() {
    let table = noisy_table();
    let model = noisy_model();
    let reference = run(&table, &model, &SolverParams::default()).unwrap();
    for solver in [SolverType::Lsqr, SolverType::Dense] {
        let params = SolverParams {
            solver,
            ..Default::default()
        };
        let result = run(&table, &model, &params).unwrap();
        assert_eq!(result.solution.solver(), solver.to_string());
        for (a, b) in reference
            .solution
            .parameters()
            .iter()
            .zip(result.solution.parameters())
        {
            assert_abs_diff_eq!(*a, *b, epsilon = 1e-6);
        }
    }
}

#[test]
fn test_missing_column() {
    let mut families = noisy_model().families().to_vec();
    families.push(FamilyDescriptor::new(FamilyKind::KExt));
    let model = FitModel::configure(families).unwrap();
    assert!(matches!(
        run(&noisy_table(), &model, &SolverParams::default()),
        Err(FitError::Data(DataError::MissingColumn { name })) if name == "airmass"
    ));
}

#[test]
fn test_non_positive_airmass_is_dropped() {
    let table = ObservationTable::from_columns([
        ("star_key", Column::from(vec![1_i64, 1, 1, 1, 2, 2, 2])),
        ("airmass", Column::from(vec![1.0, 1.5, 2.0, 0.0, 1.2, 1.8, 2.4])),
        ("mag", Column::from(vec![13.1, 13.15, 13.2, 99.0, 15.62, 15.68, 15.74])),
        ("mag_err", Column::from(vec![0.02; 7])),
    ])
    .unwrap();
    let model = FitModel::configure(vec![
        FamilyDescriptor::new(FamilyKind::StarMag),
        FamilyDescriptor::new(FamilyKind::KExt),
    ])
    .unwrap();

    let result = run(&table, &model, &SolverParams::default()).unwrap();
    assert_eq!(result.observations.num_rows(), 6);
    assert_abs_diff_eq!(result.solution.global_value(FamilyKind::KExt).unwrap(), 0.1, epsilon = 1e-9);
}

#[test]
fn test_empty_table() {
    let table = ObservationTable::from_columns([
        ("star_key", Column::Int(vec![])),
        ("exposure_key", Column::Int(vec![])),
        ("mag", Column::Float(vec![])),
        ("mag_err", Column::Float(vec![])),
    ])
    .unwrap();
    assert!(matches!(
        run(&table, &star_zp_model(), &SolverParams::default()),
        Err(FitError::NoObservations)
    ));
}

#[test]
fn test_bad_uncertainty() {
    let mut table = two_by_two();
    table
        .add_column("mag_err", Column::from(vec![0.01, 0.0, 0.01, 0.01]))
        .unwrap();
    assert!(matches!(
        run(&table, &star_zp_model(), &SolverParams::default()),
        Err(FitError::Data(DataError::NonPositiveError { row: 1, .. }))
    ));
}

#[test]
fn test_summary() {
    let result = run(&noisy_table(), &noisy_model(), &SolverParams::default()).unwrap();
    let summary = result.summary();
    assert_eq!(summary.model, "_star_mag_zp_channel_off");
    assert_eq!(summary.num_observations, 24);
    assert_eq!(summary.num_unknowns, 4 + 3 + 2);
    assert_eq!(summary.num_free, 4 + 2 + 1);
    let zp = &summary.families[1];
    assert_eq!(zp.family, FamilyKind::Zp);
    assert_eq!(zp.column_offset, 4);
    assert_eq!(zp.reference_count, 1);
    assert_eq!(zp.free_parameters, 2);
}
