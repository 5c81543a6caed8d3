// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use indoc::indoc;

use super::*;

fn star_and_zp() -> Vec<FamilyDescriptor> {
    vec![
        FamilyDescriptor::new(FamilyKind::Zp).reference_key(0),
        FamilyDescriptor::new(FamilyKind::StarMag),
    ]
}

#[test]
fn test_families_are_sorted() {
    let model = FitModel::configure(vec![
        FamilyDescriptor::new(FamilyKind::KExt),
        FamilyDescriptor::new(FamilyKind::CellOff).reference_key(0),
        FamilyDescriptor::new(FamilyKind::StarMag),
        FamilyDescriptor::new(FamilyKind::Zp).reference_key(0),
    ])
    .unwrap();
    assert_eq!(
        model.family_kinds(),
        vec![
            FamilyKind::StarMag,
            FamilyKind::Zp,
            FamilyKind::CellOff,
            FamilyKind::KExt
        ]
    );
    assert!(model.is_active(FamilyKind::KExt));
    assert!(!model.is_active(FamilyKind::ChannelOff));
}

#[test]
fn test_duplicate_family() {
    let mut families = star_and_zp();
    families.push(FamilyDescriptor::new(FamilyKind::Zp));
    assert!(matches!(
        FitModel::configure(families),
        Err(ConfigError::DuplicateFamily(FamilyKind::Zp))
    ));
}

#[test]
fn test_star_mag_is_required() {
    assert!(matches!(
        FitModel::configure(vec![FamilyDescriptor::new(FamilyKind::Zp).reference_key(0)]),
        Err(ConfigError::MissingRequiredFamily(FamilyKind::StarMag))
    ));
}

#[test]
fn test_star_mag_takes_no_references() {
    let families = vec![FamilyDescriptor::new(FamilyKind::StarMag).reference_key("A")];
    assert!(matches!(
        FitModel::configure(families),
        Err(ConfigError::ReferenceNotAllowed(FamilyKind::StarMag))
    ));
}

#[test]
fn test_one_zero_point_reference() {
    let families = vec![
        FamilyDescriptor::new(FamilyKind::StarMag),
        FamilyDescriptor::new(FamilyKind::Zp).references(References::keys([Key::Int(0), Key::Int(1)])),
    ];
    assert!(matches!(
        FitModel::configure(families),
        Err(ConfigError::TooManyReferences { num: 2, .. })
    ));

    // Other families may pin several keys.
    let families = vec![
        FamilyDescriptor::new(FamilyKind::StarMag),
        FamilyDescriptor::new(FamilyKind::ChannelOff)
            .references(References::keys([Key::Int(0), Key::Int(1)])),
    ];
    assert!(FitModel::configure(families).is_ok());
}

#[test]
fn test_extinction_needs_a_weight() {
    let families = vec![
        FamilyDescriptor::new(FamilyKind::StarMag),
        FamilyDescriptor::new(FamilyKind::KExt).weight_column(None),
    ];
    assert!(matches!(
        FitModel::configure(families),
        Err(ConfigError::MissingWeight(FamilyKind::KExt))
    ));
}

#[test]
fn test_contradictory_weight() {
    let families = vec![
        FamilyDescriptor::new(FamilyKind::StarMag),
        FamilyDescriptor::new(FamilyKind::ChannelOff)
            .reference_key(0)
            .weight_column(Some("channel_key")),
    ];
    match FitModel::configure(families) {
        Err(ConfigError::ContradictoryWeight { family, column }) => {
            assert_eq!(family, FamilyKind::ChannelOff);
            assert_eq!(column, "channel_key");
        }
        other => panic!("unexpected result: {other:?}"),
    }
}

#[test]
fn test_add_time_dependence() {
    let mut model = FitModel::configure(star_and_zp()).unwrap();
    model.add_time_dependence(FamilyKind::Zp, "night").unwrap();
    assert_eq!(
        model.family(FamilyKind::Zp).unwrap().time_slice_column.as_deref(),
        Some("night")
    );
    assert!(model.required_columns().contains(&"night"));

    assert!(matches!(
        model.add_time_dependence(FamilyKind::CellOff, "night"),
        Err(ConfigError::FamilyNotActive(FamilyKind::CellOff))
    ));

    // Slicing a family by its own grouping column is refused and leaves the
    // model as it was.
    assert!(matches!(
        model.add_time_dependence(FamilyKind::Zp, "exposure_key"),
        Err(ConfigError::IncompatibleTimeSlice { .. })
    ));
    assert_eq!(
        model.family(FamilyKind::Zp).unwrap().time_slice_column.as_deref(),
        Some("night")
    );
}

#[test]
fn test_reference_slices_need_slicing() {
    let families = vec![
        FamilyDescriptor::new(FamilyKind::StarMag),
        FamilyDescriptor::new(FamilyKind::Zp).references(References::Keys {
            keys: vec![Key::Int(0)],
            slices: Some(vec![Key::Int(0)]),
        }),
    ];
    assert!(matches!(
        FitModel::configure(families),
        Err(ConfigError::SlicesWithoutTimeDependence(FamilyKind::Zp))
    ));
}

#[test]
fn test_min_observations() {
    let model = FitModel::configure(star_and_zp()).unwrap();
    assert_eq!(model.min_observations(), 3);
    assert!(matches!(
        model.clone().with_min_observations(0),
        Err(ConfigError::ZeroMinObservations)
    ));
    assert_eq!(model.with_min_observations(5).unwrap().min_observations(), 5);
}

#[test]
fn test_required_columns() {
    let model = FitModel::configure(vec![
        FamilyDescriptor::new(FamilyKind::StarMag),
        FamilyDescriptor::new(FamilyKind::Zp).references(References::PerGroup {
            column: "field".to_string(),
        }),
        FamilyDescriptor::new(FamilyKind::KExt),
    ])
    .unwrap()
    .with_magnitude_columns("mag_psf", "e_mag_psf");
    assert_eq!(
        model.required_columns(),
        vec!["mag_psf", "e_mag_psf", "star_key", "exposure_key", "field", "airmass"]
    );
}

#[test]
fn test_save_string() {
    let mut model = FitModel::configure(vec![
        FamilyDescriptor::new(FamilyKind::CellOff).reference_key(0),
        FamilyDescriptor::new(FamilyKind::StarMag),
        FamilyDescriptor::new(FamilyKind::Zp).reference_key(0),
    ])
    .unwrap()
    .with_cell_grid(CellGrid::default());
    model.add_time_dependence(FamilyKind::Zp, "night").unwrap();
    assert_eq!(model.save_string(), "_star_mag_night_zp_cell_off_384x440");

    let model = FitModel::configure(star_and_zp()).unwrap();
    assert_eq!(model.save_string(), "_star_mag_zp");
}

#[test]
fn test_parse_name() {
    assert_eq!(FamilyKind::parse_name("ZP").unwrap(), FamilyKind::Zp);
    assert_eq!(FamilyKind::parse_name(" k_ext ").unwrap(), FamilyKind::KExt);
    assert_eq!(FamilyKind::parse_name("Star_Mag").unwrap(), FamilyKind::StarMag);
    match FamilyKind::parse_name("airmass") {
        Err(ConfigError::UnknownFamily(name, names)) => {
            assert_eq!(name, "airmass");
            assert_eq!(names, "star_mag, zp, channel_off, cell_off, k_ext");
        }
        other => panic!("unexpected result: {other:?}"),
    }
}

#[test]
fn test_cell_grid() {
    let grid = CellGrid::default();
    assert_eq!(grid.num_cells_x(), 8);
    assert_eq!(grid.num_cells_y(), 7);
    assert_eq!(grid.cells_per_channel(), 56);
    assert_eq!(grid.cell_id(0.0, 0.0, 0), Some(0));
    assert_eq!(grid.cell_id(400.0, 500.0, 2), Some(7 + 1 + 2 * 56));
    assert_eq!(grid.cell_id(3071.9, 3079.9, 0), Some(55));
    assert_eq!(grid.cell_id(3072.0, 10.0, 0), None);
    assert_eq!(grid.cell_id(-1.0, 10.0, 0), None);
    assert_eq!(grid.cell_id(f64::NAN, 10.0, 0), None);
    assert_eq!(grid.to_string(), "384x440");

    assert!(matches!(
        CellGrid::new(100, 440),
        Err(ConfigError::BinSizeNotDivisor {
            axis: 'x',
            width: 100,
            ..
        })
    ));
    assert!(matches!(
        CellGrid::new(384, 0),
        Err(ConfigError::BinSizeNotDivisor { axis: 'y', .. })
    ));
    assert!(CellGrid::new(3072, 3080).is_ok());
}

#[test]
fn test_model_from_toml() {
    let contents = indoc! {r#"
        min_observations = 2

        [cell_grid]
        bin_width_x = 768
        bin_width_y = 616

        [[families]]
        kind = "star_mag"
        input_column = "star_key"

        [[families]]
        kind = "zp"
        input_column = "exposure_key"
        time_slice_column = "night"
        references = { type = "keys", keys = [0], slices = [0] }

        [[families]]
        kind = "cell_off"
        input_column = "cell_key"
        references = { type = "per_group", column = "field" }
    "#};
    let model: FitModel = toml::from_str(contents).unwrap();
    model.validate().unwrap();
    assert_eq!(model.min_observations(), 2);
    assert_eq!(model.magnitude_column(), "mag");
    assert_eq!(model.cell_grid(), Some(CellGrid::new(768, 616).unwrap()));
    assert_eq!(model.save_string(), "_star_mag_night_zp_cell_off_768x616");
    assert_eq!(
        model.family(FamilyKind::Zp).unwrap().references,
        References::Keys {
            keys: vec![Key::Int(0)],
            slices: Some(vec![Key::Int(0)])
        }
    );

    // The JSON rendition describes the same model.
    let json = serde_json::to_string(&model).unwrap();
    let back: FitModel = serde_json::from_str(&json).unwrap();
    assert_eq!(back, model);
}

#[test]
fn test_bad_cell_grid_in_file() {
    let contents = indoc! {r#"
        [cell_grid]
        bin_width_x = 100
        bin_width_y = 440

        [[families]]
        kind = "star_mag"
    "#};
    assert!(toml::from_str::<FitModel>(contents).is_err());
}
