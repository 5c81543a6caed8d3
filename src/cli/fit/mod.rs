// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.


use std::{convert::Infallible, path::PathBuf, str::FromStr};

use clap::Parser;
use itertools::Itertools;
use log::{debug, info, trace};
use serde::{Deserialize, Serialize};
use strum::IntoEnumIterator;
use thiserror::Error;

use super::common::{
    display_warnings, read_serialised_file, InfoPrinter, Warn, ARG_FILE_HELP,
};
use crate::{
    constants::{
        DEFAULT_CELL_COLUMN, DEFAULT_EXPID_COLUMN, DEFAULT_MIN_OBSERVATIONS, DEFAULT_PID_COLUMN,
        DEFAULT_PIVOT_TOLERANCE, DEFAULT_RCID_COLUMN, DEFAULT_X_COLUMN, DEFAULT_Y_COLUMN,
    },
    model::{CellGrid, ConfigError, FamilyDescriptor, FamilyKind, FitModel, References},
    params::{CellDerivation, FitParams, FluxColumns, QualityCut, SummaryFormat},
    solver::{FillOrdering, SolverParams, SolverType},
    store::Key,
    UbercalError,
};

const DEFAULT_FAMILIES: [FamilyKind; 2] = [FamilyKind::StarMag, FamilyKind::Zp];

lazy_static::lazy_static! {
    static ref FAMILIES_HELP: String =
        format!("The parameter families to fit. star_mag is always required. Valid families: {}. Default: {}",
                FamilyKind::names(), DEFAULT_FAMILIES.iter().join(","));

    static ref SOLVER_HELP: String =
        format!("The linear solver. Valid solvers: {}. Default: {}",
                SolverType::iter().join(", "), SolverType::default());

    static ref ORDERING_HELP: String =
        format!("The fill-reducing ordering used by the sparse Cholesky solver. Valid orderings: {}. Default: {}",
                FillOrdering::iter().join(", "), FillOrdering::default());

    static ref PIVOT_TOLERANCE_HELP: String =
        format!("A factorisation pivot smaller than this multiple of its own diagonal element of the normal matrix means the matrix is singular. Default: {DEFAULT_PIVOT_TOLERANCE:e}");

    static ref MIN_OBSERVATIONS_HELP: String =
        format!("Stars with fewer observations than this are dropped before fitting. Default: {DEFAULT_MIN_OBSERVATIONS}");

    static ref CELL_BIN_WIDTH_HELP: String =
        format!("The super-pixel bin widths along x and y [pixels]. They must divide the channel dimensions. Default: {}",
                CellGrid::default());
}

#[derive(Parser, Debug, Clone, Default, Serialize, Deserialize)]
pub(super) struct FitArgs {
    #[clap(name = "ARGUMENTS_FILE", help = ARG_FILE_HELP.as_str(), parse(from_os_str))]
    pub(super) args_file: Option<PathBuf>,

    /// Path to the observation table (CSV).
    #[clap(short, long, parse(from_os_str), help_heading = "INPUT FILES")]
    pub(super) input: Option<PathBuf>,

    /// Path to an exposure metadata table (CSV) with pid and infobits columns.
    /// If given, only observations of quadrants with infobits == 0 are kept.
    #[clap(long, parse(from_os_str), help_heading = "INPUT FILES")]
    pub(super) metadata: Option<PathBuf>,

    /// Path to a fit model (toml or json). The model file supersedes the
    /// family options below.
    #[clap(long, parse(from_os_str), help_heading = "INPUT FILES")]
    pub(super) model_file: Option<PathBuf>,

    #[clap(short, long, multiple_values(true), help = FAMILIES_HELP.as_str(), help_heading = "MODEL")]
    pub(super) families: Option<Vec<String>>,

    /// Pin the unknown of a key to zero, e.g. "zp=0". May be given multiple
    /// times.
    #[clap(short, long, multiple_values(true), help_heading = "MODEL")]
    pub(super) references: Option<Vec<String>>,

    /// Pin one unknown per group of a column, e.g. "cell_off=field".
    #[clap(long, multiple_values(true), help_heading = "MODEL")]
    pub(super) per_group_references: Option<Vec<String>>,

    /// Only pin reference keys in these time slices, e.g. "zp=0".
    #[clap(long, multiple_values(true), help_heading = "MODEL")]
    pub(super) reference_slices: Option<Vec<String>>,

    /// Make a family independent per key of a column, e.g. "zp=night".
    #[clap(long, multiple_values(true), help_heading = "MODEL")]
    pub(super) time_slices: Option<Vec<String>>,

    /// Group a family by a different column, e.g. "channel_off=rcid".
    #[clap(long, multiple_values(true), help_heading = "MODEL")]
    pub(super) input_columns: Option<Vec<String>>,

    /// Multiply a family's unknown by a column, e.g. "k_ext=airmass".
    #[clap(long, multiple_values(true), help_heading = "MODEL")]
    pub(super) weight_columns: Option<Vec<String>>,

    /// The column of observed magnitudes. Default: mag
    #[clap(long, help_heading = "MODEL")]
    pub(super) mag_column: Option<String>,

    /// The column of magnitude uncertainties. Default: mag_err
    #[clap(long, help_heading = "MODEL")]
    pub(super) mag_err_column: Option<String>,

    /// Compute the magnitude columns from these flux and flux uncertainty
    /// columns. Non-positive fluxes are dropped.
    #[clap(long, number_of_values = 2, value_names = &["FLUX", "FLUX_ERR"], help_heading = "MODEL")]
    pub(super) flux_columns: Option<Vec<String>>,

    #[clap(long, help = MIN_OBSERVATIONS_HELP.as_str(), help_heading = "MODEL")]
    pub(super) min_observations: Option<usize>,

    #[clap(long, number_of_values = 2, value_names = &["X", "Y"], help = CELL_BIN_WIDTH_HELP.as_str(), help_heading = "MODEL")]
    pub(super) cell_bin_width: Option<Vec<u32>>,

    /// Derive the super-pixel cell of every observation from its position
    /// and readout channel instead of reading it from the table.
    #[clap(long, help_heading = "MODEL")]
    #[serde(default)]
    pub(super) derive_cells: bool,

    /// The column of pixel x positions. Default: x
    #[clap(long, help_heading = "CATALOGUE COLUMNS")]
    pub(super) x_column: Option<String>,

    /// The column of pixel y positions. Default: y
    #[clap(long, help_heading = "CATALOGUE COLUMNS")]
    pub(super) y_column: Option<String>,

    /// The column of readout-channel ids (0 to 63). Default: rcid
    #[clap(long, help_heading = "CATALOGUE COLUMNS")]
    pub(super) rcid_column: Option<String>,

    /// The column of exposure ids. Default: expid
    #[clap(long, help_heading = "CATALOGUE COLUMNS")]
    pub(super) expid_column: Option<String>,

    /// The column of quadrant-exposure ids. It is derived from the exposure
    /// and readout-channel ids when absent. Default: pid
    #[clap(long, help_heading = "CATALOGUE COLUMNS")]
    pub(super) pid_column: Option<String>,

    #[clap(long, help = SOLVER_HELP.as_str(), help_heading = "SOLVER")]
    pub(super) solver: Option<String>,

    #[clap(long, help = ORDERING_HELP.as_str(), help_heading = "SOLVER")]
    pub(super) ordering: Option<String>,

    #[clap(long, help = PIVOT_TOLERANCE_HELP.as_str(), help_heading = "SOLVER")]
    pub(super) pivot_tolerance: Option<f64>,

    /// Retry with LSQR if the factorisation of the normal matrix fails.
    #[clap(long, help_heading = "SOLVER")]
    #[serde(default)]
    pub(super) lsqr_fallback: bool,

    /// The LSQR stopping tolerance on the relative residual.
    #[clap(long, help_heading = "SOLVER")]
    pub(super) lsqr_tolerance: Option<f64>,

    /// The maximum number of LSQR iterations.
    #[clap(long, help_heading = "SOLVER")]
    pub(super) lsqr_max_iterations: Option<usize>,

    /// Path to the output observation table (CSV) with the solved values,
    /// residuals and pulls appended. Default: the input name with the model
    /// description appended, e.g. "obs_star_mag_zp.csv".
    #[clap(short, long, parse(from_os_str), help_heading = "OUTPUT FILES")]
    pub(super) output: Option<PathBuf>,

    /// Path to a CSV table with one row per unknown.
    #[clap(long, parse(from_os_str), help_heading = "OUTPUT FILES")]
    pub(super) parameters_output: Option<PathBuf>,

    /// Path to a fit summary (toml or json).
    #[clap(long, parse(from_os_str), help_heading = "OUTPUT FILES")]
    pub(super) summary_output: Option<PathBuf>,

    /// Report the reduced chi² of the groups of these columns.
    #[clap(long, multiple_values(true), help_heading = "OUTPUT FILES")]
    pub(super) chi2_by: Option<Vec<String>>,
}

impl FitArgs {
    /// Both command-line and file arguments overlap in terms of what is
    /// available; this function consolidates everything that was specified into
    /// a single struct. Where applicable, it will prefer CLI parameters over
    /// those in the file.
    ///
    /// This function should only ever merge arguments, and not try to make
    /// sense of them.
    pub(super) fn merge(self) -> Result<FitArgs, UbercalError> {
        debug!("Merging command-line arguments with the argument file");

        let cli_args = self;

        if let Some(arg_file) = cli_args.args_file {
            // Read in the file arguments. Ensure all of the file args are
            // accounted for by pattern matching.
            let FitArgs {
                args_file: _,
                input,
                metadata,
                model_file,
                families,
                references,
                per_group_references,
                reference_slices,
                time_slices,
                input_columns,
                weight_columns,
                mag_column,
                mag_err_column,
                flux_columns,
                min_observations,
                cell_bin_width,
                derive_cells,
                x_column,
                y_column,
                rcid_column,
                expid_column,
                pid_column,
                solver,
                ordering,
                pivot_tolerance,
                lsqr_fallback,
                lsqr_tolerance,
                lsqr_max_iterations,
                output,
                parameters_output,
                summary_output,
                chi2_by,
            } = unpack_arg_file!(arg_file);

            // Merge all the arguments, preferring the CLI args when available.
            Ok(FitArgs {
                args_file: None,
                input: cli_args.input.or(input),
                metadata: cli_args.metadata.or(metadata),
                model_file: cli_args.model_file.or(model_file),
                families: cli_args.families.or(families),
                references: cli_args.references.or(references),
                per_group_references: cli_args.per_group_references.or(per_group_references),
                reference_slices: cli_args.reference_slices.or(reference_slices),
                time_slices: cli_args.time_slices.or(time_slices),
                input_columns: cli_args.input_columns.or(input_columns),
                weight_columns: cli_args.weight_columns.or(weight_columns),
                mag_column: cli_args.mag_column.or(mag_column),
                mag_err_column: cli_args.mag_err_column.or(mag_err_column),
                flux_columns: cli_args.flux_columns.or(flux_columns),
                min_observations: cli_args.min_observations.or(min_observations),
                cell_bin_width: cli_args.cell_bin_width.or(cell_bin_width),
                derive_cells: cli_args.derive_cells || derive_cells,
                x_column: cli_args.x_column.or(x_column),
                y_column: cli_args.y_column.or(y_column),
                rcid_column: cli_args.rcid_column.or(rcid_column),
                expid_column: cli_args.expid_column.or(expid_column),
                pid_column: cli_args.pid_column.or(pid_column),
                solver: cli_args.solver.or(solver),
                ordering: cli_args.ordering.or(ordering),
                pivot_tolerance: cli_args.pivot_tolerance.or(pivot_tolerance),
                lsqr_fallback: cli_args.lsqr_fallback || lsqr_fallback,
                lsqr_tolerance: cli_args.lsqr_tolerance.or(lsqr_tolerance),
                lsqr_max_iterations: cli_args.lsqr_max_iterations.or(lsqr_max_iterations),
                output: cli_args.output.or(output),
                parameters_output: cli_args.parameters_output.or(parameters_output),
                summary_output: cli_args.summary_output.or(summary_output),
                chi2_by: cli_args.chi2_by.or(chi2_by),
            })
        } else {
            Ok(cli_args)
        }
    }

    pub(super) fn parse(self) -> Result<FitParams, UbercalError> {
        debug!("{:#?}", self);

        let Self {
            args_file: _,
            input,
            metadata,
            model_file,
            families,
            references,
            per_group_references,
            reference_slices,
            time_slices,
            input_columns,
            weight_columns,
            mag_column,
            mag_err_column,
            flux_columns,
            min_observations,
            cell_bin_width,
            derive_cells,
            x_column,
            y_column,
            rcid_column,
            expid_column,
            pid_column,
            solver,
            ordering,
            pivot_tolerance,
            lsqr_fallback,
            lsqr_tolerance,
            lsqr_max_iterations,
            output,
            parameters_output,
            summary_output,
            chi2_by,
        } = self;

        let input = input.ok_or(FitArgsError::NoInput)?;
        if !input.exists() {
            return Err(FitArgsError::InputDoesntExist(input).into());
        }

        let family_options = FamilyOptions {
            families,
            references,
            per_group_references,
            reference_slices,
            time_slices,
            input_columns,
            weight_columns,
        };
        let mut model = match model_file {
            Some(model_file) => {
                debug!("Reading the fit model from {}", model_file.display());
                let model: FitModel = read_serialised_file(&model_file, "Model file")?;
                model.validate()?;
                if family_options.any_given() {
                    format!(
                        "The model file {} supersedes the family options, which are ignored",
                        model_file.display()
                    )
                    .warn();
                }
                model
            }
            None => family_options.into_model()?,
        };

        if mag_column.is_some() || mag_err_column.is_some() {
            let mag = mag_column.unwrap_or_else(|| model.magnitude_column().to_string());
            let mag_err = mag_err_column.unwrap_or_else(|| model.error_column().to_string());
            model = model.with_magnitude_columns(&mag, &mag_err);
        }
        if let Some(min_observations) = min_observations {
            model = model.with_min_observations(min_observations)?;
        }
        match cell_bin_width.as_deref() {
            Some(&[x, y]) => model = model.with_cell_grid(CellGrid::new(x, y)?),
            Some(widths) => return Err(FitArgsError::CellBinWidth(widths.len()).into()),
            None => {
                if model.is_active(FamilyKind::CellOff) && model.cell_grid().is_none() {
                    model = model.with_cell_grid(CellGrid::default());
                }
            }
        }

        let flux = match flux_columns.as_deref() {
            Some([flux, flux_err]) => Some(FluxColumns {
                flux: flux.clone(),
                flux_err: flux_err.clone(),
            }),
            Some(columns) => return Err(FitArgsError::FluxColumns(columns.len()).into()),
            None => None,
        };

        let rcid_column = rcid_column.unwrap_or_else(|| DEFAULT_RCID_COLUMN.to_string());
        let cells = if derive_cells {
            let cell_off = model
                .family(FamilyKind::CellOff)
                .ok_or(FitArgsError::DeriveCellsWithoutCellOff)?;
            Some(CellDerivation {
                grid: model.cell_grid().unwrap_or_default(),
                x_column: x_column.unwrap_or_else(|| DEFAULT_X_COLUMN.to_string()),
                y_column: y_column.unwrap_or_else(|| DEFAULT_Y_COLUMN.to_string()),
                rcid_column: rcid_column.clone(),
                name: cell_off
                    .input_column
                    .clone()
                    .unwrap_or_else(|| DEFAULT_CELL_COLUMN.to_string()),
            })
        } else {
            if x_column.is_some() || y_column.is_some() {
                "Pixel position columns were given, but cells aren't being derived; ignoring"
                    .warn();
            }
            None
        };

        let quality_cut = match metadata {
            Some(metadata) => {
                if !metadata.exists() {
                    return Err(FitArgsError::MetadataDoesntExist(metadata).into());
                }
                Some(QualityCut {
                    metadata,
                    pid_column: pid_column.unwrap_or_else(|| DEFAULT_PID_COLUMN.to_string()),
                    expid_column: expid_column
                        .unwrap_or_else(|| DEFAULT_EXPID_COLUMN.to_string()),
                    rcid_column,
                })
            }
            None => None,
        };

        let solver = {
            let mut params = SolverParams {
                fallback_to_lsqr: lsqr_fallback,
                ..Default::default()
            };
            if let Some(solver) = solver {
                params.solver = SolverType::from_str(&solver.to_lowercase()).map_err(|_| {
                    FitArgsError::UnknownSolver {
                        got: solver,
                        valid: SolverType::iter().join(", "),
                    }
                })?;
            }
            if let Some(ordering) = ordering {
                params.ordering = FillOrdering::from_str(&ordering.to_lowercase()).map_err(|_| {
                    FitArgsError::UnknownOrdering {
                        got: ordering,
                        valid: FillOrdering::iter().join(", "),
                    }
                })?;
            }
            if let Some(tol) = pivot_tolerance {
                if !(tol > 0.0 && tol < 1.0) {
                    return Err(FitArgsError::PivotTolerance(tol).into());
                }
                params.pivot_tolerance = tol;
            }
            if let Some(tol) = lsqr_tolerance {
                if !(tol > 0.0) {
                    return Err(FitArgsError::LsqrTolerance(tol).into());
                }
                params.lsqr_atol = tol;
                params.lsqr_btol = tol;
            }
            if let Some(max) = lsqr_max_iterations {
                params.lsqr_max_iterations = max;
            }
            params
        };

        let output = output.unwrap_or_else(|| {
            let stem = input
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| "observations".to_string());
            input.with_file_name(format!("{stem}{}.csv", model.save_string()))
        });
        let summary_output = match summary_output {
            Some(path) => {
                let format = path
                    .extension()
                    .and_then(|e| e.to_str())
                    .and_then(|e| SummaryFormat::from_str(&e.to_lowercase()).ok())
                    .ok_or_else(|| FitArgsError::SummaryExtension(path.clone()))?;
                Some((path, format))
            }
            None => None,
        };

        let mut model_printer = InfoPrinter::new(format!("Fitting {}", input.display()).into());
        model_printer.push_block(
            model
                .sorted_families()
                .into_iter()
                .map(|f| describe_family(f).into())
                .collect(),
        );
        let mut block = vec![format!(
            "magnitudes '{}' ± '{}'",
            model.magnitude_column(),
            model.error_column()
        )
        .into()];
        if let Some(flux) = &flux {
            block.push(format!("computed from fluxes '{}' ± '{}'", flux.flux, flux.flux_err).into());
        }
        block.push(format!("at least {} observations per star", model.min_observations()).into());
        model_printer.push_block(block);
        if let Some(cells) = &cells {
            model_printer.push_line(
                format!(
                    "{} cells derived from '{}', '{}' and '{}'",
                    cells.grid, cells.x_column, cells.y_column, cells.rcid_column
                )
                .into(),
            );
        }
        if let Some(cut) = &quality_cut {
            model_printer
                .push_line(format!("infobits cut against {}", cut.metadata.display()).into());
        }
        model_printer.display();

        let mut solver_printer = InfoPrinter::new("Solver".into());
        solver_printer.push_line(
            match solver.solver {
                SolverType::Cholesky => format!(
                    "{} ({} ordering, pivot tolerance {:e})",
                    solver.solver, solver.ordering, solver.pivot_tolerance
                ),
                SolverType::Dense => {
                    format!("{} (pivot tolerance {:e})", solver.solver, solver.pivot_tolerance)
                }
                SolverType::Lsqr => format!(
                    "{} (tolerance {:e}, at most {} iterations)",
                    solver.solver, solver.lsqr_atol, solver.lsqr_max_iterations
                ),
            }
            .into(),
        );
        if solver.fallback_to_lsqr {
            solver_printer.push_line("falling back to LSQR if factorisation fails".into());
        }
        solver_printer.display();

        let mut output_printer = InfoPrinter::new("Output files".into());
        let mut block = vec![format!("{}", output.display()).into()];
        block.extend(
            parameters_output
                .iter()
                .chain(summary_output.iter().map(|(p, _)| p))
                .map(|p| format!("{}", p.display()).into()),
        );
        output_printer.push_block(block);
        output_printer.display();

        display_warnings();

        Ok(FitParams {
            input,
            flux,
            quality_cut,
            cells,
            model,
            solver,
            output,
            parameters_output,
            summary_output,
            chi2_by: chi2_by.unwrap_or_default(),
        })
    }

    pub(super) fn run(self, dry_run: bool) -> Result<(), UbercalError> {
        debug!("Converting arguments into parameters");
        trace!("{:#?}", self);
        let params = self.parse()?;

        if dry_run {
            info!("Dry run -- exiting now.");
            return Ok(());
        }

        params.run()?;
        Ok(())
    }
}

/// The options that describe the families of a fit, before they're turned
/// into a [`FitModel`].
struct FamilyOptions {
    families: Option<Vec<String>>,
    references: Option<Vec<String>>,
    per_group_references: Option<Vec<String>>,
    reference_slices: Option<Vec<String>>,
    time_slices: Option<Vec<String>>,
    input_columns: Option<Vec<String>>,
    weight_columns: Option<Vec<String>>,
}

impl FamilyOptions {
    fn any_given(&self) -> bool {
        self.families.is_some()
            || self.references.is_some()
            || self.per_group_references.is_some()
            || self.reference_slices.is_some()
            || self.time_slices.is_some()
            || self.input_columns.is_some()
            || self.weight_columns.is_some()
    }

    fn into_model(self) -> Result<FitModel, FitArgsError> {
        let kinds = match self.families {
            Some(families) => families
                .iter()
                .flat_map(|f| f.split(','))
                .filter(|f| !f.trim().is_empty())
                .map(FamilyKind::parse_name)
                .collect::<Result<Vec<_>, _>>()?,
            None => DEFAULT_FAMILIES.to_vec(),
        };

        let references = parse_family_map("--references", self.references, &kinds)?;
        let per_group = parse_family_map("--per-group-references", self.per_group_references, &kinds)?;
        let slices = parse_family_map("--reference-slices", self.reference_slices, &kinds)?;
        let time_slices = parse_family_map("--time-slices", self.time_slices, &kinds)?;
        let input_columns = parse_family_map("--input-columns", self.input_columns, &kinds)?;
        let weight_columns = parse_family_map("--weight-columns", self.weight_columns, &kinds)?;

        let mut descriptors = Vec::with_capacity(kinds.len());
        for &kind in &kinds {
            let mut descriptor = FamilyDescriptor::new(kind);
            if let Some(column) = last(&input_columns, kind) {
                descriptor = descriptor.input_column(Some(&column));
            }
            if let Some(column) = last(&weight_columns, kind) {
                descriptor = descriptor.weight_column(Some(&column));
            }
            if let Some(column) = last(&time_slices, kind) {
                descriptor = descriptor.time_slice_column(&column);
            }

            let keys = all_keys(&references, kind);
            let reference_slices = all_keys(&slices, kind);
            let group_column = last(&per_group, kind);
            let refs = match (keys.is_empty(), group_column) {
                (false, Some(_)) => return Err(FitArgsError::ConflictingReferences(kind)),
                (true, Some(column)) => References::PerGroup { column },
                (false, None) => References::Keys {
                    keys,
                    slices: (!reference_slices.is_empty()).then_some(reference_slices.clone()),
                },
                (true, None) => References::None,
            };
            if !reference_slices.is_empty() && !matches!(refs, References::Keys { .. }) {
                return Err(FitArgsError::SlicesWithoutKeyReferences(kind));
            }
            descriptors.push(descriptor.references(refs));
        }

        Ok(FitModel::configure(descriptors)?)
    }
}

/// Parse "family=value" options. Every family must be one of `active`.
fn parse_family_map(
    option: &'static str,
    values: Option<Vec<String>>,
    active: &[FamilyKind],
) -> Result<Vec<(FamilyKind, String)>, FitArgsError> {
    let mut map = vec![];
    for value in values.into_iter().flatten() {
        let (family, rhs) = match value.split_once('=') {
            Some((f, r)) if !r.trim().is_empty() => (f, r.trim()),
            _ => return Err(FitArgsError::BadMapping { option, value }),
        };
        let kind = FamilyKind::parse_name(family)?;
        if !active.contains(&kind) {
            return Err(FitArgsError::InactiveFamily {
                option,
                family: kind,
            });
        }
        map.push((kind, rhs.to_string()));
    }
    Ok(map)
}

/// The value of the last option given for `kind`.
fn last(map: &[(FamilyKind, String)], kind: FamilyKind) -> Option<String> {
    map.iter()
        .rev()
        .find(|(k, _)| *k == kind)
        .map(|(_, v)| v.clone())
}

/// The values of every option given for `kind`, as keys.
fn all_keys(map: &[(FamilyKind, String)], kind: FamilyKind) -> Vec<Key> {
    map.iter()
        .filter(|(k, _)| *k == kind)
        .map(|(_, v)| parse_key(v))
        .collect()
}

fn parse_key(s: &str) -> Key {
    s.parse().unwrap_or_else(|e: Infallible| match e {})
}

fn describe_family(f: &FamilyDescriptor) -> String {
    let mut s = match &f.input_column {
        Some(column) => format!("{} by '{column}'", f.kind),
        None => format!("{} (global)", f.kind),
    };
    if let Some(weight) = &f.weight_column {
        s.push_str(&format!(" × '{weight}'"));
    }
    if let Some(slice) = &f.time_slice_column {
        s.push_str(&format!(", per '{slice}'"));
    }
    match &f.references {
        References::None => (),
        References::Keys { keys, slices } => {
            s.push_str(&format!(", references {}", keys.iter().join(",")));
            if let Some(slices) = slices {
                s.push_str(&format!(" in slices {}", slices.iter().join(",")));
            }
        }
        References::PerGroup { column } => s.push_str(&format!(", one reference per '{column}'")),
    }
    s
}

#[derive(Error, Debug)]
pub(super) enum FitArgsError {
    #[error("No observation table was supplied")]
    NoInput,

    #[error("Observation table '{}' does not exist", .0.display())]
    InputDoesntExist(PathBuf),

    #[error("Exposure metadata table '{}' does not exist", .0.display())]
    MetadataDoesntExist(PathBuf),

    #[error("Couldn't parse '{value}' given to {option}; expected 'family=value'")]
    BadMapping { option: &'static str, value: String },

    #[error("{option} refers to family '{family}', which is not being fitted")]
    InactiveFamily {
        option: &'static str,
        family: FamilyKind,
    },

    #[error("Family '{0}' was given both reference keys and per-group references")]
    ConflictingReferences(FamilyKind),

    #[error("Reference slices were given for family '{0}', which has no reference keys")]
    SlicesWithoutKeyReferences(FamilyKind),

    #[error("Two super-pixel bin widths (x and y) are required, but {0} were given")]
    CellBinWidth(usize),

    #[error("Two flux columns (flux and its uncertainty) are required, but {0} were given")]
    FluxColumns(usize),

    #[error("Cells can only be derived when the cell_off family is fitted")]
    DeriveCellsWithoutCellOff,

    #[error("Unknown solver '{got}'; valid solvers are: {valid}")]
    UnknownSolver { got: String, valid: String },

    #[error("Unknown ordering '{got}'; valid orderings are: {valid}")]
    UnknownOrdering { got: String, valid: String },

    #[error("The pivot tolerance must be between 0 and 1, but {0} was given")]
    PivotTolerance(f64),

    #[error("The LSQR tolerance must be positive, but {0} was given")]
    LsqrTolerance(f64),

    #[error("Summary file '{}' must end in .toml or .json", .0.display())]
    SummaryExtension(PathBuf),

    #[error(transparent)]
    Config(#[from] ConfigError),
}
