// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use std::path::PathBuf;

use itertools::Itertools;
use log::{debug, info};
use strum_macros::{Display, EnumString};
use thiserror::Error;

use crate::{
    cli::InfoPrinter,
    constants::DEFAULT_PID_COLUMN,
    engine::{self, FitError, FitResult},
    misc::expensive_op,
    model::{CellGrid, FitModel},
    preprocess::{add_cell_column, add_magnitudes, add_pid, remove_infobits, MagnitudeColumns},
    solver::SolverParams,
    store::{read_csv, write_csv, DataError, ObservationTable, ReadTableError, WriteTableError},
};

/// How many of the worst groups are reported for each chi² grouping column.
const NUM_WORST_GROUPS: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
pub(crate) enum SummaryFormat {
    #[strum(serialize = "toml")]
    Toml,
    #[strum(serialize = "json")]
    Json,
}

/// Magnitudes are computed from these flux columns before fitting.
#[derive(Debug, Clone)]
pub(crate) struct FluxColumns {
    pub(crate) flux: String,
    pub(crate) flux_err: String,
}

/// Only keep observations of quadrant-exposures with `infobits == 0`.
#[derive(Debug, Clone)]
pub(crate) struct QualityCut {
    pub(crate) metadata: PathBuf,
    pub(crate) pid_column: String,
    pub(crate) expid_column: String,
    pub(crate) rcid_column: String,
}

impl QualityCut {
    fn apply(&self, mut table: ObservationTable) -> Result<ObservationTable, FitParamsError> {
        info!("Reading exposure metadata from {}", self.metadata.display());
        let metadata = read_csv(&self.metadata)?;

        let pid_column = if table.has_column(&self.pid_column) {
            self.pid_column.as_str()
        } else {
            debug!(
                "Deriving '{DEFAULT_PID_COLUMN}' from '{}' and '{}'",
                self.expid_column, self.rcid_column
            );
            add_pid(&mut table, &self.expid_column, &self.rcid_column)?;
            DEFAULT_PID_COLUMN
        };
        Ok(remove_infobits(
            &table,
            pid_column,
            &metadata,
            &self.pid_column,
        )?)
    }
}

/// Derive super-pixel cells from pixel positions.
#[derive(Debug, Clone)]
pub(crate) struct CellDerivation {
    pub(crate) grid: CellGrid,
    pub(crate) x_column: String,
    pub(crate) y_column: String,
    pub(crate) rcid_column: String,
    /// The name of the new cell column.
    pub(crate) name: String,
}

#[derive(Debug)]
pub(crate) struct FitParams {
    pub(crate) input: PathBuf,
    pub(crate) flux: Option<FluxColumns>,
    pub(crate) quality_cut: Option<QualityCut>,
    pub(crate) cells: Option<CellDerivation>,
    pub(crate) model: FitModel,
    pub(crate) solver: SolverParams,
    pub(crate) output: PathBuf,
    pub(crate) parameters_output: Option<PathBuf>,
    pub(crate) summary_output: Option<(PathBuf, SummaryFormat)>,
    pub(crate) chi2_by: Vec<String>,
}

impl FitParams {
    pub(crate) fn run(&self) -> Result<(), FitParamsError> {
        let table = self.prepare()?;

        let result = expensive_op(
            || engine::run(&table, &self.model, &self.solver),
            "Still fitting",
        )?;
        self.report(&result)?;
        self.write(&result)?;
        Ok(())
    }

    /// Read the observations and apply every preprocessing step.
    fn prepare(&self) -> Result<ObservationTable, FitParamsError> {
        info!("Reading observations from {}", self.input.display());
        let mut table = read_csv(&self.input)?;
        debug!(
            "Read {} rows with columns: {}",
            table.num_rows(),
            table.column_names().join(", ")
        );

        if let Some(flux) = &self.flux {
            add_magnitudes(
                &mut table,
                &MagnitudeColumns {
                    flux: &flux.flux,
                    flux_err: &flux.flux_err,
                    mag: self.model.magnitude_column(),
                    mag_err: self.model.error_column(),
                },
                None,
            )?;
        }
        if let Some(cut) = &self.quality_cut {
            table = cut.apply(table)?;
        }
        if let Some(cells) = &self.cells {
            add_cell_column(
                &mut table,
                cells.grid,
                &cells.x_column,
                &cells.y_column,
                &cells.rcid_column,
                &cells.name,
            )?;
        }

        let num_rows = table.num_rows();
        let table = table.drop_nulls(&self.model.required_columns())?;
        if table.num_rows() < num_rows {
            info!(
                "Dropped {} observations with nulls in the fit columns",
                num_rows - table.num_rows()
            );
        }
        Ok(table)
    }

    fn report(&self, result: &FitResult) -> Result<(), FitParamsError> {
        let summary = result.summary();
        let mut printer = InfoPrinter::new(format!("Fitted model {}", summary.model).into());
        printer.push_block(vec![
            format!("Solved with {}", summary.solver).into(),
            format!(
                "{} observations, {} unknowns ({} free)",
                summary.num_observations, summary.num_unknowns, summary.num_free
            )
            .into(),
            match summary.reduced_chi2 {
                Some(r) => format!("chi² = {:.3}, reduced chi² = {r:.4}", summary.chi2),
                None => format!("chi² = {:.3}, no degrees of freedom", summary.chi2),
            }
            .into(),
        ]);
        printer.push_block(
            summary
                .families
                .iter()
                .map(|f| {
                    format!(
                        "{}: {} unknowns, {} references, reduced chi² {:.4}",
                        f.family, f.size, f.reference_count, f.reduced_chi2
                    )
                    .into()
                })
                .collect(),
        );
        printer.display();

        for column in &self.chi2_by {
            let mut groups = result
                .solution
                .chi2_by_group(&result.observations, column)?;
            for (key, chi2, n) in &groups {
                debug!("{column} {key}: reduced chi² {chi2:.4} from {n} observations");
            }
            groups.sort_by(|a, b| b.1.total_cmp(&a.1));

            let mut printer = InfoPrinter::new(format!("Reduced chi² by '{column}'").into());
            printer.push_line(format!("{} groups", groups.len()).into());
            printer.push_block(
                groups
                    .iter()
                    .take(NUM_WORST_GROUPS)
                    .map(|(key, chi2, n)| format!("{key}: {chi2:.4} ({n} observations)").into())
                    .collect(),
            );
            printer.display();
        }
        Ok(())
    }

    fn write(&self, result: &FitResult) -> Result<(), FitParamsError> {
        write_csv(&result.output_table()?, &self.output)?;
        info!("Wrote the solved observations to {}", self.output.display());

        if let Some(path) = &self.parameters_output {
            write_csv(&result.solution.parameter_table()?, path)?;
            info!("Wrote the solved parameters to {}", path.display());
        }

        if let Some((path, format)) = &self.summary_output {
            let summary = result.summary();
            let contents = match format {
                SummaryFormat::Toml => toml::to_string(&summary)?,
                SummaryFormat::Json => serde_json::to_string_pretty(&summary)?,
            };
            std::fs::write(path, contents)?;
            info!("Wrote the fit summary to {}", path.display());
        }
        Ok(())
    }
}

#[derive(Error, Debug)]
pub(crate) enum FitParamsError {
    #[error(transparent)]
    Read(#[from] ReadTableError),

    #[error(transparent)]
    Write(#[from] WriteTableError),

    #[error(transparent)]
    Fit(#[from] FitError),

    #[error(transparent)]
    Data(#[from] DataError),

    #[error("Couldn't serialise the fit summary to json: {0}")]
    SummaryJson(#[from] serde_json::Error),

    #[error("Couldn't serialise the fit summary to toml: {0}")]
    SummaryToml(#[from] toml::ser::Error),

    #[error(transparent)]
    IO(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use approx::assert_abs_diff_eq;
    use tempfile::TempDir;

    use super::*;
    use crate::{
        model::{FamilyDescriptor, FamilyKind},
        solution::FitSummary,
        store::Column,
    };

    fn params(input: &Path, output: &Path) -> FitParams {
        FitParams {
            input: input.to_path_buf(),
            flux: None,
            quality_cut: None,
            cells: None,
            model: FitModel::configure(vec![
                FamilyDescriptor::new(FamilyKind::StarMag),
                FamilyDescriptor::new(FamilyKind::Zp).reference_key(0),
            ])
            .unwrap()
            .with_min_observations(1)
            .unwrap(),
            solver: SolverParams::default(),
            output: output.to_path_buf(),
            parameters_output: None,
            summary_output: None,
            chi2_by: vec![],
        }
    }

    /// Stars A and B on exposures 0 and 1 of one quadrant each, as fluxes.
    /// Exposure 1 is 0.1 mag fainter than exposure 0.
    fn raw_catalogue() -> ObservationTable {
        let flux = |mag: f64| 10f64.powf(-mag / 2.5);
        ObservationTable::from_columns([
            ("star_key", Column::from(vec!["A", "B", "A", "B", "B"])),
            (
                "expid",
                Column::from(vec![10_000_000_i64, 10_000_000, 10_000_001, 10_000_001, 10_000_002]),
            ),
            ("exposure_key", Column::from(vec![0_i64, 0, 1, 1, 2])),
            ("rcid", Column::from(vec![0_i64, 0, 5, 5, 0])),
            (
                "flux",
                Column::from(vec![flux(10.0), flux(12.0), flux(10.1), flux(12.1), -1.0]),
            ),
            ("flux_err", Column::from(vec![1e-5, 1e-6, 1e-5, 1e-6, 1e-6])),
        ])
        .unwrap()
    }

    #[test]
    fn test_fit_from_fluxes_with_quality_cut() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("raw.csv");
        write_csv(&raw_catalogue(), &input).unwrap();

        // Exposure 0 quadrant 0 and exposure 1 quadrant 5 are good; exposure 2
        // is flagged. Metadata pids carry two extra digits.
        let metadata = dir.path().join("metadata.csv");
        let meta = ObservationTable::from_columns([
            (
                "pid",
                Column::from(vec![100_000_000_000_i64, 100_000_010_500, 100_000_020_000]),
            ),
            ("infobits", Column::from(vec![0_i64, 0, 33])),
        ])
        .unwrap();
        write_csv(&meta, &metadata).unwrap();

        let output = dir.path().join("solved.csv");
        let summary = dir.path().join("summary.toml");
        let mut params = params(&input, &output);
        params.flux = Some(FluxColumns {
            flux: "flux".to_string(),
            flux_err: "flux_err".to_string(),
        });
        params.quality_cut = Some(QualityCut {
            metadata,
            pid_column: "pid".to_string(),
            expid_column: "expid".to_string(),
            rcid_column: "rcid".to_string(),
        });
        params.summary_output = Some((summary.clone(), SummaryFormat::Toml));
        params.chi2_by = vec!["exposure_key".to_string()];
        params.run().unwrap();

        let solved = read_csv(&output).unwrap();
        assert_eq!(solved.num_rows(), 4);
        let zp = solved.floats("value_zp").unwrap();
        assert_abs_diff_eq!(zp[0], 0.0, epsilon = 1e-9);
        assert_abs_diff_eq!(zp[3], 0.1, epsilon = 1e-9);
        assert!(solved.has_column("pid"));

        let summary: FitSummary =
            toml::from_str(&std::fs::read_to_string(&summary).unwrap()).unwrap();
        assert_eq!(summary.num_observations, 4);
        assert_eq!(summary.families.len(), 2);
    }

    #[test]
    fn test_derived_cells() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("obs.csv");
        let table = ObservationTable::from_columns([
            ("star_key", Column::from(vec![0_i64, 0, 1, 1])),
            ("exposure_key", Column::from(vec![0_i64, 1, 0, 1])),
            ("mag", Column::from(vec![10.0, 10.2, 11.0, 11.2])),
            ("mag_err", Column::from(vec![0.01, 0.01, 0.01, 0.01])),
            ("x", Column::from(vec![10.0, 400.0, 3071.0, -5.0])),
            ("y", Column::from(vec![10.0, 500.0, 3079.0, 10.0])),
            ("rcid", Column::from(vec![0_i64, 2, 0, 0])),
        ])
        .unwrap();
        write_csv(&table, &input).unwrap();

        let mut params = params(&input, &dir.path().join("out.csv"));
        params.cells = Some(CellDerivation {
            grid: CellGrid::default(),
            x_column: "x".to_string(),
            y_column: "y".to_string(),
            rcid_column: "rcid".to_string(),
            name: "cell_key".to_string(),
        });
        let table = params.prepare().unwrap();
        // The cell column isn't required by this model, so the row outside
        // the channel survives with a null cell.
        assert_eq!(table.num_rows(), 4);
        let cells = table.column("cell_key").unwrap();
        assert_eq!(cells.key(0), Some(0.into()));
        assert_eq!(cells.key(1), Some(120.into()));
        assert_eq!(cells.key(2), Some(55.into()));
        assert_eq!(cells.key(3), None);
    }

    #[test]
    fn test_missing_input_file() {
        let dir = TempDir::new().unwrap();
        let params = params(&dir.path().join("nope.csv"), &dir.path().join("out.csv"));
        assert!(matches!(
            params.run(),
            Err(FitParamsError::Read(ReadTableError::FileDoesntExist(_)))
        ));
    }
}
