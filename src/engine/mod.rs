// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The single `configure + run` entry point of the self-calibration.
//!
//! The input table is never modified. Rows are filtered into a new table, the
//! derived id and value columns live on the [`SolutionView`], and
//! [`FitResult::output_table`] joins the two.

#[cfg(test)]
mod tests;

use log::{debug, info, warn};
use thiserror::Error;

use crate::{
    design::{target_and_weights, DesignMatrix},
    gauge::{GaugeError, GaugeFix},
    index::{filter_min_observations, FitIndex, IndexError},
    model::{ConfigError, FamilyKind, FitModel},
    solution::{FitSummary, SolutionView},
    solver::{NormalEquations, SolveError, SolverParams},
    store::{DataError, ObservationTable},
};

#[derive(Error, Debug)]
pub enum FitError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Data(#[from] DataError),

    /// Too few observations survive filtering.
    #[error(transparent)]
    Size(IndexError),

    #[error("There are no observations to fit")]
    NoObservations,

    #[error("The '{family}' unknown of key '{key}' is not constrained by any observation with a non-zero weight")]
    UnconstrainedParameter { family: FamilyKind, key: String },

    #[error("{source}{}", .context.as_ref().map(|c| format!("\n{c}")).unwrap_or_default())]
    Numerical {
        #[source]
        source: SolveError,
        context: Option<String>,
    },
}

impl From<IndexError> for FitError {
    fn from(e: IndexError) -> Self {
        match e {
            IndexError::Data(e) => FitError::Data(e),
            e => FitError::Size(e),
        }
    }
}

impl From<GaugeError> for FitError {
    fn from(e: GaugeError) -> Self {
        match e {
            GaugeError::Config(e) => FitError::Config(e),
            GaugeError::Data(e) => FitError::Data(e),
        }
    }
}

/// Everything a fit produces.
#[derive(Debug, Clone)]
pub struct FitResult {
    /// The observations that took part in the fit, after filtering.
    pub observations: ObservationTable,
    pub model: FitModel,
    pub solution: SolutionView,
}

impl FitResult {
    /// The fitted observations with the `u_<family>`, `value_<family>`,
    /// `residual` and `pull` columns appended.
    pub fn output_table(&self) -> Result<ObservationTable, DataError> {
        self.observations.with_columns(self.solution.to_columns())
    }

    pub fn summary(&self) -> FitSummary {
        self.solution.summary(&self.model)
    }
}

/// Run a fit of `model` on `observations`.
pub fn run(
    observations: &ObservationTable,
    model: &FitModel,
    solver: &SolverParams,
) -> Result<FitResult, FitError> {
    model.validate()?;
    for column in model.required_columns() {
        observations.column(column)?;
    }
    if observations.is_empty() {
        return Err(FitError::NoObservations);
    }

    let mut table = observations.clone();
    if let Some(k_ext) = model.family(FamilyKind::KExt) {
        if let Some(airmass) = &k_ext.weight_column {
            table = table.filter(|row| row.float(airmass).map(|a| a > 0.0).unwrap_or(false));
            let num_dropped = observations.num_rows() - table.num_rows();
            if num_dropped > 0 {
                warn!("Dropped {num_dropped} observations without a positive '{airmass}'");
            }
            if table.is_empty() {
                return Err(FitError::NoObservations);
            }
        }
    }

    if let Some(star_column) = model
        .family(FamilyKind::StarMag)
        .and_then(|f| f.input_column.as_deref())
    {
        table = filter_min_observations(&table, star_column, model.min_observations())?;
    }

    let index = FitIndex::build(&table, model)?;
    let gauge = GaugeFix::build(&table, model, &index)?;
    let full = DesignMatrix::assemble(&table, model, &index)?;
    let (mags, weights) = target_and_weights(&table, model.magnitude_column(), model.error_column())?;

    // An unknown that no observation touches makes the normal matrix
    // singular; name it rather than letting the factorisation fail.
    for (column, sum) in full.column_abs_sums().into_iter().enumerate() {
        if sum == 0.0 && gauge.column_map()[column].is_some() {
            if let Some((family, key)) = index.locate(column) {
                return Err(FitError::UnconstrainedParameter {
                    family,
                    key: key.to_string(),
                });
            }
        }
    }

    let reduced = gauge.apply(&full);
    let normal = NormalEquations::build(&reduced, &weights, &mags);
    let (x, solver_name) = solver.solve(&normal).map_err(|source| {
        let context = singular_context(&source, &index, &gauge);
        FitError::Numerical { source, context }
    })?;

    let mag_errs = table.floats(model.error_column())?.into_owned();
    let solution = SolutionView::new(index, gauge, &full, &x, &mags, &mag_errs, solver_name);
    info!(
        "Fitted {} unknowns ({} free) to {} observations",
        solution.index().num_columns(),
        solution.gauge().num_free(),
        table.num_rows()
    );
    match solution.reduced_chi2() {
        Some(chi2) => info!("Reduced chi-squared: {chi2:.4}"),
        None => debug!("No degrees of freedom left for a reduced chi-squared"),
    }

    Ok(FitResult {
        observations: table,
        model: model.clone(),
        solution,
    })
}

fn singular_context(error: &SolveError, index: &FitIndex, gauge: &GaugeFix) -> Option<String> {
    if !error.is_singular() {
        return None;
    }
    let mut context = String::from(
        "The fit is degenerate: check that every family except star_mag has enough references, and that no two families are collinear",
    );
    if let SolveError::NotPositiveDefinite { column, .. } = error {
        if let Some((family, key)) = gauge
            .full_column(*column)
            .and_then(|full| index.locate(full))
        {
            context.push_str(&format!(" (first failing unknown: '{family}' key '{key}')"));
        }
    }
    Some(context)
}
