// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The solution view: the solved parameters scattered back onto the
//! observations, residuals, pulls and chi-squared diagnostics.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::{
    constants::{PULL_COLUMN, RESIDUAL_COLUMN},
    design::DesignMatrix,
    gauge::GaugeFix,
    index::{FitIndex, ParameterKey},
    model::{FamilyKind, FitModel},
    store::{Column, DataError, Key, ObservationTable},
};

/// Per-family results, as reported to users.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FamilySummary {
    pub family: FamilyKind,
    pub column_offset: usize,
    pub size: usize,
    pub reference_count: usize,
    pub free_parameters: usize,
    /// The mean, over the family's unknowns, of the mean squared pull of the
    /// observations of each unknown.
    pub reduced_chi2: f64,
}

/// A summary of a whole fit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitSummary {
    pub model: String,
    pub solver: String,
    pub num_observations: usize,
    pub num_unknowns: usize,
    pub num_free: usize,
    pub chi2: f64,
    /// `chi2 / (observations - free unknowns)`; absent when there are no
    /// degrees of freedom.
    pub reduced_chi2: Option<f64>,
    pub families: Vec<FamilySummary>,
}

#[derive(Debug, Clone)]
pub struct SolutionView {
    index: FitIndex,
    gauge: GaugeFix,
    /// The full parameter vector; references are zero.
    parameters: Vec<f64>,
    residuals: Vec<f64>,
    pulls: Vec<f64>,
    solver: &'static str,
}

impl SolutionView {
    /// Expand the gauge-fixed solution `x` and compute
    /// `residual = mag - Σ_f weight_f · value_f` using the full design matrix.
    pub fn new(
        index: FitIndex,
        gauge: GaugeFix,
        full: &DesignMatrix,
        x: &[f64],
        mags: &[f64],
        mag_errs: &[f64],
        solver: &'static str,
    ) -> SolutionView {
        let parameters = gauge.expand(x);
        let predicted = full.mul_vec(&parameters);
        let residuals: Vec<f64> = mags.iter().zip(&predicted).map(|(m, p)| m - p).collect();
        let pulls = residuals
            .iter()
            .zip(mag_errs)
            .map(|(r, e)| r / e)
            .collect();
        SolutionView {
            index,
            gauge,
            parameters,
            residuals,
            pulls,
            solver,
        }
    }

    pub fn index(&self) -> &FitIndex {
        &self.index
    }

    pub fn gauge(&self) -> &GaugeFix {
        &self.gauge
    }

    pub fn parameters(&self) -> &[f64] {
        &self.parameters
    }

    pub fn residuals(&self) -> &[f64] {
        &self.residuals
    }

    pub fn pulls(&self) -> &[f64] {
        &self.pulls
    }

    pub fn solver(&self) -> &'static str {
        self.solver
    }

    /// The solved values of one family, indexed by dense id.
    pub fn family_values(&self, kind: FamilyKind) -> Option<&[f64]> {
        let (family, offset) = self.index.family(kind)?;
        Some(&self.parameters[offset..offset + family.size()])
    }

    /// The solved value of the unknown with this external key.
    pub fn value(&self, kind: FamilyKind, key: &ParameterKey) -> Option<f64> {
        let (family, offset) = self.index.family(kind)?;
        let id = family.keys().iter().position(|k| k == key)?;
        Some(self.parameters[offset + id])
    }

    /// The solved value of an unsliced unknown with this grouping key.
    pub fn value_of<K: Into<Key>>(&self, kind: FamilyKind, key: K) -> Option<f64> {
        self.value(
            kind,
            &ParameterKey {
                base: Some(key.into()),
                slice: None,
            },
        )
    }

    /// The value of a global (single-parameter) family.
    pub fn global_value(&self, kind: FamilyKind) -> Option<f64> {
        self.value(
            kind,
            &ParameterKey {
                base: None,
                slice: None,
            },
        )
    }

    /// The per-row `value_<family>` column.
    pub fn row_values(&self, kind: FamilyKind) -> Option<Vec<f64>> {
        let (family, _) = self.index.family(kind)?;
        let values = self.family_values(kind)?;
        Some(family.ids().iter().map(|&id| values[id as usize]).collect())
    }

    pub fn chi2(&self) -> f64 {
        self.pulls.iter().map(|p| p * p).sum()
    }

    /// The chi-squared per degree of freedom.
    pub fn reduced_chi2(&self) -> Option<f64> {
        let dof = self.residuals.len().checked_sub(self.gauge.num_free())?;
        if dof == 0 {
            None
        } else {
            Some(self.chi2() / dof as f64)
        }
    }

    /// The mean squared pull of the observations of every key of `column`,
    /// with the number of observations per key. Keys are in order of first
    /// appearance.
    pub fn chi2_by_group(
        &self,
        table: &ObservationTable,
        column: &str,
    ) -> Result<Vec<(Key, f64, usize)>, DataError> {
        let keys = table.key_column(column)?;
        if keys.len() != self.pulls.len() {
            return Err(DataError::ColumnLength {
                name: column.to_string(),
                expected: self.pulls.len(),
                got: keys.len(),
            });
        }
        let mut groups: IndexMap<Key, (f64, usize)> = IndexMap::new();
        for (row, pull) in self.pulls.iter().enumerate() {
            let key = keys.key(row).ok_or_else(|| DataError::Null {
                column: column.to_string(),
                row,
            })?;
            let entry = groups.entry(key).or_insert((0.0, 0));
            entry.0 += pull * pull;
            entry.1 += 1;
        }
        Ok(groups
            .into_iter()
            .map(|(k, (sum, n))| (k, sum / n as f64, n))
            .collect())
    }

    /// The mean squared pull per unknown of one family, indexed by dense id.
    pub fn family_chi2(&self, kind: FamilyKind) -> Option<Vec<f64>> {
        let (family, _) = self.index.family(kind)?;
        let mut sums = vec![0.0; family.size()];
        let mut counts = vec![0_usize; family.size()];
        for (&id, pull) in family.ids().iter().zip(&self.pulls) {
            sums[id as usize] += pull * pull;
            counts[id as usize] += 1;
        }
        Some(
            sums.into_iter()
                .zip(counts)
                .map(|(s, n)| if n == 0 { 0.0 } else { s / n as f64 })
                .collect(),
        )
    }

    pub fn summary(&self, model: &FitModel) -> FitSummary {
        let layouts = model.summary(&self.index, &self.gauge);
        let families = layouts
            .into_iter()
            .map(|l| {
                let chi2 = self.family_chi2(l.family).unwrap_or_default();
                let reduced_chi2 = if chi2.is_empty() {
                    0.0
                } else {
                    chi2.iter().sum::<f64>() / chi2.len() as f64
                };
                FamilySummary {
                    family: l.family,
                    column_offset: l.column_offset,
                    size: l.size,
                    reference_count: l.reference_count,
                    free_parameters: l.size - l.reference_count,
                    reduced_chi2,
                }
            })
            .collect();
        FitSummary {
            model: model.save_string(),
            solver: self.solver.to_string(),
            num_observations: self.residuals.len(),
            num_unknowns: self.index.num_columns(),
            num_free: self.gauge.num_free(),
            chi2: self.chi2(),
            reduced_chi2: self.reduced_chi2(),
            families,
        }
    }

    /// The derived per-row columns: `u_<family>` and `value_<family>` for
    /// every family, then `residual` and `pull`.
    pub fn to_columns(&self) -> Vec<(String, Column)> {
        let mut columns = self.index.to_columns();
        for family in self.index.families() {
            let kind = family.kind();
            if let Some(values) = self.row_values(kind) {
                columns.push((kind.value_column(), Column::Float(values)));
            }
        }
        columns.push((RESIDUAL_COLUMN.to_string(), Column::Float(self.residuals.clone())));
        columns.push((PULL_COLUMN.to_string(), Column::Float(self.pulls.clone())));
        columns
    }

    /// One row per unknown: family, key, slice, dense id, value and whether
    /// the unknown is a reference.
    pub fn parameter_table(&self) -> Result<ObservationTable, DataError> {
        let mut family_names = vec![];
        let mut keys = vec![];
        let mut slices = vec![];
        let mut ids = vec![];
        let mut values = vec![];
        let mut references = vec![];
        for (family, &offset) in self.index.families().iter().zip(self.index.offsets()) {
            let kind = family.kind();
            for (id, key) in family.keys().iter().enumerate() {
                family_names.push(Some(kind.to_string()));
                keys.push(key.base.clone());
                slices.push(key.slice.clone());
                ids.push(id as i64);
                values.push(self.parameters[offset + id]);
                references.push(i64::from(self.gauge.is_reference(kind, id as u32)));
            }
        }

        ObservationTable::from_columns([
            ("family", Column::Str(family_names)),
            ("key", Column::from_keys(keys)),
            ("slice", Column::from_keys(slices)),
            ("id", Column::from(ids)),
            ("value", Column::Float(values)),
            ("is_reference", Column::from(references)),
        ])
    }
}
