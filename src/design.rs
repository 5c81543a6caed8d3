// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Assembly of the sparse design matrix, the target vector and the
//! observation weights.

use log::debug;
use sprs::{CsMat, TriMat};

use crate::{
    index::FitIndex,
    model::FitModel,
    store::{DataError, ObservationTable},
};

/// The design matrix A in coordinate form. Entries are stored row by row, and
/// within a row in canonical family order. Zero-valued entries are kept.
#[derive(Debug, Clone, PartialEq)]
pub struct DesignMatrix {
    num_rows: usize,
    num_cols: usize,
    rows: Vec<usize>,
    cols: Vec<usize>,
    vals: Vec<f64>,
}

impl DesignMatrix {
    /// Emit one entry per row and active family:
    /// `(row, offset[f] + u_f[row], weight_f[row])`.
    pub fn assemble(
        table: &ObservationTable,
        model: &FitModel,
        index: &FitIndex,
    ) -> Result<DesignMatrix, DataError> {
        let num_rows = table.num_rows();
        let families = model.sorted_families();
        let num_families = families.len();

        let mut weights = Vec::with_capacity(num_families);
        for family in &families {
            weights.push(match &family.weight_column {
                Some(c) => Some(family_weights(table, c)?),
                None => None,
            });
        }

        let nnz = num_rows * num_families;
        let mut rows = Vec::with_capacity(nnz);
        let mut cols = Vec::with_capacity(nnz);
        let mut vals = Vec::with_capacity(nnz);
        for row in 0..num_rows {
            let blocks = index.families().iter().zip(index.offsets()).zip(&weights);
            for ((family, &offset), family_weights) in blocks {
                rows.push(row);
                cols.push(offset + family.ids()[row] as usize);
                vals.push(family_weights.as_ref().map(|w| w[row]).unwrap_or(1.0));
            }
        }
        debug!(
            "Assembled a {num_rows} × {} design matrix with {} entries",
            index.num_columns(),
            vals.len()
        );

        Ok(DesignMatrix {
            num_rows,
            num_cols: index.num_columns(),
            rows,
            cols,
            vals,
        })
    }

    /// Build directly from parts. Entries must be sorted by row.
    pub(crate) fn from_parts(
        num_rows: usize,
        num_cols: usize,
        rows: Vec<usize>,
        cols: Vec<usize>,
        vals: Vec<f64>,
    ) -> DesignMatrix {
        assert_eq!(rows.len(), cols.len());
        assert_eq!(rows.len(), vals.len());
        debug_assert!(rows.windows(2).all(|w| w[0] <= w[1]));
        DesignMatrix {
            num_rows,
            num_cols,
            rows,
            cols,
            vals,
        }
    }

    pub fn num_rows(&self) -> usize {
        self.num_rows
    }

    pub fn num_cols(&self) -> usize {
        self.num_cols
    }

    /// The number of stored entries (including explicit zeros).
    pub fn nnz(&self) -> usize {
        self.vals.len()
    }

    pub fn rows(&self) -> &[usize] {
        &self.rows
    }

    pub fn cols(&self) -> &[usize] {
        &self.cols
    }

    pub fn vals(&self) -> &[f64] {
        &self.vals
    }

    pub fn triplets(&self) -> impl Iterator<Item = (usize, usize, f64)> + '_ {
        self.rows
            .iter()
            .zip(&self.cols)
            .zip(&self.vals)
            .map(|((&r, &c), &v)| (r, c, v))
    }

    /// The stored entries of every row, as `(col, val)` pairs.
    pub fn row_entries(&self) -> impl Iterator<Item = (usize, Vec<(usize, f64)>)> + '_ {
        let mut start = 0;
        (0..self.num_rows).map(move |row| {
            let mut end = start;
            while end < self.rows.len() && self.rows[end] == row {
                end += 1;
            }
            let entries = (start..end)
                .map(|i| (self.cols[i], self.vals[i]))
                .collect();
            start = end;
            (row, entries)
        })
    }

    /// The number of stored entries in each column.
    pub fn column_counts(&self) -> Vec<usize> {
        let mut counts = vec![0; self.num_cols];
        for &c in &self.cols {
            counts[c] += 1;
        }
        counts
    }

    /// The sum of the absolute values in each column. A zero sum means the
    /// observations carry no information on that unknown.
    pub fn column_abs_sums(&self) -> Vec<f64> {
        let mut sums = vec![0.0; self.num_cols];
        for (&c, &v) in self.cols.iter().zip(&self.vals) {
            sums[c] += v.abs();
        }
        sums
    }

    /// Compute A x.
    pub fn mul_vec(&self, x: &[f64]) -> Vec<f64> {
        assert_eq!(x.len(), self.num_cols);
        let mut y = vec![0.0; self.num_rows];
        for (r, c, v) in self.triplets() {
            y[r] += v * x[c];
        }
        y
    }

    pub fn to_csr(&self) -> CsMat<f64> {
        let mut tri = TriMat::with_capacity((self.num_rows, self.num_cols), self.nnz());
        for (r, c, v) in self.triplets() {
            tri.add_triplet(r, c, v);
        }
        tri.to_csr()
    }
}

/// Per-row values of a family's weight column. Nulls are an error.
fn family_weights(table: &ObservationTable, column: &str) -> Result<Vec<f64>, DataError> {
    let weights = table.floats(column)?.into_owned();
    if let Some(row) = weights.iter().position(|w| !w.is_finite()) {
        return Err(DataError::Null {
            column: column.to_string(),
            row,
        });
    }
    Ok(weights)
}

/// The target vector b (magnitudes) and the diagonal of W (`1 / mag_err²`).
/// Every uncertainty must be strictly positive.
pub fn target_and_weights(
    table: &ObservationTable,
    mag_column: &str,
    mag_err_column: &str,
) -> Result<(Vec<f64>, Vec<f64>), DataError> {
    let mags = table.floats(mag_column)?.into_owned();
    if let Some(row) = mags.iter().position(|m| !m.is_finite()) {
        return Err(DataError::Null {
            column: mag_column.to_string(),
            row,
        });
    }

    let errors = table.floats(mag_err_column)?;
    let mut weights = Vec::with_capacity(errors.len());
    for (row, &e) in errors.iter().enumerate() {
        if e.is_nan() {
            return Err(DataError::Null {
                column: mag_err_column.to_string(),
                row,
            });
        }
        if e <= 0.0 || !e.is_finite() {
            return Err(DataError::NonPositiveError {
                column: mag_err_column.to_string(),
                row,
                value: e,
            });
        }
        weights.push(1.0 / (e * e));
    }
    Ok((mags, weights))
}
