// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The weighted normal equations `Aᵀ W A x = Aᵀ W b` and the solvers for them.
//!
//! The normal matrix is only ever held in compressed sparse column form.
//! Solvers sit behind the [`LinearSolver`] trait so that the dense reference
//! solver can stand in for the sparse one in tests.

mod cholesky;
mod dense;
mod error;
mod lsqr;

pub use cholesky::SparseCholesky;
pub use dense::DenseCholesky;
pub use error::SolveError;
pub use lsqr::Lsqr;

use std::time::Instant;

use log::{debug, warn};
use serde::{Deserialize, Serialize};
use sprs::CsMat;
use strum_macros::{Display, EnumIter, EnumString};

use crate::{
    constants::{
        DEFAULT_LSQR_ATOL, DEFAULT_LSQR_BTOL, DEFAULT_LSQR_MAX_ITERATIONS,
        DEFAULT_PIVOT_TOLERANCE,
    },
    design::DesignMatrix,
};

/// Anything that can solve `N x = r` for a symmetric positive-definite `N`.
pub trait LinearSolver {
    fn name(&self) -> &'static str;

    fn solve(&self, normal: &NormalEquations) -> Result<Vec<f64>, SolveError>;
}

/// `N = Aᵀ W A` and `r = Aᵀ W b`.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalEquations {
    matrix: CsMat<f64>,
    rhs: Vec<f64>,
}

impl NormalEquations {
    /// Form the normal equations. `weights` is the diagonal of W and `b` the
    /// target vector; both have one entry per row of `a`.
    ///
    /// The product is a Gustavson-style sparse product with a dense
    /// accumulator, one column of `N` at a time, so `N` is never dense.
    pub fn build(a: &DesignMatrix, weights: &[f64], b: &[f64]) -> NormalEquations {
        let num_rows = a.num_rows();
        let n = a.num_cols();
        assert_eq!(weights.len(), num_rows);
        assert_eq!(b.len(), num_rows);
        let (rows, cols, vals) = (a.rows(), a.cols(), a.vals());

        // Row pointers of A; entries are already sorted by row.
        let mut row_ptr = vec![0_usize; num_rows + 1];
        for &r in rows {
            row_ptr[r + 1] += 1;
        }
        for r in 0..num_rows {
            row_ptr[r + 1] += row_ptr[r];
        }

        // A transposed into column order, keeping rows ascending within each
        // column.
        let mut col_ptr = vec![0_usize; n + 1];
        for &c in cols {
            col_ptr[c + 1] += 1;
        }
        for c in 0..n {
            col_ptr[c + 1] += col_ptr[c];
        }
        let mut next = col_ptr.clone();
        let mut by_col = vec![0_usize; vals.len()];
        for (i, &c) in cols.iter().enumerate() {
            by_col[next[c]] = i;
            next[c] += 1;
        }

        let mut rhs = vec![0.0; n];
        for (i, (&r, &c)) in rows.iter().zip(cols).enumerate() {
            rhs[c] += weights[r] * (vals[i] * b[r]);
        }

        let mut indptr = Vec::with_capacity(n + 1);
        let mut indices = vec![];
        let mut data = vec![];
        let mut accumulator = vec![0.0; n];
        let mut marker = vec![usize::MAX; n];
        let mut pattern = vec![];
        indptr.push(0);
        for j in 0..n {
            pattern.clear();
            for &i in &by_col[col_ptr[j]..col_ptr[j + 1]] {
                let r = rows[i];
                let a_rj = vals[i];
                for k in row_ptr[r]..row_ptr[r + 1] {
                    let c = cols[k];
                    if marker[c] != j {
                        marker[c] = j;
                        accumulator[c] = 0.0;
                        pattern.push(c);
                    }
                    // Multiplying the two entries first keeps N exactly
                    // symmetric.
                    accumulator[c] += weights[r] * (a_rj * vals[k]);
                }
            }
            pattern.sort_unstable();
            for &c in &pattern {
                indices.push(c);
                data.push(accumulator[c]);
            }
            indptr.push(indices.len());
        }

        NormalEquations {
            matrix: CsMat::new_csc((n, n), indptr, indices, data),
            rhs,
        }
    }

    pub fn matrix(&self) -> &CsMat<f64> {
        &self.matrix
    }

    pub fn rhs(&self) -> &[f64] {
        &self.rhs
    }

    /// The number of unknowns.
    pub fn dim(&self) -> usize {
        self.rhs.len()
    }

    pub fn nnz(&self) -> usize {
        self.matrix.nnz()
    }

    pub fn diagonal(&self) -> Vec<f64> {
        let mut diag = vec![0.0; self.dim()];
        for (j, col) in self.matrix.outer_iterator().enumerate() {
            if let Some(&v) = col.get(j) {
                diag[j] = v;
            }
        }
        diag
    }

    /// Compute `N x`.
    pub fn mul_vec(&self, x: &[f64]) -> Vec<f64> {
        assert_eq!(x.len(), self.dim());
        let mut y = vec![0.0; self.dim()];
        for (j, col) in self.matrix.outer_iterator().enumerate() {
            let xj = x[j];
            for (i, &v) in col.iter() {
                y[i] += v * xj;
            }
        }
        y
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Display, EnumIter, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum SolverType {
    /// Sparse LDLᵀ (Cholesky) factorisation.
    #[default]
    Cholesky,

    /// The iterative LSQR method.
    Lsqr,

    /// Dense Cholesky factorisation. Only sensible for small problems.
    Dense,
}

/// The fill-reducing ordering used before sparse factorisation.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Display, EnumIter, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum FillOrdering {
    /// Reverse Cuthill-McKee.
    #[default]
    Rcm,

    /// No reordering.
    Natural,
}

/// Solver choice and tolerances.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverParams {
    pub solver: SolverType,
    pub ordering: FillOrdering,

    /// A factorisation pivot below this multiple of its own diagonal element
    /// of the normal matrix means the matrix is singular.
    pub pivot_tolerance: f64,

    pub lsqr_atol: f64,
    pub lsqr_btol: f64,
    pub lsqr_max_iterations: usize,

    /// Retry with LSQR when a factorisation fails.
    pub fallback_to_lsqr: bool,
}

impl Default for SolverParams {
    fn default() -> Self {
        SolverParams {
            solver: SolverType::default(),
            ordering: FillOrdering::default(),
            pivot_tolerance: DEFAULT_PIVOT_TOLERANCE,
            lsqr_atol: DEFAULT_LSQR_ATOL,
            lsqr_btol: DEFAULT_LSQR_BTOL,
            lsqr_max_iterations: DEFAULT_LSQR_MAX_ITERATIONS,
            fallback_to_lsqr: false,
        }
    }
}

impl SolverParams {
    pub fn solver(&self) -> Box<dyn LinearSolver> {
        match self.solver {
            SolverType::Cholesky => Box::new(SparseCholesky {
                ordering: self.ordering,
                pivot_tolerance: self.pivot_tolerance,
            }),
            SolverType::Lsqr => Box::new(self.lsqr()),
            SolverType::Dense => Box::new(DenseCholesky {
                pivot_tolerance: self.pivot_tolerance,
            }),
        }
    }

    fn lsqr(&self) -> Lsqr {
        Lsqr {
            atol: self.lsqr_atol,
            btol: self.lsqr_btol,
            max_iterations: self.lsqr_max_iterations,
        }
    }

    /// Solve with the chosen solver, falling back to LSQR if asked to. Returns
    /// the solution and the name of the solver that produced it.
    pub fn solve(&self, normal: &NormalEquations) -> Result<(Vec<f64>, &'static str), SolveError> {
        let solver = self.solver();
        match timed_solve(solver.as_ref(), normal) {
            Ok(x) => Ok((x, solver.name())),
            Err(e) if self.fallback_to_lsqr && e.is_singular() && self.solver != SolverType::Lsqr => {
                warn!("The {} solver failed ({e}); falling back to LSQR", solver.name());
                let lsqr = self.lsqr();
                let x = timed_solve(&lsqr, normal)?;
                Ok((x, lsqr.name()))
            }
            Err(e) => Err(e),
        }
    }
}

fn timed_solve(solver: &dyn LinearSolver, normal: &NormalEquations) -> Result<Vec<f64>, SolveError> {
    if normal.dim() == 0 {
        return Err(SolveError::Empty);
    }
    debug!(
        "Solving {n} × {n} normal equations ({} non-zeros) with {}",
        normal.nnz(),
        solver.name(),
        n = normal.dim()
    );
    let start = Instant::now();
    let x = solver.solve(normal)?;
    debug!("{} solve took {:?}", solver.name(), start.elapsed());
    if x.iter().any(|v| !v.is_finite()) {
        return Err(SolveError::NonFinite {
            solver: solver.name(),
        });
    }
    Ok(x)
}
