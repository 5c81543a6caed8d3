// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! A dense Cholesky reference solver. Memory grows with the square of the
//! number of unknowns, so this is only for small problems and tests.

use nalgebra::{DMatrix, DVector};

use super::{LinearSolver, NormalEquations, SolveError};

#[derive(Debug, Clone, Copy)]
pub struct DenseCholesky {
    pub pivot_tolerance: f64,
}

impl LinearSolver for DenseCholesky {
    fn name(&self) -> &'static str {
        "dense"
    }

    fn solve(&self, normal: &NormalEquations) -> Result<Vec<f64>, SolveError> {
        let n = normal.dim();
        let mut dense = DMatrix::<f64>::zeros(n, n);
        for (j, col) in normal.matrix().outer_iterator().enumerate() {
            for (i, &v) in col.iter() {
                dense[(i, j)] = v;
            }
        }

        let chol = dense
            .cholesky()
            .ok_or(SolveError::NotFactorisable { solver: self.name() })?;
        // L_ii² are the pivots.
        let diagonal = normal.diagonal();
        let l = chol.l();
        for i in 0..n {
            let pivot = l[(i, i)] * l[(i, i)];
            if !(pivot > self.pivot_tolerance * diagonal[i]) {
                return Err(SolveError::NotPositiveDefinite {
                    pivot: i,
                    value: pivot,
                    column: i,
                });
            }
        }

        let rhs = DVector::from_column_slice(normal.rhs());
        Ok(chol.solve(&rhs).iter().copied().collect())
    }
}
