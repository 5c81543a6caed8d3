// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Sparse Cholesky solves via an LDLᵀ factorisation.

use sprs::{FillInReduction, SymmetryCheck};
use sprs_ldl::{Ldl, LdlNumeric};

use super::{FillOrdering, LinearSolver, NormalEquations, SolveError};

#[derive(Debug, Clone, Copy)]
pub struct SparseCholesky {
    pub ordering: FillOrdering,
    pub pivot_tolerance: f64,
}

impl LinearSolver for SparseCholesky {
    fn name(&self) -> &'static str {
        "cholesky"
    }

    fn solve(&self, normal: &NormalEquations) -> Result<Vec<f64>, SolveError> {
        let fill_in = match self.ordering {
            FillOrdering::Rcm => FillInReduction::ReverseCuthillMcKee,
            FillOrdering::Natural => FillInReduction::NoReduction,
        };
        let builder = Ldl::new()
            .fill_in_reduction(fill_in)
            .check_symmetry(SymmetryCheck::DontCheckSymmetry);
        // Pivot k of PNPᵀ belongs to column perm[k] of N.
        let perm = builder.perm(normal.matrix().view());
        let columns: Vec<usize> = (0..normal.dim()).map(|k| perm.at(k)).collect();
        let ldl = LdlNumeric::new_perm(
            normal.matrix().view(),
            perm,
            SymmetryCheck::DontCheckSymmetry,
        )?;

        // A symmetric positive-definite matrix has a strictly positive D.
        // Round-off turns the exact zero pivots of a singular matrix into tiny
        // ones, so each pivot is compared against its own diagonal element.
        let diagonal = normal.diagonal();
        for (k, (&d, &column)) in ldl.d().iter().zip(&columns).enumerate() {
            if !(d > self.pivot_tolerance * diagonal[column]) {
                return Err(SolveError::NotPositiveDefinite {
                    pivot: k,
                    value: d,
                    column,
                });
            }
        }
        Ok(ldl.solve(normal.rhs()))
    }
}
