// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SolveError {
    /// A pivot of the factorisation was not (numerically) positive.
    /// `column` is the unknown the pivot belongs to, after undoing any
    /// fill-reducing reordering.
    #[error("The normal matrix is not positive definite: pivot {pivot} (unknown {column}) is {value:e}")]
    NotPositiveDefinite {
        pivot: usize,
        value: f64,
        column: usize,
    },

    #[error("The {solver} factorisation of the normal matrix failed; it is not positive definite")]
    NotFactorisable { solver: &'static str },

    #[error("Factorisation of the normal matrix failed: {0}")]
    Factorisation(#[from] sprs::errors::LinalgError),

    #[error("The normal matrix is empty; there are no unknowns to solve for")]
    Empty,

    #[error("The {solver} solver produced a non-finite solution")]
    NonFinite { solver: &'static str },
}

impl SolveError {
    /// Does this error mean that the normal matrix is singular (as opposed
    /// to e.g. an empty problem)?
    pub fn is_singular(&self) -> bool {
        matches!(
            self,
            SolveError::NotPositiveDefinite { .. }
                | SolveError::NotFactorisable { .. }
                | SolveError::Factorisation(_)
        )
    }
}
