// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Error type for all ubercal-related errors. This should be the *only* error
//! enum that is publicly visible.

use thiserror::Error;

use super::{fit::FitArgsError, simulate::SimulateArgsError};
use crate::{
    engine::FitError,
    index::IndexError,
    model::ConfigError,
    params::{FitParamsError, SimulateParamsError},
    simulate::SimulationError,
    solver::SolveError,
    store::{DataError, ReadTableError, WriteTableError},
};

/// The *only* publicly visible error from ubercal. The variants are the kinds
/// of problem a user can run into; each carries the message of the underlying
/// error.
#[derive(Error, Debug)]
pub enum UbercalError {
    /// The fit model or the options describing it are invalid.
    #[error("{0}\n\nSee `ubercal fit --help` or `ubercal simulate --help` for the available options.")]
    Configuration(String),

    /// The observation table doesn't fit the model.
    #[error("{0}")]
    Data(String),

    /// The normal equations could not be solved.
    #[error("{0}\n\nThis usually means a family is missing a reference, or part of the survey is disconnected from the rest. Try turning up verbosity (-v or -vv).")]
    Numerical(String),

    /// Too little data survived filtering.
    #[error("{0}")]
    Size(String),

    /// An error related to argument files.
    #[error("{0}")]
    ArgFile(String),

    /// Reading or writing files failed.
    #[error("{0}")]
    Io(String),

    /// A generic error that can't be clarified further.
    #[error("{0}")]
    Generic(String),
}

// When changing the error propagation below, ensure `Self::from(e)` uses the
// correct `e`!

// Binary sub-command errors.

impl From<FitArgsError> for UbercalError {
    fn from(e: FitArgsError) -> Self {
        match e {
            FitArgsError::Config(e) => Self::from(e),
            e => Self::Configuration(e.to_string()),
        }
    }
}

impl From<SimulateArgsError> for UbercalError {
    fn from(e: SimulateArgsError) -> Self {
        Self::Configuration(e.to_string())
    }
}

impl From<FitParamsError> for UbercalError {
    fn from(e: FitParamsError) -> Self {
        match e {
            FitParamsError::Read(e) => Self::from(e),
            FitParamsError::Write(e) => Self::from(e),
            FitParamsError::Fit(e) => Self::from(e),
            FitParamsError::Data(e) => Self::from(e),
            FitParamsError::SummaryJson(_)
            | FitParamsError::SummaryToml(_)
            | FitParamsError::IO(_) => Self::Io(e.to_string()),
        }
    }
}

impl From<SimulateParamsError> for UbercalError {
    fn from(e: SimulateParamsError) -> Self {
        match e {
            SimulateParamsError::Simulation(e) => Self::from(e),
            SimulateParamsError::Write(e) => Self::from(e),
        }
    }
}

// Library errors.

impl From<ConfigError> for UbercalError {
    fn from(e: ConfigError) -> Self {
        Self::Configuration(e.to_string())
    }
}

impl From<DataError> for UbercalError {
    fn from(e: DataError) -> Self {
        Self::Data(e.to_string())
    }
}

impl From<ReadTableError> for UbercalError {
    fn from(e: ReadTableError) -> Self {
        match e {
            ReadTableError::FileDoesntExist(_) | ReadTableError::IO(_) => Self::Io(e.to_string()),
            ReadTableError::NoColumns(_)
            | ReadTableError::DuplicateColumn { .. }
            | ReadTableError::Csv { .. }
            | ReadTableError::Data(_) => Self::Data(e.to_string()),
        }
    }
}

impl From<WriteTableError> for UbercalError {
    fn from(e: WriteTableError) -> Self {
        Self::Io(e.to_string())
    }
}

impl From<IndexError> for UbercalError {
    fn from(e: IndexError) -> Self {
        match e {
            IndexError::Data(e) => Self::from(e),
            IndexError::NoObservationsLeft { .. } | IndexError::TooManyParameters(_) => {
                Self::Size(e.to_string())
            }
        }
    }
}

impl From<SolveError> for UbercalError {
    fn from(e: SolveError) -> Self {
        Self::Numerical(e.to_string())
    }
}

impl From<FitError> for UbercalError {
    fn from(e: FitError) -> Self {
        match e {
            FitError::Config(e) => Self::from(e),
            FitError::Data(e) => Self::from(e),
            FitError::Size(e) => Self::from(e),
            FitError::NoObservations => Self::Size(e.to_string()),
            FitError::UnconstrainedParameter { .. } | FitError::Numerical { .. } => {
                Self::Numerical(e.to_string())
            }
        }
    }
}

impl From<SimulationError> for UbercalError {
    fn from(e: SimulationError) -> Self {
        Self::Configuration(e.to_string())
    }
}

// External crate errors.

impl From<std::io::Error> for UbercalError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e.to_string())
    }
}
