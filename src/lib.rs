// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Photometric self-calibration ("ubercal") of wide-field survey
//! observations.
//!
//! Repeated observations of the same stars are used to solve a sparse linear
//! least-squares problem for star magnitudes, exposure zero points and a
//! configurable set of instrumental terms (detector channel offsets, cell
//! offsets, atmospheric extinction, colour terms). The pipeline is:
//!
//! 1. read an [`ObservationTable`] ([`store`]) and optionally derive columns
//!    from raw survey data ([`preprocess`]);
//! 2. describe the parameter families to fit ([`model`]);
//! 3. index the families ([`index`]), assemble the design matrix ([`design`])
//!    and fix the gauge with reference parameters ([`gauge`]);
//! 4. solve the normal equations ([`solver`]);
//! 5. inspect the fitted parameters and residuals ([`solution`]).
//!
//! [`engine::run`] ties these together.

pub mod constants;
pub mod design;
pub mod engine;
pub mod gauge;
pub mod index;
pub mod model;
pub mod preprocess;
pub mod simulate;
pub mod solution;
pub mod solver;
pub mod store;

mod cli;
pub(crate) mod misc;
pub(crate) mod params;

// Re-exports.
pub use cli::{Ubercal, UbercalError};
pub use engine::{run, FitError, FitResult};
pub use model::{CellGrid, ConfigError, FamilyDescriptor, FamilyKind, FitModel, References};
pub use solution::{FitSummary, SolutionView};
pub use solver::{FillOrdering, SolverParams, SolverType};
pub use store::{read_csv, write_csv, Column, Key, ObservationTable};
