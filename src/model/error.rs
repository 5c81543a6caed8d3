// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use thiserror::Error;

use super::FamilyKind;
use crate::store::Key;

/// Problems with the fit model. These are always raised before any matrix is
/// built.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Family '{0}' was specified more than once")]
    DuplicateFamily(FamilyKind),

    #[error("Family '{0}' must be part of every fit")]
    MissingRequiredFamily(FamilyKind),

    #[error("Unknown parameter family '{0}'; expected one of: {1}")]
    UnknownFamily(String, String),

    #[error("Family '{0}' has one unknown per key and does not admit references")]
    ReferenceNotAllowed(FamilyKind),

    #[error("Family '{family}' admits exactly one reference key, but {num} were given")]
    TooManyReferences { family: FamilyKind, num: usize },

    #[error("Family '{family}' uses column '{column}' as both its weight and its grouping column")]
    ContradictoryWeight { family: FamilyKind, column: String },

    #[error("Family '{0}' needs a weight column (e.g. airmass)")]
    MissingWeight(FamilyKind),

    #[error("Family '{family}' cannot be sliced in time by its own grouping column '{column}'")]
    IncompatibleTimeSlice { family: FamilyKind, column: String },

    #[error("Family '{0}' is not part of the fit model")]
    FamilyNotActive(FamilyKind),

    #[error("Super-pixel bin width {width} does not divide the channel {axis} dimension of {num_pixels} pixels")]
    BinSizeNotDivisor {
        axis: char,
        width: u32,
        num_pixels: u32,
    },

    #[error("Reference key '{key}' of family '{family}' does not appear in the observations")]
    UnknownReference { family: FamilyKind, key: Key },

    #[error("Reference slice '{slice}' of family '{family}' does not appear in the observations")]
    UnknownReferenceSlice { family: FamilyKind, slice: Key },

    #[error("Family '{0}' lists reference slices, but is not sliced in time")]
    SlicesWithoutTimeDependence(FamilyKind),

    #[error("The minimum number of observations per star must be at least 1")]
    ZeroMinObservations,
}
